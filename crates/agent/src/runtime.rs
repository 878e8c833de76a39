//! Bot Runtime
//!
//! Explicit per-bot context replacing any process-wide state: compiled NLU
//! definitions, one classifier per language, the topic cache and the
//! per-session turn serialization. Created by `mount`, torn down by
//! `unmount`.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use bot_nlu_classifier::{
    backend_from_settings, ClassifierBackend, IntentClassifier, ModelId, TrainingHandle,
    TrainingScheduler,
};
use bot_nlu_config::{InMemoryBotStore, NluSettings};
use bot_nlu_core::{
    ContextStore, DefinitionStore, Evidence, IncomingEvent, Language, NluError, Result,
    TopicRegistry, Understanding,
};

use crate::conditions::ConditionRegistry;
use crate::engine::{DecisionEngine, Resolution, TopicDecision};
use crate::topics::TopicCache;
use crate::turn::{EngineEvent, Turn, TurnState};
use crate::understanding::NluPipeline;

/// Collaborators and shared services a runtime is mounted with
#[derive(Clone)]
pub struct RuntimeDeps {
    pub definitions: Arc<dyn DefinitionStore>,
    pub topics: Arc<dyn TopicRegistry>,
    pub contexts: Arc<dyn ContextStore>,
    pub conditions: Arc<ConditionRegistry>,
    pub backend: Arc<dyn ClassifierBackend>,
    pub scheduler: TrainingScheduler,
    pub settings: NluSettings,
    /// Language of events that do not carry one
    pub default_language: Language,
}

impl RuntimeDeps {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        topics: Arc<dyn TopicRegistry>,
        contexts: Arc<dyn ContextStore>,
        settings: NluSettings,
    ) -> Self {
        Self {
            definitions,
            topics,
            contexts,
            conditions: Arc::new(ConditionRegistry::with_builtins()),
            backend: backend_from_settings(&settings.classifier),
            scheduler: TrainingScheduler::new(),
            settings,
            default_language: Language::default(),
        }
    }

    /// All three collaborators served by one in-memory store
    pub fn from_store(store: Arc<InMemoryBotStore>, settings: NluSettings) -> Self {
        Self::new(store.clone(), store.clone(), store, settings)
    }

    pub fn with_conditions(mut self, conditions: Arc<ConditionRegistry>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ClassifierBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_scheduler(mut self, scheduler: TrainingScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }
}

/// Result of processing one event
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub resolution: Resolution,
    /// What the resolution was computed from
    pub evidence: Arc<Evidence>,
}

impl TurnOutcome {
    /// Topic to change to, if any
    pub fn selected(&self) -> Option<&str> {
        self.resolution.selected()
    }

    pub fn decision(&self) -> &TopicDecision {
        &self.resolution.decision
    }
}

/// Everything the core holds for one mounted bot
pub struct BotRuntime {
    bot_id: String,
    deps: RuntimeDeps,
    pipeline: RwLock<Arc<NluPipeline>>,
    classifiers: DashMap<Language, Arc<IntentClassifier>>,
    topic_cache: TopicCache,
    engine: DecisionEngine,
    sessions: DashMap<String, Arc<Mutex<()>>>,
    events: broadcast::Sender<EngineEvent>,
}

impl BotRuntime {
    /// Load and compile the bot's definitions
    pub async fn mount(bot_id: impl Into<String>, deps: RuntimeDeps) -> Result<Arc<Self>> {
        let bot_id = bot_id.into();
        let pipeline = build_pipeline(&bot_id, &deps).await?;
        let (events, _) = broadcast::channel(deps.settings.engine.event_buffer.max(1));

        tracing::info!(
            bot_id = %bot_id,
            intents = pipeline.intents().len(),
            skipped_entities = pipeline.skipped_entities().len(),
            backend = deps.backend.name(),
            "Bot mounted"
        );

        Ok(Arc::new(Self {
            topic_cache: TopicCache::new(deps.topics.clone()),
            engine: DecisionEngine::new(deps.conditions.clone()),
            pipeline: RwLock::new(Arc::new(pipeline)),
            classifiers: DashMap::new(),
            sessions: DashMap::new(),
            events,
            bot_id,
            deps,
        }))
    }

    /// Cancel training and drop every cache. Returns the number of
    /// cancelled training jobs.
    pub fn unmount(&self) -> usize {
        let cancelled = self.deps.scheduler.cancel_bot(&self.bot_id);
        self.topic_cache.forget(&self.bot_id);
        self.classifiers.clear();
        self.sessions.retain(|_, lock| Arc::strong_count(lock) > 1);
        tracing::info!(bot_id = %self.bot_id, cancelled, "Bot unmounted");
        cancelled
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn settings(&self) -> &NluSettings {
        &self.deps.settings
    }

    pub fn conditions(&self) -> &Arc<ConditionRegistry> {
        &self.deps.conditions
    }

    /// Subscribe to state changes and resolutions
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Re-read intents and entities after a definition change
    pub async fn reload_definitions(&self) -> Result<()> {
        let pipeline = build_pipeline(&self.bot_id, &self.deps).await?;
        tracing::info!(
            bot_id = %self.bot_id,
            intents = pipeline.intents().len(),
            "Definitions reloaded"
        );
        *self.pipeline.write() = Arc::new(pipeline);
        Ok(())
    }

    /// Flow-change notification: the next event re-reads the topic registry
    pub fn on_flow_changed(&self) {
        self.topic_cache.invalidate(&self.bot_id);
        let _ = self.events.send(EngineEvent::TopicsInvalidated {
            bot_id: self.bot_id.clone(),
        });
    }

    /// Classifier of a language, created on first use
    pub fn classifier(&self, language: &Language) -> Arc<IntentClassifier> {
        self.classifiers
            .entry(language.clone())
            .or_insert_with(|| {
                Arc::new(IntentClassifier::new(
                    self.bot_id.clone(),
                    language.clone(),
                    self.deps.backend.clone(),
                    self.deps.settings.classifier.clone(),
                ))
            })
            .clone()
    }

    /// Train the classifier of `language` in the background on the current
    /// intent definitions
    pub fn train(&self, language: &Language, model_id: Option<ModelId>) -> Result<TrainingHandle> {
        let intents = self.pipeline().intents().to_vec();
        self.deps
            .scheduler
            .submit(self.classifier(language), intents, model_id)
    }

    /// Load a stored model for `language`
    pub async fn load_model(&self, language: &Language, bytes: &[u8], model_id: ModelId) -> Result<()> {
        self.classifier(language).load_model(bytes, model_id).await
    }

    pub fn current_model_id(&self, language: &Language) -> Option<ModelId> {
        self.classifiers
            .get(language)
            .and_then(|c| c.current_model_id())
    }

    /// Run the NLU stages without resolving a topic
    pub async fn understand(
        &self,
        text: &str,
        language: Option<&Language>,
        active_contexts: &[String],
    ) -> Understanding {
        let language = language.unwrap_or(&self.deps.default_language).clone();
        let pipeline = self.pipeline();
        let classifier = self.classifiers.get(&language).map(|c| Arc::clone(c.value()));

        pipeline
            .understand(
                text,
                &language,
                active_contexts,
                classifier.as_deref(),
                &self.deps.settings.engine,
                self.deps.settings.classifier.num_candidates,
            )
            .await
    }

    /// Process one event: understand, resolve and commit.
    ///
    /// Events of the same session are processed one at a time in arrival
    /// order; different sessions run in parallel.
    pub async fn process_event(&self, event: IncomingEvent) -> Result<TurnOutcome> {
        if event.bot_id != self.bot_id {
            return Err(NluError::BotNotMounted(event.bot_id));
        }

        let lock = self
            .sessions
            .entry(event.session_id.clone())
            .or_default()
            .clone();
        let result = {
            let _serialized = lock.lock().await;

            metrics::counter!("bot_nlu_events_total").increment(1);
            let mut turn = Turn::new(&self.bot_id, &event.session_id, self.events.clone());

            match self.run_turn(&mut turn, &event).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    turn.abort();
                    tracing::warn!(
                        bot_id = %self.bot_id,
                        session_id = %event.session_id,
                        error = %e,
                        "Turn aborted"
                    );
                    Err(e)
                }
            }
        };

        drop(lock);
        self.release_session(&event.session_id);
        result
    }

    /// Forget the serialization lock of a finished session. A lock still
    /// held or awaited by a turn is kept; the last turn releases it.
    pub fn end_session(&self, session_id: &str) {
        self.release_session(session_id);
    }

    /// Number of sessions with a live serialization lock
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    // Only the map holds an idle lock; every clone belongs to a running or
    // queued turn. Clones are taken under the shard lock `remove_if` holds.
    fn release_session(&self, session_id: &str) {
        self.sessions
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn run_turn(&self, turn: &mut Turn, event: &IncomingEvent) -> Result<TurnOutcome> {
        advance(turn, TurnState::Listening);

        let context = self
            .deps
            .contexts
            .context(&self.bot_id, &event.session_id)
            .await?;
        let active_contexts = context.merged_contexts(&event.contexts);
        let understanding = self
            .understand(&event.text, event.language.as_ref(), &active_contexts)
            .await;

        advance(turn, TurnState::Resolving);

        let snapshot = self.topic_cache.topics(&self.bot_id).await?;
        let mut evidence = Evidence::new(event.text.clone(), understanding, context);
        evidence.active_contexts = active_contexts;
        let resolution = self.engine.resolve(&snapshot.topics, &evidence);
        let evidence = Arc::new(evidence);

        advance(turn, TurnState::Committed);

        if let TopicDecision::ChangeTopic { topic } = &resolution.decision {
            metrics::counter!("bot_nlu_topic_changes_total").increment(1);
            tracing::info!(
                bot_id = %self.bot_id,
                session_id = %event.session_id,
                topic = %topic,
                intent = evidence.intent().map(|p| p.name.as_str()).unwrap_or("-"),
                confidence = evidence.intent_confidence(),
                "Topic selected"
            );
            let _ = self.events.send(EngineEvent::Resolved {
                bot_id: self.bot_id.clone(),
                session_id: event.session_id.clone(),
                topic: topic.clone(),
                evidence: Arc::clone(&evidence),
            });
        }

        Ok(TurnOutcome {
            resolution,
            evidence,
        })
    }

    fn pipeline(&self) -> Arc<NluPipeline> {
        self.pipeline.read().clone()
    }
}

fn advance(turn: &mut Turn, next: TurnState) {
    if let Err(e) = turn.advance(next) {
        tracing::warn!(error = %e, "Ignoring turn transition");
    }
}

async fn build_pipeline(bot_id: &str, deps: &RuntimeDeps) -> Result<NluPipeline> {
    let intents = deps.definitions.intent_definitions(bot_id).await?;
    let entities = deps.definitions.entity_definitions(bot_id).await?;
    let pipeline = NluPipeline::build(intents, &entities);

    for skipped in pipeline.skipped_entities() {
        tracing::warn!(bot_id, error = %skipped, "Entity not available");
    }
    Ok(pipeline)
}

/// Mounted runtimes by bot id
#[derive(Default)]
pub struct BotRegistry {
    runtimes: DashMap<String, Arc<BotRuntime>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a bot, replacing (and unmounting) any previous runtime
    pub async fn mount(&self, bot_id: &str, deps: RuntimeDeps) -> Result<Arc<BotRuntime>> {
        let runtime = BotRuntime::mount(bot_id, deps).await?;
        if let Some(previous) = self.runtimes.insert(bot_id.to_string(), runtime.clone()) {
            previous.unmount();
        }
        Ok(runtime)
    }

    pub fn unmount(&self, bot_id: &str) -> Result<()> {
        let (_, runtime) = self
            .runtimes
            .remove(bot_id)
            .ok_or_else(|| NluError::BotNotMounted(bot_id.to_string()))?;
        runtime.unmount();
        Ok(())
    }

    pub fn get(&self, bot_id: &str) -> Result<Arc<BotRuntime>> {
        self.runtimes
            .get(bot_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| NluError::BotNotMounted(bot_id.to_string()))
    }

    /// Route an event to its bot's runtime
    pub async fn process_event(&self, event: IncomingEvent) -> Result<TurnOutcome> {
        let runtime = self.get(&event.bot_id)?;
        runtime.process_event(event).await
    }

    pub fn bot_ids(&self) -> Vec<String> {
        self.runtimes.iter().map(|r| r.key().clone()).collect()
    }
}
