//! In-Memory Collaborator Store
//!
//! Serves bot definitions and session contexts from memory. Every update
//! replaces a whole `Arc<BotDefinition>`, so a reader holding the previous
//! snapshot keeps a consistent view.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use bot_nlu_core::{
    ContextStore, ConversationContext, DefinitionStore, EntityDefinition, IntentDefinition,
    NluError, Result, Topic, TopicRegistry,
};

use crate::bot::BotDefinition;

/// Definition store, topic registry and session store backed by memory
#[derive(Default)]
pub struct InMemoryBotStore {
    bots: RwLock<HashMap<String, Arc<BotDefinition>>>,
    sessions: RwLock<HashMap<(String, String), ConversationContext>>,
}

impl InMemoryBotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one bot
    pub fn with_bot(definition: BotDefinition) -> Self {
        let store = Self::new();
        store.insert_bot(definition);
        store
    }

    /// Insert or replace a bot definition
    pub fn insert_bot(&self, definition: BotDefinition) {
        let bot_id = definition.bot_id.clone();
        self.bots.write().insert(bot_id, Arc::new(definition));
    }

    /// Remove a bot and all its sessions
    pub fn remove_bot(&self, bot_id: &str) -> Option<Arc<BotDefinition>> {
        self.sessions.write().retain(|(bot, _), _| bot != bot_id);
        self.bots.write().remove(bot_id)
    }

    /// Current snapshot of a bot definition
    pub fn bot(&self, bot_id: &str) -> Option<Arc<BotDefinition>> {
        self.bots.read().get(bot_id).cloned()
    }

    /// Replace the topics of a bot, as a flow edit would
    pub fn replace_topics(&self, bot_id: &str, topics: Vec<Topic>) -> Result<()> {
        self.update(bot_id, |def| def.topics = topics)
    }

    /// Replace the intents of a bot
    pub fn replace_intents(&self, bot_id: &str, intents: Vec<IntentDefinition>) -> Result<()> {
        self.update(bot_id, |def| def.intents = intents)
    }

    /// Replace the entities of a bot
    pub fn replace_entities(&self, bot_id: &str, entities: Vec<EntityDefinition>) -> Result<()> {
        self.update(bot_id, |def| def.entities = entities)
    }

    /// Write a session context, as the external dialog executor would
    pub fn set_context(&self, bot_id: &str, session_id: &str, context: ConversationContext) {
        self.sessions
            .write()
            .insert((bot_id.to_string(), session_id.to_string()), context);
    }

    fn update(&self, bot_id: &str, apply: impl FnOnce(&mut BotDefinition)) -> Result<()> {
        let mut bots = self.bots.write();
        let current = bots.get(bot_id).ok_or_else(|| unknown_bot(bot_id))?;
        let mut next = BotDefinition::clone(current);
        apply(&mut next);
        bots.insert(bot_id.to_string(), Arc::new(next));
        Ok(())
    }

    fn require(&self, bot_id: &str) -> Result<Arc<BotDefinition>> {
        self.bot(bot_id).ok_or_else(|| unknown_bot(bot_id))
    }
}

fn unknown_bot(bot_id: &str) -> NluError {
    NluError::Store(format!("unknown bot '{}'", bot_id))
}

#[async_trait]
impl DefinitionStore for InMemoryBotStore {
    async fn intent_definitions(&self, bot_id: &str) -> Result<Vec<IntentDefinition>> {
        Ok(self.require(bot_id)?.intents.clone())
    }

    async fn entity_definitions(&self, bot_id: &str) -> Result<Vec<EntityDefinition>> {
        Ok(self.require(bot_id)?.entities.clone())
    }
}

#[async_trait]
impl TopicRegistry for InMemoryBotStore {
    async fn list_topics(&self, bot_id: &str) -> Result<Vec<Topic>> {
        Ok(self.require(bot_id)?.topics.clone())
    }
}

#[async_trait]
impl ContextStore for InMemoryBotStore {
    async fn context(&self, bot_id: &str, session_id: &str) -> Result<ConversationContext> {
        Ok(self
            .sessions
            .read()
            .get(&(bot_id.to_string(), session_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
