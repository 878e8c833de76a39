//! bot-nlu
//!
//! Trains intent models for a bot definition and runs utterances through
//! understanding and topic resolution, printing the result as JSON.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use bot_nlu_agent::{BotRuntime, RuntimeDeps, TopicDecision, TurnOutcome};
use bot_nlu_classifier::ModelId;
use bot_nlu_config::{BotDefinition, InMemoryBotStore, LoggingSettings, NluSettings};
use bot_nlu_core::{IncomingEvent, Language};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = NluSettings::load(cli.config.as_deref()).context("loading settings")?;
    init_logging(&settings.logging);

    match cli.command {
        Command::Train {
            bot,
            language,
            output,
        } => train(&bot, language.as_deref(), &output, settings).await,
        Command::Parse {
            bot,
            model,
            language,
            contexts,
            session,
            text,
        } => {
            let session = Session::open(&bot, language.as_deref(), settings, contexts, session).await?;
            match model {
                Some(path) => session.load_model(&path).await?,
                None => session.train().await?,
            }
            match text {
                Some(text) => session.print(&text).await,
                None => session.repl().await,
            }
        }
    }
}

/// Logs go to stderr so stdout stays parseable
fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn train(bot: &Path, language: Option<&str>, output: &Path, settings: NluSettings) -> Result<()> {
    let (runtime, language) = mount(bot, language, settings).await?;
    let artifact = runtime
        .train(&language, None)?
        .wait()
        .await
        .context("training intent classifier")?;

    tokio::fs::write(output, &artifact.bytes)
        .await
        .with_context(|| format!("writing model to {}", output.display()))?;
    tracing::info!(model_id = %artifact.id, path = %output.display(), "Model written");

    println!(
        "{}",
        serde_json::json!({
            "model_id": artifact.id,
            "language": artifact.language,
            "bytes": artifact.bytes.len(),
        })
    );
    Ok(())
}

async fn mount(
    bot: &Path,
    language: Option<&str>,
    settings: NluSettings,
) -> Result<(Arc<BotRuntime>, Language)> {
    let (runtime, language, _) = mount_with_store(bot, language, settings).await?;
    Ok((runtime, language))
}

async fn mount_with_store(
    bot: &Path,
    language: Option<&str>,
    settings: NluSettings,
) -> Result<(Arc<BotRuntime>, Language, Arc<InMemoryBotStore>)> {
    let definition = BotDefinition::load(bot)?;
    let language = match language {
        Some(code) => code.parse::<Language>()?,
        None => definition.default_language.clone(),
    };
    let bot_id = definition.bot_id.clone();

    let store = Arc::new(InMemoryBotStore::with_bot(definition));
    let deps = RuntimeDeps::from_store(store.clone(), settings)
        .with_default_language(language.clone());
    let runtime = BotRuntime::mount(bot_id, deps).await?;
    Ok((runtime, language, store))
}

/// A conversation driven from the terminal
struct Session {
    runtime: Arc<BotRuntime>,
    store: Arc<InMemoryBotStore>,
    language: Language,
    contexts: Vec<String>,
    session_id: String,
}

impl Session {
    async fn open(
        bot: &Path,
        language: Option<&str>,
        settings: NluSettings,
        contexts: Vec<String>,
        session_id: String,
    ) -> Result<Self> {
        let (runtime, language, store) = mount_with_store(bot, language, settings).await?;
        Ok(Self {
            runtime,
            store,
            language,
            contexts,
            session_id,
        })
    }

    async fn load_model(&self, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading model {}", path.display()))?;
        self.runtime
            .load_model(&self.language, &bytes, model_id_for(path))
            .await?;
        Ok(())
    }

    async fn train(&self) -> Result<()> {
        tracing::info!(language = %self.language, "No model given, training");
        self.runtime.train(&self.language, None)?.wait().await?;
        Ok(())
    }

    async fn turn(&self, text: &str) -> Result<TurnOutcome> {
        let event = IncomingEvent::new(self.runtime.bot_id(), &self.session_id, text)
            .with_language(self.language.clone())
            .with_contexts(self.contexts.iter().cloned());
        let outcome = self.runtime.process_event(event).await?;

        // Play the dialog executor: follow the topic change
        if let TopicDecision::ChangeTopic { topic } = outcome.decision() {
            let mut context = outcome.evidence.context.clone();
            context.current_topic = Some(topic.clone());
            self.store
                .set_context(self.runtime.bot_id(), &self.session_id, context);
        }
        Ok(outcome)
    }

    async fn print(&self, text: &str) -> Result<()> {
        let outcome = self.turn(text).await?;
        let json = serde_json::json!({
            "evidence": &*outcome.evidence,
            "resolution": &outcome.resolution,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        Ok(())
    }

    async fn repl(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if let Err(e) = self.print(text).await {
                eprintln!("error: {:#}", e);
            }
        }
        Ok(())
    }
}

fn model_id_for(path: &Path) -> ModelId {
    path.file_stem()
        .map(|stem| ModelId::from(stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| ModelId::from("model"))
}
