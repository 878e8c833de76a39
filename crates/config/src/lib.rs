//! Configuration for the bot NLU core
//!
//! - `settings`: layered runtime settings (defaults, file, environment)
//! - `constants`: defaults shared across crates
//! - `bot`: bot definition files (intents, entities, topics)
//! - `store`: in-memory implementations of the collaborator traits

pub mod bot;
pub mod constants;
pub mod settings;
pub mod store;

pub use bot::{BotDefinition, BotDefinitionError};
pub use settings::{BackendKind, ClassifierSettings, EngineSettings, LoggingSettings, NluSettings};
pub use store::InMemoryBotStore;
