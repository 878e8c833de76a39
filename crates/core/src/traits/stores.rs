//! External collaborator interfaces
//!
//! The core never persists anything itself. It reads intent/entity
//! definitions, topics and conversation context through these traits, and the
//! host decides where they live.
//!
//! # Example
//!
//! ```ignore
//! let intents = store.intent_definitions("support-bot").await?;
//! let topics = registry.list_topics("support-bot").await?;
//! let context = sessions.context("support-bot", "session-42").await?;
//! ```

use async_trait::async_trait;

use crate::domain::{ConversationContext, EntityDefinition, IntentDefinition, Topic};
use crate::Result;

/// Read-only store of intent and entity definitions per bot
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Intents in definition order
    async fn intent_definitions(&self, bot_id: &str) -> Result<Vec<IntentDefinition>>;

    /// Entities in definition order
    async fn entity_definitions(&self, bot_id: &str) -> Result<Vec<EntityDefinition>>;
}

/// Topic registry populated by plugins
#[async_trait]
pub trait TopicRegistry: Send + Sync {
    /// Topics in registration order
    async fn list_topics(&self, bot_id: &str) -> Result<Vec<Topic>>;
}

/// Read access to the session store
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Current context of a conversation; a fresh session yields the default
    async fn context(&self, bot_id: &str, session_id: &str) -> Result<ConversationContext>;
}
