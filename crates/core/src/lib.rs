//! Core types for the bot NLU and dialog decision core
//!
//! Holds the domain model, the workspace error type and the traits through
//! which the core talks to its external collaborators (definition store, topic
//! registry, session store).

pub mod domain;
pub mod error;
pub mod language;
pub mod traits;

pub use domain::*;
pub use error::{NluError, Result};
pub use language::Language;
pub use traits::{ContextStore, DefinitionStore, TopicRegistry};
