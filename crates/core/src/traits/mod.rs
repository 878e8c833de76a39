//! Collaborator traits

mod stores;

pub use stores::{ContextStore, DefinitionStore, TopicRegistry};
