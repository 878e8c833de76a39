//! Text processing for the bot NLU core
//!
//! Features:
//! - Utterance normalization shared by deterministic matchers
//! - Exact utterance-to-intent matching
//! - Pattern and list entity extraction with located spans

pub mod entities;
pub mod exact_match;
pub mod normalization;

pub use entities::{
    extract_entities, extract_list_entities, extract_pattern_entities, CompiledEntities,
};
pub use exact_match::ExactMatcher;
pub use normalization::normalize_utterance;
