//! Domain model
//!
//! Plain data shared by every stage: definitions authored for a bot, what the
//! NLU stages produce per utterance, and the topics the engine selects between.

mod entity;
mod event;
mod intent;
mod topic;

pub use entity::*;
pub use event::*;
pub use intent::*;
pub use topic::*;
