//! Dialog decision core
//!
//! Turns an incoming utterance into a topic decision:
//! - Understanding: exact match, entity extraction, intent classification
//! - Conditions: pluggable predicates over the turn evidence
//! - Decision engine: eligibility and ranking of topics
//! - Runtime: per-bot state, per-session serialization, engine events

pub mod conditions;
pub mod engine;
pub mod runtime;
pub mod topics;
pub mod turn;
pub mod understanding;

pub use conditions::{ConditionDefinition, ConditionError, ConditionFn, ConditionRegistry};
pub use engine::{DecisionEngine, RankedTopic, RejectedTopic, Resolution, TopicDecision};
pub use runtime::{BotRegistry, BotRuntime, RuntimeDeps, TurnOutcome};
pub use topics::{TopicCache, TopicSnapshot};
pub use turn::{EngineEvent, Turn, TurnError, TurnState};
pub use understanding::NluPipeline;
