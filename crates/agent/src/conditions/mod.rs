//! Condition Registry
//!
//! Maps a condition kind to a pure evaluator over the turn evidence. Plugins
//! register kinds as plain function pointers together with a declared
//! priority and whether the kind looks at the predicted intent.
//!
//! Evaluation fails closed: an evaluator error or panic makes the condition
//! not hold, and is reported back instead of aborting resolution.

mod builtin;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

use bot_nlu_core::{ConditionSpec, Evidence, NluError};

/// Evaluator signature: parameters come from the topic's condition spec
pub type ConditionFn = fn(&ConditionSpec, &Evidence) -> Result<bool, ConditionError>;

/// Errors raised by evaluators
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

impl ConditionError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A registered condition kind
#[derive(Clone)]
pub struct ConditionDefinition {
    pub kind: String,
    pub description: String,
    /// Default priority of topics using this condition
    pub priority: i32,
    /// Whether the intent confidence should break priority ties
    pub references_intent: bool,
    pub evaluate: ConditionFn,
}

impl ConditionDefinition {
    pub fn new(kind: impl Into<String>, evaluate: ConditionFn) -> Self {
        Self {
            kind: kind.into(),
            description: String::new(),
            priority: 0,
            references_intent: false,
            evaluate,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn referencing_intent(mut self) -> Self {
        self.references_intent = true;
        self
    }
}

impl std::fmt::Debug for ConditionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionDefinition")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("references_intent", &self.references_intent)
            .finish()
    }
}

/// Registered condition kinds, shared by every mounted bot
#[derive(Default)]
pub struct ConditionRegistry {
    definitions: RwLock<HashMap<String, ConditionDefinition>>,
}

impl ConditionRegistry {
    /// Registry without any kind
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for definition in builtin::definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Register a kind, replacing any previous definition of it
    pub fn register(&self, definition: ConditionDefinition) -> Option<ConditionDefinition> {
        tracing::debug!(kind = %definition.kind, priority = definition.priority, "Registering condition");
        self.definitions
            .write()
            .insert(definition.kind.clone(), definition)
    }

    pub fn unregister(&self, kind: &str) -> Option<ConditionDefinition> {
        self.definitions.write().remove(kind)
    }

    pub fn get(&self, kind: &str) -> Option<ConditionDefinition> {
        self.definitions.read().get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.definitions.read().contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.definitions.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Priority of a condition: its own override, else the kind's default
    pub fn priority_of(&self, spec: &ConditionSpec) -> Option<i32> {
        let declared = self.definitions.read().get(&spec.kind).map(|d| d.priority)?;
        Some(spec.priority.unwrap_or(declared))
    }

    /// Whether the kind looks at the predicted intent
    pub fn references_intent(&self, kind: &str) -> bool {
        self.definitions
            .read()
            .get(kind)
            .map(|d| d.references_intent)
            .unwrap_or(false)
    }

    /// Evaluate one condition against the evidence
    pub fn evaluate(&self, spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, NluError> {
        // Copy the fn pointer out so no lock is held while user code runs
        let evaluate = self
            .definitions
            .read()
            .get(&spec.kind)
            .map(|d| d.evaluate)
            .ok_or_else(|| NluError::UnknownCondition(spec.kind.clone()))?;

        match catch_unwind(AssertUnwindSafe(|| evaluate(spec, evidence))) {
            Ok(Ok(holds)) => Ok(holds),
            Ok(Err(e)) => Err(NluError::ConditionEvaluation {
                kind: spec.kind.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(NluError::ConditionEvaluation {
                kind: spec.kind.clone(),
                reason: "evaluator panicked".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_nlu_core::{ConversationContext, Understanding};

    fn evidence() -> Evidence {
        Evidence::new("hello", Understanding::default(), ConversationContext::default())
    }

    fn panicking(_: &ConditionSpec, _: &Evidence) -> Result<bool, ConditionError> {
        panic!("plugin bug")
    }

    fn failing(_: &ConditionSpec, _: &Evidence) -> Result<bool, ConditionError> {
        Err(ConditionError::Failed("backend unavailable".into()))
    }

    #[test]
    fn test_unknown_kind() {
        let registry = ConditionRegistry::new();
        let err = registry
            .evaluate(&ConditionSpec::new("nope"), &evidence())
            .unwrap_err();
        assert!(matches!(err, NluError::UnknownCondition(k) if k == "nope"));
    }

    #[test]
    fn test_panic_fails_closed() {
        let registry = ConditionRegistry::new();
        registry.register(ConditionDefinition::new("boom", panicking));

        let err = registry
            .evaluate(&ConditionSpec::new("boom"), &evidence())
            .unwrap_err();
        assert!(matches!(err, NluError::ConditionEvaluation { .. }));
    }

    #[test]
    fn test_error_is_reported() {
        let registry = ConditionRegistry::new();
        registry.register(ConditionDefinition::new("flaky", failing));

        let err = registry
            .evaluate(&ConditionSpec::new("flaky"), &evidence())
            .unwrap_err();
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[test]
    fn test_priority_override() {
        let registry = ConditionRegistry::with_builtins();
        let declared = registry.get("user_intent_is").unwrap().priority;

        let spec = ConditionSpec::new("user_intent_is");
        assert_eq!(registry.priority_of(&spec), Some(declared));
        assert_eq!(registry.priority_of(&spec.with_priority(99)), Some(99));
        assert_eq!(registry.priority_of(&ConditionSpec::new("nope")), None);
    }

    #[test]
    fn test_register_replaces() {
        let registry = ConditionRegistry::with_builtins();
        let before = registry.kinds().len();

        let old = registry.register(ConditionDefinition::new("always", failing).with_priority(3));
        assert!(old.is_some());
        assert_eq!(registry.kinds().len(), before);
        assert!(registry
            .evaluate(&ConditionSpec::new("always"), &evidence())
            .is_err());
    }
}
