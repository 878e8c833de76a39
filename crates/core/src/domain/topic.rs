//! Topics and their conditions
//!
//! A topic is only data here: a name plus tagged condition variants. The
//! evaluators that give a condition kind its meaning live in the agent crate's
//! condition registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Condition parameters as authored
pub type ConditionParams = Map<String, Value>;

/// One condition attached to a topic: `{ kind, params }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Registered condition kind, e.g. `user_intent_is`
    pub kind: String,
    /// Kind-specific parameters
    #[serde(default)]
    pub params: ConditionParams,
    /// Overrides the priority declared by the condition kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl ConditionSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
            priority: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// String parameter, if present
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// Named unit of dialog purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// All conditions must hold for the topic to be eligible
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.conditions.push(condition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_yaml() {
        let yaml = r#"
name: billing
conditions:
  - kind: user_intent_is
    params:
      intent: pay_bill
    priority: 5
  - kind: always
"#;
        let topic: Topic = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(topic.conditions.len(), 2);
        assert_eq!(topic.conditions[0].str_param("intent"), Some("pay_bill"));
        assert_eq!(topic.conditions[0].priority, Some(5));
        assert!(topic.conditions[1].params.is_empty());
    }

    #[test]
    fn test_condition_builder() {
        let spec = ConditionSpec::new("extracted_entity")
            .param("entity", "color")
            .with_priority(2);
        assert_eq!(spec.str_param("entity"), Some("color"));
        assert_eq!(spec.priority, Some(2));
    }
}
