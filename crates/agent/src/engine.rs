//! Decision Engine
//!
//! Selects the next topic from the evidence of a turn. A topic is eligible
//! when every one of its conditions holds. Eligible topics are ranked by:
//! 1. Priority: the highest priority among its conditions
//! 2. Intent confidence, for topics with an intent-referencing condition
//! 3. Registration order
//!
//! With no eligible topic the conversation stays where it is.

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

use bot_nlu_core::{Evidence, NluError, Topic};

use crate::conditions::ConditionRegistry;

/// What the dialog executor should do after a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TopicDecision {
    /// Move the conversation to `topic`
    ChangeTopic { topic: String },
    /// Keep the current topic, if any
    NoChange { current: Option<String> },
}

/// An eligible topic and its ranking keys
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTopic {
    pub topic: String,
    pub priority: i32,
    /// Set when one of the topic's conditions references the intent
    pub intent_confidence: Option<f32>,
    /// Registration order
    pub order: usize,
}

/// Why a topic was not eligible
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedTopic {
    pub topic: String,
    /// First condition that did not hold; `None` for a topic without conditions
    pub condition: Option<String>,
    /// Set when the condition failed rather than evaluating to false
    pub error: Option<String>,
}

/// Outcome of resolving one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub decision: TopicDecision,
    /// Eligible topics, best first
    pub ranked: Vec<RankedTopic>,
    pub rejected: Vec<RejectedTopic>,
}

impl Resolution {
    /// Topic to change to, if any
    pub fn selected(&self) -> Option<&str> {
        match &self.decision {
            TopicDecision::ChangeTopic { topic } => Some(topic),
            TopicDecision::NoChange { .. } => None,
        }
    }

    /// Rejections caused by failing conditions
    pub fn failures(&self) -> impl Iterator<Item = &RejectedTopic> {
        self.rejected.iter().filter(|r| r.error.is_some())
    }
}

/// Topic resolver over a condition registry
#[derive(Clone)]
pub struct DecisionEngine {
    conditions: Arc<ConditionRegistry>,
}

impl DecisionEngine {
    pub fn new(conditions: Arc<ConditionRegistry>) -> Self {
        Self { conditions }
    }

    pub fn conditions(&self) -> &Arc<ConditionRegistry> {
        &self.conditions
    }

    /// Resolve the next topic. Never fails: a condition that errors makes
    /// its topic ineligible and is reported in `rejected`.
    pub fn resolve(&self, topics: &[Topic], evidence: &Evidence) -> Resolution {
        let mut ranked = Vec::new();
        let mut rejected = Vec::new();

        for (order, topic) in topics.iter().enumerate() {
            match self.check(topic, evidence) {
                Ok(()) => ranked.push(self.rank(topic, order, evidence)),
                Err(rejection) => rejected.push(rejection),
            }
        }

        ranked.sort_by(compare_ranked);

        let current = evidence.context.current_topic.clone();
        let decision = match ranked.first() {
            Some(best) if current.as_deref() != Some(best.topic.as_str()) => {
                TopicDecision::ChangeTopic {
                    topic: best.topic.clone(),
                }
            }
            _ => TopicDecision::NoChange { current },
        };

        tracing::debug!(
            eligible = ranked.len(),
            rejected = rejected.len(),
            decision = ?decision,
            "Resolved topic"
        );

        Resolution {
            decision,
            ranked,
            rejected,
        }
    }

    fn check(&self, topic: &Topic, evidence: &Evidence) -> Result<(), RejectedTopic> {
        if topic.conditions.is_empty() {
            return Err(RejectedTopic {
                topic: topic.name.clone(),
                condition: None,
                error: None,
            });
        }

        for spec in &topic.conditions {
            match self.conditions.evaluate(spec, evidence) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(RejectedTopic {
                        topic: topic.name.clone(),
                        condition: Some(spec.kind.clone()),
                        error: None,
                    })
                }
                Err(e) => {
                    log_failure(&topic.name, &e);
                    return Err(RejectedTopic {
                        topic: topic.name.clone(),
                        condition: Some(spec.kind.clone()),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    fn rank(&self, topic: &Topic, order: usize, evidence: &Evidence) -> RankedTopic {
        let priority = topic
            .conditions
            .iter()
            .filter_map(|spec| self.conditions.priority_of(spec))
            .max()
            .unwrap_or(0);
        let references_intent = topic
            .conditions
            .iter()
            .any(|spec| self.conditions.references_intent(&spec.kind));

        RankedTopic {
            topic: topic.name.clone(),
            priority,
            intent_confidence: references_intent.then(|| evidence.intent_confidence()),
            order,
        }
    }
}

/// Priority desc, then intent confidence desc (referencing topics first),
/// then registration order
fn compare_ranked(a: &RankedTopic, b: &RankedTopic) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.intent_confidence, b.intent_confidence) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.order.cmp(&b.order))
}

fn log_failure(topic: &str, error: &NluError) {
    metrics::counter!("bot_nlu_condition_failures_total").increment(1);
    tracing::warn!(topic, error = %error, "Condition failed, topic not eligible");
}
