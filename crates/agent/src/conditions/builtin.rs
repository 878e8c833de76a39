//! Built-in condition kinds

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use bot_nlu_core::{ConditionSpec, Evidence};

use super::{ConditionDefinition, ConditionError};

pub(super) fn definitions() -> Vec<ConditionDefinition> {
    vec![
        ConditionDefinition::new("always", always).with_description("Always holds"),
        ConditionDefinition::new("user_intent_is", user_intent_is)
            .with_description("The predicted intent is `intent`, optionally above `min_confidence`")
            .with_priority(10)
            .referencing_intent(),
        ConditionDefinition::new("user_intent_in", user_intent_in)
            .with_description("The predicted intent is one of `intents`")
            .with_priority(10)
            .referencing_intent(),
        ConditionDefinition::new("intent_context_is", intent_context_is)
            .with_description("The predicted intent resolved to `context`")
            .with_priority(5)
            .referencing_intent(),
        ConditionDefinition::new("exact_intent_match", exact_intent_match)
            .with_description("The intent came from an exact utterance match")
            .with_priority(20)
            .referencing_intent(),
        ConditionDefinition::new("extracted_entity", extracted_entity)
            .with_description("An `entity` was extracted, optionally with canonical `value`")
            .with_priority(5),
        ConditionDefinition::new("context_variable_equals", context_variable_equals)
            .with_description("Session variable `name` equals `value`")
            .with_priority(5),
        ConditionDefinition::new("current_topic_is", current_topic_is)
            .with_description("The conversation is on `topic`")
            .with_priority(1),
        ConditionDefinition::new("raw_text_matches", raw_text_matches)
            .with_description("The utterance matches the case-insensitive `pattern`")
            .with_priority(5),
    ]
}

fn always(_: &ConditionSpec, _: &Evidence) -> Result<bool, ConditionError> {
    Ok(true)
}

fn user_intent_is(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let expected = required_str(spec, "intent")?;
    let min_confidence = optional_f32(spec, "min_confidence")?.unwrap_or(0.0);

    Ok(evidence
        .intent()
        .map_or(false, |p| p.name == expected && p.confidence >= min_confidence))
}

fn user_intent_in(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let expected = required_str_list(spec, "intents")?;
    Ok(evidence
        .intent()
        .map_or(false, |p| expected.iter().any(|name| *name == p.name)))
}

fn intent_context_is(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let expected = required_str(spec, "context")?;
    Ok(evidence
        .intent()
        .and_then(|p| p.context.as_deref())
        .map_or(false, |ctx| ctx == expected))
}

fn exact_intent_match(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    if !evidence.understanding.exact_match {
        return Ok(false);
    }
    match spec.str_param("intent") {
        Some(expected) => Ok(evidence.intent().map_or(false, |p| p.name == expected)),
        None => Ok(evidence.intent().is_some()),
    }
}

fn extracted_entity(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let entity = required_str(spec, "entity")?;
    let value = spec.str_param("value");

    Ok(evidence
        .entities_named(entity)
        .any(|e| value.map_or(true, |v| e.value.eq_ignore_ascii_case(v))))
}

fn context_variable_equals(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let name = required_str(spec, "name")?;
    let expected = spec
        .params
        .get("value")
        .ok_or_else(|| ConditionError::MissingParam("value".into()))?;

    Ok(evidence.variable(name) == Some(expected))
}

fn current_topic_is(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let topic = required_str(spec, "topic")?;
    Ok(evidence.context.current_topic.as_deref() == Some(topic))
}

/// Distinct `raw_text_matches` patterns kept compiled
const PATTERN_CACHE_CAPACITY: usize = 256;

/// Compiled patterns, including the compile error of malformed ones
static PATTERNS: Lazy<DashMap<String, Result<Regex, String>>> = Lazy::new(DashMap::new);

fn raw_text_matches(spec: &ConditionSpec, evidence: &Evidence) -> Result<bool, ConditionError> {
    let pattern = required_str(spec, "pattern")?;
    let regex = compiled_pattern(pattern)?;
    Ok(regex.is_match(&evidence.text))
}

fn compiled_pattern(pattern: &str) -> Result<Regex, ConditionError> {
    if let Some(cached) = PATTERNS.get(pattern) {
        return cached
            .value()
            .clone()
            .map_err(|e| ConditionError::invalid("pattern", e));
    }

    let compiled = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| e.to_string());
    if PATTERNS.len() >= PATTERN_CACHE_CAPACITY {
        PATTERNS.clear();
    }
    PATTERNS.insert(pattern.to_string(), compiled.clone());
    compiled.map_err(|e| ConditionError::invalid("pattern", e))
}

fn required_str<'a>(spec: &'a ConditionSpec, name: &str) -> Result<&'a str, ConditionError> {
    match spec.params.get(name) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ConditionError::invalid(name, "expected a string")),
        None => Err(ConditionError::MissingParam(name.to_string())),
    }
}

fn required_str_list<'a>(spec: &'a ConditionSpec, name: &str) -> Result<Vec<&'a str>, ConditionError> {
    let values = spec
        .params
        .get(name)
        .ok_or_else(|| ConditionError::MissingParam(name.to_string()))?
        .as_array()
        .ok_or_else(|| ConditionError::invalid(name, "expected a list"))?;

    values
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| ConditionError::invalid(name, "expected a list of strings"))
        })
        .collect()
}

fn optional_f32(spec: &ConditionSpec, name: &str) -> Result<Option<f32>, ConditionError> {
    match spec.params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(|f| Some(f as f32))
            .ok_or_else(|| ConditionError::invalid(name, "expected a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_nlu_core::{
        ConversationContext, EntityType, ExtractedEntity, Prediction, Understanding,
    };
    use serde_json::json;

    fn evidence(intent: Option<Prediction>) -> Evidence {
        let understanding = Understanding {
            intent,
            entities: vec![ExtractedEntity {
                name: "color".into(),
                entity_type: EntityType::List,
                source: "crimson".into(),
                start: 7,
                end: 14,
                confidence: 1.0,
                value: "red".into(),
            }],
            ..Default::default()
        };
        let mut context = ConversationContext::on_topic("shopping");
        context.variables.insert("tier".into(), json!("gold"));
        Evidence::new("I like crimson shoes", understanding, context)
    }

    fn greet(confidence: f32) -> Option<Prediction> {
        Some(Prediction::new("greet", confidence).with_context(Some("global".into())))
    }

    #[test]
    fn test_user_intent_is() {
        let spec = ConditionSpec::new("user_intent_is").param("intent", "greet");
        assert_eq!(user_intent_is(&spec, &evidence(greet(0.7))), Ok(true));
        assert_eq!(user_intent_is(&spec, &evidence(None)), Ok(false));

        let strict = spec.param("min_confidence", 0.9);
        assert_eq!(user_intent_is(&strict, &evidence(greet(0.7))), Ok(false));

        let missing = ConditionSpec::new("user_intent_is");
        assert_eq!(
            user_intent_is(&missing, &evidence(None)),
            Err(ConditionError::MissingParam("intent".into()))
        );
    }

    #[test]
    fn test_user_intent_in() {
        let spec = ConditionSpec::new("user_intent_in").param("intents", json!(["bye", "greet"]));
        assert_eq!(user_intent_in(&spec, &evidence(greet(0.7))), Ok(true));

        let bad = ConditionSpec::new("user_intent_in").param("intents", "greet");
        assert!(user_intent_in(&bad, &evidence(greet(0.7))).is_err());
    }

    #[test]
    fn test_intent_context_is() {
        let spec = ConditionSpec::new("intent_context_is").param("context", "global");
        assert_eq!(intent_context_is(&spec, &evidence(greet(0.7))), Ok(true));
        assert_eq!(intent_context_is(&spec, &evidence(None)), Ok(false));
    }

    #[test]
    fn test_exact_intent_match() {
        let spec = ConditionSpec::new("exact_intent_match").param("intent", "greet");
        let mut ev = evidence(greet(1.0));
        assert_eq!(exact_intent_match(&spec, &ev), Ok(false));

        ev.understanding.exact_match = true;
        assert_eq!(exact_intent_match(&spec, &ev), Ok(true));
    }

    #[test]
    fn test_extracted_entity() {
        let any = ConditionSpec::new("extracted_entity").param("entity", "color");
        let red = any.clone().param("value", "RED");
        let blue = any.clone().param("value", "blue");

        assert_eq!(extracted_entity(&any, &evidence(None)), Ok(true));
        assert_eq!(extracted_entity(&red, &evidence(None)), Ok(true));
        assert_eq!(extracted_entity(&blue, &evidence(None)), Ok(false));
    }

    #[test]
    fn test_context_variable_equals() {
        let spec = ConditionSpec::new("context_variable_equals")
            .param("name", "tier")
            .param("value", "gold");
        assert_eq!(context_variable_equals(&spec, &evidence(None)), Ok(true));

        let other = ConditionSpec::new("context_variable_equals")
            .param("name", "tier")
            .param("value", 3);
        assert_eq!(context_variable_equals(&other, &evidence(None)), Ok(false));
    }

    #[test]
    fn test_current_topic_is() {
        let spec = ConditionSpec::new("current_topic_is").param("topic", "shopping");
        assert_eq!(current_topic_is(&spec, &evidence(None)), Ok(true));
    }

    #[test]
    fn test_raw_text_matches() {
        let spec = ConditionSpec::new("raw_text_matches").param("pattern", r"\bSHOES\b");
        assert_eq!(raw_text_matches(&spec, &evidence(None)), Ok(true));

        let broken = ConditionSpec::new("raw_text_matches").param("pattern", "(");
        assert!(matches!(
            raw_text_matches(&broken, &evidence(None)),
            Err(ConditionError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_patterns_compiled_once() {
        let pattern = r"\border\s+#\d+";
        let spec = ConditionSpec::new("raw_text_matches").param("pattern", pattern);
        assert_eq!(raw_text_matches(&spec, &evidence(None)), Ok(false));
        assert!(PATTERNS.contains_key(pattern));
        assert_eq!(compiled_pattern(pattern).unwrap().as_str(), pattern);

        // Malformed patterns are remembered as errors
        assert!(compiled_pattern("[unclosed").is_err());
        assert!(matches!(
            PATTERNS.get("[unclosed").map(|cached| cached.is_err()),
            Some(true)
        ));
        assert!(compiled_pattern("[unclosed").is_err());
    }
}
