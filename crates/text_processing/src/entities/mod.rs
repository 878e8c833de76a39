//! Entity Extraction
//!
//! Extracts located entities from free text:
//! - Pattern entities: one user regex per definition
//! - List entities: canonical values with synonyms, reported under the
//!   canonical value
//!
//! # Example
//!
//! ```ignore
//! use bot_nlu_core::{EntityDefinition, EntityOccurrence};
//! use bot_nlu_text_processing::entities::CompiledEntities;
//!
//! let defs = vec![EntityDefinition::list(
//!     "color",
//!     vec![EntityOccurrence::new("red", ["crimson"])],
//! )];
//! let compiled = CompiledEntities::compile(&defs);
//! let entities = compiled.extract("I like crimson shoes");
//!
//! assert_eq!(entities[0].value, "red");
//! assert_eq!((entities[0].start, entities[0].end), (7, 14));
//! ```

mod scanner;

pub use scanner::{scan, Span};

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use bot_nlu_core::{
    EntityDefinition, EntityKind, EntityOccurrence, EntityType, ExtractedEntity, NluError,
};

/// Confidence of every deterministic match
pub const DETERMINISTIC_CONFIDENCE: f32 = 1.0;

/// One compiled regex and what its matches are reported as
struct Matcher {
    entity: String,
    entity_type: EntityType,
    /// Canonical value for list occurrences, `None` for patterns
    value: Option<String>,
    regex: Regex,
    /// Position of the owning definition
    order: usize,
}

/// Entity definitions compiled once, applied to many utterances
pub struct CompiledEntities {
    matchers: Vec<Matcher>,
    skipped: Vec<NluError>,
}

impl CompiledEntities {
    /// Compile every definition. Malformed patterns are logged and skipped;
    /// they never fail the whole set.
    pub fn compile(definitions: &[EntityDefinition]) -> Self {
        let mut matchers = Vec::new();
        let mut skipped = Vec::new();

        for (order, def) in definitions.iter().enumerate() {
            match &def.kind {
                EntityKind::Pattern {
                    pattern,
                    case_sensitive,
                    ..
                } => match compile_pattern(&def.name, pattern, *case_sensitive) {
                    Ok(regex) => matchers.push(Matcher {
                        entity: def.name.clone(),
                        entity_type: EntityType::Pattern,
                        value: None,
                        regex,
                        order,
                    }),
                    Err(err) => {
                        tracing::warn!(entity = %def.name, error = %err, "Skipping entity");
                        skipped.push(err);
                    }
                },
                EntityKind::List { occurrences } => {
                    for occurrence in occurrences {
                        match compile_occurrence(&def.name, occurrence) {
                            Ok(Some(regex)) => matchers.push(Matcher {
                                entity: def.name.clone(),
                                entity_type: EntityType::List,
                                value: Some(occurrence.name.clone()),
                                regex,
                                order,
                            }),
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(entity = %def.name, error = %err, "Skipping occurrence");
                                skipped.push(err);
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(
            definitions = definitions.len(),
            matchers = matchers.len(),
            skipped = skipped.len(),
            "Compiled entities"
        );

        Self { matchers, skipped }
    }

    /// Extract all entities, sorted by start offset then definition order
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        self.extract_where(text, |_| true)
    }

    /// Errors for definitions that could not be compiled
    pub fn skipped(&self) -> &[NluError] {
        &self.skipped
    }

    /// Number of compiled regexes
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    fn extract_where(&self, text: &str, keep: impl Fn(EntityType) -> bool) -> Vec<ExtractedEntity> {
        let mut found: Vec<(usize, ExtractedEntity)> = Vec::new();

        for matcher in self.matchers.iter().filter(|m| keep(m.entity_type)) {
            for span in scan(&matcher.regex, text) {
                let value = matcher
                    .value
                    .clone()
                    .unwrap_or_else(|| span.source.to_string());
                found.push((
                    matcher.order,
                    ExtractedEntity {
                        name: matcher.entity.clone(),
                        entity_type: matcher.entity_type,
                        source: span.source.to_string(),
                        start: span.start,
                        end: span.end,
                        confidence: DETERMINISTIC_CONFIDENCE,
                        value,
                    },
                ));
            }
        }

        // Stable: equal keys keep matcher order
        found.sort_by_key(|(order, entity)| (entity.start, *order));
        found.into_iter().map(|(_, entity)| entity).collect()
    }
}

/// Extract pattern entities from `text`
pub fn extract_pattern_entities(text: &str, definitions: &[EntityDefinition]) -> Vec<ExtractedEntity> {
    CompiledEntities::compile(definitions).extract_where(text, |t| t == EntityType::Pattern)
}

/// Extract list entities from `text`, tagged with their canonical value
pub fn extract_list_entities(text: &str, definitions: &[EntityDefinition]) -> Vec<ExtractedEntity> {
    CompiledEntities::compile(definitions).extract_where(text, |t| t == EntityType::List)
}

/// Extract pattern and list entities from `text`
pub fn extract_entities(text: &str, definitions: &[EntityDefinition]) -> Vec<ExtractedEntity> {
    CompiledEntities::compile(definitions).extract(text)
}

fn compile_pattern(entity: &str, pattern: &str, case_sensitive: bool) -> Result<Regex, NluError> {
    if pattern.is_empty() {
        return Err(NluError::MalformedPattern {
            entity: entity.to_string(),
            reason: "empty pattern".into(),
        });
    }

    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| NluError::MalformedPattern {
            entity: entity.to_string(),
            reason: e.to_string(),
        })
}

/// Alternation over the canonical value and its synonyms, or `None` when
/// the occurrence has no usable term
fn compile_occurrence(entity: &str, occurrence: &EntityOccurrence) -> Result<Option<Regex>, NluError> {
    let Some(alternation) = list_alternation(occurrence) else {
        return Ok(None);
    };

    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| NluError::MalformedPattern {
            entity: entity.to_string(),
            reason: e.to_string(),
        })
}

/// Build `(?:\bterm\b|...)` with longer terms first so a synonym that is a
/// prefix of another never shadows it
pub fn list_alternation(occurrence: &EntityOccurrence) -> Option<String> {
    let mut seen = HashSet::new();
    let mut terms: Vec<&str> = occurrence
        .terms()
        .map(str::trim)
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect();
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

    if terms.is_empty() {
        return None;
    }

    let branches: Vec<String> = terms.iter().map(|term| bounded(term)).collect();
    Some(format!("(?:{})", branches.join("|")))
}

fn bounded(term: &str) -> String {
    let is_word = |c: Option<char>| c.map_or(false, |c| c.is_alphanumeric() || c == '_');
    let mut out = String::new();
    if is_word(term.chars().next()) {
        out.push_str(r"\b");
    }
    out.push_str(&regex::escape(term));
    if is_word(term.chars().last()) {
        out.push_str(r"\b");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> EntityDefinition {
        EntityDefinition::list(
            "color",
            vec![
                EntityOccurrence::new("red", ["crimson", "scarlet"]),
                EntityOccurrence::new("blue", ["navy", "navy blue"]),
            ],
        )
    }

    #[test]
    fn test_list_entity_canonical_value() {
        let entities = extract_list_entities("I like crimson shoes", &[colors()]);

        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.name, "color");
        assert_eq!(e.entity_type, EntityType::List);
        assert_eq!(e.value, "red");
        assert_eq!(e.source, "crimson");
        assert_eq!((e.start, e.end), (7, 14));
        assert_eq!(e.confidence, 1.0);
    }

    #[test]
    fn test_extracted_entity_json() {
        let entities = extract_entities("crimson", &[colors()]);
        let json = serde_json::to_value(&entities[0]).unwrap();

        assert_eq!(json["type"], "list");
        assert_eq!(json["value"], "red");
        assert_eq!(json["end"], 7);
    }

    #[test]
    fn test_list_entity_prefers_longest_synonym() {
        let entities = extract_list_entities("a navy blue coat", &[colors()]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].source, "navy blue");
        assert_eq!(entities[0].value, "blue");
    }

    #[test]
    fn test_list_entity_word_boundaries() {
        // "red" inside "bored" is not a color
        assert!(extract_list_entities("I am bored", &[colors()]).is_empty());
        assert_eq!(extract_list_entities("RED, then Red", &[colors()]).len(), 2);
    }

    #[test]
    fn test_list_terms_are_escaped() {
        let def = EntityDefinition::list("lang", vec![EntityOccurrence::new("c++", ["cpp"])]);
        let entities = extract_list_entities("I write C++ daily", &[def]);

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].source, "C++");
        assert_eq!(entities[0].value, "c++");
    }

    #[test]
    fn test_pattern_entities_all_occurrences() {
        let def = EntityDefinition::pattern("zip", r"\d{5}");
        let entities = extract_pattern_entities("from 75001 to 10115", &[def]);

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].value, "75001");
        assert_eq!((entities[1].start, entities[1].end), (14, 19));
    }

    #[test]
    fn test_pattern_case_sensitivity() {
        let insensitive = EntityDefinition::pattern("code", "ab");
        let sensitive = EntityDefinition {
            name: "strict".into(),
            kind: EntityKind::Pattern {
                pattern: "ab".into(),
                case_sensitive: true,
                examples: vec![],
            },
        };

        let entities = extract_pattern_entities("AB ab", &[insensitive, sensitive]);
        let strict: Vec<_> = entities.iter().filter(|e| e.name == "strict").collect();
        assert_eq!(entities.len(), 3);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].start, 3);
    }

    #[test]
    fn test_zero_length_pattern_terminates() {
        let def = EntityDefinition::pattern("optional", r"z*");
        let text = "no zebra here";
        let entities = extract_pattern_entities(text, &[def]);

        assert_eq!(entities.len(), 1);
        assert!(entities
            .iter()
            .all(|e| e.start < e.end && e.end <= text.chars().count()));
    }

    #[test]
    fn test_malformed_pattern_is_skipped() {
        let defs = vec![
            EntityDefinition::pattern("broken", "(unclosed"),
            EntityDefinition::pattern("zip", r"\d{5}"),
        ];
        let compiled = CompiledEntities::compile(&defs);

        assert_eq!(compiled.skipped().len(), 1);
        assert!(matches!(
            &compiled.skipped()[0],
            NluError::MalformedPattern { entity, .. } if entity == "broken"
        ));
        assert_eq!(compiled.extract("zip 12345").len(), 1);
    }

    #[test]
    fn test_results_sorted_by_start_then_definition() {
        let defs = vec![
            EntityDefinition::pattern("word", r"[a-z]+"),
            colors(),
            EntityDefinition::pattern("number", r"\d+"),
        ];
        let entities = extract_entities("7 red", &defs);

        let names: Vec<_> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["number", "word", "color"]);
    }

    #[test]
    fn test_empty_occurrence_ignored() {
        let def = EntityDefinition::list("x", vec![EntityOccurrence::new(" ", Vec::<String>::new())]);
        let compiled = CompiledEntities::compile(&[def]);
        assert!(compiled.is_empty());
        assert!(compiled.skipped().is_empty());
    }

    #[test]
    fn test_alternation_shape() {
        let occ = EntityOccurrence::new("ny", ["New York", "NY", "big apple"]);
        let alt = list_alternation(&occ).unwrap();
        assert_eq!(alt, r"(?:\bbig apple\b|\bNew York\b|\bny\b)");
    }
}
