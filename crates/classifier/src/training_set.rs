//! Label-prefixed training-set format
//!
//! One example per line: `__label__<intent> <utterance>`, terminated with the
//! platform line ending. The same prefix tags engine output, which is parsed
//! back into predictions here.

use bot_nlu_core::{IntentDefinition, NluError, Prediction, Result};

/// Marks a label token in training files and engine output
pub const LABEL_PREFIX: &str = "__label__";

/// Line terminator used when rendering training files
pub const LINE_ENDING: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// One labeled utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingExample {
    pub label: String,
    pub text: String,
}

/// Labeled utterances of one bot and language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingSet {
    examples: Vec<TrainingExample>,
}

impl TrainingSet {
    /// Collect every utterance of every intent, in definition order
    pub fn from_intents(intents: &[IntentDefinition]) -> Result<Self> {
        let mut examples = Vec::new();

        for intent in intents {
            check_label(&intent.name)?;
            for utterance in &intent.utterances {
                let text = single_line(utterance);
                if text.is_empty() {
                    continue;
                }
                examples.push(TrainingExample {
                    label: intent.name.clone(),
                    text,
                });
            }
        }

        if examples.is_empty() {
            return Err(NluError::TrainingFailed("no utterances to train on".into()));
        }

        Ok(Self { examples })
    }

    /// Parse a rendered training file
    pub fn parse(content: &str) -> Result<Self> {
        let mut examples = Vec::new();

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (label, text) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let label = label.strip_prefix(LABEL_PREFIX).ok_or_else(|| {
                NluError::Serialization(format!("line {}: missing label prefix", number + 1))
            })?;
            examples.push(TrainingExample {
                label: label.to_string(),
                text: single_line(text),
            });
        }

        Ok(Self { examples })
    }

    /// Render to the training file format
    pub fn render(&self) -> String {
        let mut out = String::new();
        for example in &self.examples {
            out.push_str(LABEL_PREFIX);
            out.push_str(&example.label);
            out.push(' ');
            out.push_str(&example.text);
            out.push_str(LINE_ENDING);
        }
        out
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    /// Distinct labels in first-seen order
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for example in &self.examples {
            if !labels.contains(&example.label.as_str()) {
                labels.push(&example.label);
            }
        }
        labels
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Parse engine output of the form `__label__a 0.9 __label__b 0.1`.
///
/// Tokens that do not form a label/probability pair are ignored, so garbage
/// output yields an empty list rather than an error.
pub fn parse_predictions(output: &str) -> Vec<Prediction> {
    let mut predictions = Vec::new();
    let mut tokens = output.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        let Some(label) = token.strip_prefix(LABEL_PREFIX) else {
            continue;
        };
        if label.is_empty() {
            continue;
        }
        let Some(probability) = tokens.peek().and_then(|t| t.parse::<f32>().ok()) else {
            continue;
        };
        tokens.next();
        if probability.is_finite() {
            predictions.push(Prediction::new(label, probability));
        }
    }

    predictions
}

fn check_label(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(NluError::TrainingFailed(format!(
            "intent name '{}' cannot be used as a label",
            name
        )));
    }
    Ok(())
}

/// Collapse all whitespace runs, newlines included, to single spaces
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
