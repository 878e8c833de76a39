//! Layered settings
//!
//! Resolution order, later layers win:
//! 1. Built-in defaults
//! 2. Optional settings file (YAML, TOML or JSON, by extension)
//! 3. `BOT_NLU__*` environment variables

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bot_nlu_core::NluError;

use crate::constants::{classifier, engine, env};

/// Which classifier engine implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Naive Bayes model running inside the process
    #[default]
    InProcess,
    /// External fastText-compatible binary driven through files
    Subprocess,
}

/// Statistical classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub backend: BackendKind,
    /// Executable used by the subprocess backend
    pub binary_path: PathBuf,
    pub epochs: u32,
    pub learning_rate: f32,
    pub word_ngrams: u32,
    /// Laplace smoothing of the in-process model
    pub smoothing: f32,
    /// Candidates requested per prediction
    pub num_candidates: usize,
    /// Confidence of the "none" sentinel
    pub none_confidence: f32,
    /// Parent directory for training/model scratch space; system temp when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            binary_path: PathBuf::from(classifier::DEFAULT_BINARY),
            epochs: classifier::DEFAULT_EPOCHS,
            learning_rate: classifier::DEFAULT_LEARNING_RATE,
            word_ngrams: classifier::DEFAULT_WORD_NGRAMS,
            smoothing: classifier::DEFAULT_SMOOTHING,
            num_candidates: classifier::DEFAULT_NUM_CANDIDATES,
            none_confidence: classifier::NONE_CONFIDENCE,
            scratch_dir: None,
        }
    }
}

/// Decision engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Predictions below this confidence count as "no intent"
    pub min_intent_confidence: f32,
    /// Run the exact matcher before the classifier
    pub exact_match: bool,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_intent_confidence: engine::MIN_INTENT_CONFIDENCE,
            exact_match: true,
            event_buffer: engine::EVENT_BUFFER,
        }
    }
}

/// Log output settings, consumed by binaries installing a subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// All settings of the NLU core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NluSettings {
    pub classifier: ClassifierSettings,
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

impl NluSettings {
    /// Load settings from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, NluError> {
        let defaults = Config::try_from(&Self::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading settings file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env::PREFIX)
                .separator(env::SEPARATOR)
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), NluError> {
        let c = &self.classifier;
        if c.num_candidates == 0 {
            return Err(NluError::Config("classifier.num_candidates must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&c.none_confidence) {
            return Err(NluError::Config("classifier.none_confidence must be within [0, 1]".into()));
        }
        if c.learning_rate <= 0.0 || c.smoothing <= 0.0 {
            return Err(NluError::Config(
                "classifier.learning_rate and classifier.smoothing must be positive".into(),
            ));
        }
        if c.epochs == 0 || c.word_ngrams == 0 {
            return Err(NluError::Config("classifier.epochs and classifier.word_ngrams must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.engine.min_intent_confidence) {
            return Err(NluError::Config("engine.min_intent_confidence must be within [0, 1]".into()));
        }
        if self.engine.event_buffer == 0 {
            return Err(NluError::Config("engine.event_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> NluError {
    NluError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = NluSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.classifier.backend, BackendKind::InProcess);
        assert_eq!(settings.classifier.num_candidates, classifier::DEFAULT_NUM_CANDIDATES);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "classifier:\n  backend: subprocess\n  num_candidates: 3\nengine:\n  min_intent_confidence: 0.7\n"
        )
        .unwrap();

        let settings = NluSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.classifier.backend, BackendKind::Subprocess);
        assert_eq!(settings.classifier.num_candidates, 3);
        assert!((settings.engine.min_intent_confidence - 0.7).abs() < 1e-6);
        // Untouched values keep their defaults
        assert!(settings.engine.exact_match);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = NluSettings::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(result, Err(NluError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = NluSettings::default();
        settings.classifier.num_candidates = 0;
        assert!(settings.validate().is_err());

        let mut settings = NluSettings::default();
        settings.engine.min_intent_confidence = 1.5;
        assert!(settings.validate().is_err());
    }
}
