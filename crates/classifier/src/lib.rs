//! Statistical intent classification
//!
//! Features:
//! - Label-prefixed training-set format and engine output parsing
//! - Content-derived model ids
//! - Pluggable backends: in-process naive Bayes or an external binary
//! - Per-bot, per-language classifier with atomic model swap
//! - Background training keyed by (bot, language) with cancellation

pub mod backend;
pub mod classifier;
pub mod model_id;
pub mod scheduler;
pub mod training_set;

pub use backend::{
    backend_from_settings, ClassifierBackend, InProcessBackend, SubprocessBackend, TrainedModel,
};
pub use classifier::{ActiveModel, IntentClassifier, ModelArtifact};
pub use model_id::ModelId;
pub use scheduler::{TrainingHandle, TrainingKey, TrainingScheduler};
pub use training_set::{parse_predictions, TrainingExample, TrainingSet, LABEL_PREFIX};
