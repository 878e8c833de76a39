//! External fastText-compatible binary
//!
//! Training writes the label-prefixed file into the caller's scratch
//! directory and runs `supervised`. Loading copies the artifact to a fresh
//! temporary file owned by the returned model, so a newer load never touches
//! a file an in-flight prediction is reading.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::process::Command;

use bot_nlu_config::ClassifierSettings;
use bot_nlu_core::{NluError, Prediction, Result};

use super::{ClassifierBackend, TrainedModel};
use crate::training_set::{parse_predictions, TrainingSet, LINE_ENDING};

/// Backend driving an external trainer binary
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    binary: PathBuf,
    epochs: u32,
    learning_rate: f32,
    word_ngrams: u32,
    scratch_dir: Option<PathBuf>,
}

impl SubprocessBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let defaults = ClassifierSettings::default();
        Self {
            binary: binary.into(),
            epochs: defaults.epochs,
            learning_rate: defaults.learning_rate,
            word_ngrams: defaults.word_ngrams,
            scratch_dir: None,
        }
    }

    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        Self {
            binary: settings.binary_path.clone(),
            epochs: settings.epochs,
            learning_rate: settings.learning_rate,
            word_ngrams: settings.word_ngrams,
            scratch_dir: settings.scratch_dir.clone(),
        }
    }

    /// Write `bytes` to a fresh scratch file on the blocking pool
    async fn write_temp(&self, suffix: &'static str, bytes: Vec<u8>) -> Result<NamedTempFile> {
        let scratch_dir = self.scratch_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<NamedTempFile> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("bot-nlu-").suffix(suffix);
            let mut file = match &scratch_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(|e| NluError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

#[async_trait]
impl ClassifierBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn train(&self, set: &TrainingSet, workdir: &Path) -> Result<Vec<u8>> {
        let input = workdir.join("train.txt");
        let prefix = workdir.join("model");
        tokio::fs::write(&input, set.render()).await?;

        tracing::debug!(
            binary = %self.binary.display(),
            examples = set.len(),
            workdir = %workdir.display(),
            "Running external trainer"
        );

        let output = Command::new(&self.binary)
            .arg("supervised")
            .arg("-input")
            .arg(&input)
            .arg("-output")
            .arg(&prefix)
            .arg("-epoch")
            .arg(self.epochs.to_string())
            .arg("-lr")
            .arg(self.learning_rate.to_string())
            .arg("-wordNgrams")
            .arg(self.word_ngrams.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                NluError::TrainingFailed(format!("cannot run {}: {}", self.binary.display(), e))
            })?;
        check_status(&output).map_err(NluError::TrainingFailed)?;

        tokio::fs::read(prefix.with_extension("bin"))
            .await
            .map_err(|e| NluError::TrainingFailed(format!("model file missing: {}", e)))
    }

    async fn load(&self, artifact: &[u8]) -> Result<Arc<dyn TrainedModel>> {
        if artifact.is_empty() {
            return Err(NluError::Serialization("empty model artifact".into()));
        }

        let file = self.write_temp(".bin", artifact.to_vec()).await?;

        Ok(Arc::new(ExternalModel {
            backend: self.clone(),
            file,
        }))
    }
}

/// Model file kept alive for as long as anyone holds the model
struct ExternalModel {
    backend: SubprocessBackend,
    file: NamedTempFile,
}

#[async_trait]
impl TrainedModel for ExternalModel {
    async fn predict(&self, text: &str, k: usize) -> Result<Vec<Prediction>> {
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let input = self
            .backend
            .write_temp(".txt", format!("{}{}", line, LINE_ENDING).into_bytes())
            .await?;

        let output = Command::new(&self.backend.binary)
            .arg("predict-prob")
            .arg(self.file.path())
            .arg(input.path())
            .arg(k.max(1).to_string())
            .kill_on_drop(true)
            .output()
            .await?;
        check_status(&output)
            .map_err(|e| NluError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        Ok(parse_predictions(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn check_status(output: &Output) -> std::result::Result<(), String> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!("exited with {}: {}", output.status, stderr.trim()))
}
