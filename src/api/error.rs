use thiserror::Error;

use crate::api::stage::Stage;

pub type StorageError = anyhow::Error;

#[derive(Error, Debug)]
pub enum HeadError {
    #[error("the object {0} does not exist")]
    DoesNotExist(String),
    #[error("an error ocurred in the storage backend: {0:?}")]
    Storage(#[from] StorageError),
}

pub type GetError = HeadError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for setting {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum UriError {
    #[error("invalid S3 URI {0:?}: expected s3://<bucket>/<key>")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("missing expected artifact: {0}")]
    ArtifactMissing(String),
    #[error(
        "model validation failed: {metric}={value} < {threshold} (short by {:.6})",
        shortfall(.threshold, .value)
    )]
    MetricBelowThreshold {
        metric: &'static str,
        value: f64,
        threshold: f64,
    },
    #[error("metrics payload at {location} is not valid JSON: {source}")]
    MalformedMetrics {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("an error ocurred in the storage backend: {0:?}")]
    Storage(#[from] StorageError),
}

fn shortfall(threshold: &f64, value: &f64) -> f64 {
    threshold - value
}

/// Failure of a single task of the retraining workflow.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("an error ocurred in the storage backend: {0:?}")]
    Storage(#[from] StorageError),
    #[error("the training job failed: {0:?}")]
    Training(StorageError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl TaskError {
    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Storage(_) | TaskError::Training(_) => true,
            TaskError::Validation(ValidationError::Storage(_)) => true,
            TaskError::Validation(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("task {stage} failed after {attempts} attempt(s): {source}")]
    Task {
        stage: Stage,
        attempts: u32,
        #[source]
        source: TaskError,
    },
}
