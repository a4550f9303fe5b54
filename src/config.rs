//! Runtime settings, read from the process environment.

use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    api::error::ConfigError,
    monitor::sample::TRACKED_FEATURES,
    pipeline::{
        gate::RetryPolicy,
        layout::{ArtifactLayout, DEFAULT_MODEL_ARTIFACT},
        validator::DEFAULT_AUC_THRESHOLD,
    },
    DatasetPointer,
};

pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_LOCAL_REFERENCE: &str = "data/processed/train_base.csv";
pub const DEFAULT_STORE_ROOT: &str = "object-store";
pub const DEFAULT_STATE_FILE: &str = ".drift-gate/variables.json";
pub const DEFAULT_TRAINER_COMMAND: &str = "python -u scripts/model_training/train_model.py";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bucket: String,
    pub drift_threshold: f64,
    pub auc_threshold: f64,
    pub reference_uri: Option<DatasetPointer>,
    pub local_reference: PathBuf,
    pub features: Vec<String>,
    pub model_artifact: String,
    /// Base URL of an S3-compatible HTTP endpoint. Without one the local
    /// directory store under `store_root` is used.
    pub store_url: Option<String>,
    pub store_token: Option<String>,
    pub store_root: PathBuf,
    pub state_file: PathBuf,
    pub trainer_command: Vec<String>,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bucket = var("BUCKET").ok_or(ConfigError::Missing("BUCKET"))?;
        let reference_uri = match var("REFERENCE_S3_URI") {
            Some(raw) => Some(DatasetPointer::from_str(&raw).map_err(|error| ConfigError::Invalid {
                name: "REFERENCE_S3_URI",
                value: raw.clone(),
                reason: error.to_string(),
            })?),
            None => None,
        };
        let features = match var("DRIFT_FEATURES") {
            Some(raw) => {
                let features: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|feature| !feature.is_empty())
                    .map(String::from)
                    .collect();
                if features.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: "DRIFT_FEATURES",
                        value: raw,
                        reason: "no feature names given".into(),
                    });
                }
                features
            }
            None => TRACKED_FEATURES.iter().map(|feature| feature.to_string()).collect(),
        };
        let trainer_command: Vec<String> = var("TRAINER_COMMAND")
            .unwrap_or_else(|| DEFAULT_TRAINER_COMMAND.to_string())
            .split_whitespace()
            .map(String::from)
            .collect();

        Ok(Settings {
            bucket,
            drift_threshold: parse_or("DRIFT_THRESHOLD", var("DRIFT_THRESHOLD"), DEFAULT_DRIFT_THRESHOLD)?,
            auc_threshold: parse_or("AUC_THRESHOLD", var("AUC_THRESHOLD"), DEFAULT_AUC_THRESHOLD)?,
            reference_uri,
            local_reference: var("REFERENCE_LOCAL_PATH")
                .unwrap_or_else(|| DEFAULT_LOCAL_REFERENCE.to_string())
                .into(),
            features,
            model_artifact: var("MODEL_ARTIFACT").unwrap_or_else(|| DEFAULT_MODEL_ARTIFACT.to_string()),
            store_url: var("OBJECT_STORE_URL"),
            store_token: var("OBJECT_STORE_TOKEN"),
            store_root: var("OBJECT_STORE_ROOT")
                .unwrap_or_else(|| DEFAULT_STORE_ROOT.to_string())
                .into(),
            state_file: var("STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()).into(),
            trainer_command,
            retry: RetryPolicy {
                retries: parse_or("TASK_RETRIES", var("TASK_RETRIES"), RetryPolicy::default().retries)?,
                delay: Duration::from_secs(parse_or(
                    "TASK_RETRY_DELAY_SECS",
                    var("TASK_RETRY_DELAY_SECS"),
                    RetryPolicy::default().delay.as_secs(),
                )?),
            },
        })
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout {
            bucket: self.bucket.clone(),
            model_artifact: self.model_artifact.clone(),
        }
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|error: T::Err| ConfigError::Invalid {
            name,
            reason: error.to_string(),
            value: raw,
        }),
    }
}
