use anyhow::Context;
use tracing::info;

use crate::{
    api::{
        error::{HeadError, ValidationError},
        metrics::{TrainingMetrics, PRIMARY_METRIC},
    },
    pipeline::layout::ArtifactLayout,
    DatasetPointer, ObjectStore, RunName,
};

pub const DEFAULT_AUC_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub location: DatasetPointer,
    pub present: bool,
}

/// What one training attempt produced, judged against the AUC threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub artifacts: Vec<ArtifactCheck>,
    pub metrics: Option<TrainingMetrics>,
    pub metric_value: Option<f64>,
    pub threshold: f64,
    pub passed: bool,
}

impl ValidationOutcome {
    /// Turns a failed outcome into the error that names its cause.
    pub fn ensure_passed(&self) -> Result<(), ValidationError> {
        if let Some(missing) = self.artifacts.iter().find(|artifact| !artifact.present) {
            return Err(ValidationError::ArtifactMissing(missing.location.uri()));
        }
        match self.metric_value {
            Some(value) if !(value >= self.threshold) => Err(ValidationError::MetricBelowThreshold {
                metric: PRIMARY_METRIC,
                value,
                threshold: self.threshold,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub layout: ArtifactLayout,
    pub auc_threshold: f64,
}

impl Validator {
    pub fn new(layout: ArtifactLayout, auc_threshold: f64) -> Self {
        Validator { layout, auc_threshold }
    }

    fn exists(store: &mut dyn ObjectStore, location: &DatasetPointer) -> Result<bool, ValidationError> {
        match store.head(location) {
            Ok(_) => Ok(true),
            Err(HeadError::DoesNotExist(_)) => Ok(false),
            Err(HeadError::Storage(error)) => Err(error.context(format!("checking {}", location)).into()),
        }
    }

    /// Collects the artifacts and metrics of `run` without judging them.
    pub fn inspect(&self, store: &mut dyn ObjectStore, run: &RunName) -> Result<ValidationOutcome, ValidationError> {
        let model = self.layout.model(run);
        let metrics_location = self.layout.metrics(run);

        let mut artifacts = Vec::with_capacity(2);
        for location in vec![model, metrics_location.clone()] {
            let present = Self::exists(store, &location)?;
            artifacts.push(ArtifactCheck { location, present });
        }

        let metrics = if artifacts.iter().all(|artifact| artifact.present) {
            let body = store
                .get(&metrics_location)
                .with_context(|| format!("downloading {}", metrics_location))?;
            let metrics = TrainingMetrics::from_slice(&body).map_err(|source| ValidationError::MalformedMetrics {
                location: metrics_location.uri(),
                source,
            })?;
            Some(metrics)
        } else {
            None
        };

        let metric_value = metrics.as_ref().and_then(|metrics| metrics.test_auc);
        let passed = artifacts.iter().all(|artifact| artifact.present)
            && metric_value.map_or(true, |value| value >= self.auc_threshold);
        Ok(ValidationOutcome {
            artifacts,
            metrics,
            metric_value,
            threshold: self.auc_threshold,
            passed,
        })
    }

    /// Confirms both artifacts exist and the primary metric, when reported,
    /// reaches the threshold.
    pub fn validate(&self, store: &mut dyn ObjectStore, run: &RunName) -> Result<ValidationOutcome, ValidationError> {
        let outcome = self.inspect(store, run)?;
        outcome.ensure_passed()?;
        if outcome.metric_value.is_none() {
            info!(metric = PRIMARY_METRIC, "metric not reported, threshold check skipped");
        }
        info!(model = %self.layout.model(run), "validation OK");
        if let Some(metrics) = &outcome.metrics {
            info!(
                metrics = %self.layout.metrics(run),
                test_auc = ?metrics.test_auc,
                payload = ?metrics.other,
                "training metrics"
            );
        }
        Ok(outcome)
    }
}
