use crate::{DatasetPointer, RunName};

pub const CURRENT_DATASET_KEY: &str = "retraining/current.csv";
pub const DEFAULT_MODEL_ARTIFACT: &str = "credit_default_model.pkl";

/// Object keys shared by the workflow and the training job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub bucket: String,
    pub model_artifact: String,
}

impl ArtifactLayout {
    pub fn new(bucket: impl Into<String>) -> Self {
        ArtifactLayout {
            bucket: bucket.into(),
            model_artifact: DEFAULT_MODEL_ARTIFACT.to_string(),
        }
    }

    pub fn current_dataset(&self) -> DatasetPointer {
        DatasetPointer::new(&self.bucket, CURRENT_DATASET_KEY)
    }

    pub fn drift_report(&self, run: &RunName) -> DatasetPointer {
        DatasetPointer::new(&self.bucket, format!("retraining/reports/{}/drift_report.html", run))
    }

    pub fn model(&self, run: &RunName) -> DatasetPointer {
        DatasetPointer::new(&self.bucket, format!("retraining/models/{}/{}", run, self.model_artifact))
    }

    pub fn metrics(&self, run: &RunName) -> DatasetPointer {
        DatasetPointer::new(&self.bucket, format!("retraining/metrics/{}/metrics.json", run))
    }
}
