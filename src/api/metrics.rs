use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the metric that gates promotion.
pub const PRIMARY_METRIC: &str = "test_auc";

/// Metrics payload written by the training job.
///
/// Only `test_auc` is interpreted; every other field is kept verbatim so it
/// can be logged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    #[serde(default)]
    pub test_auc: Option<f64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl TrainingMetrics {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_training_job_payload() {
        let payload = r#"
        {
            "run_id": "scheduled__2024-01-01",
            "rows": 30000,
            "model": "gbdt",
            "test_auc": 0.7712,
            "test_f1": 0.47
        }
        "#;
        let metrics = TrainingMetrics::from_slice(payload.as_bytes()).unwrap();
        assert_eq!(metrics.test_auc, Some(0.7712));
        assert_eq!(metrics.other["model"], "gbdt");
        assert_eq!(metrics.other.len(), 4);
    }

    #[test]
    fn null_and_missing_auc_are_absent() {
        let metrics = TrainingMetrics::from_slice(br#"{"test_auc": null}"#).unwrap();
        assert_eq!(metrics.test_auc, None);
        let metrics = TrainingMetrics::from_slice(b"{}").unwrap();
        assert_eq!(metrics.test_auc, None);
    }
}
