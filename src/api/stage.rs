use std::fmt;

/// States of the retraining workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckNewData,
    ComputeDrift,
    Branch,
    Skip,
    Retrain,
    Validate,
    Success,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckNewData => "check_new_data",
            Stage::ComputeDrift => "compute_drift",
            Stage::Branch => "branch_should_retrain",
            Stage::Skip => "skip_retrain",
            Stage::Retrain => "retrain_model",
            Stage::Validate => "validate_model",
            Stage::Success => "mark_success",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Success | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
