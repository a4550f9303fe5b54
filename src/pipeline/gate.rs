//! The retraining workflow as an explicit state machine:
//!
//! ```text
//! CheckNewData -> ComputeDrift -> Branch -+-> Skip ------------------> Success
//!                                         +-> Retrain -> Validate ---> Success
//! ```
//!
//! Any task that gives up moves the run to `Failed`.

use std::{thread, time::Duration};

use tracing::{error, info, warn};

use crate::{
    api::{
        error::{PipelineError, TaskError},
        stage::Stage,
    },
    monitor::drift::{DriftDecision, DriftEvaluation, DriftEvaluator},
    pipeline::{
        detector::{check_new_data, NewDataCheck},
        layout::ArtifactLayout,
        trainer::TrainingJob,
        validator::{ValidationOutcome, Validator},
    },
    ObjectStore, RunName, Settings, VariableStore,
};

/// Outcome of the branch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Skip,
    Retrain,
}

impl Branch {
    /// Retraining needs new data *and* drift; either one alone is skipped.
    pub fn decide(has_new_data: bool, drift_exceeded: bool) -> Self {
        if has_new_data && drift_exceeded {
            Branch::Retrain
        } else {
            Branch::Skip
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Branch::Skip => Stage::Skip,
            Branch::Retrain => Stage::Retrain,
        }
    }
}

/// Task-level retries with a fixed delay. Only retryable failures are repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 1,
            delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn run<T, F>(&self, stage: Stage, mut task: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Result<T, TaskError>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match task() {
                Ok(value) => return Ok(value),
                Err(source) if source.is_retryable() && attempts <= self.retries => {
                    warn!(
                        stage = %stage,
                        attempt = attempts,
                        delay_secs = self.delay.as_secs(),
                        error = %source,
                        "task failed, retrying"
                    );
                    if self.delay > Duration::from_secs(0) {
                        thread::sleep(self.delay);
                    }
                }
                Err(source) => {
                    error!(stage = %stage, attempts, error = %source, "task failed");
                    return Err(PipelineError::Task { stage, attempts, source });
                }
            }
        }
    }
}

/// Inputs of the branch decision, assembled once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrainingRunContext {
    pub run_id: String,
    pub run: RunName,
    pub new_data: NewDataCheck,
    pub drift: DriftDecision,
}

impl RetrainingRunContext {
    pub fn branch(&self) -> Branch {
        Branch::decide(self.new_data.has_new_data, self.drift.exceeded)
    }
}

/// A run that reached `Success`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub context: RetrainingRunContext,
    pub drift: DriftEvaluation,
    pub branch: Branch,
    pub validation: Option<ValidationOutcome>,
    /// Stages visited, in order.
    pub trail: Vec<Stage>,
}

impl RunOutcome {
    pub fn final_stage(&self) -> Stage {
        self.trail.last().copied().unwrap_or(Stage::CheckNewData)
    }
}

pub struct RetrainingGate {
    pub layout: ArtifactLayout,
    pub evaluator: DriftEvaluator,
    pub validator: Validator,
    pub retry: RetryPolicy,
}

impl RetrainingGate {
    pub fn from_settings(settings: &Settings) -> Self {
        let layout = settings.layout();
        RetrainingGate {
            validator: Validator::new(layout.clone(), settings.auc_threshold),
            evaluator: DriftEvaluator::from_settings(settings),
            retry: settings.retry,
            layout,
        }
    }

    /// Executes one scheduled invocation for `run_id`.
    ///
    /// Tasks run strictly in order. Both tasks before the branch only
    /// overwrite state (persisted ETag, report), so a retried attempt is safe.
    pub fn run(
        &self,
        run_id: &str,
        store: &mut dyn ObjectStore,
        variables: &mut dyn VariableStore,
        trainer: &mut dyn TrainingJob,
    ) -> Result<RunOutcome, PipelineError> {
        let run = RunName::sanitize(run_id);
        let mut trail = Vec::new();
        info!(run_id, run = %run, "starting retraining gate");

        trail.push(Stage::CheckNewData);
        let current = self.layout.current_dataset();
        let new_data = self.retry.run(Stage::CheckNewData, || {
            Ok(check_new_data(&mut *store, &mut *variables, &current)?)
        })?;

        trail.push(Stage::ComputeDrift);
        let report = self.layout.drift_report(&run);
        let drift = self.retry.run(Stage::ComputeDrift, || {
            Ok(self.evaluator.evaluate(&mut *store, &run, &new_data, &report)?)
        })?;

        trail.push(Stage::Branch);
        let context = RetrainingRunContext {
            run_id: run_id.to_string(),
            run: run.clone(),
            new_data,
            drift: drift.decision.clone(),
        };
        let branch = context.branch();
        info!(
            has_new_data = context.new_data.has_new_data,
            drift_exceeded = context.drift.exceeded,
            branch = ?branch,
            "decision inputs"
        );
        trail.push(branch.stage());

        let validation = match branch {
            Branch::Skip => None,
            Branch::Retrain => {
                self.retry.run(Stage::Retrain, || {
                    trainer.launch(run_id).map_err(TaskError::Training)
                })?;
                trail.push(Stage::Validate);
                let outcome = self.retry.run(Stage::Validate, || {
                    Ok(self.validator.validate(&mut *store, &run)?)
                })?;
                Some(outcome)
            }
        };

        trail.push(Stage::Success);
        info!(run = %run, branch = ?branch, "run reached success");
        Ok(RunOutcome {
            context,
            drift,
            branch,
            validation,
            trail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ValidationError;

    #[test]
    fn branch_requires_both_conditions() {
        assert_eq!(Branch::decide(true, true), Branch::Retrain);
        assert_eq!(Branch::decide(true, false), Branch::Skip);
        assert_eq!(Branch::decide(false, true), Branch::Skip);
        assert_eq!(Branch::decide(false, false), Branch::Skip);
    }

    #[test]
    fn retries_transient_failures_once() {
        let policy = RetryPolicy {
            retries: 1,
            delay: Duration::from_secs(0),
        };
        let mut calls = 0;
        let value = policy
            .run(Stage::CheckNewData, || {
                calls += 1;
                if calls == 1 {
                    Err(TaskError::Storage(anyhow::anyhow!("timeout")))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 2);

        let mut calls = 0;
        let error = policy
            .run(Stage::ComputeDrift, || -> Result<(), TaskError> {
                calls += 1;
                Err(TaskError::Storage(anyhow::anyhow!("timeout")))
            })
            .unwrap_err();
        assert_eq!(calls, 2);
        assert!(matches!(
            error,
            PipelineError::Task {
                stage: Stage::ComputeDrift,
                attempts: 2,
                ..
            }
        ));
    }

    #[test]
    fn validation_failures_are_not_retried() {
        let mut calls = 0;
        let error = RetryPolicy::default()
            .run(Stage::Validate, || -> Result<(), TaskError> {
                calls += 1;
                Err(ValidationError::ArtifactMissing("s3://credit/model".into()).into())
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(error.to_string().contains("validate_model"), "{}", error);
        assert!(error.to_string().contains("s3://credit/model"), "{}", error);
    }
}
