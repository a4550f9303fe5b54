use std::process::Command;

use anyhow::{bail, Context};
use tracing::info;

use crate::api::error::{ConfigError, StorageError};

/// Opaque training job.
///
/// `launch` returns once the job has finished; a successful job leaves the
/// model and metrics artifacts at the run-scoped locations of
/// [`ArtifactLayout`](crate::pipeline::ArtifactLayout).
pub trait TrainingJob {
    fn launch(&mut self, run_id: &str) -> Result<(), StorageError>;
}

/// Runs the training job as a child process with `RUN_ID` in its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandJob {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandJob {
    pub fn new(command_line: &[String]) -> Result<Self, ConfigError> {
        match command_line.split_first() {
            Some((program, args)) => Ok(CommandJob {
                program: program.clone(),
                args: args.to_vec(),
                envs: Vec::new(),
            }),
            None => Err(ConfigError::Invalid {
                name: "TRAINER_COMMAND",
                value: String::new(),
                reason: "the training command is empty".to_string(),
            }),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl TrainingJob for CommandJob {
    fn launch(&mut self, run_id: &str) -> Result<(), StorageError> {
        info!(command = %self.describe(), run_id, "launching training job");
        let status = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .env("RUN_ID", run_id)
            .status()
            .with_context(|| format!("starting training command `{}`", self.describe()))?;
        if !status.success() {
            bail!("training command `{}` exited with {}", self.describe(), status);
        }
        info!(run_id, "training job finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandJob::new(&[]),
            Err(ConfigError::Invalid { name: "TRAINER_COMMAND", .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn passes_run_id_and_env() {
        let script = vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"test "$RUN_ID" = "scheduled__1" && test "$BUCKET" = "credit""#.to_string(),
        ];
        let mut job = CommandJob::new(&script).unwrap().env("BUCKET", "credit");
        job.launch("scheduled__1").unwrap();
        assert!(job.launch("other").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_status() {
        let mut job = CommandJob::new(&["false".to_string()]).unwrap();
        let error = job.launch("run").unwrap_err();
        assert!(error.to_string().contains("training command `false` exited with"), "{}", error);
    }
}
