//! Bounded execution of the external PDF engine.

use service_core::error::AppError;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Runs a program to completion or kills it when the timeout elapses.
///
/// Every failure (spawn, timeout, non-zero exit) is a `RenderError`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn execute(
        &self,
        program: &str,
        args: &[&str],
        working_dir: Option<&Path>,
    ) -> Result<Output, AppError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(
            program = %program,
            args = ?args,
            timeout_secs = self.timeout.as_secs(),
            "Running render engine"
        );

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(AppError::RenderError(format!(
                    "{} timed out after {} seconds",
                    program,
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) => {
                return Err(AppError::RenderError(format!(
                    "Failed to start {}: {}",
                    program, e
                )))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                program = %program,
                code = ?output.status.code(),
                stderr = %stderr,
                "Render engine failed"
            );
            return Err(AppError::RenderError(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}
