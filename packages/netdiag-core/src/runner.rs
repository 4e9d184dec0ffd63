//! External process invocation.
//!
//! Probes that shell out (the system `ping`) go through [`CommandRunner`] so
//! tests can substitute a scripted runner instead of touching the network.

use crate::error::{ProbeError, ProbeResult};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout followed by stderr (when there is any), trimmed.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            text.push('\n');
            text.push_str(&self.stderr);
        }
        text.trim().to_string()
    }
}

/// Runs an external program to completion within a deadline.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult<CommandOutput>> + Send;
}

/// Create a Command that hides the console window on Windows.
pub fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Runner backed by real operating system processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> ProbeResult<CommandOutput> {
        let mut cmd = hidden_command(program);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

        tracing::trace!("Running {} {:?} (deadline {:?})", program, args, timeout);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::ProcessUnavailable(program.to_string()));
            }
            Ok(Err(e)) => return Err(ProbeError::Io(e)),
            Err(_) => {
                return Err(ProbeError::ProcessTimeout {
                    program: program.to_string(),
                    after: timeout,
                });
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let only_stdout = CommandOutput {
            success: true,
            stdout: "64 bytes from 1.1.1.1\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(only_stdout.combined(), "64 bytes from 1.1.1.1");

        let both = CommandOutput {
            success: false,
            stdout: "PING host".to_string(),
            stderr: "unknown host\n".to_string(),
        };
        assert_eq!(both.combined(), "PING host\nunknown host");
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let result = SystemRunner
            .run(
                "netdiag-definitely-not-installed",
                &[],
                Duration::from_secs(2),
            )
            .await;
        assert!(matches!(result, Err(ProbeError::ProcessUnavailable(ref p)) if p == "netdiag-definitely-not-installed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_and_streams() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let output = SystemRunner
            .run("sh", &args, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.success);
        assert_eq!(output.combined(), "out\n\nerr");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_exceeded() {
        let args = vec!["5".to_string()];
        let result = SystemRunner
            .run("sleep", &args, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ProbeError::ProcessTimeout { .. })));
    }
}
