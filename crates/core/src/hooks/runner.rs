//! Subprocess execution for `command` actions

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::error::RunnerError;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on behalf of actions.
///
/// Production uses [`ShellRunner`]; tests inject a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` through the shell, writing `stdin` to it when given.
    async fn run(&self, command: &str, stdin: Option<String>) -> Result<CommandOutput, RunnerError>;
}

/// `sh -c` in the current directory, waiting for completion with no timeout
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, stdin: Option<String>) -> Result<CommandOutput, RunnerError> {
        debug!("Running command: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunnerError::Spawn)?;

        // stdin is written concurrently with draining stdout/stderr
        let feed = stdin.zip(child.stdin.take());
        let feed = async move {
            if let Some((input, mut pipe)) = feed {
                pipe.write_all(input.as_bytes()).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(RunnerError::Wait)?;
        // A command that exits without reading its stdin closes the pipe early
        if let Err(e) = fed
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(RunnerError::Stdin(e));
        }

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("Command exited with code {}", exit_code);

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = ShellRunner.run("echo hello; exit 3", None).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_pipes_stdin() {
        let out = ShellRunner
            .run("cat", Some("{\"tool_name\":\"Bash\"}".to_string()))
            .await
            .unwrap();
        assert_eq!(out.stdout, "{\"tool_name\":\"Bash\"}");
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_captures_stderr() {
        let out = ShellRunner.run("echo oops >&2; exit 2", None).await.unwrap();
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, 2);
    }

    #[tokio::test]
    async fn test_large_output_before_reading_stdin() {
        let payload = "x".repeat(300_000);
        let out = ShellRunner
            .run("head -c 300000 /dev/zero; wc -c", Some(payload))
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.len() > 300_000);
        assert!(out.stdout.trim_end().ends_with("300000"));
    }

    #[tokio::test]
    async fn test_ignores_unread_stdin() {
        let out = ShellRunner.run("true", Some("ignored".to_string())).await.unwrap();
        assert!(out.success());
    }
}
