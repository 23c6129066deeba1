//! Sandboxed shell command execution
//!
//! Commands run through `sh -c` after passing the command policy. Each child
//! gets its own process group so a timeout can take down everything it
//! spawned, not just the shell.

use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{ToolError, ToolOutcome};
use crate::security::SecurityPolicy;
use crate::tools::filesystem::{ensure_directory, truncate_lines};

/// Default timeout for command execution (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shell command execution result
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub working_directory: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by a signal)
    pub return_code: Option<i32>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
}

/// Timed, policy-gated command runner
#[derive(Clone)]
pub struct ProcessRunner {
    policy: Arc<SecurityPolicy>,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            policy,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command in `working_directory`.
    ///
    /// A non-zero exit is still a successful run; only policy denial, a bad
    /// working directory, spawn failure and timeout are errors.
    pub async fn run(&self, command: &str, working_directory: &str) -> ToolOutcome<CommandOutput> {
        self.policy.require_command(command)?;
        let cwd = self.policy.require_path(working_directory)?;
        ensure_directory(&cwd, working_directory)?;

        tracing::info!(command = %command, cwd = %working_directory, "Executing command");
        let start = Instant::now();

        let mut cmd = shell_command(command);
        cmd.current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::ExecutionFailure(format!("Failed to spawn command: {}", e)))?;
        let pid = child.id();

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let completion = timeout(self.timeout, async {
            let status = child.wait().await?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match completion {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailure(format!(
                    "Failed to get command output: {}",
                    e
                )))
            }
            Err(_) => {
                kill_process_group(pid);
                let _ = child.kill().await;
                tracing::warn!(
                    command = %command,
                    pid = ?pid,
                    timeout = ?self.timeout,
                    "Command timed out, process group killed"
                );
                return Err(ToolError::Timeout(self.timeout));
            }
        };

        let max_lines = self.policy.max_output_lines();
        let (stdout, stdout_lines, stdout_truncated) =
            truncate_lines(&String::from_utf8_lossy(&stdout), max_lines);
        let (stderr, stderr_lines, stderr_truncated) =
            truncate_lines(&String::from_utf8_lossy(&stderr), max_lines);
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            command = %command,
            exit_code = ?status.code(),
            duration_ms,
            "Command finished"
        );

        Ok(CommandOutput {
            command: command.to_string(),
            working_directory: working_directory.to_string(),
            stdout,
            stderr,
            return_code: status.code(),
            stdout_lines,
            stderr_lines,
            stdout_truncated,
            stderr_truncated,
            duration_ms,
        })
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "Output stream closed early");
        }
    }
    buf
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal; the group id came from our own child
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(pid, "killpg failed, group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Arc::new(SecurityPolicy::permissive()))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_command() {
        let output = runner().run("echo hello; echo oops >&2", ".").await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.return_code, Some(0));
        assert_eq!(output.stdout_lines, 1);
        assert!(!output.stdout_truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_success() {
        let output = runner().run("exit 3", ".").await.unwrap();
        assert_eq!(output.return_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_working_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "").unwrap();

        let output = runner()
            .run("ls", &temp.path().display().to_string())
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_missing_working_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope").display().to_string();

        let err = runner().run("echo hi", &missing).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_working_directory_is_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f.txt");
        std::fs::write(&file, "").unwrap();

        let err = runner()
            .run("echo hi", &file.display().to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_a_directory");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("late.txt");
        let command = format!("sleep 5; touch {}", marker.display());

        let started = Instant::now();
        let err = runner()
            .with_timeout(Duration::from_millis(300))
            .run(&command, ".")
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_background_descendants() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("orphan.txt");
        let command = format!("(sleep 1; touch {}) & sleep 10", marker.display());

        let err = runner()
            .with_timeout(Duration::from_millis(300))
            .run(&command, ".")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Command timed out after 300ms");

        // The subshell would have touched the marker after one second
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_truncated_per_stream() {
        let policy = SecurityPolicy::permissive().with_limits(1024, 3);
        let output = ProcessRunner::new(Arc::new(policy))
            .run("seq 1 10; echo err >&2", ".")
            .await
            .unwrap();

        assert!(output.stdout_truncated);
        assert_eq!(output.stdout_lines, 10);
        assert!(output.stdout.ends_with("... (truncated, showing first 3 lines)"));
        assert!(!output.stderr_truncated);
    }

    #[tokio::test]
    async fn test_blocked_command() {
        let policy = SecurityPolicy::new(&[] as &[&str], &[], &[], &["rm -rf"]);
        let err = ProcessRunner::new(Arc::new(policy))
            .run("rm -rf /tmp/whatever", ".")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "access_denied");
        assert!(err.to_string().contains("Command blocked"));
    }

    #[tokio::test]
    async fn test_allowed_commands_list() {
        let policy = SecurityPolicy::new(&[] as &[&str], &[], &["echo"], &[]);
        let runner = ProcessRunner::new(Arc::new(policy));

        tokio_test::assert_ok!(runner.run("echo ok", ".").await);
        let err = tokio_test::assert_err!(runner.run("cat /etc/hostname", ".").await);
        assert!(err.to_string().contains("Command not allowed: 'cat'"));
    }
}
