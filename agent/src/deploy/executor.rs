//! Step executor: runs one shell command to completion

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default limit for a single step
pub const STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// How long to wait for output pipes to close once the child has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A failed, timed out or unstartable command
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn with_output(mut self, output: CommandOutput) -> Self {
        self.stdout = output.stdout;
        self.stderr = output.stderr;
        self
    }
}

/// Runs commands on behalf of a deployment run
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `command` in `working_dir`, exactly once, within `timeout`
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError>;
}

/// Executes steps as subprocesses of a shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Interpreter argv; the command is appended as the last argument
    shell: Vec<String>,
}

impl ShellExecutor {
    /// Create an executor; `None` or an empty list selects the platform shell
    pub fn new(shell: Option<Vec<String>>) -> Self {
        let shell = match shell {
            Some(shell) if !shell.is_empty() => shell,
            _ => default_shell(),
        };
        Self { shell }
    }

    pub fn shell(&self) -> &[String] {
        &self.shell
    }

    fn command(&self, command: &str, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.shell[0]);
        cmd.args(&self.shell[1..])
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down everything the step started
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        debug!("Running command in {}: {}", working_dir.display(), command);

        let mut child = self
            .command(command, working_dir)
            .spawn()
            .map_err(|e| ExecutionError::new(format!("Failed to start command: {}", e)))?;

        let pid = child.id();
        let stdout = OutputReader::spawn(child.stdout.take());
        let stderr = OutputReader::spawn(child.stderr.take());

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let output = CommandOutput {
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                };
                if status.success() {
                    Ok(output)
                } else {
                    let message = match status.code() {
                        Some(code) => format!("Command failed with exit code {}", code),
                        None => "Command terminated by signal".to_string(),
                    };
                    Err(ExecutionError::new(message).with_output(output))
                }
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                let output = CommandOutput {
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                };
                Err(ExecutionError::new(format!("Failed to wait for command: {}", e))
                    .with_output(output))
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, command);
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out command: {}", e);
                }
                let output = CommandOutput {
                    stdout: stdout.finish().await,
                    stderr: stderr.finish().await,
                };
                Err(ExecutionError::new(format!(
                    "Command timed out after {:?}",
                    timeout
                ))
                .with_output(output))
            }
        }
    }
}

/// SIGKILL the process group led by `pid`
fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            let e = std::io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to kill process group {}: {}", pgid, e);
            }
        }
    }

    #[cfg(not(unix))]
    let _ = pid;
}

fn default_shell() -> Vec<String> {
    #[cfg(windows)]
    {
        vec!["cmd".to_string(), "/C".to_string()]
    }

    #[cfg(not(windows))]
    {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

/// Drains a child pipe in the background into a shared buffer
struct OutputReader {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputReader {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buf = buf.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, task }
    }

    /// Wait briefly for EOF, then return whatever was read.
    /// Background processes can keep the pipe open after the shell exits.
    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
        let buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}
