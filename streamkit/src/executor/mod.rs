//! Runs external tools (`yt-dlp`, `ffmpeg`) as child processes.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;

/// A single invocation of an external executable.
///
/// # Example
///
/// ```rust,no_run
/// # use streamkit::utils;
/// # use std::path::PathBuf;
/// # use std::time::Duration;
/// # use streamkit::executor::Executor;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = Executor {
///     executable_path: PathBuf::from("ffmpeg"),
///     timeout: Duration::from_secs(30),
///     args: utils::to_owned(vec!["-version"]),
/// };
///
/// let output = executor.execute().await?;
/// println!("Output: {}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    /// The path to the executable.
    pub executable_path: PathBuf,
    /// How long the process may run before it is killed.
    pub timeout: Duration,
    /// The arguments passed to the executable.
    pub args: Vec<String>,
}

/// What a finished process wrote and how it exited.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// The captured stdout, lossily decoded.
    pub stdout: String,
    /// The captured stderr, lossily decoded.
    pub stderr: String,
    /// The exit code, or -1 when the process was ended by a signal.
    pub code: i32,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

fn drain<R>(reader: Option<R>, name: &str) -> Result<JoinHandle<std::io::Result<Vec<u8>>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader =
        reader.ok_or_else(|| Error::Command(format!("Failed to capture {}", name)))?;

    Ok(tokio::spawn(async move {
        let mut buffer = Vec::new();
        tokio::io::copy(&mut reader, &mut buffer).await?;
        Ok(buffer)
    }))
}

async fn collect(task: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<String> {
    let buffer = task.await??;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

impl Executor {
    /// Creates an executor for the given executable and arguments.
    pub fn new(executable_path: impl Into<PathBuf>, timeout: Duration, args: Vec<String>) -> Self {
        Self {
            executable_path: executable_path.into(),
            timeout,
            args,
        }
    }

    /// Runs the process to completion and returns its output, whatever the exit code.
    ///
    /// # Errors
    ///
    /// Fails if the process could not be spawned or did not finish within the timeout.
    pub async fn run(&self) -> Result<ProcessOutput> {
        tracing::debug!("Executing command: {:?}", self);

        let mut command = tokio::process::Command::new(&self.executable_path);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            command.creation_flags(0x08000000);
        }

        command.args(&self.args);
        let mut child = command.spawn()?;

        // Both pipes are drained concurrently so a large JSON document on stdout cannot block the child.
        let stdout_task = drain(child.stdout.take(), "stdout")?;
        let stderr_task = drain(child.stderr.take(), "stderr")?;

        let exit_status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("Process timed out after {:?}, killing it", self.timeout);

                if let Err(e) = child.kill().await {
                    tracing::error!("Failed to kill process after timeout: {}", e);
                }

                return Err(Error::Timeout(self.timeout));
            }
        };

        Ok(ProcessOutput {
            stdout: collect(stdout_task).await?,
            stderr: collect(stderr_task).await?,
            code: exit_status.code().unwrap_or(-1),
        })
    }

    /// Runs the process and fails unless it exits successfully.
    ///
    /// # Errors
    ///
    /// Same as [`Executor::run`], plus [`Error::Command`] carrying stderr for a non-zero exit.
    pub async fn execute(&self) -> Result<ProcessOutput> {
        let output = self.run().await?;
        if output.success() {
            return Ok(output);
        }

        Err(Error::Command(format!(
            "Process failed with code {}: {}",
            output.code,
            output.stderr.trim()
        )))
    }
}
