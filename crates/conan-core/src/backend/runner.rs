//! Process plumbing for the `conan` executable.

use crate::error::BackendError;
use crate::logging::CONAN_TARGET;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Captured result of one `conan` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs `conan` with the given arguments.
///
/// Backends only talk to Conan through this seam, so tests can script the
/// output of every command.
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion.
    fn run(&self, args: &[String]) -> Result<CommandOutput, BackendError>;

    /// Run one command and return its stdout, failing on a non-zero exit.
    fn run_ok(&self, args: &[String]) -> Result<String, BackendError> {
        let output = self.run(args)?;
        if output.success {
            return Ok(output.stdout);
        }
        Err(BackendError::CommandFailed {
            command: args.join(" "),
            status: output
                .code
                .map_or_else(|| "signal".to_string(), |c| format!("exit code {c}")),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, args: &[String]) -> Result<CommandOutput, BackendError> {
        (**self).run(args)
    }
}

/// Last non-empty stderr line, which is where Conan puts its `ERROR:` message.
fn stderr_tail(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Runs the real `conan` executable.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
}

impl ProcessRunner {
    /// Use `explicit` if given, otherwise find `conan` on `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, BackendError> {
        let executable = match explicit {
            Some(path) => path.to_path_buf(),
            None => which::which("conan")?,
        };
        tracing::debug!("Using conan at {}", executable.display());
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.stdin(Stdio::null())
            .env("CONAN_NON_INTERACTIVE", "1")
            .env("NO_COLOR", "1");
        cmd
    }

    /// `conan --version`, killed after `timeout`.
    pub fn version_output(&self, timeout: Duration) -> Result<String, BackendError> {
        let mut child = self
            .command()
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let Some(status) = child.wait_timeout(timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackendError::Timeout {
                command: "--version".to_string(),
                seconds: timeout.as_secs(),
            });
        };

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }
        if !status.success() {
            return Err(BackendError::CommandFailed {
                command: "--version".to_string(),
                status: status.to_string(),
                stderr: String::new(),
            });
        }
        Ok(stdout)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, args: &[String]) -> Result<CommandOutput, BackendError> {
        tracing::debug!("conan {}", args.join(" "));
        let output = self.command().args(args).output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: CONAN_TARGET, "| {line}");
        }

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout,
            stderr,
        })
    }
}
