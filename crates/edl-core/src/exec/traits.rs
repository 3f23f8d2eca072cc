//! External process execution abstraction.
//!
//! Defines the `CommandRunner` trait for invoking the vendor tools
//! (adb, fastboot, QSaharaServer, fh_loader), allowing different
//! implementations (host, mock, etc.).

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("executable not found: {name} (expected at {})", path.display())]
    ExecutableNotFound { name: String, path: PathBuf },

    #[error("failed to launch {program}: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("{program} exited with {}", exit_label(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

/// One fully-described tool invocation.
///
/// Built by the protocol stages, consumed by a `CommandRunner`. Never
/// mutated after construction, so test doubles can assert on the exact
/// argument vector that would hit the real tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    path_prepend: Vec<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            path_prepend: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory for the child process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Prepend a directory to the child's PATH. Directories are searched
    /// in the order they were added, ahead of the inherited PATH.
    pub fn prepend_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.path_prepend.push(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args_ref(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn path_prepend(&self) -> &[PathBuf] {
        &self.path_prepend
    }

    /// File name of the program, for error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Collected output of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How child output reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Collect output and echo the trimmed text to the host's own
    /// stdout/stderr, matching the interactive toolbox behavior.
    Echo,
    /// Collect output silently; the caller parses it.
    Capture,
}

/// Abstract process runner interface.
///
/// This trait enables:
/// - Production implementation spawning real processes
/// - Mock implementation for unit testing session logic
pub trait CommandRunner: Send + Sync {
    /// Launch the invocation, wait for it, and return its output
    /// regardless of exit status. Only launch-level problems are errors.
    fn run_with(
        &self,
        invocation: &Invocation,
        mode: OutputMode,
    ) -> Result<CommandOutput, ExecError>;

    /// Run in echo mode, mapping a non-zero exit to `NonZeroExit`.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        check_status(invocation, self.run_with(invocation, OutputMode::Echo)?)
    }

    /// Run in capture mode, mapping a non-zero exit to `NonZeroExit`.
    fn run_captured(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        check_status(invocation, self.run_with(invocation, OutputMode::Capture)?)
    }

    /// Run in capture mode without treating a non-zero exit as an error.
    /// Used for tools like fastboot whose queries exit non-zero on idle.
    fn run_captured_unchecked(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        self.run_with(invocation, OutputMode::Capture)
    }
}

fn check_status(
    invocation: &Invocation,
    output: CommandOutput,
) -> Result<CommandOutput, ExecError> {
    if output.success() {
        Ok(output)
    } else {
        Err(ExecError::NonZeroExit {
            program: invocation.program_name(),
            code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
