//! Host process runner backed by `std::process::Command`.

use std::env;
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use tracing::{debug, instrument};

use super::traits::{CommandOutput, CommandRunner, ExecError, Invocation, OutputMode};

/// Spawns real child processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl HostRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for HostRunner {
    #[instrument(skip(self, invocation), fields(program = %invocation.program_name()))]
    fn run_with(
        &self,
        invocation: &Invocation,
        mode: OutputMode,
    ) -> Result<CommandOutput, ExecError> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = invocation.cwd() {
            command.current_dir(dir);
        }

        if !invocation.path_prepend().is_empty() {
            let mut paths = invocation.path_prepend().to_vec();
            if let Some(existing) = env::var_os("PATH") {
                paths.extend(env::split_paths(&existing));
            }
            let joined = env::join_paths(paths).map_err(|e| ExecError::LaunchFailed {
                program: invocation.program_name(),
                message: e.to_string(),
            })?;
            command.env("PATH", joined);
        }

        debug!(args = ?invocation.args_ref(), cwd = ?invocation.cwd(), "Running command");

        let output = command.output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ExecError::ExecutableNotFound {
                    name: invocation.program_name(),
                    path: invocation.program().to_path_buf(),
                }
            } else {
                ExecError::LaunchFailed {
                    program: invocation.program_name(),
                    message: e.to_string(),
                }
            }
        })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if mode == OutputMode::Echo {
            let out = result.stdout.trim();
            if !out.is_empty() {
                println!("{out}");
            }
            let err = result.stderr.trim();
            if !err.is_empty() {
                eprintln!("{err}");
            }
        }

        debug!(exit_code = ?result.exit_code, "Command finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_not_found() {
        let runner = HostRunner::new();
        let inv = Invocation::new("/nonexistent/edl-test-tool");
        match runner.run_with(&inv, OutputMode::Capture) {
            Err(ExecError::ExecutableNotFound { name, .. }) => {
                assert_eq!(name, "edl-test-tool");
            }
            other => panic!("expected ExecutableNotFound, got {other:?}"),
        }
    }
}
