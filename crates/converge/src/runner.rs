//! External command runner
//!
//! Every process the engine starts goes through [`CommandRunner`], which lets
//! tests substitute a scripted implementation for the real system.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl CommandOutput {
    /// Build a successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Build a failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external processes synchronously.
///
/// Implementations never retry and never skip: a call always executes.
pub trait CommandRunner: Send + Sync {
    /// Run `argv` (program first) with an optional working directory
    fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput>;

    /// Run and turn a non-zero exit into [`Error::ExternalCommand`]
    fn run_checked(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        let output = self.run(argv, cwd)?;
        if !output.success() {
            return Err(Error::ExternalCommand {
                command: render(argv),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run and report only whether the exit status was zero
    fn run_status(&self, argv: &[String]) -> Result<bool> {
        Ok(self.run(argv, None)?.success())
    }
}

/// Runner backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        log::debug!("Running: {}", render(argv));
        let output = command.output().map_err(|source| Error::Spawn {
            command: render(argv),
            source,
        })?;

        let output = CommandOutput::from(output);
        log::debug!("Exit {:?} from {}", output.exit_code, program);
        Ok(output)
    }
}

/// Runs commands on a target root.
///
/// For any root other than `/` the command runs under `chroot`, so it sees
/// the same filesystem the checker inspects. A working directory is entered
/// inside the root.
pub struct TargetRunner<'a> {
    inner: &'a dyn CommandRunner,
    root: Option<&'a Path>,
}

impl<'a> TargetRunner<'a> {
    pub fn new(inner: &'a dyn CommandRunner, root: &'a Path) -> Self {
        Self {
            inner,
            root: (root != Path::new("/")).then_some(root),
        }
    }
}

impl CommandRunner for TargetRunner<'_> {
    fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        match self.root {
            Some(root) => self.inner.run(&chroot_argv(root, argv, cwd), None),
            None => self.inner.run(argv, cwd),
        }
    }
}

/// `argv` wrapped to run inside `root`, entering `cwd` first when given
pub fn chroot_argv(root: &Path, command: &[String], cwd: Option<&Path>) -> Vec<String> {
    let mut wrapped = vec!["chroot".to_string(), root.display().to_string()];
    if let Some(dir) = cwd {
        wrapped.extend(argv(&["sh", "-c", "cd \"$0\" && exec \"$@\""]));
        wrapped.push(dir.display().to_string());
    }
    wrapped.extend_from_slice(command);
    wrapped
}

/// Render an argv for messages, quoting arguments that contain whitespace
pub fn render(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build an owned argv from string slices
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}
