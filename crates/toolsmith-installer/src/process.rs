use std::path::Path;
use std::process::Command;

use anyhow::Context;
use tracing::{debug, info, trace};

use crate::context::InstallContext;
use crate::error::InstallError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success() -> Self {
        Self {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn combined_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Executes one shell command line in a working directory.
pub trait CommandRunner {
    fn execute(&self, command: &str, cwd: &Path) -> anyhow::Result<CommandOutcome>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn execute(&self, command: &str, cwd: &Path) -> anyhow::Result<CommandOutcome> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .with_context(|| format!("failed to start '{command}' in {}", cwd.display()))?;

        Ok(CommandOutcome {
            // signal-terminated processes have no code
            code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs `command` in the repository checkout.
///
/// Preview mode never reaches the runner and reports a synthetic success. A
/// failing command becomes [`InstallError::Fatal`] carrying its exit code unless
/// `allow_failure` is set, in which case the failing outcome is returned.
pub fn run_command(
    ctx: &InstallContext,
    runner: &dyn CommandRunner,
    command: &str,
    allow_failure: bool,
) -> Result<CommandOutcome, InstallError> {
    run_command_in(ctx, runner, command, &ctx.repo_dir, allow_failure)
}

pub fn run_command_in(
    ctx: &InstallContext,
    runner: &dyn CommandRunner,
    command: &str,
    cwd: &Path,
    allow_failure: bool,
) -> Result<CommandOutcome, InstallError> {
    if ctx.preview() {
        info!("[preview] {}: {command}", cwd.display());
        return Ok(CommandOutcome::success());
    }

    if ctx.flags.quiet {
        debug!("running in {}: {command}", cwd.display());
    } else {
        info!("running in {}: {command}", cwd.display());
    }

    let outcome = runner.execute(command, cwd)?;
    log_output(ctx, &outcome);

    if outcome.is_success() || allow_failure {
        return Ok(outcome);
    }

    Err(InstallError::fatal(
        outcome.code,
        format!(
            "command '{command}' failed in {}: stdout='{}' stderr='{}'",
            cwd.display(),
            outcome.stdout.trim(),
            outcome.stderr.trim()
        ),
    ))
}

fn log_output(ctx: &InstallContext, outcome: &CommandOutcome) {
    for (stream, text) in [("stdout", &outcome.stdout), ("stderr", &outcome.stderr)] {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if ctx.flags.quiet {
            trace!(stream, code = outcome.code, "{text}");
        } else {
            debug!(stream, code = outcome.code, "{text}");
        }
    }
}
