//! Typed failures raised by installers, command resolution and the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Outcome of an installer that could not complete.
#[derive(Error, Debug)]
pub enum InstallError {
    /// A required step failed; `code` is the underlying process exit code.
    #[error("{context} (exit code {code})")]
    Fatal { code: i32, context: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl InstallError {
    pub fn fatal(code: i32, context: impl Into<String>) -> Self {
        Self::Fatal {
            code: normalized_exit_code(code),
            context: context.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal { code, .. } => *code,
            Self::Internal(_) => 1,
        }
    }
}

/// Why no authoritative command could be determined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(
        "repository '{identifier}' is a python package with a module entry point, but no installed command was found"
    )]
    MissingEntryPoint { identifier: String },

    #[error("no command found for repository '{identifier}'; tried: {}", render_attempts(.attempted))]
    NoCommand {
        identifier: String,
        attempted: Vec<PathBuf>,
    },
}

/// A repository pass aborted by a fatal installer failure.
#[derive(Error, Debug)]
#[error(
    "installer '{installer}' failed for repository '{identifier}' in {}: {source}\nhint: re-run only this repository to isolate the failure: toolsmith install {identifier}",
    .repo_dir.display()
)]
pub struct PipelineError {
    pub installer: &'static str,
    pub identifier: String,
    pub repo_dir: PathBuf,
    #[source]
    pub source: InstallError,
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }

    pub fn isolation_command(&self) -> String {
        format!("toolsmith install {}", self.identifier)
    }
}

/// Zero would report success for a failure.
pub fn normalized_exit_code(code: i32) -> i32 {
    if code == 0 {
        1
    } else {
        code
    }
}

fn render_attempts(attempted: &[PathBuf]) -> String {
    if attempted.is_empty() {
        return "<nothing>".to_string();
    }
    attempted
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
