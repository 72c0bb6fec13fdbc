use std::path::PathBuf;

use toolsmith_core::Layer;
use tracing::{debug, info};

use crate::conflicts::shell_quote;
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::installers::{Installer, InstallerReport};
use crate::process::{run_command, CommandRunner};

/// Where the pip used for a repository comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipResolution {
    Override(String),
    ActiveVirtualEnv(PathBuf),
    /// Per-repository venv; `create` is set when it does not exist yet.
    Isolated { venv: PathBuf, create: bool },
}

impl PipResolution {
    pub fn for_context(ctx: &InstallContext) -> Self {
        if let Some(pip) = ctx.toggles.pip_override.as_deref() {
            return Self::Override(pip.to_string());
        }
        if let Some(venv) = ctx.toggles.virtual_env.as_deref() {
            return Self::ActiveVirtualEnv(venv.join("bin").join("pip"));
        }
        let venv = ctx.isolated_venv_dir();
        let create = !venv.join("bin").join("pip").exists();
        Self::Isolated { venv, create }
    }

    pub fn pip_command(&self) -> String {
        match self {
            Self::Override(pip) => pip.clone(),
            Self::ActiveVirtualEnv(pip) => shell_quote(&pip.display().to_string()),
            Self::Isolated { venv, .. } => {
                shell_quote(&venv.join("bin").join("pip").display().to_string())
            }
        }
    }
}

/// Installs `pyproject.toml` projects with pip, never into the system interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonInstaller;

impl Installer for PythonInstaller {
    fn name(&self) -> &'static str {
        "python"
    }

    fn layer(&self) -> Option<Layer> {
        Some(Layer::Python)
    }

    fn supports(&self, ctx: &InstallContext) -> bool {
        if ctx.toggles.disable_python {
            debug!("python installer disabled by environment");
            return false;
        }
        ctx.repo_file("pyproject.toml").is_file()
    }

    fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<InstallerReport, InstallError> {
        let pip = PipResolution::for_context(ctx);
        if let PipResolution::Isolated { venv, create: true } = &pip {
            info!("creating isolated venv for '{}' at {}", ctx.identifier, venv.display());
            let create_cmd = format!(
                "python3 -m venv {}",
                shell_quote(&venv.display().to_string())
            );
            run_command(ctx, runner, &create_cmd, false)?;
        }

        let mut install_cmd = format!("{} install", pip.pip_command());
        if ctx.flags.update_dependencies || ctx.flags.force_update {
            install_cmd.push_str(" --upgrade");
        }
        install_cmd.push_str(" .");
        run_command(ctx, runner, &install_cmd, false)?;
        Ok(InstallerReport::clean())
    }
}
