use toolsmith_core::Layer;
use tracing::debug;

use crate::capabilities::{makefile_declares_install_target, MAKEFILE_NAMES};
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::fs_utils::read_text_if_exists;
use crate::installers::{Installer, InstallerReport};
use crate::process::{run_command, CommandRunner};

#[derive(Debug, Clone, Copy, Default)]
pub struct MakefileInstaller;

impl MakefileInstaller {
    fn has_install_target(ctx: &InstallContext) -> bool {
        MAKEFILE_NAMES
            .iter()
            .filter_map(|name| read_text_if_exists(&ctx.repo_file(name)))
            .any(|text| makefile_declares_install_target(&text))
    }
}

impl Installer for MakefileInstaller {
    fn name(&self) -> &'static str {
        "makefile"
    }

    fn layer(&self) -> Option<Layer> {
        Some(Layer::Makefile)
    }

    fn supports(&self, ctx: &InstallContext) -> bool {
        if ctx.toggles.disable_makefile {
            debug!("makefile installer disabled by environment");
            return false;
        }
        Self::has_install_target(ctx)
    }

    fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<InstallerReport, InstallError> {
        run_command(ctx, runner, "make install", false)?;
        Ok(InstallerReport::clean())
    }
}
