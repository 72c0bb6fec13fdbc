use toolsmith_core::{Layer, NixSettings};
use tracing::{debug, info, warn};

use crate::conflicts::{shell_quote, ConflictResolver};
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::installers::{Installer, InstallerReport};
use crate::process::{run_command, CommandOutcome, CommandRunner};
use crate::profile::ProfileInspector;
use crate::retry::RateLimitRetry;

/// One flake output to keep installed in the user's profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NixOutput {
    pub name: String,
    pub optional: bool,
}

impl NixOutput {
    fn mandatory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Installs flake outputs with `nix profile`.
///
/// The install-only path falls back through conflict resolution, an in-place
/// upgrade of matching profile elements, and finally remove plus one more
/// install. `force_update` tries the upgrade first instead.
#[derive(Debug, Clone)]
pub struct NixProfileInstaller {
    retry: RateLimitRetry,
    self_referential: Vec<String>,
    conflict_rounds: u32,
}

impl NixProfileInstaller {
    pub fn new(settings: &NixSettings, retry: RateLimitRetry) -> Self {
        Self {
            retry,
            self_referential: settings.self_referential.clone(),
            conflict_rounds: settings.conflict_rounds,
        }
    }

    pub fn outputs_for(&self, identifier: &str) -> Vec<NixOutput> {
        if self.self_referential.iter().any(|name| name == identifier) {
            vec![
                NixOutput::mandatory(identifier),
                NixOutput::optional("default"),
            ]
        } else {
            vec![NixOutput::mandatory("default")]
        }
    }

    pub fn install_command(ctx: &InstallContext, output: &str) -> String {
        let installable = format!("{}#{output}", ctx.repo_dir.display());
        format!("nix profile install {}", shell_quote(&installable))
    }

    fn ensure_output(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        output: &str,
    ) -> Result<(), InstallError> {
        if ctx.flags.force_update {
            self.force_upgrade(ctx, runner, output)
        } else {
            self.install_only(ctx, runner, output)
        }
    }

    fn install_only(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        output: &str,
    ) -> Result<(), InstallError> {
        let install_cmd = Self::install_command(ctx, output);
        let outcome = self.retry.run(ctx, runner, &install_cmd)?;
        if outcome.is_success() {
            return Ok(());
        }

        let resolver = ConflictResolver::new(runner, &self.retry);
        if resolver.resolve(ctx, &install_cmd, &outcome, output, self.conflict_rounds) {
            return Ok(());
        }

        let selectors = self.matching_selectors(ctx, runner, output);
        if self.upgrade_any(ctx, runner, &selectors) {
            return Ok(());
        }

        self.remove_selectors(ctx, runner, &selectors);
        let last = run_command(ctx, runner, &install_cmd, true)?;
        if last.is_success() {
            return Ok(());
        }
        Err(exhausted(output, &install_cmd, &last))
    }

    fn force_upgrade(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        output: &str,
    ) -> Result<(), InstallError> {
        let selectors = self.matching_selectors(ctx, runner, output);
        if self.upgrade_any(ctx, runner, &selectors) {
            return Ok(());
        }

        self.remove_selectors(ctx, runner, &selectors);
        let install_cmd = Self::install_command(ctx, output);
        let outcome = self.retry.run(ctx, runner, &install_cmd)?;
        if outcome.is_success() {
            return Ok(());
        }

        let resolver = ConflictResolver::new(runner, &self.retry);
        if resolver.resolve(ctx, &install_cmd, &outcome, output, self.conflict_rounds) {
            return Ok(());
        }
        Err(exhausted(output, &install_cmd, &outcome))
    }

    fn matching_selectors(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        output: &str,
    ) -> Vec<String> {
        ProfileInspector::new(runner)
            .snapshot(ctx)
            .find_installed_indices_for_output(output, Some(&ctx.repo_dir))
    }

    fn upgrade_any(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        selectors: &[String],
    ) -> bool {
        let mut upgraded = false;
        for selector in selectors {
            let upgrade_cmd = format!("nix profile upgrade --refresh {}", shell_quote(selector));
            match self.retry.run(ctx, runner, &upgrade_cmd) {
                Ok(outcome) if outcome.is_success() => {
                    info!("upgraded nix profile element '{selector}'");
                    upgraded = true;
                }
                Ok(outcome) => debug!("'{upgrade_cmd}' exited with {}", outcome.code),
                Err(err) => warn!("'{upgrade_cmd}' could not run: {err}"),
            }
        }
        upgraded
    }

    fn remove_selectors(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        selectors: &[String],
    ) {
        for selector in selectors {
            let remove_cmd = format!("nix profile remove {}", shell_quote(selector));
            match run_command(ctx, runner, &remove_cmd, true) {
                Ok(outcome) if !outcome.is_success() => {
                    debug!("'{remove_cmd}' exited with {}", outcome.code)
                }
                Ok(_) => {}
                Err(err) => warn!("'{remove_cmd}' could not run: {err}"),
            }
        }
    }
}

impl Installer for NixProfileInstaller {
    fn name(&self) -> &'static str {
        "nix"
    }

    fn layer(&self) -> Option<Layer> {
        Some(Layer::Nix)
    }

    fn supports(&self, ctx: &InstallContext) -> bool {
        if ctx.toggles.disable_nix {
            debug!("nix installer disabled by environment");
            return false;
        }
        if ctx.toggles.in_nix_shell {
            debug!("inside a nix shell; flake outputs are already active");
            return false;
        }
        if !ctx.has_tool("nix") {
            return false;
        }
        ctx.repo_file("flake.nix").is_file()
    }

    fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<InstallerReport, InstallError> {
        let mut report = InstallerReport::clean();
        for output in self.outputs_for(&ctx.identifier) {
            match self.ensure_output(ctx, runner, &output.name) {
                Ok(()) => info!(
                    "nix output '{}' of '{}' is installed",
                    output.name, ctx.identifier
                ),
                Err(err) if output.optional => {
                    let message = format!(
                        "optional nix output '{}' of '{}' could not be installed: {err}",
                        output.name, ctx.identifier
                    );
                    warn!("{message}");
                    report.warnings.push(message);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }
}

fn exhausted(output: &str, install_cmd: &str, last: &CommandOutcome) -> InstallError {
    InstallError::fatal(
        last.code,
        format!(
            "'{install_cmd}' for output '{output}' still failed after every fallback: {}",
            last.combined_output().trim()
        ),
    )
}
