//! Installation mechanisms, one per layer tier.

mod makefile;
mod nix_profile;
mod os_package;
mod python;

use toolsmith_core::{Layer, Settings};

use crate::context::InstallContext;
use crate::error::InstallError;
use crate::process::CommandRunner;
use crate::retry::RateLimitRetry;

pub use makefile::MakefileInstaller;
pub use nix_profile::{NixOutput, NixProfileInstaller};
pub use os_package::{DebianArtifacts, NativePackageKind, OsPackageInstaller};
pub use python::{PipResolution, PythonInstaller};

/// Non-fatal findings of one installer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallerReport {
    pub warnings: Vec<String>,
}

impl InstallerReport {
    pub fn clean() -> Self {
        Self::default()
    }
}

pub trait Installer {
    fn name(&self) -> &'static str;

    /// Tier this installer competes in; `None` opts out of precedence checks.
    fn layer(&self) -> Option<Layer>;

    fn supports(&self, ctx: &InstallContext) -> bool;

    fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<InstallerReport, InstallError>;
}

/// Every installer in dispatch order, strongest tier first.
pub fn default_installers(settings: &Settings, retry: RateLimitRetry) -> Vec<Box<dyn Installer>> {
    vec![
        Box::new(OsPackageInstaller::new(NativePackageKind::Arch)),
        Box::new(OsPackageInstaller::new(NativePackageKind::Debian)),
        Box::new(OsPackageInstaller::new(NativePackageKind::Rpm)),
        Box::new(NixProfileInstaller::new(&settings.nix, retry)),
        Box::new(PythonInstaller),
        Box::new(MakefileInstaller),
    ]
}
