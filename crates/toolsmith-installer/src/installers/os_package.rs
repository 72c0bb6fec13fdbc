use std::path::{Path, PathBuf};

use toolsmith_core::Layer;
use tracing::{debug, info};

use crate::conflicts::shell_quote;
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::fs_utils::{files_with_extension, read_text_if_exists};
use crate::installers::{Installer, InstallerReport};
use crate::process::{run_command, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePackageKind {
    Arch,
    Debian,
    Rpm,
}

impl NativePackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arch => "arch",
            Self::Debian => "debian",
            Self::Rpm => "rpm",
        }
    }

    /// Tools that must all be on the search path.
    pub fn toolchain(self) -> &'static [&'static str] {
        match self {
            Self::Arch => &["makepkg"],
            Self::Debian => &["dpkg-buildpackage", "dpkg", "apt-get"],
            Self::Rpm => &["rpmbuild", "dnf"],
        }
    }

    pub fn descriptor(self, repo_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Arch => Some(repo_dir.join("PKGBUILD")).filter(|path| path.is_file()),
            Self::Debian => {
                Some(repo_dir.join("debian").join("control")).filter(|path| path.is_file())
            }
            Self::Rpm => files_with_extension(repo_dir, "spec").into_iter().next(),
        }
    }
}

/// Builds a native package from the checkout and installs it system-wide.
#[derive(Debug, Clone, Copy)]
pub struct OsPackageInstaller {
    kind: NativePackageKind,
}

impl OsPackageInstaller {
    pub fn new(kind: NativePackageKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> NativePackageKind {
        self.kind
    }

    fn install_debian(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), InstallError> {
        run_command(ctx, runner, "dpkg-buildpackage -b -us -uc", false)?;

        let parent = ctx.repo_dir.parent().unwrap_or(&ctx.repo_dir);
        let artifacts = DebianArtifacts::for_checkout(&ctx.repo_dir);
        let debs = artifacts.select(&files_with_extension(parent, "deb"));
        if debs.is_empty() && !ctx.preview() {
            return Err(InstallError::fatal(
                1,
                format!(
                    "dpkg-buildpackage produced no .deb for {} in {}",
                    artifacts.packages.join(", "),
                    parent.display()
                ),
            ));
        }
        let install_cmd = if debs.is_empty() {
            let globs: Vec<String> = artifacts
                .packages
                .iter()
                .map(|package| {
                    format!(
                        "{}/{package}_*.deb",
                        shell_quote(&parent.display().to_string())
                    )
                })
                .collect();
            format!("sudo dpkg -i {}", globs.join(" "))
        } else {
            format!("sudo dpkg -i {}", quoted_paths(&debs))
        };
        run_command(ctx, runner, &install_cmd, false)?;
        run_command(ctx, runner, "sudo apt-get -f install -y", false)?;
        Ok(())
    }

    fn install_rpm(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
        spec: &Path,
    ) -> Result<(), InstallError> {
        let topdir = ctx.repo_file(".rpmbuild");
        let build_cmd = format!(
            "rpmbuild -bb --define {} {}",
            shell_quote(&format!("_topdir {}", topdir.display())),
            shell_quote(&spec.display().to_string())
        );
        run_command(ctx, runner, &build_cmd, false)?;

        let rpms = built_rpms(&topdir.join("RPMS"));
        if rpms.is_empty() && !ctx.preview() {
            return Err(InstallError::fatal(
                1,
                format!("rpmbuild produced no packages under {}", topdir.display()),
            ));
        }
        let install_cmd = if rpms.is_empty() {
            format!(
                "sudo dnf install -y {}/RPMS/*/*.rpm",
                shell_quote(&topdir.display().to_string())
            )
        } else {
            format!("sudo dnf install -y {}", quoted_paths(&rpms))
        };
        run_command(ctx, runner, &install_cmd, false)?;
        Ok(())
    }
}

impl Installer for OsPackageInstaller {
    fn name(&self) -> &'static str {
        match self.kind {
            NativePackageKind::Arch => "os-packages:arch",
            NativePackageKind::Debian => "os-packages:debian",
            NativePackageKind::Rpm => "os-packages:rpm",
        }
    }

    fn layer(&self) -> Option<Layer> {
        Some(Layer::OsPackages)
    }

    fn supports(&self, ctx: &InstallContext) -> bool {
        if self.kind.descriptor(&ctx.repo_dir).is_none() {
            return false;
        }
        let missing: Vec<&str> = self
            .kind
            .toolchain()
            .iter()
            .copied()
            .filter(|tool| !ctx.has_tool(tool))
            .collect();
        if !missing.is_empty() {
            debug!(
                "{} packaging unavailable, missing: {}",
                self.kind.as_str(),
                missing.join(", ")
            );
            return false;
        }
        true
    }

    fn run(
        &self,
        ctx: &InstallContext,
        runner: &dyn CommandRunner,
    ) -> Result<InstallerReport, InstallError> {
        info!(
            "building {} package for '{}'",
            self.kind.as_str(),
            ctx.identifier
        );
        match self.kind {
            NativePackageKind::Arch => {
                run_command(ctx, runner, "makepkg -si --noconfirm", false)?;
            }
            NativePackageKind::Debian => self.install_debian(ctx, runner)?,
            NativePackageKind::Rpm => {
                let spec = self.kind.descriptor(&ctx.repo_dir).ok_or_else(|| {
                    InstallError::fatal(1, format!("no *.spec file in {}", ctx.repo_dir.display()))
                })?;
                self.install_rpm(ctx, runner, &spec)?;
            }
        }
        Ok(InstallerReport::clean())
    }
}

/// Names of the `.deb` files one `dpkg-buildpackage` run of a checkout emits.
///
/// Builds land next to the checkout, in a directory shared with sibling
/// repositories and with earlier builds, so only `<package>_<version>_*.deb`
/// for the binary packages in `debian/control` are taken. Without a readable
/// `debian/changelog` any version of those packages matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebianArtifacts {
    pub packages: Vec<String>,
    pub version: Option<String>,
}

impl DebianArtifacts {
    pub fn for_checkout(repo_dir: &Path) -> Self {
        let debian = repo_dir.join("debian");
        let control = read_text_if_exists(&debian.join("control")).unwrap_or_default();
        let mut packages = control_fields(&control, "Package");
        if packages.is_empty() {
            packages = control_fields(&control, "Source");
        }
        if packages.is_empty() {
            packages = repo_dir
                .file_name()
                .map(|name| vec![name.to_string_lossy().into_owned()])
                .unwrap_or_default();
        }
        let version = read_text_if_exists(&debian.join("changelog"))
            .as_deref()
            .and_then(changelog_version);
        Self { packages, version }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.packages.iter().any(|package| {
            let Some(rest) = file_name.strip_prefix(&format!("{package}_")) else {
                return false;
            };
            match &self.version {
                Some(version) => rest.starts_with(&format!("{version}_")),
                None => true,
            }
        })
    }

    pub fn select(&self, candidates: &[PathBuf]) -> Vec<PathBuf> {
        candidates
            .iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| self.matches(name))
            })
            .cloned()
            .collect()
    }
}

fn control_fields(control: &str, field: &str) -> Vec<String> {
    let prefix = format!("{field}:");
    control
        .lines()
        .filter_map(|line| line.strip_prefix(&prefix))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Version of the newest changelog entry, without its epoch.
fn changelog_version(changelog: &str) -> Option<String> {
    let first = changelog.lines().find(|line| !line.trim().is_empty())?;
    let open = first.find('(')?;
    let close = first[open..].find(')')? + open;
    let version = first[open + 1..close].trim();
    let version = version.split_once(':').map_or(version, |(_, rest)| rest);
    (!version.is_empty()).then(|| version.to_string())
}

fn built_rpms(rpms_dir: &Path) -> Vec<PathBuf> {
    let Ok(arches) = std::fs::read_dir(rpms_dir) else {
        return Vec::new();
    };
    let mut rpms: Vec<PathBuf> = arches
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .flat_map(|arch_dir| files_with_extension(&arch_dir, "rpm"))
        .collect();
    rpms.sort();
    rpms
}

fn quoted_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| shell_quote(&path.display().to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}
