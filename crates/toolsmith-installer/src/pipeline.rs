use std::collections::BTreeSet;
use std::path::Path;

use toolsmith_core::{classify_command_layer, CommandField, Layer, RepositoryRecord};
use tracing::{debug, info, warn};

use crate::capabilities::{layer_capabilities, Capability};
use crate::context::InstallContext;
use crate::error::PipelineError;
use crate::exposure::CommandLinker;
use crate::installers::Installer;
use crate::process::CommandRunner;
use crate::resolve::resolve_command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A stronger layer owns the current command.
    StrongerLayerOwnsCommand(Layer),
    SameLayerOwnsCommand(Layer),
    Unsupported,
    /// Everything this installer would deliver is already delivered.
    CapabilitiesProvided(BTreeSet<Capability>),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongerLayerOwnsCommand(layer) => {
                write!(f, "command owned by stronger layer {layer}")
            }
            Self::SameLayerOwnsCommand(layer) => write!(f, "command already owned by {layer}"),
            Self::Unsupported => f.write_str("not supported for this checkout"),
            Self::CapabilitiesProvided(capabilities) => write!(
                f,
                "capabilities already provided: {}",
                capabilities
                    .iter()
                    .map(|capability| capability.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Copy of the input record with `command` brought up to date.
    pub record: RepositoryRecord,
    pub command: Option<String>,
    pub layer: Option<Layer>,
    pub executed: Vec<&'static str>,
    pub skipped: Vec<(&'static str, SkipReason)>,
    pub provided: BTreeSet<Capability>,
    pub warnings: Vec<String>,
}

impl PipelineReport {
    fn new(record: &RepositoryRecord) -> Self {
        Self {
            record: record.clone(),
            command: None,
            layer: None,
            executed: Vec::new(),
            skipped: Vec::new(),
            provided: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub fn was_executed(&self, installer: &str) -> bool {
        self.executed.contains(&installer)
    }

    pub fn skip_reason(&self, installer: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(name, _)| *name == installer)
            .map(|(_, reason)| reason)
    }
}

/// Runs every installer for one repository, strongest tier first.
///
/// An installer is skipped when the current command already belongs to its
/// tier or a stronger one, when it does not support the checkout, or when the
/// capabilities it would contribute were all delivered by an earlier one.
/// The command is re-resolved and re-linked after each installer that ran.
pub struct InstallPipeline<'a> {
    installers: Vec<Box<dyn Installer>>,
    runner: &'a dyn CommandRunner,
    linker: &'a dyn CommandLinker,
}

impl<'a> InstallPipeline<'a> {
    pub fn new(
        installers: Vec<Box<dyn Installer>>,
        runner: &'a dyn CommandRunner,
        linker: &'a dyn CommandLinker,
    ) -> Self {
        Self {
            installers,
            runner,
            linker,
        }
    }

    pub fn installer_names(&self) -> Vec<&'static str> {
        self.installers.iter().map(|installer| installer.name()).collect()
    }

    pub fn run(
        &self,
        record: &RepositoryRecord,
        ctx: &InstallContext,
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::new(record);
        self.refresh_command(record, ctx, &mut report);

        for installer in &self.installers {
            let name = installer.name();
            if let Some(reason) = self.skip_reason(installer.as_ref(), ctx, &report) {
                debug!("skipping installer '{name}' for '{}': {reason}", ctx.identifier);
                report.skipped.push((name, reason));
                continue;
            }

            info!("running installer '{name}' for '{}'", ctx.identifier);
            let outcome = installer
                .run(ctx, self.runner)
                .map_err(|source| PipelineError {
                    installer: name,
                    identifier: ctx.identifier.clone(),
                    repo_dir: ctx.repo_dir.clone(),
                    source,
                })?;
            report.warnings.extend(outcome.warnings);
            report.executed.push(name);
            report.provided.extend(contributed_capabilities(installer.as_ref(), ctx));

            self.refresh_command(record, ctx, &mut report);
        }

        Ok(report)
    }

    fn skip_reason(
        &self,
        installer: &dyn Installer,
        ctx: &InstallContext,
        report: &PipelineReport,
    ) -> Option<SkipReason> {
        if let (Some(own), Some(current)) = (installer.layer(), report.layer) {
            if current.is_stronger_than(Some(own)) {
                return Some(SkipReason::StrongerLayerOwnsCommand(current));
            }
            if current == own {
                return Some(SkipReason::SameLayerOwnsCommand(current));
            }
        }

        if !installer.supports(ctx) {
            return Some(SkipReason::Unsupported);
        }

        let contributed = contributed_capabilities(installer, ctx);
        if !contributed.is_empty() && contributed.is_subset(&report.provided) {
            return Some(SkipReason::CapabilitiesProvided(contributed));
        }
        None
    }

    /// Resolves against the caller's record so a declared command stays
    /// authoritative while a discovered one can be superseded later.
    fn refresh_command(
        &self,
        declared: &RepositoryRecord,
        ctx: &InstallContext,
        report: &mut PipelineReport,
    ) {
        let resolved = match resolve_command(declared, ctx) {
            Ok(command) => command,
            Err(err) => {
                debug!("no command for '{}' yet: {err}", ctx.identifier);
                None
            }
        };

        let Some(command) = resolved.map(|command| absolute_command(&command, &ctx.repo_dir))
        else {
            report.command = None;
            report.layer = None;
            report.record.command = match declared.command {
                CommandField::Disabled => CommandField::Disabled,
                _ => CommandField::Unset,
            };
            return;
        };

        let layer = classify_command_layer(&command, &ctx.repo_dir, ctx.home_dir.as_deref());
        debug!("'{}' resolves to {command} ({layer})", ctx.identifier);
        report.record.command = CommandField::Path(command.clone());
        report.layer = Some(layer);

        match self.linker.link(ctx, &report.record, &command) {
            Ok(linked) => {
                for path in linked {
                    debug!("exposed {}", path.display());
                }
            }
            Err(err) => {
                let message = format!("could not link '{}': {err:#}", ctx.identifier);
                warn!("{message}");
                report.warnings.push(message);
            }
        }
        report.command = Some(command);
    }
}

/// Raw capabilities detected for the installer's own layer.
pub fn contributed_capabilities(
    installer: &dyn Installer,
    ctx: &InstallContext,
) -> BTreeSet<Capability> {
    installer
        .layer()
        .map(|layer| layer_capabilities(&ctx.repo_dir, layer))
        .unwrap_or_default()
}

fn absolute_command(command: &str, repo_dir: &Path) -> String {
    let path = Path::new(command);
    if path.is_absolute() {
        command.to_string()
    } else {
        repo_dir.join(path).display().to_string()
    }
}
