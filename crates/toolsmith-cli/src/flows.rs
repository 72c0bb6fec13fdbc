use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Result};
use toolsmith_core::{classify_command_layer, Layer, RepositoryRecord, Settings};
use toolsmith_installer::{
    default_installers, detect_capabilities, resolve_command, shadow_capabilities, BinLinker,
    Capability, InstallContext, InstallFlags, InstallPipeline, PipelineReport, ProfileSnapshot,
    RateLimitRetry, ShellRunner,
};
use tracing::debug;

use crate::render::{render_status_line, OutputStyle, TerminalRenderer};
use crate::{InstallArgs, SelectionArgs};

/// Records named by `selection`, in settings order.
pub(crate) fn select_repositories(
    all: &[RepositoryRecord],
    selection: &SelectionArgs,
) -> Result<Vec<RepositoryRecord>> {
    if selection.all {
        return Ok(all.to_vec());
    }
    if selection.identifiers.is_empty() {
        return Err(anyhow!(
            "no repositories selected; name at least one or pass --all"
        ));
    }

    for identifier in &selection.identifiers {
        if !all
            .iter()
            .any(|record| record.matches_selector(identifier, all))
        {
            return Err(anyhow!("unknown repository '{identifier}'"));
        }
    }

    Ok(all
        .iter()
        .filter(|record| {
            selection
                .identifiers
                .iter()
                .any(|identifier| record.matches_selector(identifier, all))
        })
        .cloned()
        .collect())
}

pub(crate) fn install_flags(args: &InstallArgs) -> InstallFlags {
    InstallFlags {
        preview: args.preview,
        quiet: args.quiet,
        no_verification: args.no_verification,
        clone_mode: args.clone_mode.into(),
        update_dependencies: args.update_dependencies,
        force_update: args.force_update,
    }
}

/// Returns the exit code of the first repository that failed, or 0.
pub(crate) fn run_install_flow(
    settings: &Settings,
    selected: &[RepositoryRecord],
    args: &InstallArgs,
    renderer: TerminalRenderer,
) -> Result<i32> {
    let flags = install_flags(args);
    let runner = ShellRunner;
    let linker = BinLinker;
    let pipeline = InstallPipeline::new(
        default_installers(settings, RateLimitRetry::new(&settings.retry)),
        &runner,
        &linker,
    );
    debug!("installer order: {}", pipeline.installer_names().join(", "));

    let style = renderer.style();
    let mut progress = renderer.start_progress("install", selected.len() as u64);
    let mut first_failure = None;

    for record in selected {
        let ctx =
            InstallContext::for_repository(record, &settings.repositories, settings, flags.clone());

        if !ctx.repo_dir.is_dir() {
            progress.println(render_status_line(
                style,
                "warn",
                &format!(
                    "skipping '{}': no checkout at {} (clone it over {} first)",
                    ctx.identifier,
                    ctx.repo_dir.display(),
                    flags.clone_mode.as_str()
                ),
            ));
            progress.advance();
            continue;
        }

        match pipeline.run(record, &ctx) {
            Ok(report) => {
                for line in format_install_report(style, &ctx.identifier, &report, args.quiet) {
                    progress.println(line);
                }
            }
            Err(err) => {
                progress.println(render_status_line(style, "error", &err.to_string()));
                first_failure.get_or_insert(err.exit_code());
            }
        }
        progress.advance();
    }

    progress.finish();
    Ok(first_failure.unwrap_or(0))
}

pub(crate) fn format_install_report(
    style: OutputStyle,
    identifier: &str,
    report: &PipelineReport,
    quiet: bool,
) -> Vec<String> {
    let mut lines = Vec::new();
    if !quiet {
        let ran = if report.executed.is_empty() {
            "nothing to run".to_string()
        } else {
            format!("ran {}", report.executed.join(", "))
        };
        let command = match (&report.command, report.layer) {
            (Some(command), Some(layer)) => format!("{command} ({layer})"),
            (Some(command), None) => command.clone(),
            (None, _) => "no command".to_string(),
        };
        lines.push(render_status_line(
            style,
            "ok",
            &format!("{identifier}: {ran}; {command}"),
        ));
        for (installer, reason) in &report.skipped {
            lines.push(render_status_line(
                style,
                "step",
                &format!("{identifier}: skipped {installer}: {reason}"),
            ));
        }
    }
    for warning in &report.warnings {
        lines.push(render_status_line(style, "warn", warning));
    }
    lines
}

/// Prints each record's resolved command; returns 1 if any could not be resolved.
pub(crate) fn run_resolve_flow(
    settings: &Settings,
    selected: &[RepositoryRecord],
    renderer: TerminalRenderer,
) -> i32 {
    let mut code = 0;
    for record in selected {
        let ctx = InstallContext::for_repository(
            record,
            &settings.repositories,
            settings,
            InstallFlags::default(),
        );
        match resolve_command(record, &ctx) {
            Ok(Some(command)) => {
                let command = anchor_command(&command, &ctx.repo_dir);
                let layer =
                    classify_command_layer(&command, &ctx.repo_dir, ctx.home_dir.as_deref());
                renderer.print_status("ok", &format!("{}: {command} ({layer})", ctx.identifier));
            }
            Ok(None) => {
                renderer.print_status("step", &format!("{}: command disabled", ctx.identifier));
            }
            Err(err) => {
                renderer.print_status("error", &err.to_string());
                code = 1;
            }
        }
    }
    code
}

fn anchor_command(command: &str, repo_dir: &Path) -> String {
    if Path::new(command).is_absolute() {
        command.to_string()
    } else {
        repo_dir.join(command).display().to_string()
    }
}

pub(crate) fn format_capability_lines(repo_dir: &Path) -> Vec<String> {
    let layers = Layer::weak_to_strong();
    let raw = detect_capabilities(repo_dir, &layers);
    let effective = shadow_capabilities(&raw, &layers);

    Layer::ALL
        .iter()
        .map(|layer| {
            format!(
                "{:<12} raw: {:<40} effective: {}",
                layer.as_str(),
                join_capabilities(raw.get(layer)),
                join_capabilities(effective.get(layer))
            )
        })
        .collect()
}

fn join_capabilities(capabilities: Option<&BTreeSet<Capability>>) -> String {
    match capabilities {
        Some(capabilities) if !capabilities.is_empty() => capabilities
            .iter()
            .map(|capability| capability.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => "-".to_string(),
    }
}

pub(crate) fn format_profile_lines(snapshot: &ProfileSnapshot, output: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    if snapshot.is_empty() {
        lines.push("nix profile is empty".to_string());
    }
    for entry in &snapshot.entries {
        let selector = entry.selector().unwrap_or_else(|| "-".to_string());
        let label = entry
            .attr_path
            .as_deref()
            .or(entry.name.as_deref())
            .or(entry.pname.as_deref())
            .unwrap_or("<unnamed>");
        let url = entry.original_url.as_deref().unwrap_or("-");
        lines.push(format!("{selector:<6} {label}  {url}"));
    }

    if let Some(output) = output {
        let selectors = snapshot.find_installed_indices_for_output(output, None);
        let tokens = snapshot.find_remove_tokens_for_output(output, None);
        lines.push(format!("selectors for '{output}': {}", join_or_none(&selectors)));
        lines.push(format!("removal tokens for '{output}': {}", join_or_none(&tokens)));
    }
    lines
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(" ")
    }
}
