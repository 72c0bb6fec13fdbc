use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use toolsmith_core::Settings;
use toolsmith_installer::{CommandRunner, ProfileSnapshot, ShellRunner, PROFILE_LIST_COMMAND};

use crate::completion::write_completions_script;
use crate::flows::{
    format_capability_lines, format_profile_lines, run_install_flow, run_resolve_flow,
    select_repositories,
};
use crate::render::{current_output_style, TerminalRenderer};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<i32> {
    let renderer = TerminalRenderer::from_style(current_output_style(cli.plain));

    match cli.command {
        Commands::Install(args) => {
            let settings = load_settings(cli.config)?;
            let selected = select_repositories(&settings.repositories, &args.selection)?;
            run_install_flow(&settings, &selected, &args, renderer)
        }
        Commands::Resolve(selection) => {
            let settings = load_settings(cli.config)?;
            let selected = select_repositories(&settings.repositories, &selection)?;
            Ok(run_resolve_flow(&settings, &selected, renderer))
        }
        Commands::Capabilities { identifier } => {
            let settings = load_settings(cli.config)?;
            let selection = crate::SelectionArgs {
                identifiers: vec![identifier],
                all: false,
            };
            let selected = select_repositories(&settings.repositories, &selection)?;
            let home_dir = std::env::var_os("HOME").map(PathBuf::from);
            let repositories_dir = settings.repositories_dir(home_dir.as_deref());
            for record in &selected {
                let repo_dir = record.checkout_dir(&repositories_dir);
                renderer.print_section(&record.full_name());
                renderer.print_lines(&format_capability_lines(&repo_dir));
            }
            Ok(0)
        }
        Commands::Profile { output, json } => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            let outcome = ShellRunner.execute(PROFILE_LIST_COMMAND, &cwd)?;
            if !outcome.is_success() {
                return Err(anyhow!(
                    "'{PROFILE_LIST_COMMAND}' exited with {}: {}",
                    outcome.code,
                    outcome.combined_output().trim()
                ));
            }
            let snapshot = ProfileSnapshot::from_json(&outcome.stdout);
            if json {
                let rendered = serde_json::to_string_pretty(&snapshot)
                    .context("failed to render profile snapshot")?;
                println!("{rendered}");
            } else {
                renderer.print_lines(&format_profile_lines(&snapshot, output.as_deref()));
            }
            Ok(0)
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
            stdout.flush().context("failed to flush completion script")?;
            Ok(0)
        }
    }
}

pub(crate) fn default_settings_path(home_dir: Option<PathBuf>) -> Result<PathBuf> {
    let home = home_dir.ok_or_else(|| anyhow!("HOME is not set; pass --config explicitly"))?;
    Ok(home.join(".config").join("toolsmith").join("config.toml"))
}

fn load_settings(explicit: Option<PathBuf>) -> Result<Settings> {
    match explicit {
        Some(path) => Settings::load(&path),
        None => {
            let path = default_settings_path(std::env::var_os("HOME").map(PathBuf::from))?;
            Settings::load_or_default(&path)
        }
    }
}
