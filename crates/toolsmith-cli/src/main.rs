mod completion;
mod dispatch;
mod flows;
mod render;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use toolsmith_installer::CloneMode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub(crate) const LOG_ENV: &str = "TOOLSMITH_LOG";

#[derive(Parser, Debug)]
#[command(name = "toolsmith")]
#[command(about = "Install tool repositories and expose one command for each", long_about = None)]
pub(crate) struct Cli {
    /// Settings file; defaults to ~/.config/toolsmith/config.toml
    #[arg(long, global = true, env = "TOOLSMITH_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Disable badges, colors and progress bars
    #[arg(long, global = true)]
    pub(crate) plain: bool,
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the installers for the selected repositories
    Install(InstallArgs),
    /// Show the command and layer each selected repository resolves to
    Resolve(SelectionArgs),
    /// Show raw and effective capabilities of one repository
    Capabilities { identifier: String },
    /// Inspect the nix profile as the installer sees it
    Profile {
        /// Also show selectors and removal tokens for this flake output
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print a shell completion script
    Completions { shell: Shell },
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct SelectionArgs {
    /// Repository names, aliases or provider/account/repository triples
    pub(crate) identifiers: Vec<String>,
    #[arg(long, conflicts_with = "identifiers")]
    pub(crate) all: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct InstallArgs {
    #[command(flatten)]
    pub(crate) selection: SelectionArgs,
    /// Log every command instead of running it
    #[arg(long)]
    pub(crate) preview: bool,
    #[arg(long, short)]
    pub(crate) quiet: bool,
    #[arg(long)]
    pub(crate) no_verification: bool,
    #[arg(long)]
    pub(crate) update_dependencies: bool,
    #[arg(long)]
    pub(crate) force_update: bool,
    #[arg(long, value_enum, default_value_t = CliCloneMode::Ssh)]
    pub(crate) clone_mode: CliCloneMode,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CliCloneMode {
    Ssh,
    Https,
    Shallow,
}

impl From<CliCloneMode> for CloneMode {
    fn from(value: CliCloneMode) -> Self {
        match value {
            CliCloneMode::Ssh => CloneMode::Ssh,
            CliCloneMode::Https => CloneMode::Https,
            CliCloneMode::Shallow => CloneMode::Shallow,
        }
    }
}

impl Cli {
    fn quiet(&self) -> bool {
        matches!(&self.command, Commands::Install(args) if args.quiet)
    }
}

pub(crate) fn default_log_directive(quiet: bool) -> &'static str {
    if quiet {
        "toolsmith=warn"
    } else {
        "toolsmith=info"
    }
}

fn init_tracing(quiet: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_log_directive(quiet)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(render::ProgressAwareStderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet());

    let code = dispatch::run_cli(cli)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
