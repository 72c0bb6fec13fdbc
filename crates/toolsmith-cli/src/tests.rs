use super::*;

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::error::ErrorKind;
use toolsmith_core::{Layer, RepositoryRecord};
use toolsmith_installer::{PipelineReport, ProfileSnapshot, SkipReason};
use tracing_subscriber::fmt::MakeWriter;

use crate::completion::write_completions_script;
use crate::dispatch::default_settings_path;
use crate::flows::{
    format_capability_lines, format_install_report, format_profile_lines, install_flags,
    select_repositories,
};
use crate::render::{
    active_progress, render_progress_line, render_status_line, resolve_output_style,
    OutputStyle, ProgressAwareStderr, TerminalRenderer,
};

fn records() -> Vec<RepositoryRecord> {
    let mut dotfiles = RepositoryRecord::new("github.com", "alice", "dotfiles");
    dotfiles.alias = Some("dots".to_string());
    vec![
        RepositoryRecord::new("github.com", "alice", "toolsmith"),
        dotfiles,
        RepositoryRecord::new("github.com", "alice", "scripts"),
        RepositoryRecord::new("gitlab.com", "bob", "scripts"),
    ]
}

fn selection(identifiers: &[&str]) -> SelectionArgs {
    SelectionArgs {
        identifiers: identifiers.iter().map(|value| value.to_string()).collect(),
        all: false,
    }
}

fn report(record: RepositoryRecord) -> PipelineReport {
    PipelineReport {
        record,
        command: Some("/home/alice/.nix-profile/bin/toolsmith".to_string()),
        layer: Some(Layer::Nix),
        executed: vec!["nix-profile"],
        skipped: vec![("python", SkipReason::StrongerLayerOwnsCommand(Layer::Nix))],
        provided: BTreeSet::new(),
        warnings: vec!["optional output 'default' failed".to_string()],
    }
}

#[test]
fn cli_parses_install_with_flags() {
    let cli = Cli::try_parse_from([
        "toolsmith",
        "install",
        "toolsmith",
        "dots",
        "--preview",
        "--force-update",
        "--clone-mode",
        "https",
    ])
    .expect("command must parse");

    match cli.command {
        Commands::Install(args) => {
            assert_eq!(args.selection.identifiers, vec!["toolsmith", "dots"]);
            assert!(!args.selection.all);
            assert!(args.preview);
            assert!(args.force_update);
            assert!(!args.update_dependencies);
            assert_eq!(args.clone_mode, CliCloneMode::Https);

            let flags = install_flags(&args);
            assert!(flags.preview);
            assert!(flags.force_update);
            assert_eq!(flags.clone_mode, toolsmith_installer::CloneMode::Https);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_defaults_clone_mode_to_ssh() {
    let cli = Cli::try_parse_from(["toolsmith", "install", "--all"]).expect("command must parse");
    match cli.command {
        Commands::Install(args) => {
            assert!(args.selection.all);
            assert_eq!(args.clone_mode, CliCloneMode::Ssh);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_all_together_with_identifiers() {
    let err = Cli::try_parse_from(["toolsmith", "install", "--all", "toolsmith"])
        .expect_err("--all and identifiers must conflict");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn cli_accepts_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "toolsmith",
        "resolve",
        "scripts",
        "--plain",
        "--config",
        "/tmp/toolsmith.toml",
    ])
    .expect("command must parse");
    assert!(cli.plain);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/toolsmith.toml")));
    assert!(!cli.quiet());
}

#[test]
fn quiet_only_applies_to_install() {
    let cli = Cli::try_parse_from(["toolsmith", "install", "-q", "toolsmith"])
        .expect("command must parse");
    assert!(cli.quiet());
    assert_eq!(default_log_directive(cli.quiet()), "toolsmith=warn");
    assert_eq!(default_log_directive(false), "toolsmith=info");
}

#[test]
fn cli_parses_profile_inspection() {
    let cli = Cli::try_parse_from(["toolsmith", "profile", "--output", "default", "--json"])
        .expect("command must parse");
    match cli.command {
        Commands::Profile { output, json } => {
            assert_eq!(output.as_deref(), Some("default"));
            assert!(json);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn select_repositories_matches_name_alias_and_triple() {
    let all = records();
    let selected = select_repositories(
        &all,
        &selection(&["dots", "toolsmith", "gitlab.com/bob/scripts"]),
    )
    .expect("selection must resolve");

    let names: Vec<String> = selected.iter().map(RepositoryRecord::full_name).collect();
    assert_eq!(
        names,
        vec![
            "github.com/alice/toolsmith",
            "github.com/alice/dotfiles",
            "gitlab.com/bob/scripts",
        ]
    );
}

#[test]
fn select_repositories_requires_full_name_for_ambiguous_repository() {
    let all = records();
    let err = select_repositories(&all, &selection(&["scripts"]))
        .expect_err("short name shared by two records is not an identifier");
    assert!(err.to_string().contains("unknown repository 'scripts'"));
}

#[test]
fn select_repositories_rejects_empty_selection() {
    let err = select_repositories(&records(), &SelectionArgs::default())
        .expect_err("empty selection must fail");
    assert!(err.to_string().contains("--all"));
}

#[test]
fn select_all_keeps_settings_order() {
    let all = records();
    let selected = select_repositories(
        &all,
        &SelectionArgs {
            identifiers: Vec::new(),
            all: true,
        },
    )
    .expect("selection must resolve");
    assert_eq!(selected, all);
}

#[test]
fn status_line_plain_prefixes_warnings_and_errors() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed toolsmith"),
        "installed toolsmith"
    );
    assert_eq!(
        render_status_line(OutputStyle::Plain, "step", "skipped python"),
        "skipped python"
    );
    assert_eq!(
        render_status_line(OutputStyle::Plain, "warn", "optional nix output failed"),
        "warning: optional nix output failed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Plain, "error", "installer failed"),
        "error: installer failed"
    );
}

#[test]
fn status_line_rich_uses_badges() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "done"),
        "[OK] done"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "careful"),
        "[WARN] careful"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "error", "failed"),
        "[ERR] failed"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "skipped"),
        "[..] skipped"
    );
}

#[test]
fn output_style_follows_stdout_tty() {
    assert_eq!(resolve_output_style(true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false), OutputStyle::Plain);
}

#[test]
fn rich_progress_is_registered_for_log_output_until_dropped() {
    let plain = TerminalRenderer::from_style(OutputStyle::Plain).start_progress("install", 2);
    assert!(active_progress().is_none());
    drop(plain);

    let progress = TerminalRenderer::from_style(OutputStyle::Rich).start_progress("install", 2);
    assert!(active_progress().is_some());
    progress.finish();
    assert!(active_progress().is_none());
}

#[test]
fn suspending_writer_accepts_whole_events() {
    let mut writer = ProgressAwareStderr.make_writer();
    writer
        .write_all(b"WARN toolsmith_installer::retry: upstream rate limit hit\n")
        .expect("buffered write succeeds");
    writer.flush().expect("flush succeeds");
}

#[test]
fn progress_line_is_only_rendered_in_rich_mode() {
    assert_eq!(
        render_progress_line(OutputStyle::Plain, "install", 1, 2, None),
        None
    );
    let line = render_progress_line(OutputStyle::Rich, "install", 1, 2, None)
        .expect("rich mode renders progress");
    assert!(line.contains("[=========---------]"));
    assert!(line.contains(" 50% 1/2"));
}

#[test]
fn install_report_lists_command_skips_and_warnings() {
    let record = RepositoryRecord::new("github.com", "alice", "toolsmith");
    let lines = format_install_report(OutputStyle::Plain, "toolsmith", &report(record), false);
    assert_eq!(
        lines,
        vec![
            "toolsmith: ran nix-profile; /home/alice/.nix-profile/bin/toolsmith (nix)",
            "toolsmith: skipped python: command owned by stronger layer nix",
            "warning: optional output 'default' failed",
        ]
    );
}

#[test]
fn quiet_install_report_keeps_only_warnings() {
    let record = RepositoryRecord::new("github.com", "alice", "toolsmith");
    let lines = format_install_report(OutputStyle::Rich, "toolsmith", &report(record), true);
    assert_eq!(lines, vec!["[WARN] optional output 'default' failed"]);
}

#[test]
fn capability_lines_show_raw_and_effective_sets() {
    let repo = tempfile::tempdir().expect("must create temp dir");
    fs::write(repo.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n")
        .expect("must write pyproject");
    fs::write(repo.path().join("Makefile"), "install:\n\tcp demo ~/.local/bin\n")
        .expect("must write makefile");

    let lines = format_capability_lines(repo.path());
    assert_eq!(lines.len(), Layer::ALL.len());
    let makefile = lines
        .iter()
        .find(|line| line.starts_with("makefile"))
        .expect("makefile layer is listed");
    assert!(makefile.contains("make-install"));
    let python = lines
        .iter()
        .find(|line| line.starts_with("python"))
        .expect("python layer is listed");
    assert!(python.contains("python-runtime"));
}

#[test]
fn profile_lines_list_entries_and_output_tokens() {
    let snapshot = ProfileSnapshot::from_json(
        r#"{"elements":{"toolsmith":{"attrPath":"packages.x86_64-linux.toolsmith","originalUrl":"path:/home/alice/Repositories/toolsmith","storePaths":[]}}}"#,
    );
    let lines = format_profile_lines(&snapshot, Some("toolsmith"));
    assert!(lines[0].starts_with("toolsmith"));
    assert!(lines[0].contains("packages.x86_64-linux.toolsmith"));
    assert_eq!(lines[1], "selectors for 'toolsmith': toolsmith");
    assert_eq!(lines[2], "removal tokens for 'toolsmith': toolsmith");
}

#[test]
fn empty_profile_is_reported() {
    let lines = format_profile_lines(&ProfileSnapshot::default(), Some("default"));
    assert_eq!(
        lines,
        vec![
            "nix profile is empty",
            "selectors for 'default': none",
            "removal tokens for 'default': default",
        ]
    );
}

#[test]
fn completions_script_names_the_binary() {
    let mut output = Vec::new();
    write_completions_script(clap_complete::Shell::Bash, &mut output)
        .expect("must generate completions");
    let script = String::from_utf8(output).expect("completions are utf-8");
    assert!(script.contains("toolsmith"));
    assert!(script.contains("install"));
}

#[test]
fn default_settings_path_lives_under_config() {
    let path = default_settings_path(Some(PathBuf::from("/home/alice"))).expect("home is set");
    assert_eq!(
        path,
        PathBuf::from("/home/alice/.config/toolsmith/config.toml")
    );
    assert!(default_settings_path(None).is_err());
}
