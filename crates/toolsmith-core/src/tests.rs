use std::path::{Path, PathBuf};

use super::*;

#[test]
fn parse_settings() {
    let content = r#"
[directories]
repositories = "~/src"
binaries = "/opt/toolsmith/bin"

[retry]
max_attempts = 3
base_delay_secs = 1
max_delay_secs = 10
fingerprints = ["HTTP error 429"]

[nix]
self_referential = ["toolsmith", "tsm"]

[[repositories]]
provider = "github.com"
account = "acme"
repository = "lint-kit"
alias = "lk"

[[repositories]]
provider = "github.com"
account = "acme"
repository = "dotfiles"
command = ""

[[repositories]]
provider = "gitlab.com"
account = "ops"
repository = "deployer"
command = "/opt/deployer/bin/deploy"
"#;

    let settings = Settings::from_toml_str(content).expect("settings should parse");
    assert_eq!(settings.retry.max_attempts, 3);
    assert_eq!(settings.retry.fingerprints, vec!["HTTP error 429"]);
    assert_eq!(settings.nix.self_referential, vec!["toolsmith", "tsm"]);
    assert_eq!(settings.nix.conflict_rounds, 2);
    assert_eq!(
        settings.repositories_dir(Some(Path::new("/home/dev"))),
        PathBuf::from("/home/dev/src")
    );
    assert_eq!(
        settings.binaries_dir(Some(Path::new("/home/dev"))),
        PathBuf::from("/opt/toolsmith/bin")
    );

    let records = &settings.repositories;
    assert_eq!(records[0].alias.as_deref(), Some("lk"));
    assert_eq!(records[0].command, CommandField::Unset);
    assert_eq!(records[1].command, CommandField::Disabled);
    assert_eq!(
        records[2].command,
        CommandField::Path("/opt/deployer/bin/deploy".to_string())
    );
}

#[test]
fn empty_settings_use_defaults() {
    let settings = Settings::from_toml_str("").expect("empty settings should parse");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.retry.max_attempts, 7);
    assert!(settings
        .retry
        .fingerprints
        .iter()
        .any(|value| value == "too many requests"));
    assert_eq!(settings.nix.self_referential, vec!["toolsmith"]);
}

#[test]
fn reject_zero_retry_attempts() {
    let err = Settings::from_toml_str("[retry]\nmax_attempts = 0\n")
        .expect_err("zero attempts must be rejected");
    assert!(err.to_string().contains("max_attempts"));
}

#[test]
fn reject_inverted_retry_delays() {
    let err = Settings::from_toml_str("[retry]\nbase_delay_secs = 30\nmax_delay_secs = 5\n")
        .expect_err("inverted delays must be rejected");
    assert!(err.to_string().contains("max_delay_secs"));
}

#[test]
fn reject_duplicate_repositories() {
    let content = r#"
[[repositories]]
provider = "github.com"
account = "acme"
repository = "tool"

[[repositories]]
provider = "github.com"
account = "acme"
repository = "tool"
"#;
    let err = Settings::from_toml_str(content).expect_err("duplicates must be rejected");
    assert!(err.to_string().contains("duplicate repository entry"));
}

#[test]
fn reject_repository_segments_with_separators() {
    let content = r#"
[[repositories]]
provider = "github.com"
account = "acme/evil"
repository = "tool"
"#;
    let err = Settings::from_toml_str(content).expect_err("separators must be rejected");
    assert!(err.to_string().contains("single path segment"));
}

#[test]
fn command_field_from_json_distinguishes_null_and_absent() {
    let absent: RepositoryRecord = serde_json::from_str(
        r#"{"provider":"github.com","account":"acme","repository":"tool"}"#,
    )
    .expect("absent command");
    assert_eq!(absent.command, CommandField::Unset);

    let null: RepositoryRecord = serde_json::from_str(
        r#"{"provider":"github.com","account":"acme","repository":"tool","command":null}"#,
    )
    .expect("null command");
    assert_eq!(null.command, CommandField::Disabled);

    let explicit: RepositoryRecord = serde_json::from_str(
        r#"{"provider":"github.com","account":"acme","repository":"tool","command":"bin/tool"}"#,
    )
    .expect("explicit command");
    assert_eq!(explicit.command.as_path(), Some("bin/tool"));
}

#[test]
fn unset_command_is_not_serialized() {
    let record = RepositoryRecord::new("github.com", "acme", "tool");
    let rendered = serde_json::to_string(&record).expect("serialize");
    assert!(!rendered.contains("command"));

    let disabled = record.with_command(CommandField::Disabled);
    let rendered = serde_json::to_string(&disabled).expect("serialize");
    assert!(rendered.contains(r#""command":"""#));
}

#[test]
fn identifier_is_short_name_when_unique() {
    let records = vec![
        RepositoryRecord::new("github.com", "acme", "tool"),
        RepositoryRecord::new("github.com", "acme", "other"),
    ];
    assert_eq!(records[0].identifier(&records), "tool");
}

#[test]
fn identifier_is_full_triple_when_name_clashes() {
    let records = vec![
        RepositoryRecord::new("github.com", "acme", "tool"),
        RepositoryRecord::new("gitlab.com", "ops", "tool"),
    ];
    assert_eq!(records[0].identifier(&records), "github.com/acme/tool");
    assert_eq!(records[1].identifier(&records), "gitlab.com/ops/tool");
}

#[test]
fn selector_matches_alias_identifier_and_full_name() {
    let mut record = RepositoryRecord::new("github.com", "acme", "lint-kit");
    record.alias = Some("lk".to_string());
    let records = vec![record.clone()];
    assert!(record.matches_selector("lk", &records));
    assert!(record.matches_selector("lint-kit", &records));
    assert!(record.matches_selector("github.com/acme/lint-kit", &records));
    assert!(!record.matches_selector("lint", &records));
}

#[test]
fn checkout_dir_nests_provider_account_repository() {
    let record = RepositoryRecord::new("github.com", "acme", "tool");
    assert_eq!(
        record.checkout_dir(Path::new("/srv/repos")),
        PathBuf::from("/srv/repos/github.com/acme/tool")
    );
}

#[test]
fn layer_priority_follows_fixed_order() {
    let priorities: Vec<usize> = Layer::ALL.iter().map(|layer| layer.priority()).collect();
    assert_eq!(priorities, vec![0, 1, 2, 3]);
    assert!(priorities.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(layer_priority(None), Layer::ALL.len());
}

#[test]
fn unknown_layer_tag_is_weakest() {
    assert_eq!(tag_priority("nix"), 1);
    assert_eq!(tag_priority("OS-Packages"), 0);
    assert_eq!(tag_priority("homebrew"), Layer::ALL.len());
    assert_eq!(tag_priority(""), Layer::ALL.len());
}

#[test]
fn stronger_than_compares_against_missing_layer() {
    assert!(Layer::Makefile.is_stronger_than(None));
    assert!(Layer::Nix.is_stronger_than(Some(Layer::Python)));
    assert!(!Layer::Nix.is_stronger_than(Some(Layer::Nix)));
    assert!(!Layer::Python.is_stronger_than(Some(Layer::OsPackages)));
}

#[test]
fn weak_to_strong_reverses_authority_order() {
    assert_eq!(
        Layer::weak_to_strong(),
        [Layer::Makefile, Layer::Python, Layer::Nix, Layer::OsPackages]
    );
}

#[test]
fn classify_system_paths() {
    let repo = Path::new("/home/dev/Repositories/github.com/acme/tool");
    let home = Some(Path::new("/home/dev"));
    assert_eq!(classify_command_layer("/usr/bin/tool", repo, home), Layer::OsPackages);
    assert_eq!(classify_command_layer("/bin/tool", repo, home), Layer::OsPackages);
    assert_eq!(
        classify_command_layer("/usrlocal/bin/tool", repo, home),
        Layer::Python
    );
}

#[test]
fn classify_nix_paths() {
    let repo = Path::new("/home/dev/Repositories/github.com/acme/tool");
    let home = Some(Path::new("/home/dev"));
    assert_eq!(
        classify_command_layer("/nix/store/abc123-tool-1.0/bin/tool", repo, home),
        Layer::Nix
    );
    assert_eq!(
        classify_command_layer("/home/dev/.nix-profile/bin/tool", repo, home),
        Layer::Nix
    );
    assert_eq!(
        classify_command_layer("/home/dev/.nix-profile/bin/tool", repo, None),
        Layer::Python
    );
}

#[test]
fn classify_checkout_and_fallback_paths() {
    let repo = Path::new("/home/dev/Repositories/github.com/acme/tool");
    let home = Some(Path::new("/home/dev"));
    assert_eq!(
        classify_command_layer(
            "/home/dev/Repositories/github.com/acme/tool/main.sh",
            repo,
            home
        ),
        Layer::Makefile
    );
    assert_eq!(
        classify_command_layer("/home/dev/.local/bin/tool", repo, home),
        Layer::Python
    );
    assert_eq!(
        classify_command_layer("/home/dev/.venvs/tool/bin/tool", repo, home),
        Layer::Python
    );
}

#[test]
fn expand_home_handles_bare_tilde_and_absolute_paths() {
    let home = Some(Path::new("/home/dev"));
    assert_eq!(expand_home("~", home), PathBuf::from("/home/dev"));
    assert_eq!(expand_home("~/bin", home), PathBuf::from("/home/dev/bin"));
    assert_eq!(expand_home("/opt/bin", home), PathBuf::from("/opt/bin"));
    assert_eq!(expand_home("~/bin", None), PathBuf::from("~/bin"));
}
