//! Reading the user's `nix profile` state.
//!
//! `nix profile list --json` has changed shape across releases. Three forms are
//! understood:
//!
//! * a mapping of elements keyed by index digits or by element name,
//! * a list of element objects carrying an explicit `index`,
//! * a legacy list of bare strings, which yields entries without any selector.
//!
//! Either form may be wrapped in an object under `elements`. Anything else is
//! treated as an empty profile.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::InstallContext;
use crate::process::{run_command, CommandRunner};
use toolsmith_core::NIX_STORE_DIR;

pub const PROFILE_LIST_COMMAND: &str = "nix profile list --json";

static STORE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/nix/store/[0-9a-z]{32}-[^\s/'`,;:()\[\]]+").expect("store path pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileEntry {
    pub index: Option<u32>,
    /// Element name in name-keyed listings.
    pub key: Option<String>,
    pub attr_path: Option<String>,
    pub name: Option<String>,
    pub pname: Option<String>,
    pub original_url: Option<String>,
    pub store_paths: Vec<String>,
}

impl ProfileEntry {
    /// Argument accepted by `nix profile upgrade` and `nix profile remove`.
    pub fn selector(&self) -> Option<String> {
        self.key
            .clone()
            .or_else(|| self.index.map(|index| index.to_string()))
    }

    fn removal_token(&self) -> Option<String> {
        self.selector()
            .or_else(|| self.name.clone())
            .or_else(|| self.pname.clone())
    }

    fn is_exact_match(&self, output: &str) -> bool {
        [&self.key, &self.name, &self.pname, &self.attr_path]
            .into_iter()
            .any(|field| field.as_deref() == Some(output))
    }

    fn is_suffix_match(&self, output: &str, checkout: Option<&Path>) -> bool {
        let suffix = format!(".{output}");
        let attr_matches = self
            .attr_path
            .as_deref()
            .is_some_and(|attr| attr.ends_with(&suffix));
        if !attr_matches {
            return false;
        }
        match (self.original_url.as_deref(), checkout) {
            (Some(url), Some(checkout)) => url.contains(&*checkout.to_string_lossy()),
            _ => true,
        }
    }

    fn holds_store_path(&self, root: &str) -> bool {
        self.store_paths
            .iter()
            .any(|path| store_object_root(path).is_some_and(|own| own == root))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileSnapshot {
    pub entries: Vec<ProfileEntry>,
}

impl ProfileSnapshot {
    pub fn from_json(raw: &str) -> Self {
        Self {
            entries: parse_profile_listing(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries belonging to `output`; exact matches win over `.output` suffix matches.
    pub fn entries_for_output(&self, output: &str, checkout: Option<&Path>) -> Vec<&ProfileEntry> {
        let exact: Vec<&ProfileEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.is_exact_match(output))
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        self.entries
            .iter()
            .filter(|entry| entry.is_suffix_match(output, checkout))
            .collect()
    }

    pub fn find_installed_indices_for_output(
        &self,
        output: &str,
        checkout: Option<&Path>,
    ) -> Vec<String> {
        dedup(
            self.entries_for_output(output, checkout)
                .into_iter()
                .filter_map(ProfileEntry::selector),
        )
    }

    /// The bare output name, when usable as a token, always comes first.
    pub fn find_remove_tokens_for_output(
        &self,
        output: &str,
        checkout: Option<&Path>,
    ) -> Vec<String> {
        let bare = is_plausible_token(output).then(|| output.to_string());
        dedup(
            bare.into_iter().chain(
                self.entries_for_output(output, checkout)
                    .into_iter()
                    .filter_map(ProfileEntry::removal_token),
            ),
        )
    }

    pub fn find_remove_tokens_for_store_path_prefixes(&self, prefixes: &[String]) -> Vec<String> {
        let roots: Vec<&str> = prefixes
            .iter()
            .filter_map(|prefix| store_object_root(prefix))
            .collect();
        dedup(
            self.entries
                .iter()
                .filter(|entry| roots.iter().any(|root| entry.holds_store_path(root)))
                .filter_map(ProfileEntry::removal_token),
        )
    }
}

pub struct ProfileInspector<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ProfileInspector<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// A listing that cannot be obtained reads as an empty profile.
    pub fn snapshot(&self, ctx: &InstallContext) -> ProfileSnapshot {
        match run_command(ctx, self.runner, PROFILE_LIST_COMMAND, true) {
            Ok(outcome) if outcome.is_success() => {
                let snapshot = ProfileSnapshot::from_json(&outcome.stdout);
                debug!("nix profile lists {} element(s)", snapshot.entries.len());
                snapshot
            }
            Ok(outcome) => {
                warn!(
                    "'{PROFILE_LIST_COMMAND}' exited with {}; treating profile as empty",
                    outcome.code
                );
                ProfileSnapshot::default()
            }
            Err(err) => {
                warn!("could not list nix profile: {err}");
                ProfileSnapshot::default()
            }
        }
    }
}

pub fn parse_profile_listing(raw: &str) -> Vec<ProfileEntry> {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return Vec::new();
    };
    let elements = match value {
        Value::Object(mut object) => match object.remove("elements") {
            Some(elements) => elements,
            None => Value::Object(object),
        },
        other => other,
    };

    match elements {
        Value::Object(map) => parse_element_map(map),
        Value::Array(items) => items.iter().filter_map(parse_list_item).collect(),
        _ => Vec::new(),
    }
}

fn parse_element_map(map: Map<String, Value>) -> Vec<ProfileEntry> {
    let mut entries: Vec<ProfileEntry> = map
        .into_iter()
        .filter_map(|(key, value)| {
            let Value::Object(object) = value else {
                return None;
            };
            let mut entry = entry_from_object(&object);
            match key.parse::<u32>() {
                Ok(index) => entry.index = Some(index),
                Err(_) => entry.key = Some(key),
            }
            Some(entry)
        })
        .collect();
    entries.sort_by_key(|entry| entry.index);
    entries
}

fn parse_list_item(item: &Value) -> Option<ProfileEntry> {
    match item {
        Value::Object(object) => Some(entry_from_object(object)),
        Value::String(raw) => Some(ProfileEntry {
            store_paths: STORE_PATH_RE
                .find_iter(raw)
                .map(|found| found.as_str().to_string())
                .collect(),
            ..ProfileEntry::default()
        }),
        _ => None,
    }
}

fn entry_from_object(object: &Map<String, Value>) -> ProfileEntry {
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|value| !value.is_empty())
    };
    let index = object.get("index").and_then(|value| match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(raw) => raw.parse().ok(),
        _ => None,
    });
    let store_paths = object
        .get("storePaths")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    ProfileEntry {
        index,
        key: None,
        attr_path: text("attrPath"),
        name: text("name"),
        pname: text("pname"),
        original_url: text("originalUrl").or_else(|| text("url")),
        store_paths,
    }
}

/// `/nix/store/<hash>-<name>` prefix of any store path.
pub fn store_object_root(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(NIX_STORE_DIR)?.strip_prefix('/')?;
    let end = rest.find('/').unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(&path[..NIX_STORE_DIR.len() + 1 + end])
}

/// Store objects mentioned anywhere in `text`, in order of appearance.
pub fn store_paths_in(text: &str) -> Vec<String> {
    dedup(
        STORE_PATH_RE
            .find_iter(text)
            .map(|found| found.as_str().to_string()),
    )
}

pub fn is_plausible_token(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().all(|ch| ch.is_ascii_digit())
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '+'))
}

pub(crate) fn dedup(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIPGREP_STORE: &str = "/nix/store/0123456789abcdfghijklmnpqrsvwxyz-ripgrep-14.1.0";
    const TOOL_STORE: &str = "/nix/store/zyxwvsrqpnmlkjihgfdcba9876543210-tool-0.3.0";

    fn index_keyed_listing() -> String {
        format!(
            r#"{{
  "version": 2,
  "elements": {{
    "1": {{"attrPath": "packages.x86_64-linux.default", "originalUrl": "path:/home/dev/Repositories/github.com/acme/tool", "storePaths": ["{TOOL_STORE}"]}},
    "0": {{"attrPath": "legacyPackages.x86_64-linux.ripgrep", "pname": "ripgrep", "storePaths": ["{RIPGREP_STORE}"]}}
  }}
}}"#
        )
    }

    #[test]
    fn parse_index_keyed_mapping_sorted_by_index() {
        let entries = parse_profile_listing(&index_keyed_listing());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, Some(0));
        assert_eq!(entries[0].pname.as_deref(), Some("ripgrep"));
        assert_eq!(entries[1].index, Some(1));
        assert_eq!(entries[1].store_paths, vec![TOOL_STORE.to_string()]);
        assert!(entries[1]
            .original_url
            .as_deref()
            .is_some_and(|url| url.ends_with("acme/tool")));
    }

    #[test]
    fn parse_name_keyed_mapping_uses_key_as_selector() {
        let raw = format!(
            r#"{{"version": 3, "elements": {{"tool": {{"attrPath": "packages.x86_64-linux.default", "storePaths": ["{TOOL_STORE}"]}}}}}}"#
        );
        let entries = parse_profile_listing(&raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key.as_deref(), Some("tool"));
        assert_eq!(entries[0].index, None);
        assert_eq!(entries[0].selector().as_deref(), Some("tool"));
    }

    #[test]
    fn parse_list_of_objects_with_explicit_index() {
        let raw = r#"[
  {"index": 4, "name": "tool", "attrPath": "packages.x86_64-linux.tool"},
  {"index": "7", "name": "other"}
]"#;
        let entries = parse_profile_listing(raw);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, Some(4));
        assert_eq!(entries[1].index, Some(7));
        assert_eq!(entries[1].selector().as_deref(), Some("7"));
    }

    #[test]
    fn legacy_bare_strings_yield_no_indices() {
        let raw = format!(r#"{{"elements": ["{TOOL_STORE}", "{RIPGREP_STORE}"]}}"#);
        let snapshot = ProfileSnapshot::from_json(&raw);
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.entries.iter().all(|entry| entry.selector().is_none()));
        assert!(snapshot
            .find_installed_indices_for_output("default", None)
            .is_empty());
    }

    #[test]
    fn unparseable_listing_is_empty() {
        assert!(parse_profile_listing("").is_empty());
        assert!(parse_profile_listing("0 flake:nixpkgs#ripgrep").is_empty());
        assert!(parse_profile_listing("42").is_empty());
    }

    #[test]
    fn exact_match_beats_suffix_match() {
        let raw = r#"[
  {"index": 0, "attrPath": "packages.x86_64-linux.tool"},
  {"index": 1, "name": "tool"}
]"#;
        let snapshot = ProfileSnapshot::from_json(raw);
        assert_eq!(
            snapshot.find_installed_indices_for_output("tool", None),
            vec!["1".to_string()]
        );
    }

    #[test]
    fn suffix_match_requires_matching_source_when_known() {
        let snapshot = ProfileSnapshot::from_json(&index_keyed_listing());
        let own = Path::new("/home/dev/Repositories/github.com/acme/tool");
        let other = Path::new("/home/dev/Repositories/github.com/acme/elsewhere");
        assert_eq!(
            snapshot.find_installed_indices_for_output("default", Some(own)),
            vec!["1".to_string()]
        );
        assert!(snapshot
            .find_installed_indices_for_output("default", Some(other))
            .is_empty());
    }

    #[test]
    fn remove_tokens_put_bare_output_first() {
        let raw = r#"[{"index": 3, "name": "tool"}]"#;
        let snapshot = ProfileSnapshot::from_json(raw);
        assert_eq!(
            snapshot.find_remove_tokens_for_output("tool", None),
            vec!["tool".to_string(), "3".to_string()]
        );
        assert_eq!(
            ProfileSnapshot::default().find_remove_tokens_for_output("default", None),
            vec!["default".to_string()]
        );
    }

    #[test]
    fn implausible_output_name_is_not_a_token() {
        assert!(!is_plausible_token(""));
        assert!(!is_plausible_token("12"));
        assert!(!is_plausible_token("has space"));
        assert!(!is_plausible_token("path/like"));
        assert!(is_plausible_token("python3.12-tool"));
    }

    #[test]
    fn store_path_tokens_match_conflicting_store_objects() {
        let snapshot = ProfileSnapshot::from_json(&index_keyed_listing());
        let prefixes = vec![format!("{RIPGREP_STORE}/bin/rg")];
        assert_eq!(
            snapshot.find_remove_tokens_for_store_path_prefixes(&prefixes),
            vec!["0".to_string()]
        );
        assert!(snapshot
            .find_remove_tokens_for_store_path_prefixes(&["/usr/bin/rg".to_string()])
            .is_empty());
    }

    #[test]
    fn store_paths_are_scraped_from_failure_text() {
        let text = format!(
            "error: An existing package already provides the following file:\n\n         {RIPGREP_STORE}/bin/rg\n\n       This is the conflicting file from the new package:\n\n         '{TOOL_STORE}/bin/rg'"
        );
        assert_eq!(
            store_paths_in(&text),
            vec![RIPGREP_STORE.to_string(), TOOL_STORE.to_string()]
        );
    }

    #[test]
    fn store_object_root_strips_inner_paths() {
        assert_eq!(
            store_object_root(&format!("{TOOL_STORE}/bin/tool")),
            Some(TOOL_STORE)
        );
        assert_eq!(store_object_root("/nix/store/"), None);
        assert_eq!(store_object_root("/usr/bin/tool"), None);
    }
}
