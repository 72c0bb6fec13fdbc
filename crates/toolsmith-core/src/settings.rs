use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::repository::RepositoryRecord;

pub const DEFAULT_RATE_LIMIT_FINGERPRINTS: [&str; 6] = [
    "http error 429",
    "too many requests",
    "rate limit exceeded",
    "api rate limit",
    "secondary rate limit",
    "status 429",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub directories: DirectorySettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub nix: NixSettings,
    #[serde(default)]
    pub repositories: Vec<RepositoryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorySettings {
    #[serde(default = "default_repositories_dir")]
    pub repositories: String,
    #[serde(default = "default_binaries_dir")]
    pub binaries: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_fingerprints")]
    pub fingerprints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NixSettings {
    /// Identifiers whose flake exposes an output named after the identifier
    /// alongside an optional `default` output.
    #[serde(default = "default_self_referential")]
    pub self_referential: Vec<String>,
    #[serde(default = "default_conflict_rounds")]
    pub conflict_rounds: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directories: DirectorySettings::default(),
            retry: RetrySettings::default(),
            nix: NixSettings::default(),
            repositories: Vec::new(),
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            repositories: default_repositories_dir(),
            binaries: default_binaries_dir(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            fingerprints: default_fingerprints(),
        }
    }
}

impl Default for NixSettings {
    fn default() -> Self {
        Self {
            self_referential: default_self_referential(),
            conflict_rounds: default_conflict_rounds(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse toolsmith settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid settings: {}", path.display()))
    }

    /// Missing files fall back to defaults; unreadable or invalid ones do not.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(anyhow!(
                "retry.max_delay_secs ({}) must not be below retry.base_delay_secs ({})",
                self.retry.max_delay_secs,
                self.retry.base_delay_secs
            ));
        }

        let mut seen = HashSet::new();
        for record in &self.repositories {
            for (field, value) in [
                ("provider", &record.provider),
                ("account", &record.account),
                ("repository", &record.repository),
            ] {
                if value.trim().is_empty() {
                    return Err(anyhow!("repository {field} must not be empty"));
                }
                if value.contains(['/', '\\']) || value == ".." {
                    return Err(anyhow!(
                        "repository {field} must be a single path segment: {value}"
                    ));
                }
            }
            if !seen.insert(record.full_name()) {
                return Err(anyhow!("duplicate repository entry '{}'", record.full_name()));
            }
        }
        Ok(())
    }

    pub fn repositories_dir(&self, home_dir: Option<&Path>) -> PathBuf {
        expand_home(&self.directories.repositories, home_dir)
    }

    pub fn binaries_dir(&self, home_dir: Option<&Path>) -> PathBuf {
        expand_home(&self.directories.binaries, home_dir)
    }
}

pub fn expand_home(raw: &str, home_dir: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix('~'), home_dir) {
        (Some(rest), Some(home)) => {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                home.to_path_buf()
            } else {
                home.join(rest)
            }
        }
        _ => PathBuf::from(raw),
    }
}

fn default_repositories_dir() -> String {
    "~/Repositories".to_string()
}

fn default_binaries_dir() -> String {
    "~/.local/bin".to_string()
}

fn default_max_attempts() -> u32 {
    7
}

fn default_base_delay_secs() -> u64 {
    2
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_fingerprints() -> Vec<String> {
    DEFAULT_RATE_LIMIT_FINGERPRINTS
        .iter()
        .map(|value| value.to_string())
        .collect()
}

fn default_self_referential() -> Vec<String> {
    vec!["toolsmith".to_string()]
}

fn default_conflict_rounds() -> u32 {
    2
}
