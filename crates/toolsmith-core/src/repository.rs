use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The `command` key of a repository record.
///
/// A present-but-empty value (`""` or `null`) is an explicit opt-out and is kept
/// distinct from an absent key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommandField {
    #[default]
    Unset,
    Disabled,
    Path(String),
}

impl CommandField {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl Serialize for CommandField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset | Self::Disabled => serializer.serialize_str(""),
            Self::Path(path) => serializer.serialize_str(path),
        }
    }
}

impl<'de> Deserialize<'de> for CommandField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value {
            None => Self::Disabled,
            Some(path) if path.trim().is_empty() => Self::Disabled,
            Some(path) => Self::Path(path),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub provider: String,
    pub account: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "CommandField::is_unset")]
    pub command: CommandField,
}

impl RepositoryRecord {
    pub fn new(
        provider: impl Into<String>,
        account: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            account: account.into(),
            repository: repository.into(),
            alias: None,
            command: CommandField::Unset,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}/{}", self.provider, self.account, self.repository)
    }

    pub fn same_identity(&self, other: &RepositoryRecord) -> bool {
        self.provider == other.provider
            && self.account == other.account
            && self.repository == other.repository
    }

    /// Short repository name when unique across `all`, full triple otherwise.
    pub fn identifier(&self, all: &[RepositoryRecord]) -> String {
        let clashes = all
            .iter()
            .filter(|other| other.repository == self.repository && !other.same_identity(self))
            .count();
        if clashes == 0 {
            self.repository.clone()
        } else {
            self.full_name()
        }
    }

    pub fn checkout_dir(&self, repositories_dir: &Path) -> PathBuf {
        repositories_dir
            .join(&self.provider)
            .join(&self.account)
            .join(&self.repository)
    }

    /// Whether `selector` names this record by repository, alias or full triple.
    pub fn matches_selector(&self, selector: &str, all: &[RepositoryRecord]) -> bool {
        selector == self.full_name()
            || selector == self.identifier(all)
            || self.alias.as_deref() == Some(selector)
    }

    pub fn with_command(&self, command: CommandField) -> Self {
        Self {
            command,
            ..self.clone()
        }
    }
}
