use std::path::Path;

use serde::{Deserialize, Serialize};

/// Installation authority tiers, strongest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Layer {
    OsPackages,
    Nix,
    Python,
    Makefile,
}

pub const SYSTEM_PREFIXES: [&str; 2] = ["/usr", "/bin"];
pub const NIX_STORE_DIR: &str = "/nix/store";

impl Layer {
    pub const ALL: [Layer; 4] = [Self::OsPackages, Self::Nix, Self::Python, Self::Makefile];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OsPackages => "os-packages",
            Self::Nix => "nix",
            Self::Python => "python",
            Self::Makefile => "makefile",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "os-packages" | "os_packages" => Some(Self::OsPackages),
            "nix" => Some(Self::Nix),
            "python" => Some(Self::Python),
            "makefile" => Some(Self::Makefile),
            _ => None,
        }
    }

    pub fn priority(self) -> usize {
        Self::ALL
            .iter()
            .position(|layer| *layer == self)
            .unwrap_or(Self::ALL.len())
    }

    /// Strictly stronger means a lower priority value.
    pub fn is_stronger_than(self, other: Option<Layer>) -> bool {
        self.priority() < layer_priority(other)
    }

    pub fn weak_to_strong() -> [Layer; 4] {
        let mut layers = Self::ALL;
        layers.reverse();
        layers
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `None` sorts after every known layer.
pub fn layer_priority(layer: Option<Layer>) -> usize {
    layer.map(Layer::priority).unwrap_or(Layer::ALL.len())
}

/// Unknown tags degrade to the weakest possible priority.
pub fn tag_priority(tag: &str) -> usize {
    layer_priority(Layer::parse(tag))
}

pub fn nix_profile_bin_dir(home_dir: &Path) -> std::path::PathBuf {
    home_dir.join(".nix-profile").join("bin")
}

pub fn is_system_path(path: &Path) -> bool {
    SYSTEM_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

pub fn classify_command_layer(command: &str, repo_dir: &Path, home_dir: Option<&Path>) -> Layer {
    let path = Path::new(command);
    if is_system_path(path) {
        return Layer::OsPackages;
    }
    if path.starts_with(NIX_STORE_DIR) {
        return Layer::Nix;
    }
    if let Some(home) = home_dir {
        if path.starts_with(nix_profile_bin_dir(home)) {
            return Layer::Nix;
        }
    }
    if path.starts_with(repo_dir) {
        return Layer::Makefile;
    }
    Layer::Python
}
