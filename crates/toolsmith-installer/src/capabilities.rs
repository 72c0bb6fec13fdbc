//! Which layer really delivers a logical installation feature.
//!
//! Detection is substring sniffing over manifest text. A comment that merely
//! mentions `make install` counts as a positive; there is no stronger signal in
//! these manifests to depend on, so the imprecision is accepted as is.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use toolsmith_core::Layer;

use crate::fs_utils::{files_with_extension, read_text_if_exists};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    PythonRuntime,
    MakeInstall,
    NixFlake,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Self::PythonRuntime, Self::MakeInstall, Self::NixFlake];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PythonRuntime => "python-runtime",
            Self::MakeInstall => "make-install",
            Self::NixFlake => "nix-flake",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CapabilityMap = BTreeMap<Layer, BTreeSet<Capability>>;

pub trait CapabilityRule {
    fn capability(&self) -> Capability;
    fn applies_to_layer(&self, layer: Layer) -> bool;
    fn is_provided(&self, repo_dir: &Path, layer: Layer) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    PythonProject,
    Flake,
    NativeDescriptors,
    Makefile,
}

pub const MAKEFILE_NAMES: [&str; 3] = ["GNUmakefile", "makefile", "Makefile"];

impl ManifestSource {
    pub fn texts(self, repo_dir: &Path) -> Vec<String> {
        let paths = match self {
            Self::PythonProject => vec![repo_dir.join("pyproject.toml"), repo_dir.join("setup.py")],
            Self::Flake => vec![repo_dir.join("flake.nix")],
            Self::NativeDescriptors => {
                let mut paths = vec![
                    repo_dir.join("PKGBUILD"),
                    repo_dir.join("debian").join("control"),
                    repo_dir.join("debian").join("rules"),
                ];
                paths.extend(files_with_extension(repo_dir, "spec"));
                paths
            }
            Self::Makefile => MAKEFILE_NAMES.iter().map(|name| repo_dir.join(name)).collect(),
        };
        paths
            .iter()
            .filter_map(|path| read_text_if_exists(path))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Presence,
    Indicators(&'static [&'static str]),
    InstallTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestRule {
    pub capability: Capability,
    pub layer: Layer,
    pub source: ManifestSource,
    pub detection: Detection,
}

impl CapabilityRule for ManifestRule {
    fn capability(&self) -> Capability {
        self.capability
    }

    fn applies_to_layer(&self, layer: Layer) -> bool {
        self.layer == layer
    }

    fn is_provided(&self, repo_dir: &Path, layer: Layer) -> bool {
        if !self.applies_to_layer(layer) {
            return false;
        }
        let texts = self.source.texts(repo_dir);
        match self.detection {
            Detection::Presence => !texts.is_empty(),
            Detection::Indicators(needles) => texts
                .iter()
                .any(|text| needles.iter().any(|needle| text.contains(needle))),
            Detection::InstallTarget => texts
                .iter()
                .any(|text| makefile_declares_install_target(text)),
        }
    }
}

const MAKE_INSTALL: &[&str] = &["make install"];

pub const CAPABILITY_RULES: [ManifestRule; 8] = [
    ManifestRule {
        capability: Capability::PythonRuntime,
        layer: Layer::Python,
        source: ManifestSource::PythonProject,
        detection: Detection::Presence,
    },
    ManifestRule {
        capability: Capability::PythonRuntime,
        layer: Layer::Nix,
        source: ManifestSource::Flake,
        detection: Detection::Indicators(&["buildPythonApplication", "buildPythonPackage"]),
    },
    ManifestRule {
        capability: Capability::PythonRuntime,
        layer: Layer::OsPackages,
        source: ManifestSource::NativeDescriptors,
        detection: Detection::Indicators(&[
            "python -m build",
            "python -m installer",
            "pip install",
            "dh-python",
            "pybuild",
        ]),
    },
    ManifestRule {
        capability: Capability::MakeInstall,
        layer: Layer::Makefile,
        source: ManifestSource::Makefile,
        detection: Detection::InstallTarget,
    },
    ManifestRule {
        capability: Capability::MakeInstall,
        layer: Layer::Python,
        source: ManifestSource::PythonProject,
        detection: Detection::Indicators(MAKE_INSTALL),
    },
    ManifestRule {
        capability: Capability::MakeInstall,
        layer: Layer::Nix,
        source: ManifestSource::Flake,
        detection: Detection::Indicators(MAKE_INSTALL),
    },
    ManifestRule {
        capability: Capability::MakeInstall,
        layer: Layer::OsPackages,
        source: ManifestSource::NativeDescriptors,
        detection: Detection::Indicators(MAKE_INSTALL),
    },
    ManifestRule {
        capability: Capability::NixFlake,
        layer: Layer::Nix,
        source: ManifestSource::Flake,
        detection: Detection::Presence,
    },
];

/// Whether a target declaration line names `install`.
pub fn makefile_declares_install_target(text: &str) -> bool {
    text.lines().any(|line| {
        if line.starts_with(|ch: char| ch.is_whitespace()) || line.starts_with('#') {
            return false;
        }
        let Some((targets, rest)) = line.split_once(':') else {
            return false;
        };
        if rest.starts_with('=') || targets.contains('=') {
            return false;
        }
        targets.split_whitespace().any(|target| target == "install")
    })
}

pub fn layer_capabilities(repo_dir: &Path, layer: Layer) -> BTreeSet<Capability> {
    CAPABILITY_RULES
        .iter()
        .filter(|rule| rule.applies_to_layer(layer) && rule.is_provided(repo_dir, layer))
        .map(|rule| rule.capability())
        .collect()
}

/// Raw per-layer detections, before shadowing.
pub fn detect_capabilities(repo_dir: &Path, layers: &[Layer]) -> CapabilityMap {
    layers
        .iter()
        .map(|layer| (*layer, layer_capabilities(repo_dir, *layer)))
        .collect()
}

/// Credits each capability only to the strongest layer providing it.
///
/// `layers` must be ordered weakest to strongest; the last layer that
/// raw-provides a capability keeps it and every other layer loses it.
pub fn resolve_effective_capabilities(repo_dir: &Path, layers: &[Layer]) -> CapabilityMap {
    shadow_capabilities(&detect_capabilities(repo_dir, layers), layers)
}

pub fn shadow_capabilities(raw: &CapabilityMap, layers: &[Layer]) -> CapabilityMap {
    let mut effective: CapabilityMap = layers
        .iter()
        .map(|layer| (*layer, BTreeSet::new()))
        .collect();
    for capability in Capability::ALL {
        let owner = layers
            .iter()
            .rev()
            .find(|layer| raw.get(layer).is_some_and(|caps| caps.contains(&capability)));
        if let Some(owner) = owner {
            effective.entry(*owner).or_default().insert(capability);
        }
    }
    effective
}
