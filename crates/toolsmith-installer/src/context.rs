use std::ffi::OsString;
use std::path::PathBuf;

use toolsmith_core::{RepositoryRecord, Settings};

pub const DISABLE_NIX_INSTALLER_ENV: &str = "TOOLSMITH_DISABLE_NIX_INSTALLER";
pub const DISABLE_PYTHON_INSTALLER_ENV: &str = "TOOLSMITH_DISABLE_PYTHON_INSTALLER";
pub const DISABLE_MAKEFILE_INSTALLER_ENV: &str = "TOOLSMITH_DISABLE_MAKEFILE_INSTALLER";
pub const IN_NIX_SHELL_ENV: &str = "IN_NIX_SHELL";
pub const PIP_OVERRIDE_ENV: &str = "TOOLSMITH_PIP";
pub const VIRTUAL_ENV_ENV: &str = "VIRTUAL_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneMode {
    #[default]
    Ssh,
    Https,
    Shallow,
}

impl CloneMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Https => "https",
            Self::Shallow => "shallow",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallFlags {
    pub preview: bool,
    pub quiet: bool,
    pub no_verification: bool,
    pub clone_mode: CloneMode,
    pub update_dependencies: bool,
    pub force_update: bool,
}

/// Process environment captured when a context is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvToggles {
    pub disable_nix: bool,
    pub disable_python: bool,
    pub disable_makefile: bool,
    pub in_nix_shell: bool,
    pub pip_override: Option<String>,
    pub virtual_env: Option<PathBuf>,
}

impl EnvToggles {
    pub fn from_process_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            disable_nix: lookup(DISABLE_NIX_INSTALLER_ENV).is_some_and(|v| is_truthy(&v)),
            disable_python: lookup(DISABLE_PYTHON_INSTALLER_ENV).is_some_and(|v| is_truthy(&v)),
            disable_makefile: lookup(DISABLE_MAKEFILE_INSTALLER_ENV)
                .is_some_and(|v| is_truthy(&v)),
            in_nix_shell: non_empty(IN_NIX_SHELL_ENV).is_some(),
            pip_override: non_empty(PIP_OVERRIDE_ENV),
            virtual_env: non_empty(VIRTUAL_ENV_ENV).map(PathBuf::from),
        }
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Everything an installer may look at for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    pub identifier: String,
    pub repo_dir: PathBuf,
    pub repositories_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub search_path: Option<OsString>,
    pub flags: InstallFlags,
    pub toggles: EnvToggles,
}

impl InstallContext {
    pub fn for_repository(
        record: &RepositoryRecord,
        all: &[RepositoryRecord],
        settings: &Settings,
        flags: InstallFlags,
    ) -> Self {
        let home_dir = std::env::var_os("HOME").map(PathBuf::from);
        let repositories_dir = settings.repositories_dir(home_dir.as_deref());
        Self {
            identifier: record.identifier(all),
            repo_dir: record.checkout_dir(&repositories_dir),
            bin_dir: settings.binaries_dir(home_dir.as_deref()),
            repositories_dir,
            home_dir,
            search_path: std::env::var_os("PATH"),
            flags,
            toggles: EnvToggles::from_process_env(),
        }
    }

    pub fn preview(&self) -> bool {
        self.flags.preview
    }

    pub fn repo_file(&self, rel: &str) -> PathBuf {
        self.repo_dir.join(rel)
    }

    /// Looks `binary` up on the context's search path, never the ambient one.
    pub fn find_tool(&self, binary: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        which::which_in(binary, Some(search_path), &self.repo_dir).ok()
    }

    pub fn has_tool(&self, binary: &str) -> bool {
        self.find_tool(binary).is_some()
    }

    pub fn venvs_dir(&self) -> PathBuf {
        self.repositories_dir.join(".venvs")
    }

    pub fn isolated_venv_dir(&self) -> PathBuf {
        self.venvs_dir().join(self.identifier.replace('/', "_"))
    }
}
