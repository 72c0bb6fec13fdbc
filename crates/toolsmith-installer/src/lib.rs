mod capabilities;
mod conflicts;
mod context;
mod error;
mod exposure;
mod fs_utils;
mod installers;
mod pipeline;
mod process;
mod profile;
mod resolve;
mod retry;

pub use capabilities::{
    detect_capabilities, layer_capabilities, makefile_declares_install_target,
    resolve_effective_capabilities, shadow_capabilities, Capability, CapabilityMap,
    CapabilityRule, Detection, ManifestRule, ManifestSource, CAPABILITY_RULES,
};
pub use conflicts::{removal_candidates, scrape_remove_hints, ConflictResolver};
pub use context::{
    is_truthy, CloneMode, EnvToggles, InstallContext, InstallFlags,
    DISABLE_MAKEFILE_INSTALLER_ENV, DISABLE_NIX_INSTALLER_ENV, DISABLE_PYTHON_INSTALLER_ENV,
    IN_NIX_SHELL_ENV, PIP_OVERRIDE_ENV, VIRTUAL_ENV_ENV,
};
pub use error::{normalized_exit_code, InstallError, PipelineError, ResolveError};
pub use exposure::{bin_path, expose_command, BinLinker, CommandLinker};
pub use installers::{
    default_installers, DebianArtifacts, Installer, InstallerReport, MakefileInstaller,
    NativePackageKind, NixOutput, NixProfileInstaller, OsPackageInstaller, PipResolution,
    PythonInstaller,
};
pub use pipeline::{contributed_capabilities, InstallPipeline, PipelineReport, SkipReason};
pub use process::{run_command, run_command_in, CommandOutcome, CommandRunner, ShellRunner};
pub use profile::{
    parse_profile_listing, store_paths_in, ProfileEntry, ProfileInspector, ProfileSnapshot,
    PROFILE_LIST_COMMAND,
};
pub use resolve::{python_module_package, resolve_command};
pub use retry::{RateLimitRetry, Sleeper};
