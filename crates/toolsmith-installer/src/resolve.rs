use std::fs;
use std::path::{Path, PathBuf};

use toolsmith_core::{is_system_path, nix_profile_bin_dir, CommandField, RepositoryRecord};
use tracing::{debug, warn};

use crate::context::InstallContext;
use crate::error::ResolveError;
use crate::fs_utils::is_executable_file;

/// Finds the single command that represents a repository.
///
/// A declared `command` field wins without touching the filesystem; a declared
/// but empty one means the repository has no command at all. Otherwise the
/// candidates are, in order: the nix profile binary, a non-system executable
/// on the search path, then `main.sh` or `main.py` in the checkout.
pub fn resolve_command(
    record: &RepositoryRecord,
    ctx: &InstallContext,
) -> Result<Option<String>, ResolveError> {
    match &record.command {
        CommandField::Path(command) => return Ok(Some(command.clone())),
        CommandField::Disabled => return Ok(None),
        CommandField::Unset => {}
    }

    let mut attempted = Vec::new();
    let module_package = python_module_package(&ctx.repo_dir);

    let path_candidate = search_path_candidate(ctx, &mut attempted);

    if let Some(home) = ctx.home_dir.as_deref() {
        if !ctx.identifier.contains('/') {
            let profile_bin = nix_profile_bin_dir(home).join(&ctx.identifier);
            attempted.push(profile_bin.clone());
            if is_executable_file(&profile_bin) {
                return Ok(Some(profile_bin.display().to_string()));
            }
        }
    }

    if let Some(candidate) = path_candidate {
        if is_executable_file(&candidate) {
            return Ok(Some(candidate.display().to_string()));
        }
    }

    if let Some(package) = module_package {
        debug!(
            "'{}' ships python module '{package}' but no installed command",
            ctx.identifier
        );
        return Err(ResolveError::MissingEntryPoint {
            identifier: ctx.identifier.clone(),
        });
    }

    let main_sh = ctx.repo_file("main.sh");
    attempted.push(main_sh.clone());
    if is_executable_file(&main_sh) {
        return Ok(Some(main_sh.display().to_string()));
    }

    let main_py = ctx.repo_file("main.py");
    attempted.push(main_py.clone());
    if main_py.is_file() {
        return Ok(Some(main_py.display().to_string()));
    }

    Err(ResolveError::NoCommand {
        identifier: ctx.identifier.clone(),
        attempted,
    })
}

fn search_path_candidate(ctx: &InstallContext, attempted: &mut Vec<PathBuf>) -> Option<PathBuf> {
    if ctx.identifier.contains('/') {
        return None;
    }
    let found = ctx.find_tool(&ctx.identifier)?;
    attempted.push(found.clone());
    if is_system_path(&found) {
        warn!(
            "'{}' is provided by a system package at {}; leaving it alone",
            ctx.identifier,
            found.display()
        );
        return None;
    }
    Some(found)
}

/// Name of the `src/<pkg>` package that carries a `__main__.py`, when the
/// checkout is a python project.
pub fn python_module_package(repo_dir: &Path) -> Option<String> {
    if !repo_dir.join("pyproject.toml").is_file() {
        return None;
    }
    let entries = fs::read_dir(repo_dir.join("src")).ok()?;
    let mut packages: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().join("__main__.py").is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    packages.sort();
    packages.into_iter().next()
}
