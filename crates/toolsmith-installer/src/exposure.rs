use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use toolsmith_core::RepositoryRecord;
use tracing::{debug, info, warn};

use crate::context::InstallContext;
use crate::fs_utils::remove_file_if_exists;

/// Publishes a resolved command into the bin directory.
pub trait CommandLinker {
    /// Returns the bin entries that were written.
    fn link(
        &self,
        ctx: &InstallContext,
        record: &RepositoryRecord,
        command: &str,
    ) -> Result<Vec<PathBuf>>;
}

/// Symlinks `<bin>/<repository>` to the command and `<bin>/<alias>` to that link.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinLinker;

impl CommandLinker for BinLinker {
    fn link(
        &self,
        ctx: &InstallContext,
        record: &RepositoryRecord,
        command: &str,
    ) -> Result<Vec<PathBuf>> {
        let source = PathBuf::from(command);
        let primary = bin_path(&ctx.bin_dir, &record.repository)?;

        if ctx.preview() {
            info!("[preview] link {} -> {}", primary.display(), source.display());
            if let Some(alias) = record.alias.as_deref() {
                let alias_path = bin_path(&ctx.bin_dir, alias)?;
                info!("[preview] link {} -> {}", alias_path.display(), primary.display());
            }
            return Ok(Vec::new());
        }

        if !source.is_absolute() || !source.exists() {
            warn!(
                "not linking '{}': command '{command}' is not an existing absolute path",
                ctx.identifier
            );
            return Ok(Vec::new());
        }

        fs::create_dir_all(&ctx.bin_dir)
            .with_context(|| format!("failed to create bin dir: {}", ctx.bin_dir.display()))?;

        let mut linked = Vec::new();
        if expose_command(&source, &primary)? {
            linked.push(primary.clone());
        }

        if let Some(alias) = record.alias.as_deref() {
            if alias != record.repository {
                let alias_path = bin_path(&ctx.bin_dir, alias)?;
                if expose_command(&primary, &alias_path)? {
                    linked.push(alias_path);
                }
            }
        }
        Ok(linked)
    }
}

pub fn bin_path(bin_dir: &Path, name: &str) -> Result<PathBuf> {
    Ok(bin_dir.join(validated_link_name(name)?))
}

/// Points `destination` at `source`, replacing whatever stale entry was there.
///
/// Returns false when nothing had to be written: `destination` already resolves
/// to the command, or is the command itself (found through the bin directory).
pub fn expose_command(source: &Path, destination: &Path) -> Result<bool> {
    if resolves_to(destination, source) {
        debug!(
            "{} already resolves to {}",
            destination.display(),
            source.display()
        );
        return Ok(false);
    }

    if destination.is_dir() && !is_symlink(destination) {
        return Err(anyhow!(
            "cannot replace directory with command link: {}",
            destination.display()
        ));
    }
    remove_file_if_exists(destination).with_context(|| {
        format!(
            "failed to replace existing bin entry: {}",
            destination.display()
        )
    })?;

    create_link(source, destination)?;
    debug!("linked {} -> {}", destination.display(), source.display());
    Ok(true)
}

fn validated_link_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(anyhow!("invalid command link name '{name}'"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(anyhow!(
            "command link name must be a single path segment: '{name}'"
        ));
    }
    Ok(trimmed)
}

fn resolves_to(destination: &Path, source: &Path) -> bool {
    match (fs::canonicalize(destination), fs::canonicalize(source)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
}

fn create_link(source: &Path, destination: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(source, destination).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                destination.display(),
                source.display()
            )
        })
    }

    #[cfg(windows)]
    {
        let shim = format!("@echo off\r\n\"{}\" %*\r\n", source.display());
        fs::write(destination, shim.as_bytes())
            .with_context(|| format!("failed to write shim: {}", destination.display()))
    }
}
