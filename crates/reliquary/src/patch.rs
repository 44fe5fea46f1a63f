//! In-place executable patching with a one-time backup.

use std::fs;
use std::path::{Path, PathBuf};

use reliquary_exe::{alias_replacement, replace_all};

use crate::context::Context;
use crate::profile::GameProfile;
use crate::{Error, Result};

/// Directory under the game directory that holds pristine copies.
pub const BACKUP_DIR: &str = "_backup";

/// Result of a patch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The executable was rewritten; `occurrences` aliases were replaced.
    Patched { occurrences: usize },
    /// Cancellation was requested; the executable was not rewritten.
    Cancelled,
}

/// Neutralizes a title's path aliases inside its executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExePatcher;

impl ExePatcher {
    /// Location of the backup for an executable.
    pub fn backup_path(exe_path: &Path) -> Result<PathBuf> {
        match (exe_path.parent(), exe_path.file_name()) {
            (Some(dir), Some(name)) => Ok(dir.join(BACKUP_DIR).join(name)),
            _ => Err(Error::InvalidExePath(exe_path.to_path_buf())),
        }
    }

    /// Patch every alias in `profile.replacements`, in order.
    ///
    /// The executable is copied to `_backup/` first unless a backup already
    /// exists, so the backup always holds the unpatched image.
    pub fn patch(ctx: &Context, exe_path: &Path, profile: &GameProfile) -> Result<PatchOutcome> {
        ctx.begin("Preparing to patch...");

        let backup = Self::backup_path(exe_path)?;
        if !backup.exists() {
            let backup_error = |source| Error::Backup {
                path: exe_path.to_path_buf(),
                source,
            };
            if let Some(dir) = backup.parent() {
                fs::create_dir_all(dir).map_err(backup_error)?;
            }
            fs::copy(exe_path, &backup).map_err(backup_error)?;
            tracing::info!(backup = %backup.display(), "backed up executable");
        }

        let mut image = fs::read(exe_path).map_err(|source| Error::ReadFile {
            path: exe_path.to_path_buf(),
            source,
        })?;

        let aliases = &profile.replacements;
        let steps = aliases.len() as f64 + 1.0;
        let mut occurrences = 0;
        for (i, target) in aliases.iter().enumerate() {
            if ctx.is_cancelled() {
                return Ok(PatchOutcome::Cancelled);
            }

            ctx.report(
                (i as f64 + 1.0) / steps,
                &format!("Patching alias \"{target}\" ({}/{})...", i + 1, aliases.len()),
            );

            let replacement = alias_replacement(target);
            let count = replace_all(&mut image, target, &replacement).map_err(|source| Error::Patch {
                path: exe_path.to_path_buf(),
                source,
            })?;
            if count == 0 {
                tracing::warn!(alias = %target, "alias not found in executable");
            }
            occurrences += count;
        }

        fs::write(exe_path, &image).map_err(|source| Error::WriteFile {
            path: exe_path.to_path_buf(),
            source,
        })?;

        ctx.report(1.0, "Patching complete!");
        tracing::info!(exe = %exe_path.display(), occurrences, "patching complete");
        Ok(PatchOutcome::Patched { occurrences })
    }
}
