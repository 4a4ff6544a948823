//! Untracked-file preservation across an update.
//!
//! Files present in the working copy but unknown to git are copied into a
//! temporary directory (relative paths preserved) before the working tree is
//! moved, and copied back afterwards. Restored files overwrite whatever the
//! update put at the same path.
//!
//! Ignored files are left alone by a checkout unless the incoming tree starts
//! tracking their path, so only those ignored files are staged.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{Repository, Status, StatusOptions, Tree};
use tempfile::TempDir;

use crate::error::{io_err, SyncError};

pub(crate) struct StagedFiles {
    // `None` when there was nothing to stage.
    dir: Option<TempDir>,
    paths: Vec<PathBuf>,
}

impl StagedFiles {
    /// Copy every untracked file of `repo`, plus every ignored file that
    /// `incoming` tracks, into a staging directory.
    pub(crate) fn capture(
        repo: &Repository,
        workdir: &Path,
        incoming: &Tree<'_>,
    ) -> Result<Self, SyncError> {
        let paths = untracked_files(repo, incoming)?;
        if paths.is_empty() {
            return Ok(Self { dir: None, paths });
        }

        let dir = tempfile::Builder::new()
            .prefix("deployer-untracked-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;

        for relative in &paths {
            copy_entry(&workdir.join(relative), &dir.path().join(relative))?;
        }

        tracing::debug!(
            workdir = %workdir.display(),
            count = paths.len(),
            "staged untracked files",
        );
        Ok(Self {
            dir: Some(dir),
            paths,
        })
    }

    pub(crate) fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub(crate) fn len(&self) -> usize {
        self.paths.len()
    }

    /// Copy the staged files back into `workdir`, replacing same-path files.
    pub(crate) fn restore(&self, workdir: &Path) -> Result<(), SyncError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        for relative in &self.paths {
            let target = workdir.join(relative);
            if target.is_dir() {
                tracing::warn!(
                    path = %target.display(),
                    "untracked file replaced by a tracked directory; not restored",
                );
                continue;
            }
            copy_entry(&dir.path().join(relative), &target)?;
        }
        Ok(())
    }
}

fn untracked_files(repo: &Repository, incoming: &Tree<'_>) -> Result<Vec<PathBuf>, SyncError> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(true)
        .recurse_ignored_dirs(true)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut options))?;
    let mut paths = Vec::new();
    for entry in statuses.iter() {
        let status = entry.status();
        let untracked = status.contains(Status::WT_NEW);
        if !untracked && !status.contains(Status::IGNORED) {
            continue;
        }
        let Some(path) = entry.path().map(PathBuf::from) else {
            tracing::warn!("skipping untracked file with a non UTF-8 path");
            continue;
        };
        if untracked || incoming.get_path(&path).is_ok() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn copy_entry(source: &Path, target: &Path) -> Result<(), SyncError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let meta = fs::symlink_metadata(source).map_err(|e| io_err(source, e))?;
    #[cfg(unix)]
    if meta.file_type().is_symlink() {
        let link = fs::read_link(source).map_err(|e| io_err(source, e))?;
        if fs::symlink_metadata(target).is_ok() {
            fs::remove_file(target).map_err(|e| io_err(target, e))?;
        }
        return std::os::unix::fs::symlink(&link, target).map_err(|e| io_err(target, e));
    }
    #[cfg(not(unix))]
    let _ = meta;

    fs::copy(source, target).map_err(|e| io_err(target, e))?;
    Ok(())
}
