//! Repository Sync Engine.
//!
//! ## `synchronize`: update protocol
//!
//! 1. Fetch `refs/heads/<branch>` into `refs/remotes/origin/<branch>` (no merge).
//! 2. Compare local and remote tips → `NoChange` when equal.
//! 3. Stage untracked files into a temporary directory.
//! 4. Fast-forward the working copy (safe checkout, conflicts surface as errors).
//! 5. Restore the staged files over the updated tree.
//! 6. `Updated`.

use std::fs;
use std::path::Path;

use deployer_core::{Credentials, RepositoryDescriptor};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{ErrorCode, Oid, Repository};

use crate::auth;
use crate::error::{io_err, SyncError};
use crate::staging::StagedFiles;

/// Result of one synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local tip already matches the remote tip; nothing was touched.
    NoChange,
    /// The working copy moved from `from` to `to`.
    Updated {
        from: String,
        to: String,
        /// Untracked files carried across the update.
        preserved: usize,
    },
    /// Fetch or update failed; the working copy is left for the next trigger.
    Failed(String),
}

/// What [`ensure_cloned`] found at the descriptor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStatus {
    /// A working copy already existed.
    Present,
    /// A fresh clone was made.
    Cloned,
}

/// Make sure a working copy exists at `repo.path`.
///
/// A directory without `.git` is treated as a stale partial clone and removed
/// before cloning `repo.clone_url` at `repo.branch`.
pub fn ensure_cloned(
    repo: &RepositoryDescriptor,
    credentials: &Credentials,
) -> Result<CloneStatus, SyncError> {
    if repo.path.join(".git").exists() {
        return Ok(CloneStatus::Present);
    }

    if repo.path.exists() {
        tracing::warn!(path = %repo.path.display(), "removing directory without git metadata before clone");
        fs::remove_dir_all(&repo.path).map_err(|e| io_err(&repo.path, e))?;
    }
    if let Some(parent) = repo.path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    tracing::info!(url = %repo.clone_url, path = %repo.path.display(), "cloning repository");
    let cloned = RepoBuilder::new()
        .branch(&repo.branch)
        .fetch_options(auth::fetch_options(credentials))
        .clone(&repo.clone_url, &repo.path);

    match cloned {
        Ok(_) => Ok(CloneStatus::Cloned),
        Err(source) => {
            if repo.path.exists() {
                let _ = fs::remove_dir_all(&repo.path);
            }
            Err(SyncError::Clone {
                url: repo.clone_url.clone(),
                source,
            })
        }
    }
}

/// Bring the working copy up to date, folding failures into [`SyncOutcome::Failed`].
pub fn synchronize(repo: &RepositoryDescriptor, credentials: &Credentials) -> SyncOutcome {
    match try_synchronize(repo, credentials) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(path = %repo.path.display(), error = %err, "synchronize failed");
            SyncOutcome::Failed(err.to_string())
        }
    }
}

/// Bring the working copy up to date with the remote branch tip.
pub fn try_synchronize(
    repo: &RepositoryDescriptor,
    credentials: &Credentials,
) -> Result<SyncOutcome, SyncError> {
    let git = Repository::open(&repo.path)?;
    let branch = repo.branch.as_str();
    let local_ref = format!("refs/heads/{branch}");

    let remote_oid = fetch_branch(&git, repo, credentials)?;
    let local_oid = git
        .refname_to_id(&local_ref)
        .map_err(|_| SyncError::MissingRef {
            reference: local_ref.clone(),
        })?;

    if local_oid == remote_oid {
        tracing::debug!(path = %repo.path.display(), branch, "already up to date");
        return Ok(SyncOutcome::NoChange);
    }

    let head = current_branch(&git)?;
    if head.as_deref() != Some(branch) {
        return Err(SyncError::BranchMismatch {
            expected: branch.to_string(),
            found: head.unwrap_or_else(|| "HEAD (detached)".to_string()),
        });
    }

    let incoming = git.find_annotated_commit(remote_oid)?;
    let (analysis, _) = git.merge_analysis(&[&incoming])?;
    if analysis.is_up_to_date() {
        // Local branch is ahead of the remote; there is nothing to apply.
        return Ok(SyncOutcome::NoChange);
    }
    if !analysis.is_fast_forward() {
        return Err(SyncError::Diverged {
            branch: branch.to_string(),
            local: local_oid.to_string(),
            remote: remote_oid.to_string(),
        });
    }

    let incoming_tree = git.find_commit(remote_oid)?.tree()?;
    let staged = StagedFiles::capture(&git, &repo.path, &incoming_tree)?;
    let updated = fast_forward(&git, &repo.path, &local_ref, remote_oid, &staged);
    let restored = staged.restore(&repo.path);
    updated?;
    restored?;

    tracing::info!(
        path = %repo.path.display(),
        branch,
        from = %local_oid,
        to = %remote_oid,
        preserved = staged.len(),
        "working copy updated",
    );
    Ok(SyncOutcome::Updated {
        from: local_oid.to_string(),
        to: remote_oid.to_string(),
        preserved: staged.len(),
    })
}

/// Fetch the descriptor branch and return the fetched tip.
fn fetch_branch(
    git: &Repository,
    repo: &RepositoryDescriptor,
    credentials: &Credentials,
) -> Result<Oid, SyncError> {
    let branch = repo.branch.as_str();
    let tracking_ref = format!("refs/remotes/origin/{branch}");
    let refspec = format!("+refs/heads/{branch}:{tracking_ref}");

    // Anonymous remote so a changed clone URL in the settings takes effect
    // without rewriting the checkout's git config.
    let mut remote = git.remote_anonymous(&repo.clone_url)?;
    let mut options = auth::fetch_options(credentials);
    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(|source| SyncError::Fetch {
            url: repo.clone_url.clone(),
            branch: branch.to_string(),
            source,
        })?;

    git.refname_to_id(&tracking_ref)
        .or_else(|_| {
            git.find_reference("FETCH_HEAD")
                .and_then(|fetch_head| fetch_head.peel_to_commit())
                .map(|commit| commit.id())
        })
        .map_err(|_| SyncError::MissingRef {
            reference: tracking_ref,
        })
}

fn current_branch(git: &Repository) -> Result<Option<String>, SyncError> {
    let head = match git.head() {
        Ok(head) => head,
        Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if head.is_branch() {
        Ok(head.shorthand().map(str::to_string))
    } else {
        Ok(None)
    }
}

fn fast_forward(
    git: &Repository,
    workdir: &Path,
    local_ref: &str,
    target: Oid,
    staged: &StagedFiles,
) -> Result<(), SyncError> {
    let commit = git.find_commit(target)?;
    let tree = commit.tree()?;

    // Staged untracked files that the update adds as tracked would block a
    // safe checkout. They come back in the restore step.
    for relative in staged.paths() {
        if tree.get_path(relative).is_ok() {
            let path = workdir.join(relative);
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
    }

    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    git.checkout_tree(commit.as_object(), Some(&mut checkout))
        .map_err(|err| match err.code() {
            ErrorCode::Conflict | ErrorCode::MergeConflict => SyncError::Conflict {
                branch: local_ref.trim_start_matches("refs/heads/").to_string(),
                message: err.message().to_string(),
            },
            _ => SyncError::Git(err),
        })?;

    let mut reference = git.find_reference(local_ref)?;
    reference.set_target(target, &format!("deployer: fast-forward to {target}"))?;
    git.set_head(local_ref)?;
    Ok(())
}
