//! Workspace VCS adapter (C14): git detection, clone/fetch/checkout, and a
//! lightweight overview scan for review and iteration workspaces. SVN gets a
//! thin presence-check shim — git2 has no SVN support, and the design only
//! asks that it be recognized, not fully driven.
//!
//! Grounded on the teacher's `backend/src/git/client/*` (git2 usage,
//! `spawn_blocking` for the synchronous calls, checkout-by-branch) and
//! `crates/mira-server/src/git.rs` (repository discovery, detached-HEAD
//! normalization).

use std::path::{Path, PathBuf};

use git2::{BranchType, Repository, StatusOptions};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0} is not inside a recognized repository")]
    NotARepository(PathBuf),
    #[error("branch '{0}' not found")]
    BranchNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Svn,
    None,
}

#[derive(Debug, Clone)]
pub struct RepoOverview {
    pub vcs: VcsKind,
    pub branch: Option<String>,
    pub head_commit: Option<String>,
    pub is_dirty: bool,
    pub remote_url: Option<String>,
    pub tracked_file_count: usize,
}

/// Detects which VCS, if any, owns `path`. Git wins if both `.git` and
/// `.svn` happen to be present, since git2's discovery walks up the tree and
/// will be what every other operation in this module actually uses.
pub fn detect(path: &Path) -> VcsKind {
    if Repository::discover(path).is_ok() {
        VcsKind::Git
    } else if is_svn_working_copy(path) {
        VcsKind::Svn
    } else {
        VcsKind::None
    }
}

fn is_svn_working_copy(path: &Path) -> bool {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.join(".svn").is_dir() {
            return true;
        }
        current = dir.parent();
    }
    false
}

/// Clones `url` into `dest`, creating parent directories as needed. Runs on
/// a blocking thread since git2 is synchronous.
pub async fn clone(url: &str, dest: &Path) -> Result<(), VcsError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let url = url.to_string();
    let dest = dest.to_path_buf();
    info!(url = %url, dest = %dest.display(), "cloning repository");

    tokio::task::spawn_blocking(move || Repository::clone(&url, &dest)).await??;
    Ok(())
}

/// Fetches updates for `origin` without merging or checking out.
pub async fn fetch(path: &Path) -> Result<(), VcsError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), VcsError> {
        let repo = Repository::discover(&path)?;
        let mut remote = repo.find_remote("origin")?;
        remote.fetch::<&str>(&[], None, None)?;
        Ok(())
    })
    .await??;
    Ok(())
}

/// Checks out a local branch by name, setting `HEAD` and updating the
/// working tree to match.
pub async fn checkout(path: &Path, branch_name: &str) -> Result<(), VcsError> {
    let path = path.to_path_buf();
    let branch_name = branch_name.to_string();
    tokio::task::spawn_blocking(move || -> Result<(), VcsError> {
        let repo = Repository::discover(&path)?;
        let branch = repo
            .find_branch(&branch_name, BranchType::Local)
            .map_err(|_| VcsError::BranchNotFound(branch_name.clone()))?;
        let commit = branch.get().peel_to_commit()?;

        repo.set_head(&format!("refs/heads/{branch_name}"))?;
        repo.checkout_tree(commit.as_object(), None)?;
        debug!(branch = %branch_name, "checked out branch");
        Ok(())
    })
    .await??;
    Ok(())
}

/// Summarizes a workspace's VCS state: current branch, head commit, dirty
/// status, origin URL. For SVN, only [`RepoOverview::vcs`] and
/// [`RepoOverview::tracked_file_count`] are populated — git2 can't drive SVN
/// working copies.
pub async fn overview(path: &Path) -> Result<RepoOverview, VcsError> {
    let kind = detect(path);
    if kind == VcsKind::None {
        return Err(VcsError::NotARepository(path.to_path_buf()));
    }
    if kind == VcsKind::Svn {
        return Ok(RepoOverview {
            vcs: VcsKind::Svn,
            branch: None,
            head_commit: None,
            is_dirty: false,
            remote_url: None,
            tracked_file_count: count_files(path),
        });
    }

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<RepoOverview, VcsError> {
        let repo = Repository::discover(&path)?;

        let branch = if repo.head_detached().unwrap_or(false) {
            Some("detached".to_string())
        } else {
            repo.head().ok().and_then(|h| h.shorthand().map(str::to_string))
        };
        let head_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok()).map(|c| c.id().to_string());

        let mut status_opts = StatusOptions::new();
        status_opts.include_untracked(true);
        let is_dirty = repo
            .statuses(Some(&mut status_opts))
            .map(|statuses| statuses.len() > 0)
            .unwrap_or(false);

        let remote_url = repo.find_remote("origin").ok().and_then(|r| r.url().map(str::to_string));

        Ok(RepoOverview {
            vcs: VcsKind::Git,
            branch,
            head_commit,
            is_dirty,
            remote_url,
            tracked_file_count: count_files(&path),
        })
    })
    .await?
}

fn count_files(root: &Path) -> usize {
    ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .count()
}
