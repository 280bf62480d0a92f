//! VCS snapshot/restore primitives
//!
//! `developer_node` takes a snapshot before every batch so that an
//! `abort_revert` blocker resolution can restore the worktree exactly.
//! Kept to a narrow trait (rather than exposing `git2::Repository` directly)
//! so tests can substitute an in-memory fake, matching the teacher's
//! `TaskExecutor` trait-plus-impl seam in `lib.rs`.

use crate::workflow::model::GitSnapshotBeforeBatch;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("no HEAD commit in repository at {0}")]
    NoHead(String),
}

#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Record the current HEAD commit and the set of files already dirty
    /// (modified or untracked), labelled with the batch about to execute.
    async fn snapshot(&self, batch_id: &str) -> Result<GitSnapshotBeforeBatch, VcsError>;

    /// Restore only the files the batch changed — current status minus
    /// `snapshot.dirty_files` — back to their content at `snapshot.commit_hash`.
    /// Files that were already dirty before the batch began are left untouched.
    async fn restore(&self, snapshot: &GitSnapshotBeforeBatch) -> Result<(), VcsError>;
}

/// `git2`-backed implementation over a single worktree path.
pub struct Git2VcsAdapter {
    worktree_path: PathBuf,
}

impl Git2VcsAdapter {
    pub fn new(worktree_path: impl Into<PathBuf>) -> Self {
        Self {
            worktree_path: worktree_path.into(),
        }
    }

    fn open(&self) -> Result<git2::Repository, VcsError> {
        Ok(git2::Repository::open(&self.worktree_path)?)
    }
}

#[async_trait]
impl VcsAdapter for Git2VcsAdapter {
    async fn snapshot(&self, batch_id: &str) -> Result<GitSnapshotBeforeBatch, VcsError> {
        let path = self.worktree_path.clone();
        let batch_id = batch_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<GitSnapshotBeforeBatch, VcsError> {
            let repo = git2::Repository::open(&path)?;
            let head = repo
                .head()
                .ok()
                .and_then(|h| h.peel_to_commit().ok())
                .ok_or_else(|| VcsError::NoHead(path.display().to_string()))?;

            let mut opts = git2::StatusOptions::new();
            opts.include_untracked(true);
            let statuses = repo.statuses(Some(&mut opts))?;
            let dirty_files: Vec<String> = statuses
                .iter()
                .filter_map(|entry| entry.path().map(str::to_string))
                .collect();

            Ok(GitSnapshotBeforeBatch {
                batch_id,
                commit_hash: head.id().to_string(),
                dirty_files,
                stash_ref: None,
            })
        })
        .await
        .map_err(|e| VcsError::NoHead(e.to_string()))?
    }

    /// Restores only files the batch touched. "Batch-changed" is current
    /// status minus `snapshot.dirty_files` — anything dirty that wasn't
    /// already dirty before the batch started. Each path is passed to
    /// `CheckoutBuilder::path` individually, never interpolated into a shell
    /// string.
    async fn restore(&self, snapshot: &GitSnapshotBeforeBatch) -> Result<(), VcsError> {
        let path = self.worktree_path.clone();
        let commit_hash = snapshot.commit_hash.clone();
        let pre_existing_dirty: HashSet<String> = snapshot.dirty_files.iter().cloned().collect();

        tokio::task::spawn_blocking(move || -> Result<(), VcsError> {
            let repo = git2::Repository::open(&path)?;
            let oid = git2::Oid::from_str(&commit_hash)?;
            let commit = repo.find_commit(oid)?;
            let tree = commit.tree()?;

            let mut status_opts = git2::StatusOptions::new();
            status_opts.include_untracked(true);
            let statuses = repo.statuses(Some(&mut status_opts))?;
            let batch_changed: Vec<String> = statuses
                .iter()
                .filter_map(|entry| entry.path().map(str::to_string))
                .filter(|p| !pre_existing_dirty.contains(p))
                .collect();

            if batch_changed.is_empty() {
                return Ok(());
            }

            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.force();
            checkout.remove_untracked(true);
            for p in &batch_changed {
                checkout.path(p);
            }
            repo.checkout_tree(tree.as_object(), Some(&mut checkout))?;

            let mut index = repo.index()?;
            for p in &batch_changed {
                if path.join(p).exists() {
                    index.add_path(std::path::Path::new(p))?;
                } else {
                    let _ = index.remove_path(std::path::Path::new(p));
                }
            }
            index.write()?;
            Ok(())
        })
        .await
        .map_err(|e| VcsError::NoHead(e.to_string()))?
    }
}

/// In-memory fake for unit tests that don't want a real repository.
#[cfg(test)]
pub struct FakeVcsAdapter {
    pub head: std::sync::Mutex<String>,
    pub restored_to: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl FakeVcsAdapter {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: std::sync::Mutex::new(head.into()),
            restored_to: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl VcsAdapter for FakeVcsAdapter {
    async fn snapshot(&self, batch_id: &str) -> Result<GitSnapshotBeforeBatch, VcsError> {
        Ok(GitSnapshotBeforeBatch {
            batch_id: batch_id.to_string(),
            commit_hash: self.head.lock().unwrap().clone(),
            dirty_files: Vec::new(),
            stash_ref: None,
        })
    }

    async fn restore(&self, snapshot: &GitSnapshotBeforeBatch) -> Result<(), VcsError> {
        self.restored_to.lock().unwrap().push(snapshot.commit_hash.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_adapter_records_restore_target() {
        let adapter = FakeVcsAdapter::new("abc123");
        let snap = adapter.snapshot("b1").await.unwrap();
        assert_eq!(snap.commit_hash, "abc123");

        adapter.restore(&snap).await.unwrap();
        assert_eq!(adapter.restored_to.lock().unwrap().as_slice(), ["abc123"]);
    }
}
