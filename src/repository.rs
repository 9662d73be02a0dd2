//! # Source-Control Collaborator
//!
//! The orchestrator never calls `git` directly. It talks to a
//! [`SourceControl`] implementation, which keeps the per-repository workflow
//! independent of how working copies are produced.
//!
//! - **`DefaultSourceControl`** wraps the functions in [`crate::git`], which
//!   shell out to the system `git` binary with a bounded timeout.
//! - Tests substitute mock implementations that record calls and write
//!   fixture files instead of cloning.

use std::path::Path;

use crate::config::CommitIdentity;
use crate::error::Result;
use crate::git::{self, GitOptions};

/// Working-copy operations needed for one repository.
pub trait SourceControl {
    /// Clone `branch` of `url` into `target_dir`, replacing prior contents.
    fn clone_branch(&self, url: &str, branch: &str, target_dir: &Path) -> Result<()>;

    /// Check out an existing branch.
    fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Create a branch from HEAD and switch to it.
    fn create_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Stage all changes.
    fn stage_all(&self, dir: &Path) -> Result<()>;

    /// Commit staged changes with an explicit identity.
    fn commit(&self, dir: &Path, message: &str, identity: &CommitIdentity) -> Result<()>;

    /// Push `branch` to `origin`, setting it as upstream.
    fn push_upstream(&self, dir: &Path, branch: &str) -> Result<()>;
}

/// The default implementation of `SourceControl`, backed by the system
/// `git` command.
#[derive(Debug, Clone, Default)]
pub struct DefaultSourceControl {
    options: GitOptions,
}

impl DefaultSourceControl {
    pub fn new(options: GitOptions) -> Self {
        Self { options }
    }
}

impl SourceControl for DefaultSourceControl {
    fn clone_branch(&self, url: &str, branch: &str, target_dir: &Path) -> Result<()> {
        git::clone_branch(url, branch, target_dir, &self.options)
    }

    fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        git::checkout(dir, branch, &self.options)
    }

    fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        git::create_branch(dir, branch, &self.options)
    }

    fn stage_all(&self, dir: &Path) -> Result<()> {
        git::stage_all(dir, &self.options)
    }

    fn commit(&self, dir: &Path, message: &str, identity: &CommitIdentity) -> Result<()> {
        git::commit(dir, message, identity, &self.options)
    }

    fn push_upstream(&self, dir: &Path, branch: &str) -> Result<()> {
        git::push_upstream(dir, branch, &self.options)
    }
}
