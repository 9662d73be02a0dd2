//! # Run Configuration
//!
//! Everything a batch run needs that does not change between repositories:
//! the edit itself, the policies that govern it, where working copies live,
//! the commit identity and the network timeouts. The CLI assembles a
//! [`RunConfig`] from flags; library callers can build one directly with
//! [`RunConfig::new`] and adjust the public fields.
//!
//! The credential is kept separately as a [`Token`], which never shows up in
//! `Debug` output.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::{MultipleManifestPolicy, DEFAULT_MANIFEST_NAME};
use crate::error::{Error, Result};
use crate::manifest::{FieldPath, UpsertOptions};

pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH_PREFIX: &str = "update-manifest";
pub const DEFAULT_AUTHOR_NAME: &str = "manifest-sweep";
pub const DEFAULT_AUTHOR_EMAIL: &str = "manifest-sweep@users.noreply.github.com";
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Author and committer of the generated commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Upper bounds for network operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Per git subprocess.
    pub git: Duration,
    /// Per HTTP request.
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            git: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
            http: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// A hosting-platform credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for request headers and clone URLs only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Read the credential from the environment variable `var`.
///
/// Missing or blank values are a configuration error, reported before any
/// network activity.
pub fn load_token(var: &str) -> Result<Token> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Token::new(value.trim())),
        Ok(_) => Err(Error::configuration(format!(
            "environment variable {} is empty",
            var
        ))),
        Err(_) => Err(Error::configuration(format!(
            "environment variable {} is not set; export a token with repository and pull request access",
            var
        ))),
    }
}

/// Default parent directory for working copies.
pub fn default_work_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("manifest-sweep")
        .join("work")
}

/// Settings shared by every repository of a batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub field: FieldPath,
    pub value: String,
    /// File name searched for in each working copy.
    pub manifest_name: String,
    pub upsert: UpsertOptions,
    pub multiple_manifests: MultipleManifestPolicy,
    pub work_root: PathBuf,
    pub keep_workdirs: bool,
    pub branch_prefix: String,
    pub identity: CommitIdentity,
    pub timeouts: Timeouts,
    /// Stop after the edit; no commit, push or pull request.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(field: FieldPath, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            upsert: UpsertOptions::default(),
            multiple_manifests: MultipleManifestPolicy::default(),
            work_root: default_work_root(),
            keep_workdirs: false,
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            identity: CommitIdentity::default(),
            timeouts: Timeouts::default(),
            dry_run: false,
        }
    }

    /// Reject settings that would fail for every repository.
    pub fn validate(&self) -> Result<()> {
        let name = self.manifest_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(Error::configuration(format!(
                "manifest name '{}' must be a plain file name",
                self.manifest_name
            )));
        }
        if !is_valid_branch_prefix(&self.branch_prefix) {
            return Err(Error::configuration(format!(
                "branch prefix '{}' is not a valid git branch name",
                self.branch_prefix
            )));
        }
        if self.identity.name.trim().is_empty() || !self.identity.email.contains('@') {
            return Err(Error::configuration(
                "commit identity needs a name and an email address",
            ));
        }
        if self.timeouts.git.is_zero() || self.timeouts.http.is_zero() {
            return Err(Error::configuration("timeouts must be at least one second"));
        }
        Ok(())
    }
}

fn is_valid_branch_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.starts_with(['-', '/', '.'])
        && !prefix.ends_with(['/', '.'])
        && !prefix.contains("..")
        && !prefix.contains("//")
        && !prefix.contains("@{")
        && !prefix
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
}
