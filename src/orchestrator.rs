//! # Per-Repository Orchestration
//!
//! Drives one batch run: for every row of the input set, clone the repository,
//! create a branch, locate and edit the manifest, commit, push and open a pull
//! request. Each repository ends in exactly one [`Outcome`]. Failures are
//! recorded and the batch moves on; only fatal errors (configuration,
//! authentication, an invalid field path) stop it.
//!
//! ## States
//!
//! ```text
//! Cloning -> BranchCreated -> ManifestLocated -> Mutated -> Committed -> Pushed -> PullRequestOpened
//!     \            \                \               \            \          \
//!      +------------+----------------+---------------+------------+----------+--> Skipped | Failed
//! ```
//!
//! Every transition is logged at debug level. Git and the hosting platform
//! are reached through the [`SourceControl`] and [`HostingPlatform`] traits,
//! so the whole workflow runs against mocks in tests.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, Token};
use crate::discovery::{locate_manifest, Discovery};
use crate::error::{Error, Result};
use crate::exit_codes;
use crate::hosting::{HostingPlatform, PullRequest};
use crate::manifest::{self, MutationResult};
use crate::output::unified_diff;
use crate::repository::SourceControl;
use crate::targets::RepositoryTarget;

/// Why a repository was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The input row was malformed.
    InvalidTarget(String),
    ManifestNotFound,
    /// Several manifests matched and the policy is `skip`.
    AmbiguousManifest(Vec<PathBuf>),
    /// The field already holds the value.
    AlreadyUpToDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidTarget(reason) => write!(f, "invalid target: {}", reason),
            SkipReason::ManifestNotFound => f.write_str("manifest not found"),
            SkipReason::AmbiguousManifest(paths) => {
                let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "multiple manifests found: {}", paths.join(", "))
            }
            SkipReason::AlreadyUpToDate => f.write_str("already up to date"),
        }
    }
}

/// Terminal state of one repository.
#[derive(Debug)]
pub enum Outcome {
    Skipped(SkipReason),
    Failed(Error),
    /// Carries the pull request URL.
    PullRequestOpened(String),
    /// The edit that would have been committed.
    DryRun(MutationResult),
}

/// The result of processing one row of the input set.
#[derive(Debug)]
pub struct RunOutcome {
    /// 1-based row number in the input set.
    pub row: usize,
    /// `owner/name`, or the raw URL for rows that failed validation.
    pub target: String,
    pub outcome: Outcome,
    /// Manifest path relative to the working copy, once located.
    pub manifest: Option<PathBuf>,
    /// Unified diff of the edit, in dry-run mode.
    pub diff: Option<String>,
}

impl RunOutcome {
    fn new(row: usize, target: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            row,
            target: target.into(),
            outcome,
            manifest: None,
            diff: None,
        }
    }
}

/// Aggregate of a finished batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub opened: usize,
    pub dry_run: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<RunOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: RunOutcome) {
        match outcome.outcome {
            Outcome::PullRequestOpened(_) => self.opened += 1,
            Outcome::DryRun(_) => self.dry_run += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Process exit code for this batch.
    pub fn exit_code(&self) -> u8 {
        if self.failed > 0 {
            exit_codes::FAILURES
        } else {
            exit_codes::SUCCESS
        }
    }
}

/// Name of the branch carrying the change: `<prefix>-<YYYYmmddHHMMSS>-<6 hex>`.
pub fn branch_name(prefix: &str, now: DateTime<Local>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d%H%M%S"), &suffix[..6])
}

/// A working copy that is deleted when dropped.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    keep: bool,
}

impl WorkingCopy {
    pub fn new(path: PathBuf, keep: bool) -> Self {
        Self { path, keep }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.keep {
            debug!("keeping working copy {}", self.path.display());
            return;
        }
        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!("Failed to remove working copy {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Runs a batch against a pair of collaborators.
pub struct Orchestrator<'a> {
    config: &'a RunConfig,
    source_control: &'a dyn SourceControl,
    hosting: &'a dyn HostingPlatform,
    token: Option<&'a Token>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a RunConfig,
        source_control: &'a dyn SourceControl,
        hosting: &'a dyn HostingPlatform,
    ) -> Self {
        Self {
            config,
            source_control,
            hosting,
            token: None,
        }
    }

    /// Embed `token` in clone URLs.
    pub fn with_token(mut self, token: &'a Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Process every row in order.
    ///
    /// `report` sees each outcome as soon as it is known. An `Err` is
    /// returned only for fatal errors; everything else lands in the summary.
    pub fn run_batch<F>(&self, targets: Vec<Result<RepositoryTarget>>, mut report: F) -> Result<BatchSummary>
    where
        F: FnMut(&RunOutcome),
    {
        self.config.validate()?;
        let login = self.hosting.authenticate()?;
        info!("Authenticated as {}", login);

        let mut summary = BatchSummary::default();
        for (index, target) in targets.into_iter().enumerate() {
            let outcome = match target {
                Ok(target) => self.process(index + 1, &target)?,
                Err(Error::TargetValidation { row, url, reason }) => {
                    warn!("Skipping row {} ({}): {}", row, url, reason);
                    RunOutcome::new(row, url, Outcome::Skipped(SkipReason::InvalidTarget(reason)))
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => RunOutcome::new(
                    index + 1,
                    format!("row {}", index + 1),
                    Outcome::Skipped(SkipReason::InvalidTarget(e.to_string())),
                ),
            };
            report(&outcome);
            summary.record(outcome);
        }
        Ok(summary)
    }

    /// Run the workflow for one repository.
    pub fn process(&self, row: usize, target: &RepositoryTarget) -> Result<RunOutcome> {
        let mut outcome = RunOutcome::new(row, target.full_name.clone(), Outcome::Skipped(SkipReason::AlreadyUpToDate));
        match self.attempt(target, &mut outcome) {
            Ok(result) => outcome.outcome = result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("{}: Failed", target.full_name);
                outcome.outcome = Outcome::Failed(e);
            }
        }
        Ok(outcome)
    }

    fn attempt(&self, target: &RepositoryTarget, record: &mut RunOutcome) -> Result<Outcome> {
        let config = self.config;
        let name = target.full_name.as_str();
        let copy = WorkingCopy::new(config.work_root.join(target.work_dir_name()), config.keep_workdirs);
        let dir = copy.path();

        debug!("{}: Cloning {} into {}", name, target.branch, dir.display());
        let url = match self.token {
            Some(token) => target.authenticated_url(token.expose())?,
            None => target.url.clone(),
        };
        self.source_control.clone_branch(&url, &target.branch, dir)?;
        self.source_control.checkout(dir, &target.branch)?;

        let branch = branch_name(&config.branch_prefix, Local::now());
        self.source_control.create_branch(dir, &branch)?;
        debug!("{}: BranchCreated {}", name, branch);

        let path = match locate_manifest(dir, &config.manifest_name, config.multiple_manifests)? {
            Discovery::Found(path) => path,
            Discovery::NotFound => {
                debug!("{}: Skipped, no '{}'", name, config.manifest_name);
                return Ok(Outcome::Skipped(SkipReason::ManifestNotFound));
            }
            Discovery::Ambiguous(paths) => {
                return Ok(Outcome::Skipped(SkipReason::AmbiguousManifest(paths)))
            }
        };
        let relative = path.strip_prefix(dir).unwrap_or(&path).to_path_buf();
        record.manifest = Some(relative.clone());
        debug!("{}: ManifestLocated {}", name, relative.display());

        let original = fs::read_to_string(&path)?;
        let (updated, result) = manifest::edit(&original, &config.field, &config.value, config.upsert)?;
        if !result.changed || updated == original {
            debug!("{}: Skipped, {} already set", name, result.path);
            return Ok(Outcome::Skipped(SkipReason::AlreadyUpToDate));
        }
        debug!("{}: Mutated ({} {})", name, result.action, result.path);

        if config.dry_run {
            record.diff = Some(unified_diff(&relative, &original, &updated));
            return Ok(Outcome::DryRun(result));
        }

        fs::write(&path, &updated)?;
        self.source_control.stage_all(dir)?;
        let message = format!(
            "Set {} to '{}' in {}",
            config.field,
            config.value,
            relative.display()
        );
        self.source_control.commit(dir, &message, &config.identity)?;
        debug!("{}: Committed", name);

        self.source_control.push_upstream(dir, &branch)?;
        debug!("{}: Pushed {}", name, branch);

        let metadata = self.hosting.repository(name)?;
        if metadata.default_branch != target.branch {
            debug!(
                "{}: base branch {} differs from default branch {}",
                name, target.branch, metadata.default_branch
            );
        }
        let request = PullRequest {
            title: format!("Update {} to {}", config.field, config.value),
            body: format!("Setting `{}: {}` via automation", config.field, config.value),
            head: branch,
            base: target.branch.clone(),
        };
        let html_url = self.hosting.create_pull_request(&metadata.full_name, &request)?;
        debug!("{}: PullRequestOpened {}", name, html_url);
        Ok(Outcome::PullRequestOpened(html_url))
    }
}
