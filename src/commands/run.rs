//! # Run Command Implementation
//!
//! This module implements the `run` subcommand, the batch workflow of
//! `manifest-sweep`. For every repository of the input set it clones the base
//! branch, sets the field in the manifest, pushes a new branch and opens a
//! pull request.
//!
//! ## Pre-flight
//!
//! Before any network activity the command parses the field path, validates
//! the options, reads the token from the environment and reads the input set.
//! Any problem at this stage is fatal (exit code 1). Once the batch is under
//! way, failures are reported per repository and the command exits with
//! code 3 if any repository failed.
//!
//! ## Example
//!
//! ```bash
//! export GITHUB_TOKEN=...
//! manifest-sweep run --targets repos.csv --field applications.stack --value cflinuxfs4 --dry-run
//! ```

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use manifest_sweep::config::{
    load_token, CommitIdentity, RunConfig, Timeouts, DEFAULT_API_URL, DEFAULT_AUTHOR_EMAIL,
    DEFAULT_AUTHOR_NAME, DEFAULT_BRANCH_PREFIX, DEFAULT_GIT_TIMEOUT_SECS,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_TOKEN_ENV,
};
use manifest_sweep::discovery::{MultipleManifestPolicy, DEFAULT_MANIFEST_NAME};
use manifest_sweep::git::GitOptions;
use manifest_sweep::hosting::GitHub;
use manifest_sweep::manifest::{CoercionPolicy, FieldPath, QuotingPolicy, UpsertOptions};
use manifest_sweep::orchestrator::{BatchSummary, Orchestrator, Outcome, RunOutcome};
use manifest_sweep::output::{colorize_diff, emoji, OutputConfig};
use manifest_sweep::repository::DefaultSourceControl;
use manifest_sweep::targets::{read_targets, DEFAULT_HOST_PREFIX};

/// Set a field in the manifest of every repository and open pull requests
#[derive(Args, Debug)]
pub struct RunArgs {
    /// CSV input set with `repo_url` and `branch` columns.
    #[arg(short, long, value_name = "FILE")]
    pub targets: PathBuf,

    /// Dotted path of the field to set, e.g. `applications.stack`.
    #[arg(short, long, value_name = "PATH")]
    pub field: String,

    /// Value to write at the field path.
    #[arg(short, long, value_name = "VALUE", allow_hyphen_values = true)]
    pub value: String,

    /// File name of the manifest to look for in each repository.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_MANIFEST_NAME)]
    pub manifest: String,

    /// When to quote the written value (never, if-needed, always).
    #[arg(long, value_name = "POLICY", default_value_t = QuotingPolicy::IfNeeded)]
    pub quote: QuotingPolicy,

    /// What to do when the path runs through a non-mapping value (reject, replace).
    #[arg(long, value_name = "POLICY", default_value_t = CoercionPolicy::Reject)]
    pub on_coercion: CoercionPolicy,

    /// What to do when a repository holds several manifests (first, skip).
    #[arg(long, value_name = "POLICY", default_value_t = MultipleManifestPolicy::First)]
    pub on_multiple_manifests: MultipleManifestPolicy,

    /// Parent directory for working copies.
    ///
    /// Defaults to the system cache directory (`~/.cache/manifest-sweep/work`
    /// on Linux). Can also be set with the `MANIFEST_SWEEP_WORK_DIR`
    /// environment variable.
    #[arg(long, value_name = "DIR", env = "MANIFEST_SWEEP_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Leave working copies on disk after each repository.
    #[arg(long)]
    pub keep_workdirs: bool,

    /// Prefix of the branch created in each repository.
    #[arg(long, value_name = "PREFIX", default_value = DEFAULT_BRANCH_PREFIX)]
    pub branch_prefix: String,

    /// Repository URLs must start with this prefix.
    #[arg(long, value_name = "URL", default_value = DEFAULT_HOST_PREFIX)]
    pub host_prefix: String,

    /// Base URL of the hosting platform's REST API.
    #[arg(long, value_name = "URL", env = "MANIFEST_SWEEP_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Environment variable holding the access token.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_TOKEN_ENV)]
    pub token_env: String,

    /// Commit author name.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_AUTHOR_NAME)]
    pub author_name: String,

    /// Commit author email.
    #[arg(long, value_name = "EMAIL", default_value = DEFAULT_AUTHOR_EMAIL)]
    pub author_email: String,

    /// Timeout for each git operation, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_GIT_TIMEOUT_SECS)]
    pub git_timeout_secs: u64,

    /// Timeout for each API request, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Edit the manifests and print diffs without committing, pushing or
    /// opening pull requests.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let field: FieldPath = self.field.parse()?;
        let mut config = RunConfig::new(field, self.value.clone());
        config.manifest_name = self.manifest.clone();
        config.upsert = UpsertOptions {
            quoting: self.quote,
            coercion: self.on_coercion,
        };
        config.multiple_manifests = self.on_multiple_manifests;
        if let Some(work_dir) = &self.work_dir {
            config.work_root = work_dir.clone();
        }
        config.keep_workdirs = self.keep_workdirs;
        config.branch_prefix = self.branch_prefix.clone();
        config.identity = CommitIdentity {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        };
        config.timeouts = Timeouts {
            git: Duration::from_secs(self.git_timeout_secs),
            http: Duration::from_secs(self.http_timeout_secs),
        };
        config.dry_run = self.dry_run;
        config.validate()?;
        Ok(config)
    }
}

/// Execute the `run` command.
pub fn execute(args: RunArgs, output: &OutputConfig) -> Result<u8> {
    let config = args.run_config()?;
    let token = load_token(&args.token_env)?;
    let targets = read_targets(&args.targets, &args.host_prefix)?;

    let source_control =
        DefaultSourceControl::new(GitOptions::new(config.timeouts.git).with_secret(token.expose()));
    let hosting = GitHub::new(&args.api_url, token.clone(), config.timeouts.http)
        .context("Failed to create the API client")?;

    if config.dry_run {
        println!("Dry run: no commits, pushes or pull requests will be made.");
    }
    println!(
        "Setting {} to '{}' in {} repositories",
        config.field,
        config.value,
        targets.len()
    );

    let orchestrator = Orchestrator::new(&config, &source_control, &hosting).with_token(&token);
    let summary = orchestrator.run_batch(targets, |outcome| print_outcome(output, outcome))?;
    print_summary(&summary);
    Ok(summary.exit_code())
}

fn print_outcome(output: &OutputConfig, outcome: &RunOutcome) {
    match &outcome.outcome {
        Outcome::PullRequestOpened(url) => {
            println!("{} {}: opened {}", emoji(output, "✅", "[OK]"), outcome.target, url);
        }
        Outcome::DryRun(result) => {
            let manifest = outcome
                .manifest
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            println!(
                "{} {}: would have {} {} in {}",
                emoji(output, "📝", "[DRY-RUN]"),
                outcome.target,
                result.action,
                result.path,
                manifest
            );
            if let Some(diff) = &outcome.diff {
                print!("{}", colorize_diff(output, diff));
            }
        }
        Outcome::Skipped(reason) => {
            println!("{} {}: skipped, {}", emoji(output, "⏭️", "[SKIP]"), outcome.target, reason);
        }
        Outcome::Failed(e) => {
            println!("{} {}: {}", emoji(output, "❌", "[FAIL]"), outcome.target, e);
        }
    }
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!(
        "Summary: {} opened, {} dry-run, {} skipped, {} failed ({} total)",
        summary.opened,
        summary.dry_run,
        summary.skipped,
        summary.failed,
        summary.total()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run", "--targets", "repos.csv", "--field", "applications.stack", "--value", "cflinuxfs4"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = args.run_config().unwrap();
        assert_eq!(config.manifest_name, "manifest.yml");
        assert_eq!(config.upsert, UpsertOptions::default());
        assert_eq!(config.multiple_manifests, MultipleManifestPolicy::First);
        assert_eq!(args.token_env, "GITHUB_TOKEN");
        assert_eq!(args.host_prefix, "https://github.com/");
        assert!(!config.dry_run);
    }

    #[test]
    fn test_policies_and_timeouts() {
        let args = parse(&[
            "--quote",
            "always",
            "--on-coercion",
            "replace",
            "--on-multiple-manifests",
            "skip",
            "--git-timeout-secs",
            "60",
            "--dry-run",
        ]);
        let config = args.run_config().unwrap();
        assert_eq!(config.upsert.quoting, QuotingPolicy::Always);
        assert_eq!(config.upsert.coercion, CoercionPolicy::Replace);
        assert_eq!(config.multiple_manifests, MultipleManifestPolicy::Skip);
        assert_eq!(config.timeouts.git, Duration::from_secs(60));
        assert!(config.dry_run);
    }

    #[test]
    fn test_invalid_field_path_is_rejected() {
        let mut args = parse(&[]);
        args.field = "applications..stack".to_string();
        let err = args.run_config().unwrap_err();
        assert!(err.to_string().contains("empty segment"));
    }

    #[test]
    fn test_invalid_branch_prefix_is_rejected() {
        let args = parse(&["--branch-prefix", "has space"]);
        assert!(args.run_config().is_err());
    }
}
