//! # Input Set
//!
//! Reads the CSV list of repositories a batch run works through. Each row
//! names a clone URL and the base branch the pull request targets:
//!
//! ```csv
//! repo_url,branch
//! https://github.com/acme/billing.git,main
//! ```
//!
//! Rows are validated one at a time. A malformed row never aborts the run;
//! it is returned as an `Error::TargetValidation` in its slot so the caller
//! can report it and move on.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

/// Host prefix accepted when none is configured.
pub const DEFAULT_HOST_PREFIX: &str = "https://github.com/";

const REQUIRED_COLUMNS: [&str; 2] = ["repo_url", "branch"];

/// A validated repository to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    /// Clone URL exactly as given in the input set.
    pub url: String,
    /// Base branch.
    pub branch: String,
    /// `owner/name`.
    pub full_name: String,
}

impl RepositoryTarget {
    /// Validate a URL/branch pair against `host_prefix`.
    ///
    /// Returns the reason on failure; callers attach the row number.
    pub fn parse(url: &str, branch: &str, host_prefix: &str) -> std::result::Result<Self, String> {
        let url = url.trim();
        let branch = branch.trim();
        let prefix = normalize_prefix(host_prefix);

        if url.is_empty() {
            return Err("repository URL is empty".to_string());
        }
        let Some(rest) = url.strip_prefix(prefix.as_str()) else {
            return Err(format!("must start with {}", prefix));
        };
        let Some(full_name) = rest.strip_suffix(".git") else {
            return Err("must end with .git".to_string());
        };

        let parts: Vec<&str> = full_name.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|part| !is_valid_name(part)) {
            return Err(format!("expected <owner>/<name>.git, found '{}'", rest));
        }
        Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;

        if branch.is_empty() {
            return Err("branch is empty".to_string());
        }

        Ok(Self {
            url: url.to_string(),
            branch: branch.to_string(),
            full_name: full_name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        self.full_name.split('/').next().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.full_name.rsplit('/').next().unwrap_or_default()
    }

    /// Directory name of the working copy: `owner_name`.
    pub fn work_dir_name(&self) -> String {
        self.full_name.replace('/', "_")
    }

    /// Clone URL carrying `token` as HTTP basic credentials.
    pub fn authenticated_url(&self, token: &str) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::configuration(format!("invalid URL '{}': {}", self.url, e)))?;
        url.set_username("x-access-token")
            .and_then(|_| url.set_password(Some(token)))
            .map_err(|_| Error::configuration(format!("cannot embed credentials in '{}'", self.url)))?;
        Ok(url.to_string())
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim();
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

fn is_valid_name(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Deserialize)]
struct Row {
    repo_url: String,
    branch: String,
}

/// Read and validate the input set at `path`.
pub fn read_targets(path: &Path, host_prefix: &str) -> Result<Vec<Result<RepositoryTarget>>> {
    let file = File::open(path).map_err(|e| {
        Error::configuration(format!("cannot open input set {}: {}", path.display(), e))
    })?;
    parse_targets(file, host_prefix)
}

/// Parse an input set from any reader.
///
/// Fails as a whole only when the header is unusable; every data row gets
/// its own `Ok` or `Err(Error::TargetValidation)`. Rows are numbered from 1,
/// not counting the header.
pub fn parse_targets<R: Read>(reader: R, host_prefix: &str) -> Result<Vec<Result<RepositoryTarget>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(Error::configuration(format!(
                "input set is missing the '{}' column",
                column
            )));
        }
    }

    let mut targets = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        let row = index + 1;
        let target = match record {
            Ok(Row { repo_url, branch }) => RepositoryTarget::parse(&repo_url, &branch, host_prefix)
                .map_err(|reason| Error::TargetValidation {
                    row,
                    url: repo_url,
                    reason,
                }),
            Err(e) => Err(Error::TargetValidation {
                row,
                url: String::new(),
                reason: e.to_string(),
            }),
        };
        targets.push(target);
    }
    Ok(targets)
}
