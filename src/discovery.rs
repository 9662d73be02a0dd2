//! Manifest discovery inside a working copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Manifest file name searched for when none is configured.
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.yml";

/// What to do when more than one file matches the manifest name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipleManifestPolicy {
    /// Use the shallowest match (ties broken by path) and warn about the rest.
    #[default]
    First,
    /// Skip the repository.
    Skip,
}

impl FromStr for MultipleManifestPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(MultipleManifestPolicy::First),
            "skip" => Ok(MultipleManifestPolicy::Skip),
            _ => Err(format!(
                "Unknown multiple-manifest policy '{}'. Use: first or skip",
                s
            )),
        }
    }
}

impl fmt::Display for MultipleManifestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MultipleManifestPolicy::First => "first",
            MultipleManifestPolicy::Skip => "skip",
        })
    }
}

/// Result of looking for a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Found(PathBuf),
    NotFound,
    /// Several matches and the policy says skip. Paths are relative to the
    /// working copy.
    Ambiguous(Vec<PathBuf>),
}

/// All files under `root` whose name matches `filename` case-insensitively,
/// ordered by depth and then path. `.git` is never entered.
pub fn find_manifests(root: &Path, filename: &str) -> Result<Vec<PathBuf>> {
    let wanted = filename.to_lowercase();
    let mut matches = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().to_lowercase() == wanted {
            matches.push((entry.depth(), entry.into_path()));
        }
    }

    matches.sort();
    Ok(matches.into_iter().map(|(_, path)| path).collect())
}

/// Pick the manifest to edit according to `policy`.
pub fn locate_manifest(
    root: &Path,
    filename: &str,
    policy: MultipleManifestPolicy,
) -> Result<Discovery> {
    let mut found = find_manifests(root, filename)?;
    debug!("found {} match(es) for '{}' under {}", found.len(), filename, root.display());

    if found.len() <= 1 {
        return Ok(found.pop().map_or(Discovery::NotFound, Discovery::Found));
    }

    let relative: Vec<PathBuf> = found
        .iter()
        .map(|path| path.strip_prefix(root).unwrap_or(path).to_path_buf())
        .collect();
    match policy {
        MultipleManifestPolicy::First => {
            let ignored: Vec<String> = relative[1..]
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            warn!(
                "Multiple '{}' files found; using {} and ignoring {}",
                filename,
                relative[0].display(),
                ignored.join(", ")
            );
            Ok(Discovery::Found(found.swap_remove(0)))
        }
        MultipleManifestPolicy::Skip => Ok(Discovery::Ambiguous(relative)),
    }
}
