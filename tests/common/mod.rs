//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures and manifest snippets to reduce
//! duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_manifest(manifests::APPLICATION);
//!     fixture.command().arg("edit").arg(fixture.manifest_path());
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::TestFixture;
}

/// Manifest snippets used across tests.
#[allow(dead_code)]
pub mod manifests {
    /// The smallest manifest with a nested mapping.
    pub const APPLICATION: &str = "application:\n  name: foo\n";

    /// A deployment manifest with comments, blank lines and mixed quoting.
    pub const COMMENTED: &str = r#"# Deployment manifest for the billing service
---
applications:
  # primary web process
  name: billing-web
  memory: 1G    # raised after the March incident
  instances: 2

  env:
    LOG_LEVEL: 'info'
    FEATURE_FLAGS: "a,b"
"#;

    /// A manifest whose `applications` key holds a sequence.
    pub const SEQUENCE: &str = "applications:\n- name: web\n  memory: 1G\n";

    /// An unquoted value starting with a reserved indicator.
    pub const RESERVED_INDICATOR: &str = "owner: @someuser\n";

    /// Not a well-formed document.
    pub const INVALID: &str = "applications:\n  name: [web\n";
}

/// Input sets used across tests.
#[allow(dead_code)]
pub mod input_sets {
    pub const VALID: &str = "repo_url,branch\n\
        https://github.com/acme/billing.git,main\n\
        https://github.com/acme/ledger.git,release/2.x\n";

    pub const WITH_INVALID_ROW: &str = "repo_url,branch\n\
        https://github.com/acme/billing.git,main\n\
        https://gitlab.com/acme/ledger.git,main\n\
        https://github.com/acme/payments,main\n";
}

/// A temporary directory populated with a manifest and/or an input set.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add `manifest.yml` with the given content.
    #[allow(dead_code)]
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("manifest.yml", content)
    }

    /// Add `targets.csv` with the given content.
    #[allow(dead_code)]
    pub fn with_targets(self, content: &str) -> Self {
        self.with_file("targets.csv", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[allow(dead_code)]
    pub fn manifest_path(&self) -> PathBuf {
        self.path().join("manifest.yml")
    }

    #[allow(dead_code)]
    pub fn targets_path(&self) -> PathBuf {
        self.path().join("targets.csv")
    }

    /// Current content of a file in the fixture.
    #[allow(dead_code)]
    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path)).expect("Failed to read file")
    }

    /// Create a command running in this fixture's directory, with colors off.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("manifest-sweep");
        cmd.current_dir(self.path()).arg("--color").arg("never");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_manifest() {
        let fixture = TestFixture::new().with_manifest(manifests::APPLICATION);
        assert!(fixture.manifest_path().exists());
        assert_eq!(fixture.read("manifest.yml"), manifests::APPLICATION);
    }

    #[test]
    fn test_well_formed_manifests_parse() {
        for manifest in [
            manifests::APPLICATION,
            manifests::COMMENTED,
            manifests::SEQUENCE,
        ] {
            serde_yaml::from_str::<serde_yaml::Value>(manifest).expect("fixture should be valid YAML");
        }
    }
}
