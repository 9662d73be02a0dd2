//! # Error Handling
//!
//! This module defines the centralized error type for `manifest-sweep`. It uses
//! `thiserror` to build a single `Error` enum that covers every failure mode of
//! a batch run, from pre-flight configuration problems down to a single
//! malformed manifest line.
//!
//! ## Error Classes
//!
//! The variants fall into three groups that the orchestrator treats
//! differently:
//!
//! - **Fatal**: `Configuration` and `InvalidPath`. These abort the run before
//!   (or instead of) touching any further repository.
//! - **Per-row**: `TargetValidation`. The row is skipped and the batch goes on.
//! - **Per-repository**: `ManifestNotFound`, `Parse`, `Transport`,
//!   `CoercionRejected` and `UneditableValue`. They are recorded as the
//!   outcome of one repository.
//!
//! Wrapped library errors (`Io`, `Yaml`, `Csv`, `Http`) are classified by the
//! context they surface in.

use thiserror::Error;

/// Main error type for manifest-sweep operations
#[derive(Error, Debug)]
pub enum Error {
    /// A pre-flight configuration problem: missing credential, missing input
    /// file, or an option value that cannot be used.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A row of the input set does not describe a usable repository.
    #[error("Invalid target on row {row} ({url}): {reason}")]
    TargetValidation {
        row: usize,
        url: String,
        reason: String,
    },

    /// No file matching the configured manifest name exists in the working copy.
    #[error("Manifest '{filename}' not found")]
    ManifestNotFound { filename: String },

    /// The manifest text is not a well-formed document.
    ///
    /// Carries the 1-based line number and the text of that line when the
    /// parser reported a location.
    #[error("Manifest parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        line: Option<usize>,
        snippet: Option<String>,
        message: String,
    },

    /// A clone, push or hosting API call failed.
    #[error("{operation} failed for {target}: {message}")]
    Transport {
        operation: String,
        target: String,
        message: String,
    },

    /// Writing the field path would discard existing non-mapping data and the
    /// coercion policy forbids it.
    #[error("Refusing to replace {found} at '{path}' (use --on-coercion replace to allow)")]
    CoercionRejected { path: String, found: String },

    /// The path runs through a mapping the engine can read but not rewrite,
    /// such as a flow mapping with nested collections. No coercion policy
    /// applies because the value is a mapping.
    #[error("Cannot edit {found} at '{path}': rewrite it in block style first")]
    UneditableValue { path: String, found: String },

    /// The field path is empty or malformed.
    #[error("Invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A CSV reading error, wrapped from `csv::Error`.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An HTTP client error, wrapped from `reqwest::Error`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error must stop the whole batch rather than a single
    /// repository.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration { .. } | Error::InvalidPath { .. })
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn transport(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Transport {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
