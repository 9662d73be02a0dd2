//! # Manifest Sweep Library
//!
//! Sets one field in the deployment manifest of many repositories and opens a
//! pull request for each change. The `manifest-sweep` binary is a thin layer
//! over this crate; everything it does can be driven from library code.
//!
//! ## Quick Example
//!
//! ```
//! use manifest_sweep::manifest::{self, FieldPath, QuotingPolicy, UpsertOptions};
//!
//! let text = "application:\n  name: foo\n";
//! let path: FieldPath = "application.stack".parse().unwrap();
//! let options = UpsertOptions {
//!     quoting: QuotingPolicy::Always,
//!     ..UpsertOptions::default()
//! };
//!
//! let (updated, result) = manifest::edit(text, &path, "python", options).unwrap();
//! assert_eq!(updated, "application:\n  name: foo\n  stack: \"python\"\n");
//! assert!(result.changed);
//! ```
//!
//! ## Core Concepts
//!
//! - **Manifest engine (`manifest`)**: a lossless YAML tree. Loading keeps
//!   comments, blank lines, key order and scalar styles; the upsert rewrites
//!   only the lines on the mutated path.
//! - **Input set (`targets`)**: the CSV of repository URLs and base branches.
//! - **Discovery (`discovery`)**: finds the manifest inside a working copy.
//! - **Collaborators (`repository`, `git`, `hosting`)**: traits for source
//!   control and the hosting platform, with `git`-subprocess and GitHub REST
//!   implementations.
//! - **Orchestration (`orchestrator`)**: the per-repository workflow and the
//!   batch summary.
//!
//! ## Execution Flow
//!
//! For each repository of the input set:
//!
//! 1.  **Clone** the base branch into a temporary working copy.
//! 2.  **Branch** off with a timestamped, collision-resistant name.
//! 3.  **Locate** the manifest.
//! 4.  **Edit** it in place (or print a diff in dry-run mode).
//! 5.  **Commit and push** the branch.
//! 6.  **Open** a pull request against the base branch.
//!
//! A failure in one repository is recorded and the batch moves on.

pub mod config;
pub mod discovery;
pub mod error;
pub mod exit_codes;
pub mod git;
pub mod hosting;
pub mod manifest;
pub mod orchestrator;
pub mod output;
pub mod repository;
pub mod targets;
