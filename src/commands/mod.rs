//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `manifest-sweep` command-line tool. Each subcommand is defined in its own
//! file to keep the logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args`, performs the command's
//!   logic by calling into the `manifest_sweep` library, and returns the
//!   process exit code.

pub mod completions;
pub mod edit;
pub mod run;
pub mod targets;
