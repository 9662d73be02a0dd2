//! # Targets Command Implementation
//!
//! This module implements the `targets` subcommand, which validates an input
//! set offline. Every row is checked against the same rules the `run`
//! command applies, and a verdict is printed for each one. The command exits
//! with code 1 when any row is invalid, so it can gate a batch in scripts.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use manifest_sweep::error::Error;
use manifest_sweep::exit_codes;
use manifest_sweep::output::{emoji, OutputConfig};
use manifest_sweep::targets::{read_targets, DEFAULT_HOST_PREFIX};

/// Validate an input set without touching any repository
#[derive(Args, Debug)]
pub struct TargetsArgs {
    /// CSV input set with `repo_url` and `branch` columns.
    #[arg(short, long, value_name = "FILE")]
    pub targets: PathBuf,

    /// Repository URLs must start with this prefix.
    #[arg(long, value_name = "URL", default_value = DEFAULT_HOST_PREFIX)]
    pub host_prefix: String,
}

/// Execute the `targets` command.
pub fn execute(args: TargetsArgs, output: &OutputConfig) -> Result<u8> {
    let rows = read_targets(&args.targets, &args.host_prefix)?;

    let mut invalid = 0;
    for (index, row) in rows.iter().enumerate() {
        match row {
            Ok(target) => println!(
                "{} row {}: {} ({})",
                emoji(output, "✅", "[OK]"),
                index + 1,
                target.full_name,
                target.branch
            ),
            Err(Error::TargetValidation { row, url, reason }) => {
                invalid += 1;
                println!(
                    "{} row {}: {}: {}",
                    emoji(output, "❌", "[INVALID]"),
                    row,
                    url,
                    reason
                );
            }
            Err(e) => {
                invalid += 1;
                println!("{} row {}: {}", emoji(output, "❌", "[INVALID]"), index + 1, e);
            }
        }
    }

    println!();
    println!("{} valid, {} invalid", rows.len() - invalid, invalid);
    Ok(if invalid > 0 {
        exit_codes::ERROR
    } else {
        exit_codes::SUCCESS
    })
}
