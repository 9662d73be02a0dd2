//! # Edit Command Implementation
//!
//! This module implements the `edit` subcommand, which applies the manifest
//! engine to one local file. No git, no network: it is the quickest way to
//! preview what a batch run would do to a given manifest.
//!
//! With `--diff` the file is left untouched and a unified diff of the edit is
//! printed instead.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use manifest_sweep::exit_codes;
use manifest_sweep::manifest::{self, CoercionPolicy, FieldPath, QuotingPolicy, UpsertOptions};
use manifest_sweep::output::{colorize_diff, emoji, unified_diff, OutputConfig};

/// Set a field in a single local manifest file
#[derive(Args, Debug)]
pub struct EditArgs {
    /// Manifest file to edit.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Dotted path of the field to set, e.g. `applications.stack`.
    #[arg(short, long, value_name = "PATH")]
    pub field: String,

    /// Value to write at the field path.
    #[arg(short, long, value_name = "VALUE", allow_hyphen_values = true)]
    pub value: String,

    /// When to quote the written value (never, if-needed, always).
    #[arg(long, value_name = "POLICY", default_value_t = QuotingPolicy::IfNeeded)]
    pub quote: QuotingPolicy,

    /// What to do when the path runs through a non-mapping value (reject, replace).
    #[arg(long, value_name = "POLICY", default_value_t = CoercionPolicy::Reject)]
    pub on_coercion: CoercionPolicy,

    /// Print a unified diff instead of writing the file.
    #[arg(long)]
    pub diff: bool,
}

/// Execute the `edit` command.
pub fn execute(args: EditArgs, output: &OutputConfig) -> Result<u8> {
    let field: FieldPath = args.field.parse()?;
    let options = UpsertOptions {
        quoting: args.quote,
        coercion: args.on_coercion,
    };

    let original = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let (updated, result) = manifest::edit(&original, &field, &args.value, options)
        .with_context(|| format!("Failed to edit {}", args.file.display()))?;

    for coercion in &result.coercions {
        println!(
            "{} replaced {} at '{}'",
            emoji(output, "⚠️", "[WARN]"),
            coercion.found,
            coercion.path
        );
    }

    if !result.changed || updated == original {
        println!("{} already set to '{}'", result.path, result.value);
        return Ok(exit_codes::SUCCESS);
    }

    if args.diff {
        print!(
            "{}",
            colorize_diff(output, &unified_diff(&args.file, &original, &updated))
        );
        return Ok(exit_codes::SUCCESS);
    }

    fs::write(&args.file, &updated)
        .with_context(|| format!("Failed to write {}", args.file.display()))?;
    println!(
        "{} {} {} in {}",
        emoji(output, "✅", "[OK]"),
        capitalize(&result.action.to_string()),
        result.path,
        args.file.display()
    );
    Ok(exit_codes::SUCCESS)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
