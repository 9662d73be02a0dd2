//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use manifest_sweep::output::OutputConfig;

use crate::commands;

/// Manifest Sweep - Set a manifest field across many repositories
#[derive(Parser, Debug)]
#[command(name = "manifest-sweep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(
        long,
        global = true,
        value_name = "WHEN",
        default_value = "auto",
        value_parser = ["auto", "always", "never"]
    )]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a field in the manifest of every repository and open pull requests
    Run(commands::run::RunArgs),

    /// Set a field in a single local manifest file
    Edit(commands::edit::EditArgs),

    /// Validate an input set without touching any repository
    Targets(commands::targets::TargetsArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command and return the process exit code
    pub fn execute(self) -> Result<u8> {
        init_logging(&self.log_level);

        let output = OutputConfig::from_env_and_flag(&self.color);
        console::set_colors_enabled(output.use_color);

        match self.command {
            Commands::Run(args) => commands::run::execute(args, &output),
            Commands::Edit(args) => commands::edit::execute(args, &output),
            Commands::Targets(args) => commands::targets::execute(args, &output),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialisation (tests driving the CLI in-process) is harmless.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
