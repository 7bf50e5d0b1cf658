// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `jobhost`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobhost",
    version,
    about = "Run functions triggered by queues, blob writes and timers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Fire every timer function once, wait until all work is done, then exit.
    #[arg(long)]
    pub once: bool,

    /// Invoke this function at startup (repeatable).
    #[arg(long, value_name = "NAME")]
    pub invoke: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBHOST_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print functions and triggers, but run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_is_repeatable_and_config_has_a_default() {
        let args = CliArgs::parse_from(["jobhost", "--invoke", "a", "--invoke", "b", "--once"]);
        assert_eq!(args.config, DEFAULT_CONFIG_FILE);
        assert_eq!(args.invoke, vec!["a", "b"]);
        assert!(args.once);
        assert!(!args.dry_run);
    }
}
