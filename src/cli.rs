// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rundag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rundag",
    version,
    about = "Run a DAG of operators once, in dependency order, on a bounded worker pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Rundag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Rundag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG in execution order, but don't run it.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop dispatching new nodes after the first failure.
    ///
    /// Overrides `[config].stop_at_failure` when set.
    #[arg(long)]
    pub stop_at_failure: bool,

    /// Maximum number of operators running at once.
    ///
    /// Overrides `[config].max_parallelism`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_parallelism: Option<u32>,
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
    fn defaults() {
        let args = CliArgs::try_parse_from(["rundag"]).unwrap();
        assert_eq!(args.config, "Rundag.toml");
        assert!(!args.dry_run);
        assert!(!args.stop_at_failure);
        assert!(args.max_parallelism.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let args = CliArgs::try_parse_from([
            "rundag",
            "--config",
            "dags/build.toml",
            "--stop-at-failure",
            "--max-parallelism",
            "3",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, "dags/build.toml");
        assert!(args.stop_at_failure);
        assert_eq!(args.max_parallelism, Some(3));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        assert!(CliArgs::try_parse_from(["rundag", "--max-parallelism", "0"]).is_err());
    }
}
