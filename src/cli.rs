// src/cli.rs

//! Command-line surface for `jobdag`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::KwargStrictness;

#[derive(Parser, Debug)]
#[command(
    name = "jobdag",
    about = "Compile declarative job definitions into DAG artifacts and run them on a schedule"
)]
pub struct Cli {
    /// Log level (overrides the JOBDAG_LOG environment variable).
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse and compile job definitions without producing artifacts.
    Validate {
        /// Directory containing job definition TOML files.
        #[arg(long)]
        jobs: PathBuf,

        /// Root directory for SQL files referenced by job kwargs.
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,

        /// Forward unknown kwargs instead of rejecting them.
        #[arg(long)]
        passthrough_kwargs: bool,
    },

    /// Compile job definitions into engine artifacts in an output directory.
    Generate {
        /// Directory containing job definition TOML files.
        #[arg(long)]
        jobs: PathBuf,

        /// Output directory for compiled artifacts (one JSON file per job).
        #[arg(long)]
        out: PathBuf,

        /// Root directory for SQL files referenced by job kwargs.
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,

        /// Forward unknown kwargs instead of rejecting them.
        #[arg(long)]
        passthrough_kwargs: bool,
    },

    /// Compile job definitions and execute them against their schedules.
    Run {
        /// Directory containing job definition TOML files.
        #[arg(long)]
        jobs: PathBuf,

        /// Directory containing secret records (one `<key>.toml` per key).
        #[arg(long)]
        secrets: PathBuf,

        /// Root directory for SQL files referenced by job kwargs.
        #[arg(long, default_value = "sql")]
        sql_root: PathBuf,

        /// Trigger one immediate run per job, then exit when idle.
        #[arg(long)]
        once: bool,

        /// Maximum attempts per retry-safe task (including the first).
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Base backoff delay between retries, in seconds.
        #[arg(long, default_value_t = 1)]
        backoff_secs: u64,

        /// Upper bound on historical ticks emitted per job at startup.
        #[arg(long, default_value_t = 100)]
        max_backfill: usize,

        /// Forward unknown kwargs instead of rejecting them.
        #[arg(long)]
        passthrough_kwargs: bool,
    },
}

impl Command {
    pub fn strictness(&self) -> KwargStrictness {
        let passthrough = match self {
            Command::Validate {
                passthrough_kwargs, ..
            }
            | Command::Generate {
                passthrough_kwargs, ..
            }
            | Command::Run {
                passthrough_kwargs, ..
            } => *passthrough_kwargs,
        };
        if passthrough {
            KwargStrictness::Passthrough
        } else {
            KwargStrictness::Reject
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
