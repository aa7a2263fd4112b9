//! The CLI's argument surface: a `clap`-derived `Cli` with
//! `compile`/`run` subcommands, environment-variable-backed flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface for the laboratory protocol execution host.
#[derive(Debug, Parser)]
#[command(name = "labflow")]
#[command(about = "Laboratory protocol compiler and execution host")]
#[command(version)]
pub struct Cli {
    /// Directory holding `conf.json`, logs, and run output.
    #[arg(long, env = "LABFLOW_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Disable the daily-rotating file log, console output only.
    #[arg(long, env = "LABFLOW_NO_FILE_LOGGING", global = true)]
    pub no_file_logging: bool,

    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse and type-check a protocol document, printing the compilation
    /// result as JSON. Exits `0` if valid, `1` otherwise.
    Compile {
        /// Path to the protocol document.
        path: PathBuf,
    },
    /// Compile a protocol document and drive its program tree to
    /// completion, forwarding every event to stdout (and, if `--serve` is
    /// given, to websocket clients).
    Run {
        /// Path to the protocol document.
        path: PathBuf,

        /// Bind a bridge server to this address, forwarding events to
        /// connected websocket clients in addition to stdout.
        #[arg(long, env = "LABFLOW_SERVE")]
        serve: Option<std::net::SocketAddr>,
    },
}
