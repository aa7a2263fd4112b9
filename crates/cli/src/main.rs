// Copyright (C) 2024 Aline Forsythe and Dmitri Kowalski
// SPDX-License-Identifier: AGPL-3.0
//! labflow - Laboratory protocol compiler and execution host.
//!
//! `compile <path>` parses and type-checks a protocol document, printing
//! its compilation result. `run <path>` compiles then drives the
//! compiled program tree to completion.

use clap::Parser;
use eyre::Result;
use std::process::ExitCode;

mod cli;
mod cmd;
mod sink;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    labflow_common::logging::init_logging("labflow", !cli.no_file_logging)?;

    match cli.command {
        Commands::Compile { path } => {
            let valid = cmd::compile::compile(&path)?;
            Ok(if valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Commands::Run { path, serve } => match cmd::run::run(&path, serve).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(err) => {
                tracing::error!("run failed: {err:?}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
