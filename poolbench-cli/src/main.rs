// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! poolbench CLI
//!
//! Command-line interface for benchmarking Postgres connection poolers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use poolbench_core::{Backend, BenchmarkConfig, Protocol, WorkloadShape};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

/// poolbench - Postgres connection pooler benchmark orchestrator
#[derive(Parser)]
#[command(name = "poolbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (poolbench.yaml is used when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the load tool against a running pooler
    Bench(BenchArgs),

    /// Start a pooler, or the database with `postgres`, in the foreground
    Run {
        /// Pooler name or `postgres`
        target: String,

        /// Which pre-generated configuration file to use
        #[arg(default_value_t = 1)]
        index: u32,
    },

    /// Remove latency rules left behind by an interrupted run
    Cleanup,

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub struct BenchArgs {
    /// Pooler to benchmark
    #[arg(value_parser = clap::builder::PossibleValuesParser::new(Backend::names()))]
    pub backend: String,

    /// Number of concurrent clients
    #[arg(short = 'c', long, default_value_t = BenchmarkConfig::DEFAULT_CLIENTS)]
    pub client: u32,

    /// Number of load-tool worker threads
    #[arg(short = 'j', long, default_value_t = BenchmarkConfig::DEFAULT_JOBS)]
    pub jobs: u32,

    /// Duration in seconds
    #[arg(short = 'T', long, default_value_t = BenchmarkConfig::DEFAULT_DURATION_SECS)]
    pub time: u32,

    /// Query protocol: prepared, extended or simple
    #[arg(long, default_value_t = Protocol::Prepared)]
    pub protocol: Protocol,

    /// Delay traffic to the database
    #[arg(long)]
    pub postgres_latency: bool,

    /// Delay traffic to the pooler
    #[arg(long)]
    pub pooler_latency: bool,

    /// Injected delay in milliseconds
    #[arg(long, default_value_t = 1)]
    pub latency: u32,

    /// Workload: pipeline, large, select-only or tcpb
    #[arg(long, default_value_t = WorkloadShape::Pipeline)]
    pub bench: WorkloadShape,

    /// Payload size in bytes for the large workload
    #[arg(long, default_value_t = BenchmarkConfig::DEFAULT_LARGE_SIZE)]
    pub large_size: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Bench(args) => commands::bench::execute(cli.config.as_deref(), args).await,
        Commands::Run { target, index } => {
            commands::run::execute(cli.config.as_deref(), target, index).await
        }
        Commands::Cleanup => commands::cleanup::execute(cli.config.as_deref()).await,
        Commands::Validate { file } => {
            commands::validate::execute(file.as_deref().or(cli.config.as_deref())).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
