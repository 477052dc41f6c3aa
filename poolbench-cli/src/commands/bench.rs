// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `poolbench bench` command - Run the load tool against one pooler.

use std::path::Path;

use nix::sys::signal::Signal;
use poolbench_core::{
    BenchError, BenchmarkConfig, BenchmarkRun, InterruptHandle, LatencySettings, RunResult,
    ShellExecutor,
};
use tokio::signal::unix::{signal, SignalKind};

use crate::error::CliError;
use crate::BenchArgs;

pub async fn execute(config_path: Option<&Path>, args: BenchArgs) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;

    let workload = BenchmarkConfig::new(
        args.client,
        args.jobs,
        args.time,
        args.protocol,
        args.bench,
        args.large_size,
    )
    .map_err(BenchError::from)?;

    let latency = LatencySettings {
        delay_ms: args.latency,
        delay_database: args.postgres_latency,
        delay_backend: args.pooler_latency,
    };

    // Handlers go in before anything touches the host, so a signal during
    // setup cannot kill the process with rules installed.
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| CliError::Signal {
        signal: "SIGINT",
        source: e,
    })?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| CliError::Signal {
        signal: "SIGTERM",
        source: e,
    })?;

    let interrupt = InterruptHandle::new();
    let executor = ShellExecutor::with_interrupt(interrupt.clone());
    let backend = args.backend;
    let mut task = tokio::task::spawn_blocking(move || {
        BenchmarkRun::new(&executor, &config).execute(&backend, &workload, &latency)
    });

    // The blocking task owns the latency scope; it must be allowed to
    // finish so the rules are removed before the process exits.
    let result = loop {
        tokio::select! {
            joined = &mut task => break joined?,
            _ = sigint.recv() => stop_load_tool(&interrupt, Signal::SIGINT),
            _ = sigterm.recv() => stop_load_tool(&interrupt, Signal::SIGTERM),
        }
    };

    report(&result?);
    Ok(())
}

/// Pass `sig` to the load tool only. Latency teardown keeps running.
fn stop_load_tool(interrupt: &InterruptHandle, sig: Signal) {
    if interrupt.cancel(sig) {
        tracing::warn!(signal = %sig, "Stopping the load tool, latency rules will be removed");
    } else {
        tracing::warn!(
            signal = %sig,
            "Load tool not running, finishing setup or teardown before exit"
        );
    }
}

fn report(result: &RunResult) {
    println!();
    println!("✓ Benchmark against {} finished", result.backend);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_before_load_tool_cancels_run() {
        let interrupt = InterruptHandle::new();
        stop_load_tool(&interrupt, Signal::SIGTERM);
        assert!(interrupt.is_cancelled());
        assert!(!interrupt.is_running());
    }
}
