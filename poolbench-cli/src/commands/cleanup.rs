// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `poolbench cleanup` command - Remove residual latency rules.

use std::path::Path;

use poolbench_core::lock::HostLock;
use poolbench_core::{BenchError, LatencyScope, ShellExecutor};

use crate::error::CliError;

pub async fn execute(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;

    let removed = tokio::task::spawn_blocking(move || {
        // Refuse while a benchmark on this host holds its rules.
        let _lock = HostLock::try_acquire(&config.shaping.lock_path).map_err(BenchError::from)?;
        let executor = ShellExecutor::new();
        LatencyScope::new(&executor, &config.shaping).clear_residual()
    })
    .await??;

    if removed {
        println!("✓ Removed residual latency rules");
    } else {
        println!("✓ No residual latency rules found");
    }
    Ok(())
}
