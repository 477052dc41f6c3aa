// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `poolbench validate` command - Validate configuration file.

use std::path::Path;

use poolbench_core::{Backend, ConfigLoader, Pooler};

use crate::error::CliError;

pub async fn execute(file: Option<&Path>) -> Result<(), CliError> {
    let source = file.map_or_else(|| "defaults".to_string(), |f| f.display().to_string());
    tracing::info!(file = %source, "Validating configuration");

    let config = ConfigLoader::load_or_default(file)?;

    println!("✓ Configuration is valid");
    println!();
    println!("Database:");
    println!(
        "  Address:        {}:{} ({} as {})",
        config.database.host, config.database.port, config.database.name, config.database.user
    );
    println!();
    println!("Load Tool:");
    println!("  Program:        {}", config.load_tool.program);
    println!("  Progress:       every {}s", config.load_tool.progress_secs);
    println!();
    println!("Latency Shaping:");
    println!("  Interface:      {}", config.shaping.interface);
    println!("  Lock File:      {}", config.shaping.lock_path.display());
    println!();
    println!("Control Plane:");
    println!("  URL:            {}", config.control_plane.url);
    println!("  Tenant:         {}", config.control_plane.tenant);
    println!(
        "  API Token:      {}",
        if config.control_plane.api_token.is_empty() { "(not set)" } else { "(set)" }
    );
    println!();
    println!("Backends ({}):", Backend::ALL.len());
    for backend in &Backend::ALL {
        println!(
            "  - {} (port: {}, user: {})",
            backend.name(),
            backend.listen_port(),
            backend.username(&config)
        );
    }
    Ok(())
}
