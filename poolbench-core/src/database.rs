// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Local Postgres cluster the poolers forward to.

use crate::config::Config;
use crate::shell::CommandSpec;

/// Cluster directory created by `citus_dev`.
const CLUSTER_NAME: &str = "test";

/// Connection ceiling, high enough for every pooler's server-side pool.
const MAX_CONNECTIONS: u32 = 1000;

/// Ordered commands that (re)create the database, raise its connection
/// limit and initialize the load tool's tables.
pub fn start_commands(config: &Config) -> Vec<CommandSpec> {
    let db = &config.database;
    vec![
        CommandSpec::shell(format!(
            "tools/citus_dev/citus_dev make {} --destroy --size 0 --no-lib --no-extension --init-with setup.sql",
            CLUSTER_NAME
        )),
        CommandSpec::shell(format!(
            "echo max_connections={} >> {}/coordinator/postgresql.conf",
            MAX_CONNECTIONS, CLUSTER_NAME
        )),
        CommandSpec::shell(format!("tools/citus_dev/citus_dev restart {}", CLUSTER_NAME)),
        CommandSpec::argv([
            config.load_tool.program.clone(),
            "-i".to_string(),
            "--host".to_string(),
            db.host.clone(),
            "--port".to_string(),
            db.port.to_string(),
            format!("--username={}", db.user),
        ])
        .env("PGPASSWORD", db.password.clone()),
    ]
}
