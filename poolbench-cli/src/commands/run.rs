// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `poolbench run` command - Start a pooler or the database.

use std::path::Path;

use poolbench_core::{database, Backend, CommandSpec, Executor, Pooler, ShellExecutor};

use crate::error::CliError;

/// Target name that starts the database instead of a pooler.
const DATABASE_TARGET: &str = "postgres";

pub async fn execute(config_path: Option<&Path>, target: String, index: u32) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;

    let commands = if target == DATABASE_TARGET {
        tracing::info!("Starting database");
        database::start_commands(&config)
    } else {
        let backend = Backend::resolve(&target)?;
        tracing::info!(backend = backend.name(), port = %backend.listen_port(), index, "Starting pooler");
        vec![backend.start(index, &config)]
    };

    tokio::task::spawn_blocking(move || run_all(&ShellExecutor::new(), &commands)).await??;
    Ok(())
}

/// Run `commands` in order, stopping at the first failure.
fn run_all<E: Executor>(executor: &E, commands: &[CommandSpec]) -> Result<(), CliError> {
    for command in commands {
        executor.execute(command)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolbench_core::{BenchError, BenchResult, Config};
    use poolbench_core::shell::CommandOutput;
    use std::cell::RefCell;

    struct FailAt {
        index: usize,
        seen: RefCell<Vec<String>>,
    }

    impl Executor for FailAt {
        fn execute(&self, spec: &CommandSpec) -> BenchResult<CommandOutput> {
            let mut seen = self.seen.borrow_mut();
            seen.push(spec.to_string());
            if seen.len() - 1 == self.index {
                return Err(BenchError::CommandFailed {
                    command: spec.to_string(),
                    code: 1,
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
            Ok(CommandOutput { code: 0, stdout: String::new(), stderr: String::new() })
        }
    }

    #[test]
    fn test_database_start_stops_at_first_failure() {
        let executor = FailAt { index: 1, seen: RefCell::new(Vec::new()) };
        let commands = database::start_commands(&Config::default());

        let result = run_all(&executor, &commands);

        assert!(matches!(result, Err(CliError::Bench(BenchError::CommandFailed { .. }))));
        assert_eq!(executor.seen.borrow().len(), 2);
    }
}
