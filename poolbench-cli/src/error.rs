// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use poolbench_core::BenchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Bench(#[from] BenchError),

    #[error("Benchmark task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Process exit status. A failed command passes its own code through.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Bench(BenchError::CommandFailed { code, .. }) => (*code).clamp(1, 255) as u8,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_passthrough() {
        let failed = CliError::Bench(BenchError::CommandFailed {
            command: "pgbench".to_string(),
            code: 2,
            stdout: String::new(),
            stderr: String::new(),
        });
        assert_eq!(failed.exit_code(), 2);

        let killed = CliError::Bench(BenchError::CommandFailed {
            command: "pgbench".to_string(),
            code: 143,
            stdout: String::new(),
            stderr: String::new(),
        });
        assert_eq!(killed.exit_code(), 143);

        let other = CliError::Bench(BenchError::UnknownBackend {
            name: "pgpool".to_string(),
            known: String::new(),
        });
        assert_eq!(other.exit_code(), 1);
    }
}
