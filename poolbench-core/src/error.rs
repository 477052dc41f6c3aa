// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for poolbench.
//!
//! Explicit enum error types only. No `Box<dyn Error>`, no `anyhow::Result`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for a benchmark invocation.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    #[error("Unknown backend '{name}' (expected one of: {known})")]
    UnknownBackend { name: String, known: String },

    // =========================================================================
    // External Process Errors - Reported, Never Retried
    // =========================================================================
    #[error("Command failed with exit code {code}: {command}{}", format_captured(.stdout, .stderr))]
    CommandFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled before start: {command}")]
    Cancelled { command: String },

    // =========================================================================
    // Traffic Shaping Errors
    // =========================================================================
    #[error("Latency scope error: {0}")]
    LatencyScope(#[from] LatencyScopeError),

    // =========================================================================
    // Control Plane Errors
    // =========================================================================
    #[error("Tenant registration failed for '{tenant}': {reason}")]
    Registration { tenant: String, reason: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

fn format_captured(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("\nstdout:\n");
        out.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nstderr:\n");
        out.push_str(stderr.trim_end());
    }
    out
}

/// Hard validation errors abort before anything touches the host.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },
}

/// Errors raised while installing or removing loopback latency rules.
#[derive(Debug, Error)]
pub enum LatencyScopeError {
    #[error("setup step '{step}' failed: {reason}")]
    Setup { step: String, reason: String },

    #[error("teardown left rules behind, failed steps: {}", .failed_steps.join(", "))]
    Teardown { failed_steps: Vec<String> },

    #[error("another latency scope holds {lock_path}")]
    Busy { lock_path: PathBuf },

    #[error("failed to lock {lock_path}: {reason}")]
    Lock { lock_path: PathBuf, reason: String },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display_includes_output() {
        let err = BenchError::CommandFailed {
            command: "pgbench --port 5001".to_string(),
            code: 2,
            stdout: String::new(),
            stderr: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("pgbench --port 5001"));
        assert!(msg.contains("connection refused"));
        assert!(!msg.contains("stdout:"));
    }

    #[test]
    fn test_error_chain() {
        let scope_err = LatencyScopeError::Teardown {
            failed_steps: vec!["filter 5001".to_string(), "root qdisc".to_string()],
        };
        let err: BenchError = scope_err.into();
        assert!(matches!(err, BenchError::LatencyScope(_)));
        assert!(err.to_string().contains("filter 5001, root qdisc"));
    }

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::InvalidFieldValue {
            field: "clients",
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert!(err.to_string().contains("clients"));
    }
}
