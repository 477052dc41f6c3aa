// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! poolbench Core Library
//!
//! Benchmarks interchangeable Postgres connection poolers under configurable
//! client load and injected loopback latency. Provides the shell executor,
//! the scoped latency injection, the backend registry and the benchmark run
//! that composes them.

pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod latency;
pub mod lock;
pub mod run;
pub mod shell;
pub mod tenant;
pub mod types;
pub mod workload;

// Re-export commonly used types
pub use backend::{Backend, Pooler};
pub use config::{Config, ConfigLoader};
pub use error::{BenchError, BenchResult, HardValidationError, LatencyScopeError};
pub use latency::{LatencyGuard, LatencyScope};
pub use run::{BenchmarkRun, LatencySettings, RunResult};
pub use shell::{CommandSpec, Executor, InterruptHandle, OutputMode, ShellExecutor};
pub use tenant::{ControlPlaneClient, PoolMode, TenantStatus};
pub use types::{Port, TenantId};
pub use workload::{BenchmarkConfig, Protocol, WorkloadShape};
