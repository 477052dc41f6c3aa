// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! A single benchmark measurement against one backend.
//!
//! Resolve the backend, run its pre-run setup, build the load-tool command,
//! then run it inside a latency scope. The scope is always torn down before
//! the result is returned. Failed runs are reported, never retried.

use std::collections::BTreeSet;

use crate::backend::{Backend, Pooler};
use crate::config::Config;
use crate::error::BenchResult;
use crate::latency::LatencyScope;
use crate::shell::{CommandSpec, Executor, OutputMode};
use crate::types::Port;
use crate::workload::BenchmarkConfig;

/// Which ports get artificial delay, and how much.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySettings {
    pub delay_ms: u32,
    /// Delay traffic to the real database.
    pub delay_database: bool,
    /// Delay traffic to the pooler.
    pub delay_backend: bool,
}

impl LatencySettings {
    /// Exactly the selected ports.
    pub fn ports(&self, database: Port, backend: Port) -> BTreeSet<Port> {
        let mut ports = BTreeSet::new();
        if self.delay_database {
            ports.insert(database);
        }
        if self.delay_backend {
            ports.insert(backend);
        }
        ports
    }
}

/// Exit status and captured output of the load tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub backend: &'static str,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Composes backend, workload and latency into one measurement.
pub struct BenchmarkRun<'a, E: Executor> {
    executor: &'a E,
    config: &'a Config,
}

impl<'a, E: Executor> BenchmarkRun<'a, E> {
    pub fn new(executor: &'a E, config: &'a Config) -> Self {
        Self { executor, config }
    }

    /// Run the load tool against `backend_name`.
    ///
    /// # Errors
    /// `UnknownBackend`, `CommandFailed` (load tool), `Registration` (tenant
    /// setup) or `LatencyScope`.
    pub fn execute(
        &self,
        backend_name: &str,
        workload: &BenchmarkConfig,
        latency: &LatencySettings,
    ) -> BenchResult<RunResult> {
        let backend = Backend::resolve(backend_name)?;
        let ports = latency.ports(self.config.database.port, backend.listen_port());

        tracing::info!(
            backend = backend.name(),
            port = %backend.listen_port(),
            shape = %workload.shape(),
            protocol = %workload.protocol(),
            clients = workload.clients(),
            jobs = workload.jobs(),
            duration_secs = workload.duration_secs(),
            delay_ms = latency.delay_ms,
            "Starting benchmark"
        );

        backend.pre_run_setup(self.config)?;

        let command = self.load_tool_command(&backend, workload);
        let scope = LatencyScope::new(self.executor, &self.config.shaping);

        let output = scope.with_latency(&ports, latency.delay_ms, || {
            self.executor.execute(&command)
        })?;

        Ok(RunResult {
            backend: backend.name(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Load-tool invocation for `backend` under `workload`.
    pub fn load_tool_command(&self, backend: &Backend, workload: &BenchmarkConfig) -> CommandSpec {
        let tool = &self.config.load_tool;
        let payload = workload.payload();

        let mut args = vec![
            tool.program.clone(),
            "--host".to_string(),
            tool.host.clone(),
            "--port".to_string(),
            backend.listen_port().to_string(),
            format!("--username={}", backend.username(self.config)),
            format!("--progress={}", tool.progress_secs),
            "--time".to_string(),
            workload.duration_secs().to_string(),
            "--client".to_string(),
            workload.clients().to_string(),
            "--jobs".to_string(),
            workload.jobs().to_string(),
            "--protocol".to_string(),
            workload.protocol().to_string(),
        ];
        args.extend(payload.args);

        CommandSpec::argv(args)
            .stdin(payload.stdin)
            .env("PGPASSWORD", self.config.database.password.clone())
            .output(OutputMode::Tee)
            .interruptible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::shell::{CommandLine, CommandOutput};
    use crate::workload::{Protocol, WorkloadShape};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        specs: RefCell<Vec<CommandSpec>>,
        load_tool_code: i32,
    }

    impl Executor for Recorder {
        fn execute(&self, spec: &CommandSpec) -> BenchResult<CommandOutput> {
            self.specs.borrow_mut().push(spec.clone());
            let is_load_tool =
                matches!(spec.line(), CommandLine::Argv(a) if a.first().map(String::as_str) == Some("pgbench"));
            if is_load_tool && self.load_tool_code != 0 {
                return Err(BenchError::CommandFailed {
                    command: spec.to_string(),
                    code: self.load_tool_code,
                    stdout: String::new(),
                    stderr: "connection to server failed".to_string(),
                });
            }
            Ok(CommandOutput {
                code: 0,
                stdout: if is_load_tool { "tps = 1000.0\n".to_string() } else { String::new() },
                stderr: String::new(),
            })
        }
    }

    fn config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.shaping.lock_path = dir.path().join("latency.lock");
        (dir, config)
    }

    fn argv(spec: &CommandSpec) -> Vec<String> {
        match spec.line() {
            CommandLine::Argv(args) => args.clone(),
            CommandLine::Shell(line) => vec![line.clone()],
        }
    }

    #[test]
    fn test_latency_port_selection() {
        let db = Port::new(9700).unwrap();
        let pooler = Port::new(5001).unwrap();

        let none = LatencySettings { delay_ms: 5, ..Default::default() };
        assert!(none.ports(db, pooler).is_empty());

        let both = LatencySettings { delay_ms: 5, delay_database: true, delay_backend: true };
        assert_eq!(both.ports(db, pooler).into_iter().collect::<Vec<_>>(), vec![pooler, db]);

        let pooler_only = LatencySettings { delay_ms: 5, delay_backend: true, ..Default::default() };
        assert_eq!(pooler_only.ports(db, pooler).into_iter().collect::<Vec<_>>(), vec![pooler]);
    }

    #[test]
    fn test_load_tool_arguments() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let workload =
            BenchmarkConfig::new(20, 4, 30, Protocol::Extended, WorkloadShape::Pipeline, 0).unwrap();

        let spec = run.load_tool_command(&Backend::resolve("odyssey").unwrap(), &workload);

        assert_eq!(
            argv(&spec),
            vec![
                "pgbench", "--host", "localhost", "--port", "5002", "--username=postgres",
                "--progress=1", "--time", "30", "--client", "20", "--jobs", "4", "--protocol",
                "extended", "--file=pipeline.sql",
            ]
        );
        assert_eq!(spec.env_overlay().get("PGPASSWORD").map(String::as_str), Some("test"));
        assert_eq!(spec.output_mode(), OutputMode::Tee);
        assert!(spec.is_checked());
        assert!(spec.is_interruptible());
    }

    #[test]
    fn test_single_client_lowers_jobs() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let workload = BenchmarkConfig::new(
            1,
            BenchmarkConfig::DEFAULT_JOBS,
            10,
            Protocol::Prepared,
            WorkloadShape::Pipeline,
            0,
        )
        .unwrap();

        let args = argv(&run.load_tool_command(&Backend::resolve("pgbouncer").unwrap(), &workload));

        let client = args.iter().position(|a| a == "--client").unwrap();
        let jobs = args.iter().position(|a| a == "--jobs").unwrap();
        assert_eq!(args[client + 1], "1");
        assert_eq!(args[jobs + 1], "1");
    }

    #[test]
    fn test_large_workload_uses_stdin_only() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let workload =
            BenchmarkConfig::new(10, 10, 10, Protocol::Prepared, WorkloadShape::Large, 10_000).unwrap();

        let spec = run.load_tool_command(&Backend::resolve("pgbouncer").unwrap(), &workload);

        assert_eq!(argv(&spec).last().map(String::as_str), Some("prepared"));
        assert!(spec.stdin_bytes().unwrap().len() > 10_000);
    }

    #[test]
    fn test_select_only_flag() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let workload =
            BenchmarkConfig::new(10, 10, 10, Protocol::Prepared, WorkloadShape::SelectOnly, 0).unwrap();

        let spec = run.load_tool_command(&Backend::resolve("pgcat").unwrap(), &workload);

        let args = argv(&spec);
        assert_eq!(args.iter().filter(|a| a.as_str() == "--select-only").count(), 1);
        assert_eq!(args.last().map(String::as_str), Some("--select-only"));
        assert!(spec.stdin_bytes().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_execute_without_latency() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);

        let result = run
            .execute("pgbouncer", &BenchmarkConfig::default(), &LatencySettings::default())
            .unwrap();

        assert!(result.success());
        assert_eq!(result.backend, "pgbouncer");
        assert_eq!(result.stdout, "tps = 1000.0\n");
        assert_eq!(recorder.specs.borrow().len(), 1);
    }

    #[test]
    fn test_execute_wraps_load_tool_in_latency_scope() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let latency = LatencySettings { delay_ms: 1, delay_database: true, delay_backend: true };

        run.execute("pgcat", &BenchmarkConfig::default(), &latency).unwrap();

        let lines: Vec<String> = recorder.specs.borrow().iter().map(|s| s.to_string()).collect();
        let tool = lines.iter().position(|l| l.starts_with("pgbench")).unwrap();
        let adds = lines.iter().filter(|l| l.contains(" add ")).count();
        let dels = lines.iter().filter(|l| l.contains(" del ")).count();
        assert_eq!(adds, 4);
        assert_eq!(dels, 4);
        assert!(lines[..tool].iter().filter(|l| l.contains(" add ")).count() == 4);
        assert!(lines[tool..].iter().filter(|l| l.contains(" del ")).count() == 4);
        assert!(lines.iter().any(|l| l.contains("dport 5003")));
        assert!(lines.iter().any(|l| l.contains("dport 9700")));
    }

    #[test]
    fn test_failed_load_tool_still_restores_network() {
        let (_dir, config) = config();
        let recorder = Recorder { load_tool_code: 1, ..Default::default() };
        let run = BenchmarkRun::new(&recorder, &config);
        let latency = LatencySettings { delay_ms: 10, delay_backend: true, ..Default::default() };

        let result = run.execute("odyssey", &BenchmarkConfig::default(), &latency);

        match result {
            Err(BenchError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, 1);
                assert!(stderr.contains("connection to server failed"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let last = recorder.specs.borrow().last().unwrap().to_string();
        assert_eq!(last, "tc qdisc del dev lo root");
    }

    #[test]
    fn test_unknown_backend_runs_nothing() {
        let (_dir, config) = config();
        let recorder = Recorder::default();
        let run = BenchmarkRun::new(&recorder, &config);
        let latency = LatencySettings { delay_ms: 10, delay_backend: true, ..Default::default() };

        let result = run.execute("pgpool", &BenchmarkConfig::default(), &latency);

        assert!(matches!(result, Err(BenchError::UnknownBackend { .. })));
        assert!(recorder.specs.borrow().is_empty());
    }
}
