// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Scoped latency injection on a local interface.
//!
//! Traffic to the selected TCP ports is diverted through a `netem` delay:
//!
//! ```text
//! root 1: prio (2 bands, all-zero priomap -> everything in band 1)
//!  ├── 1:1  regular traffic, untouched
//!  └── 1:2  20: netem delay <N>ms
//!            ^ u32 filter per port (prio = port, match ip dport)
//! ```
//!
//! The all-zero priomap keeps unrelated traffic out of the delayed band;
//! the default priomap would sort packets by TOS and some would land in
//! band 2.
//!
//! Rules exist only while a [`LatencyGuard`] is alive. Dropping or releasing
//! the guard removes every rule it installed, in reverse order, continuing
//! past individual failures.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::ShapingConfig;
use crate::error::{BenchError, BenchResult, LatencyScopeError};
use crate::lock::HostLock;
use crate::shell::{CommandSpec, Executor};
use crate::types::Port;

/// Traffic-control binary.
const TC: &str = "tc";

/// Handle of the root prio qdisc.
const ROOT_HANDLE: &str = "1:";

/// Handle of the netem qdisc under band 2.
const DELAY_HANDLE: &str = "20:";

/// Band 2 of the root qdisc.
const DELAYED_BAND: &str = "1:2";

/// tc messages meaning the rule to delete is already gone.
const ALREADY_ABSENT: &[&str] = &[
    "No such file or directory",
    "Cannot delete qdisc with handle of zero",
    "Cannot find specified filter chain",
    "Filter with specified priority/protocol not found",
    "Failed to find qdisc with specified handle",
    "Parent Qdisc doesn't exists",
    "Invalid handle",
];

/// One installed traffic-control rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Root,
    Delay { delay_ms: u32 },
    Filter { port: Port },
}

impl Rule {
    fn add_args(&self, interface: &str) -> Vec<String> {
        let mut args = vec![TC.to_string()];
        match self {
            Self::Root => {
                args.extend(
                    ["qdisc", "add", "dev", interface, "root", "handle", ROOT_HANDLE]
                        .map(String::from),
                );
                args.extend(["prio", "bands", "2", "priomap"].map(String::from));
                args.extend(std::iter::repeat("0".to_string()).take(16));
            }
            Self::Delay { delay_ms } => {
                args.extend(
                    [
                        "qdisc",
                        "add",
                        "dev",
                        interface,
                        "parent",
                        DELAYED_BAND,
                        "handle",
                        DELAY_HANDLE,
                        "netem",
                        "delay",
                    ]
                    .map(String::from),
                );
                args.push(format!("{}ms", delay_ms));
            }
            Self::Filter { port } => {
                let port = port.to_string();
                let port = port.as_str();
                args.extend(
                    [
                        "filter", "add", "dev", interface, "parent", "1:0", "protocol", "ip",
                        "prio", port, "u32", "match", "ip", "dport", port, "0xffff", "flowid",
                        DELAYED_BAND,
                    ]
                    .map(String::from),
                );
            }
        }
        args
    }

    fn del_args(&self, interface: &str) -> Vec<String> {
        let mut args = vec![TC.to_string()];
        match self {
            Self::Root => {
                args.extend(["qdisc", "del", "dev", interface, "root"].map(String::from));
            }
            Self::Delay { .. } => {
                args.extend(
                    [
                        "qdisc",
                        "del",
                        "dev",
                        interface,
                        "parent",
                        DELAYED_BAND,
                        "handle",
                        DELAY_HANDLE,
                    ]
                    .map(String::from),
                );
            }
            Self::Filter { port } => {
                let port = port.to_string();
                args.extend(
                    ["filter", "del", "dev", interface, "parent", ROOT_HANDLE, "prio", port.as_str()]
                        .map(String::from),
                );
            }
        }
        args
    }

    fn describe(&self) -> String {
        match self {
            Self::Root => "root qdisc".to_string(),
            Self::Delay { delay_ms } => format!("netem delay {}ms", delay_ms),
            Self::Filter { port } => format!("filter for port {}", port),
        }
    }
}

fn is_already_absent(stderr: &str) -> bool {
    ALREADY_ABSENT.iter().any(|marker| stderr.contains(marker))
}

/// Installs latency rules on one interface through an [`Executor`].
pub struct LatencyScope<'a, E: Executor> {
    executor: &'a E,
    interface: String,
    lock_path: PathBuf,
}

impl<'a, E: Executor> LatencyScope<'a, E> {
    pub fn new(executor: &'a E, shaping: &ShapingConfig) -> Self {
        Self {
            executor,
            interface: shaping.interface.clone(),
            lock_path: shaping.lock_path.clone(),
        }
    }

    /// Run `body` while traffic to `ports` is delayed by `delay_ms`.
    ///
    /// With no ports or a zero delay nothing is touched and `body` runs
    /// directly. Otherwise the rules are removed before this returns, even
    /// when `body` fails or panics. An error from `body` wins over a
    /// teardown error; teardown failures are logged either way.
    pub fn with_latency<T, F>(&self, ports: &BTreeSet<Port>, delay_ms: u32, body: F) -> BenchResult<T>
    where
        F: FnOnce() -> BenchResult<T>,
    {
        let Some(guard) = self.acquire(ports, delay_ms)? else {
            return body();
        };

        let result = body();
        let released = guard.release();

        match (result, released) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e.into()),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Install the rules and return the guard that owns them.
    ///
    /// Returns `Ok(None)` for the no-op case. On a setup failure whatever
    /// was already installed is removed before the error is returned.
    pub fn acquire(
        &self,
        ports: &BTreeSet<Port>,
        delay_ms: u32,
    ) -> BenchResult<Option<LatencyGuard<'a, E>>> {
        if delay_ms == 0 || ports.is_empty() {
            tracing::debug!("No latency requested, leaving traffic control untouched");
            return Ok(None);
        }

        let lock = HostLock::try_acquire(&self.lock_path)?;

        if self.clear_residual()? {
            tracing::warn!(
                interface = %self.interface,
                "Removed residual latency rules left by an earlier run"
            );
        }

        let mut guard = LatencyGuard {
            executor: self.executor,
            interface: self.interface.clone(),
            installed: Vec::with_capacity(ports.len() + 2),
            _lock: lock,
        };

        guard.install(Rule::Root)?;
        guard.install(Rule::Delay { delay_ms })?;
        for &port in ports {
            guard.install(Rule::Filter { port })?;
        }

        tracing::info!(
            interface = %self.interface,
            delay_ms = delay_ms,
            ports = ?ports.iter().map(Port::value).collect::<Vec<_>>(),
            "Latency injection active"
        );

        Ok(Some(guard))
    }

    /// Remove a root qdisc left behind by an earlier, interrupted scope.
    ///
    /// Returns whether anything was removed. Deleting the root also removes
    /// the delay qdisc and every filter attached under it.
    pub fn clear_residual(&self) -> BenchResult<bool> {
        let show = CommandSpec::argv([TC, "qdisc", "show", "dev", self.interface.as_str()])
            .capture();
        let output = self.executor.execute(&show)?;

        if !has_residual_root(&output.stdout) {
            return Ok(false);
        }

        let del = CommandSpec::argv(Rule::Root.del_args(&self.interface))
            .capture()
            .check(false)
            .privileged();
        let output = self.executor.execute(&del)?;

        if output.success() || is_already_absent(&output.stderr) {
            return Ok(true);
        }

        Err(LatencyScopeError::Setup {
            step: "clear residual root qdisc".to_string(),
            reason: output.stderr.trim().to_string(),
        }
        .into())
    }
}

/// Whether `tc qdisc show` output contains our root prio qdisc.
fn has_residual_root(show_output: &str) -> bool {
    show_output.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        matches!(tokens.as_slice(), ["qdisc", "prio", handle, "root", ..] if *handle == ROOT_HANDLE)
    })
}

/// Owns the installed rules and the host lock for the duration of a scope.
pub struct LatencyGuard<'a, E: Executor> {
    executor: &'a E,
    interface: String,
    installed: Vec<Rule>,
    _lock: HostLock,
}

impl<'a, E: Executor> LatencyGuard<'a, E> {
    fn install(&mut self, rule: Rule) -> BenchResult<()> {
        let spec = CommandSpec::argv(rule.add_args(&self.interface))
            .capture()
            .check(false)
            .privileged();

        let output = self.executor.execute(&spec).map_err(|e| match e {
            BenchError::Spawn { source, .. } => BenchError::from(LatencyScopeError::Setup {
                step: rule.describe(),
                reason: source.to_string(),
            }),
            other => other,
        })?;

        if !output.success() {
            return Err(LatencyScopeError::Setup {
                step: rule.describe(),
                reason: format!("exit code {}: {}", output.code, output.stderr.trim()),
            }
            .into());
        }

        self.installed.push(rule);
        Ok(())
    }

    /// Remove everything installed so far, newest first. Returns the steps
    /// that could not be removed.
    fn teardown(&mut self) -> Vec<String> {
        let mut failed = Vec::new();

        while let Some(rule) = self.installed.pop() {
            let spec = CommandSpec::argv(rule.del_args(&self.interface))
                .capture()
                .check(false)
                .privileged();

            match self.executor.execute(&spec) {
                Ok(output) if output.success() => {}
                Ok(output) if is_already_absent(&output.stderr) => {
                    tracing::debug!(rule = %rule.describe(), "Rule already absent");
                }
                Ok(output) => {
                    tracing::warn!(
                        rule = %rule.describe(),
                        code = output.code,
                        stderr = %output.stderr.trim(),
                        "Failed to remove latency rule"
                    );
                    failed.push(rule.describe());
                }
                Err(e) => {
                    tracing::warn!(rule = %rule.describe(), error = %e, "Failed to remove latency rule");
                    failed.push(rule.describe());
                }
            }
        }

        failed
    }

    /// Remove the rules and release the host lock.
    pub fn release(mut self) -> Result<(), LatencyScopeError> {
        let failed_steps = self.teardown();
        if failed_steps.is_empty() {
            tracing::info!(interface = %self.interface, "Latency injection removed");
            Ok(())
        } else {
            Err(LatencyScopeError::Teardown { failed_steps })
        }
    }

    /// Number of rules currently installed by this guard.
    pub fn installed_rules(&self) -> usize {
        self.installed.len()
    }
}

impl<E: Executor> Drop for LatencyGuard<'_, E> {
    fn drop(&mut self) {
        if self.installed.is_empty() {
            return;
        }
        let failed = self.teardown();
        if !failed.is_empty() {
            tracing::error!(
                interface = %self.interface,
                failed = ?failed,
                "Latency rules left behind; the next run will clear them"
            );
        }
    }
}
