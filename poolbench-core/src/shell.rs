// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! External command execution.
//!
//! Every command is echoed before it runs, whatever its outcome. Privileged
//! commands are prefixed with `sudo` only when the process is not already
//! running as root; the effective UID is read once per process.
//!
//! Commands marked interruptible can be stopped through an
//! [`InterruptHandle`]. Signals go to that child alone, so cleanup commands
//! running at the same time are never hit.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::{BenchError, BenchResult};

/// Program used to elevate privileged commands.
const ELEVATOR: &str = "sudo";

static IS_ROOT: OnceLock<bool> = OnceLock::new();

/// Whether the current process already runs with root privileges.
pub fn is_privileged() -> bool {
    *IS_ROOT.get_or_init(|| nix::unistd::geteuid().is_root())
}

/// What to run: an argument vector or a single `sh -c` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

impl CommandLine {
    /// Prefix the command with the elevation program unless already root.
    pub fn elevated(self, already_root: bool) -> Self {
        if already_root {
            return self;
        }
        match self {
            Self::Argv(args) => {
                let mut elevated = Vec::with_capacity(args.len() + 1);
                elevated.push(ELEVATOR.to_string());
                elevated.extend(args);
                Self::Argv(elevated)
            }
            Self::Shell(line) => Self::Shell(format!("{} {}", ELEVATOR, line)),
        }
    }

    fn to_command(&self) -> BenchResult<Command> {
        match self {
            Self::Argv(args) => {
                let (program, rest) = args.split_first().ok_or_else(|| BenchError::Spawn {
                    command: String::new(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty argument vector",
                    ),
                })?;
                let mut cmd = Command::new(program);
                cmd.args(rest);
                Ok(cmd)
            }
            Self::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                Ok(cmd)
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argv(args) => {
                let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
                write!(f, "{}", quoted.join(" "))
            }
            Self::Shell(line) => write!(f, "{}", line),
        }
    }
}

/// Quote a single argument for display so the echoed line can be pasted
/// back into a shell.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// How the child's stdout/stderr are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Share the operator's terminal. Nothing is captured.
    #[default]
    Inherit,
    /// Collect both streams silently.
    Capture,
    /// Stream both to the operator line by line while collecting them.
    Tee,
}

/// A command plus everything needed to run it.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    line: CommandLine,
    stdin: Option<Vec<u8>>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    output: OutputMode,
    check: bool,
    privileged: bool,
    interruptible: bool,
}

impl CommandSpec {
    fn new(line: CommandLine) -> Self {
        Self {
            line,
            stdin: None,
            cwd: None,
            env: BTreeMap::new(),
            output: OutputMode::Inherit,
            check: true,
            privileged: false,
            interruptible: false,
        }
    }

    /// Run a program with explicit arguments.
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(CommandLine::Argv(args.into_iter().map(Into::into).collect()))
    }

    /// Run a line through `sh -c`.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::new(CommandLine::Shell(line.into()))
    }

    /// Feed these bytes on standard input.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run inside this directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set one variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    /// Shorthand for `output(OutputMode::Capture)`.
    pub fn capture(self) -> Self {
        self.output(OutputMode::Capture)
    }

    /// Whether a non-zero exit is turned into `CommandFailed`. Defaults to true.
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Run with root privileges, elevating if needed.
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Allow an [`InterruptHandle`] to stop this command.
    pub fn interruptible(mut self) -> Self {
        self.interruptible = true;
        self
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    pub fn stdin_bytes(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn working_dir(&self) -> Option<&std::path::Path> {
        self.cwd.as_deref()
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    pub fn is_checked(&self) -> bool {
        self.check
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_interruptible(&self) -> bool {
        self.interruptible
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// Exit code and whatever output was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `128 + signal` when the child was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs commands on behalf of the latency scope, the backends and the
/// benchmark run.
pub trait Executor {
    /// Run `spec` to completion.
    ///
    /// # Errors
    /// `Spawn` if the program could not be started; `CommandFailed` if it
    /// exited non-zero and the spec is checked.
    fn execute(&self, spec: &CommandSpec) -> BenchResult<CommandOutput>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, spec: &CommandSpec) -> BenchResult<CommandOutput> {
        (**self).execute(spec)
    }
}

#[derive(Debug, Default)]
struct InterruptState {
    child: Option<Pid>,
    cancelled: bool,
}

/// Stops the interruptible command an executor is running.
///
/// Clones share state: the executor registers the child, another thread
/// (typically a signal handler task) cancels it.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    state: Arc<Mutex<InterruptState>>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `sig` to the running interruptible command, if any, and keep
    /// later interruptible commands from starting.
    ///
    /// Returns whether a child was signalled.
    pub fn cancel(&self, sig: Signal) -> bool {
        let mut state = self.lock();
        state.cancelled = true;

        let Some(pid) = state.child else {
            return false;
        };
        match signal::kill(pid, sig) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(pid = pid.as_raw(), error = %e, "Child already gone");
                false
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Whether an interruptible command is running right now.
    pub fn is_running(&self) -> bool {
        self.lock().child.is_some()
    }

    /// Record `pid` as the running child until the returned slot drops.
    /// A cancel that raced with the spawn is delivered here.
    fn register(&self, pid: Pid) -> RunningChild<'_> {
        let mut state = self.lock();
        state.child = Some(pid);
        if state.cancelled {
            if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
                tracing::debug!(pid = pid.as_raw(), error = %e, "Child already gone");
            }
        }
        RunningChild { handle: self }
    }

    fn lock(&self) -> MutexGuard<'_, InterruptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the registered child once it has been waited for.
struct RunningChild<'a> {
    handle: &'a InterruptHandle,
}

impl Drop for RunningChild<'_> {
    fn drop(&mut self) {
        self.handle.lock().child = None;
    }
}

/// Executes commands as local child processes.
#[derive(Debug, Default, Clone)]
pub struct ShellExecutor {
    interrupt: Option<InterruptHandle>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose interruptible commands `handle` can stop.
    pub fn with_interrupt(handle: InterruptHandle) -> Self {
        Self {
            interrupt: Some(handle),
        }
    }

    fn interrupt_for(&self, spec: &CommandSpec) -> Option<&InterruptHandle> {
        self.interrupt.as_ref().filter(|_| spec.interruptible)
    }
}

impl Executor for ShellExecutor {
    fn execute(&self, spec: &CommandSpec) -> BenchResult<CommandOutput> {
        let line = if spec.privileged {
            spec.line.clone().elevated(is_privileged())
        } else {
            spec.line.clone()
        };
        let shown = line.to_string();

        let interrupt = self.interrupt_for(spec);
        if interrupt.is_some_and(InterruptHandle::is_cancelled) {
            tracing::info!(target: "poolbench::shell", "- {} (cancelled)", shown);
            return Err(BenchError::Cancelled { command: shown });
        }

        tracing::info!(target: "poolbench::shell", "+ {}", shown);

        let mut cmd = line.to_command()?;
        cmd.envs(&spec.env);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }

        if spec.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        match spec.output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture | OutputMode::Tee => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|e| BenchError::Spawn {
            command: shown.clone(),
            source: e,
        })?;

        let _running = interrupt.map(|h| h.register(Pid::from_raw(child.id() as i32)));

        let writer = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(std::thread::spawn(move || {
                // A child that exits without reading stdin closes the pipe.
                if let Err(e) = pipe.write_all(&input) {
                    tracing::debug!(error = %e, "stdin pipe closed early");
                }
            })),
            _ => None,
        };

        let io_err = |e| BenchError::Io {
            context: "waiting for child process",
            source: e,
        };

        let (status, stdout, stderr) = match spec.output {
            OutputMode::Inherit => {
                let status = child.wait().map_err(io_err)?;
                (status, String::new(), String::new())
            }
            OutputMode::Capture => {
                let out = child.wait_with_output().map_err(io_err)?;
                (
                    out.status,
                    String::from_utf8_lossy(&out.stdout).into_owned(),
                    String::from_utf8_lossy(&out.stderr).into_owned(),
                )
            }
            OutputMode::Tee => {
                let out_pipe = child.stdout.take();
                let err_pipe = child.stderr.take();
                let (stdout, stderr) = std::thread::scope(|s| {
                    let out = s.spawn(|| tee_lines(out_pipe, std::io::stdout()));
                    let err = s.spawn(|| tee_lines(err_pipe, std::io::stderr()));
                    (out.join().unwrap_or_default(), err.join().unwrap_or_default())
                });
                let status = child.wait().map_err(io_err)?;
                (status, stdout, stderr)
            }
        };

        if let Some(handle) = writer {
            let _ = handle.join();
        }

        let output = CommandOutput {
            code: exit_code(status),
            stdout,
            stderr,
        };

        if spec.check && !output.success() {
            return Err(BenchError::CommandFailed {
                command: shown,
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Copy lines from a child pipe to `sink` and return everything read.
fn tee_lines<R: Read, W: Write>(pipe: Option<R>, mut sink: W) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut collected = String::new();
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let _ = sink.write_all(&buf);
                let _ = sink.flush();
                collected.push_str(&String::from_utf8_lossy(&buf));
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading child output");
                break;
            }
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_skipped_for_root() {
        let line = CommandLine::Argv(vec!["tc".into(), "qdisc".into()]);
        assert_eq!(line.clone().elevated(true), line);
    }

    #[test]
    fn test_elevation_prefixes_sudo() {
        let argv = CommandLine::Argv(vec!["tc".into(), "qdisc".into()]).elevated(false);
        assert_eq!(
            argv,
            CommandLine::Argv(vec!["sudo".into(), "tc".into(), "qdisc".into()])
        );

        let shell = CommandLine::Shell("tc qdisc show dev lo".into()).elevated(false);
        assert_eq!(shell, CommandLine::Shell("sudo tc qdisc show dev lo".into()));
    }

    #[test]
    fn test_display_quotes_arguments() {
        let line = CommandLine::Argv(vec![
            "pgbench".into(),
            "--username=postgres".into(),
            "select 'a'".into(),
        ]);
        assert_eq!(
            line.to_string(),
            r#"pgbench --username=postgres 'select '\''a'\'''"#
        );
    }

    #[test]
    fn test_capture_stdout_and_stdin() {
        let spec = CommandSpec::argv(["cat"]).stdin("hello\n").capture();
        let out = ShellExecutor::new().execute(&spec).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn test_env_overlay_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::shell("printf '%s:' \"$POOLBENCH_TEST\"; pwd")
            .env("POOLBENCH_TEST", "overlay")
            .cwd(dir.path())
            .capture();
        let out = ShellExecutor::new().execute(&spec).unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert!(out.stdout.starts_with("overlay:"));
        assert!(out.stdout.trim_end().ends_with(canonical.to_str().unwrap()));
    }

    #[test]
    fn test_checked_failure_carries_code_and_output() {
        let spec = CommandSpec::shell("echo out; echo err >&2; exit 3").capture();
        let err = ShellExecutor::new().execute(&spec).unwrap_err();
        match err {
            BenchError::CommandFailed {
                code,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(code, 3);
                assert_eq!(stdout, "out\n");
                assert_eq!(stderr, "err\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unchecked_failure_returns_outcome() {
        let spec = CommandSpec::shell("exit 4").capture().check(false);
        let out = ShellExecutor::new().execute(&spec).unwrap();
        assert_eq!(out.code, 4);
        assert!(!out.success());
    }

    #[test]
    fn test_signal_exit_is_non_zero() {
        let spec = CommandSpec::shell("kill -9 $$").capture().check(false);
        let out = ShellExecutor::new().execute(&spec).unwrap();
        assert_eq!(out.code, 128 + 9);
    }

    #[test]
    fn test_tee_collects_output() {
        let spec = CommandSpec::shell("echo progress >&2; echo done").output(OutputMode::Tee);
        let out = ShellExecutor::new().execute(&spec).unwrap();
        assert_eq!(out.stdout, "done\n");
        assert_eq!(out.stderr, "progress\n");
    }

    #[test]
    fn test_spawn_failure() {
        let spec = CommandSpec::argv(["/nonexistent/poolbench-tool"]);
        let result = ShellExecutor::new().execute(&spec);
        assert!(matches!(result, Err(BenchError::Spawn { .. })));
    }

    #[test]
    fn test_cancelled_handle_skips_interruptible_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("started");
        let handle = InterruptHandle::new();
        assert!(!handle.cancel(Signal::SIGTERM));

        let executor = ShellExecutor::with_interrupt(handle);
        let spec = CommandSpec::argv(["touch".to_string(), marker.display().to_string()])
            .interruptible();
        let result = executor.execute(&spec);

        assert!(matches!(result, Err(BenchError::Cancelled { .. })));
        assert!(!marker.exists());
    }

    #[test]
    fn test_cancel_leaves_other_commands_alone() {
        let handle = InterruptHandle::new();
        handle.cancel(Signal::SIGTERM);

        let executor = ShellExecutor::with_interrupt(handle);
        let spec = CommandSpec::shell("echo cleanup").capture();
        let out = executor.execute(&spec).unwrap();
        assert_eq!(out.stdout, "cleanup\n");
    }

    #[test]
    fn test_cancel_signals_running_command() {
        let handle = InterruptHandle::new();
        let executor = ShellExecutor::with_interrupt(handle.clone());
        let started = std::time::Instant::now();

        let worker = std::thread::spawn(move || {
            let spec = CommandSpec::argv(["sleep", "30"])
                .capture()
                .check(false)
                .interruptible();
            executor.execute(&spec)
        });

        let deadline = started + std::time::Duration::from_secs(10);
        while !handle.is_running() {
            assert!(std::time::Instant::now() < deadline, "command never started");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(handle.cancel(Signal::SIGTERM));

        let out = worker.join().unwrap().unwrap();
        assert_eq!(out.code, 128 + Signal::SIGTERM as i32);
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
        assert!(!handle.is_running());
    }

    #[test]
    fn test_failure_reports_echoed_command() {
        let spec = CommandSpec::argv(["sh", "-c", "exit 5"]);
        match ShellExecutor::new().execute(&spec) {
            Err(BenchError::CommandFailed { command, code, .. }) => {
                assert_eq!(command, "sh -c 'exit 5'");
                assert_eq!(code, 5);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
