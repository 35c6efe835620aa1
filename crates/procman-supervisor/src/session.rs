use std::io::ErrorKind;
use std::io::Write;
use std::process::Child;
use std::process::ChildStdin;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::TryLockError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use procman_common::acquire_lock_with_timeout;
use procman_common::mutex_lock_or_recover;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::capture::CapturePipeline;
use crate::config::SupervisorConfig;
use crate::error::ProcessError;
use crate::error::SpawnErrorKind;
use crate::matcher::LineMatcher;
use crate::output_buffer::OutputBuffer;
use crate::types::ErrorDetail;
use crate::types::ProcessStatus;
use crate::types::SessionState;
use crate::Result;

/// State shared between a session and its capture pipeline.
pub(crate) struct SessionCore {
    pid: u32,
    state: SessionState,
    buffer: OutputBuffer,
    child: Option<Child>,
    exit_status: Option<ExitStatus>,
    output_drained: bool,
    kill_requested: bool,
}

impl SessionCore {
    fn new(buffer_bytes: usize) -> Self {
        Self {
            pid: 0,
            state: SessionState::Initialized,
            buffer: OutputBuffer::new(buffer_bytes),
            child: None,
            exit_status: None,
            output_drained: false,
            kill_requested: false,
        }
    }

    pub(crate) fn commit(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            debug!(pid = self.pid, bytes = line.len(), "Committing output line");
            self.buffer.append(line);
        }
    }

    /// Non-blocking exit check; the first observed status is cached.
    pub(crate) fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_some() {
            return self.exit_status;
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(status) => {
                if let Some(status) = status {
                    debug!(pid = self.pid, %status, "Process exited");
                }
                self.exit_status = status;
            }
            Err(e) => warn!(pid = self.pid, error = %e, "Failed to poll process status"),
        }
        self.exit_status
    }

    pub(crate) fn mark_drained(&mut self) {
        self.output_drained = true;
    }

    /// Move a running session to its terminal state once the process has
    /// exited and every captured line is committed. Returns whether the
    /// session is terminal afterwards.
    pub(crate) fn try_finalize(&mut self) -> bool {
        if self.state.is_running() && self.output_drained {
            if let Some(status) = self.exit_status {
                self.state = if self.kill_requested {
                    SessionState::Completed
                } else {
                    SessionState::from_exit_status(status)
                };
                info!(pid = self.pid, state = %self.state, "Process finished");
            }
        }
        self.state.is_terminal()
    }

    pub(crate) fn fail(&mut self, detail: ErrorDetail) {
        if self.state.is_running() {
            warn!(pid = self.pid, detail = %detail, "Session failed");
            self.state = SessionState::error(detail);
        }
    }
}

fn summarize(lines: &[String], max_chars: usize) -> String {
    let joined = lines.join("\n");
    let count = joined.chars().count();
    if count <= max_chars {
        return joined;
    }
    joined.chars().skip(count - max_chars).collect()
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// One supervised process: its child handle, capture pipeline, output buffer
/// and lifecycle state.
///
/// All methods take `&self`; a session is shared as `Arc<ProcessSession>`
/// between the supervisor and callers. Blocking work (pipe writes, exit
/// waits) never happens while the core lock is held.
pub struct ProcessSession {
    command: Vec<String>,
    config: SupervisorConfig,
    core: Arc<Mutex<SessionCore>>,
    stdin: Mutex<Option<ChildStdin>>,
    pipeline: Mutex<Option<CapturePipeline>>,
    pid: OnceLock<u32>,
    started_at: OnceLock<DateTime<Utc>>,
}

impl ProcessSession {
    pub fn new(command: Vec<String>, config: SupervisorConfig) -> Self {
        let core = SessionCore::new(config.buffer_bytes);
        Self {
            command,
            config,
            core: Arc::new(Mutex::new(core)),
            stdin: Mutex::new(None),
            pipeline: Mutex::new(None),
            pid: OnceLock::new(),
            started_at: OnceLock::new(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn state(&self) -> SessionState {
        mutex_lock_or_recover(&self.core).state.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.get().copied()
    }

    /// Spawn the process and its capture pipeline.
    ///
    /// Spawning is a synchronous OS call, so `timeout` is only recorded in
    /// the log.
    pub fn start(&self, timeout: Duration) -> Result<u32> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ProcessError::Validation("Command cannot be empty".to_string()))?;

        let mut core = mutex_lock_or_recover(&self.core);
        if core.state != SessionState::Initialized {
            return Err(ProcessError::state("start", "Process already started"));
        }

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let err = ProcessError::spawn(&e);
                warn!(command = ?self.command, error = %err, "Failed to spawn process");
                core.state = SessionState::error(ErrorDetail::Message(err.to_string()));
                return Err(err);
            }
        };

        let pid = child.id();
        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (stdin, stdout, stderr) = match pipes {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                let err = ProcessError::Spawn {
                    kind: SpawnErrorKind::Other,
                    reason: "process pipes unavailable".to_string(),
                };
                core.state = SessionState::error(ErrorDetail::Message(err.to_string()));
                return Err(err);
            }
        };

        core.pid = pid;
        core.child = Some(child);
        core.state = SessionState::Running;
        drop(core);

        let _ = self.pid.set(pid);
        let _ = self.started_at.set(Utc::now());
        *mutex_lock_or_recover(&self.stdin) = Some(stdin);

        match CapturePipeline::spawn(
            pid,
            stdout,
            stderr,
            Arc::clone(&self.core),
            self.config.poll_interval,
        ) {
            Ok(pipeline) => *mutex_lock_or_recover(&self.pipeline) = Some(pipeline),
            Err(e) => {
                let err = ProcessError::Spawn {
                    kind: SpawnErrorKind::Other,
                    reason: format!("failed to start capture threads: {}", e),
                };
                mutex_lock_or_recover(&self.core).fail(ErrorDetail::Message(err.to_string()));
                if let Err(cleanup_err) = self.cleanup() {
                    warn!(pid, error = %cleanup_err, "Cleanup after failed start failed");
                }
                return Err(err);
            }
        }

        info!(
            pid,
            command = ?self.command,
            timeout_ms = duration_ms(timeout),
            "Process started"
        );
        Ok(pid)
    }

    /// SIGKILL the process and wait up to `timeout` for it to exit.
    pub fn kill(&self, timeout: Duration) -> Result<()> {
        let pid = {
            let mut core = mutex_lock_or_recover(&self.core);
            let exited = core.poll_exit().is_some();
            match &core.state {
                SessionState::Running => {}
                SessionState::Error { .. } if !exited => {}
                other => {
                    return Err(ProcessError::state(
                        "kill",
                        format!("Process not running (state: {})", other),
                    ))
                }
            }
            let pid = core.pid;
            let child = core
                .child
                .as_mut()
                .ok_or_else(|| ProcessError::state("kill", "No process to kill"))?;
            if !exited {
                if let Err(e) = child.kill() {
                    warn!(pid, error = %e, "Failed to signal process");
                }
            }
            core.kill_requested = true;
            pid
        };

        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut core = mutex_lock_or_recover(&self.core);
                if core.poll_exit().is_some() || core.child.is_none() {
                    core.state = SessionState::Completed;
                    break;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(pid, timeout_ms = duration_ms(timeout), "Process did not terminate");
                return Err(ProcessError::Timeout {
                    pid,
                    timeout_ms: duration_ms(timeout),
                });
            }
            thread::sleep(self.config.kill_poll_interval.min(deadline - now));
        }

        if let Some(pipeline) = mutex_lock_or_recover(&self.pipeline).as_ref() {
            pipeline.stop();
        }
        self.close_stdin();
        info!(pid, "Process killed");
        Ok(())
    }

    /// Write `text` followed by a newline (unless it already ends in one).
    pub fn send_line(&self, text: &str) -> Result<()> {
        if text.ends_with('\n') {
            self.write_stdin(text.as_bytes())
        } else {
            self.write_stdin(format!("{}\n", text).as_bytes())
        }
    }

    /// Write `text` exactly as given.
    pub fn send_chars(&self, text: &str) -> Result<()> {
        self.write_stdin(text.as_bytes())
    }

    fn write_stdin(&self, bytes: &[u8]) -> Result<()> {
        let pid = {
            let core = mutex_lock_or_recover(&self.core);
            if !core.state.is_running() {
                return Err(ProcessError::state(
                    "send input",
                    format!("Process not running (state: {})", core.state),
                ));
            }
            core.pid
        };

        let mut stdin = mutex_lock_or_recover(&self.stdin);
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| ProcessError::state("send input", "Process stdin not available"))?;

        match pipe.write_all(bytes).and_then(|()| pipe.flush()) {
            Ok(()) => {
                debug!(pid, bytes = bytes.len(), "Wrote to stdin");
                Ok(())
            }
            Err(e) => {
                if e.kind() == ErrorKind::BrokenPipe {
                    *stdin = None;
                }
                Err(ProcessError::Input {
                    pid,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drop the stdin pipe unless a writer is in the middle of a write; that
    /// writer fails with a broken pipe once the process is gone and drops it
    /// itself.
    fn close_stdin(&self) {
        match self.stdin.try_lock() {
            Ok(mut stdin) => *stdin = None,
            Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner() = None,
            Err(TryLockError::WouldBlock) => {
                debug!(pid = ?self.pid(), "Stdin busy, leaving it to the writer");
            }
        }
    }

    /// Current state plus a short tail of the output. A running session is
    /// rechecked against the OS first.
    pub fn status(&self) -> ProcessStatus {
        let mut core = mutex_lock_or_recover(&self.core);
        if core.state.is_running() {
            core.poll_exit();
            core.try_finalize();
        }
        let tail = core.buffer.lines(self.config.summary_lines);
        ProcessStatus {
            command: self.command.clone(),
            state: core.state.clone(),
            last_output: summarize(&tail, self.config.summary_chars),
        }
    }

    pub fn output_lines(&self, max_lines: usize) -> Vec<String> {
        mutex_lock_or_recover(&self.core).buffer.lines(max_lines)
    }

    pub fn search_output(&self, mode: &str, pattern: &str, max_lines: usize) -> Result<Vec<String>> {
        let matcher = LineMatcher::parse(mode, pattern)?;
        Ok(self.search_with(&matcher, max_lines))
    }

    pub fn search_with(&self, matcher: &LineMatcher, max_lines: usize) -> Vec<String> {
        mutex_lock_or_recover(&self.core)
            .buffer
            .search(matcher, max_lines)
    }

    /// Like [`search_with`](Self::search_with) but gives up if the session
    /// lock cannot be taken within `lock_timeout`.
    pub fn search_with_timeout(
        &self,
        matcher: &LineMatcher,
        max_lines: usize,
        lock_timeout: Duration,
    ) -> Result<Vec<String>> {
        let core = acquire_lock_with_timeout(&self.core, lock_timeout)
            .ok_or_else(|| ProcessError::LockTimeout(self.pid().unwrap_or_default()))?;
        Ok(core.buffer.search(matcher, max_lines))
    }

    #[cfg(test)]
    pub(crate) fn hold_core(&self) -> std::sync::MutexGuard<'_, SessionCore> {
        mutex_lock_or_recover(&self.core)
    }

    /// Release everything the session owns. Safe to call in any state and
    /// more than once.
    pub fn cleanup(&self) -> Result<()> {
        let child = {
            let mut core = mutex_lock_or_recover(&self.core);
            if core.state.is_running() {
                core.state = match core.poll_exit() {
                    Some(status) if !core.kill_requested => SessionState::from_exit_status(status),
                    _ => SessionState::Completed,
                };
            }
            core.child.take()
        };

        if let Some(pipeline) = mutex_lock_or_recover(&self.pipeline).as_ref() {
            pipeline.stop();
        }

        // The kill has to come before stdin is touched: a writer blocked on a
        // full pipe holds the stdin lock until the read end goes away.
        let mut result = Ok(());
        if let Some(mut child) = child {
            let pid = child.id();
            if let Err(e) = child.kill() {
                debug!(pid, error = %e, "Kill during cleanup failed");
            }
            self.close_stdin();
            if let Err(e) = child.wait() {
                warn!(pid, error = %e, "Failed to reap process");
                result = Err(ProcessError::state(
                    "clean up",
                    format!("failed to reap process: {}", e),
                ));
            }
        } else {
            self.close_stdin();
        }

        let pipeline = mutex_lock_or_recover(&self.pipeline).take();
        if let Some(mut pipeline) = pipeline {
            pipeline.shutdown();
        }

        mutex_lock_or_recover(&self.core).buffer.clear();
        result
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(pid = ?self.pid(), error = %e, "Cleanup on drop failed");
        }
    }
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("pid", &self.pid())
            .field("command", &self.command)
            .field("started_at", &self.started_at())
            .finish_non_exhaustive()
    }
}
