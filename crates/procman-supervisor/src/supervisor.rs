use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::thread;
use std::time::Duration;

use procman_common::rwlock_read_or_recover;
use procman_common::rwlock_write_or_recover;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::config::SupervisorConfig;
use crate::error::FleetFailure;
use crate::error::ProcessError;
use crate::matcher::LineMatcher;
use crate::session::ProcessSession;
use crate::types::ProcessListEntry;
use crate::types::ProcessStatus;
use crate::Result;

/// Result of a search across every registered session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchAllReport {
    /// `(pid, matching lines)` for sessions with at least one match, by pid.
    pub matches: Vec<(u32, Vec<String>)>,
    pub failures: Vec<FleetFailure>,
}

impl SearchAllReport {
    /// Per-session failures folded into a single error, if there were any.
    pub fn failure(&self) -> Option<ProcessError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(ProcessError::Fleet(self.failures.clone()))
        }
    }
}

fn fleet_result(failures: Vec<FleetFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ProcessError::Fleet(failures))
    }
}

/// Registry of supervised processes keyed by OS pid.
///
/// The registry lock only guards the map. Operations clone the session `Arc`
/// out and release the lock before touching the session, so a slow kill on
/// one process never blocks lookups of another.
pub struct ProcessSupervisor {
    sessions: RwLock<HashMap<u32, Arc<ProcessSession>>>,
    config: SupervisorConfig,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        rwlock_read_or_recover(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn `command` and register it. Nothing is registered if the spawn
    /// fails.
    pub fn start_process(&self, command: Vec<String>, timeout: Duration) -> Result<u32> {
        if command.is_empty() {
            return Err(ProcessError::Validation(
                "Command cannot be empty".to_string(),
            ));
        }

        let session = Arc::new(ProcessSession::new(command, self.config.clone()));
        let pid = session.start(timeout)?;
        self.register(pid, session);
        Ok(pid)
    }

    fn register(&self, pid: u32, session: Arc<ProcessSession>) {
        let replaced = rwlock_write_or_recover(&self.sessions).insert(pid, session);
        // A reused pid evicts a stale session; its cleanup runs outside the
        // registry lock.
        if let Some(stale) = replaced {
            warn!(pid, "Replacing stale session for reused pid");
            if let Err(e) = stale.cleanup() {
                warn!(pid, error = %e, "Cleanup of stale session failed");
            }
        }
    }

    pub fn get(&self, pid: u32) -> Result<Arc<ProcessSession>> {
        rwlock_read_or_recover(&self.sessions)
            .get(&pid)
            .cloned()
            .ok_or(ProcessError::NotFound(pid))
    }

    fn snapshot(&self) -> Vec<(u32, Arc<ProcessSession>)> {
        let sessions = rwlock_read_or_recover(&self.sessions);
        let mut refs: Vec<(u32, Arc<ProcessSession>)> = sessions
            .iter()
            .map(|(pid, session)| (*pid, Arc::clone(session)))
            .collect();
        refs.sort_by_key(|(pid, _)| *pid);
        refs
    }

    pub fn status_of(&self, pid: u32) -> Result<ProcessStatus> {
        Ok(self.get(pid)?.status())
    }

    pub fn kill(&self, pid: u32, timeout: Duration) -> Result<()> {
        self.get(pid)?.kill(timeout)
    }

    pub fn send_line(&self, pid: u32, text: &str) -> Result<()> {
        self.get(pid)?.send_line(text)
    }

    pub fn send_chars(&self, pid: u32, text: &str) -> Result<()> {
        self.get(pid)?.send_chars(text)
    }

    pub fn output_lines(&self, pid: u32, max_lines: usize) -> Result<Vec<String>> {
        Ok(self.get(pid)?.output_lines(max_lines))
    }

    pub fn search_output(
        &self,
        pid: u32,
        mode: &str,
        pattern: &str,
        max_lines: usize,
    ) -> Result<Vec<String>> {
        self.get(pid)?.search_output(mode, pattern, max_lines)
    }

    /// Kill (if running), clean up and unregister one session.
    pub fn remove(&self, pid: u32, timeout: Duration) -> Result<()> {
        let session = self.get(pid)?;

        if session.state().is_running() {
            if let Err(e) = session.kill(timeout) {
                warn!(pid, error = %e, "Failed to kill process before removal");
            }
        }
        if let Err(e) = session.cleanup() {
            warn!(pid, error = %e, "Cleanup during removal failed");
        }

        rwlock_write_or_recover(&self.sessions).remove(&pid);
        info!(pid, "Process removed");
        Ok(())
    }

    /// Every registered process, rechecked against the OS, ordered by pid.
    pub fn list(&self) -> Vec<ProcessListEntry> {
        self.snapshot()
            .into_iter()
            .map(|(pid, session)| {
                let status = session.status();
                ProcessListEntry {
                    pid,
                    command: status.command,
                    state: status.state,
                }
            })
            .collect()
    }

    /// Kill every running process concurrently. Every session is attempted;
    /// failures are reported together.
    pub fn kill_all(&self, timeout: Duration) -> Result<()> {
        let running: Vec<(u32, Arc<ProcessSession>)> = self
            .snapshot()
            .into_iter()
            .filter(|(_, session)| session.state().is_running())
            .collect();

        if running.is_empty() {
            return Ok(());
        }
        info!(count = running.len(), "Killing all running processes");

        let failures = thread::scope(|scope| {
            let handles: Vec<_> = running
                .iter()
                .map(|(pid, session)| (*pid, scope.spawn(move || session.kill(timeout))))
                .collect();

            handles
                .into_iter()
                .filter_map(|(pid, handle)| match handle.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(FleetFailure::new(pid, &e)),
                    Err(_) => Some(FleetFailure {
                        pid,
                        message: "kill panicked".to_string(),
                    }),
                })
                .collect::<Vec<_>>()
        });

        fleet_result(failures)
    }

    /// Clean up and unregister every session that is no longer running.
    pub fn remove_all(&self) -> Result<()> {
        let mut failures = Vec::new();

        for (pid, session) in self.snapshot() {
            if session.state().is_running() {
                continue;
            }
            if let Err(e) = session.cleanup() {
                failures.push(FleetFailure::new(pid, &e));
            }
            rwlock_write_or_recover(&self.sessions).remove(&pid);
            info!(pid, "Process removed");
        }

        fleet_result(failures)
    }

    /// Search every session's output with one compiled pattern. Sessions
    /// without matches are left out; sessions whose lock could not be taken
    /// within the configured lock timeout are reported as failures.
    pub fn search_all(
        &self,
        mode: &str,
        pattern: &str,
        per_pid_limit: usize,
    ) -> Result<SearchAllReport> {
        let matcher = LineMatcher::parse(mode, pattern)?;
        let mut report = SearchAllReport::default();

        for (pid, session) in self.snapshot() {
            match session.search_with_timeout(&matcher, per_pid_limit, self.config.lock_timeout) {
                Ok(lines) if lines.is_empty() => {}
                Ok(lines) => report.matches.push((pid, lines)),
                Err(e) => {
                    warn!(pid, error = %e, "Search skipped process");
                    report.failures.push(FleetFailure::new(pid, &e));
                }
            }
        }

        Ok(report)
    }

    /// Kill everything, then release every session.
    pub fn shutdown(&self, timeout: Duration) -> Result<()> {
        info!(count = self.len(), "Shutting down supervisor");
        let mut failures = Vec::new();

        if let Err(e) = self.kill_all(timeout) {
            warn!(error = %e, "Failed to kill every process");
        }
        if let Err(ProcessError::Fleet(mut remove_failures)) = self.remove_all() {
            failures.append(&mut remove_failures);
        }

        // Whatever survived kill_all is still registered here.
        let remaining: Vec<(u32, Arc<ProcessSession>)> = {
            let mut sessions = rwlock_write_or_recover(&self.sessions);
            sessions.drain().collect()
        };
        for (pid, session) in remaining {
            if let Err(e) = session.cleanup() {
                failures.push(FleetFailure::new(pid, &e));
            }
        }

        fleet_result(failures)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Err(e) = self.kill_all(self.config.default_timeout) {
            warn!(error = %e, "Failed to kill every process on drop");
        }
        let sessions = match self.sessions.get_mut() {
            Ok(sessions) => std::mem::take(sessions),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for (pid, session) in sessions {
            if let Err(e) = session.cleanup() {
                warn!(pid, error = %e, "Cleanup on drop failed");
            }
        }
    }
}
