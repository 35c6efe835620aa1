//! Shared helpers for process-level tests.

#![allow(dead_code)]

use std::thread;
use std::time::Duration;
use std::time::Instant;

use procman_supervisor::ProcessSupervisor;
use procman_supervisor::SupervisorConfig;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn supervisor() -> ProcessSupervisor {
    supervisor_with(SupervisorConfig::from_env())
}

pub fn supervisor_with(config: SupervisorConfig) -> ProcessSupervisor {
    procman_common::init_tracing("warn");
    ProcessSupervisor::new(
        config
            .with_poll_interval(Duration::from_millis(20))
            .with_kill_poll_interval(Duration::from_millis(10))
            .with_lock_timeout(Duration::from_secs(2)),
    )
}

pub fn cmd(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Poll `condition` until it holds or `TIMEOUT` elapses.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

pub fn wait_until_finished(supervisor: &ProcessSupervisor, pid: u32) -> bool {
    wait_for(|| {
        supervisor
            .status_of(pid)
            .map(|status| status.state.is_terminal())
            .unwrap_or(false)
    })
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // Signal 0 only checks that the pid exists.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
