use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BUFFER_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_KILL_POLL_MS: u64 = 100;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SUMMARY_LINES: usize = 5;
const DEFAULT_SUMMARY_CHARS: usize = 300;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Byte budget of each session's output buffer.
    pub buffer_bytes: usize,
    /// How long the assembler waits for output before flushing and
    /// re-checking process liveness.
    pub poll_interval: Duration,
    /// Cadence at which `kill` re-checks for exit.
    pub kill_poll_interval: Duration,
    /// Per-session lock wait used by fan-out operations.
    pub lock_timeout: Duration,
    /// Kill timeout applied to still-running processes when a supervisor is
    /// dropped without an explicit shutdown.
    pub default_timeout: Duration,
    pub summary_lines: usize,
    pub summary_chars: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or<T: FromStr + PartialEq + Default>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|v| *v != T::default())
        .unwrap_or(default)
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        Self {
            buffer_bytes: env_or("PROCMAN_BUFFER_BYTES", DEFAULT_BUFFER_BYTES),
            poll_interval: Duration::from_millis(env_or(
                "PROCMAN_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            kill_poll_interval: Duration::from_millis(env_or(
                "PROCMAN_KILL_POLL_MS",
                DEFAULT_KILL_POLL_MS,
            )),
            lock_timeout: Duration::from_millis(env_or(
                "PROCMAN_LOCK_TIMEOUT_MS",
                DEFAULT_LOCK_TIMEOUT_MS,
            )),
            default_timeout: Duration::from_secs(env_or(
                "PROCMAN_DEFAULT_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            summary_lines: DEFAULT_SUMMARY_LINES,
            summary_chars: DEFAULT_SUMMARY_CHARS,
        }
    }

    pub fn with_buffer_bytes(mut self, bytes: usize) -> Self {
        self.buffer_bytes = bytes.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_kill_poll_interval(mut self, interval: Duration) -> Self {
        self.kill_poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_summary(mut self, lines: usize, chars: usize) -> Self {
        self.summary_lines = lines;
        self.summary_chars = chars;
        self
    }
}
