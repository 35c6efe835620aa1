//! Value types shared by sessions, the supervisor and reply formatting.

use std::fmt;
use std::process::ExitStatus;

use serde::Deserialize;
use serde::Serialize;

/// Why a session ended up in the `Error` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ErrorDetail {
    /// The process exited with a non-zero status.
    ExitCode(i32),
    /// The process was terminated by a signal it did not get from `kill`.
    Signal(i32),
    /// Spawn failure or capture pipeline fault.
    Message(String),
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::ExitCode(code) => write!(f, "exit code {}", code),
            ErrorDetail::Signal(signal) => write!(f, "terminated by signal {}", signal),
            ErrorDetail::Message(message) => write!(f, "{}", message),
        }
    }
}

/// Lifecycle state of a managed process.
///
/// `Initialized` → `Running` on a successful spawn, `Error` on a failed one.
/// `Running` → `Completed` / `Error` once the process has exited and its
/// captured output has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Initialized,
    Running,
    Completed,
    Error { detail: ErrorDetail },
}

impl SessionState {
    pub fn error(detail: ErrorDetail) -> Self {
        SessionState::Error { detail }
    }

    /// Map an observed exit status to the terminal state it implies.
    pub fn from_exit_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => SessionState::Completed,
            Some(code) => SessionState::error(ErrorDetail::ExitCode(code)),
            None => SessionState::error(signal_detail(status)),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initialized => "initialized",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error { detail } => write!(f, "error: {}", detail),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[cfg(unix)]
fn signal_detail(status: ExitStatus) -> ErrorDetail {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => ErrorDetail::Signal(signal),
        None => ErrorDetail::Message(format!("terminated abnormally ({})", status)),
    }
}

#[cfg(not(unix))]
fn signal_detail(status: ExitStatus) -> ErrorDetail {
    ErrorDetail::Message(format!("terminated abnormally ({})", status))
}

/// Which output stream a captured chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub command: Vec<String>,
    pub state: SessionState,
    /// Tail of the most recent committed lines.
    pub last_output: String,
}

/// One row of the supervisor's process listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessListEntry {
    pub pid: u32,
    pub command: Vec<String>,
    pub state: SessionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_matches_wire_form() {
        assert_eq!(SessionState::Initialized.to_string(), "initialized");
        assert_eq!(SessionState::Running.to_string(), "running");
        assert_eq!(SessionState::Completed.to_string(), "completed");
        assert_eq!(
            SessionState::error(ErrorDetail::ExitCode(2)).to_string(),
            "error: exit code 2"
        );
        assert_eq!(
            SessionState::error(ErrorDetail::Signal(9)).to_string(),
            "error: terminated by signal 9"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Initialized.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::error(ErrorDetail::Message("boom".into())).is_terminal());
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(SessionState::error(ErrorDetail::ExitCode(3))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "error", "detail": { "kind": "exit_code", "value": 3 } })
        );

        let json = serde_json::to_value(SessionState::Running).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "running" }));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_exit_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            SessionState::from_exit_status(ExitStatus::from_raw(0)),
            SessionState::Completed
        );
        assert_eq!(
            SessionState::from_exit_status(ExitStatus::from_raw(1 << 8)),
            SessionState::error(ErrorDetail::ExitCode(1))
        );
        assert_eq!(
            SessionState::from_exit_status(ExitStatus::from_raw(9)),
            SessionState::error(ErrorDetail::Signal(9))
        );
    }
}
