//! Supervisor errors.
//!
//! Every error carries a semantic code, a category and structured context so
//! a tool transport can hand callers something they can act on.

use std::fmt;
use std::io;

use procman_common::error_codes::{self, ErrorCategory};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Classification of an OS-level spawn failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    MalformedCommand,
    Other,
}

impl SpawnErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => SpawnErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => SpawnErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => SpawnErrorKind::MalformedCommand,
            _ => SpawnErrorKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnErrorKind::NotFound => "not_found",
            SpawnErrorKind::PermissionDenied => "permission_denied",
            SpawnErrorKind::MalformedCommand => "malformed_command",
            SpawnErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for SpawnErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpawnErrorKind::NotFound => "Command not found",
            SpawnErrorKind::PermissionDenied => "Permission denied",
            SpawnErrorKind::MalformedCommand => "Invalid command format",
            SpawnErrorKind::Other => "Subprocess error",
        };
        f.write_str(label)
    }
}

/// One failed session inside a fan-out operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetFailure {
    pub pid: u32,
    pub message: String,
}

impl FleetFailure {
    pub fn new(pid: u32, err: &ProcessError) -> Self {
        Self {
            pid,
            message: err.to_string(),
        }
    }
}

fn join_failures(failures: &[FleetFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("PID {}: {}", f.pid, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{0}")]
    Validation(String),
    #[error("{kind}: {reason}")]
    Spawn { kind: SpawnErrorKind, reason: String },
    #[error("Process not found: pid={0}")]
    NotFound(u32),
    #[error("Cannot {operation}: {reason}")]
    State {
        operation: &'static str,
        reason: String,
    },
    #[error("Invalid search pattern: {0}")]
    Search(String),
    #[error("Process {pid} did not terminate within {timeout_ms}ms")]
    Timeout { pid: u32, timeout_ms: u64 },
    #[error("Failed to write to stdin of process {pid}: {reason}")]
    Input { pid: u32, reason: String },
    #[error("Timed out waiting for the lock of process {0}")]
    LockTimeout(u32),
    #[error("{}", join_failures(.0))]
    Fleet(Vec<FleetFailure>),
}

impl ProcessError {
    pub(crate) fn state(operation: &'static str, reason: impl Into<String>) -> Self {
        ProcessError::State {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn spawn(err: &io::Error) -> Self {
        ProcessError::Spawn {
            kind: SpawnErrorKind::from_io(err),
            reason: err.to_string(),
        }
    }

    /// Returns the semantic error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ProcessError::Validation(_) => error_codes::VALIDATION_ERROR,
            ProcessError::Spawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => error_codes::COMMAND_NOT_FOUND,
                SpawnErrorKind::PermissionDenied => error_codes::PERMISSION_DENIED,
                SpawnErrorKind::MalformedCommand => error_codes::MALFORMED_COMMAND,
                SpawnErrorKind::Other => error_codes::SPAWN_ERROR,
            },
            ProcessError::NotFound(_) => error_codes::PROCESS_NOT_FOUND,
            ProcessError::State { .. } => error_codes::INVALID_STATE,
            ProcessError::Search(_) => error_codes::SEARCH_PATTERN_ERROR,
            ProcessError::Timeout { .. } => error_codes::KILL_TIMEOUT,
            ProcessError::Input { .. } => error_codes::INPUT_ERROR,
            ProcessError::LockTimeout(_) => error_codes::LOCK_TIMEOUT,
            ProcessError::Fleet(_) => error_codes::PARTIAL_FAILURE,
        }
    }

    /// Returns the error category for programmatic handling.
    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    /// Returns structured context about the error for debugging.
    pub fn context(&self) -> Value {
        match self {
            ProcessError::Validation(reason) => json!({ "reason": reason }),
            ProcessError::Spawn { kind, reason } => {
                json!({ "operation": "spawn", "kind": kind.as_str(), "reason": reason })
            }
            ProcessError::NotFound(pid) => json!({ "pid": pid }),
            ProcessError::State { operation, reason } => {
                json!({ "operation": operation, "reason": reason })
            }
            ProcessError::Search(reason) => json!({ "reason": reason }),
            ProcessError::Timeout { pid, timeout_ms } => {
                json!({ "pid": pid, "timeout_ms": timeout_ms })
            }
            ProcessError::Input { pid, reason } => json!({ "pid": pid, "reason": reason }),
            ProcessError::LockTimeout(pid) => json!({ "pid": pid }),
            ProcessError::Fleet(failures) => json!({ "failures": failures }),
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        error_codes::is_retryable(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_kind_from_io() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert_eq!(SpawnErrorKind::from_io(&not_found), SpawnErrorKind::NotFound);

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            SpawnErrorKind::from_io(&denied),
            SpawnErrorKind::PermissionDenied
        );

        let nul = io::Error::new(io::ErrorKind::InvalidInput, "nul byte found");
        assert_eq!(
            SpawnErrorKind::from_io(&nul),
            SpawnErrorKind::MalformedCommand
        );

        let other = io::Error::new(io::ErrorKind::OutOfMemory, "oom");
        assert_eq!(SpawnErrorKind::from_io(&other), SpawnErrorKind::Other);
    }

    #[test]
    fn test_spawn_error_message_is_prefixed() {
        let err = ProcessError::spawn(&io::Error::new(io::ErrorKind::NotFound, "no such file"));
        assert_eq!(err.to_string(), "Command not found: no such file");
        assert_eq!(err.code(), error_codes::COMMAND_NOT_FOUND);
        assert_eq!(err.category(), ErrorCategory::External);
    }

    #[test]
    fn test_fleet_error_lists_every_pid() {
        let err = ProcessError::Fleet(vec![
            FleetFailure::new(10, &ProcessError::NotFound(10)),
            FleetFailure::new(
                20,
                &ProcessError::Timeout {
                    pid: 20,
                    timeout_ms: 500,
                },
            ),
        ]);
        assert_eq!(
            err.to_string(),
            "PID 10: Process not found: pid=10; PID 20: Process 20 did not terminate within 500ms"
        );
        assert_eq!(err.context()["failures"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ProcessError::Timeout {
            pid: 1,
            timeout_ms: 10
        }
        .is_retryable());
        assert!(ProcessError::LockTimeout(1).is_retryable());
        assert!(!ProcessError::NotFound(1).is_retryable());
        assert!(!ProcessError::state("kill", "Process not running").is_retryable());
    }

    #[test]
    fn test_context_carries_identifiers() {
        let err = ProcessError::Input {
            pid: 42,
            reason: "Broken pipe".to_string(),
        };
        assert_eq!(err.context(), json!({ "pid": 42, "reason": "Broken pipe" }));
        assert_eq!(err.category(), ErrorCategory::External);
    }
}
