//! Semantic error codes for supervisor errors.
//!
//! Codes sit in the JSON-RPC server error range so a tool transport can pass
//! them through unchanged:
//! - -32000 to -32099: Server errors (we use -32001 to -32020 for domain errors)

// Request errors
pub const VALIDATION_ERROR: i32 = -32001;
pub const SEARCH_PATTERN_ERROR: i32 = -32002;

// Process lookup and lifecycle errors
pub const PROCESS_NOT_FOUND: i32 = -32003;
pub const INVALID_STATE: i32 = -32004;
pub const LOCK_TIMEOUT: i32 = -32007;

// Spawn errors
pub const COMMAND_NOT_FOUND: i32 = -32014;
pub const PERMISSION_DENIED: i32 = -32015;
pub const MALFORMED_COMMAND: i32 = -32018;
pub const SPAWN_ERROR: i32 = -32019;

// I/O and timing errors
pub const INPUT_ERROR: i32 = -32008;
pub const KILL_TIMEOUT: i32 = -32013;

// Fan-out errors
pub const PARTIAL_FAILURE: i32 = -32020;

pub const GENERIC_ERROR: i32 = -32000;

/// Error category for programmatic handling by tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Process id not registered
    NotFound,
    /// Invalid input parameters
    InvalidInput,
    /// Resource busy or in the wrong lifecycle state
    Busy,
    /// Internal error
    Internal,
    /// OS-level failure (spawn, pipe)
    External,
    /// Operation timed out
    Timeout,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Busy => "busy",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
            ErrorCategory::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_found" => Ok(ErrorCategory::NotFound),
            "invalid_input" => Ok(ErrorCategory::InvalidInput),
            "busy" => Ok(ErrorCategory::Busy),
            "internal" => Ok(ErrorCategory::Internal),
            "external" => Ok(ErrorCategory::External),
            "timeout" => Ok(ErrorCategory::Timeout),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns whether an error code represents a transient condition.
///
/// Kill timeouts and lock timeouts may succeed when the caller retries.
pub fn is_retryable(code: i32) -> bool {
    matches!(code, KILL_TIMEOUT | LOCK_TIMEOUT)
}

/// Returns the error category for a given error code.
pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        PROCESS_NOT_FOUND => ErrorCategory::NotFound,
        VALIDATION_ERROR | SEARCH_PATTERN_ERROR | MALFORMED_COMMAND => ErrorCategory::InvalidInput,
        INVALID_STATE | LOCK_TIMEOUT => ErrorCategory::Busy,
        COMMAND_NOT_FOUND | PERMISSION_DENIED | SPAWN_ERROR | INPUT_ERROR => {
            ErrorCategory::External
        }
        KILL_TIMEOUT => ErrorCategory::Timeout,
        _ => ErrorCategory::Internal,
    }
}
