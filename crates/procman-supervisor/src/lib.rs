#![deny(clippy::all)]

//! Supervision of external processes with bounded, searchable output.
//!
//! A [`ProcessSupervisor`] owns a set of [`ProcessSession`]s keyed by pid.
//! Each session captures stdout and stderr into an [`OutputBuffer`] through
//! its own reader and assembler threads.

mod capture;
mod config;
mod error;
mod matcher;
mod output_buffer;
pub mod reply;
mod session;
mod supervisor;
mod types;

pub use config::SupervisorConfig;
pub use error::FleetFailure;
pub use error::ProcessError;
pub use error::SpawnErrorKind;
pub use matcher::LineMatcher;
pub use matcher::SearchMode;
pub use output_buffer::OutputBuffer;
pub use session::ProcessSession;
pub use supervisor::ProcessSupervisor;
pub use supervisor::SearchAllReport;
pub use types::ErrorDetail;
pub use types::ProcessListEntry;
pub use types::ProcessStatus;
pub use types::SessionState;
pub use types::StreamSource;

pub type Result<T> = std::result::Result<T, ProcessError>;
