#![deny(clippy::all)]

pub mod error_codes;
mod sync;
mod telemetry;

pub use sync::acquire_lock_with_timeout;
pub use sync::mutex_lock_or_recover;
pub use sync::poison_recovery_count;
pub use sync::rwlock_read_or_recover;
pub use sync::rwlock_write_or_recover;
pub use sync::MAX_BACKOFF;
pub use telemetry::init_tracing;
