use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::sync::TryLockError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tracing::warn;

pub const MAX_BACKOFF: Duration = Duration::from_millis(50);

static POISON_RECOVERIES: AtomicUsize = AtomicUsize::new(0);

/// Number of times a poisoned lock has been recovered since process start.
pub fn poison_recovery_count() -> usize {
    POISON_RECOVERIES.load(Ordering::Relaxed)
}

fn note_recovery(kind: &'static str) {
    POISON_RECOVERIES.fetch_add(1, Ordering::Relaxed);
    warn!(lock = kind, "Recovering from poisoned lock");
}

pub fn rwlock_read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_recovery("rwlock-read");
        poisoned.into_inner()
    })
}

pub fn rwlock_write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_recovery("rwlock-write");
        poisoned.into_inner()
    })
}

pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        note_recovery("mutex");
        poisoned.into_inner()
    })
}

/// Extra sleep on top of `backoff`, up to a quarter of it. Fixed per thread,
/// so contending threads wake at different times.
fn jitter_for(backoff: Duration) -> Duration {
    let span = backoff.as_micros() as u64 / 4;
    if span == 0 {
        return Duration::ZERO;
    }
    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    Duration::from_micros(hasher.finish() % span)
}

/// Try to take `lock` for up to `timeout`, backing off exponentially with
/// per-thread jitter between attempts. A poisoned lock is recovered.
pub fn acquire_lock_with_timeout<T>(
    lock: &Mutex<T>,
    timeout: Duration,
) -> Option<MutexGuard<'_, T>> {
    let start = Instant::now();
    let mut backoff = Duration::from_micros(100);

    loop {
        match lock.try_lock() {
            Ok(guard) => return Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => {
                note_recovery("mutex");
                return Some(poisoned.into_inner());
            }
            Err(TryLockError::WouldBlock) => {}
        }

        if start.elapsed() >= timeout {
            return None;
        }

        thread::sleep(backoff + jitter_for(backoff));
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
