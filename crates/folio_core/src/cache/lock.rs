use log::warn;
use std::sync::{Mutex, MutexGuard};

/// Locks `lock`, recovering the guard when another thread panicked while
/// holding it.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                "event=lock_poisoned module={target} op={op} status=recovered lock_kind=mutex"
            );
            poisoned.into_inner()
        }
    }
}
