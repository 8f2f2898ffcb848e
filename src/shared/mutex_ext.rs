//! Usage: Poison-tolerant locking for the client's shared state (token cache, refresh queue).
//!
//! A panic in one request task must not wedge every other request behind a
//! poisoned lock, so the guard is recovered and the event logged instead.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Lock the mutex; a poisoned lock is recovered and logged.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;

    /// Run `f` under [`lock_or_recover`](Self::lock_or_recover) and release
    /// the lock before returning.
    fn with_recovered<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| {
            let caller = std::panic::Location::caller();
            tracing::error!(
                state = std::any::type_name::<T>(),
                at = %caller,
                "shared client state poisoned by a panicking task; continuing with last written value"
            );
            self.clear_poison();
            poisoned.into_inner()
        })
    }

    #[track_caller]
    fn with_recovered<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock_or_recover();
        f(&mut guard)
    }
}
