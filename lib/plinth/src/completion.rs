use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot rendezvous between a producer thread and one or more waiting
/// threads. The producer calls `set` exactly once; waiters block until the
/// value arrives or their deadline expires.
pub struct Completion<T> {
    value: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T: Clone> Completion<T> {
    #[inline]
    pub fn new() -> Completion<T> {
        Completion {
            value: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// Publishes the value and wakes all waiters. A second `set` keeps the
    /// first value so that racing producers cannot change the outcome
    /// observed by waiters.
    pub fn set(&self, value: T) {
        let mut slot = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if slot.is_none() {
            *slot = Some(value);
        }

        self.cond.notify_all();
    }

    /// Returns true if a value has been published.
    pub fn is_set(&self) -> bool {
        match self.value.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Blocks until the value is published.
    pub fn wait(&self) -> T {
        let mut slot = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }

            slot = match self.cond.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Blocks until the value is published or the timeout expires. Returns
    /// `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;

        let mut slot = match self.value.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        loop {
            if let Some(value) = slot.as_ref() {
                return Some(value.clone());
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (guard, _) = match self.cond.wait_timeout(slot, deadline - now) {
                Ok(result) => result,
                Err(poisoned) => {
                    let (guard, result) = poisoned.into_inner();
                    (guard, result)
                }
            };
            slot = guard;
        }
    }
}
