use std::sync::OnceLock;

use tokio::sync::Notify;

/// Single-assignment, multi-reader register.
///
/// `set` succeeds exactly once; a second call panics, since id reuse or a
/// duplicated confirmation event is a programming bug rather than a runtime
/// condition. Readers either block on [`get`](Self::get) until the value
/// arrives or sample it with [`peek`](Self::peek).
pub struct WriteOnce<T> {
    value: OnceLock<T>,
    ready: Notify,
}

impl<T: Clone> WriteOnce<T> {
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            ready: Notify::new(),
        }
    }

    /// Publishes the value and wakes every waiting reader.
    ///
    /// # Panics
    /// If the register was already set.
    pub fn set(&self, value: T) {
        if self.value.set(value).is_err() {
            panic!("write-once register set twice");
        }
        self.ready.notify_waiters();
    }

    /// Waits until the register is set and returns a copy of the value.
    pub async fn get(&self) -> T {
        loop {
            // Register interest before re-checking so a concurrent `set`
            // between the check and the await cannot be missed.
            let notified = self.ready.notified();
            if let Some(value) = self.value.get() {
                return value.clone();
            }
            notified.await;
        }
    }

    /// Returns the value if already set, without waiting.
    pub fn peek(&self) -> Option<&T> {
        self.value.get()
    }
}

impl<T: Clone> Default for WriteOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}
