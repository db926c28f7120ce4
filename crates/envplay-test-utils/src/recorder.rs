//! Shared, clonable event log for callback-driven tests.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Append-only log shared between a callback implementation and the test
/// that inspects it.
#[derive(Debug)]
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: T) {
        self.lock().push(event);
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<T> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Poll until `pred` holds for the log, advancing Tokio time in 1 ms
    /// steps. Gives up after `limit` and returns whether it held.
    pub async fn wait_for(&self, limit: Duration, pred: impl Fn(&[T]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if pred(&self.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
