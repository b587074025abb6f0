//! Request Dedup Tracker.
//!
//! A keyed in-flight guard: while a request with a given key is running, a
//! second request with the same key fails fast with
//! [`ApiError::DuplicateRequest`] instead of reaching the server. The
//! registration form keys submissions by exhibition and phone number so a
//! visitor double-tapping "submit" produces one registration.
//!
//! ```
//! use kiosk_api::RequestDedupTracker;
//!
//! let tracker = RequestDedupTracker::new();
//! assert!(tracker.start("expo-1:5581999990000"));
//! assert!(!tracker.start("expo-1:5581999990000"));
//! tracker.complete("expo-1:5581999990000");
//! assert!(tracker.start("expo-1:5581999990000"));
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{ApiError, Result};

/// Dedup key for a registration submission.
///
/// Phone numbers are reduced to their digits so formatting differences
/// (`+55 (81) 99999-0000` vs `5581999990000`) map to the same key.
pub fn registration_key(exhibition_id: &str, phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{}:{}", exhibition_id.trim(), digits)
}

/// Set of request keys currently in flight.
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct RequestDedupTracker {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RequestDedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` in flight.
    ///
    /// Returns `false` if a request with the same key is already in flight.
    pub fn start(&self, key: &str) -> bool {
        let inserted = self.keys().insert(key.to_string());
        if !inserted {
            debug!(key, "Duplicate request suppressed");
        }
        inserted
    }

    /// Clear `key`. Clearing a key that is not in flight is a no-op.
    pub fn complete(&self, key: &str) {
        self.keys().remove(key);
    }

    /// Whether a request with `key` is currently in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    /// Number of requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.keys().len()
    }

    /// Mark `key` in flight and return a guard that clears it on drop.
    pub fn begin(&self, key: &str) -> Option<InFlight> {
        self.start(key).then(|| InFlight {
            tracker: self.clone(),
            key: key.to_string(),
        })
    }

    /// Run `operation` unless a request with the same key is in flight.
    ///
    /// The key is cleared when the operation finishes, including when it
    /// fails or the returned future is dropped early.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::DuplicateRequest` without polling `operation` if
    /// the key is already in flight; otherwise the operation's own result.
    pub async fn run_exclusive<F, T>(&self, key: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(_guard) = self.begin(key) else {
            return Err(ApiError::DuplicateRequest(key.to_string()));
        };
        operation.await
    }
}

/// Clears its key from the tracker when dropped.
#[derive(Debug)]
pub struct InFlight {
    tracker: RequestDedupTracker,
    key: String,
}

impl InFlight {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.tracker.complete(&self.key);
    }
}
