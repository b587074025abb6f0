//! Keystroke debuffering for wedge scanners.
//!
//! A wedge scanner "types" the QR payload as a burst of keydown events
//! terminated by Enter. [`KeystrokeDebuffer`] accumulates printable keys and
//! flushes them as one logical scan on Enter. If no key arrives within the
//! inactivity window the pending buffer is dropped, since slow input is a
//! human at the keyboard rather than a scanner burst.
//!
//! The debuffer is clock-agnostic: callers pass `now` explicitly, and the
//! inactivity reset is applied lazily on the next key. The observable result
//! is the same as a timer firing at the deadline.
//!
//! ```
//! use std::time::{Duration, Instant};
//! use kiosk_scanner::{KeyEvent, KeyInput, KeystrokeDebuffer};
//!
//! let mut debuffer = KeystrokeDebuffer::new(Duration::from_millis(100));
//! let t0 = Instant::now();
//!
//! assert_eq!(debuffer.push(&KeyEvent::page(KeyInput::Char('A')), t0), None);
//! assert_eq!(debuffer.push(&KeyEvent::page(KeyInput::Char('1')), t0), None);
//! assert_eq!(
//!     debuffer.push(&KeyEvent::page(KeyInput::Enter), t0),
//!     Some("A1".to_string())
//! );
//! ```

use std::time::{Duration, Instant};

use kiosk_core::constants::KEYSTROKE_TIMEOUT_MS;
use tracing::trace;

use crate::traits::{FocusTarget, KeyEvent, KeyInput};

/// Accumulates wedge scanner keystrokes into logical scans.
#[derive(Debug, Clone)]
pub struct KeystrokeDebuffer {
    buffer: String,
    last_key_at: Option<Instant>,
    timeout: Duration,
}

impl KeystrokeDebuffer {
    /// Create a debuffer with a custom inactivity window.
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: String::new(),
            last_key_at: None,
            timeout,
        }
    }

    /// Feed one keydown event.
    ///
    /// Returns the flushed payload when an Enter key completes a non-empty
    /// buffer. Events whose focus is inside a text input are ignored and
    /// leave the buffer untouched.
    pub fn push(&mut self, event: &KeyEvent, now: Instant) -> Option<String> {
        if event.focus == FocusTarget::TextInput {
            return None;
        }

        self.expire(now);

        match &event.key {
            KeyInput::Char(c) if event.key.is_printable() => {
                self.buffer.push(*c);
                self.last_key_at = Some(now);
                None
            }
            KeyInput::Enter if !self.buffer.is_empty() => {
                self.last_key_at = None;
                let payload = std::mem::take(&mut self.buffer);
                trace!(len = payload.len(), "Keystroke buffer flushed");
                Some(payload)
            }
            _ => None,
        }
    }

    /// Drop the pending buffer if the inactivity window has elapsed.
    pub fn expire(&mut self, now: Instant) {
        if let Some(last) = self.last_key_at
            && now.saturating_duration_since(last) > self.timeout
        {
            if !self.buffer.is_empty() {
                trace!(
                    discarded = self.buffer.len(),
                    "Keystroke buffer reset after inactivity"
                );
            }
            self.buffer.clear();
            self.last_key_at = None;
        }
    }

    /// Characters accumulated so far.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// When the pending buffer will be dropped if no key arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_key_at.map(|last| last + self.timeout)
    }
}

impl Default for KeystrokeDebuffer {
    fn default() -> Self {
        Self::new(Duration::from_millis(KEYSTROKE_TIMEOUT_MS))
    }
}
