//! Scan source trait definitions.
//!
//! Two input channels feed the kiosk: camera decoders that hand over a fully
//! decoded payload per frame event, and USB keyboard-wedge scanners that
//! type the payload one keystroke at a time. These traits are the contract
//! between those devices and the [`ScanSourceAdapter`](crate::ScanSourceAdapter).
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro. They are not object-safe;
//! use the enum wrappers in [`devices`](crate::devices) for dynamic dispatch.

#![allow(async_fn_in_trait)]

use crate::error::Result;

/// A single key press reported by a wedge scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyInput {
    /// A single printable character.
    Char(char),

    /// Enter/Return, which wedge scanners send as the code terminator.
    Enter,

    /// Any other key (modifiers, arrows, function keys). Never buffered.
    Other(String),
}

impl KeyInput {
    /// Map one byte of a raw keystroke stream to a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_scanner::KeyInput;
    ///
    /// assert_eq!(KeyInput::from_byte(b'A'), KeyInput::Char('A'));
    /// assert_eq!(KeyInput::from_byte(b'\r'), KeyInput::Enter);
    /// ```
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'\r' | b'\n' => Self::Enter,
            0x20..=0x7E => Self::Char(byte as char),
            other => Self::Other(format!("0x{other:02X}")),
        }
    }

    /// Whether this key contributes a character to the scan buffer.
    pub fn is_printable(&self) -> bool {
        matches!(self, Self::Char(c) if !c.is_control())
    }
}

/// Where keyboard focus was when the key was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusTarget {
    /// The kiosk page itself; keystrokes are scanner input.
    #[default]
    Page,

    /// A text field; keystrokes belong to the operator's typing.
    TextInput,
}

/// A keydown event with its focus context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyInput,
    pub focus: FocusTarget,
}

impl KeyEvent {
    /// Keydown with focus on the kiosk page.
    pub fn page(key: KeyInput) -> Self {
        Self {
            key,
            focus: FocusTarget::Page,
        }
    }

    /// Keydown with focus inside a text input.
    pub fn in_text_input(key: KeyInput) -> Self {
        Self {
            key,
            focus: FocusTarget::TextInput,
        }
    }
}

/// USB keyboard-wedge scanner.
///
/// # Examples
///
/// ```no_run
/// use kiosk_scanner::traits::{WedgeScanner, KeyInput};
/// use kiosk_scanner::Result;
///
/// async fn read_until_enter<W: WedgeScanner>(scanner: &mut W) -> Result<String> {
///     let mut code = String::new();
///     loop {
///         match scanner.read_key().await?.key {
///             KeyInput::Char(c) => code.push(c),
///             KeyInput::Enter => return Ok(code),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait WedgeScanner: Send {
    /// Wait for the next keydown event.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::Disconnected` once the device stops producing input.
    async fn read_key(&mut self) -> Result<KeyEvent>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}

/// Camera QR decoder.
///
/// The decoder is responsible for its own decode-rate limiting; every
/// returned payload becomes one logical scan.
pub trait CameraDecoder: Send {
    /// Wait for the next decoded payload.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::Disconnected` once the decoder stops.
    async fn next_decode(&mut self) -> Result<String>;

    /// Human-readable device name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b'0', KeyInput::Char('0'))]
    #[case(b' ', KeyInput::Char(' '))]
    #[case(b'~', KeyInput::Char('~'))]
    #[case(b'\n', KeyInput::Enter)]
    #[case(b'\r', KeyInput::Enter)]
    #[case(0x1B, KeyInput::Other("0x1B".to_string()))]
    fn test_from_byte(#[case] byte: u8, #[case] expected: KeyInput) {
        assert_eq!(KeyInput::from_byte(byte), expected);
    }

    #[test]
    fn test_printable() {
        assert!(KeyInput::Char('x').is_printable());
        assert!(!KeyInput::Char('\u{7}').is_printable());
        assert!(!KeyInput::Enter.is_printable());
        assert!(!KeyInput::Other("Shift".into()).is_printable());
    }
}
