//! Scan sources backed by byte streams.
//!
//! Real deployments rarely talk to scanners through a vendor SDK: a wedge
//! scanner in raw mode is a device node producing keystroke bytes, and a
//! camera decoder is usually a helper process printing one payload per line.
//! Both are modelled here over any `AsyncRead`.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Lines};

use crate::traits::{CameraDecoder, KeyEvent, KeyInput, WedgeScanner};
use crate::{Result, ScannerError};

/// Boxed byte source used by the stream-backed devices.
pub type ByteSource = Box<dyn AsyncRead + Unpin + Send>;

/// Wedge scanner reading raw keystroke bytes.
///
/// `\r` and `\n` map to Enter; focus is always the kiosk page since a raw
/// device node has no notion of form fields.
pub struct StreamWedge {
    reader: BufReader<ByteSource>,
    name: String,
}

impl StreamWedge {
    pub fn new(name: impl Into<String>, source: ByteSource) -> Self {
        Self {
            reader: BufReader::new(source),
            name: name.into(),
        }
    }
}

impl std::fmt::Debug for StreamWedge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWedge").field("name", &self.name).finish()
    }
}

impl WedgeScanner for StreamWedge {
    async fn read_key(&mut self) -> Result<KeyEvent> {
        let byte = self.reader.read_u8().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ScannerError::disconnected(self.name.clone())
            } else {
                ScannerError::Io(e)
            }
        })?;
        Ok(KeyEvent::page(KeyInput::from_byte(byte)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Camera decoder emitting one decoded payload per line.
///
/// Blank lines are skipped. A line that is not UTF-8 ends the source with
/// [`ScannerError::InvalidData`].
pub struct LineCamera {
    lines: Lines<BufReader<ByteSource>>,
    name: String,
}

impl LineCamera {
    pub fn new(name: impl Into<String>, source: ByteSource) -> Self {
        Self {
            lines: BufReader::new(source).lines(),
            name: name.into(),
        }
    }
}

impl std::fmt::Debug for LineCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineCamera").field("name", &self.name).finish()
    }
}

impl CameraDecoder for LineCamera {
    async fn next_decode(&mut self) -> Result<String> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    ScannerError::invalid_data(format!("{}: line is not UTF-8", self.name))
                } else {
                    ScannerError::Io(e)
                }
            })?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(line),
                None => return Err(ScannerError::disconnected(self.name.clone())),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
