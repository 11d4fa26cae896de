//! Line assembly for the USB operator console.
//!
//! Bytes arrive in arbitrary USB packet slices; [`LineAssembler`] turns them
//! into complete UTF-8 lines, honouring backspace and discarding anything
//! past [`MAX_LINE_LEN`] until the next terminator.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::str;

use heapless::{String, Vec};

/// Maximum number of bytes accepted on a single console line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Complete console line handed to the sequencer task.
pub type ConsoleLine = String<MAX_LINE_LEN>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ConsoleError {
    /// Input exceeded [`MAX_LINE_LEN`]; the rest of the line is dropped.
    LineOverflow,
    /// The assembled line was not valid UTF-8.
    InvalidUtf8,
}

impl ConsoleError {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            ConsoleError::LineOverflow => "error: line too long\n",
            ConsoleError::InvalidUtf8 => "error: line is not valid UTF-8\n",
        }
    }
}

/// Accumulates console bytes until a line terminator arrives.
#[derive(Default)]
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    discarding: bool,
}

impl LineAssembler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Drops any partial line, e.g. when the host detaches.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feeds one byte. CR or LF completes the pending line.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::LineOverflow`] once for an over-long line and
    /// [`ConsoleError::InvalidUtf8`] when a completed line is not UTF-8.
    pub fn ingest(&mut self, byte: u8) -> Result<Option<ConsoleLine>, ConsoleError> {
        match byte {
            b'\r' | b'\n' => self.finish_line(),
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            _ if self.discarding => Ok(None),
            value => {
                if self.buffer.push(value).is_err() {
                    self.buffer.clear();
                    self.discarding = true;
                    return Err(ConsoleError::LineOverflow);
                }
                Ok(None)
            }
        }
    }

    fn finish_line(&mut self) -> Result<Option<ConsoleLine>, ConsoleError> {
        if core::mem::take(&mut self.discarding) || self.buffer.is_empty() {
            self.buffer.clear();
            return Ok(None);
        }

        let assembled = str::from_utf8(&self.buffer)
            .map_err(|_| ConsoleError::InvalidUtf8)
            .and_then(|text| {
                let mut line = ConsoleLine::new();
                line.push_str(text.trim())
                    .map_err(|_| ConsoleError::LineOverflow)?;
                Ok(line)
            });
        self.buffer.clear();

        match assembled {
            Ok(line) if line.is_empty() => Ok(None),
            Ok(line) => Ok(Some(line)),
            Err(error) => Err(error),
        }
    }
}
