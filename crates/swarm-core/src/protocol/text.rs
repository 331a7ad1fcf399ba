//! Incremental UTF-8 decoding for inbound client chunks.
//!
//! Clients send plain text, but TCP delivers it in whatever chunks the
//! network produces.  A multi-byte character (for example `é`, two bytes)
//! can straddle two reads.  [`TextDecoder`] holds back the incomplete tail of
//! one chunk and prepends it to the next, so a split character decodes
//! correctly.
//!
//! This is character-level continuity only.  Message boundaries are *not*
//! reconstructed: every decoded chunk is surfaced as-is.
//!
//! Bytes that can never form valid UTF-8 (for example `0xFF`) are reported as
//! [`TextDecodeError::InvalidUtf8`]; the session treats that like a stream
//! error and closes.

use thiserror::Error;

/// Errors produced while decoding an inbound byte stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TextDecodeError {
    /// The stream contains a byte sequence that is not valid UTF-8.
    #[error("invalid UTF-8 at byte {offset} of the current chunk")]
    InvalidUtf8 { offset: usize },

    /// The stream ended in the middle of a multi-byte character.
    #[error("stream ended inside a multi-byte character ({pending} byte(s) pending)")]
    Truncated { pending: usize },
}

/// Stateful UTF-8 decoder for one client stream.
#[derive(Debug, Default)]
pub struct TextDecoder {
    /// Incomplete trailing bytes of the previous chunk (at most 3).
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, prepending any bytes held back from the previous call.
    ///
    /// The returned string may be empty when the whole chunk is the start of
    /// a character whose remaining bytes have not arrived yet.
    ///
    /// # Errors
    ///
    /// Returns [`TextDecodeError::InvalidUtf8`] if the combined bytes contain
    /// an invalid sequence.  The decoder should be discarded afterwards.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, TextDecodeError> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let err = match String::from_utf8(bytes) {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        let utf8_err = err.utf8_error();
        let valid_up_to = utf8_err.valid_up_to();
        if utf8_err.error_len().is_some() {
            return Err(TextDecodeError::InvalidUtf8 {
                offset: valid_up_to,
            });
        }

        // `error_len() == None`: the input ends with an incomplete sequence.
        let mut bytes = err.into_bytes();
        self.pending = bytes.split_off(valid_up_to);
        String::from_utf8(bytes).map_err(|e| TextDecodeError::InvalidUtf8 {
            offset: e.utf8_error().valid_up_to(),
        })
    }

    /// Number of bytes currently held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Checks that the stream did not end inside a character.
    ///
    /// # Errors
    ///
    /// Returns [`TextDecodeError::Truncated`] if bytes are still pending.
    pub fn finish(&self) -> Result<(), TextDecodeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(TextDecodeError::Truncated {
                pending: self.pending.len(),
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
