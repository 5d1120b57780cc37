//! Message framing for the debug protocol.
//!
//! Command bytes arrive in arbitrary chunks: one chunk may hold several
//! messages, or only part of one. [`MessageDecoder`] buffers the bytes and
//! yields complete messages. Two framings are accepted, and may be mixed:
//!
//! - raw JSON values, optionally separated by whitespace;
//! - `Content-Length: <n>\r\n\r\n` followed by `n` bytes of JSON.

use serde_json::error::Category;
use thiserror::Error;

use super::ProtocolMessage;

const CONTENT_LENGTH: &[u8] = b"Content-Length:";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Headers longer than this without a terminating blank line are rejected.
const MAX_HEADER_LEN: usize = 1024;

/// Largest accepted message body, in bytes.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// How a message was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// A bare JSON value.
    Raw,
    /// A JSON value preceded by a `Content-Length` header.
    ContentLength,
}

/// A decoded message together with its framing.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// How the message was framed.
    pub framing: Framing,
    /// The message.
    pub message: ProtocolMessage,
}

/// Errors produced while decoding. The decoder discards its buffer on error.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes were not a valid protocol message.
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    /// A `Content-Length` header was malformed.
    #[error("invalid header: {0}")]
    Header(String),
    /// A message is larger than [`MAX_MESSAGE_LEN`].
    #[error("message of {0} bytes exceeds the {max} byte limit", max = MAX_MESSAGE_LEN)]
    TooLarge(usize),
}

/// Incremental decoder for debug protocol messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buffer: Vec<u8>,
}

impl MessageDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet decoded.
    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partially received message.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Decodes the next complete message, or returns `None` if more bytes are
    /// needed.
    pub fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>> {
        let start = self
            .buffer
            .iter()
            .position(|byte| !byte.is_ascii_whitespace())
            .unwrap_or(self.buffer.len());
        self.buffer.drain(..start);

        let first = *self.buffer.first()?;
        let result = if first == b'C' {
            self.next_with_header()
        } else {
            match self.next_raw() {
                None if self.buffer.len() > MAX_MESSAGE_LEN => {
                    Some(Err(DecodeError::TooLarge(self.buffer.len())))
                }
                result => result,
            }
        };

        if let Some(Err(_)) = &result {
            self.buffer.clear();
        }
        result
    }

    fn next_raw(&mut self) -> Option<Result<Frame, DecodeError>> {
        let mut stream =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<ProtocolMessage>();
        let message = match stream.next()? {
            Ok(message) => message,
            Err(err) if err.classify() == Category::Eof => return None,
            Err(err) => return Some(Err(err.into())),
        };
        let consumed = stream.byte_offset();
        self.buffer.drain(..consumed);

        Some(Ok(Frame {
            framing: Framing::Raw,
            message,
        }))
    }

    fn next_with_header(&mut self) -> Option<Result<Frame, DecodeError>> {
        if self.buffer.len() < CONTENT_LENGTH.len() {
            return if CONTENT_LENGTH.starts_with(&self.buffer) {
                None
            } else {
                Some(Err(self.header_error("expected Content-Length")))
            };
        }
        if !self.buffer.starts_with(CONTENT_LENGTH) {
            return Some(Err(self.header_error("expected Content-Length")));
        }

        let Some(header_len) = self
            .buffer
            .windows(HEADER_END.len())
            .position(|window| window == HEADER_END)
        else {
            return if self.buffer.len() > MAX_HEADER_LEN {
                Some(Err(DecodeError::Header("header too long".to_owned())))
            } else {
                None
            };
        };

        let content_length = match parse_content_length(&self.buffer[..header_len]) {
            Ok(length) => length,
            Err(err) => return Some(Err(err)),
        };

        if content_length > MAX_MESSAGE_LEN {
            return Some(Err(DecodeError::TooLarge(content_length)));
        }

        let body_start = header_len + HEADER_END.len();
        let body_end = body_start + content_length;
        if self.buffer.len() < body_end {
            return None;
        }

        let message = serde_json::from_slice::<ProtocolMessage>(&self.buffer[body_start..body_end]);
        self.buffer.drain(..body_end);

        Some(
            message
                .map(|message| Frame {
                    framing: Framing::ContentLength,
                    message,
                })
                .map_err(DecodeError::from),
        )
    }

    fn header_error(&self, reason: &str) -> DecodeError {
        let preview = String::from_utf8_lossy(&self.buffer[..self.buffer.len().min(32)]);
        DecodeError::Header(format!("{reason}, found {preview:?}"))
    }
}

fn parse_content_length(header: &[u8]) -> Result<usize, DecodeError> {
    let header = std::str::from_utf8(header)
        .map_err(|_| DecodeError::Header("header is not UTF-8".to_owned()))?;

    header
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:"))
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| DecodeError::Header(format!("invalid Content-Length in {header:?}")))
}

/// Serializes `message` using `framing`.
///
/// # Errors
///
/// Fails only if the message body cannot be represented as JSON.
pub fn encode(message: &ProtocolMessage, framing: Framing) -> serde_json::Result<String> {
    let json = serde_json::to_string(message)?;
    Ok(match framing {
        Framing::Raw => json,
        Framing::ContentLength => format!("Content-Length: {}\r\n\r\n{json}", json.len()),
    })
}
