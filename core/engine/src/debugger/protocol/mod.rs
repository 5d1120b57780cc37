//! Engine-side debug protocol.
//!
//! Clients speak JSON messages with a request/response/event envelope:
//!
//! ```text
//! {"seq": 1, "type": "request", "command": "evaluate", "arguments": {"expression": "1 + 1"}}
//! {"seq": 1, "type": "response", "request_seq": 1, "command": "evaluate", "success": true, "body": {"result": "2"}}
//! ```
//!
//! Messages may be sent back to back as raw JSON or each preceded by a
//! `Content-Length` header; see [`framing`]. The debugger server never looks
//! inside these messages, so framing is handled entirely here.

pub mod framing;
pub mod messages;
pub mod processor;

pub use framing::{DecodeError, Frame, Framing, MessageDecoder};
pub use processor::Processor;

use serde::{Deserialize, Serialize};

/// Debug protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolMessage {
    /// A command sent by the client.
    #[serde(rename = "request")]
    Request(Request),
    /// The engine's answer to a request.
    #[serde(rename = "response")]
    Response(Response),
    /// A notification not tied to a request.
    #[serde(rename = "event")]
    Event(Event),
}

/// Request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number chosen by the client.
    pub seq: i64,
    /// Command name.
    pub command: String,
    /// Command specific arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// Response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number chosen by the engine.
    pub seq: i64,
    /// Sequence number of the request being answered, 0 if the request could
    /// not be decoded.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Command name of the request.
    pub command: String,
    /// Error message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Command specific result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Event message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number chosen by the sender.
    pub seq: i64,
    /// Event name.
    pub event: String,
    /// Event specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl ProtocolMessage {
    /// The message's own sequence number.
    #[must_use]
    pub fn seq(&self) -> i64 {
        match self {
            Self::Request(r) => r.seq,
            Self::Response(r) => r.seq,
            Self::Event(e) => e.seq,
        }
    }

    /// The value of the `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
        }
    }
}
