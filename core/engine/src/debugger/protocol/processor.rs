//! Debug command processor
//!
//! Runs on the engine worker thread: decodes buffered command bytes, executes
//! each request against the engine's context and produces the encoded
//! responses in order.

use boa_engine::Context;
use thiserror::Error;

use super::framing::{self, DecodeError, Frame, Framing, MessageDecoder};
use super::messages::{
    EvaluateArguments, EvaluateResponseBody, Thread, ThreadsResponseBody, VersionResponseBody,
};
use super::{ProtocolMessage, Request, Response};
use crate::engine::eval_to_json;

/// Why a request failed. The text becomes the response's `message`.
#[derive(Debug, Error)]
enum RequestError {
    #[error("{0}")]
    Decode(#[source] DecodeError),
    #[error("Invalid arguments: {0}")]
    Arguments(#[source] serde_json::Error),
    #[error("{0}")]
    Evaluation(#[source] crate::Error),
    #[error("Failed to serialize: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

type RequestResult = Result<Option<serde_json::Value>, RequestError>;

/// Debug command processor for one engine.
#[derive(Debug)]
pub struct Processor {
    decoder: MessageDecoder,

    /// Sequence number for responses
    seq: i64,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    /// Creates a processor with an empty decode buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoder: MessageDecoder::new(),
            seq: 1,
        }
    }

    /// Forgets buffered bytes and restarts sequence numbering, for a new
    /// debugging session.
    pub fn reset(&mut self) {
        self.decoder.clear();
        self.seq = 1;
    }

    /// Gets the next sequence number
    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Feeds a chunk of command bytes and returns the encoded messages it
    /// produced, in order.
    pub fn process(&mut self, chunk: &[u8], context: &mut Context) -> Vec<String> {
        self.decoder.push(chunk);

        let mut outgoing = Vec::new();
        while let Some(frame) = self.decoder.next_frame() {
            let (response, framing) = match frame {
                Ok(Frame {
                    framing,
                    message: ProtocolMessage::Request(request),
                }) => (self.handle_request(request, context), framing),
                Ok(Frame { message, .. }) => {
                    log::debug!("ignoring {} message from debugger client", message.kind());
                    continue;
                }
                Err(err) => {
                    log::warn!("discarding undecodable debug command: {err}");
                    (
                        self.create_response(0, "", Err(RequestError::Decode(err))),
                        Framing::Raw,
                    )
                }
            };

            match framing::encode(&response, framing) {
                Ok(encoded) => outgoing.push(encoded),
                Err(err) => log::error!("failed to encode debug response: {err}"),
            }
        }
        outgoing
    }

    /// Handles a request and returns its response
    fn handle_request(&mut self, request: Request, context: &mut Context) -> ProtocolMessage {
        log::trace!("debug request {} (seq {})", request.command, request.seq);

        let result = match request.command.as_str() {
            "evaluate" => Self::handle_evaluate(&request, context),
            "version" => Self::handle_version(),
            "threads" => Self::handle_threads(),
            // Execution never pauses, so there is nothing to resume or detach.
            "continue" | "disconnect" => Ok(None),
            _ => Err(RequestError::UnknownCommand(request.command.clone())),
        };

        self.create_response(request.seq, &request.command, result)
    }

    fn handle_evaluate(request: &Request, context: &mut Context) -> RequestResult {
        let args: EvaluateArguments = serde_json::from_value(
            request.arguments.clone().unwrap_or(serde_json::Value::Null),
        )
        .map_err(RequestError::Arguments)?;

        let result = eval_to_json(context, &args.expression).map_err(RequestError::Evaluation)?;
        to_body(&EvaluateResponseBody { result })
    }

    fn handle_version() -> RequestResult {
        to_body(&VersionResponseBody {
            engine: "boa".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    fn handle_threads() -> RequestResult {
        to_body(&ThreadsResponseBody {
            threads: vec![Thread {
                id: 1,
                name: "Main Thread".to_owned(),
            }],
        })
    }

    /// Creates a response message
    fn create_response(
        &mut self,
        request_seq: i64,
        command: &str,
        result: RequestResult,
    ) -> ProtocolMessage {
        let (success, message, body) = match result {
            Ok(body) => (true, None, body),
            Err(err) => (false, Some(err.to_string()), None),
        };

        ProtocolMessage::Response(Response {
            seq: self.next_seq(),
            request_seq,
            success,
            command: command.to_owned(),
            message,
            body,
        })
    }
}

fn to_body<T: serde::Serialize>(body: &T) -> RequestResult {
    serde_json::to_value(body)
        .map(Some)
        .map_err(RequestError::Serialize)
}
