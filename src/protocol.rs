//! Wire protocol codec.
//!
//! Frames are JSON objects, one per WebSocket text message. Clients send
//! either a submission (`code` + optional `lang`) or an input line for the
//! running program (`input`); the server replies with output chunks, error
//! text, or a terminal `closed` frame. `input` always takes priority over
//! `code` and is never treated as a new submission.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame received from a client.
#[derive(Debug, PartialEq, Deserialize)]
pub struct ClientFrame {
    pub code: Option<String>,
    pub lang: Option<String>,
    pub input: Option<String>,
}

/// Protocol-level failure, reported to the client as a single error frame.
/// The connection stays open.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Missing code or input field")]
    MissingCode,
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("A program is already running in this session")]
    PipelineBusy,
}

/// Frame sent to a client.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Chunk of the program's standard output.
    Output { output: String },
    /// Stderr chunk, compile diagnostic, or protocol error.
    Error { error: String },
    /// Terminal frame with a human-readable exit summary.
    Closed { closed: bool, output: String },
}

impl ServerFrame {
    pub fn output(chunk: impl Into<String>) -> Self {
        ServerFrame::Output {
            output: chunk.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
        }
    }

    pub fn closed(summary: impl Into<String>) -> Self {
        ServerFrame::Closed {
            closed: true,
            output: summary.into(),
        }
    }
}

/// Decode one client frame from raw message text.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_submission() {
        let frame = decode(r#"{"code": "int main() {}", "lang": "c"}"#).unwrap();
        assert_eq!(frame.code.as_deref(), Some("int main() {}"));
        assert_eq!(frame.lang.as_deref(), Some("c"));
        assert_eq!(frame.input, None);
    }

    #[test]
    fn test_decode_submission_without_lang() {
        let frame = decode(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(frame.code.as_deref(), Some("print(1)"));
        assert_eq!(frame.lang, None);
    }

    #[test]
    fn test_decode_input() {
        let frame = decode(r#"{"input": "hello"}"#).unwrap();
        assert_eq!(frame.input.as_deref(), Some("hello"));
        assert_eq!(frame.code, None);
    }

    #[test]
    fn test_decode_input_alongside_code() {
        // Both fields may arrive in one frame; the caller treats `input` as
        // authoritative, the codec just surfaces both.
        let frame = decode(r#"{"code": "x", "input": "y"}"#).unwrap();
        assert_eq!(frame.code.as_deref(), Some("x"));
        assert_eq!(frame.input.as_deref(), Some("y"));
    }

    #[test]
    fn test_decode_malformed() {
        assert_eq!(decode("not json"), Err(ProtocolError::InvalidJson));
        assert_eq!(decode(r#"{"code": 5}"#), Err(ProtocolError::InvalidJson));
        assert_eq!(decode("[1, 2]"), Err(ProtocolError::InvalidJson));
    }

    #[test]
    fn test_encode_output_frame() {
        let json = serde_json::to_string(&ServerFrame::output("hi\n")).unwrap();
        assert_eq!(json, r#"{"output":"hi\n"}"#);
    }

    #[test]
    fn test_encode_error_frame() {
        let json = serde_json::to_string(&ServerFrame::error("bad")).unwrap();
        assert_eq!(json, r#"{"error":"bad"}"#);
    }

    #[test]
    fn test_encode_closed_frame() {
        let frame = ServerFrame::closed("\nProcess completed with exit code: 0");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"closed":true,"output":"\nProcess completed with exit code: 0"}"#
        );
    }

    #[test]
    fn test_protocol_error_messages() {
        assert_eq!(
            ProtocolError::UnsupportedLanguage("rust".into()).to_string(),
            "Unsupported language: rust"
        );
        assert_eq!(ProtocolError::InvalidJson.to_string(), "Invalid JSON format");
    }
}
