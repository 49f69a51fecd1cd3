//! Message parser capability and the built-in parsers.
//!
//! A [`MessageParser`] turns one framed line into one message. Any error it
//! returns is swallowed by the read loop and the line is dropped.

use serde_json::Value;

use crate::{AppError, Result};

/// Maps one framed, trimmed, non-empty line to a message.
pub trait MessageParser: Send + Sync + 'static {
    /// Parsed message type delivered to subscribers.
    type Message: Clone + Send + 'static;

    /// Parse a single line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Parse`] when the line is not a valid message.
    fn parse(&self, line: &str) -> Result<Self::Message>;
}

/// Delivers every line unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParser;

impl MessageParser for TextParser {
    type Message = String;

    fn parse(&self, line: &str) -> Result<String> {
        Ok(line.to_owned())
    }
}

/// Parses each line as a JSON document (NDJSON).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl MessageParser for JsonParser {
    type Message = Value;

    fn parse(&self, line: &str) -> Result<Value> {
        serde_json::from_str(line).map_err(|e| AppError::Parse(format!("malformed json: {e}")))
    }
}
