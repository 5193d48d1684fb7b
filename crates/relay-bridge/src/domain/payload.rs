//! Values that travel through a layer chain.
//!
//! A layer chain is not statically typed: each stage receives whatever the
//! previous stage produced.  [`Payload`] tags the runtime shape of that value
//! so converters can check what they were given, and [`Flow`] tells the caller
//! whether the chain should keep going.

use std::fmt;

use relay_core::Packet;
use serde_json::Value;

/// A value flowing through a pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, as read from or written to a transport.
    Bytes(Vec<u8>),
    /// Decoded text.
    Text(String),
    /// A parsed JSON value.
    Json(Value),
    /// A full packet envelope (used by packet-mode sockets such as the Nexus).
    Packet(Packet),
}

/// The variant of a [`Payload`], without its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Bytes,
    Text,
    Json,
    Packet,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Bytes => "bytes",
            PayloadKind::Text => "text",
            PayloadKind::Json => "json",
            PayloadKind::Packet => "packet",
        };
        f.write_str(name)
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bytes(_) => PayloadKind::Bytes,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Json(_) => PayloadKind::Json,
            Payload::Packet(_) => PayloadKind::Packet,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_packet(&self) -> Option<&Packet> {
        match self {
            Payload::Packet(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Packet> for Payload {
    fn from(packet: Packet) -> Self {
        Payload::Packet(packet)
    }
}

/// Result of one pipeline stage.
///
/// `Halt` stops the chain.  Empty strings, `0`, `false` and `null` are all
/// ordinary payloads and travel inside `Continue`.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue(Payload),
    Halt,
}

impl Flow {
    pub fn is_halt(&self) -> bool {
        matches!(self, Flow::Halt)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Flow::Continue(p) => Some(p),
            Flow::Halt => None,
        }
    }

    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Flow::Continue(p) => Some(p),
            Flow::Halt => None,
        }
    }
}

/// Text encodings supported by the bytes↔text converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
            TextEncoding::Latin1 => f.write_str("latin-1"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_falsy_values_are_ordinary_payloads() {
        // Values a truthiness check would mistake for "stop".
        for value in [json!(0), json!(false), json!(""), json!(null)] {
            let flow = Flow::Continue(Payload::Json(value.clone()));
            assert!(!flow.is_halt());
            assert_eq!(flow.into_payload(), Some(Payload::Json(value)));
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Payload::from(vec![1u8]).kind(), PayloadKind::Bytes);
        assert_eq!(Payload::from("x").kind(), PayloadKind::Text);
        assert_eq!(Payload::from(json!(1)).kind(), PayloadKind::Json);
        let packet: Packet = Packet::new("T", Value::Null);
        assert_eq!(Payload::from(packet).kind(), PayloadKind::Packet);
    }

    #[test]
    fn test_halt_has_no_payload() {
        assert!(Flow::Halt.is_halt());
        assert_eq!(Flow::Halt.payload(), None);
    }
}
