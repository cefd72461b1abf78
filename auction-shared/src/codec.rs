//! The line-oriented wire protocol spoken between a client and its session.
//!
//! Each message is exactly one line: a message type followed by
//! space-separated `key=value` tokens.
//!
//! ```text
//! bid item_id=42 bidder=alice amount=150
//! ```
//!
//! Values cannot contain a literal space (the token delimiter), so encoding
//! replaces spaces with underscores and decoding reverses the substitution.
//! This is a lossy transform by construction: a value containing a genuine
//! underscore is indistinguishable from one containing a space. Field
//! values in this protocol (identifiers, item names, numeric amounts) are
//! not expected to need either character; see the Non-goals.

use std::collections::BTreeMap;

/// A single decoded wire message: a type tag plus its ordered fields.
///
/// Fields use a `BTreeMap` so re-encoding a decoded message is
/// deterministic, which keeps tests and logs stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: String,
    pub fields: BTreeMap<String, String>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self { msg_type: msg_type.into(), fields: BTreeMap::new() }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

fn space_to_underscore(value: &str) -> String {
    value.replace(' ', "_")
}

fn underscore_to_space(value: &str) -> String {
    value.replace('_', " ")
}

/// Encode a [`Message`] as a single line, without a trailing newline.
pub fn encode(message: &Message) -> String {
    let mut line = space_to_underscore(&message.msg_type);
    for (key, value) in &message.fields {
        line.push(' ');
        line.push_str(&space_to_underscore(key));
        line.push('=');
        line.push_str(&space_to_underscore(value));
    }
    line
}

/// Decode one line of wire protocol into a [`Message`].
///
/// Malformed tokens (no `=`, or an empty key) are silently dropped rather
/// than rejecting the whole line, matching the protocol's tolerant framing:
/// a single garbled field should not sink an otherwise-valid message.
/// Returns `None` only if the line has no message type at all (empty or
/// all-whitespace line).
pub fn decode(line: &str) -> Option<Message> {
    let mut parts = line.split(char::is_whitespace).filter(|s| !s.is_empty());
    let msg_type = underscore_to_space(parts.next()?);
    let mut message = Message::new(msg_type);

    for token in parts {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        message.fields.insert(underscore_to_space(key), underscore_to_space(value));
    }

    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let msg = Message::new("bid").with_field("item_id", "42").with_field("bidder", "alice");
        let line = encode(&msg);
        assert_eq!(line, "bid bidder=alice item_id=42");
        assert_eq!(decode(&line).unwrap(), msg);
    }

    #[test]
    fn spaces_in_values_survive_the_underscore_transform() {
        let msg = Message::new("register").with_field("name", "Alice Smith");
        let line = encode(&msg);
        assert_eq!(line, "register name=Alice_Smith");
        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.get("name"), Some("Alice Smith"));
    }

    #[test]
    fn decode_drops_malformed_tokens_but_keeps_the_message() {
        let decoded = decode("bid garbage amount=150 =novalue").unwrap();
        assert_eq!(decoded.msg_type, "bid");
        assert_eq!(decoded.fields.len(), 1);
        assert_eq!(decoded.get("amount"), Some("150"));
    }

    #[test]
    fn decode_empty_line_is_none() {
        assert!(decode("").is_none());
        assert!(decode("   ").is_none());
    }

    #[test]
    fn decode_message_with_no_fields() {
        let decoded = decode("ping").unwrap();
        assert_eq!(decoded.msg_type, "ping");
        assert!(decoded.fields.is_empty());
    }

    #[test]
    fn decode_collapses_repeated_spaces() {
        let decoded = decode("bid   amount=150").unwrap();
        assert_eq!(decoded.msg_type, "bid");
        assert_eq!(decoded.get("amount"), Some("150"));
    }

    #[test]
    fn decode_accepts_tab_separated_tokens() {
        let decoded = decode("bid\tamount=150\tbidder=alice").unwrap();
        assert_eq!(decoded.msg_type, "bid");
        assert_eq!(decoded.get("amount"), Some("150"));
        assert_eq!(decoded.get("bidder"), Some("alice"));
    }
}
