//! Message protocol definitions
//!
//! Flat JSON protocol with two shapes: `ClientMessage` (client → server) and
//! `Broadcast` (server → client). Control traffic is carried in-band as
//! reserved message tokens.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Maximum user ID length
pub const USER_ID_LEN: usize = 5;
/// Maximum address length carried in a broadcast
pub const ADDRESS_LEN: usize = 15;
/// Maximum text length of a client message
pub const CLIENT_MESSAGE_LEN: usize = 80;
/// Maximum text length of a broadcast
pub const BROADCAST_MESSAGE_LEN: usize = 40;

/// First message a client must send to join
pub const REGISTER_TOKEN: &str = ">>hello<<";
/// Client leaves the chat
pub const QUIT_TOKEN: &str = ">>bye<<";
/// Reply to an accepted registration
pub const SUCCESS_TOKEN: &str = ">>success<<";
/// Reply to a refused registration
pub const FAILED_TOKEN: &str = ">>failed<<";

/// Client → Server message
///
/// Missing fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientMessage {
    #[serde(rename = "clientUserID")]
    pub client_user_id: String,
    pub message: String,
}

impl ClientMessage {
    /// Build a message, truncating both fields to their wire bounds
    pub fn new(user_id: &str, text: &str) -> Self {
        Self {
            client_user_id: truncate_chars(user_id, USER_ID_LEN),
            message: truncate_chars(text, CLIENT_MESSAGE_LEN),
        }
    }

    /// Parse one frame. Over-long fields are truncated, not rejected.
    pub fn decode(frame: &str) -> Result<Self, AppError> {
        let msg: ClientMessage = serde_json::from_str(frame)?;
        Ok(Self::new(&msg.client_user_id, &msg.message))
    }

    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Empty or whitespace-only user ID
    pub fn has_blank_user_id(&self) -> bool {
        self.client_user_id.trim().is_empty()
    }
}

/// Server → Client message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Broadcast {
    #[serde(rename = "clientIP")]
    pub client_ip: String,
    #[serde(rename = "clientUserID")]
    pub client_user_id: String,
    pub message: String,
}

impl Broadcast {
    /// Build a broadcast, truncating every field to its wire bound
    pub fn new(address: &str, user_id: &str, text: &str) -> Self {
        Self {
            client_ip: truncate_chars(address, ADDRESS_LEN),
            client_user_id: truncate_chars(user_id, USER_ID_LEN),
            message: truncate_chars(text, BROADCAST_MESSAGE_LEN),
        }
    }

    /// Server reply with empty origin fields
    pub fn reply(token: &str) -> Self {
        Self::new("", "", token)
    }

    pub fn decode(frame: &str) -> Result<Self, AppError> {
        let bcast: Broadcast = serde_json::from_str(frame)?;
        Ok(Self::new(&bcast.client_ip, &bcast.client_user_id, &bcast.message))
    }

    pub fn encode(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// True for a server reply carrying `token`
    pub fn is_reply(&self, token: &str) -> bool {
        self.client_ip.is_empty() && self.client_user_id.is_empty() && self.message == token
    }
}

/// Keep at most `max` characters, never cutting inside a UTF-8 sequence
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"clientUserID":"alice","message":">>hello<<"}"#;
        let msg = ClientMessage::decode(json).unwrap();
        assert_eq!(msg.client_user_id, "alice");
        assert_eq!(msg.message, REGISTER_TOKEN);
    }

    #[test]
    fn test_client_message_missing_fields_default_empty() {
        let msg = ClientMessage::decode(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(msg.client_user_id, "");
        assert!(msg.has_blank_user_id());

        let msg = ClientMessage::decode("{}").unwrap();
        assert_eq!(msg, ClientMessage::default());
    }

    #[test]
    fn test_client_message_malformed_is_error() {
        assert!(matches!(
            ClientMessage::decode("not json"),
            Err(AppError::Json(_))
        ));
        assert!(ClientMessage::decode("").is_err());
    }

    #[test]
    fn test_client_message_truncates_long_fields() {
        let long_text = "x".repeat(120);
        let json = format!(r#"{{"clientUserID":"abcdefgh","message":"{}"}}"#, long_text);
        let msg = ClientMessage::decode(&json).unwrap();
        assert_eq!(msg.client_user_id, "abcde");
        assert_eq!(msg.message.chars().count(), CLIENT_MESSAGE_LEN);
    }

    #[test]
    fn test_blank_user_id() {
        assert!(ClientMessage::new("   ", "x").has_blank_user_id());
        assert!(ClientMessage::new("\t", "x").has_blank_user_id());
        assert!(!ClientMessage::new(" a ", "x").has_blank_user_id());
    }

    #[test]
    fn test_broadcast_serialize_field_names() {
        let bcast = Broadcast::new("10.0.0.1", "bob", "hi there");
        let json = bcast.encode().unwrap();
        assert_eq!(
            json,
            r#"{"clientIP":"10.0.0.1","clientUserID":"bob","message":"hi there"}"#
        );
    }

    #[test]
    fn test_reply_has_empty_origin() {
        let reply = Broadcast::reply(FAILED_TOKEN);
        let json = reply.encode().unwrap();
        assert_eq!(json, r#"{"clientIP":"","clientUserID":"","message":">>failed<<"}"#);
        assert!(reply.is_reply(FAILED_TOKEN));
        assert!(!reply.is_reply(SUCCESS_TOKEN));
        assert!(!Broadcast::new("1.2.3.4", "a", FAILED_TOKEN).is_reply(FAILED_TOKEN));
    }

    #[test]
    fn test_broadcast_bounds() {
        let bcast = Broadcast::new("fe80::1234:5678:9abc:def0", "abcdefg", &"m".repeat(50));
        assert_eq!(bcast.client_ip.chars().count(), ADDRESS_LEN);
        assert_eq!(bcast.client_user_id, "abcde");
        assert_eq!(bcast.message.chars().count(), BROADCAST_MESSAGE_LEN);
    }

    #[test]
    fn test_broadcast_decode_tolerates_missing_fields() {
        let bcast = Broadcast::decode(r#"{"message":">>success<<"}"#).unwrap();
        assert!(bcast.is_reply(SUCCESS_TOKEN));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
