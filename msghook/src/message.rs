//! Message types and inbound payload validation.
//!
//! The webhook body is checked field by field so that a single rejection can
//! report every problem at once:
//!
//! ```text
//! raw bytes → JSON object → WebhookMessage (validated) → store
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FieldError, ValidationError};

/// Maximum length of `message_id`, in characters.
pub const MAX_MESSAGE_ID_LEN: usize = 255;

/// Maximum length of `text`, in characters.
pub const MAX_TEXT_LEN: usize = 4096;

/// `+` followed by 1 to 15 digits, no leading zero.
static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9][0-9]{0,14}$").expect("valid phone regex"));

/// A stored message as returned by the read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub message_id: String,
    #[serde(rename = "from")]
    pub sender: String,
    #[serde(rename = "to")]
    pub recipient: String,
    pub ts: DateTime<Utc>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A webhook payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub ts: DateTime<Utc>,
    pub text: String,
}

impl WebhookMessage {
    /// Parse and validate a raw JSON request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::single("body", format!("invalid JSON: {e}")))?;

        match value {
            Value::Object(map) => Self::from_object(&map),
            _ => Err(ValidationError::single("body", "expected a JSON object")),
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut errors = Vec::new();

        let message_id = required_str(obj, "message_id", &mut errors).and_then(|id| {
            let len = id.chars().count();
            if len == 0 || len > MAX_MESSAGE_ID_LEN {
                errors.push(FieldError::new(
                    "message_id",
                    format!("must be between 1 and {MAX_MESSAGE_ID_LEN} characters"),
                ));
                None
            } else {
                Some(id.to_string())
            }
        });

        let sender = required_str(obj, "from", &mut errors)
            .and_then(|v| phone_number("from", v, &mut errors));

        let recipient = required_str(obj, "to", &mut errors)
            .and_then(|v| phone_number("to", v, &mut errors));

        let ts = required_str(obj, "ts", &mut errors).and_then(|v| match parse_utc_timestamp(v) {
            Ok(ts) => Some(ts),
            Err(msg) => {
                errors.push(FieldError::new("ts", msg));
                None
            }
        });

        let text = required_str(obj, "text", &mut errors).and_then(|v| {
            if v.chars().count() > MAX_TEXT_LEN {
                errors.push(FieldError::new(
                    "text",
                    format!("must be at most {MAX_TEXT_LEN} characters"),
                ));
                None
            } else {
                Some(v.to_string())
            }
        });

        match (message_id, sender, recipient, ts, text) {
            (Some(message_id), Some(sender), Some(recipient), Some(ts), Some(text))
                if errors.is_empty() =>
            {
                Ok(WebhookMessage {
                    message_id,
                    sender,
                    recipient,
                    ts,
                    text,
                })
            }
            _ => Err(ValidationError::with_fields(errors)),
        }
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "field required"));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.push(FieldError::new(field, "must be a string"));
            None
        }
    }
}

fn phone_number(field: &str, value: &str, errors: &mut Vec<FieldError>) -> Option<String> {
    if PHONE_PATTERN.is_match(value) {
        Some(value.to_string())
    } else {
        errors.push(FieldError::new(
            field,
            "invalid phone number: expected '+' followed by digits",
        ));
        None
    }
}

/// Parse an ISO-8601 timestamp that must be in UTC with a trailing `Z`.
pub fn parse_utc_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if !value.ends_with('Z') {
        return Err("timestamp must be in UTC and end with 'Z'".to_string());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid ISO-8601 timestamp: {e}"))
}

/// Parse an ISO-8601 timestamp with any offset, normalized to UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid ISO-8601 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(err: &ValidationError) -> Vec<&str> {
        err.fields.iter().map(|f| f.field.as_str()).collect()
    }

    #[test]
    fn test_valid_payload() {
        let body = br#"{"message_id":"m1","from":"+1","to":"+2","ts":"2025-01-01T00:00:00Z","text":"hi"}"#;
        let msg = WebhookMessage::from_slice(body).unwrap();

        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.sender, "+1");
        assert_eq!(msg.recipient, "+2");
        assert_eq!(msg.ts, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_extra_fields_ignored() {
        let body = br#"{"message_id":"m1","from":"+919876543210","to":"+14155550100","ts":"2025-01-15T10:00:00Z","text":"","channel":"wa"}"#;
        let msg = WebhookMessage::from_slice(body).unwrap();
        assert_eq!(msg.text, "");
    }

    #[test]
    fn test_invalid_json() {
        let err = WebhookMessage::from_slice(b"{not json").unwrap_err();
        assert_eq!(fields(&err), vec!["body"]);
    }

    #[test]
    fn test_non_object_body() {
        let err = WebhookMessage::from_slice(b"[1,2,3]").unwrap_err();
        assert_eq!(fields(&err), vec!["body"]);
    }

    #[test]
    fn test_all_missing_fields_reported() {
        let err = WebhookMessage::from_slice(b"{}").unwrap_err();
        assert_eq!(fields(&err), vec!["message_id", "from", "to", "ts", "text"]);
    }

    #[test]
    fn test_wrong_types() {
        let body = br#"{"message_id":1,"from":"+1","to":"+2","ts":"2025-01-01T00:00:00Z","text":null}"#;
        let err = WebhookMessage::from_slice(body).unwrap_err();
        assert_eq!(fields(&err), vec!["message_id", "text"]);
        assert_eq!(err.fields[0].message, "must be a string");
        assert_eq!(err.fields[1].message, "field required");
    }

    #[test]
    fn test_phone_validation() {
        let body = br#"{"message_id":"m2","from":"invalid-phone","to":"+0123","ts":"2025-01-15T10:00:00Z","text":"x"}"#;
        let err = WebhookMessage::from_slice(body).unwrap_err();
        assert_eq!(fields(&err), vec!["from", "to"]);
    }

    #[test]
    fn test_timestamp_must_be_utc() {
        let body = br#"{"message_id":"m3","from":"+919876543210","to":"+14155550100","ts":"2025-01-15T10:00:00+05:30","text":"x"}"#;
        let err = WebhookMessage::from_slice(body).unwrap_err();
        assert_eq!(fields(&err), vec!["ts"]);
    }

    #[test]
    fn test_timestamp_must_parse() {
        assert!(parse_utc_timestamp("yesterdayZ").is_err());
        assert!(parse_utc_timestamp("2025-01-15T10:00:00.123Z").is_ok());
    }

    #[test]
    fn test_length_limits() {
        let long_text = "x".repeat(MAX_TEXT_LEN + 1);
        let long_id = "i".repeat(MAX_MESSAGE_ID_LEN + 1);
        let body = serde_json::json!({
            "message_id": long_id,
            "from": "+919876543210",
            "to": "+14155550100",
            "ts": "2025-01-15T10:00:00Z",
            "text": long_text,
        });
        let err = WebhookMessage::from_slice(body.to_string().as_bytes()).unwrap_err();
        assert_eq!(fields(&err), vec!["message_id", "text"]);

        let body = serde_json::json!({
            "message_id": "",
            "from": "+919876543210",
            "to": "+14155550100",
            "ts": "2025-01-15T10:00:00Z",
            "text": "x".repeat(MAX_TEXT_LEN),
        });
        let err = WebhookMessage::from_slice(body.to_string().as_bytes()).unwrap_err();
        assert_eq!(fields(&err), vec!["message_id"]);
    }

    #[test]
    fn test_parse_timestamp_any_offset() {
        let ts = parse_timestamp("2025-01-15T15:30:00+05:30").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_message_serializes_wire_names() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let msg = Message {
            message_id: "m1".into(),
            sender: "+1".into(),
            recipient: "+2".into(),
            ts,
            text: "hi".into(),
            created_at: ts,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["from"], "+1");
        assert_eq!(json["to"], "+2");
        assert_eq!(json["ts"], "2025-01-01T00:00:00Z");
    }
}
