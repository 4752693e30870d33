//! JSON wire codec for the signaling channel
//!
//! Frames are JSON objects discriminated by `type`. Call-control types are
//! decoded into [`SignalingEvent`]; chat types are recognised and passed
//! over; anything else is a [`ProtocolError`].

use super::message::{ChatKind, SignalType, SignalingEvent};
use crate::domain::shared::error::ProtocolError;
use crate::domain::shared::value_objects::SessionId;
use serde_json::{Map, Value};

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Call control, consumed by the call core
    Call(SignalingEvent),
    /// Chat traffic sharing the channel
    Chat(ChatKind),
    /// Error reported by the relay about one of our frames. Call-control
    /// rejections name the session and message type they refer to.
    RelayError {
        code: String,
        message: String,
        session_id: Option<SessionId>,
        rejected: Option<SignalType>,
    },
}

/// Relay error code for a recipient with no open connection
pub const PEER_NOT_FOUND: &str = "PEER_NOT_FOUND";

/// Encode an outbound call-control message
pub fn encode(event: &SignalingEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Decode an inbound text frame
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::InvalidJson("frame is not a JSON object".to_string()));
    };

    let kind = match fields.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingType),
    };

    if SignalType::from_wire(&kind).is_some() {
        normalize_ids(&mut fields);
        let event: SignalingEvent =
            serde_json::from_value(Value::Object(fields)).map_err(|e| ProtocolError::Malformed {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
        if event.session_id.as_str().trim().is_empty() {
            return Err(ProtocolError::Malformed {
                kind,
                reason: "empty sessionId".to_string(),
            });
        }
        return Ok(Inbound::Call(event));
    }

    if let Some(chat) = ChatKind::from_wire(&kind) {
        return Ok(Inbound::Chat(chat));
    }

    if kind == "error" {
        let text_field = |name: &str| {
            fields
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let session_id = fields
            .get("sessionId")
            .and_then(Value::as_str)
            .and_then(|raw| SessionId::parse(raw).ok());
        let rejected = fields
            .get("rejectedType")
            .and_then(Value::as_str)
            .and_then(SignalType::from_wire);
        return Ok(Inbound::RelayError {
            code: text_field("code"),
            message: text_field("message"),
            session_id,
            rejected,
        });
    }

    Err(ProtocolError::UnknownType(kind))
}

/// Web clients send numeric user ids; the core treats every id as a string.
fn normalize_ids(fields: &mut Map<String, Value>) {
    for key in ["sessionId", "fromUserId", "toUserId"] {
        if let Some(Value::Number(n)) = fields.get(key) {
            let as_text = n.to_string();
            fields.insert(key.to_string(), Value::String(as_text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::value_object::MediaKind;
    use crate::domain::shared::value_objects::{SessionId, UserId};

    #[test]
    fn test_encode_uses_camel_case_fields() {
        let event = SignalingEvent::new(
            SignalType::Initiate,
            SessionId::parse("s-1").unwrap(),
            UserId::from(1),
            UserId::from(42),
            MediaKind::Video,
        );

        let json = encode(&event).unwrap();
        assert!(json.contains(r#""type":"initiate""#));
        assert!(json.contains(r#""sessionId":"s-1""#));
        assert!(json.contains(r#""fromUserId":"1""#));
        assert!(json.contains(r#""toUserId":"42""#));
        assert!(json.contains(r#""mediaKind":"video""#));

        assert_eq!(decode(&json).unwrap(), Inbound::Call(event));
    }

    #[test]
    fn test_decode_accepts_numeric_user_ids() {
        let frame = r#"{"type":"accept","sessionId":"abc","fromUserId":42,"toUserId":1,"mediaKind":"audio"}"#;

        match decode(frame).unwrap() {
            Inbound::Call(event) => {
                assert_eq!(event.kind, SignalType::Accept);
                assert_eq!(event.from_user_id, UserId::from(42));
                assert_eq!(event.to_user_id, UserId::from(1));
                assert_eq!(event.media_kind, MediaKind::Audio);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_decode_chat_types_are_passed_over() {
        let frame = r#"{"type":"text","from":"7","to":"1","content":"hello"}"#;
        assert_eq!(decode(frame).unwrap(), Inbound::Chat(ChatKind::Text));

        let frame = r#"{"type":"notification","title":"Station 12 opened"}"#;
        assert_eq!(decode(frame).unwrap(), Inbound::Chat(ChatKind::Notification));
    }

    #[test]
    fn test_decode_relay_error() {
        let frame = r#"{"type":"error","code":"PEER_NOT_FOUND","message":"user 9 is offline"}"#;
        assert_eq!(
            decode(frame).unwrap(),
            Inbound::RelayError {
                code: "PEER_NOT_FOUND".to_string(),
                message: "user 9 is offline".to_string(),
                session_id: None,
                rejected: None,
            }
        );
    }

    #[test]
    fn test_decode_relay_error_for_call_message() {
        let frame = r#"{"type":"error","code":"PEER_NOT_FOUND","message":"user 9 is offline","sessionId":"s-7","rejectedType":"initiate"}"#;
        match decode(frame).unwrap() {
            Inbound::RelayError {
                code,
                session_id,
                rejected,
                ..
            } => {
                assert_eq!(code, PEER_NOT_FOUND);
                assert_eq!(session_id, Some(SessionId::parse("s-7").unwrap()));
                assert_eq!(rejected, Some(SignalType::Initiate));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(decode("not json"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(decode("[1,2]"), Err(ProtocolError::InvalidJson(_))));
        assert_eq!(decode(r#"{"sessionId":"x"}"#), Err(ProtocolError::MissingType));
        assert_eq!(
            decode(r#"{"type":"offer","sdp":"v=0"}"#),
            Err(ProtocolError::UnknownType("offer".to_string()))
        );
        assert!(matches!(
            decode(r#"{"type":"end","sessionId":"x","fromUserId":"1"}"#),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"end","sessionId":"","fromUserId":"1","toUserId":"2","mediaKind":"audio"}"#),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"end","sessionId":"x","fromUserId":"1","toUserId":"2","mediaKind":"screen"}"#),
            Err(ProtocolError::Malformed { .. })
        ));
    }
}
