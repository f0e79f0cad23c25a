//! Message envelope and closed taxonomy.
//!
//! A `Message` is immutable once constructed: payload shape is validated at
//! construction and after decoding, never at use. The taxonomy is a closed
//! enum — adding a kind is a protocol version change, not a runtime
//! extension point. Transport and delivery are external collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// The closed set of message kinds agents exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Inform,
    Propose,
    Agree,
    Refuse,
    Confirm,
    Failure,
    Done,
    Route,
    Discover,
    Offer,
    Assign,
}

impl MessageKind {
    /// The payload field this kind requires, if any.
    ///
    /// Kinds without a structured requirement accept any JSON object.
    fn required_payload_field(&self) -> Option<&'static str> {
        match self {
            Self::Request => Some("action"),
            Self::Propose => Some("proposal"),
            Self::Refuse => Some("reason"),
            Self::Failure => Some("error"),
            Self::Done => Some("result"),
            Self::Offer => Some("offer"),
            Self::Assign => Some("assignee"),
            Self::Route => Some("destination"),
            Self::Inform | Self::Agree | Self::Confirm | Self::Discover => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Inform => "inform",
            Self::Propose => "propose",
            Self::Agree => "agree",
            Self::Refuse => "refuse",
            Self::Confirm => "confirm",
            Self::Failure => "failure",
            Self::Done => "done",
            Self::Route => "route",
            Self::Discover => "discover",
            Self::Offer => "offer",
            Self::Assign => "assign",
        };
        write!(f, "{s}")
    }
}

/// An immutable inter-agent message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind from the closed taxonomy.
    pub kind: MessageKind,
    /// Sending agent.
    pub sender: String,
    /// Receiving agent.
    pub receiver: String,
    /// Correlates a request/response pair.
    pub conversation_id: Uuid,
    /// Kind-specific structured content.
    pub payload: serde_json::Value,
    /// When the message was constructed.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Construct a message with a fresh conversation id.
    pub fn new(
        kind: MessageKind,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self, ProtocolError> {
        Self::with_conversation(kind, sender, receiver, payload, Uuid::new_v4())
    }

    /// Construct a message correlated to an existing conversation.
    pub fn with_conversation(
        kind: MessageKind,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: serde_json::Value,
        conversation_id: Uuid,
    ) -> Result<Self, ProtocolError> {
        validate_payload(kind, &payload)?;
        Ok(Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            conversation_id,
            payload,
            timestamp: Utc::now(),
        })
    }

    /// Encode to bytes. `deserialize(serialize(m)) == m` for every valid message.
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from bytes, re-validating the payload shape.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_slice(bytes)?;
        validate_payload(message.kind, &message.payload)?;
        Ok(message)
    }

    /// Build a reply of the given kind: sender/receiver swapped, same
    /// conversation id. The factory for correlated pairs — callers never
    /// bookkeep conversation ids by hand.
    pub fn reply(
        &self,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Result<Self, ProtocolError> {
        Self::with_conversation(
            kind,
            self.receiver.clone(),
            self.sender.clone(),
            payload,
            self.conversation_id,
        )
    }

    /// Confirm this message.
    pub fn confirm(&self) -> Result<Self, ProtocolError> {
        self.reply(MessageKind::Confirm, serde_json::json!({}))
    }

    /// Agree to this message.
    pub fn agree(&self) -> Result<Self, ProtocolError> {
        self.reply(MessageKind::Agree, serde_json::json!({}))
    }

    /// Refuse this message with a reason.
    pub fn refuse(&self, reason: impl Into<String>) -> Result<Self, ProtocolError> {
        self.reply(
            MessageKind::Refuse,
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    /// Report failure of the work this message asked for.
    pub fn failure(&self, error: impl Into<String>) -> Result<Self, ProtocolError> {
        self.reply(
            MessageKind::Failure,
            serde_json::json!({ "error": error.into() }),
        )
    }

    /// Report successful completion with a result payload.
    pub fn done(&self, result: serde_json::Value) -> Result<Self, ProtocolError> {
        self.reply(MessageKind::Done, serde_json::json!({ "result": result }))
    }
}

/// Validate a payload against the shape its kind requires.
fn validate_payload(kind: MessageKind, payload: &serde_json::Value) -> Result<(), ProtocolError> {
    let Some(object) = payload.as_object() else {
        return Err(ProtocolError::PayloadNotObject {
            kind: kind.to_string(),
        });
    };

    if let Some(field) = kind.required_payload_field()
        && !object.contains_key(field)
    {
        return Err(ProtocolError::MissingPayloadField {
            kind: kind.to_string(),
            field: field.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_valid_request() {
        let msg = Message::new(
            MessageKind::Request,
            "planner",
            "scheduler",
            serde_json::json!({"action": "open_app"}),
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::Request);
        assert_eq!(msg.sender, "planner");
        assert_eq!(msg.receiver, "scheduler");
    }

    #[test]
    fn request_requires_action_field() {
        let result = Message::new(
            MessageKind::Request,
            "a",
            "b",
            serde_json::json!({"other": 1}),
        );
        assert!(matches!(
            result,
            Err(ProtocolError::MissingPayloadField { .. })
        ));
    }

    #[test]
    fn propose_requires_proposal_body() {
        let result = Message::new(MessageKind::Propose, "a", "b", serde_json::json!({}));
        assert!(matches!(
            result,
            Err(ProtocolError::MissingPayloadField { field, .. }) if field == "proposal"
        ));
    }

    #[test]
    fn failure_requires_error_description() {
        let result = Message::new(MessageKind::Failure, "a", "b", serde_json::json!({}));
        assert!(result.is_err());

        let ok = Message::new(
            MessageKind::Failure,
            "a",
            "b",
            serde_json::json!({"error": "node timed out"}),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn payload_must_be_object() {
        let result = Message::new(MessageKind::Inform, "a", "b", serde_json::json!("bare"));
        assert!(matches!(result, Err(ProtocolError::PayloadNotObject { .. })));
    }

    #[test]
    fn unconstrained_kinds_accept_any_object() {
        for kind in [
            MessageKind::Inform,
            MessageKind::Agree,
            MessageKind::Confirm,
            MessageKind::Discover,
        ] {
            assert!(Message::new(kind, "a", "b", serde_json::json!({"x": 1})).is_ok());
        }
    }

    #[test]
    fn serialize_roundtrip_every_kind() {
        let cases: Vec<(MessageKind, serde_json::Value)> = vec![
            (MessageKind::Request, serde_json::json!({"action": "go"})),
            (MessageKind::Inform, serde_json::json!({"note": "hi"})),
            (MessageKind::Propose, serde_json::json!({"proposal": {"cost": 3}})),
            (MessageKind::Agree, serde_json::json!({})),
            (MessageKind::Refuse, serde_json::json!({"reason": "busy"})),
            (MessageKind::Confirm, serde_json::json!({})),
            (MessageKind::Failure, serde_json::json!({"error": "boom"})),
            (MessageKind::Done, serde_json::json!({"result": [1, 2]})),
            (MessageKind::Route, serde_json::json!({"destination": "worker-2"})),
            (MessageKind::Discover, serde_json::json!({})),
            (MessageKind::Offer, serde_json::json!({"offer": "slot"})),
            (MessageKind::Assign, serde_json::json!({"assignee": "worker-1"})),
        ];
        for (kind, payload) in cases {
            let msg = Message::new(kind, "a", "b", payload).unwrap();
            let bytes = msg.serialize().unwrap();
            let parsed = Message::deserialize(&bytes).unwrap();
            assert_eq!(parsed, msg);
        }
    }

    #[test]
    fn deserialize_rejects_unknown_kind() {
        let raw = serde_json::json!({
            "kind": "gossip",
            "sender": "a",
            "receiver": "b",
            "conversation_id": Uuid::new_v4(),
            "payload": {},
            "timestamp": Utc::now(),
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(matches!(
            Message::deserialize(&bytes),
            Err(ProtocolError::Codec(_))
        ));
    }

    #[test]
    fn deserialize_revalidates_payload() {
        // Bytes claiming to be a Failure without an error field must not decode.
        let raw = serde_json::json!({
            "kind": "failure",
            "sender": "a",
            "receiver": "b",
            "conversation_id": Uuid::new_v4(),
            "payload": {},
            "timestamp": Utc::now(),
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(matches!(
            Message::deserialize(&bytes),
            Err(ProtocolError::MissingPayloadField { .. })
        ));
    }

    #[test]
    fn confirm_echoes_conversation_id() {
        let request = Message::new(
            MessageKind::Request,
            "planner",
            "scheduler",
            serde_json::json!({"action": "plan"}),
        )
        .unwrap();

        let confirm = request.confirm().unwrap();
        assert_eq!(confirm.kind, MessageKind::Confirm);
        assert_eq!(confirm.conversation_id, request.conversation_id);
        assert_eq!(confirm.sender, "scheduler");
        assert_eq!(confirm.receiver, "planner");
    }

    #[test]
    fn failure_reply_carries_error() {
        let request = Message::new(
            MessageKind::Request,
            "a",
            "b",
            serde_json::json!({"action": "x"}),
        )
        .unwrap();
        let failure = request.failure("disk full").unwrap();
        assert_eq!(failure.kind, MessageKind::Failure);
        assert_eq!(failure.payload["error"], "disk full");
        assert_eq!(failure.conversation_id, request.conversation_id);
    }

    #[test]
    fn refuse_reply_carries_reason() {
        let offer = Message::new(
            MessageKind::Offer,
            "broker",
            "worker",
            serde_json::json!({"offer": "job-7"}),
        )
        .unwrap();
        let refuse = offer.refuse("at capacity").unwrap();
        assert_eq!(refuse.payload["reason"], "at capacity");
    }

    #[test]
    fn kind_serde_snake_case() {
        let json = serde_json::to_string(&MessageKind::Assign).unwrap();
        assert_eq!(json, "\"assign\"");
        let parsed: MessageKind = serde_json::from_str("\"discover\"").unwrap();
        assert_eq!(parsed, MessageKind::Discover);
    }
}
