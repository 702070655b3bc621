//! Wire format for group event messages.
//!
//! Every message travels under the transport message type
//! [`GROUP_EVENT_MESSAGE_TYPE`] as a JSON envelope:
//!
//! ```json
//! {"type": "vote", "sessionId": "group_…", "sender": "peer-a",
//!  "data": {"choiceId": "a", "totalVotes": 1, "canAdvance": false, "votes": {"a": 1}},
//!  "timestamp": "2026-01-15T10:00:00Z"}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use troupe_catalog::{Choice, Template};
use troupe_core::error::DecodeError;

/// Transport message type carrying every group event message.
pub const GROUP_EVENT_MESSAGE_TYPE: &str = "group_event";

/// The five group event message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Invite,
    Join,
    Vote,
    Advance,
    End,
}

impl MessageKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Join => "join",
            Self::Vote => "vote",
            Self::Advance => "advance",
            Self::End => "end",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "invite" => Some(Self::Invite),
            "join" => Some(Self::Join),
            "vote" => Some(Self::Vote),
            "advance" => Some(Self::Advance),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Announces a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub template_id: String,
    pub template_name: String,
    pub description: String,
    pub min_participants: usize,
    pub max_participants: usize,
    /// Whole seconds.
    pub estimated_time: u64,
}

impl InvitePayload {
    /// Describes `template` for prospective participants.
    #[must_use]
    pub fn for_template(template: &Template) -> Self {
        Self {
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            description: template.description.clone(),
            min_participants: template.min_participants,
            max_participants: template.max_participants,
            estimated_time: template.estimated_time_secs,
        }
    }
}

/// Announces the participant roster after a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub participant_count: usize,
    pub participants: Vec<String>,
}

/// Announces a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub choice_id: String,
    pub total_votes: usize,
    pub can_advance: bool,
    pub votes: BTreeMap<String, u32>,
}

/// Announces a phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancePayload {
    pub new_phase: String,
    pub phase_description: String,
    pub choices: Vec<Choice>,
    pub scores: BTreeMap<String, i64>,
}

/// Announces the end of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndPayload {
    pub final_scores: BTreeMap<String, i64>,
    /// Whole seconds.
    pub duration: u64,
    /// `false` when the session was cancelled or expired.
    pub completed: bool,
}

/// Typed data of a group event message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Invite(InvitePayload),
    Join(JoinPayload),
    Vote(VotePayload),
    Advance(AdvancePayload),
    End(EndPayload),
}

impl MessageBody {
    /// The kind of this body.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Invite(_) => MessageKind::Invite,
            Self::Join(_) => MessageKind::Join,
            Self::Vote(_) => MessageKind::Vote,
            Self::Advance(_) => MessageKind::Advance,
            Self::End(_) => MessageKind::End,
        }
    }
}

/// A decoded group event message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub session_id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    session_id: String,
    sender: String,
    data: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl WireMessage {
    /// The kind of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Serializes the message to its JSON envelope.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these types.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let data = match &self.body {
            MessageBody::Invite(p) => serde_json::to_value(p),
            MessageBody::Join(p) => serde_json::to_value(p),
            MessageBody::Vote(p) => serde_json::to_value(p),
            MessageBody::Advance(p) => serde_json::to_value(p),
            MessageBody::End(p) => serde_json::to_value(p),
        }
        .expect("payload serialization is infallible");
        let envelope = Envelope {
            kind: self.kind().as_str().to_owned(),
            session_id: self.session_id.clone(),
            sender: self.sender.clone(),
            data,
            timestamp: self.timestamp,
        };
        serde_json::to_vec(&envelope).expect("envelope serialization is infallible")
    }

    /// Parses a JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Malformed` if the envelope is not valid JSON of
    /// the expected shape, `DecodeError::UnknownMessageType` for an
    /// unrecognised `type`, and `DecodeError::Payload` if `data` does not
    /// match the type's schema.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let kind = MessageKind::parse(&envelope.kind)
            .ok_or_else(|| DecodeError::UnknownMessageType(envelope.kind.clone()))?;
        let body = decode_body(kind, envelope.data).map_err(|e| DecodeError::Payload {
            kind: kind.as_str(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            session_id: envelope.session_id,
            sender: envelope.sender,
            timestamp: envelope.timestamp,
            body,
        })
    }
}

fn decode_body(kind: MessageKind, data: serde_json::Value) -> Result<MessageBody, serde_json::Error> {
    Ok(match kind {
        MessageKind::Invite => MessageBody::Invite(serde_json::from_value(data)?),
        MessageKind::Join => MessageBody::Join(serde_json::from_value(data)?),
        MessageKind::Vote => MessageBody::Vote(serde_json::from_value(data)?),
        MessageKind::Advance => MessageBody::Advance(serde_json::from_value(data)?),
        MessageKind::End => MessageBody::End(serde_json::from_value(data)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_encode_uses_camel_case_envelope() {
        // Arrange
        let message = WireMessage {
            session_id: "group_1".to_owned(),
            sender: "peer-a".to_owned(),
            timestamp: timestamp(),
            body: MessageBody::Vote(VotePayload {
                choice_id: "a".to_owned(),
                total_votes: 1,
                can_advance: false,
                votes: BTreeMap::from([("a".to_owned(), 1)]),
            }),
        };

        // Act
        let value: serde_json::Value = serde_json::from_slice(&message.encode()).unwrap();

        // Assert
        assert_eq!(value["type"], "vote");
        assert_eq!(value["sessionId"], "group_1");
        assert_eq!(value["sender"], "peer-a");
        assert_eq!(value["data"]["choiceId"], "a");
        assert_eq!(value["data"]["totalVotes"], 1);
        assert_eq!(value["data"]["canAdvance"], false);
        assert_eq!(value["data"]["votes"]["a"], 1);
    }

    #[test]
    fn test_decode_end_message() {
        let bytes = serde_json::to_vec(&json!({
            "type": "end",
            "sessionId": "group_1",
            "sender": "peer-a",
            "data": {"finalScores": {"p1": 2, "p2": 5}, "duration": 300, "completed": true},
            "timestamp": "2026-01-15T10:00:00Z"
        }))
        .unwrap();

        let message = WireMessage::decode(&bytes).unwrap();

        assert_eq!(message.kind(), MessageKind::End);
        assert_eq!(message.timestamp, timestamp());
        let MessageBody::End(end) = message.body else {
            panic!("expected end body");
        };
        assert_eq!(end.final_scores["p2"], 5);
        assert_eq!(end.duration, 300);
        assert!(end.completed);
    }

    #[test]
    fn test_decode_advance_carries_choices() {
        let bytes = serde_json::to_vec(&json!({
            "type": "advance",
            "sessionId": "group_1",
            "sender": "peer-a",
            "data": {
                "newPhase": "choose",
                "phaseDescription": "Pick one",
                "choices": [{"id": "a", "text": "A", "points": 2}],
                "scores": {"p1": 0}
            },
            "timestamp": "2026-01-15T10:00:00Z"
        }))
        .unwrap();

        let message = WireMessage::decode(&bytes).unwrap();

        let MessageBody::Advance(advance) = message.body else {
            panic!("expected advance body");
        };
        assert_eq!(advance.new_phase, "choose");
        assert_eq!(advance.choices[0].points, 2);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let bytes = serde_json::to_vec(&json!({
            "type": "kick",
            "sessionId": "group_1",
            "sender": "peer-a",
            "data": {},
            "timestamp": "2026-01-15T10:00:00Z"
        }))
        .unwrap();

        let result = WireMessage::decode(&bytes);

        assert!(matches!(result, Err(DecodeError::UnknownMessageType(kind)) if kind == "kick"));
    }

    #[test]
    fn test_decode_rejects_mismatched_payload() {
        let bytes = serde_json::to_vec(&json!({
            "type": "join",
            "sessionId": "group_1",
            "sender": "peer-a",
            "data": {"choiceId": "a"},
            "timestamp": "2026-01-15T10:00:00Z"
        }))
        .unwrap();

        let result = WireMessage::decode(&bytes);

        assert!(matches!(result, Err(DecodeError::Payload { kind: "join", .. })));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = WireMessage::decode(b"not json");

        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }
}
