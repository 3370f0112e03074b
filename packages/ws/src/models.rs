use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, EnumString};

/// An inbound event from a connected client.
///
/// The wire shape is `{"type": "...", "payload": {...}}` with
/// SCREAMING_SNAKE_CASE type tags. An unknown type or a payload that does
/// not match the variant's shape fails deserialization and the event is
/// dropped by the caller.
#[derive(Debug, Serialize, Deserialize, Clone, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "type")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundPayload {
    Ping(EmptyPayload),
    JoinCommunity(JoinCommunityPayload),
    LeaveCommunity(LeaveCommunityPayload),
    JoinStudySession(JoinStudySessionPayload),
    LeaveStudySession(LeaveStudySessionPayload),
    SendMessage(SendMessagePayload),
    StartTyping(StartTypingPayload),
    StopTyping(StopTypingPayload),
    StartScreenShare(StartScreenSharePayload),
    StopScreenShare(StopScreenSharePayload),
    WhiteboardUpdate(WhiteboardUpdatePayload),
    CallOffer(CallOfferPayload),
    CallAnswer(CallAnswerPayload),
    IceCandidate(IceCandidatePayload),
    EndCall(EndCallPayload),
    SendNotification(SendNotificationPayload),
    UpdateStatus(UpdateStatusPayload),
}

impl std::fmt::Display for InboundPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmptyPayload {}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinCommunityPayload {
    pub payload: CommunityTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveCommunityPayload {
    pub payload: CommunityTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinStudySessionPayload {
    pub payload: SessionTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveStudySessionPayload {
    pub payload: SessionTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub payload: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartTypingPayload {
    pub payload: CommunityTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingPayload {
    pub payload: CommunityTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartScreenSharePayload {
    pub payload: SessionTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StopScreenSharePayload {
    pub payload: SessionTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardUpdatePayload {
    pub payload: WhiteboardDraw,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallOfferPayload {
    pub payload: CallSdp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallAnswerPayload {
    pub payload: CallSdp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub payload: CallCandidate,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EndCallPayload {
    pub payload: CallTarget,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationPayload {
    pub payload: UserNotification,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusPayload {
    pub payload: StatusUpdate,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommunityTarget {
    pub community_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionTarget {
    pub session_id: String,
}

/// Which kind of room a chat message targets.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageScope {
    Community,
    Session,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub scope: MessageScope,
    pub target_id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardDraw {
    pub session_id: String,
    pub draw_data: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallSdp {
    pub target_user_id: String,
    pub sdp: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallCandidate {
    pub target_user_id: String,
    pub candidate: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallTarget {
    pub target_user_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    pub target_user_id: String,
    pub notification: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: String,
}

/// An outbound event relayed to the members of a target room.
///
/// Every variant carries the same [`RelayEnvelope`]: the inbound payload
/// echoed through, plus the sender's identity and a server-assigned
/// timestamp.
#[derive(Debug, Serialize, Deserialize, Clone, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "type")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundPayload {
    NewMessage(RelayEnvelope),
    UserTyping(RelayEnvelope),
    UserStoppedTyping(RelayEnvelope),
    UserJoinedSession(RelayEnvelope),
    UserLeftSession(RelayEnvelope),
    ScreenShareStarted(RelayEnvelope),
    ScreenShareStopped(RelayEnvelope),
    WhiteboardUpdate(RelayEnvelope),
    IncomingCall(RelayEnvelope),
    CallAnswered(RelayEnvelope),
    IceCandidate(RelayEnvelope),
    CallEnded(RelayEnvelope),
    NewNotification(RelayEnvelope),
    UserStatusUpdate(RelayEnvelope),
    UserOnline(RelayEnvelope),
    UserOffline(RelayEnvelope),
}

impl std::fmt::Display for OutboundPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Identity summary attached to every relayed event.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventSender {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub payload: Value,
    pub sender: EventSender,
    pub timestamp: i64,
}

impl RelayEnvelope {
    /// Wraps `payload` with the sender identity and the current server time
    /// in unix milliseconds.
    #[must_use]
    pub fn new(sender: EventSender, payload: Value) -> Self {
        Self {
            payload,
            sender,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_inbound_payload_deserializes_from_tagged_json() {
        let body = json!({
            "type": "SEND_MESSAGE",
            "payload": {"scope": "COMMUNITY", "targetId": "c1", "text": "hi"}
        });

        let payload: InboundPayload = serde_json::from_value(body).unwrap();
        match payload {
            InboundPayload::SendMessage(message) => {
                assert_eq!(message.payload.scope, MessageScope::Community);
                assert_eq!(message.payload.target_id, "c1");
                assert_eq!(message.payload.text, "hi");
            }
            _ => panic!("Expected SendMessage variant"),
        }
    }

    #[test]
    fn test_inbound_payload_rejects_unknown_type() {
        let body = json!({"type": "TELEPORT", "payload": {}});

        assert!(serde_json::from_value::<InboundPayload>(body).is_err());
    }

    #[test]
    fn test_inbound_payload_rejects_missing_field() {
        let body = json!({"type": "SEND_MESSAGE", "payload": {"scope": "COMMUNITY"}});

        assert!(serde_json::from_value::<InboundPayload>(body).is_err());
    }

    #[test]
    fn test_outbound_payload_serializes_with_type_tag() {
        let sender = EventSender {
            user_id: "u1".to_string(),
            name: "Dana".to_string(),
        };
        let event = OutboundPayload::NewMessage(RelayEnvelope::new(sender, json!({"text": "hi"})));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NEW_MESSAGE");
        assert_eq!(json["payload"]["text"], "hi");
        assert_eq!(json["sender"]["userId"], "u1");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_inbound_payload_display() {
        let payload = InboundPayload::Ping(EmptyPayload {});
        assert_eq!(payload.to_string(), "PING");

        let payload = InboundPayload::UpdateStatus(UpdateStatusPayload {
            payload: StatusUpdate {
                status: "studying".to_string(),
            },
        });
        assert_eq!(payload.to_string(), "UPDATE_STATUS");
    }

    #[test]
    fn test_message_scope_round_trip() {
        let scope: MessageScope = serde_json::from_value(json!("SESSION")).unwrap();
        assert_eq!(scope, MessageScope::Session);
        assert_eq!(serde_json::to_value(scope).unwrap(), json!("SESSION"));
    }
}
