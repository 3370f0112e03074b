//! Event routing and connection lifecycle for the realtime relay.
//!
//! Every inbound event maps to a target room derived from its payload; the
//! relay forwards it to the other members of that room and does nothing
//! else. All durable state (who belongs to a community, chat history) is
//! owned by the REST backend.

use core::fmt;
use std::num::ParseIntError;

use async_trait::async_trait;
use campusconnect_directory::UserProfile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::EnumString;
use thiserror::Error;

use crate::models::{
    EventSender, InboundPayload, MessageScope, OutboundPayload, RelayEnvelope,
};
use crate::rooms;

/// Response for relay operations.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP-style status code indicating operation result.
    pub status_code: u16,
    /// Response message body.
    pub body: String,
}

/// Authorization applied when a client asks to join a community room by
/// name.
///
/// The default trusts the name: membership enforcement happens at the REST
/// layer before a client ever learns a valid room id. `verify` instead
/// checks the join against the membership snapshot taken at connect time
/// and drops denied joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
pub enum JoinPolicy {
    #[default]
    #[strum(serialize = "trust")]
    TrustJoinByName,
    #[strum(serialize = "verify")]
    VerifyMembershipOnJoin,
}

/// Context for a relay connection.
///
/// The identity is resolved once at handshake and never changes for the
/// lifetime of the connection.
#[derive(Clone, Debug)]
pub struct RelayContext {
    /// Unique identifier for this connection.
    pub connection_id: String,
    /// The authenticated user, including the community membership snapshot.
    pub identity: UserProfile,
    /// Community-join authorization mode.
    pub join_policy: JoinPolicy,
}

impl RelayContext {
    /// Identity summary attached to events relayed on behalf of this
    /// connection.
    #[must_use]
    pub fn event_sender(&self) -> EventSender {
        EventSender {
            user_id: self.identity.user_id.clone(),
            name: self.identity.name.clone(),
        }
    }
}

/// Errors that can occur when delivering to a room.
#[derive(Debug, Error)]
pub enum RelaySendError {
    /// Unknown error with details
    #[error("Unknown: {0}")]
    Unknown(String),
    /// Failed to parse a connection id
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    /// JSON serialization/deserialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Trait for mutating room membership and fanning events out to rooms.
///
/// The server binary implements this on its relay-server handle; tests
/// implement it on a recording mock.
#[async_trait]
pub trait RelaySender: Send + Sync {
    /// Delivers `data` to every member of `room` except `connection_id`.
    ///
    /// # Errors
    ///
    /// * If the message fails to send
    async fn send_room_except(
        &self,
        room: &str,
        connection_id: &str,
        data: &str,
    ) -> Result<(), RelaySendError>;

    /// Adds the connection to `room`, creating the room if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// * If the membership mutation fails
    async fn join_room(&self, connection_id: &str, room: &str) -> Result<(), RelaySendError>;

    /// Removes the connection from `room`.
    ///
    /// # Errors
    ///
    /// * If the membership mutation fails
    async fn leave_room(&self, connection_id: &str, room: &str) -> Result<(), RelaySendError>;
}

impl fmt::Debug for dyn RelaySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{RelaySender}}")
    }
}

/// Errors that can occur while setting up a new connection's rooms.
#[derive(Debug, Error)]
pub enum RelayConnectError {
    /// Relay send error
    #[error(transparent)]
    RelaySend(#[from] RelaySendError),
    /// JSON serialization/deserialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Joins a freshly authenticated connection to its default rooms.
///
/// The connection enters its personal room plus one room per community in
/// the membership snapshot, then a user-online presence event is announced
/// to each community room. Membership changes after this point require
/// explicit join/leave events from the client.
///
/// # Errors
///
/// * If a room join fails
/// * If the presence event fails to serialize or send
pub async fn connect(
    sender: &impl RelaySender,
    context: &RelayContext,
) -> Result<Response, RelayConnectError> {
    sender
        .join_room(
            &context.connection_id,
            &rooms::user(&context.identity.user_id),
        )
        .await?;

    let online = OutboundPayload::UserOnline(RelayEnvelope::new(context.event_sender(), Value::Null));
    let online = serde_json::to_value(&online)?.to_string();

    for community_id in &context.identity.community_ids {
        let room = rooms::community(community_id);
        sender.join_room(&context.connection_id, &room).await?;
        sender
            .send_room_except(&room, &context.connection_id, &online)
            .await?;
    }

    log::debug!("Connected {}", context.connection_id);

    Ok(Response {
        status_code: 200,
        body: "Connected".into(),
    })
}

/// Errors that can occur when processing an inbound relay event.
#[derive(Debug, Error)]
pub enum RelayMessageError {
    /// Event type is not recognized or the payload is malformed
    #[error("Invalid message type")]
    InvalidMessageType,
    /// The join policy denied a community join
    #[error("Join denied for room {0}")]
    JoinDenied(String),
    /// Relay send error
    #[error(transparent)]
    RelaySend(#[from] RelaySendError),
    /// JSON serialization/deserialization error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Processes an incoming relay event and routes it to its target room.
///
/// # Errors
///
/// * If the event is an invalid type or shape
/// * If the event fails to relay
pub async fn process_message(
    body: Value,
    context: &RelayContext,
    sender: &impl RelaySender,
) -> Result<Response, RelayMessageError> {
    let payload: InboundPayload = serde_json::from_value(body).map_err(|e| {
        log::error!("Invalid message type: {e:?}");
        RelayMessageError::InvalidMessageType
    })?;

    message(sender, payload, context).await
}

/// Routes a parsed relay event to its target room.
///
/// # Errors
///
/// * If the event fails to relay
pub async fn message(
    sender: &impl RelaySender,
    message: InboundPayload,
    context: &RelayContext,
) -> Result<Response, RelayMessageError> {
    let message_type = message.as_ref().to_string();
    log::debug!(
        "Received message type {} from {}",
        message_type,
        context.connection_id
    );
    match message {
        InboundPayload::Ping(_) => {
            log::trace!("Ping");
            Ok::<_, RelayMessageError>(())
        }
        InboundPayload::JoinCommunity(payload) => {
            let community_id = &payload.payload.community_id;
            let room = rooms::community(community_id);

            if context.join_policy == JoinPolicy::VerifyMembershipOnJoin
                && !context
                    .identity
                    .community_ids
                    .iter()
                    .any(|c| c == community_id)
            {
                return Err(RelayMessageError::JoinDenied(room));
            }

            sender.join_room(&context.connection_id, &room).await?;
            Ok(())
        }
        InboundPayload::LeaveCommunity(payload) => {
            sender
                .leave_room(
                    &context.connection_id,
                    &rooms::community(&payload.payload.community_id),
                )
                .await?;
            Ok(())
        }
        InboundPayload::JoinStudySession(payload) => {
            let room = rooms::session(&payload.payload.session_id);
            sender.join_room(&context.connection_id, &room).await?;

            let event = OutboundPayload::UserJoinedSession(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::LeaveStudySession(payload) => {
            let room = rooms::session(&payload.payload.session_id);

            // relay the departure before dropping membership
            let event = OutboundPayload::UserLeftSession(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;

            sender.leave_room(&context.connection_id, &room).await?;
            Ok(())
        }
        InboundPayload::SendMessage(payload) => {
            let room = match payload.payload.scope {
                MessageScope::Community => rooms::community(&payload.payload.target_id),
                MessageScope::Session => rooms::session(&payload.payload.target_id),
            };

            let event = OutboundPayload::NewMessage(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::StartTyping(payload) => {
            let room = rooms::community(&payload.payload.community_id);
            let event = OutboundPayload::UserTyping(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::StopTyping(payload) => {
            let room = rooms::community(&payload.payload.community_id);
            let event = OutboundPayload::UserStoppedTyping(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::StartScreenShare(payload) => {
            let room = rooms::session(&payload.payload.session_id);
            let event = OutboundPayload::ScreenShareStarted(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::StopScreenShare(payload) => {
            let room = rooms::session(&payload.payload.session_id);
            let event = OutboundPayload::ScreenShareStopped(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::WhiteboardUpdate(payload) => {
            let room = rooms::session(&payload.payload.session_id);
            let event = OutboundPayload::WhiteboardUpdate(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::CallOffer(payload) => {
            let room = rooms::user(&payload.payload.target_user_id);
            let event = OutboundPayload::IncomingCall(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::CallAnswer(payload) => {
            let room = rooms::user(&payload.payload.target_user_id);
            let event = OutboundPayload::CallAnswered(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::IceCandidate(payload) => {
            let room = rooms::user(&payload.payload.target_user_id);
            let event = OutboundPayload::IceCandidate(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::EndCall(payload) => {
            let room = rooms::user(&payload.payload.target_user_id);
            let event = OutboundPayload::CallEnded(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::SendNotification(payload) => {
            let room = rooms::user(&payload.payload.target_user_id);
            let event = OutboundPayload::NewNotification(envelope(context, &payload.payload)?);
            relay(sender, context, &room, &event).await?;
            Ok(())
        }
        InboundPayload::UpdateStatus(payload) => {
            // one relay per community in the membership snapshot
            let envelope = envelope(context, &payload.payload)?;

            for community_id in &context.identity.community_ids {
                let room = rooms::community(community_id);
                let event = OutboundPayload::UserStatusUpdate(envelope.clone());
                relay(sender, context, &room, &event).await?;
            }
            Ok(())
        }
    }?;

    log::debug!(
        "Successfully processed message type {} from {}",
        message_type,
        context.connection_id
    );
    Ok(Response {
        status_code: 200,
        body: "Received".into(),
    })
}

fn envelope(
    context: &RelayContext,
    payload: &impl Serialize,
) -> Result<RelayEnvelope, serde_json::Error> {
    Ok(RelayEnvelope::new(
        context.event_sender(),
        serde_json::to_value(payload)?,
    ))
}

async fn relay(
    sender: &impl RelaySender,
    context: &RelayContext,
    room: &str,
    event: &OutboundPayload,
) -> Result<(), RelayMessageError> {
    log::debug!("Relaying {} from {} to {room}", event.as_ref(), context.connection_id);

    sender
        .send_room_except(
            room,
            &context.connection_id,
            &serde_json::to_value(event)?.to_string(),
        )
        .await?;

    Ok(())
}
