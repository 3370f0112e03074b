//! Namespaced room identifiers.
//!
//! A room is nothing more than a name; it exists only while connections are
//! joined to it. The namespace prefix keeps personal, community, and
//! live-session rooms from colliding.

/// Personal room for point-to-point events (call signaling, notifications).
#[must_use]
pub fn user(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Fan-out room for a community's chat, typing, and presence events.
#[must_use]
pub fn community(community_id: &str) -> String {
    format!("community:{community_id}")
}

/// Fan-out room for a live study session.
#[must_use]
pub fn session(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Whether `room` is a community room. Presence departures are only relayed
/// to community rooms.
#[must_use]
pub fn is_community(room: &str) -> bool {
    room.starts_with("community:")
}
