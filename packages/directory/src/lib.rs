//! User Directory client for the CampusConnect realtime relay.
//!
//! The relay never owns user records. At handshake time it resolves an
//! authenticated subject to a [`UserProfile`] — display name plus the static
//! list of community memberships — through the REST backend's directory
//! endpoint. The snapshot is taken once per connection and never refreshed.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use core::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A user record resolved from the directory at connect time.
///
/// `community_ids` is the membership snapshot used for automatic room joins
/// and status fan-out; it is not updated if memberships change while the
/// connection is alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub community_ids: Vec<String>,
}

/// Errors that can occur while resolving a user through the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Generic http request error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// The subject does not resolve to an existing user
    #[error("User {0} not found")]
    NotFound(String),
}

/// Trait for resolving an authenticated subject to its user record.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves `user_id` to a full profile including group memberships.
    ///
    /// # Errors
    ///
    /// * If the directory is unreachable
    /// * If the subject does not resolve to an existing user
    async fn resolve(&self, user_id: &str) -> Result<UserProfile, DirectoryError>;
}

impl fmt::Debug for dyn UserDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{UserDirectory}}")
    }
}

/// Directory client backed by the CampusConnect REST backend.
pub struct HttpUserDirectory {
    host: String,
    client: reqwest::Client,
}

impl HttpUserDirectory {
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn resolve(&self, user_id: &str) -> Result<UserProfile, DirectoryError> {
        let url = format!("{}/users/{user_id}", self.host);

        log::debug!("Resolving user {user_id}");
        let response = self.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(user_id.to_string()));
        }

        Ok(response.error_for_status()?.json::<UserProfile>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_profile_deserialization() {
        let json = serde_json::json!({
            "userId": "u1",
            "name": "Dana",
            "communityIds": ["c1", "c2"]
        });

        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.user_id, "u1");
        assert_eq!(profile.name, "Dana");
        assert_eq!(profile.community_ids, vec!["c1", "c2"]);
    }

    #[test]
    fn test_user_profile_serialization_uses_camel_case() {
        let profile = UserProfile {
            user_id: "u1".to_string(),
            name: "Dana".to_string(),
            community_ids: vec![],
        };

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["communityIds"], serde_json::json!([]));
    }

    #[test]
    fn test_directory_error_display() {
        let error = DirectoryError::NotFound("u404".to_string());
        assert_eq!(error.to_string(), "User u404 not found");
    }

    #[test]
    fn test_http_user_directory_strips_trailing_slash() {
        let directory = HttpUserDirectory::new("http://directory.local/");
        assert_eq!(directory.host, "http://directory.local");
    }
}
