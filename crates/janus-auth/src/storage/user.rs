//! User and session store traits.
//!
//! The coordinator re-validates users and sessions on resumed requests: a
//! session whose user no longer exists is treated as unauthenticated, never
//! as an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

/// A user as the coordinator sees one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user identifier (the canonical subject ID).
    pub id: String,

    /// Login name.
    pub username: String,

    /// Owning tenant, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Deactivated users cannot skip login or receive tokens.
    pub active: bool,
}

/// An established authentication session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    /// Unique session identifier (the `sid` claim).
    pub id: String,

    /// Authenticated user.
    pub user_id: String,

    /// When the user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,

    /// Authentication method references recorded at login.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_methods: Vec<String>,

    /// Tenant the session belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl UserSession {
    /// Returns the session age in whole seconds.
    #[must_use]
    pub fn age_seconds(&self) -> i64 {
        (OffsetDateTime::now_utc() - self.auth_time).whole_seconds()
    }
}

/// Lookup of users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>>;
}

/// Storage for authentication sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored.
    async fn store(&self, session: &UserSession) -> AuthResult<()>;

    /// Finds a session by its token (cookie value or API session token).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_token(&self, token: &str) -> AuthResult<Option<UserSession>>;

    /// Removes a session (sign-out).
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn remove(&self, session_id: &str) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_age() {
        let session = UserSession {
            id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            auth_time: OffsetDateTime::now_utc() - time::Duration::seconds(120),
            auth_methods: vec!["pwd".to_string()],
            tenant_id: None,
        };
        let age = session.age_seconds();
        assert!((120..=121).contains(&age));
    }
}
