//! Stored grant records.
//!
//! Authorization codes, refresh tokens, and reference access tokens are all
//! persisted as opaque grant records keyed by a handle. The handle itself is
//! never stored; only a SHA-256 hash is persisted, so a leaked grant store
//! cannot be replayed against the token endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The kind of grant a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// One-time authorization code.
    AuthorizationCode,
    /// Long-lived refresh token.
    RefreshToken,
    /// Opaque reference access token.
    ReferenceToken,
}

impl GrantKind {
    /// Returns the stored type tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ReferenceToken => "reference_token",
        }
    }
}

/// Opaque grant record persisted by the grant store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// SHA-256 hash of the handle. The plaintext handle is returned to the
    /// client but never stored.
    pub handle_hash: String,

    /// Type tag.
    pub kind: GrantKind,

    /// Subject the grant was issued for (None for client credentials).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Client the grant was issued to.
    pub client_id: String,

    /// Session the grant is bound to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Claims captured at grant time, stringified for storage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, String>,

    /// DPoP key thumbprint when the grant is proof-of-possession bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_thumbprint: Option<String>,

    /// When this grant was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this grant expires (None = no expiration).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// Application-defined data blob.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Grant {
    /// Creates a grant record for a freshly generated handle.
    #[must_use]
    pub fn new(handle: &str, kind: GrantKind, client_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle_hash: Self::hash_handle(handle),
            kind,
            subject_id: None,
            client_id: client_id.into(),
            session_id: None,
            scopes: Vec::new(),
            claims: BTreeMap::new(),
            dpop_thumbprint: None,
            created_at: OffsetDateTime::now_utc(),
            expires_at: None,
            data: serde_json::Map::new(),
        }
    }

    /// Returns `true` if this grant has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| OffsetDateTime::now_utc() > exp)
            .unwrap_or(false)
    }

    /// Hashes a handle with SHA-256 for storage and lookup.
    #[must_use]
    pub fn hash_handle(handle: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(handle.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generates a cryptographically secure random handle.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_handle() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_hash_handle() {
        let handle = "test-handle-value";
        let hash = Grant::hash_handle(handle);

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, Grant::hash_handle(handle));
        assert_ne!(hash, Grant::hash_handle("different-handle"));
    }

    #[test]
    fn test_generate_handle() {
        let handle = Grant::generate_handle();

        // 32 bytes base64url encoded = 43 characters
        assert_eq!(handle.len(), 43);
        assert!(
            handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_handle_uniqueness() {
        let handles: Vec<String> = (0..100).map(|_| Grant::generate_handle()).collect();
        let mut unique = handles.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(handles.len(), unique.len());
    }

    #[test]
    fn test_is_expired() {
        let now = OffsetDateTime::now_utc();

        let mut grant = Grant::new("h", GrantKind::RefreshToken, "client");
        assert!(!grant.is_expired());

        grant.expires_at = Some(now + Duration::hours(1));
        assert!(!grant.is_expired());

        grant.expires_at = Some(now - Duration::minutes(1));
        assert!(grant.is_expired());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(GrantKind::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(GrantKind::RefreshToken.as_str(), "refresh_token");
        assert_eq!(GrantKind::ReferenceToken.as_str(), "reference_token");
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut grant = Grant::new("handle", GrantKind::ReferenceToken, "client");
        grant.subject_id = Some("user-1".to_string());
        grant.scopes = vec!["openid".to_string(), "api:read".to_string()];
        grant
            .claims
            .insert("email".to_string(), "a@example.com".to_string());

        let json = serde_json::to_string(&grant).unwrap();
        let parsed: Grant = serde_json::from_str(&json).unwrap();

        assert_eq!(grant.id, parsed.id);
        assert_eq!(grant.handle_hash, parsed.handle_hash);
        assert_eq!(grant.kind, parsed.kind);
        assert_eq!(grant.scopes, parsed.scopes);
        assert_eq!(parsed.claims.get("email").unwrap(), "a@example.com");
    }
}
