//! In-flight protocol request state.
//!
//! An inbound authorization request is parked while the user authenticates
//! (possibly across several redirects) and resumed later through an opaque
//! correlation ID. The stored state is single-use: consuming it on resume,
//! or letting it expire, makes the correlation ID permanently unresolvable.
//!
//! # Lifecycle
//!
//! 1. Coordinator stores the serialized request, receives a correlation ID
//! 2. The ID travels through journey/standalone redirects as `correlation_id`
//! 3. The callback consumes the state exactly once and resumes the request
//!
//! # Security Considerations
//!
//! - Correlation IDs are 256-bit random values; they are bearer secrets
//! - Stores must implement retrieve-then-remove atomically (replay defense)
//! - State must expire even if never consumed (default 10 minutes)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Query parameter carrying the correlation ID on protocol callbacks.
pub const CORRELATION_PARAM: &str = "correlation_id";

/// Default protocol state expiry in seconds (10 minutes).
pub const DEFAULT_PROTOCOL_STATE_EXPIRY_SECS: i64 = 600;

/// The endpoint a parked request originally targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Authorization endpoint.
    Authorize,
    /// End-session (logout) endpoint.
    EndSession,
}

/// A parked protocol request awaiting resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolState {
    /// Protocol of the originating request ("oidc", "saml").
    pub protocol: String,

    /// The original request, serialized by the transport layer.
    pub serialized_request: String,

    /// Client that issued the request.
    pub client_id: String,

    /// Tenant the request belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Endpoint the request targeted.
    pub endpoint_kind: EndpointKind,

    /// Free-form properties accumulated while the request is parked
    /// (consent parameters, journey linkage).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// When the state was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ProtocolState {
    /// Creates protocol state for an authorization request.
    #[must_use]
    pub fn new(
        protocol: impl Into<String>,
        serialized_request: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            serialized_request: serialized_request.into(),
            client_id: client_id.into(),
            tenant_id: None,
            endpoint_kind: EndpointKind::Authorize,
            properties: BTreeMap::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Generates an unguessable correlation ID.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_correlation_id() -> String {
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

    #[test]
    fn test_correlation_id_shape() {
        let id = ProtocolState::generate_correlation_id();
        assert_eq!(id.len(), 43);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_correlation_id_uniqueness() {
        let ids: Vec<String> = (0..100)
            .map(|_| ProtocolState::generate_correlation_id())
            .collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut state = ProtocolState::new("oidc", "response_type=code&client_id=app", "app");
        state
            .properties
            .insert("consent".to_string(), "pending".to_string());

        let json = serde_json::to_string(&state).unwrap();
        let parsed: ProtocolState = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.protocol, "oidc");
        assert_eq!(parsed.endpoint_kind, EndpointKind::Authorize);
        assert_eq!(parsed.properties.get("consent").unwrap(), "pending");
    }
}
