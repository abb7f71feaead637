//! Token endpoint wire types.
//!
//! Ephemeral, in-memory request/response shapes for token issuance. Neither
//! is persisted as-is: reference tokens and refresh tokens are stored as
//! opaque grant records by the grant store, and the response is serialized
//! straight onto the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::client::{Client, GrantType};
use crate::types::tenant::Tenant;

/// The authenticated/consented result of an authorization attempt.
///
/// Produced once authentication and consent are satisfied; consumed exactly
/// once by the token issuer.
#[derive(Debug, Clone, Default)]
pub struct GrantResult {
    /// Subject the grant is for (None for client credentials).
    pub subject_id: Option<String>,

    /// Session the grant is bound to, if any.
    pub session_id: Option<String>,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Claims captured at grant time. Merged into tokens after provider
    /// claims, overriding per key.
    pub claims: Map<String, Value>,

    /// Application-defined data carried through to stored grants.
    pub custom: Map<String, Value>,
}

impl GrantResult {
    /// Returns `true` if a scope was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Returns the scopes as a space-separated string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Everything the token issuer needs for one issuance pass.
#[derive(Debug, Clone)]
pub struct TokenCreationRequest {
    /// Grant type that reached the issuer.
    pub grant_type: GrantType,

    /// The authenticated/consented grant.
    pub grant: GrantResult,

    /// The requesting client.
    pub client: Client,

    /// Tenant context, if the client is tenant-scoped.
    pub tenant: Option<Tenant>,

    /// Protocol of the originating request ("oidc", "saml").
    pub protocol: String,

    /// Nonce from the authorization request (ID tokens).
    pub nonce: Option<String>,

    /// When the user authenticated (unix timestamp, ID tokens).
    pub auth_time: Option<i64>,

    /// Authentication method references (`amr`).
    pub auth_methods: Vec<String>,

    /// Authentication context class reference (`acr`).
    pub acr: Option<String>,

    /// DPoP key thumbprint when the request is proof-of-possession bound.
    pub dpop_thumbprint: Option<String>,

    /// Authorization code under exchange (`c_hash` input), if any.
    pub authorization_code: Option<String>,

    /// Refresh token handle consumed by a `refresh_token` grant, if any.
    pub consumed_refresh_token: Option<String>,
}

impl TokenCreationRequest {
    /// Creates a request with the fields every grant type needs.
    #[must_use]
    pub fn new(grant_type: GrantType, grant: GrantResult, client: Client) -> Self {
        Self {
            grant_type,
            grant,
            client,
            tenant: None,
            protocol: "oidc".to_string(),
            nonce: None,
            auth_time: None,
            auth_methods: Vec::new(),
            acr: None,
            dpop_thumbprint: None,
            authorization_code: None,
            consumed_refresh_token: None,
        }
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid api:read",
///   "refresh_token": "abc123..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT or opaque reference handle).
    pub access_token: String,

    /// Token type: "Bearer", or "DPoP" for proof-of-possession bound tokens.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// ID token (if the openid scope was granted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token (if offline access was granted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Issued token type URN (token-exchange responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            id_token: None,
            refresh_token: None,
            issued_token_type: None,
        }
    }

    /// Marks the response as DPoP-bound.
    #[must_use]
    pub fn with_dpop(mut self) -> Self {
        self.token_type = "DPoP".to_string();
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, token: String) -> Self {
        self.id_token = Some(token);
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }

    /// Sets the issued token type (token-exchange).
    #[must_use]
    pub fn with_issued_token_type(mut self, urn: String) -> Self {
        self.issued_token_type = Some(urn);
        self
    }
}

/// OAuth error response body.
///
/// # Example Response
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "refresh token consumed"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// OAuth 2.0 error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    /// Creates an error response.
    #[must_use]
    pub fn new(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: error.into(),
            error_description: description,
        }
    }
}

impl From<&crate::error::AuthError> for ErrorResponse {
    fn from(err: &crate::error::AuthError) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.to_string()),
        }
    }
}
