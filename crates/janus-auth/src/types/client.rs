//! OAuth client registration domain type.

use serde::{Deserialize, Serialize};

use crate::oauth::pkce::PkcePolicy;

/// OAuth 2.0 grant types a client can be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow (interactive login).
    AuthorizationCode,
    /// Machine-to-machine authentication.
    ClientCredentials,
    /// Access token refresh.
    RefreshToken,
    /// RFC 8693 token exchange.
    TokenExchange,
}

impl GrantType {
    /// Returns the wire-level grant type string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
        }
    }

    /// Parses a wire-level grant type string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            "urn:ietf:params:oauth:grant-type:token-exchange" => Some(Self::TokenExchange),
            _ => None,
        }
    }
}

/// How access tokens for a client are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenKind {
    /// Self-contained signed JWT.
    Jwt,
    /// Opaque reference handle resolved against the grant store.
    Reference,
}

/// Refresh token reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenPolicy {
    /// The token is invalidated on first exchange and a new one is issued.
    OneTimeOnly,
    /// The same token stays valid across exchanges; no new token is minted.
    ReUse,
}

/// Registered OAuth client.
///
/// Most token-issuance knobs have three levels of precedence:
/// client setting, then tenant default, then server configuration.
/// `None` here means "inherit".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Human-readable name shown on consent screens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Owning tenant, if the client is tenant-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Grant types this client may use.
    pub allowed_grant_types: Vec<GrantType>,

    /// Scopes this client may request.
    pub allowed_scopes: Vec<String>,

    /// Access token representation.
    pub access_token_kind: AccessTokenKind,

    /// Access token lifetime in seconds (None inherits the server default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime: Option<i64>,

    /// ID token lifetime in seconds (None inherits tenant, then server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_lifetime: Option<i64>,

    /// Refresh token reuse policy.
    pub refresh_token_policy: RefreshTokenPolicy,

    /// Absolute refresh token lifetime in seconds (None inherits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_absolute_lifetime: Option<i64>,

    /// Sliding refresh token lifetime in seconds. When set, the effective
    /// lifetime is the minimum of sliding and absolute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_sliding_lifetime: Option<i64>,

    /// Whether the client may request `offline_access`.
    pub allow_offline_access: bool,

    /// Salt for pairwise subject identifiers. When set, ID token subjects
    /// are HMAC-derived per client so users cannot be correlated across
    /// clients. Rotating the salt changes every subject this client sees;
    /// previously-issued pairwise subjects do not survive rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairwise_salt: Option<String>,

    /// Whether a PKCE challenge is required on authorization requests.
    pub require_pkce: bool,

    /// Whether the "plain" PKCE method is acceptable.
    pub allow_plain_pkce: bool,

    /// Journey UI override: `Some(true)` forces journeys on, `Some(false)`
    /// is final (disables journeys even if the request asks), `None`
    /// inherits the tenant setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journeys_enabled: Option<bool>,

    /// Whether the consent screen must be shown before token issuance.
    pub require_consent: bool,
}

impl Client {
    /// Creates a client with secure defaults for the given ID.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_name: None,
            tenant_id: None,
            allowed_grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            allowed_scopes: Vec::new(),
            access_token_kind: AccessTokenKind::Jwt,
            access_token_lifetime: None,
            id_token_lifetime: None,
            refresh_token_policy: RefreshTokenPolicy::OneTimeOnly,
            refresh_token_absolute_lifetime: None,
            refresh_token_sliding_lifetime: None,
            allow_offline_access: false,
            pairwise_salt: None,
            require_pkce: true,
            allow_plain_pkce: false,
            journeys_enabled: None,
            require_consent: false,
        }
    }

    /// Returns `true` if the client may use the given grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant_type)
    }

    /// Returns `true` if the client may request the given scope.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.iter().any(|s| s == scope)
    }

    /// Returns the PKCE policy derived from this client's settings.
    #[must_use]
    pub fn pkce_policy(&self) -> PkcePolicy {
        PkcePolicy {
            required: self.require_pkce,
            allow_plain: self.allow_plain_pkce,
        }
    }

    /// Returns `true` if ID token subjects are pairwise for this client.
    #[must_use]
    pub fn uses_pairwise_subjects(&self) -> bool {
        self.pairwise_salt.is_some()
    }
}
