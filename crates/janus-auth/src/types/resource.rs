//! API resource domain type and identity scope classification.

use serde::{Deserialize, Serialize};

/// OIDC identity scopes. These describe the user, not a protected API, and
/// never produce resource audiences.
pub const IDENTITY_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "address",
    "phone",
    "offline_access",
];

/// Returns `true` if the scope is an identity scope rather than an API scope.
#[must_use]
pub fn is_identity_scope(scope: &str) -> bool {
    IDENTITY_SCOPES.contains(&scope)
}

/// A protected API registered with the authorization server.
///
/// Access tokens for the API carry the resource `name` in their `aud` claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    /// Resource name; becomes the audience value.
    pub name: String,

    /// Human-readable display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Scopes owned by this resource.
    pub scopes: Vec<String>,

    /// Whether the resource is active.
    pub enabled: bool,
}

impl ApiResource {
    /// Creates an enabled resource owning the given scopes.
    #[must_use]
    pub fn new(name: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            scopes,
            enabled: true,
        }
    }

    /// Returns `true` if this resource owns the given scope.
    #[must_use]
    pub fn owns_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
