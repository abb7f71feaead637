//! Tenant domain type.

use serde::{Deserialize, Serialize};

/// A tenant of the identity provider.
///
/// Tenants partition clients, users, and journey policies, and carry the
/// middle tier of the issuance precedence chains (client setting, then
/// tenant default, then server configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Unique tenant identifier.
    pub id: String,

    /// Human-readable tenant name.
    pub name: String,

    /// Explicit issuer URL override. Takes precedence over the custom
    /// domain and the server-configured issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_override: Option<String>,

    /// Custom domain; when set (and no explicit override exists) the
    /// issuer becomes `https://{domain}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,

    /// Whether journey-based login UIs are available to this tenant.
    /// When `false`, standalone pages are forced regardless of client or
    /// request preferences.
    pub journeys_enabled: bool,

    /// Tenant default ID token lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_lifetime: Option<i64>,
}

impl Tenant {
    /// Creates a tenant with journeys enabled and no overrides.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            issuer_override: None,
            custom_domain: None,
            journeys_enabled: true,
            id_token_lifetime: None,
        }
    }
}
