//! Authentication core configuration.
//!
//! Server-wide defaults for protocol state lifetimes, token lifetimes,
//! journey execution, and claims collection. Tenants and clients can
//! override most of these values per record; the values here are the
//! bottom of each precedence chain.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://id.example.com"
//!
//! [auth.tokens]
//! access_token_lifetime = "1h"
//! id_token_lifetime = "5m"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the authentication core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server issuer URL (used in token `iss` claims when no tenant
    /// override applies). Trailing slashes are trimmed at issuance time.
    pub issuer: String,

    /// In-flight protocol state configuration.
    pub protocol_state: ProtocolStateConfig,

    /// Token issuance configuration.
    pub tokens: TokenConfig,

    /// Journey engine configuration.
    pub journeys: JourneyConfig,

    /// Claims collection configuration.
    pub claims: ClaimsConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            protocol_state: ProtocolStateConfig::default(),
            tokens: TokenConfig::default(),
            journeys: JourneyConfig::default(),
            claims: ClaimsConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::invalid("issuer", "must not be empty"));
        }
        if self.protocol_state.lifetime.is_zero() {
            return Err(ConfigError::invalid(
                "protocol_state.lifetime",
                "must be greater than zero",
            ));
        }
        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::invalid(
                "tokens.access_token_lifetime",
                "must be greater than zero",
            ));
        }
        if self.journeys.lifetime.is_zero() {
            return Err(ConfigError::invalid(
                "journeys.lifetime",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Configuration for stored in-flight protocol requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolStateConfig {
    /// How long a stored protocol request stays resolvable.
    /// Correlation IDs expire after this window even if never consumed.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for ProtocolStateConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// Token issuance defaults.
///
/// Client- and tenant-level overrides take precedence over these values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Default access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Fallback ID token lifetime, used when neither the client nor the
    /// tenant configures one.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Default absolute refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Whether access tokens carry a `jti` claim by default.
    pub emit_jwt_id: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            id_token_lifetime: Duration::from_secs(300),      // 5 minutes
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            emit_jwt_id: true,
        }
    }
}

/// Journey engine defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JourneyConfig {
    /// How long a journey stays resumable before expiring.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Default per-step execution timeout.
    /// Steps can override this in their configuration.
    #[serde(with = "humantime_serde")]
    pub step_timeout: Duration,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(1800),   // 30 minutes
            step_timeout: Duration::from_secs(30), // 30 seconds
        }
    }
}

/// Claims collection defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Per-provider collection timeout. A provider exceeding this budget
    /// is treated as failed and skipped.
    #[serde(with = "humantime_serde")]
    pub provider_timeout: Duration,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl ConfigError {
    /// Creates a new `ConfigError`.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
