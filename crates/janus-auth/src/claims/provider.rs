//! Claims provider contract and registry.
//!
//! Claims providers are pluggable sources of token claims (user stores,
//! directory lookups, entitlement services). They are registered under the
//! aggregator's registry once at startup and invoked in descending priority
//! order during token issuance.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::AuthResult;

/// Context handed to claims providers for one collection pass.
#[derive(Debug, Clone)]
pub struct ClaimsContext {
    /// Subject the claims are collected for. `None` for grants without a
    /// user (client credentials); providers are never invoked in that case.
    pub subject_id: Option<String>,

    /// Tenant the request belongs to, if any.
    pub tenant_id: Option<String>,

    /// Requesting client.
    pub client_id: String,

    /// Granted scopes for the token under construction.
    pub scopes: Vec<String>,

    /// Protocol of the originating request ("oidc", "saml", ...).
    pub protocol: String,

    /// Session the grant is bound to, if any.
    pub session_id: Option<String>,
}

impl ClaimsContext {
    /// Returns `true` if any of the given trigger scopes is requested.
    /// An empty trigger list matches everything.
    #[must_use]
    pub fn matches_scopes(&self, triggers: &[String]) -> bool {
        triggers.is_empty() || triggers.iter().any(|t| self.scopes.iter().any(|s| s == t))
    }

    /// Returns `true` if the protocol matches one of the triggers.
    /// An empty trigger list matches everything.
    #[must_use]
    pub fn matches_protocol(&self, triggers: &[String]) -> bool {
        triggers.is_empty() || triggers.iter().any(|t| t == &self.protocol)
    }
}

/// A pluggable source of token claims.
#[async_trait]
pub trait ClaimsProvider: Send + Sync {
    /// Provider name, used for logging and deterministic ordering among
    /// equal priorities.
    fn name(&self) -> &str;

    /// Collection priority; higher-priority providers are applied first.
    fn priority(&self) -> i32 {
        0
    }

    /// Disabled providers are skipped without logging.
    fn enabled(&self) -> bool {
        true
    }

    /// Scopes that trigger this provider. Empty means "always".
    fn trigger_scopes(&self) -> &[String] {
        &[]
    }

    /// Protocols that trigger this provider. Empty means "always".
    fn trigger_protocols(&self) -> &[String] {
        &[]
    }

    /// Cheap pre-check before `get_claims` is invoked.
    fn can_provide(&self, _ctx: &ClaimsContext) -> bool {
        true
    }

    /// Collects claims for the context.
    ///
    /// # Errors
    ///
    /// A failing provider is logged and skipped by the aggregator; it never
    /// aborts collection for other providers.
    async fn get_claims(&self, ctx: &ClaimsContext) -> AuthResult<serde_json::Map<String, Value>>;
}

/// Explicit registry of claims providers, built once at startup.
#[derive(Default)]
pub struct ClaimsProviderRegistry {
    providers: Vec<Arc<dyn ClaimsProvider>>,
}

impl ClaimsProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider.
    pub fn register(&mut self, provider: Arc<dyn ClaimsProvider>) {
        self.providers.push(provider);
    }

    /// Returns providers in descending priority order. Equal priorities are
    /// ordered by name so the merge stays deterministic.
    #[must_use]
    pub fn ordered(&self) -> Vec<Arc<dyn ClaimsProvider>> {
        let mut ordered = self.providers.clone();
        ordered.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        ordered
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        priority: i32,
    }

    #[async_trait]
    impl ClaimsProvider for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn get_claims(
            &self,
            _ctx: &ClaimsContext,
        ) -> AuthResult<serde_json::Map<String, Value>> {
            Ok(serde_json::Map::new())
        }
    }

    fn context() -> ClaimsContext {
        ClaimsContext {
            subject_id: Some("user-1".to_string()),
            tenant_id: None,
            client_id: "app".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            protocol: "oidc".to_string(),
            session_id: None,
        }
    }

    #[test]
    fn test_ordering_is_priority_then_name() {
        let mut registry = ClaimsProviderRegistry::new();
        registry.register(Arc::new(Named {
            name: "b",
            priority: 10,
        }));
        registry.register(Arc::new(Named {
            name: "a",
            priority: 10,
        }));
        registry.register(Arc::new(Named {
            name: "c",
            priority: 50,
        }));

        let ordered = registry.ordered();
        let names: Vec<&str> = ordered.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_trigger_matching() {
        let ctx = context();

        assert!(ctx.matches_scopes(&[]));
        assert!(ctx.matches_scopes(&["profile".to_string()]));
        assert!(!ctx.matches_scopes(&["api:read".to_string()]));

        assert!(ctx.matches_protocol(&[]));
        assert!(ctx.matches_protocol(&["oidc".to_string()]));
        assert!(!ctx.matches_protocol(&["saml".to_string()]));
    }
}
