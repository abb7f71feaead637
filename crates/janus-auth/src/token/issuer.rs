//! Token issuance.
//!
//! Produces access tokens (JWT or opaque reference), ID tokens, and refresh
//! tokens from a consumed [`TokenCreationRequest`]. Claims come from the
//! claims aggregator plus grant-time claims; audiences come from the
//! resource store; subjects are pairwise-transformed per client when
//! configured.
//!
//! # Security
//!
//! - Reference and refresh token handles are 256-bit random values stored
//!   hashed
//! - Refresh token rotation removes the consumed handle before the
//!   replacement is stored
//! - Missing signing credentials abort issuance with a fatal configuration
//!   error; a failing claims provider merely contributes nothing

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};
use uuid::Uuid;

use crate::AuthResult;
use crate::background::BackgroundTasks;
use crate::claims::{ClaimsAggregator, ClaimsContext, insert_overriding};
use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::oauth::token::{TokenCreationRequest, TokenResponse};
use crate::storage::grant::GrantStore;
use crate::storage::directory::ResourceStore;
use crate::storage::signing::SigningCredentialProvider;
use crate::token::subject::resolve_subject;
use crate::types::client::{AccessTokenKind, GrantType, RefreshTokenPolicy};
use crate::types::grant::{Grant, GrantKind};
use crate::types::resource::is_identity_scope;
use crate::types::tenant::Tenant;

/// Issued token type URN for token-exchange responses.
const ACCESS_TOKEN_TYPE_URN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Hardcoded ID token lifetime fallback in seconds, used when neither the
/// client nor the tenant nor the server config yields a value.
const ID_TOKEN_LIFETIME_FALLBACK_SECS: i64 = 300;

/// An access token with its effective lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// The token value: a signed JWT or an opaque reference handle.
    pub token: String,
    /// Lifetime in seconds.
    pub lifetime_secs: i64,
}

/// Produces access, ID, and refresh tokens.
pub struct TokenIssuer {
    signing: Arc<dyn SigningCredentialProvider>,
    grants: Arc<dyn GrantStore>,
    resources: Arc<dyn ResourceStore>,
    aggregator: Arc<ClaimsAggregator>,
    config: TokenConfig,
    server_issuer: String,
    background: Option<Arc<BackgroundTasks>>,
}

impl TokenIssuer {
    /// Creates a token issuer.
    #[must_use]
    pub fn new(
        signing: Arc<dyn SigningCredentialProvider>,
        grants: Arc<dyn GrantStore>,
        resources: Arc<dyn ResourceStore>,
        aggregator: Arc<ClaimsAggregator>,
        config: TokenConfig,
        server_issuer: impl Into<String>,
    ) -> Self {
        Self {
            signing,
            grants,
            resources,
            aggregator,
            config,
            server_issuer: server_issuer.into(),
            background: None,
        }
    }

    /// Attaches the background task queue used for grant last-used stamps.
    #[must_use]
    pub fn with_background_tasks(mut self, tasks: Arc<BackgroundTasks>) -> Self {
        self.background = Some(tasks);
        self
    }

    /// Produces the full token response for a consumed grant.
    ///
    /// The access token is always issued. An ID token is added for
    /// authorization-code grants carrying the `openid` scope and a subject.
    /// A refresh token is added per [`Self::should_issue_refresh_token`];
    /// when a `refresh_token` grant rotates, the consumed handle is removed
    /// before the replacement is stored.
    ///
    /// # Errors
    ///
    /// Returns a fatal configuration error when no signing credentials are
    /// available, and storage errors from the grant store. Claims provider
    /// failures never fail issuance.
    pub async fn issue(&self, request: &TokenCreationRequest) -> AuthResult<TokenResponse> {
        let claims = self.collect_claims(request).await?;

        let access = self.create_access_token(request, &claims).await?;

        let mut response = TokenResponse::new(
            access.token.clone(),
            u64::try_from(access.lifetime_secs).unwrap_or(0),
            request.grant.scope_string(),
        );
        if request.dpop_thumbprint.is_some() {
            response = response.with_dpop();
        }

        if request.grant_type == GrantType::AuthorizationCode
            && request.grant.has_scope("openid")
            && request.grant.subject_id.is_some()
        {
            let id_token = self
                .create_id_token(request, &claims, Some(&access.token))
                .await?;
            response = response.with_id_token(id_token);
        }

        if self.should_issue_refresh_token(request) {
            if request.grant_type == GrantType::RefreshToken {
                // Rotation: the consumed handle must stop validating before
                // the replacement becomes visible.
                if let Some(consumed) = &request.consumed_refresh_token {
                    self.grants
                        .remove_by_hash(&Grant::hash_handle(consumed))
                        .await?;
                }
            }
            let refresh_token = self.create_refresh_token(request, &claims).await?;
            response = response.with_refresh_token(refresh_token);
        } else if request.grant_type == GrantType::RefreshToken {
            // Re-use policy: the handle stays live. Stamp its last use off
            // the request path.
            if let (Some(tasks), Some(consumed)) =
                (&self.background, &request.consumed_refresh_token)
            {
                tasks.enqueue_touch(Grant::hash_handle(consumed), OffsetDateTime::now_utc());
            }
        }

        if request.grant_type == GrantType::TokenExchange {
            response = response.with_issued_token_type(ACCESS_TOKEN_TYPE_URN.to_string());
        }

        Ok(response)
    }

    /// Collects provider claims and applies grant-time claims on top.
    async fn collect_claims(&self, request: &TokenCreationRequest) -> AuthResult<Map<String, Value>> {
        let ctx = ClaimsContext {
            subject_id: request.grant.subject_id.clone(),
            tenant_id: request.tenant.as_ref().map(|t| t.id.clone()),
            client_id: request.client.client_id.clone(),
            scopes: request.grant.scopes.clone(),
            protocol: request.protocol.clone(),
            session_id: request.grant.session_id.clone(),
        };
        let mut claims = self.aggregator.collect(&ctx).await?;

        // Grant-time claims were fixed at consent; they override providers.
        for (key, value) in &request.grant.claims {
            insert_overriding(&mut claims, key, value.clone());
        }
        Ok(claims)
    }

    /// Creates the access token for a request.
    ///
    /// Branches on the client's access token kind: reference tokens persist
    /// an opaque grant and return only the handle; JWTs assemble standard
    /// claims, append merged claims that don't collide with them, and sign.
    ///
    /// # Errors
    ///
    /// Returns a fatal configuration error when no signing credentials are
    /// available (JWT kind) and storage errors from the grant store
    /// (reference kind).
    pub async fn create_access_token(
        &self,
        request: &TokenCreationRequest,
        claims: &Map<String, Value>,
    ) -> AuthResult<AccessToken> {
        let lifetime_secs = request
            .client
            .access_token_lifetime
            .unwrap_or(i64::try_from(self.config.access_token_lifetime.as_secs()).unwrap_or(3600));

        match request.client.access_token_kind {
            AccessTokenKind::Reference => {
                let handle = Grant::generate_handle();
                let mut grant = Grant::new(&handle, GrantKind::ReferenceToken, &request.client.client_id);
                grant.subject_id = request.grant.subject_id.clone();
                grant.session_id = request.grant.session_id.clone();
                grant.scopes = request.grant.scopes.clone();
                grant.claims = stringify_claims(claims);
                grant.dpop_thumbprint = request.dpop_thumbprint.clone();
                grant.expires_at =
                    Some(OffsetDateTime::now_utc() + Duration::seconds(lifetime_secs));
                grant.data = request.grant.custom.clone();

                self.grants.store(&grant).await?;
                debug!(client_id = %request.client.client_id, "reference token issued");

                Ok(AccessToken {
                    token: handle,
                    lifetime_secs,
                })
            }
            AccessTokenKind::Jwt => {
                let signing = self.require_signing().await?;
                let now = OffsetDateTime::now_utc().unix_timestamp();

                let mut payload = Map::new();
                payload.insert("iss".to_string(), json!(self.resolve_issuer(request.tenant.as_ref())));
                payload.insert("client_id".to_string(), json!(request.client.client_id));
                payload.insert("iat".to_string(), json!(now));
                if self.config.emit_jwt_id {
                    payload.insert("jti".to_string(), json!(Uuid::new_v4().to_string()));
                }
                if let Some(subject) = &request.grant.subject_id {
                    payload.insert("sub".to_string(), json!(subject));
                }
                if !request.grant.scopes.is_empty() {
                    payload.insert(
                        "scope".to_string(),
                        single_or_array(&request.grant.scopes),
                    );
                }
                if let Some(session_id) = &request.grant.session_id {
                    payload.insert("sid".to_string(), json!(session_id));
                }
                if let Some(tenant) = &request.tenant {
                    payload.insert("tid".to_string(), json!(tenant.id));
                }
                if let Some(thumbprint) = &request.dpop_thumbprint {
                    payload.insert("cnf".to_string(), json!({ "jkt": thumbprint }));
                }

                // Merged claims never displace a standard claim already set
                // above; that is what keeps `sub`/`scope`/... single-valued.
                for (key, value) in claims {
                    if !payload.contains_key(key) {
                        payload.insert(key.clone(), value.clone());
                    }
                }

                let audiences = self.resolve_audiences(request).await?;
                payload.insert("aud".to_string(), single_or_array(&audiences));
                payload.insert("nbf".to_string(), json!(now));
                payload.insert("exp".to_string(), json!(now + lifetime_secs));

                let token = signing
                    .encode(&payload)
                    .map_err(|e| AuthError::internal(format!("failed to sign access token: {e}")))?;

                Ok(AccessToken {
                    token,
                    lifetime_secs,
                })
            }
        }
    }

    /// Creates an ID token.
    ///
    /// The subject is pairwise-transformed when the client configures a
    /// pairwise salt. `at_hash`/`c_hash` are the base64url-encoded left
    /// half of the SHA-256 of the access token / authorization code.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` when the grant has no subject and a fatal
    /// configuration error when no signing credentials are available.
    pub async fn create_id_token(
        &self,
        request: &TokenCreationRequest,
        claims: &Map<String, Value>,
        access_token: Option<&str>,
    ) -> AuthResult<String> {
        let subject_id = request
            .grant
            .subject_id
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("ID token requires a subject"))?;

        let signing = self.require_signing().await?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let lifetime_secs = self.resolve_id_token_lifetime(request);

        let sub = resolve_subject(
            subject_id,
            &request.client.client_id,
            request.client.pairwise_salt.as_deref(),
        );

        let mut payload = Map::new();
        payload.insert("iss".to_string(), json!(self.resolve_issuer(request.tenant.as_ref())));
        payload.insert("sub".to_string(), json!(sub));
        payload.insert("aud".to_string(), json!(request.client.client_id));
        payload.insert("iat".to_string(), json!(now));
        payload.insert("nbf".to_string(), json!(now));
        payload.insert("exp".to_string(), json!(now + lifetime_secs));
        if let Some(nonce) = &request.nonce {
            payload.insert("nonce".to_string(), json!(nonce));
        }
        if let Some(auth_time) = request.auth_time {
            payload.insert("auth_time".to_string(), json!(auth_time));
        }
        if let Some(session_id) = &request.grant.session_id {
            payload.insert("sid".to_string(), json!(session_id));
        }
        if !request.auth_methods.is_empty() {
            // `amr` is repeatable; always an array, even with one element.
            payload.insert("amr".to_string(), json!(request.auth_methods));
        }
        if let Some(acr) = &request.acr {
            payload.insert("acr".to_string(), json!(acr));
        }
        if let Some(token) = access_token {
            payload.insert("at_hash".to_string(), json!(left_half_hash(token)));
        }
        if let Some(code) = &request.authorization_code {
            payload.insert("c_hash".to_string(), json!(left_half_hash(code)));
        }

        for (key, value) in claims {
            if !payload.contains_key(key) {
                payload.insert(key.clone(), value.clone());
            }
        }

        signing
            .encode(&payload)
            .map_err(|e| AuthError::internal(format!("failed to sign ID token: {e}")))
    }

    /// Creates and persists a refresh token, returning the handle.
    ///
    /// The lifetime is the client's absolute lifetime, or the minimum of
    /// sliding and absolute when sliding expiration is configured.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the grant store.
    pub async fn create_refresh_token(
        &self,
        request: &TokenCreationRequest,
        claims: &Map<String, Value>,
    ) -> AuthResult<String> {
        let absolute = request
            .client
            .refresh_token_absolute_lifetime
            .unwrap_or(i64::try_from(self.config.refresh_token_lifetime.as_secs()).unwrap_or(0));
        let lifetime_secs = match request.client.refresh_token_sliding_lifetime {
            Some(sliding) => sliding.min(absolute),
            None => absolute,
        };

        let handle = Grant::generate_handle();
        let mut grant = Grant::new(&handle, GrantKind::RefreshToken, &request.client.client_id);
        grant.subject_id = request.grant.subject_id.clone();
        grant.session_id = request.grant.session_id.clone();
        grant.scopes = request.grant.scopes.clone();
        grant.claims = stringify_claims(claims);
        grant.dpop_thumbprint = request.dpop_thumbprint.clone();
        grant.expires_at = Some(OffsetDateTime::now_utc() + Duration::seconds(lifetime_secs));
        grant.data = request.grant.custom.clone();

        self.grants.store(&grant).await?;
        debug!(client_id = %request.client.client_id, "refresh token issued");
        Ok(handle)
    }

    /// Decides whether the response carries a refresh token.
    ///
    /// Requires the `offline_access` scope and a client that allows offline
    /// access. Client-credentials grants never receive one. For the
    /// `refresh_token` grant itself, a new token is minted only under the
    /// rotate (one-time-use) policy; re-use keeps the consumed handle alive
    /// and mints nothing.
    #[must_use]
    pub fn should_issue_refresh_token(&self, request: &TokenCreationRequest) -> bool {
        if !request.grant.has_scope("offline_access") || !request.client.allow_offline_access {
            return false;
        }
        match request.grant_type {
            GrantType::ClientCredentials => false,
            GrantType::RefreshToken => {
                request.client.refresh_token_policy == RefreshTokenPolicy::OneTimeOnly
            }
            _ => true,
        }
    }

    /// Resolves the issuer string for a tenant context.
    ///
    /// Order: tenant explicit issuer override, tenant custom domain
    /// (`https://{domain}`), server-configured issuer. Always trimmed of
    /// trailing slashes.
    #[must_use]
    pub fn resolve_issuer(&self, tenant: Option<&Tenant>) -> String {
        let raw = tenant
            .and_then(|t| t.issuer_override.clone())
            .or_else(|| {
                tenant
                    .and_then(|t| t.custom_domain.as_ref())
                    .map(|domain| format!("https://{domain}"))
            })
            .unwrap_or_else(|| self.server_issuer.clone());
        raw.trim_end_matches('/').to_string()
    }

    /// Resolves audiences for the granted scopes.
    ///
    /// Identity scopes never produce audiences; the remaining API scopes
    /// map to their owning resources' names. When nothing matches, the
    /// audience defaults to the client ID.
    async fn resolve_audiences(&self, request: &TokenCreationRequest) -> AuthResult<Vec<String>> {
        let api_scopes: Vec<String> = request
            .grant
            .scopes
            .iter()
            .filter(|s| !is_identity_scope(s))
            .cloned()
            .collect();

        let mut audiences = Vec::new();
        if !api_scopes.is_empty() {
            for resource in self.resources.find_by_scopes(&api_scopes).await? {
                if !audiences.contains(&resource.name) {
                    audiences.push(resource.name);
                }
            }
        }
        if audiences.is_empty() {
            audiences.push(request.client.client_id.clone());
        }
        Ok(audiences)
    }

    /// ID token lifetime precedence: client, then tenant, then server
    /// config, then the hardcoded fallback.
    fn resolve_id_token_lifetime(&self, request: &TokenCreationRequest) -> i64 {
        request
            .client
            .id_token_lifetime
            .or_else(|| request.tenant.as_ref().and_then(|t| t.id_token_lifetime))
            .unwrap_or_else(|| {
                i64::try_from(self.config.id_token_lifetime.as_secs())
                    .unwrap_or(ID_TOKEN_LIFETIME_FALLBACK_SECS)
            })
    }

    async fn require_signing(&self) -> AuthResult<Arc<crate::token::jwt::JwtService>> {
        match self.signing.get_signing_credentials().await? {
            Some(service) => Ok(service),
            None => {
                error!("no signing credentials configured");
                Err(AuthError::configuration("no signing credentials configured"))
            }
        }
    }
}

/// Collapses a list into a single JSON string when it has one element, an
/// array otherwise (the `aud` serialization rule).
fn single_or_array(values: &[String]) -> Value {
    if values.len() == 1 {
        json!(values[0])
    } else {
        json!(values)
    }
}

/// Base64url of the left half of SHA-256, no padding (`at_hash`/`c_hash`).
fn left_half_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Stringifies claim values for opaque grant storage.
fn stringify_claims(claims: &Map<String, Value>) -> std::collections::BTreeMap<String, String> {
    claims
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    use crate::claims::{ClaimsProvider, ClaimsProviderRegistry};
    use crate::oauth::token::GrantResult;
    use crate::storage::memory::{
        InMemoryGrantStore, InMemoryResourceStore, StaticSigningCredentials,
    };
    use crate::token::jwt::{JwtService, SigningAlgorithm, SigningKeyPair};
    use crate::types::client::Client;
    use crate::types::resource::ApiResource;

    struct RoleProvider;

    #[async_trait]
    impl ClaimsProvider for RoleProvider {
        fn name(&self) -> &str {
            "roles"
        }

        async fn get_claims(&self, _ctx: &ClaimsContext) -> AuthResult<Map<String, Value>> {
            let mut claims = Map::new();
            claims.insert("role".to_string(), json!("admin"));
            // Colliding with a standard claim must be a no-op.
            claims.insert("client_id".to_string(), json!("spoofed"));
            Ok(claims)
        }
    }

    struct Fixture {
        issuer: TokenIssuer,
        grants: Arc<InMemoryGrantStore>,
        service: Arc<JwtService>,
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    fn fixture_with(configure: impl FnOnce(&InMemoryResourceStore)) -> Fixture {
        let key = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = Arc::new(JwtService::new(key));
        let signing = Arc::new(StaticSigningCredentials::from_service(service.clone()));

        let grants = Arc::new(InMemoryGrantStore::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        configure(&resources);

        let mut registry = ClaimsProviderRegistry::new();
        registry.register(Arc::new(RoleProvider));
        let aggregator = Arc::new(ClaimsAggregator::new(
            Arc::new(registry),
            StdDuration::from_secs(1),
        ));

        let issuer = TokenIssuer::new(
            signing,
            grants.clone(),
            resources,
            aggregator,
            TokenConfig::default(),
            "https://id.example.com/",
        );
        Fixture {
            issuer,
            grants,
            service,
        }
    }

    fn user_grant(scopes: &[&str]) -> GrantResult {
        GrantResult {
            subject_id: Some("user-1".to_string()),
            session_id: Some("sess-1".to_string()),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            claims: Map::new(),
            custom: Map::new(),
        }
    }

    fn code_request(client: Client, scopes: &[&str]) -> TokenCreationRequest {
        let mut request =
            TokenCreationRequest::new(GrantType::AuthorizationCode, user_grant(scopes), client);
        request.nonce = Some("n-0S6_WzA2Mj".to_string());
        request.auth_time = Some(OffsetDateTime::now_utc().unix_timestamp() - 5);
        request.auth_methods = vec!["pwd".to_string()];
        request
    }

    fn decode(service: &JwtService, token: &str) -> Map<String, Value> {
        service.decode::<Map<String, Value>>(token).unwrap().claims
    }

    #[tokio::test]
    async fn test_jwt_access_token_standard_claims() {
        let fx = fixture();
        let request = code_request(Client::new("app"), &["openid", "profile"]);

        let response = fx.issuer.issue(&request).await.unwrap();
        let claims = decode(&fx.service, &response.access_token);

        // Trailing slash is trimmed from the configured issuer.
        assert_eq!(claims["iss"], json!("https://id.example.com"));
        assert_eq!(claims["client_id"], json!("app"));
        assert_eq!(claims["sub"], json!("user-1"));
        assert_eq!(claims["sid"], json!("sess-1"));
        assert!(claims.contains_key("jti"));
        assert!(claims.contains_key("nbf"));
        assert!(claims.contains_key("exp"));
        // Identity-only scopes: audience defaults to the client ID.
        assert_eq!(claims["aud"], json!("app"));
        // Provider claim came through; the spoofed standard claim did not.
        assert_eq!(claims["role"], json!("admin"));
        assert_eq!(claims["client_id"], json!("app"));
        assert_eq!(response.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_audiences_resolve_to_resource_names() {
        let fx = fixture_with(|resources| {
            resources.insert(ApiResource::new(
                "inventory-api",
                vec!["inventory.read".to_string()],
            ));
            resources.insert(ApiResource::new(
                "billing-api",
                vec!["billing.read".to_string()],
            ));
        });
        let request = code_request(
            Client::new("app"),
            &["openid", "inventory.read", "billing.read"],
        );

        let response = fx.issuer.issue(&request).await.unwrap();
        let claims = decode(&fx.service, &response.access_token);

        assert_eq!(claims["aud"], json!(["inventory-api", "billing-api"]));
    }

    #[tokio::test]
    async fn test_reference_token_persists_opaque_grant() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.access_token_kind = AccessTokenKind::Reference;
        let mut request = code_request(client, &["openid", "profile"]);
        request.dpop_thumbprint = Some("0ZcOCORZNYy-DWpqq30jZyJGHTN0d2HglBV3uiguA4I".to_string());

        let response = fx.issuer.issue(&request).await.unwrap();

        // The handle is the only thing returned; it is not a JWT.
        assert_eq!(response.access_token.len(), 43);
        assert_eq!(response.access_token.split('.').count(), 1);
        assert_eq!(response.token_type, "DPoP");

        let stored = fx
            .grants
            .find_by_hash(&Grant::hash_handle(&response.access_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.kind, GrantKind::ReferenceToken);
        assert_eq!(stored.subject_id.as_deref(), Some("user-1"));
        assert_eq!(stored.session_id.as_deref(), Some("sess-1"));
        assert!(stored.dpop_thumbprint.is_some());
        assert_eq!(stored.claims.get("role").unwrap(), "admin");
    }

    #[tokio::test]
    async fn test_id_token_claims() {
        let fx = fixture();
        let mut request = code_request(Client::new("app"), &["openid"]);
        request.authorization_code = Some("the-code".to_string());

        let response = fx.issuer.issue(&request).await.unwrap();
        let id_token = response.id_token.expect("openid scope grants an ID token");
        let claims = decode(&fx.service, &id_token);

        assert_eq!(claims["sub"], json!("user-1"));
        assert_eq!(claims["aud"], json!("app"));
        assert_eq!(claims["nonce"], json!("n-0S6_WzA2Mj"));
        assert_eq!(claims["amr"], json!(["pwd"]));
        assert!(claims.contains_key("auth_time"));
        assert_eq!(claims["sid"], json!("sess-1"));

        // at_hash/c_hash: left half of SHA-256, base64url without padding.
        assert_eq!(
            claims["at_hash"],
            json!(left_half_hash(&response.access_token))
        );
        assert_eq!(claims["c_hash"], json!(left_half_hash("the-code")));
        let at_hash = claims["at_hash"].as_str().unwrap();
        assert_eq!(at_hash.len(), 22);
        assert!(!at_hash.contains('='));
    }

    #[tokio::test]
    async fn test_id_token_pairwise_subject() {
        let fx = fixture();

        let mut client_a = Client::new("client-a");
        client_a.pairwise_salt = Some("salt".to_string());
        let mut client_b = Client::new("client-b");
        client_b.pairwise_salt = Some("salt".to_string());

        let token_a = fx
            .issuer
            .issue(&code_request(client_a, &["openid"]))
            .await
            .unwrap()
            .id_token
            .unwrap();
        let token_b = fx
            .issuer
            .issue(&code_request(client_b, &["openid"]))
            .await
            .unwrap()
            .id_token
            .unwrap();

        let sub_a = decode(&fx.service, &token_a)["sub"].clone();
        let sub_b = decode(&fx.service, &token_b)["sub"].clone();

        assert_ne!(sub_a, json!("user-1"));
        assert_ne!(sub_a, sub_b);
    }

    #[tokio::test]
    async fn test_id_token_lifetime_precedence() {
        let fx = fixture();

        // Client setting wins over tenant and server defaults.
        let mut client = Client::new("app");
        client.id_token_lifetime = Some(120);
        let mut tenant = Tenant::new("acme", "Acme");
        tenant.id_token_lifetime = Some(600);
        let mut request = code_request(client, &["openid"]);
        request.tenant = Some(tenant.clone());

        let token = fx.issuer.issue(&request).await.unwrap().id_token.unwrap();
        let claims = decode(&fx.service, &token);
        let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
        assert_eq!(lifetime, 120);

        // Without a client setting the tenant default applies.
        let mut request = code_request(Client::new("app"), &["openid"]);
        request.tenant = Some(tenant);
        let token = fx.issuer.issue(&request).await.unwrap().id_token.unwrap();
        let claims = decode(&fx.service, &token);
        let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
        assert_eq!(lifetime, 600);
    }

    #[tokio::test]
    async fn test_tenant_issuer_resolution() {
        let fx = fixture();

        let mut tenant = Tenant::new("acme", "Acme");
        assert_eq!(
            fx.issuer.resolve_issuer(Some(&tenant)),
            "https://id.example.com"
        );

        tenant.custom_domain = Some("login.acme.com".to_string());
        assert_eq!(
            fx.issuer.resolve_issuer(Some(&tenant)),
            "https://login.acme.com"
        );

        tenant.issuer_override = Some("https://auth.acme.com/tenants/acme/".to_string());
        assert_eq!(
            fx.issuer.resolve_issuer(Some(&tenant)),
            "https://auth.acme.com/tenants/acme"
        );
    }

    #[tokio::test]
    async fn test_refresh_token_issued_for_offline_access() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.allow_offline_access = true;
        let request = code_request(client, &["openid", "offline_access"]);

        let response = fx.issuer.issue(&request).await.unwrap();
        let handle = response.refresh_token.expect("offline_access grants one");

        let stored = fx
            .grants
            .find_by_hash(&Grant::hash_handle(&handle))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.kind, GrantKind::RefreshToken);
        assert!(stored.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_requires_client_opt_in() {
        let fx = fixture();
        // offline_access scope alone is not enough.
        let request = code_request(Client::new("app"), &["openid", "offline_access"]);
        let response = fx.issuer.issue(&request).await.unwrap();
        assert!(response.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_sliding_lifetime_takes_minimum() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.allow_offline_access = true;
        client.refresh_token_absolute_lifetime = Some(1000);
        client.refresh_token_sliding_lifetime = Some(300);
        let request = code_request(client, &["openid", "offline_access"]);

        let handle = fx
            .issuer
            .issue(&request)
            .await
            .unwrap()
            .refresh_token
            .unwrap();
        let stored = fx
            .grants
            .find_by_hash(&Grant::hash_handle(&handle))
            .await
            .unwrap()
            .unwrap();

        let lifetime = (stored.expires_at.unwrap() - stored.created_at).whole_seconds();
        assert!((299..=301).contains(&lifetime));
    }

    #[tokio::test]
    async fn test_rotation_removes_consumed_handle() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.allow_offline_access = true;
        client.refresh_token_policy = RefreshTokenPolicy::OneTimeOnly;

        // Seed the grant being exchanged.
        let old_handle = Grant::generate_handle();
        let old_grant = Grant::new(&old_handle, GrantKind::RefreshToken, "app");
        fx.grants.store(&old_grant).await.unwrap();

        let mut request = TokenCreationRequest::new(
            GrantType::RefreshToken,
            user_grant(&["openid", "offline_access"]),
            client,
        );
        request.consumed_refresh_token = Some(old_handle.clone());

        let response = fx.issuer.issue(&request).await.unwrap();
        let new_handle = response.refresh_token.expect("rotation mints a new token");
        assert_ne!(new_handle, old_handle);

        // The consumed handle no longer validates.
        assert!(
            fx.grants
                .find_by_hash(&Grant::hash_handle(&old_handle))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            fx.grants
                .find_by_hash(&Grant::hash_handle(&new_handle))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_reuse_policy_stamps_last_used_in_background() {
        let fx = fixture();
        let tasks = Arc::new(crate::background::BackgroundTasks::spawn(
            fx.grants.clone(),
            16,
        ));
        let issuer = TokenIssuer::new(
            Arc::new(StaticSigningCredentials::from_service(fx.service.clone())),
            fx.grants.clone(),
            Arc::new(InMemoryResourceStore::new()),
            Arc::new(ClaimsAggregator::new(
                Arc::new(ClaimsProviderRegistry::new()),
                StdDuration::from_secs(1),
            )),
            TokenConfig::default(),
            "https://id.example.com",
        )
        .with_background_tasks(tasks.clone());

        let mut client = Client::new("app");
        client.allow_offline_access = true;
        client.refresh_token_policy = RefreshTokenPolicy::ReUse;

        let old_handle = Grant::generate_handle();
        fx.grants
            .store(&Grant::new(&old_handle, GrantKind::RefreshToken, "app"))
            .await
            .unwrap();

        let mut request = TokenCreationRequest::new(
            GrantType::RefreshToken,
            user_grant(&["openid", "offline_access"]),
            client,
        );
        request.consumed_refresh_token = Some(old_handle.clone());

        issuer.issue(&request).await.unwrap();

        // Drain the queue, then the stamp is visible.
        drop(issuer);
        Arc::try_unwrap(tasks).ok().unwrap().shutdown().await;
        assert!(fx.grants.last_used(&Grant::hash_handle(&old_handle)).is_some());
    }

    #[tokio::test]
    async fn test_reuse_policy_keeps_old_handle_and_mints_nothing() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.allow_offline_access = true;
        client.refresh_token_policy = RefreshTokenPolicy::ReUse;

        let old_handle = Grant::generate_handle();
        let old_grant = Grant::new(&old_handle, GrantKind::RefreshToken, "app");
        fx.grants.store(&old_grant).await.unwrap();

        let mut request = TokenCreationRequest::new(
            GrantType::RefreshToken,
            user_grant(&["openid", "offline_access"]),
            client,
        );
        request.consumed_refresh_token = Some(old_handle.clone());

        let response = fx.issuer.issue(&request).await.unwrap();
        assert!(response.refresh_token.is_none());
        assert!(
            fx.grants
                .find_by_hash(&Grant::hash_handle(&old_handle))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_client_credentials_never_gets_id_or_refresh_token() {
        let fx = fixture();
        let mut client = Client::new("machine");
        client.allow_offline_access = true;

        let grant = GrantResult {
            subject_id: None,
            session_id: None,
            scopes: vec![
                "openid".to_string(),
                "offline_access".to_string(),
                "api:read".to_string(),
            ],
            claims: Map::new(),
            custom: Map::new(),
        };
        let request = TokenCreationRequest::new(GrantType::ClientCredentials, grant, client);

        let response = fx.issuer.issue(&request).await.unwrap();
        assert!(response.id_token.is_none());
        assert!(response.refresh_token.is_none());

        // No subject: providers were not invoked, `sub` is absent.
        let claims = decode(&fx.service, &response.access_token);
        assert!(!claims.contains_key("sub"));
        assert!(!claims.contains_key("role"));
    }

    #[tokio::test]
    async fn test_token_exchange_sets_issued_token_type() {
        let fx = fixture();
        let mut client = Client::new("app");
        client.allowed_grant_types.push(GrantType::TokenExchange);
        let request = TokenCreationRequest::new(
            GrantType::TokenExchange,
            user_grant(&["api:read"]),
            client,
        );

        let response = fx.issuer.issue(&request).await.unwrap();
        assert_eq!(
            response.issued_token_type.as_deref(),
            Some("urn:ietf:params:oauth:token-type:access_token")
        );
        assert!(response.id_token.is_none());
    }

    #[tokio::test]
    async fn test_missing_signing_key_is_fatal() {
        let aggregator = Arc::new(ClaimsAggregator::new(
            Arc::new(ClaimsProviderRegistry::new()),
            StdDuration::from_secs(1),
        ));
        let issuer = TokenIssuer::new(
            Arc::new(StaticSigningCredentials::empty()),
            Arc::new(InMemoryGrantStore::new()),
            Arc::new(InMemoryResourceStore::new()),
            aggregator,
            TokenConfig::default(),
            "https://id.example.com",
        );

        let request = code_request(Client::new("app"), &["openid"]);
        let err = issuer.issue(&request).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.oauth_error_code(), "server_error");
    }
}
