//! In-memory store implementations.
//!
//! Process-local backends for every storage trait, suitable for tests and
//! embedded single-node deployments. Durable backends live in separate
//! crates; these implementations still honor the atomicity contracts
//! (single-use `take`, remove-before-store rotation visibility) because the
//! security invariants depend on them even in-process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::journey::state::JourneyState;
use crate::oauth::protocol_state::ProtocolState;
use crate::storage::directory::{ClientStore, PolicyStore, ResourceStore, TenantStore};
use crate::storage::grant::GrantStore;
use crate::storage::journey::JourneyStore;
use crate::storage::protocol_state::ProtocolStateStore;
use crate::storage::signing::SigningCredentialProvider;
use crate::storage::user::{SessionStore, User, UserSession, UserStore};
use crate::token::jwt::{JwtService, SigningKeyPair};
use crate::types::client::Client;
use crate::types::grant::Grant;
use crate::types::policy::{JourneyPolicy, PolicyKind};
use crate::types::resource::ApiResource;
use crate::types::tenant::Tenant;

fn poisoned<T>(_: T) -> AuthError {
    AuthError::storage("store lock poisoned")
}

// ============================================================================
// Protocol State
// ============================================================================

struct StoredProtocolState {
    state: ProtocolState,
    expires_at: OffsetDateTime,
}

/// In-memory protocol state store.
///
/// `take` removes the entry under the write lock before the expiry check,
/// so a correlation ID resolves at most once even when racing consumers.
#[derive(Default)]
pub struct InMemoryProtocolStateStore {
    entries: RwLock<HashMap<String, StoredProtocolState>>,
}

impl InMemoryProtocolStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProtocolStateStore for InMemoryProtocolStateStore {
    async fn store(&self, state: ProtocolState, ttl: Duration) -> AuthResult<String> {
        let correlation_id = ProtocolState::generate_correlation_id();
        let expires_at = OffsetDateTime::now_utc()
            + time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        self.entries.write().map_err(poisoned)?.insert(
            correlation_id.clone(),
            StoredProtocolState { state, expires_at },
        );
        Ok(correlation_id)
    }

    async fn get(&self, correlation_id: &str) -> AuthResult<Option<ProtocolState>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .get(correlation_id)
            .filter(|e| e.expires_at > OffsetDateTime::now_utc())
            .map(|e| e.state.clone()))
    }

    async fn take(&self, correlation_id: &str) -> AuthResult<Option<ProtocolState>> {
        let removed = self
            .entries
            .write()
            .map_err(poisoned)?
            .remove(correlation_id);
        Ok(removed
            .filter(|e| e.expires_at > OffsetDateTime::now_utc())
            .map(|e| e.state))
    }

    async fn remove(&self, correlation_id: &str) -> AuthResult<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .remove(correlation_id);
        Ok(())
    }
}

// ============================================================================
// Grants
// ============================================================================

/// In-memory grant store.
#[derive(Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<HashMap<String, Grant>>,
    last_used: RwLock<HashMap<String, OffsetDateTime>>,
}

impl InMemoryGrantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns when a grant was last touched (test observability).
    #[must_use]
    pub fn last_used(&self, handle_hash: &str) -> Option<OffsetDateTime> {
        self.last_used.read().ok()?.get(handle_hash).copied()
    }

    /// Returns the number of stored grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Returns `true` if no grants are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn store(&self, grant: &Grant) -> AuthResult<()> {
        self.grants
            .write()
            .map_err(poisoned)?
            .insert(grant.handle_hash.clone(), grant.clone());
        Ok(())
    }

    async fn find_by_hash(&self, handle_hash: &str) -> AuthResult<Option<Grant>> {
        Ok(self
            .grants
            .read()
            .map_err(poisoned)?
            .get(handle_hash)
            .cloned())
    }

    async fn remove_by_hash(&self, handle_hash: &str) -> AuthResult<()> {
        self.grants.write().map_err(poisoned)?.remove(handle_hash);
        Ok(())
    }

    async fn touch(&self, handle_hash: &str, used_at: OffsetDateTime) -> AuthResult<()> {
        self.last_used
            .write()
            .map_err(poisoned)?
            .insert(handle_hash.to_string(), used_at);
        Ok(())
    }
}

// ============================================================================
// Directory
// ============================================================================

/// In-memory client store.
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client.
    pub fn insert(&self, client: Client) {
        if let Ok(mut clients) = self.clients.write() {
            clients.insert(client.client_id.clone(), client);
        }
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn find_by_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self
            .clients
            .read()
            .map_err(poisoned)?
            .get(client_id)
            .cloned())
    }
}

/// In-memory tenant store.
#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tenant.
    pub fn insert(&self, tenant: Tenant) {
        if let Ok(mut tenants) = self.tenants.write() {
            tenants.insert(tenant.id.clone(), tenant);
        }
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn find_by_id(&self, tenant_id: &str) -> AuthResult<Option<Tenant>> {
        Ok(self
            .tenants
            .read()
            .map_err(poisoned)?
            .get(tenant_id)
            .cloned())
    }
}

/// In-memory resource store.
#[derive(Default)]
pub struct InMemoryResourceStore {
    resources: RwLock<Vec<ApiResource>>,
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource.
    pub fn insert(&self, resource: ApiResource) {
        if let Ok(mut resources) = self.resources.write() {
            resources.push(resource);
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn find_by_scopes(&self, scopes: &[String]) -> AuthResult<Vec<ApiResource>> {
        Ok(self
            .resources
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|r| r.enabled && scopes.iter().any(|s| r.owns_scope(s)))
            .cloned()
            .collect())
    }
}

/// In-memory policy store.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<JourneyPolicy>>,
}

impl InMemoryPolicyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy.
    pub fn insert(&self, policy: JourneyPolicy) {
        if let Ok(mut policies) = self.policies.write() {
            policies.push(policy);
        }
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn find_by_id(&self, policy_id: &str) -> AuthResult<Option<JourneyPolicy>> {
        Ok(self
            .policies
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|p| p.id == policy_id)
            .cloned())
    }

    async fn find_by_kind(
        &self,
        tenant_id: Option<&str>,
        kind: PolicyKind,
    ) -> AuthResult<Option<JourneyPolicy>> {
        let policies = self.policies.read().map_err(poisoned)?;
        // Tenant-scoped policies shadow server-wide ones.
        let tenant_match = policies
            .iter()
            .find(|p| p.enabled && p.kind == kind && p.tenant_id.as_deref() == tenant_id);
        let found = tenant_match.or_else(|| {
            policies
                .iter()
                .find(|p| p.enabled && p.kind == kind && p.tenant_id.is_none())
        });
        Ok(found.cloned())
    }
}

// ============================================================================
// Users and Sessions
// ============================================================================

/// In-memory user store.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub fn insert(&self, user: User) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user.id.clone(), user);
        }
    }

    /// Deletes a user (stale-session scenarios in tests).
    pub fn delete(&self, user_id: &str) {
        if let Ok(mut users) = self.users.write() {
            users.remove(user_id);
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> AuthResult<Option<User>> {
        Ok(self.users.read().map_err(poisoned)?.get(user_id).cloned())
    }
}

/// In-memory session store, keyed by session token.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under a token.
    pub fn insert(&self, token: impl Into<String>, session: UserSession) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(token.into(), session);
        }
    }

    /// Returns `true` if a session with the given ID exists.
    #[must_use]
    pub fn contains_session(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .map(|s| s.values().any(|v| v.id == session_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store(&self, session: &UserSession) -> AuthResult<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> AuthResult<Option<UserSession>> {
        Ok(self.sessions.read().map_err(poisoned)?.get(token).cloned())
    }

    async fn remove(&self, session_id: &str) -> AuthResult<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .retain(|_, s| s.id != session_id);
        Ok(())
    }
}

// ============================================================================
// Journeys
// ============================================================================

/// In-memory journey state store.
#[derive(Default)]
pub struct InMemoryJourneyStore {
    journeys: RwLock<HashMap<Uuid, JourneyState>>,
}

impl InMemoryJourneyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JourneyStore for InMemoryJourneyStore {
    async fn save(&self, state: &JourneyState) -> AuthResult<()> {
        self.journeys
            .write()
            .map_err(poisoned)?
            .insert(state.id, state.clone());
        Ok(())
    }

    async fn find_by_id(&self, journey_id: Uuid) -> AuthResult<Option<JourneyState>> {
        Ok(self
            .journeys
            .read()
            .map_err(poisoned)?
            .get(&journey_id)
            .cloned())
    }

    async fn remove(&self, journey_id: Uuid) -> AuthResult<()> {
        self.journeys.write().map_err(poisoned)?.remove(&journey_id);
        Ok(())
    }
}

// ============================================================================
// Signing Credentials
// ============================================================================

/// Signing credential provider holding one static key.
#[derive(Default)]
pub struct StaticSigningCredentials {
    service: RwLock<Option<Arc<JwtService>>>,
}

impl StaticSigningCredentials {
    /// Creates a provider with the given key pair.
    #[must_use]
    pub fn new(key: SigningKeyPair) -> Self {
        Self::from_service(Arc::new(JwtService::new(key)))
    }

    /// Creates a provider over an existing signing service.
    #[must_use]
    pub fn from_service(service: Arc<JwtService>) -> Self {
        Self {
            service: RwLock::new(Some(service)),
        }
    }

    /// Creates a provider with no key (misconfiguration scenarios).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SigningCredentialProvider for StaticSigningCredentials {
    async fn get_signing_credentials(&self) -> AuthResult<Option<Arc<JwtService>>> {
        Ok(self.service.read().map_err(poisoned)?.clone())
    }
}
