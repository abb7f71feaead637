//! Read-only directory store traits.
//!
//! Clients, tenants, API resources, and journey policies are administered
//! elsewhere; this core only reads them. The lookups here feed policy
//! resolution, UI-mode resolution, and audience resolution.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::client::Client;
use crate::types::policy::{JourneyPolicy, PolicyKind};
use crate::types::resource::ApiResource;
use crate::types::tenant::Tenant;

/// Lookup of registered OAuth clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Finds a client by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, client_id: &str) -> AuthResult<Option<Client>>;
}

/// Lookup of tenants.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Finds a tenant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, tenant_id: &str) -> AuthResult<Option<Tenant>>;
}

/// Lookup of protected API resources for audience resolution.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Returns the enabled resources owning any of the given scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_scopes(&self, scopes: &[String]) -> AuthResult<Vec<ApiResource>>;
}

/// Lookup of journey policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Finds a policy by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, policy_id: &str) -> AuthResult<Option<JourneyPolicy>>;

    /// Finds the enabled policy of a kind for a tenant (falling back to
    /// server-wide policies when the tenant has none).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_kind(
        &self,
        tenant_id: Option<&str>,
        kind: PolicyKind,
    ) -> AuthResult<Option<JourneyPolicy>>;
}
