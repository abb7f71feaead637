//! Grant store trait.
//!
//! Authorization codes, refresh tokens, and reference access tokens are all
//! persisted as opaque [`Grant`] records keyed by the SHA-256 hash of their
//! handle.
//!
//! # Implementation Notes
//!
//! - Refresh token rotation relies on `remove_by_hash` being visible before
//!   or atomically with the replacement's `store`; a window where old and
//!   new handles both validate breaks the rotation guarantee
//! - Expired grants should be cleaned up periodically

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::grant::Grant;

/// Storage for opaque grant records.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Persists a grant record.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be stored.
    async fn store(&self, grant: &Grant) -> AuthResult<()>;

    /// Finds a grant by handle hash.
    ///
    /// Returns `None` for unknown hashes. Expiration is the caller's check;
    /// implementations may additionally drop expired records.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, handle_hash: &str) -> AuthResult<Option<Grant>>;

    /// Removes a grant by handle hash.
    ///
    /// Removing an unknown hash is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn remove_by_hash(&self, handle_hash: &str) -> AuthResult<()>;

    /// Records when a grant was last used.
    ///
    /// Issued off the request path through the background task queue;
    /// failures are logged, never surfaced to token requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    async fn touch(&self, handle_hash: &str, used_at: OffsetDateTime) -> AuthResult<()>;
}
