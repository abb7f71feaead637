//! Journey state store trait.
//!
//! Journey state lives across several browser round trips; the store is the
//! only place it survives between engine invocations.
//!
//! # Implementation Notes
//!
//! - State should be evicted some time after its terminal transition
//! - Lookups of expired journeys still return the record; the engine owns
//!   the lazy transition to `Expired`

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::journey::state::JourneyState;

/// Storage for journey state.
#[async_trait]
pub trait JourneyStore: Send + Sync {
    /// Persists journey state, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be stored.
    async fn save(&self, state: &JourneyState) -> AuthResult<()>;

    /// Finds journey state by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, journey_id: Uuid) -> AuthResult<Option<JourneyState>>;

    /// Removes journey state.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn remove(&self, journey_id: Uuid) -> AuthResult<()>;
}
