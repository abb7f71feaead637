//! Protocol state store trait.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Store state with a short TTL (10 minutes by default)
//! - Make `take` effectively single-use: a correlation ID must never
//!   resolve twice, even under concurrent resume attempts
//!   (compare-and-delete semantics recommended)
//! - Clean up expired state periodically
//!
//! # Security Considerations
//!
//! - Correlation IDs are bearer secrets; store them hashed or with access
//!   controls equivalent to authorization codes
//! - Replay of a consumed correlation ID is an attack; `take` is the only
//!   read the resume path may use

use std::time::Duration;

use async_trait::async_trait;

use crate::AuthResult;
use crate::oauth::protocol_state::ProtocolState;

/// Storage for parked in-flight protocol requests.
#[async_trait]
pub trait ProtocolStateStore: Send + Sync {
    /// Stores protocol state and returns the correlation ID under which it
    /// can be resumed. The state expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be stored.
    async fn store(&self, state: ProtocolState, ttl: Duration) -> AuthResult<String>;

    /// Looks up state without consuming it.
    ///
    /// Returns `None` for unknown or expired correlation IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, correlation_id: &str) -> AuthResult<Option<ProtocolState>>;

    /// Retrieves and removes state in one step (single use).
    ///
    /// Returns `None` for unknown, expired, or already-consumed IDs. At most
    /// one caller may ever receive the state for a given ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn take(&self, correlation_id: &str) -> AuthResult<Option<ProtocolState>>;

    /// Removes state without returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    async fn remove(&self, correlation_id: &str) -> AuthResult<()>;
}
