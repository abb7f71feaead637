//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Parked protocol state (correlation-ID keyed, single use)
//! - Opaque grant records (codes, refresh tokens, reference tokens)
//! - Read-only directory lookups (clients, tenants, resources, policies)
//! - Users, sessions, and journey state
//! - Signing credentials
//!
//! # Implementations
//!
//! Durable backends live in separate crates; [`memory`] provides in-memory
//! implementations for tests and embedded use, and [`cache`] provides a
//! read-through cache over a durable grant store.

pub mod cache;
pub mod directory;
pub mod grant;
pub mod journey;
pub mod memory;
pub mod protocol_state;
pub mod signing;
pub mod user;

pub use cache::CachedGrantStore;
pub use directory::{ClientStore, PolicyStore, ResourceStore, TenantStore};
pub use grant::GrantStore;
pub use journey::JourneyStore;
pub use protocol_state::ProtocolStateStore;
pub use signing::SigningCredentialProvider;
pub use user::{SessionStore, User, UserSession, UserStore};
