//! Domain types shared across the authentication core.

pub mod client;
pub mod grant;
pub mod policy;
pub mod resource;
pub mod tenant;

pub use client::{AccessTokenKind, Client, GrantType, RefreshTokenPolicy};
pub use grant::{Grant, GrantKind};
pub use policy::{JourneyPolicy, PolicyKind};
pub use resource::{ApiResource, IDENTITY_SCOPES, is_identity_scope};
pub use tenant::Tenant;
