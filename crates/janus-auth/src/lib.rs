//! # janus-auth
//!
//! Authentication coordination and token issuance core for the Janus
//! multi-tenant OAuth 2.0 / OpenID Connect provider.
//!
//! This crate provides:
//! - PKCE validation and generation (RFC 7636)
//! - Correlation-ID keyed tracking of in-flight protocol requests
//! - A configurable multi-step authentication journey engine
//! - Claims aggregation over pluggable providers
//! - Access/ID/refresh token issuance with audience resolution, pairwise
//!   subjects, and DPoP binding
//! - The authentication coordinator deciding UI mode, session reuse, and
//!   consent
//!
//! ## Overview
//!
//! Transports (HTTP routing, cookies) and durable stores live in other
//! crates; everything here is expressed against the storage traits in
//! [`storage`]. An inbound authorization request enters the
//! [`coordinator`], which parks the request under a correlation ID, runs a
//! journey (or a standalone/headless path), resumes the request on
//! callback, checks consent, and hands a grant to the [`token`] issuer.
//!
//! ## Modules
//!
//! - [`config`] - server-wide defaults and precedence-chain bottoms
//! - [`oauth`] - PKCE, protocol state, token wire types
//! - [`claims`] - claims providers and the aggregation merge
//! - [`token`] - JWT signing, pairwise subjects, token issuance
//! - [`journey`] - the step engine state machine
//! - [`coordinator`] - the top-level authorization orchestrator
//! - [`storage`] - storage traits plus in-memory implementations
//! - [`background`] - deferred side-effect queue
//! - [`bag`] - typed key/value store for journey data

pub mod background;
pub mod bag;
pub mod claims;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod journey;
pub mod oauth;
pub mod storage;
pub mod token;
pub mod types;

pub use bag::{BagValue, DataBag};
pub use config::{AuthConfig, ConfigError};
pub use coordinator::{
    AuthRequirements, AuthenticationCoordinator, AuthenticationRequirement, AuthorizationOutcome,
    ConsentRequirements, Prompt, ResumedAuthorization, UiMode,
};
pub use error::{AuthError, ErrorCategory};
pub use journey::{
    AdvanceOutcome, JourneyEngine, JourneyState, JourneyStatus, StepConfig, StepExecutionContext,
    StepHandler, StepHandlerRegistry, StepOutcome,
};
pub use oauth::{GrantResult, ProtocolState, TokenCreationRequest, TokenResponse};
pub use token::{JwtService, SigningAlgorithm, SigningKeyPair, TokenIssuer};
pub use types::{AccessTokenKind, ApiResource, Client, Grant, GrantKind, GrantType, JourneyPolicy,
    PolicyKind, RefreshTokenPolicy, Tenant};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use janus_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bag::{BagValue, DataBag};
    pub use crate::claims::{ClaimsAggregator, ClaimsContext, ClaimsProvider, ClaimsProviderRegistry};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::coordinator::{
        AuthRequirements, AuthenticationCoordinator, AuthenticationRequirement,
        AuthorizationOutcome, ConsentRequirements, Prompt, ResumedAuthorization, UiMode,
    };
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::journey::{
        AdvanceOutcome, JourneyEngine, JourneyState, JourneyStatus, StepConfig,
        StepExecutionContext, StepHandler, StepHandlerRegistry, StepOutcome,
    };
    pub use crate::oauth::{GrantResult, ProtocolState, TokenCreationRequest, TokenResponse};
    pub use crate::storage::{
        ClientStore, GrantStore, JourneyStore, PolicyStore, ProtocolStateStore, ResourceStore,
        SessionStore, SigningCredentialProvider, TenantStore, UserStore,
    };
    pub use crate::token::{JwtService, SigningAlgorithm, SigningKeyPair, TokenIssuer};
    pub use crate::types::{
        AccessTokenKind, ApiResource, Client, Grant, GrantKind, GrantType, JourneyPolicy,
        PolicyKind, RefreshTokenPolicy, Tenant,
    };
}
