//! OAuth 2.0 / OIDC protocol building blocks.
//!
//! - [`pkce`] - RFC 7636 challenge/verifier validation and generation
//! - [`protocol_state`] - parked in-flight requests keyed by correlation ID
//! - [`token`] - token endpoint wire types

pub mod pkce;
pub mod protocol_state;
pub mod token;

pub use pkce::{
    CodeChallengeMethod, PkceError, PkcePolicy, generate_code_challenge, generate_code_verifier,
    validate_code_challenge, validate_code_verifier,
};
pub use protocol_state::{
    CORRELATION_PARAM, DEFAULT_PROTOCOL_STATE_EXPIRY_SECS, EndpointKind, ProtocolState,
};
pub use token::{ErrorResponse, GrantResult, TokenCreationRequest, TokenResponse};
