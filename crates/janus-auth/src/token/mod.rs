//! Token issuance.
//!
//! - [`jwt`] - signing keys and JWT encode/decode
//! - [`subject`] - pairwise subject computation
//! - [`issuer`] - access/ID/refresh token production

pub mod issuer;
pub mod jwt;
pub mod subject;

pub use issuer::{AccessToken, TokenIssuer};
pub use jwt::{JwtError, JwtService, SigningAlgorithm, SigningKeyPair};
pub use subject::{compute_pairwise_subject, resolve_subject};
