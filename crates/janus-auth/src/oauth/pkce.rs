//! PKCE (Proof Key for Code Exchange) validation and generation.
//!
//! Implements RFC 7636 with both `plain` and `S256` methods. The `plain`
//! method is rejected unless a client's policy explicitly allows it; `S256`
//! is the default expectation.
//!
//! Challenge-phase failures (authorization request) map to `invalid_request`;
//! verifier-phase failures (token request) map to `invalid_grant`.
//!
//! # Example
//!
//! ```
//! use janus_auth::oauth::pkce::{
//!     CodeChallengeMethod, PkcePolicy, generate_code_challenge, generate_code_verifier,
//!     validate_code_challenge, validate_code_verifier,
//! };
//!
//! let verifier = generate_code_verifier();
//! let challenge = generate_code_challenge(&verifier, CodeChallengeMethod::S256);
//!
//! let policy = PkcePolicy::default();
//! validate_code_challenge(Some(&challenge), Some("S256"), &policy).unwrap();
//! validate_code_verifier(&verifier, &challenge, CodeChallengeMethod::S256).unwrap();
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// Minimum challenge/verifier length per RFC 7636.
const MIN_LENGTH: usize = 43;

/// Maximum challenge/verifier length per RFC 7636.
const MAX_LENGTH: usize = 128;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// A code challenge is required by policy but was not supplied.
    #[error("Code challenge is required")]
    MissingChallenge,

    /// Challenge length is outside the valid range (43-128 characters).
    #[error("Invalid challenge length: must be 43-128 characters, got {0}")]
    InvalidChallengeLength(usize),

    /// Challenge contains invalid characters.
    #[error("Code challenge contains invalid characters")]
    InvalidChallengeCharacters,

    /// Unsupported challenge method (only "plain" and "S256" exist).
    #[error("Unsupported code challenge method: {0}")]
    UnsupportedMethod(String),

    /// The "plain" method was used but is not allowed by policy.
    #[error("Code challenge method \"plain\" is not allowed")]
    PlainNotAllowed,

    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Code verifier contains invalid characters")]
    InvalidVerifierCharacters,

    /// PKCE verification failed (verifier doesn't match challenge).
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` if this error belongs to the challenge phase
    /// (authorization request validation).
    #[must_use]
    pub fn is_challenge_error(&self) -> bool {
        matches!(
            self,
            Self::MissingChallenge
                | Self::InvalidChallengeLength(_)
                | Self::InvalidChallengeCharacters
                | Self::UnsupportedMethod(_)
                | Self::PlainNotAllowed
        )
    }

    /// Returns `true` if this error belongs to the verifier phase
    /// (token request validation).
    #[must_use]
    pub fn is_verifier_error(&self) -> bool {
        !self.is_challenge_error()
    }

    /// Returns the OAuth 2.0 error code for this error.
    ///
    /// Challenge-phase failures surface on the authorization endpoint as
    /// `invalid_request`; verifier-phase failures surface on the token
    /// endpoint as `invalid_grant`.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        if self.is_challenge_error() {
            "invalid_request"
        } else {
            "invalid_grant"
        }
    }
}

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE code challenge transformation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeChallengeMethod {
    /// The challenge is the verifier itself. Rejected unless policy
    /// explicitly allows it.
    Plain,
    /// The challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`.
    S256,
}

impl CodeChallengeMethod {
    /// Parses a challenge method from an optional request parameter.
    ///
    /// A missing method defaults to `plain` per RFC 7636 §4.3 (and is then
    /// rejected under the default policy, which disallows plain).
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for anything other than
    /// "plain" or "S256".
    pub fn parse(method: Option<&str>) -> Result<Self, PkceError> {
        match method {
            None | Some("plain") => Ok(Self::Plain),
            Some("S256") => Ok(Self::S256),
            Some(other) => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Returns the method as the wire-level string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Per-client PKCE requirements applied at the authorization endpoint.
#[derive(Debug, Clone, Copy)]
pub struct PkcePolicy {
    /// Whether a code challenge must be present.
    pub required: bool,
    /// Whether the "plain" method is acceptable.
    pub allow_plain: bool,
}

impl Default for PkcePolicy {
    fn default() -> Self {
        Self {
            required: true,
            allow_plain: false,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Returns `true` if every character is in the base64url alphabet
/// `[A-Za-z0-9-_]`.
fn is_base64url(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validates a code challenge received on the authorization endpoint.
///
/// # Errors
///
/// All failures map to `invalid_request`:
/// - challenge required by policy but missing
/// - length outside 43-128 characters
/// - characters outside the base64url alphabet
/// - unknown challenge method
/// - "plain" method when the policy disallows it (a missing method defaults
///   to "plain" and is rejected the same way)
pub fn validate_code_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
    policy: &PkcePolicy,
) -> Result<(), PkceError> {
    let challenge = match challenge {
        Some(c) if !c.is_empty() => c,
        _ => {
            if policy.required {
                return Err(PkceError::MissingChallenge);
            }
            return Ok(());
        }
    };

    let len = challenge.len();
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&len) {
        return Err(PkceError::InvalidChallengeLength(len));
    }
    if !is_base64url(challenge) {
        return Err(PkceError::InvalidChallengeCharacters);
    }

    let method = CodeChallengeMethod::parse(method)?;
    if method == CodeChallengeMethod::Plain && !policy.allow_plain {
        return Err(PkceError::PlainNotAllowed);
    }

    Ok(())
}

/// Validates a code verifier received on the token endpoint against the
/// stored challenge.
///
/// # Errors
///
/// All failures map to `invalid_grant`:
/// - verifier length outside 43-128 characters
/// - characters outside the base64url alphabet
/// - verifier does not match the stored challenge under `method`
pub fn validate_code_verifier(
    verifier: &str,
    stored_challenge: &str,
    method: CodeChallengeMethod,
) -> Result<(), PkceError> {
    let len = verifier.len();
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&len) {
        return Err(PkceError::InvalidVerifierLength(len));
    }
    if !is_base64url(verifier) {
        return Err(PkceError::InvalidVerifierCharacters);
    }

    let matches = match method {
        CodeChallengeMethod::Plain => verifier == stored_challenge,
        CodeChallengeMethod::S256 => {
            generate_code_challenge(verifier, CodeChallengeMethod::S256) == stored_challenge
        }
    };

    if matches {
        Ok(())
    } else {
        Err(PkceError::VerificationFailed)
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Generates a cryptographically random code verifier.
///
/// Produces 32 random bytes encoded as base64url (43 characters), inside the
/// RFC 7636 length bounds.
#[must_use]
pub fn generate_code_verifier() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    // `gen` is a reserved keyword in Rust 2024, so we use r#gen
    let bytes: [u8; 32] = rng.r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derives the code challenge for a verifier.
///
/// `plain` returns the verifier unchanged; `S256` returns
/// `BASE64URL(SHA256(ASCII(code_verifier)))` without padding. The same
/// transform is used during verification, so the round trip holds for any
/// valid verifier.
#[must_use]
pub fn generate_code_challenge(verifier: &str, method: CodeChallengeMethod) -> String {
    match method {
        CodeChallengeMethod::Plain => verifier.to_string(),
        CodeChallengeMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
