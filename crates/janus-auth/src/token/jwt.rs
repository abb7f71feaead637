//! JWT signing primitives.
//!
//! Thin wrapper over `jsonwebtoken` holding the active signing key pair.
//! Key material is generated or loaded here because `jsonwebtoken` itself
//! does not generate keys.
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA with SHA-256 (widely compatible, the default)
//! - **RS384**: RSA with SHA-384

use std::fmt;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256 (the default).
    RS256,
    /// RSA with SHA-384.
    RS384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair for JWT operations.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key) for verification.
    decoding_key: DecodingKey,

    /// When the key was created.
    pub created_at: OffsetDateTime,
}

impl SigningKeyPair {
    /// Generates a new RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        let bits = 2048;
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        use rsa::pkcs8::EncodePublicKey;
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads a key pair from PEM strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Encodes and decodes JWTs with one signing key pair.
///
/// Thread-safe (`Send + Sync`); shared across async tasks behind an `Arc`.
pub struct JwtService {
    signing_key: SigningKeyPair,
}

impl JwtService {
    /// Creates a JWT service over a key pair.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair) -> Self {
        Self { signing_key }
    }

    /// Encodes claims into a signed JWT string.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// The signature and `exp` are validated; issuer and audience checks
    /// happen at the application layer because both vary per tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode(token, &self.signing_key.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        iat: i64,
    }

    fn claims(expires_in: i64) -> TestClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        TestClaims {
            sub: "user-1".to_string(),
            exp: now + expires_in,
            iat: now,
        }
    }

    #[test]
    fn test_generate_rsa_key_pair() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        assert_eq!(key_pair.algorithm, SigningAlgorithm::RS256);
        assert!(!key_pair.kid.is_empty());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key_pair);

        let token = service.encode(&claims(3600)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = service.decode::<TestClaims>(&token).unwrap();
        assert_eq!(decoded.claims.sub, "user-1");
        assert_eq!(decoded.header.kid.as_deref(), Some(service.current_kid()));
    }

    #[test]
    fn test_rs384_round_trip() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS384).unwrap();
        let service = JwtService::new(key_pair);

        let token = service.encode(&claims(3600)).unwrap();
        let decoded = service.decode::<TestClaims>(&token).unwrap();
        assert_eq!(decoded.claims.sub, "user-1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        let service = JwtService::new(key_pair);

        let token = service.encode(&claims(-3600)).unwrap();
        let result = service.decode::<TestClaims>(&token);
        assert!(matches!(result.unwrap_err(), JwtError::Expired));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let service1 =
            JwtService::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());
        let service2 =
            JwtService::new(SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap());

        let token = service1.encode(&claims(3600)).unwrap();
        let result = service2.decode::<TestClaims>(&token);
        assert!(matches!(result.unwrap_err(), JwtError::InvalidSignature));
    }
}
