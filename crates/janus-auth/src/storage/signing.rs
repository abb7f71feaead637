//! Signing credential provider trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::AuthResult;
use crate::token::jwt::JwtService;

/// Source of the active signing credentials.
///
/// Key management (generation, rotation, persistence) happens elsewhere;
/// the issuer only asks for the current signing service. `None` means no
/// key is available, which the issuer treats as a fatal configuration
/// error.
#[async_trait]
pub trait SigningCredentialProvider: Send + Sync {
    /// Returns the active signing service, if a key is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material cannot be loaded.
    async fn get_signing_credentials(&self) -> AuthResult<Option<Arc<JwtService>>>;
}
