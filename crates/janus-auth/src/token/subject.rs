//! Subject identifier computation.
//!
//! Clients configured with a pairwise salt receive a per-client subject
//! derived from the user's canonical subject ID, so two clients cannot
//! correlate the same user by `sub`. Rotating a client's salt changes every
//! subject that client sees; no backward compatibility is provided across
//! rotation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the pairwise subject for a client.
///
/// `base64url(HMAC-SHA256(salt, client_id || subject_id))`, no padding.
/// Deterministic for the same inputs.
#[must_use]
pub fn compute_pairwise_subject(subject_id: &str, client_id: &str, salt: &str) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC key of any length");
    mac.update(client_id.as_bytes());
    mac.update(subject_id.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Resolves the subject a client sees: pairwise when a salt is configured,
/// the canonical subject ID otherwise.
#[must_use]
pub fn resolve_subject(subject_id: &str, client_id: &str, pairwise_salt: Option<&str>) -> String {
    match pairwise_salt {
        Some(salt) => compute_pairwise_subject(subject_id, client_id, salt),
        None => subject_id.to_string(),
    }
}
