//! Claims aggregation.
//!
//! Collects claims from all registered providers in descending priority
//! order and merges them per key. One provider's failure (error or timeout)
//! never aborts collection for the others; the failure is logged and the
//! provider's contribution is empty.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::AuthResult;
use crate::claims::provider::{ClaimsContext, ClaimsProviderRegistry};

/// Merges a new value into a claims map under the per-key merge policy.
///
/// - both sides list-like: concatenate with de-duplication
/// - one side scalar, the other list-like: the scalar is absorbed into the
///   list (deduplicated)
/// - two distinct scalars: accumulate into a two-element list (claims are
///   repeatable; a later provider must not silently overwrite an earlier one)
/// - anything else (objects, equal values): the later value wins
pub fn merge_claim(claims: &mut Map<String, Value>, key: &str, new: Value) {
    let merged = match claims.remove(key) {
        None => new,
        Some(existing) => merge_values(existing, new),
    };
    claims.insert(key.to_string(), merged);
}

/// Inserts a claim, overwriting any existing value. Used for grant-time
/// claims that explicitly override provider output.
pub fn insert_overriding(claims: &mut Map<String, Value>, key: &str, value: Value) {
    claims.insert(key.to_string(), value);
}

fn merge_values(existing: Value, new: Value) -> Value {
    if existing == new {
        return existing;
    }
    match (existing, new) {
        (Value::Array(mut a), Value::Array(b)) => {
            for item in b {
                if !a.contains(&item) {
                    a.push(item);
                }
            }
            Value::Array(a)
        }
        (Value::Array(mut a), scalar) if is_scalar(&scalar) => {
            if !a.contains(&scalar) {
                a.push(scalar);
            }
            Value::Array(a)
        }
        (scalar, Value::Array(b)) if is_scalar(&scalar) => {
            let mut merged = vec![scalar];
            for item in b {
                if !merged.contains(&item) {
                    merged.push(item);
                }
            }
            Value::Array(merged)
        }
        (a, b) if is_scalar(&a) && is_scalar(&b) => Value::Array(vec![a, b]),
        // Structured values (objects) have no meaningful list merge.
        (_, new) => new,
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_)
    )
}

/// Collects and merges claims from all registered providers.
pub struct ClaimsAggregator {
    registry: Arc<ClaimsProviderRegistry>,
    provider_timeout: Duration,
}

impl ClaimsAggregator {
    /// Creates an aggregator over a provider registry.
    #[must_use]
    pub fn new(registry: Arc<ClaimsProviderRegistry>, provider_timeout: Duration) -> Self {
        Self {
            registry,
            provider_timeout,
        }
    }

    /// Collects claims for the context.
    ///
    /// Providers run sequentially in descending priority order so the merge
    /// is deterministic. A provider is skipped when it is disabled, its
    /// trigger scopes/protocols don't match, or `can_provide` declines.
    /// When the context has no subject (client-credentials style grants)
    /// no provider is invoked and the result is empty.
    ///
    /// # Errors
    ///
    /// Never fails on provider errors; those are logged and skipped. Only
    /// returns an error for conditions the caller introduced (currently
    /// none; the signature leaves room for caller-side cancellation).
    pub async fn collect(&self, ctx: &ClaimsContext) -> AuthResult<Map<String, Value>> {
        let mut merged = Map::new();

        if ctx.subject_id.is_none() {
            return Ok(merged);
        }

        for provider in self.registry.ordered() {
            if !provider.enabled() {
                continue;
            }
            if !ctx.matches_scopes(provider.trigger_scopes()) {
                continue;
            }
            if !ctx.matches_protocol(provider.trigger_protocols()) {
                continue;
            }
            if !provider.can_provide(ctx) {
                continue;
            }

            let claims = match tokio::time::timeout(self.provider_timeout, provider.get_claims(ctx))
                .await
            {
                Ok(Ok(claims)) => claims,
                Ok(Err(err)) => {
                    warn!(
                        provider = provider.name(),
                        error = %err,
                        "claims provider failed, skipping"
                    );
                    continue;
                }
                Err(_) => {
                    warn!(
                        provider = provider.name(),
                        timeout = ?self.provider_timeout,
                        "claims provider timed out, skipping"
                    );
                    continue;
                }
            };

            debug!(
                provider = provider.name(),
                count = claims.len(),
                "claims collected"
            );
            for (key, value) in claims {
                merge_claim(&mut merged, &key, value);
            }
        }

        Ok(merged)
    }
}
