//! Step contracts for the journey engine.
//!
//! Step handlers are pluggable units (password login, sign-up, external IdP,
//! FIDO2, ...) implemented elsewhere and registered under a string
//! discriminator at startup. The engine resolves handlers through the
//! registry only; there is no reflection or container lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::bag::{DataBag, KEY_AUTH_METHOD, KEY_AUTHENTICATED_AT};

// =============================================================================
// Step Outcome
// =============================================================================

/// Result of executing one step handler.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Commit staged output and advance to the next step (declared order,
    /// or the step's explicit `on_success` target).
    Continue,

    /// Commit staged output and jump to a named branch target.
    Branch {
        /// Step ID to jump to.
        target: String,
        /// Claims to write into the bag alongside the staged output.
        output_claims: Option<DataBag>,
    },

    /// Pause the journey; the same step is re-invoked on the next request
    /// with newly submitted input merged in. Nothing is committed.
    RequireInput,

    /// Advance without writing output.
    Skip,

    /// Commit staged output and end the journey successfully.
    Complete,

    /// End the step in an error, honoring the step's `on_failure` target
    /// if configured, else terminating the journey.
    Fail {
        /// Machine-readable error code.
        error: String,
        /// Human-readable description.
        description: Option<String>,
    },
}

// =============================================================================
// Step Configuration
// =============================================================================

/// Declarative condition gating whether a step runs at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "check")]
pub enum StepCondition {
    /// The bag must contain the key.
    Exists {
        /// Bag key to probe.
        key: String,
    },
    /// The bag must not contain the key.
    NotExists {
        /// Bag key to probe.
        key: String,
    },
    /// The bag must contain the key with this exact string value.
    Equals {
        /// Bag key to probe.
        key: String,
        /// Expected string value.
        value: String,
    },
}

impl StepCondition {
    /// Evaluates the condition against a bag.
    #[must_use]
    pub fn is_met(&self, bag: &DataBag) -> bool {
        match self {
            Self::Exists { key } => bag.contains_key(key),
            Self::NotExists { key } => !bag.contains_key(key),
            Self::Equals { key, value } => bag.get_str(key) == Some(value.as_str()),
        }
    }
}

/// Configuration of one step inside a journey policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    /// Unique step identifier within the policy.
    pub id: String,

    /// Registry discriminator selecting the handler.
    pub step_type: String,

    /// Handler-specific settings.
    #[serde(default)]
    pub settings: DataBag,

    /// Bag keys that must be present before the step may run. A missing
    /// required claim fails the step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_claims: Vec<String>,

    /// Per-step execution timeout (None inherits the engine default).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub timeout: Option<Duration>,

    /// Maximum re-invocations the handler may use before it is expected
    /// to fail. The engine only carries the counter.
    #[serde(default)]
    pub max_retries: u32,

    /// Skip the step if it already committed output in this journey.
    #[serde(default)]
    pub skip_if_completed: bool,

    /// Error message template used when the step fails without its own
    /// description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Conditions gating whether the step runs; all must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StepCondition>,

    /// Explicit next step on success (None falls through to declared order).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,

    /// Step to jump to on failure (None terminates the journey).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
}

impl StepConfig {
    /// Creates a minimal step config.
    #[must_use]
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type: step_type.into(),
            settings: DataBag::new(),
            required_claims: Vec::new(),
            timeout: None,
            max_retries: 0,
            skip_if_completed: false,
            error_message: None,
            conditions: Vec::new(),
            on_success: None,
            on_failure: None,
        }
    }

    /// Returns `true` if every declared condition holds against the bag.
    #[must_use]
    pub fn conditions_met(&self, bag: &DataBag) -> bool {
        self.conditions.iter().all(|c| c.is_met(bag))
    }
}

// =============================================================================
// Step Execution Context
// =============================================================================

/// Per-invocation view handed to a step handler.
///
/// The context is derived fresh from the journey state plus any newly
/// submitted input; it is never persisted. Output written by the handler is
/// staged and only committed to the journey bag by the engine after
/// pre-completion validators pass.
#[derive(Debug)]
pub struct StepExecutionContext {
    /// Journey this invocation belongs to.
    pub journey_id: Uuid,

    /// Configuration of the executing step.
    pub step: StepConfig,

    /// Read view over the journey bag with submitted input merged on top.
    pub bag: DataBag,

    /// Input submitted with this invocation only.
    pub input: DataBag,

    /// How many times this step has been re-invoked (first run is zero).
    pub retry_count: u32,

    /// Staged output; committed by the engine on Continue/Branch/Complete.
    output: DataBag,

    /// User ID set by an authenticating handler.
    user_id: Option<String>,
}

impl StepExecutionContext {
    /// Builds a context for one step invocation.
    #[must_use]
    pub fn new(
        journey_id: Uuid,
        step: StepConfig,
        journey_bag: &DataBag,
        input: DataBag,
        retry_count: u32,
    ) -> Self {
        let mut bag = journey_bag.clone();
        bag.merge(&input);
        Self {
            journey_id,
            step,
            bag,
            input,
            retry_count,
            output: DataBag::new(),
            user_id: None,
        }
    }

    /// Returns `true` if the handler has exhausted its retries.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.step.max_retries
    }

    /// Stages an output value for commit.
    pub fn set_output(&mut self, key: impl Into<String>, value: impl Into<crate::bag::BagValue>) {
        self.output.set(key, value);
    }

    /// Marks this invocation as a successful authentication.
    ///
    /// Sets the `authenticated_at` timestamp and `auth_method` in the
    /// staged output and records the user ID. Handlers that authenticate
    /// MUST call this; a user ID without `authenticated_at` is treated as
    /// claims collection and no session will be issued.
    pub fn mark_authenticated(&mut self, user_id: impl Into<String>, method: impl Into<String>) {
        self.output.set(
            KEY_AUTHENTICATED_AT,
            OffsetDateTime::now_utc().unix_timestamp(),
        );
        self.output.set(KEY_AUTH_METHOD, method.into());
        self.user_id = Some(user_id.into());
    }

    /// Records a user ID without the authentication convention keys
    /// (claims-collection flows).
    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }

    /// Returns the staged output.
    #[must_use]
    pub fn output(&self) -> &DataBag {
        &self.output
    }

    /// Returns the user ID set by the handler, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

// =============================================================================
// Step Handler
// =============================================================================

/// A pluggable journey step implementation.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Registry discriminator (e.g. "password", "signup", "external-idp").
    fn step_type(&self) -> &str;

    /// Executes one invocation of the step.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures; expected
    /// domain failures are expressed as [`StepOutcome::Fail`].
    async fn execute(&self, ctx: &mut StepExecutionContext) -> AuthResult<StepOutcome>;
}

/// Explicit registry mapping step type discriminators to handlers.
///
/// Built once at startup; the engine performs no other handler lookup.
#[derive(Default)]
pub struct StepHandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl StepHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its discriminator, replacing any previous
    /// registration for the same type.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers
            .insert(handler.step_type().to_string(), handler);
    }

    /// Resolves a handler by discriminator.
    #[must_use]
    pub fn resolve(&self, step_type: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(step_type).cloned()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// =============================================================================
// Pre-completion Validation
// =============================================================================

/// Validator applied to a step's staged output before it is committed.
pub trait CompletionValidator: Send + Sync {
    /// Returns an error message if the output must not be committed,
    /// `None` to accept it.
    fn validate(&self, state: &crate::journey::JourneyState, output: &DataBag) -> Option<String>;
}
