//! Journey policy domain types.
//!
//! A policy is the configured shape of a journey: an ordered list of step
//! configurations plus routing metadata. Policies are tenant-scoped and
//! looked up by ID or by kind.

use serde::{Deserialize, Serialize};

use crate::journey::step::StepConfig;

/// The kind of requirement a policy (or standalone page) serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Interactive login.
    SignIn,
    /// Account registration.
    SignUp,
    /// Password recovery.
    ForgotPassword,
    /// Profile management / claims collection.
    Profile,
    /// Consent collection.
    Consent,
}

impl PolicyKind {
    /// Returns the kind as a stable string tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignUp => "sign_up",
            Self::ForgotPassword => "forgot_password",
            Self::Profile => "profile",
            Self::Consent => "consent",
        }
    }
}

/// A configured journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyPolicy {
    /// Unique policy identifier.
    pub id: String,

    /// Owning tenant (None for server-wide policies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// The requirement kind this policy serves.
    pub kind: PolicyKind,

    /// Human-readable policy name.
    pub name: String,

    /// Whether the policy may be selected.
    pub enabled: bool,

    /// Steps in declared order.
    pub steps: Vec<StepConfig>,

    /// UI entry point the browser is redirected to when the journey starts.
    pub ui_entry_url: String,
}

impl JourneyPolicy {
    /// Returns the first step, if any.
    #[must_use]
    pub fn first_step(&self) -> Option<&StepConfig> {
        self.steps.first()
    }

    /// Returns a step by ID.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns the step following `id` in declared order.
    #[must_use]
    pub fn step_after(&self, id: &str) -> Option<&StepConfig> {
        let index = self.steps.iter().position(|s| s.id == id)?;
        self.steps.get(index + 1)
    }
}
