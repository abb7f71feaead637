//! Authentication requirement types.
//!
//! The requirement is the immutable input to the coordinator for one
//! authorization attempt: what the protocol request asked for, distilled
//! from protocol-specific parameters by the transport layer.

use serde::{Deserialize, Serialize};

use crate::types::policy::PolicyKind;

/// OIDC prompt values the coordinator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// No interaction may be performed.
    None,
    /// Force re-authentication even with a live session.
    Login,
    /// Force the account-creation experience.
    Create,
}

impl Prompt {
    /// Parses a prompt value; unknown values are ignored (None).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "login" => Some(Self::Login),
            "create" => Some(Self::Create),
            _ => None,
        }
    }
}

/// How the login experience is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiMode {
    /// Embedded journey UI driven by the step engine.
    Journey,
    /// Protocol-agnostic standalone pages.
    Standalone,
    /// No redirects; structured responses for API-driven clients.
    Headless,
}

impl UiMode {
    /// Parses a `ui_mode` request parameter; unknown values are ignored.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "journey" => Some(Self::Journey),
            "standalone" => Some(Self::Standalone),
            "headless" => Some(Self::Headless),
            _ => None,
        }
    }
}

/// Immutable input to the coordinator for one authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthenticationRequirement {
    /// Requested prompt behavior.
    pub prompt: Option<Prompt>,

    /// Force a fresh login regardless of prompt.
    pub force_fresh_login: bool,

    /// Maximum acceptable session age in seconds.
    pub max_age_seconds: Option<i64>,

    /// Hint identifying the user to authenticate.
    pub login_hint: Option<String>,

    /// Requested authentication context class references.
    pub acr_values: Vec<String>,

    /// Scopes the client asked for.
    pub requested_scopes: Vec<String>,

    /// The journey kind this attempt suggests (sign-in, sign-up, ...).
    pub suggested_policy_kind: PolicyKind,

    /// Request-level policy override.
    pub explicit_policy_id: Option<String>,

    /// The request's `ui_mode` parameter, if present.
    pub requested_ui_mode: Option<UiMode>,
}

impl AuthenticationRequirement {
    /// Creates a sign-in requirement for the given scopes.
    #[must_use]
    pub fn sign_in(scopes: Vec<String>) -> Self {
        Self {
            prompt: None,
            force_fresh_login: false,
            max_age_seconds: None,
            login_hint: None,
            acr_values: Vec::new(),
            requested_scopes: scopes,
            suggested_policy_kind: PolicyKind::SignIn,
            explicit_policy_id: None,
            requested_ui_mode: None,
        }
    }

    /// Returns `true` if the requirement forbids reusing a session.
    #[must_use]
    pub fn forces_fresh_login(&self) -> bool {
        self.force_fresh_login
            || matches!(self.prompt, Some(Prompt::Login) | Some(Prompt::Create))
    }
}
