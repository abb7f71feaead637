//! Journey state.
//!
//! A journey is a configurable sequence of authentication/data-collection
//! steps executed as a small state machine. The state record tracks where
//! the journey is, what it has collected, and how it ended.
//!
//! # Lifecycle
//!
//! 1. Created when the coordinator starts a journey for a policy
//! 2. Mutated by the engine, one step execution per invocation
//! 3. Ends in one of the terminal states: Completed, Failed, or Expired
//!
//! The data bag lives exactly as long as the journey; nothing in it is
//! persisted past the terminal transition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::bag::{DataBag, KEY_AUTHENTICATED_AT};

/// Default journey expiry in seconds (30 minutes).
pub const DEFAULT_JOURNEY_EXPIRY_SECS: i64 = 1800;

/// Status of a journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    /// The journey is in progress (including paused for input).
    Running,
    /// The journey finished successfully.
    Completed,
    /// The journey ended in an error.
    Failed,
    /// The journey outlived its expiry window.
    Expired,
}

impl JourneyStatus {
    /// Returns `true` for Completed, Failed, and Expired.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Error recorded when a journey fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyError {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// State of one journey instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyState {
    /// Unique journey identifier.
    pub id: Uuid,

    /// Policy this journey executes.
    pub policy_id: String,

    /// Current status.
    pub status: JourneyStatus,

    /// User authenticated during the journey, if any. A user ID without
    /// an `authenticated_at` bag entry means claims were collected for a
    /// known user but no authentication happened; no session may be
    /// issued from such a journey.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated_user_id: Option<String>,

    /// Session established for the journey, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Data collected by steps. Lives only for the journey's lifetime.
    pub bag: DataBag,

    /// Step the next invocation will execute. `None` before the first
    /// step resolution and after a terminal transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,

    /// Steps that committed output, in completion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<String>,

    /// Per-step invocation counters (first execution counts as zero).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retry_counts: BTreeMap<String, u32>,

    /// Failure details when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JourneyError>,

    /// When the journey was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the journey expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl JourneyState {
    /// Creates a running journey for a policy with the default expiry.
    #[must_use]
    pub fn new(policy_id: impl Into<String>) -> Self {
        Self::with_expiry(policy_id, DEFAULT_JOURNEY_EXPIRY_SECS)
    }

    /// Creates a running journey with a custom expiry in seconds.
    #[must_use]
    pub fn with_expiry(policy_id: impl Into<String>, expiry_secs: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            policy_id: policy_id.into(),
            status: JourneyStatus::Running,
            authenticated_user_id: None,
            session_id: None,
            bag: DataBag::new(),
            current_step_id: None,
            completed_steps: Vec::new(),
            retry_counts: BTreeMap::new(),
            error: None,
            created_at: now,
            expires_at: now + time::Duration::seconds(expiry_secs),
        }
    }

    /// Returns `true` if the expiry window has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Returns `true` if an authenticating step ran.
    ///
    /// A user ID alone is not enough: the step convention requires
    /// `authenticated_at` in the bag for the journey to count as an
    /// authentication (claims-collection journeys carry a user ID but no
    /// timestamp).
    #[must_use]
    pub fn did_authenticate(&self) -> bool {
        self.authenticated_user_id.is_some() && self.bag.contains_key(KEY_AUTHENTICATED_AT)
    }

    /// Returns the retry counter for a step (zero if never retried).
    #[must_use]
    pub fn retry_count(&self, step_id: &str) -> u32 {
        self.retry_counts.get(step_id).copied().unwrap_or(0)
    }

    /// Records a failure and transitions to `Failed`.
    pub fn fail(&mut self, error: impl Into<String>, description: Option<String>) {
        self.status = JourneyStatus::Failed;
        self.current_step_id = None;
        self.error = Some(JourneyError {
            error: error.into(),
            description,
        });
    }
}
