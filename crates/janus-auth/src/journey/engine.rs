//! Journey step engine.
//!
//! Executes journey policies one step per invocation. The engine owns the
//! state transitions; step handlers only report outcomes. Handler output is
//! staged on the execution context and committed to the journey bag after
//! pre-completion validators accept it, so a rejected or paused step never
//! mutates journey state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::AuthResult;
use crate::bag::DataBag;
use crate::error::AuthError;
use crate::journey::state::{JourneyState, JourneyStatus};
use crate::journey::step::{
    CompletionValidator, StepConfig, StepExecutionContext, StepHandlerRegistry, StepOutcome,
};
use crate::types::policy::JourneyPolicy;

/// What one engine invocation did to the journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The current step paused for input; it will be re-invoked with the
    /// next submission.
    AwaitingInput,
    /// The journey moved to another step and is still running.
    Advanced,
    /// The journey finished successfully.
    Completed,
    /// The journey ended in an error.
    Failed,
    /// The journey outlived its expiry window.
    Expired,
}

/// Executes journey policies against journey state.
pub struct JourneyEngine {
    /// Handler registry, resolved once at startup.
    registry: Arc<StepHandlerRegistry>,

    /// Validators applied to staged output before commit.
    validators: Vec<Arc<dyn CompletionValidator>>,

    /// Step timeout used when a step does not configure its own.
    default_step_timeout: Duration,
}

impl JourneyEngine {
    /// Creates an engine over a handler registry.
    #[must_use]
    pub fn new(registry: Arc<StepHandlerRegistry>, default_step_timeout: Duration) -> Self {
        Self {
            registry,
            validators: Vec::new(),
            default_step_timeout,
        }
    }

    /// Adds a pre-completion validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn CompletionValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Executes exactly one step of the journey.
    ///
    /// # Arguments
    ///
    /// * `policy` - The policy the journey executes
    /// * `state` - Journey state, mutated in place
    /// * `input` - Input submitted with this invocation
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` if the journey is already terminal, and a
    /// fatal configuration error if the policy references an unknown step
    /// or handler. Handler failures do not surface as errors; they drive
    /// the journey into `Failed` (or its `on_failure` branch).
    pub async fn advance(
        &self,
        policy: &JourneyPolicy,
        state: &mut JourneyState,
        input: DataBag,
    ) -> AuthResult<AdvanceOutcome> {
        if state.status.is_terminal() {
            return Err(AuthError::invalid_request("journey is not running"));
        }

        if state.is_expired() {
            state.status = JourneyStatus::Expired;
            state.current_step_id = None;
            debug!(journey_id = %state.id, "journey expired");
            return Ok(AdvanceOutcome::Expired);
        }

        let step = self.resolve_current_step(policy, state)?.clone();

        // Declarative gating: a step whose conditions don't hold, or that
        // already committed output under skip_if_completed, never runs.
        let already_completed = state.completed_steps.contains(&step.id);
        if !step.conditions_met(&state.bag) || (step.skip_if_completed && already_completed) {
            debug!(journey_id = %state.id, step_id = %step.id, "step skipped");
            return self.advance_past(policy, state, &step, None);
        }

        if let Some(missing) = step
            .required_claims
            .iter()
            .find(|key| !state.bag.contains_key(key))
        {
            let description = step
                .error_message
                .clone()
                .unwrap_or_else(|| format!("missing required claim '{missing}'"));
            return Ok(self.fail_step(policy, state, &step, "access_denied", Some(description)));
        }

        let handler = self.registry.resolve(&step.step_type).ok_or_else(|| {
            AuthError::configuration(format!(
                "no step handler registered for type '{}'",
                step.step_type
            ))
        })?;

        let retry_count = state.retry_count(&step.id);
        let mut ctx =
            StepExecutionContext::new(state.id, step.clone(), &state.bag, input, retry_count);

        let timeout = step.timeout.unwrap_or(self.default_step_timeout);
        let outcome = match tokio::time::timeout(timeout, handler.execute(&mut ctx)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(
                    journey_id = %state.id,
                    step_id = %step.id,
                    error = %err,
                    "step handler failed"
                );
                StepOutcome::Fail {
                    error: "server_error".to_string(),
                    description: step.error_message.clone(),
                }
            }
            Err(_) => {
                warn!(journey_id = %state.id, step_id = %step.id, "step handler timed out");
                StepOutcome::Fail {
                    error: "server_error".to_string(),
                    description: Some("step execution timed out".to_string()),
                }
            }
        };

        match outcome {
            StepOutcome::RequireInput => {
                // Pause without committing anything; the retry counter is
                // advanced so the next invocation of the same step sees it.
                *state.retry_counts.entry(step.id.clone()).or_insert(0) += 1;
                state.current_step_id = Some(step.id.clone());
                Ok(AdvanceOutcome::AwaitingInput)
            }
            StepOutcome::Skip => self.advance_past(policy, state, &step, None),
            StepOutcome::Continue => {
                if let Some(failure) = self.commit(policy, state, &step, &ctx, None) {
                    return Ok(failure);
                }
                self.advance_past(policy, state, &step, step.on_success.as_deref())
            }
            StepOutcome::Branch {
                target,
                output_claims,
            } => {
                if let Some(failure) =
                    self.commit(policy, state, &step, &ctx, output_claims.as_ref())
                {
                    return Ok(failure);
                }
                if policy.step(&target).is_none() {
                    return Err(AuthError::configuration(format!(
                        "branch target '{target}' is not a step of policy '{}'",
                        policy.id
                    )));
                }
                state.current_step_id = Some(target);
                Ok(AdvanceOutcome::Advanced)
            }
            StepOutcome::Complete => {
                if let Some(failure) = self.commit(policy, state, &step, &ctx, None) {
                    return Ok(failure);
                }
                state.status = JourneyStatus::Completed;
                state.current_step_id = None;
                debug!(journey_id = %state.id, "journey completed");
                Ok(AdvanceOutcome::Completed)
            }
            StepOutcome::Fail { error, description } => {
                let description = description.or_else(|| step.error_message.clone());
                Ok(self.fail_step(policy, state, &step, &error, description))
            }
        }
    }

    /// Resolves the step the current invocation executes.
    fn resolve_current_step<'p>(
        &self,
        policy: &'p JourneyPolicy,
        state: &JourneyState,
    ) -> AuthResult<&'p StepConfig> {
        match &state.current_step_id {
            Some(id) => policy.step(id).ok_or_else(|| {
                AuthError::configuration(format!(
                    "step '{id}' is not part of policy '{}'",
                    policy.id
                ))
            }),
            None => policy.first_step().ok_or_else(|| {
                AuthError::configuration(format!("policy '{}' has no steps", policy.id))
            }),
        }
    }

    /// Commits staged output to the journey bag after validators accept it.
    ///
    /// Returns a failure outcome when a validator rejects the output; the
    /// bag is left untouched in that case.
    fn commit(
        &self,
        policy: &JourneyPolicy,
        state: &mut JourneyState,
        step: &StepConfig,
        ctx: &StepExecutionContext,
        extra_claims: Option<&DataBag>,
    ) -> Option<AdvanceOutcome> {
        for validator in &self.validators {
            if let Some(message) = validator.validate(state, ctx.output()) {
                warn!(
                    journey_id = %state.id,
                    step_id = %step.id,
                    message = %message,
                    "step output rejected by validator"
                );
                return Some(self.fail_step(policy, state, step, "access_denied", Some(message)));
            }
        }

        state.bag.merge(ctx.output());
        if let Some(claims) = extra_claims {
            state.bag.merge(claims);
        }
        if let Some(user_id) = ctx.user_id() {
            state.authenticated_user_id = Some(user_id.to_string());
        }
        if !state.completed_steps.contains(&step.id) {
            state.completed_steps.push(step.id.clone());
        }
        None
    }

    /// Moves past `step` to an explicit target or the next declared step;
    /// running out of steps completes the journey.
    fn advance_past(
        &self,
        policy: &JourneyPolicy,
        state: &mut JourneyState,
        step: &StepConfig,
        explicit_target: Option<&str>,
    ) -> AuthResult<AdvanceOutcome> {
        let next_id = match explicit_target {
            Some(target) => {
                if policy.step(target).is_none() {
                    return Err(AuthError::configuration(format!(
                        "on_success target '{target}' is not a step of policy '{}'",
                        policy.id
                    )));
                }
                Some(target.to_string())
            }
            None => policy.step_after(&step.id).map(|s| s.id.clone()),
        };

        match next_id {
            Some(id) => {
                state.current_step_id = Some(id);
                Ok(AdvanceOutcome::Advanced)
            }
            None => {
                state.status = JourneyStatus::Completed;
                state.current_step_id = None;
                debug!(journey_id = %state.id, "journey completed");
                Ok(AdvanceOutcome::Completed)
            }
        }
    }

    /// Applies a step failure: jump to the step's `on_failure` target when
    /// one is configured, else terminate the journey.
    fn fail_step(
        &self,
        policy: &JourneyPolicy,
        state: &mut JourneyState,
        step: &StepConfig,
        error: &str,
        description: Option<String>,
    ) -> AdvanceOutcome {
        if let Some(target) = &step.on_failure {
            if policy.step(target).is_some() {
                debug!(
                    journey_id = %state.id,
                    step_id = %step.id,
                    target = %target,
                    "step failed, following on_failure target"
                );
                state.current_step_id = Some(target.clone());
                return AdvanceOutcome::Advanced;
            }
            warn!(
                journey_id = %state.id,
                step_id = %step.id,
                target = %target,
                "on_failure target does not exist, terminating journey"
            );
        }

        state.fail(error, description);
        AdvanceOutcome::Failed
    }
}
