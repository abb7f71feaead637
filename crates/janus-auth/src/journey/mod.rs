//! Journey step engine.
//!
//! A journey is an ordered/branching sequence of pluggable authentication
//! and data-collection steps executed as a small state machine:
//!
//! - [`state`] - journey state record and status transitions
//! - [`step`] - step configuration, execution context, handler contract
//! - [`engine`] - the engine executing one step per invocation

pub mod engine;
pub mod state;
pub mod step;

pub use engine::{AdvanceOutcome, JourneyEngine};
pub use state::{DEFAULT_JOURNEY_EXPIRY_SECS, JourneyError, JourneyState, JourneyStatus};
pub use step::{
    CompletionValidator, StepCondition, StepConfig, StepExecutionContext, StepHandler,
    StepHandlerRegistry, StepOutcome,
};
