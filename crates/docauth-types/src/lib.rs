//! Shared types for the document authentication proxy.
//!
//! - [`events`]: JSON bodies exchanged over the broker.
//! - [`routing`]: exchange, queue and routing-key names plus their NATS subject mapping.
//! - [`trace`]: the per-attempt [`TraceRecord`] state machine.
//! - [`validation`]: the [`ValidationRecord`] kept for citizen existence checks.
//! - [`centralizer`]: what the external centralizer answers.

pub mod centralizer;
pub mod events;
pub mod routing;
pub mod trace;
pub mod validation;

pub use centralizer::{BusinessOutcome, CitizenLookup};
pub use events::{AuthenticationRequested, AuthenticationResult, MalformedRequest};
pub use trace::{Attempt, TraceEntry, TraceId, TraceRecord, TraceStatus, TransitionError};
pub use validation::{ValidationRecord, ValidationStatus};
