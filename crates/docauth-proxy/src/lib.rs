//! # docauth-proxy
//!
//! Traceable proxy between the `citizen_affiliation` exchange and the
//! external citizen centralizer.
//!
//! ```text
//! document.authentication.requested
//!        │
//!        ▼
//!   Consumer ──decode──▶ AuthenticationHandler ──▶ DocumentAuthenticator
//!        ▲                                            │  create trace (PENDING)
//!        │ ack / term / nak                           │  PUT authenticateDocument
//!        └────────────────────────────────────────────│  trace → SENT | ERROR
//!                                                     ▼
//!                         document.authentication.ready | document.auth.failure
//! ```
//!
//! - Exchanges are JetStream streams and queues are durable pull consumers
//!   with one unacknowledged message at a time (see [`topology`]).
//! - Every well-formed request leaves exactly one trace in `SENT` or `ERROR`.
//! - Delivery is at-least-once. A redelivered message creates a new trace;
//!   there is no deduplication key.
//!
//! Collaborators are injected as generics so tests substitute the doubles in
//! [`mocks`] (feature `test-support`):
//!
//! ```rust,no_run
//! use docauth_proxy::{DocumentAuthenticator, HttpCentralizer, MemoryTraceStore, SystemClock};
//! use docauth_proxy::publisher::JetStreamPublisher;
//! use std::time::Duration;
//!
//! # async fn run(js: async_nats::jetstream::Context) -> Result<(), Box<dyn std::error::Error>> {
//! let authenticator = DocumentAuthenticator::new(
//!     HttpCentralizer::new("https://centralizer.example", Duration::from_secs(30))?,
//!     JetStreamPublisher::new(js, "citizen_affiliation"),
//!     MemoryTraceStore::new(),
//!     SystemClock,
//! );
//! # let _ = authenticator;
//! # Ok(())
//! # }
//! ```

pub mod authentication;
pub mod centralizer;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod env;
pub mod nats;
pub mod publisher;
pub mod signal;
pub mod store;
pub mod topology;
pub mod validation;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use authentication::{AuthenticationError, AuthenticationHandler, DocumentAuthenticator};
pub use centralizer::{Centralizer, HttpCentralizer, TransportFailure};
pub use clock::{Clock, SystemClock};
pub use config::{NatsAuth, NatsConfig, ProxyConfig};
pub use consumer::{
    Consumer, ConsumerError, Delivery, HandlerError, MessageHandler, Outcome, decide, run_deliveries,
};
pub use nats::{ConnectError, connect};
pub use publisher::{EventPublisher, JetStreamPublisher, PublishError};
pub use store::{KvTraceStore, MemoryTraceStore, StoreError, TraceStore};
pub use topology::Binding;
pub use validation::{CitizenValidator, ValidationError};
