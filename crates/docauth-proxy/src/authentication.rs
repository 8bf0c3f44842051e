//! Document authentication: trace, forward to the centralizer, record the
//! answer, publish the result event.
//!
//! Each call creates exactly one trace before any network call and leaves it
//! in `SENT` or `ERROR`. A failed centralizer call is re-raised after a
//! best-effort result publish; a failed publish after a clean answer is an
//! error of its own.

use docauth_types::{
    Attempt, AuthenticationRequested, AuthenticationResult, TraceId, TraceRecord, TransitionError,
    routing,
};
use serde_json::Value;
use tracing::{Span, error, info, instrument, warn};

use crate::centralizer::{Centralizer, TransportFailure};
use crate::clock::Clock;
use crate::consumer::{HandlerError, MessageHandler};
use crate::publisher::{EventPublisher, PublishError};
use crate::store::{StoreError, TraceStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("centralizer call for trace {trace_id} failed: {source}")]
    Centralizer {
        trace_id: TraceId,
        #[source]
        source: TransportFailure,
    },

    #[error("result event for trace {trace_id} not published: {source}")]
    Publish {
        trace_id: TraceId,
        #[source]
        source: PublishError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct DocumentAuthenticator<C, P, S, K> {
    centralizer: C,
    publisher: P,
    traces: S,
    clock: K,
}

impl<C, P, S, K> DocumentAuthenticator<C, P, S, K>
where
    C: Centralizer,
    P: EventPublisher,
    S: TraceStore<TraceRecord>,
    K: Clock,
{
    pub fn new(centralizer: C, publisher: P, traces: S, clock: K) -> Self {
        Self {
            centralizer,
            publisher,
            traces,
            clock,
        }
    }

    /// Authenticate one document and report the outcome on the exchange.
    ///
    /// Returns the final trace. On a transport failure the trace is left in
    /// `ERROR` and the failure is returned.
    #[instrument(
        name = "document.authenticate",
        skip_all,
        fields(id_citizen = request.id_citizen, trace_id = tracing::field::Empty)
    )]
    pub async fn process(
        &self,
        request: &AuthenticationRequested,
    ) -> Result<TraceRecord, AuthenticationError> {
        let trace = TraceRecord::pending(
            TraceId::generate(),
            request.id_citizen,
            &request.document_title,
            self.clock.now(),
        );
        Span::current().record("trace_id", tracing::field::display(trace.id()));
        self.traces.create(&trace).await?;

        info!(document_title = %request.document_title, "Processing document authentication");

        let answer = self
            .centralizer
            .authenticate_document(
                request.id_citizen,
                &request.url_document,
                &request.document_title,
            )
            .await;

        match answer {
            Ok(outcome) => {
                let trace = trace.record_attempt(
                    Attempt::Answered {
                        success: outcome.success,
                        status_code: outcome.status_code,
                    },
                    self.clock.now(),
                )?;
                self.traces.update(&trace).await?;

                if trace.auth_success() {
                    info!("Document authenticated");
                } else {
                    warn!(
                        status_code = outcome.status_code,
                        message = %outcome.message,
                        "Centralizer did not authenticate the document"
                    );
                }

                self.publish_result(trace, request).await
            }
            Err(failure) => {
                error!(error = %failure, "Centralizer call failed");

                let cause = failure.to_string();
                let trace = trace.record_attempt(Attempt::Failed { cause: &cause }, self.clock.now())?;
                if let Err(e) = self.traces.update(&trace).await {
                    error!(error = %e, "Failed to store ERROR trace");
                }

                let trace_id = trace.id().clone();
                match self.publish_result(trace, request).await {
                    Err(e @ AuthenticationError::Publish { .. }) => {
                        error!(error = %e, "Failed to publish failure event");
                    }
                    // logged by publish_result
                    Ok(_) | Err(AuthenticationError::Store(_)) => {}
                    Err(e) => error!(error = %e, "Failed to record failure event"),
                }

                Err(AuthenticationError::Centralizer {
                    trace_id,
                    source: failure,
                })
            }
        }
    }

    async fn publish_result(
        &self,
        trace: TraceRecord,
        request: &AuthenticationRequested,
    ) -> Result<TraceRecord, AuthenticationError> {
        let routing_key = routing::result_routing_key(trace.auth_success());
        let event = AuthenticationResult {
            id_citizen: request.id_citizen,
            url_document: request.url_document.clone(),
            document_title: request.document_title.clone(),
            auth_success: trace.auth_success(),
        };

        self.publisher
            .publish(routing_key, &event)
            .await
            .map_err(|source| AuthenticationError::Publish {
                trace_id: trace.id().clone(),
                source,
            })?;

        info!(routing_key, "Result event published");

        let trace = trace.record_published(self.clock.now())?;
        if let Err(e) = self.traces.update(&trace).await {
            error!(error = %e, routing_key, "Result event published, but the trace was not updated");
            return Err(e.into());
        }
        Ok(trace)
    }
}

/// Consumer-facing adapter: validates the body, then authenticates.
pub struct AuthenticationHandler<C, P, S, K> {
    authenticator: DocumentAuthenticator<C, P, S, K>,
}

impl<C, P, S, K> AuthenticationHandler<C, P, S, K> {
    pub fn new(authenticator: DocumentAuthenticator<C, P, S, K>) -> Self {
        Self { authenticator }
    }
}

impl<C, P, S, K> MessageHandler for AuthenticationHandler<C, P, S, K>
where
    C: Centralizer,
    P: EventPublisher,
    S: TraceStore<TraceRecord>,
    K: Clock,
{
    async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
        let request = AuthenticationRequested::from_json(payload)?;
        self.authenticator
            .process(&request)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::Retryable(Box::new(e)))
    }
}
