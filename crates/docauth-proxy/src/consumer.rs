//! Pull-one-at-a-time consumer with an explicit acknowledgement policy.
//!
//! | Delivery | Outcome | JetStream ack |
//! |---|---|---|
//! | body is not JSON | `RejectNoRequeue` | `Term` |
//! | handler reports a malformed request | `RejectNoRequeue` | `Term` |
//! | handler fails otherwise | `RejectRequeue` | `Nak` |
//! | handler completes, whatever the business answer | `Ack` | `Ack` |
//!
//! Shutdown is observed only between messages: a message that was pulled is
//! always handled and acknowledged before the loop exits.

use std::future::Future;

use async_nats::jetstream::{self, AckKind, Context};
use docauth_types::MalformedRequest;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::topology::{self, Binding, PREFETCH, TopologyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    RejectNoRequeue,
    RejectRequeue,
}

impl Outcome {
    pub fn ack_kind(self) -> AckKind {
        match self {
            Self::Ack => AckKind::Ack,
            Self::RejectNoRequeue => AckKind::Term,
            Self::RejectRequeue => AckKind::Nak(None),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Never becomes valid on redelivery.
    #[error(transparent)]
    Malformed(#[from] MalformedRequest),

    #[error("{0}")]
    Retryable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to open message stream for {queue}: {reason}")]
    Stream { queue: String, reason: String },

    #[error("failed to acknowledge message: {0}")]
    Acknowledge(String),
}

/// Business processing of one decoded message.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, payload: &Value) -> impl Future<Output = Result<(), HandlerError>> + Send;
}

/// Settles a delivery with the broker.
pub trait Acknowledge: Send + Sync {
    fn acknowledge(&self, outcome: Outcome) -> impl Future<Output = Result<(), ConsumerError>> + Send;
}

/// A pulled message that can be settled.
pub trait Delivery: Acknowledge {
    fn payload(&self) -> &[u8];

    fn log_received(&self) {}
}

impl Acknowledge for jetstream::Message {
    async fn acknowledge(&self, outcome: Outcome) -> Result<(), ConsumerError> {
        self.ack_with(outcome.ack_kind())
            .await
            .map_err(|e| ConsumerError::Acknowledge(e.to_string()))
    }
}

impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn log_received(&self) {
        if let Ok(info) = self.info() {
            debug!(subject = %self.subject, delivered = info.delivered, "Received message");
        }
    }
}

/// Decode `payload` and run the handler, deciding how the delivery settles.
pub async fn decide<H: MessageHandler>(payload: &[u8], handler: &H) -> Outcome {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Dropping message that is not valid JSON");
            return Outcome::RejectNoRequeue;
        }
    };

    match handler.handle(&value).await {
        Ok(()) => Outcome::Ack,
        Err(HandlerError::Malformed(e)) => {
            warn!(error = %e, "Dropping malformed request");
            Outcome::RejectNoRequeue
        }
        Err(HandlerError::Retryable(e)) => {
            error!(error = %e, "Handling failed, requeueing");
            Outcome::RejectRequeue
        }
    }
}

/// Decide and settle one delivery. Settlement failures are logged; the
/// broker redelivers unsettled messages after its ack wait.
pub async fn process_delivery<H, A>(payload: &[u8], acker: &A, handler: &H) -> Outcome
where
    H: MessageHandler,
    A: Acknowledge,
{
    let outcome = decide(payload, handler).await;
    if let Err(e) = acker.acknowledge(outcome).await {
        warn!(error = %e, ?outcome, "Failed to settle message");
    }
    outcome
}

/// Counts of settled deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Ack => self.acked += 1,
            Outcome::RejectNoRequeue => self.rejected += 1,
            Outcome::RejectRequeue => self.requeued += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.acked + self.rejected + self.requeued
    }
}

pub struct Consumer {
    inner: jetstream::consumer::PullConsumer,
    binding: Binding,
}

impl Consumer {
    /// Declare exchange, queue and binding, then attach to the queue.
    pub async fn bind(js: &Context, binding: Binding) -> Result<Self, ConsumerError> {
        let inner = topology::bind_queue(js, &binding).await?;
        Ok(Self { inner, binding })
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Handle messages until `shutdown` resolves or the stream ends.
    pub async fn consume<H, F>(&self, handler: &H, shutdown: F) -> Result<Tally, ConsumerError>
    where
        H: MessageHandler,
        F: Future<Output = ()>,
    {
        let messages = self
            .inner
            .stream()
            .max_messages_per_batch(PREFETCH as usize)
            .messages()
            .await
            .map_err(|e| ConsumerError::Stream {
                queue: self.binding.queue.clone(),
                reason: e.to_string(),
            })?;

        info!(
            exchange = %self.binding.exchange,
            queue = %self.binding.queue,
            "Consuming"
        );

        Ok(run_deliveries(messages, handler, shutdown).await)
    }
}

/// Pull, handle and settle deliveries one at a time.
///
/// `shutdown` is checked before every pull and wins over a ready delivery.
/// A delivery already pulled is always handled and settled first.
pub async fn run_deliveries<S, D, E, H, F>(deliveries: S, handler: &H, shutdown: F) -> Tally
where
    S: Stream<Item = Result<D, E>>,
    D: Delivery,
    E: std::fmt::Display,
    H: MessageHandler,
    F: Future<Output = ()>,
{
    tokio::pin!(deliveries);
    tokio::pin!(shutdown);
    let mut tally = Tally::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer pulling");
                break;
            }
            next = deliveries.next() => next,
        };

        let delivery = match next {
            Some(Ok(delivery)) => delivery,
            Some(Err(e)) => {
                error!(error = %e, "Error receiving message");
                continue;
            }
            None => {
                warn!("Message stream ended");
                break;
            }
        };

        delivery.log_received();
        let outcome = process_delivery(delivery.payload(), &delivery, handler).await;
        tally.record(outcome);
    }

    info!(
        acked = tally.acked,
        rejected = tally.rejected,
        requeued = tally.requeued,
        "Consumer stopped"
    );
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    struct StubHandler {
        result: fn() -> Result<(), HandlerError>,
        seen: Mutex<Vec<Value>>,
    }

    impl StubHandler {
        fn new(result: fn() -> Result<(), HandlerError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MessageHandler for StubHandler {
        async fn handle(&self, payload: &Value) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(payload.clone());
            (self.result)()
        }
    }

    #[derive(Default)]
    struct RecordingAcker {
        outcomes: Mutex<Vec<Outcome>>,
        fail: bool,
    }

    impl Acknowledge for RecordingAcker {
        async fn acknowledge(&self, outcome: Outcome) -> Result<(), ConsumerError> {
            self.outcomes.lock().unwrap().push(outcome);
            if self.fail {
                Err(ConsumerError::Acknowledge("connection closed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn ok() -> Result<(), HandlerError> {
        Ok(())
    }

    fn malformed() -> Result<(), HandlerError> {
        Err(HandlerError::Malformed(MalformedRequest {
            problems: vec!["missing UrlDocument".to_string()],
        }))
    }

    fn retryable() -> Result<(), HandlerError> {
        Err(HandlerError::Retryable("timeout".into()))
    }

    #[tokio::test]
    async fn invalid_json_is_rejected_without_calling_handler() {
        let handler = StubHandler::new(ok);

        let outcome = decide(b"not json", &handler).await;

        assert_eq!(outcome, Outcome::RejectNoRequeue);
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_handling_is_acked() {
        let handler = StubHandler::new(ok);

        let outcome = decide(br#"{"idCitizen":1}"#, &handler).await;

        assert_eq!(outcome, Outcome::Ack);
        assert_eq!(handler.seen.lock().unwrap()[0]["idCitizen"], 1);
    }

    #[tokio::test]
    async fn malformed_request_is_rejected_without_requeue() {
        let outcome = decide(b"{}", &StubHandler::new(malformed)).await;
        assert_eq!(outcome, Outcome::RejectNoRequeue);
    }

    #[tokio::test]
    async fn retryable_failure_is_requeued() {
        let outcome = decide(b"{}", &StubHandler::new(retryable)).await;
        assert_eq!(outcome, Outcome::RejectRequeue);
    }

    #[tokio::test]
    async fn delivery_is_settled_with_decided_outcome() {
        let acker = RecordingAcker::default();

        let outcome = process_delivery(b"{}", &acker, &StubHandler::new(retryable)).await;

        assert_eq!(outcome, Outcome::RejectRequeue);
        assert_eq!(*acker.outcomes.lock().unwrap(), vec![Outcome::RejectRequeue]);
    }

    #[tokio::test]
    async fn settlement_failure_keeps_outcome() {
        let acker = RecordingAcker {
            fail: true,
            ..Default::default()
        };

        let outcome = process_delivery(b"{}", &acker, &StubHandler::new(ok)).await;

        assert_eq!(outcome, Outcome::Ack);
    }

    #[derive(Clone)]
    struct TestDelivery {
        payload: Vec<u8>,
        settled: Arc<Mutex<Vec<(Vec<u8>, Outcome)>>>,
    }

    impl Acknowledge for TestDelivery {
        async fn acknowledge(&self, outcome: Outcome) -> Result<(), ConsumerError> {
            self.settled.lock().unwrap().push((self.payload.clone(), outcome));
            Ok(())
        }
    }

    impl Delivery for TestDelivery {
        fn payload(&self) -> &[u8] {
            &self.payload
        }
    }

    fn deliveries(
        bodies: &[&str],
        settled: &Arc<Mutex<Vec<(Vec<u8>, Outcome)>>>,
    ) -> Vec<Result<TestDelivery, String>> {
        bodies
            .iter()
            .map(|body| {
                Ok(TestDelivery {
                    payload: body.as_bytes().to_vec(),
                    settled: settled.clone(),
                })
            })
            .collect()
    }

    /// Requests shutdown from inside its first `handle` call.
    struct StopsWhileHandling {
        stop: Mutex<Option<oneshot::Sender<()>>>,
        handled: AtomicUsize,
    }

    impl MessageHandler for StopsWhileHandling {
        async fn handle(&self, _payload: &Value) -> Result<(), HandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if let Some(stop) = self.stop.lock().unwrap().take() {
                stop.send(()).unwrap();
            }
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn shutdown_during_handling_settles_in_flight_delivery_and_stops_pulling() {
        let (stop, stopped) = oneshot::channel();
        let handler = StopsWhileHandling {
            stop: Mutex::new(Some(stop)),
            handled: AtomicUsize::new(0),
        };
        let settled = Arc::new(Mutex::new(Vec::new()));
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let stream = stream::iter(deliveries(&[r#"{"n":1}"#, r#"{"n":2}"#], &settled))
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let tally = run_deliveries(stream, &handler, async {
            let _ = stopped.await;
        })
        .await;

        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert_eq!(
            *settled.lock().unwrap(),
            vec![(br#"{"n":1}"#.to_vec(), Outcome::Ack)]
        );
        assert_eq!(
            tally,
            Tally {
                acked: 1,
                rejected: 0,
                requeued: 0
            }
        );
    }

    #[tokio::test]
    async fn ready_shutdown_wins_over_ready_delivery() {
        let settled = Arc::new(Mutex::new(Vec::new()));
        let handler = StubHandler::new(ok);

        let tally = run_deliveries(
            stream::iter(deliveries(&["{}"], &settled)),
            &handler,
            std::future::ready(()),
        )
        .await;

        assert_eq!(tally.total(), 0);
        assert!(settled.lock().unwrap().is_empty());
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_delivery_is_settled_until_stream_ends() {
        let settled = Arc::new(Mutex::new(Vec::new()));
        let mut items = deliveries(&["{}", "not json"], &settled);
        items.insert(1, Err("connection reset".to_string()));

        let tally = run_deliveries(
            stream::iter(items),
            &StubHandler::new(ok),
            std::future::pending(),
        )
        .await;

        assert_eq!(
            tally,
            Tally {
                acked: 1,
                rejected: 1,
                requeued: 0
            }
        );
        let outcomes: Vec<Outcome> = settled.lock().unwrap().iter().map(|(_, o)| *o).collect();
        assert_eq!(outcomes, vec![Outcome::Ack, Outcome::RejectNoRequeue]);
    }

    #[test]
    fn outcomes_map_to_ack_kinds() {
        assert!(matches!(Outcome::Ack.ack_kind(), AckKind::Ack));
        assert!(matches!(Outcome::RejectNoRequeue.ack_kind(), AckKind::Term));
        assert!(matches!(Outcome::RejectRequeue.ack_kind(), AckKind::Nak(None)));
    }

    #[test]
    fn tally_counts_each_outcome() {
        let mut tally = Tally::default();
        tally.record(Outcome::Ack);
        tally.record(Outcome::Ack);
        tally.record(Outcome::RejectNoRequeue);
        tally.record(Outcome::RejectRequeue);

        assert_eq!(
            tally,
            Tally {
                acked: 2,
                rejected: 1,
                requeued: 1
            }
        );
        assert_eq!(tally.total(), 4);
    }
}
