//! Exchange and queue declaration on JetStream.
//!
//! An exchange is a file-backed stream with limits retention capturing every
//! routing key under it, so each bound queue sees every matching event. A
//! queue is a durable pull consumer filtered on its binding key.

use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, Context};
use docauth_types::routing;

/// Unacknowledged messages allowed per consumer.
pub const PREFETCH: i64 = 1;

const EXCHANGE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// A durable queue bound to a topic exchange with one routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// Deliveries of one message before the broker stops redelivering it.
    pub max_deliver: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to declare exchange {exchange}: {reason}")]
    Exchange { exchange: String, reason: String },

    /// Another exchange already owns the stream name this one maps to.
    #[error("stream {stream} for exchange {exchange} captures {existing:?}, expected {expected:?}")]
    ExchangeConflict {
        exchange: String,
        stream: String,
        existing: Vec<String>,
        expected: Vec<String>,
    },

    #[error("failed to bind queue {queue} to {exchange}: {reason}")]
    Queue {
        exchange: String,
        queue: String,
        reason: String,
    },
}

pub(crate) fn exchange_config(exchange: &str) -> StreamConfig {
    StreamConfig {
        name: routing::stream_name(exchange),
        subjects: vec![routing::exchange_subjects(exchange)],
        retention: RetentionPolicy::Limits,
        storage: StorageType::File,
        max_age: EXCHANGE_MAX_AGE,
        ..Default::default()
    }
}

pub(crate) fn queue_config(binding: &Binding) -> pull::Config {
    let name = routing::consumer_name(&binding.queue);
    pull::Config {
        durable_name: Some(name.clone()),
        name: Some(name),
        filter_subject: routing::subject(&binding.exchange, &binding.routing_key),
        ack_policy: AckPolicy::Explicit,
        deliver_policy: DeliverPolicy::New,
        max_ack_pending: PREFETCH,
        max_deliver: binding.max_deliver,
        ..Default::default()
    }
}

fn check_exchange_subjects(exchange: &str, existing: &StreamConfig) -> Result<(), TopologyError> {
    let expected = exchange_config(exchange);
    if existing.subjects == expected.subjects {
        return Ok(());
    }
    Err(TopologyError::ExchangeConflict {
        exchange: exchange.to_string(),
        stream: expected.name,
        existing: existing.subjects.clone(),
        expected: expected.subjects,
    })
}

/// Declare the exchange stream. Idempotent.
///
/// Fails when the stream already exists for a different exchange whose name
/// sanitizes to the same stream name.
pub async fn ensure_exchange(js: &Context, exchange: &str) -> Result<jetstream::stream::Stream, TopologyError> {
    let stream = js
        .get_or_create_stream(exchange_config(exchange))
        .await
        .map_err(|e| TopologyError::Exchange {
            exchange: exchange.to_string(),
            reason: e.to_string(),
        })?;
    check_exchange_subjects(exchange, &stream.cached_info().config)?;
    Ok(stream)
}

/// Declare the exchange and the durable queue bound to it. Idempotent.
pub async fn bind_queue(js: &Context, binding: &Binding) -> Result<PullConsumer, TopologyError> {
    let stream = ensure_exchange(js, &binding.exchange).await?;
    let consumer = stream
        .get_or_create_consumer(&routing::consumer_name(&binding.queue), queue_config(binding))
        .await
        .map_err(|e| TopologyError::Queue {
            exchange: binding.exchange.clone(),
            queue: binding.queue.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        exchange = %binding.exchange,
        queue = %binding.queue,
        routing_key = %binding.routing_key,
        "Queue bound"
    );
    Ok(consumer)
}
