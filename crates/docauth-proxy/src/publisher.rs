use std::future::Future;

use async_nats::jetstream::Context;
use docauth_types::routing;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode event for {routing_key}: {source}")]
    Serialize {
        routing_key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish event on {routing_key}: {reason}")]
    Transport { routing_key: String, reason: String },
}

/// Durable publication of JSON events onto the exchange.
///
/// Returns only once the broker has accepted the event. No retry.
pub trait EventPublisher: Send + Sync + 'static {
    fn publish<T: Serialize + Sync>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Publishes onto the exchange's file-backed stream and waits for the
/// JetStream ack, so accepted events survive a broker restart.
#[derive(Clone)]
pub struct JetStreamPublisher {
    js: Context,
    exchange: String,
}

impl JetStreamPublisher {
    pub fn new(js: Context, exchange: impl Into<String>) -> Self {
        Self {
            js,
            exchange: exchange.into(),
        }
    }
}

impl EventPublisher for JetStreamPublisher {
    async fn publish<T: Serialize + Sync>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_vec(payload).map_err(|source| PublishError::Serialize {
            routing_key: routing_key.to_string(),
            source,
        })?;
        let subject = routing::subject(&self.exchange, routing_key);
        let transport = |e: &dyn std::fmt::Display| PublishError::Transport {
            routing_key: routing_key.to_string(),
            reason: e.to_string(),
        };

        let ack = self
            .js
            .publish(subject.clone(), body.into())
            .await
            .map_err(|e| transport(&e))?;
        ack.await.map_err(|e| transport(&e))?;

        tracing::debug!(subject = %subject, "Event accepted by JetStream");
        Ok(())
    }
}
