use std::time::Duration;

use docauth_proxy::env::SystemEnv;
use docauth_proxy::signal::shutdown_signal;
use docauth_proxy::{
    AuthenticationHandler, Consumer, DocumentAuthenticator, HttpCentralizer, JetStreamPublisher,
    KvTraceStore, ProxyConfig, SystemClock, connect,
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env(&SystemEnv);

    let nats = connect(&config.nats, CONNECTION_TIMEOUT)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to NATS");
            std::process::exit(1);
        });
    let js = async_nats::jetstream::new(nats.clone());

    let traces = KvTraceStore::open(&js, &config.trace_bucket)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, bucket = %config.trace_bucket, "Failed to open trace bucket");
            std::process::exit(1);
        });

    let centralizer = HttpCentralizer::new(&config.centralizer.base_url, config.centralizer.timeout)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build centralizer HTTP client");
            std::process::exit(1);
        });

    let handler = AuthenticationHandler::new(DocumentAuthenticator::new(
        centralizer,
        JetStreamPublisher::new(js.clone(), &config.exchange),
        traces,
        SystemClock,
    ));

    let consumer = Consumer::bind(&js, config.binding())
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to bind queue");
            std::process::exit(1);
        });

    tracing::info!(
        centralizer = %config.centralizer.base_url,
        max_deliver = config.max_deliver,
        "Starting document authentication consumer"
    );

    let shutdown = async {
        let signal = shutdown_signal().await;
        tracing::info!(?signal, "Stopping after the message in flight");
    };
    let result = consumer.consume(&handler, shutdown).await;

    if let Err(e) = nats.drain().await {
        tracing::warn!(error = %e, "Failed to drain NATS connection");
    }

    if let Err(e) = result {
        tracing::error!(error = %e, "Consumer exited with error");
        std::process::exit(1);
    }
}
