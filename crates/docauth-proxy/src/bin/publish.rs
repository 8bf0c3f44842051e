//! Publish one authentication request onto the exchange, for smoke tests.

use std::time::Duration;

use clap::Parser;
use docauth_proxy::env::SystemEnv;
use docauth_proxy::topology::ensure_exchange;
use docauth_proxy::{EventPublisher, JetStreamPublisher, ProxyConfig, connect};
use docauth_types::{AuthenticationRequested, routing};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "docauth-publish")]
#[command(about = "Publish a document.authentication.requested event", long_about = None)]
struct Args {
    /// Citizen identifier (`idCitizen`).
    id_citizen: i64,

    /// Document URL (`UrlDocument`).
    url_document: String,

    /// Document title (`documentTitle`).
    document_title: String,

    #[arg(long, default_value = routing::AUTHENTICATION_REQUESTED)]
    routing_key: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ProxyConfig::from_env(&SystemEnv);

    let nats = connect(&config.nats, CONNECTION_TIMEOUT)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to NATS");
            std::process::exit(1);
        });
    let js = async_nats::jetstream::new(nats.clone());

    if let Err(e) = ensure_exchange(&js, &config.exchange).await {
        tracing::error!(error = %e, "Failed to declare exchange");
        std::process::exit(1);
    }

    let request = AuthenticationRequested {
        id_citizen: args.id_citizen,
        url_document: args.url_document,
        document_title: args.document_title,
    };

    let publisher = JetStreamPublisher::new(js, &config.exchange);
    let result = publisher.publish(&args.routing_key, &request).await;

    if let Err(e) = nats.drain().await {
        tracing::warn!(error = %e, "Failed to drain NATS connection");
    }

    match result {
        Ok(()) => tracing::info!(
            exchange = %config.exchange,
            routing_key = %args.routing_key,
            id_citizen = request.id_citizen,
            "Authentication request published"
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to publish authentication request");
            std::process::exit(1);
        }
    }
}
