//! NATS connection with retry-on-start, capped exponential reconnect and
//! connection events surfaced as log lines.

use std::time::Duration;

use async_nats::{Client, ConnectOptions, Event};
use tracing::{info, instrument, warn};

use crate::config::{NatsAuth, NatsConfig};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to load NATS credentials file: {0}")]
    InvalidCredentials(#[source] std::io::Error),

    #[error("failed to connect to NATS servers {servers:?}: {source}")]
    ConnectionFailed {
        servers: Vec<String>,
        #[source]
        source: async_nats::ConnectError,
    },
}

fn reconnect_delay(attempts: usize) -> Duration {
    let exponent = u32::try_from(attempts).unwrap_or(u32::MAX);
    let delay = Duration::from_secs(std::cmp::min(
        MAX_RECONNECT_DELAY.as_secs(),
        2u64.saturating_pow(exponent),
    ));
    info!(attempts, delay_secs = delay.as_secs(), "NATS reconnect delay");
    delay
}

async fn log_event(event: Event) {
    match event {
        Event::Connected => info!("NATS connected"),
        Event::Disconnected => warn!("NATS disconnected, reconnecting"),
        Event::ServerError(err) => warn!(error = %err, "NATS server error"),
        Event::ClientError(err) => warn!(error = %err, "NATS client error"),
        Event::SlowConsumer(sid) => warn!(sid, "NATS slow consumer"),
        Event::LameDuckMode => warn!("NATS server entering lame duck mode"),
        other => info!(event = %other, "NATS connection event"),
    }
}

fn options(auth: &NatsAuth, connection_timeout: Duration) -> ConnectOptions {
    let base = match auth {
        NatsAuth::UserPassword { user, password } => {
            ConnectOptions::with_user_and_password(user.clone(), password.clone())
        }
        NatsAuth::Token(token) => ConnectOptions::with_token(token.clone()),
        NatsAuth::Credentials(_) | NatsAuth::None => ConnectOptions::new(),
    };
    decorate(base, connection_timeout)
}

fn decorate(opts: ConnectOptions, connection_timeout: Duration) -> ConnectOptions {
    opts.retry_on_initial_connect()
        .connection_timeout(connection_timeout)
        .reconnect_delay_callback(reconnect_delay)
        .event_callback(|event| async move { log_event(event).await })
}

/// Connect to the configured servers.
#[instrument(
    name = "nats.connect",
    skip(config),
    fields(servers = ?config.servers, auth = %config.auth.description())
)]
pub async fn connect(config: &NatsConfig, connection_timeout: Duration) -> Result<Client, ConnectError> {
    let opts = match &config.auth {
        NatsAuth::Credentials(path) => {
            let opts = ConnectOptions::with_credentials_file(path.clone())
                .await
                .map_err(|e| {
                    warn!(error = %e, path = %path.display(), "Failed to load credentials file");
                    ConnectError::InvalidCredentials(e)
                })?;
            decorate(opts, connection_timeout)
        }
        auth => options(auth, connection_timeout),
    };

    match opts.connect(&config.servers).await {
        Ok(client) => {
            info!("Connected to NATS");
            Ok(client)
        }
        Err(source) => {
            warn!(error = %source, "Failed to connect to NATS");
            Err(ConnectError::ConnectionFailed {
                servers: config.servers.clone(),
                source,
            })
        }
    }
}
