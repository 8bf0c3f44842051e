//! Configuration resolved from environment variables.
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `NATS_URL` | `localhost:4222` | comma-separated NATS server list |
//! | `NATS_CREDS` | unset | credentials file (highest auth priority) |
//! | `NATS_USER` + `NATS_PASSWORD` | unset | user/password auth |
//! | `NATS_TOKEN` | unset | token auth |
//! | `DOCAUTH_EXCHANGE` | `citizen_affiliation` | topic exchange (JetStream stream) |
//! | `DOCAUTH_QUEUE` | `document.authentication` | durable queue (pull consumer) |
//! | `DOCAUTH_ROUTING_KEY` | `document.authentication.requested` | inbound binding key |
//! | `DOCAUTH_MAX_DELIVER` | `5` | deliveries before the broker gives up on a message |
//! | `DOCAUTH_TRACE_BUCKET` | `document_auth_traces` | KV bucket holding trace records |
//! | `CENTRALIZER_BASE_URL` | GovCarpeta API | external centralizer base URL |
//! | `CENTRALIZER_TIMEOUT_SECS` | `30` | per-request timeout towards the centralizer |

use std::path::PathBuf;
use std::time::Duration;

use docauth_types::routing;
use tracing::warn;

use crate::env::ReadEnv;
use crate::topology::Binding;

const ENV_NATS_URL: &str = "NATS_URL";
const ENV_NATS_CREDS: &str = "NATS_CREDS";
const ENV_NATS_USER: &str = "NATS_USER";
const ENV_NATS_PASSWORD: &str = "NATS_PASSWORD";
const ENV_NATS_TOKEN: &str = "NATS_TOKEN";

const ENV_EXCHANGE: &str = "DOCAUTH_EXCHANGE";
const ENV_QUEUE: &str = "DOCAUTH_QUEUE";
const ENV_ROUTING_KEY: &str = "DOCAUTH_ROUTING_KEY";
const ENV_MAX_DELIVER: &str = "DOCAUTH_MAX_DELIVER";
const ENV_TRACE_BUCKET: &str = "DOCAUTH_TRACE_BUCKET";
const ENV_CENTRALIZER_BASE_URL: &str = "CENTRALIZER_BASE_URL";
const ENV_CENTRALIZER_TIMEOUT_SECS: &str = "CENTRALIZER_TIMEOUT_SECS";

const DEFAULT_NATS_URL: &str = "localhost:4222";
const DEFAULT_MAX_DELIVER: i64 = 5;
const DEFAULT_TRACE_BUCKET: &str = "document_auth_traces";
const DEFAULT_CENTRALIZER_BASE_URL: &str = "https://govcarpeta-apis-4905ff3c005b.herokuapp.com";
const DEFAULT_CENTRALIZER_TIMEOUT: Duration = Duration::from_secs(30);

/// NATS authentication method, resolved in the order
/// credentials file > user/password > token > none.
#[derive(Debug, Clone)]
pub enum NatsAuth {
    Credentials(PathBuf),
    UserPassword { user: String, password: String },
    Token(String),
    None,
}

impl NatsAuth {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials file",
            Self::UserPassword { .. } => "user/password",
            Self::Token(_) => "token",
            Self::None => "none",
        }
    }

    fn from_env<E: ReadEnv>(env: &E) -> Self {
        if let Ok(path) = env.var(ENV_NATS_CREDS) {
            return Self::Credentials(PathBuf::from(path));
        }
        if let (Ok(user), Ok(password)) = (env.var(ENV_NATS_USER), env.var(ENV_NATS_PASSWORD)) {
            return Self::UserPassword { user, password };
        }
        if let Ok(token) = env.var(ENV_NATS_TOKEN) {
            return Self::Token(token);
        }
        Self::None
    }
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub auth: NatsAuth,
}

impl NatsConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        let raw = env
            .var(ENV_NATS_URL)
            .unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());
        Self {
            servers: raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            auth: NatsAuth::from_env(env),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CentralizerConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Everything the consumer binary needs to start.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub nats: NatsConfig,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub max_deliver: i64,
    pub trace_bucket: String,
    pub centralizer: CentralizerConfig,
}

impl ProxyConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            nats: NatsConfig::from_env(env),
            exchange: env
                .var(ENV_EXCHANGE)
                .unwrap_or_else(|_| routing::DEFAULT_EXCHANGE.to_string()),
            queue: env
                .var(ENV_QUEUE)
                .unwrap_or_else(|_| routing::DEFAULT_QUEUE.to_string()),
            routing_key: env
                .var(ENV_ROUTING_KEY)
                .unwrap_or_else(|_| routing::AUTHENTICATION_REQUESTED.to_string()),
            max_deliver: positive_or(env, ENV_MAX_DELIVER, DEFAULT_MAX_DELIVER),
            trace_bucket: env
                .var(ENV_TRACE_BUCKET)
                .unwrap_or_else(|_| DEFAULT_TRACE_BUCKET.to_string()),
            centralizer: CentralizerConfig {
                base_url: env
                    .var(ENV_CENTRALIZER_BASE_URL)
                    .unwrap_or_else(|_| DEFAULT_CENTRALIZER_BASE_URL.to_string()),
                timeout: Duration::from_secs(positive_or(
                    env,
                    ENV_CENTRALIZER_TIMEOUT_SECS,
                    DEFAULT_CENTRALIZER_TIMEOUT.as_secs(),
                )),
            },
        }
    }

    /// Queue binding for the inbound authentication requests.
    pub fn binding(&self) -> Binding {
        Binding {
            exchange: self.exchange.clone(),
            queue: self.queue.clone(),
            routing_key: self.routing_key.clone(),
            max_deliver: self.max_deliver,
        }
    }
}

/// Positive integer from `key`, or `default` when unset or invalid.
fn positive_or<E, T>(env: &E, key: &str, default: T) -> T
where
    E: ReadEnv,
    T: std::str::FromStr + PartialOrd + Default + std::fmt::Display + Copy,
{
    let Ok(raw) = env.var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        Ok(value) => {
            warn!("{key}={value} must be positive, using default {default}");
            default
        }
        Err(_) => {
            warn!("{key}={raw:?} is not a valid integer, using default {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::InMemoryEnv;

    #[test]
    fn defaults_when_no_env_vars() {
        let env = InMemoryEnv::new();
        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.nats.servers, vec!["localhost:4222"]);
        assert!(matches!(config.nats.auth, NatsAuth::None));
        assert_eq!(config.exchange, "citizen_affiliation");
        assert_eq!(config.queue, "document.authentication");
        assert_eq!(config.routing_key, "document.authentication.requested");
        assert_eq!(config.max_deliver, 5);
        assert_eq!(config.trace_bucket, "document_auth_traces");
        assert_eq!(config.centralizer.base_url, DEFAULT_CENTRALIZER_BASE_URL);
        assert_eq!(config.centralizer.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_all_env_vars() {
        let env = InMemoryEnv::new();
        env.set("NATS_URL", "nats-1:4222, nats-2:4222");
        env.set("DOCAUTH_EXCHANGE", "affiliation");
        env.set("DOCAUTH_QUEUE", "docs.auth");
        env.set("DOCAUTH_ROUTING_KEY", "document.#");
        env.set("DOCAUTH_MAX_DELIVER", "9");
        env.set("DOCAUTH_TRACE_BUCKET", "traces");
        env.set("CENTRALIZER_BASE_URL", "http://centralizer.local");
        env.set("CENTRALIZER_TIMEOUT_SECS", "4");

        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.nats.servers, vec!["nats-1:4222", "nats-2:4222"]);
        assert_eq!(config.exchange, "affiliation");
        assert_eq!(config.queue, "docs.auth");
        assert_eq!(config.routing_key, "document.#");
        assert_eq!(config.max_deliver, 9);
        assert_eq!(config.trace_bucket, "traces");
        assert_eq!(config.centralizer.base_url, "http://centralizer.local");
        assert_eq!(config.centralizer.timeout, Duration::from_secs(4));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let env = InMemoryEnv::new();
        env.set("DOCAUTH_MAX_DELIVER", "many");
        env.set("CENTRALIZER_TIMEOUT_SECS", "0");

        let config = ProxyConfig::from_env(&env);

        assert_eq!(config.max_deliver, DEFAULT_MAX_DELIVER);
        assert_eq!(config.centralizer.timeout, DEFAULT_CENTRALIZER_TIMEOUT);
    }

    #[test]
    fn nats_auth_priority() {
        let env = InMemoryEnv::new();
        env.set("NATS_TOKEN", "tok");
        assert!(matches!(NatsConfig::from_env(&env).auth, NatsAuth::Token(t) if t == "tok"));

        env.set("NATS_USER", "user");
        env.set("NATS_PASSWORD", "pass");
        assert!(matches!(
            NatsConfig::from_env(&env).auth,
            NatsAuth::UserPassword { user, .. } if user == "user"
        ));

        env.set("NATS_CREDS", "/etc/nats/app.creds");
        assert!(matches!(
            NatsConfig::from_env(&env).auth,
            NatsAuth::Credentials(p) if p == std::path::Path::new("/etc/nats/app.creds")
        ));
    }

    #[test]
    fn user_without_password_is_no_auth() {
        let env = InMemoryEnv::new();
        env.set("NATS_USER", "user");
        assert!(matches!(NatsConfig::from_env(&env).auth, NatsAuth::None));
    }

    #[test]
    fn binding_mirrors_config() {
        let env = InMemoryEnv::new();
        env.set("DOCAUTH_MAX_DELIVER", "3");
        let binding = ProxyConfig::from_env(&env).binding();

        assert_eq!(binding.exchange, "citizen_affiliation");
        assert_eq!(binding.queue, "document.authentication");
        assert_eq!(binding.routing_key, "document.authentication.requested");
        assert_eq!(binding.max_deliver, 3);
    }

    #[test]
    fn auth_descriptions() {
        assert_eq!(NatsAuth::Credentials("/a".into()).description(), "credentials file");
        assert_eq!(NatsAuth::Token("t".into()).description(), "token");
        assert_eq!(NatsAuth::None.description(), "none");
    }
}
