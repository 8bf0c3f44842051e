//! Exchange, queue and routing-key names, and how they map onto NATS.
//!
//! The exchange is a JetStream stream capturing `{exchange}.>`; a routing key
//! `a.b.c` becomes the subject `{exchange}.a.b.c`.

// ── Defaults ────────────────────────────────────────────────────────────────

/// Topic exchange shared by the affiliation services.
pub const DEFAULT_EXCHANGE: &str = "citizen_affiliation";

/// Durable queue the consumer pulls authentication requests from.
pub const DEFAULT_QUEUE: &str = "document.authentication";

// ── Routing keys ────────────────────────────────────────────────────────────

/// Inbound: a document should be authenticated against the centralizer.
pub const AUTHENTICATION_REQUESTED: &str = "document.authentication.requested";

/// Outbound: the centralizer authenticated the document.
pub const AUTHENTICATION_READY: &str = "document.authentication.ready";

/// Outbound: authentication was rejected or could not be performed.
pub const AUTHENTICATION_FAILURE: &str = "document.auth.failure";

/// Routing key for a result event, chosen by the final `authSuccess` value.
pub fn result_routing_key(auth_success: bool) -> &'static str {
    if auth_success {
        AUTHENTICATION_READY
    } else {
        AUTHENTICATION_FAILURE
    }
}

// ── NATS mapping ────────────────────────────────────────────────────────────

/// NATS subject for a routing key published on `exchange`.
///
/// AMQP's multi-word wildcard `#` becomes `>`; `*` has the same meaning in both.
pub fn subject(exchange: &str, routing_key: &str) -> String {
    let tokens: Vec<&str> = routing_key
        .split('.')
        .map(|token| if token == "#" { ">" } else { token })
        .collect();
    format!("{}.{}", exchange, tokens.join("."))
}

/// Subject pattern that captures every routing key on `exchange`.
pub fn exchange_subjects(exchange: &str) -> String {
    format!("{exchange}.>")
}

/// JetStream stream name for an exchange.
pub fn stream_name(exchange: &str) -> String {
    sanitize(exchange)
}

/// Durable consumer name for a queue.
pub fn consumer_name(queue: &str) -> String {
    sanitize(queue)
}

/// Stream and consumer names may not contain `.`, wildcards, whitespace or path separators.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
