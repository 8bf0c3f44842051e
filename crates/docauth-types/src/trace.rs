//! Traceability record for one document authentication attempt.
//!
//! ```text
//! PENDING ──answered──▶ SENT
//!    └──────failed────▶ ERROR
//! ```
//!
//! Transitions consume the record and return the updated value. They never
//! touch storage; persisting the result is the caller's job.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::centralizer::STATUS_OK;

/// Titles longer than this are truncated when the record is created.
pub const MAX_DOCUMENT_TITLE_CHARS: usize = 200;

/// Opaque identifier of a stored trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id. Ids contain no `.` so they are safe inside KV keys.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    Pending,
    Sent,
    Error,
}

impl TraceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when the centralizer was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt<'a> {
    /// The call completed at the transport level, whatever the business answer.
    Answered { success: bool, status_code: u16 },
    /// The call itself failed (network, timeout, remote exception).
    Failed { cause: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("trace {id} already left PENDING (status {status})")]
    AlreadyTerminal { id: TraceId, status: TraceStatus },

    #[error("trace {id} is still PENDING, no result event can be recorded")]
    StillPending { id: TraceId },

    #[error("trace {id} already recorded its result event")]
    AlreadyPublished { id: TraceId },
}

/// Common shape of everything kept in a trace store.
pub trait TraceEntry: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn trace_id(&self) -> &TraceId;

    /// Citizen the entry is about; stores index by it.
    fn subject_id(&self) -> i64;

    /// When the entry was first recorded; listings are newest first.
    fn recorded_at(&self) -> DateTime<Utc>;
}

/// One authentication attempt as seen by this proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    id: TraceId,
    subject_id: i64,
    document_title: String,
    status: TraceStatus,
    auth_success: bool,
    external_status_code: Option<u16>,
    error_message: String,
    received_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    event_published_at: Option<DateTime<Utc>>,
}

impl TraceRecord {
    /// New record for a request that has not reached the centralizer yet.
    pub fn pending(
        id: TraceId,
        subject_id: i64,
        document_title: &str,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject_id,
            document_title: document_title.chars().take(MAX_DOCUMENT_TITLE_CHARS).collect(),
            status: TraceStatus::Pending,
            auth_success: false,
            external_status_code: None,
            error_message: String::new(),
            received_at,
            sent_at: None,
            event_published_at: None,
        }
    }

    /// Leave PENDING according to the centralizer call result.
    ///
    /// `sent_at` is stamped here and nowhere else.
    pub fn record_attempt(
        self,
        attempt: Attempt<'_>,
        at: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }

        Ok(match attempt {
            Attempt::Answered {
                success,
                status_code,
            } => Self {
                status: TraceStatus::Sent,
                auth_success: success && status_code == STATUS_OK,
                external_status_code: Some(status_code),
                sent_at: Some(at),
                ..self
            },
            Attempt::Failed { cause } => Self {
                status: TraceStatus::Error,
                auth_success: false,
                error_message: cause.to_string(),
                sent_at: Some(at),
                ..self
            },
        })
    }

    /// Stamp the moment the result event was accepted by the broker.
    pub fn record_published(self, at: DateTime<Utc>) -> Result<Self, TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError::StillPending { id: self.id });
        }
        if self.event_published_at.is_some() {
            return Err(TransitionError::AlreadyPublished { id: self.id });
        }
        Ok(Self {
            event_published_at: Some(at),
            ..self
        })
    }

    pub fn id(&self) -> &TraceId {
        &self.id
    }

    pub fn document_title(&self) -> &str {
        &self.document_title
    }

    pub fn status(&self) -> TraceStatus {
        self.status
    }

    pub fn auth_success(&self) -> bool {
        self.auth_success
    }

    pub fn external_status_code(&self) -> Option<u16> {
        self.external_status_code
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn event_published_at(&self) -> Option<DateTime<Utc>> {
        self.event_published_at
    }
}

impl TraceEntry for TraceRecord {
    fn trace_id(&self) -> &TraceId {
        &self.id
    }

    fn subject_id(&self) -> i64 {
        self.subject_id
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trace - Citizen {} - {} - {}",
            self.subject_id, self.document_title, self.status
        )
    }
}
