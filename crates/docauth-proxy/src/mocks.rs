//! Test doubles for the centralizer, the event publisher, the trace store
//! and the clock.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! docauth-proxy = { path = "...", features = ["test-support"] }
//! ```

use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use docauth_types::{BusinessOutcome, CitizenLookup, TraceEntry, TraceId};
use serde::Serialize;
use serde_json::Value;

use crate::centralizer::{Centralizer, TransportFailure};
use crate::clock::Clock;
use crate::publisher::{EventPublisher, PublishError};
use crate::store::{MemoryTraceStore, StoreError, TraceStore};

// ── MockCentralizer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateCall {
    pub id_citizen: i64,
    pub url_document: String,
    pub document_title: String,
}

/// Scripted centralizer.
///
/// Answers are consumed in order. With nothing scripted, documents
/// authenticate (`200`) and citizens are unknown (`204`).
#[derive(Clone, Default)]
pub struct MockCentralizer {
    authentications: Arc<Mutex<VecDeque<Result<BusinessOutcome, TransportFailure>>>>,
    lookups: Arc<Mutex<VecDeque<Result<CitizenLookup, TransportFailure>>>>,
    authenticate_calls: Arc<Mutex<Vec<AuthenticateCall>>>,
    validate_calls: Arc<Mutex<Vec<i64>>>,
}

impl MockCentralizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, success: bool, status_code: u16) {
        self.authentications
            .lock()
            .unwrap()
            .push_back(Ok(BusinessOutcome {
                success,
                status_code,
                message: String::new(),
                data: None,
            }));
    }

    pub fn fail_authentication(&self, failure: TransportFailure) {
        self.authentications.lock().unwrap().push_back(Err(failure));
    }

    /// Next authentication call times out.
    pub fn time_out(&self) {
        self.fail_authentication(TransportFailure::Timeout {
            url: "http://centralizer.test/apis/authenticateDocument".to_string(),
            timeout_secs: 30,
        });
    }

    pub fn citizen_exists(&self, exists: bool) {
        self.lookups.lock().unwrap().push_back(Ok(CitizenLookup {
            exists,
            status_code: if exists { 200 } else { 204 },
            data: exists.then(|| serde_json::json!({ "name": "Ana", "operator": "X" })),
        }));
    }

    pub fn fail_lookup(&self, failure: TransportFailure) {
        self.lookups.lock().unwrap().push_back(Err(failure));
    }

    pub fn authenticate_calls(&self) -> Vec<AuthenticateCall> {
        self.authenticate_calls.lock().unwrap().clone()
    }

    pub fn validate_calls(&self) -> Vec<i64> {
        self.validate_calls.lock().unwrap().clone()
    }
}

impl Centralizer for MockCentralizer {
    async fn validate_citizen(&self, id_citizen: i64) -> Result<CitizenLookup, TransportFailure> {
        self.validate_calls.lock().unwrap().push(id_citizen);
        self.lookups.lock().unwrap().pop_front().unwrap_or(Ok(CitizenLookup {
            exists: false,
            status_code: 204,
            data: None,
        }))
    }

    async fn authenticate_document(
        &self,
        id_citizen: i64,
        url_document: &str,
        document_title: &str,
    ) -> Result<BusinessOutcome, TransportFailure> {
        self.authenticate_calls.lock().unwrap().push(AuthenticateCall {
            id_citizen,
            url_document: url_document.to_string(),
            document_title: document_title.to_string(),
        });
        self.authentications
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(BusinessOutcome {
                success: true,
                status_code: 200,
                message: String::new(),
                data: None,
            }))
    }
}

// ── MockEventPublisher ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub routing_key: String,
    pub payload: Value,
}

/// Records every accepted event. Can be told to reject the next publishes.
#[derive(Clone, Default)]
pub struct MockEventPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_publish(&self) {
        self.fail_publish_count(1);
    }

    pub fn fail_publish_count(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Publish calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventPublisher for MockEventPublisher {
    async fn publish<T: Serialize + Sync>(
        &self,
        routing_key: &str,
        payload: &T,
    ) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(PublishError::Transport {
                routing_key: routing_key.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        let payload = serde_json::to_value(payload).map_err(|source| PublishError::Serialize {
            routing_key: routing_key.to_string(),
            source,
        })?;
        self.events.lock().unwrap().push(PublishedEvent {
            routing_key: routing_key.to_string(),
            payload,
        });
        Ok(())
    }
}

// ── MockTraceStore ────────────────────────────────────────────────────────────

/// In-memory store whose updates can be made to fail.
#[derive(Clone)]
pub struct MockTraceStore<R> {
    inner: MemoryTraceStore<R>,
    updates_before_failure: Arc<AtomicUsize>,
    update_failures_left: Arc<AtomicUsize>,
}

impl<R> Default for MockTraceStore<R> {
    fn default() -> Self {
        Self {
            inner: MemoryTraceStore::default(),
            updates_before_failure: Arc::new(AtomicUsize::new(0)),
            update_failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<R: TraceEntry> MockTraceStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_update(&self) {
        self.fail_update_count(1);
    }

    pub fn fail_update_count(&self, count: usize) {
        self.updates_before_failure.store(0, Ordering::SeqCst);
        self.update_failures_left.store(count, Ordering::SeqCst);
    }

    /// Let `succeeding` updates through, then fail the one after.
    pub fn fail_update_after(&self, succeeding: usize) {
        self.updates_before_failure.store(succeeding, Ordering::SeqCst);
        self.update_failures_left.store(1, Ordering::SeqCst);
    }

    /// Every stored entry, newest first.
    pub fn all(&self) -> Vec<R> {
        self.inner.all()
    }
}

impl<R: TraceEntry> TraceStore<R> for MockTraceStore<R> {
    async fn create(&self, entry: &R) -> Result<(), StoreError> {
        self.inner.create(entry).await
    }

    async fn update(&self, entry: &R) -> Result<(), StoreError> {
        let skipped = self
            .updates_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let should_fail = !skipped
            && self
                .update_failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if should_fail {
            return Err(StoreError::Backend("kv unavailable".to_string()));
        }
        self.inner.update(entry).await
    }

    async fn get(&self, id: &TraceId) -> Result<Option<R>, StoreError> {
        self.inner.get(id).await
    }

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<R>, StoreError> {
        self.inner.list_by_subject(subject_id).await
    }
}

// ── MockClock ─────────────────────────────────────────────────────────────────

/// Deterministic clock that moves forward one second per reading.
#[derive(Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::starting_at(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Time the next call to `now` will return.
    pub fn peek(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now = current + TimeDelta::seconds(1);
        current
    }
}
