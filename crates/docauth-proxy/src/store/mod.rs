//! Persistence for trace entries.
//!
//! Entries are created once and then updated in place; nothing here deletes.

mod kv;
mod memory;

use std::future::Future;

use docauth_types::{TraceEntry, TraceId};

pub use kv::KvTraceStore;
pub use memory::MemoryTraceStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("trace {0} already exists")]
    AlreadyExists(TraceId),

    #[error("trace {0} not found")]
    NotFound(TraceId),

    #[error("failed to encode trace {id}: {source}")]
    Encode {
        id: TraceId,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode stored trace {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("trace store backend error: {0}")]
    Backend(String),
}

pub trait TraceStore<R: TraceEntry>: Send + Sync + 'static {
    /// Insert a new entry. Fails if one with the same id exists.
    fn create(&self, entry: &R) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace the stored state of an existing entry.
    fn update(&self, entry: &R) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(&self, id: &TraceId) -> impl Future<Output = Result<Option<R>, StoreError>> + Send;

    /// Entries about one citizen, newest first.
    fn list_by_subject(&self, subject_id: i64) -> impl Future<Output = Result<Vec<R>, StoreError>> + Send;
}

fn newest_first<R: TraceEntry>(entries: &mut [R]) {
    entries.sort_by(|a, b| {
        b.recorded_at()
            .cmp(&a.recorded_at())
            .then_with(|| b.trace_id().cmp(a.trace_id()))
    });
}
