use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use docauth_types::{TraceEntry, TraceId};

use super::{StoreError, TraceStore, newest_first};

/// Process-local store. Clones share the same entries.
#[derive(Clone)]
pub struct MemoryTraceStore<R> {
    inner: Arc<RwLock<HashMap<TraceId, R>>>,
}

impl<R> Default for MemoryTraceStore<R> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<R: TraceEntry> MemoryTraceStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored entry, newest first.
    pub fn all(&self) -> Vec<R> {
        let mut entries: Vec<R> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        newest_first(&mut entries);
        entries
    }
}

impl<R: TraceEntry> TraceStore<R> for MemoryTraceStore<R> {
    async fn create(&self, entry: &R) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(entry.trace_id()) {
            return Err(StoreError::AlreadyExists(entry.trace_id().clone()));
        }
        map.insert(entry.trace_id().clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &R) -> Result<(), StoreError> {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(entry.trace_id()) {
            Some(stored) => {
                *stored = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(entry.trace_id().clone())),
        }
    }

    async fn get(&self, id: &TraceId) -> Result<Option<R>, StoreError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned())
    }

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<R>, StoreError> {
        let mut entries: Vec<R> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| entry.subject_id() == subject_id)
            .cloned()
            .collect();
        newest_first(&mut entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use docauth_types::{Attempt, TraceRecord, TraceStatus};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn trace(id: &str, subject: i64, secs: i64) -> TraceRecord {
        TraceRecord::pending(TraceId::new(id), subject, "Diploma", at(secs))
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemoryTraceStore::new();
        store.create(&trace("a", 1, 0)).await.unwrap();

        let found = store.get(&TraceId::new("a")).await.unwrap().unwrap();
        assert_eq!(found.status(), TraceStatus::Pending);
        assert_eq!(store.get(&TraceId::new("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_is_atomic_per_id() {
        let store = MemoryTraceStore::new();
        store.create(&trace("a", 1, 0)).await.unwrap();

        let err = store.create(&trace("a", 1, 5)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id.as_str() == "a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_existing_entry() {
        let store = MemoryTraceStore::new();
        let pending = trace("a", 1, 0);
        store.create(&pending).await.unwrap();

        let sent = pending
            .record_attempt(Attempt::Answered { success: true, status_code: 200 }, at(1))
            .unwrap();
        store.update(&sent).await.unwrap();

        let found = store.get(&TraceId::new("a")).await.unwrap().unwrap();
        assert_eq!(found.status(), TraceStatus::Sent);
    }

    #[tokio::test]
    async fn update_of_unknown_entry_fails() {
        let store: MemoryTraceStore<TraceRecord> = MemoryTraceStore::new();
        let err = store.update(&trace("ghost", 1, 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_by_subject_is_newest_first() {
        let store = MemoryTraceStore::new();
        store.create(&trace("old", 1, 0)).await.unwrap();
        store.create(&trace("other", 2, 5)).await.unwrap();
        store.create(&trace("new", 1, 10)).await.unwrap();

        let listed = store.list_by_subject(1).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|t| t.id().as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = MemoryTraceStore::new();
        let clone = store.clone();
        store.create(&trace("a", 1, 0)).await.unwrap();
        assert_eq!(clone.all().len(), 1);
    }
}
