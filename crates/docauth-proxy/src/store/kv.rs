use std::marker::PhantomData;

use async_nats::jetstream::{self, kv};
use bytes::Bytes;
use docauth_types::{TraceEntry, TraceId};
use futures::TryStreamExt;

use super::{StoreError, TraceStore, newest_first};

const HISTORY: i64 = 5;

/// Trace store on a JetStream KV bucket, keyed `{subject_id}.{trace_id}`.
pub struct KvTraceStore<R> {
    store: kv::Store,
    _entry: PhantomData<fn() -> R>,
}

impl<R> Clone for KvTraceStore<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entry: PhantomData,
        }
    }
}

impl<R: TraceEntry> KvTraceStore<R> {
    pub fn new(store: kv::Store) -> Self {
        Self {
            store,
            _entry: PhantomData,
        }
    }

    /// Open the bucket, creating it on first use.
    pub async fn open(js: &jetstream::Context, bucket: &str) -> Result<Self, StoreError> {
        let config = kv::Config {
            bucket: bucket.to_string(),
            history: HISTORY,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        };
        let store = match js.create_key_value(config).await {
            Ok(store) => store,
            Err(_) => js
                .get_key_value(bucket)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        };
        Ok(Self::new(store))
    }

    fn encode(entry: &R) -> Result<Bytes, StoreError> {
        serde_json::to_vec(entry)
            .map(Bytes::from)
            .map_err(|source| StoreError::Encode {
                id: entry.trace_id().clone(),
                source,
            })
    }

    fn decode(key: &str, value: &[u8]) -> Result<R, StoreError> {
        serde_json::from_slice(value).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })
    }

    async fn keys_matching(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<String>, StoreError> {
        let keys: Vec<String> = self
            .store
            .keys()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(keys.into_iter().filter(|k| keep(k)).collect())
    }

    async fn load(&self, key: &str) -> Result<Option<R>, StoreError> {
        match self
            .store
            .get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(value) => Self::decode(key, &value).map(Some),
            None => Ok(None),
        }
    }
}

fn entry_key<R: TraceEntry>(entry: &R) -> String {
    format!("{}.{}", entry.subject_id(), entry.trace_id())
}

impl<R: TraceEntry> TraceStore<R> for KvTraceStore<R> {
    async fn create(&self, entry: &R) -> Result<(), StoreError> {
        let key = entry_key(entry);
        let value = Self::encode(entry)?;
        match self.store.create(&key, value).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(entry.trace_id().clone()))
            }
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn update(&self, entry: &R) -> Result<(), StoreError> {
        let key = entry_key(entry);
        let current = self
            .store
            .entry(&key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .filter(|e| e.operation == kv::Operation::Put)
            .ok_or_else(|| StoreError::NotFound(entry.trace_id().clone()))?;

        let value = Self::encode(entry)?;
        self.store
            .update(&key, value, current.revision)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &TraceId) -> Result<Option<R>, StoreError> {
        let suffix = format!(".{id}");
        let keys = self.keys_matching(|k| k.ends_with(&suffix)).await?;
        match keys.first() {
            Some(key) => self.load(key).await,
            None => Ok(None),
        }
    }

    async fn list_by_subject(&self, subject_id: i64) -> Result<Vec<R>, StoreError> {
        let prefix = format!("{subject_id}.");
        let keys = self.keys_matching(|k| k.starts_with(&prefix)).await?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(entry) = self.load(key).await? {
                entries.push(entry);
            }
        }
        newest_first(&mut entries);
        Ok(entries)
    }
}
