use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-client document: one millisecond timestamp per admitted action, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRateRecord {
    /// Admitted action timestamps. A missing or `null` field reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub actions: Vec<i64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ClientRateRecord {
    pub fn new(actions: Vec<i64>) -> Self {
        Self { actions }
    }
}

/// A record together with the version a conditional write must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    pub record: ClientRateRecord,
    pub version: u64,
}

/// Abstract per-key document store holding [`ClientRateRecord`]s.
///
/// The limiter needs nothing more than get-by-key and a full-value set-by-key.
/// How the backend achieves durability is its own business.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the record for `key`; `None` if it was never written.
    async fn get(&self, key: &str) -> Result<Option<ClientRateRecord>, Self::Error>;

    /// Overwrite the record for `key`. No merge with concurrent writers.
    async fn set(&self, key: &str, record: &ClientRateRecord) -> Result<(), Self::Error>;
}

/// Store that can detect concurrent modification ("Compare-And-Set").
#[async_trait]
pub trait ConditionalStore: DocumentStore {
    /// Fetch the record and its current version.
    async fn get_versioned(&self, key: &str) -> Result<Option<VersionedRecord>, Self::Error>;

    /// Write `record` only if the stored version still equals `expected`
    /// (`None` = the key must not exist yet).
    ///
    /// Returns `Ok(true)` if the write happened, `Ok(false)` if a race was detected.
    async fn set_if_version(
        &self,
        key: &str,
        record: &ClientRateRecord,
        expected: Option<u64>,
    ) -> Result<bool, Self::Error>;
}

/// Operation counters of an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub conflicts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    conflicts: AtomicU64,
}

/// Simple in-memory document store. Clones share the same data.
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    // key -> (record, version)
    data: Arc<Mutex<HashMap<String, (ClientRateRecord, u64)>>>,
    counters: Arc<Counters>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without touching the counters.
    pub fn insert(&self, key: impl Into<String>, record: ClientRateRecord) {
        let mut guard = self.lock();
        let key = key.into();
        let version = guard.get(&key).map_or(1, |(_, v)| v + 1);
        guard.insert(key, (record, version));
    }

    /// Peek at a record without touching the counters.
    pub fn record(&self, key: &str) -> Option<ClientRateRecord> {
        self.lock().get(key).map(|(record, _)| record.clone())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.counters.reads.load(Ordering::SeqCst),
            writes: self.counters.writes.load(Ordering::SeqCst),
            conflicts: self.counters.conflicts.load(Ordering::SeqCst),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (ClientRateRecord, u64)>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &str) -> Result<Option<ClientRateRecord>, Self::Error> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.record(key))
    }

    async fn set(&self, key: &str, record: &ClientRateRecord) -> Result<(), Self::Error> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(key, record.clone());
        Ok(())
    }
}

#[async_trait]
impl ConditionalStore for InMemoryStore {
    async fn get_versioned(&self, key: &str) -> Result<Option<VersionedRecord>, Self::Error> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let guard = self.lock();
        Ok(guard
            .get(key)
            .map(|(record, version)| VersionedRecord { record: record.clone(), version: *version }))
    }

    async fn set_if_version(
        &self,
        key: &str,
        record: &ClientRateRecord,
        expected: Option<u64>,
    ) -> Result<bool, Self::Error> {
        let mut guard = self.lock();
        let current = guard.get(key).map(|(_, v)| *v);
        if current != expected {
            self.counters.conflicts.fetch_add(1, Ordering::SeqCst);
            return Ok(false);
        }
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        guard.insert(key.to_string(), (record.clone(), current.map_or(1, |v| v + 1)));
        Ok(true)
    }
}
