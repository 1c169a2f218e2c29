use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{Document, DocumentStore, Fields, IndexSpec, Query, SnapshotEvent, Subscription};
use crate::error::StoreError;

// Live query registered against the store
struct Subscriber {
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

struct Inner {
    // Collections keep documents in insertion order
    collections: DashMap<String, Vec<Document>>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    indexes: Vec<IndexSpec>,
    available: AtomicBool, // is the store reachable..?
    // Serializes write + fan-out so subscribers never see an older snapshot after a newer one
    write_lock: Mutex<()>,
}

/// In-process document store.
///
/// Follows the hosted store's contract, including its composite index rule,
/// so the portal can run and be tested without a network backend.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_indexes(Vec::new())
    }

    pub fn with_indexes(indexes: Vec<IndexSpec>) -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: DashMap::new(),
                subscribers: DashMap::new(),
                next_subscriber: AtomicU64::new(0),
                indexes,
                available: AtomicBool::new(true),
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Relaxed)
    }

    // Maintenance switch: while unavailable every call fails and live queries are dropped
    pub fn set_available(&self, available: bool) {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let was = self.inner.available.swap(available, Ordering::Relaxed);
        if was && !available {
            let dropped = self.inner.subscribers.len();
            for entry in self.inner.subscribers.iter() {
                let _ = entry
                    .tx
                    .send(Err(StoreError::unavailable("memory store went offline")));
            }
            self.inner.subscribers.clear();
            tracing::debug!(dropped, "memory store offline, live queries dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory store is offline"))
        }
    }

    fn ensure_indexed(&self, query: &Query) -> Result<(), StoreError> {
        match query.required_index() {
            Some(needed) if !self.inner.indexes.contains(&needed) => {
                Err(StoreError::IndexMissing(format!("query requires index {}", needed)))
            }
            _ => Ok(()),
        }
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        match self.inner.collections.get(&query.collection) {
            Some(docs) => query.apply(docs.iter()),
            None => Vec::new(),
        }
    }

    // Push the current snapshot to every live query on `collection`
    fn notify(&self, collection: &str) {
        let mut closed = Vec::new();
        for entry in self.inner.subscribers.iter() {
            if entry.query.collection != collection {
                continue;
            }
            let snapshot = self.snapshot(&entry.query);
            if entry.tx.send(Ok(snapshot)).is_err() {
                closed.push(*entry.key());
            }
        }
        // removing while iterating would deadlock the shard
        for id in closed {
            self.inner.subscribers.remove(&id);
        }
    }

    fn write<R>(
        &self,
        collection: &str,
        mutate: impl FnOnce(&mut Vec<Document>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        self.ensure_available()?;
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = {
            let mut docs = self
                .inner
                .collections
                .entry(collection.to_string())
                .or_default();
            mutate(&mut *docs)?
        };
        self.notify(collection);
        Ok(result)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.write(collection, |docs| {
            docs.push(Document::new(id.clone(), fields));
            Ok(())
        })?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.write(collection, |docs| {
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => existing.fields = fields,
                None => docs.push(Document::new(id, fields)),
            }
            Ok(())
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned()))
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError> {
        self.write(collection, |docs| {
            let doc = docs
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            doc.fields.extend(patch);
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.write(collection, |docs| {
            docs.retain(|d| d.id != id);
            Ok(())
        })
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.ensure_available()?;
        self.ensure_indexed(query)?;
        Ok(self.snapshot(query))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.ensure_available()?;
        self.ensure_indexed(&query)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        {
            // no write may slip between the initial snapshot and registration
            let _guard = self
                .inner
                .write_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let _ = tx.send(Ok(self.snapshot(&query)));
            self.inner.subscribers.insert(id, Subscriber { query, tx });
        }
        tracing::debug!(subscriber = id, "memory store subscription opened");

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = inner.upgrade() {
                inner.subscribers.remove(&id);
            }
        }))
    }
}
