//! External collaborators: the shared board store and the clock.
//!
//! DESIGN
//! ======
//! The engine never talks to the store itself. It emits
//! `Action::Persist(batch)`; the host awaits [`commit`] and hands the result
//! back through `EngineCore::on_write_settled`. Keeping the I/O outside the
//! engine keeps the engine synchronous, single-threaded and testable with a
//! [`ManualClock`].
//!
//! [`InMemoryStore`] is a complete `BoardStore` used by tests and the replay
//! binary. It applies field maps with last-write-wins semantics, records a
//! remote change for every successful write, and can be told to fail the next
//! N writes to exercise error paths.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::doc::{ObjectId, WireObject};
use crate::error::ErrorCode;
use crate::sync::WriteBatch;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by store writes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The write targeted an object the store does not have.
    #[error("object {0} not found")]
    NotFound(ObjectId),

    /// The store refused the write (permissions, validation).
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The outgoing record could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::NotFound(_) => "E_STORE_NOT_FOUND",
            Self::Rejected(_) => "E_STORE_REJECTED",
            Self::Serialization(_) => "E_STORE_SERIALIZATION",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// One entry of the ordered remote change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// A new object, as its full persisted record.
    Added(Value),
    /// An existing object, as its full persisted record after the change.
    Modified(Value),
    Removed(ObjectId),
}

/// Shared document store. Fields are last-write-wins; `null` deletes a field.
#[async_trait::async_trait]
pub trait BoardStore: Send + Sync {
    /// Merge `fields` into one object.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the object is missing or the write fails.
    async fn update_object(&self, id: ObjectId, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Merge several objects' fields atomically: all apply or none do.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any object is missing or the write fails.
    async fn commit_batch(&self, updates: Vec<(ObjectId, Map<String, Value>)>) -> Result<(), StoreError>;

    /// Create an object from its full record.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record cannot be stored.
    async fn create_object(&self, object: WireObject) -> Result<(), StoreError>;

    /// Delete an object. Deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    async fn delete_object(&self, id: ObjectId) -> Result<(), StoreError>;
}

/// Persist one batch: a single-object batch is a plain update, anything
/// larger goes through the atomic batch call.
///
/// # Errors
///
/// Propagates the store's error unchanged.
pub async fn commit<S>(store: &S, batch: &WriteBatch) -> Result<(), StoreError>
where
    S: BoardStore + ?Sized,
{
    match batch.updates.as_slice() {
        [] => Ok(()),
        [single] => store.update_object(single.id, single.fields.to_wire_fields()).await,
        many => store.commit_batch(many.iter().map(|u| (u.id, u.fields.to_wire_fields())).collect()).await,
    }
}

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Clock advanced by hand, for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// One successful write, as recorded by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub object_ids: Vec<ObjectId>,
    /// Whether the write went through the atomic batch call.
    pub batched: bool,
}

#[derive(Default)]
struct InMemoryInner {
    objects: HashMap<ObjectId, Map<String, Value>>,
    log: Vec<CommitRecord>,
    pending: Vec<RemoteChange>,
    fail_remaining: usize,
}

impl InMemoryInner {
    fn take_failure(&mut self) -> Result<(), StoreError> {
        if self.fail_remaining == 0 {
            return Ok(());
        }
        self.fail_remaining -= 1;
        Err(StoreError::Unavailable("injected failure".into()))
    }

    fn merge(&mut self, id: ObjectId, fields: Map<String, Value>) {
        let Some(record) = self.objects.get_mut(&id) else {
            return;
        };
        for (key, value) in fields {
            if value.is_null() {
                record.remove(&key);
            } else {
                record.insert(key, value);
            }
        }
        self.pending.push(RemoteChange::Modified(Value::Object(record.clone())));
    }
}

/// `BoardStore` backed by a map behind an async mutex.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<InMemoryInner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with [`StoreError::Unavailable`].
    pub async fn fail_next(&self, n: usize) {
        self.inner.lock().await.fail_remaining = n;
    }

    /// Every stored record, ordered by id.
    pub async fn snapshot(&self) -> Vec<Value> {
        let inner = self.inner.lock().await;
        let ordered: BTreeMap<&ObjectId, &Map<String, Value>> = inner.objects.iter().collect();
        ordered.into_values().map(|m| Value::Object(m.clone())).collect()
    }

    /// Stored record for one object.
    pub async fn object(&self, id: &ObjectId) -> Option<Map<String, Value>> {
        self.inner.lock().await.objects.get(id).cloned()
    }

    /// Successful writes so far, oldest first.
    pub async fn commit_log(&self) -> Vec<CommitRecord> {
        self.inner.lock().await.log.clone()
    }

    /// Remote changes produced since the last drain, in write order.
    pub async fn drain_changes(&self) -> Vec<RemoteChange> {
        std::mem::take(&mut self.inner.lock().await.pending)
    }
}

#[async_trait::async_trait]
impl BoardStore for InMemoryStore {
    async fn update_object(&self, id: ObjectId, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        if !inner.objects.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        inner.merge(id, fields);
        inner.log.push(CommitRecord { object_ids: vec![id], batched: false });
        Ok(())
    }

    async fn commit_batch(&self, updates: Vec<(ObjectId, Map<String, Value>)>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        if let Some((missing, _)) = updates.iter().find(|(id, _)| !inner.objects.contains_key(id)) {
            warn!(id = %missing, objects = updates.len(), "batch rejected: object missing");
            return Err(StoreError::NotFound(*missing));
        }
        let object_ids: Vec<ObjectId> = updates.iter().map(|(id, _)| *id).collect();
        for (id, fields) in updates {
            inner.merge(id, fields);
        }
        debug!(objects = object_ids.len(), "batch committed");
        inner.log.push(CommitRecord { object_ids, batched: true });
        Ok(())
    }

    async fn create_object(&self, object: WireObject) -> Result<(), StoreError> {
        let id = object.id.ok_or_else(|| StoreError::Rejected("record has no id".into()))?;
        let value = serde_json::to_value(&object)?;
        let Value::Object(record) = value else {
            return Err(StoreError::Rejected("record is not an object".into()));
        };
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        inner.objects.insert(id, record.clone());
        inner.pending.push(RemoteChange::Added(Value::Object(record)));
        inner.log.push(CommitRecord { object_ids: vec![id], batched: false });
        Ok(())
    }

    async fn delete_object(&self, id: ObjectId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;
        if inner.objects.remove(&id).is_some() {
            inner.pending.push(RemoteChange::Removed(id));
        }
        inner.log.push(CommitRecord { object_ids: vec![id], batched: false });
        Ok(())
    }
}
