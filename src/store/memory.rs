use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Number, Value};
use tokio::sync::mpsc;

use crate::error::AppResult;
use crate::id::new_uuid_v7;

use super::{
    Document, FarmStore, SnapshotPayload, SnapshotStream, StoreError, StreamEvent, StreamKey,
    StreamSource, SubscriptionGuard,
};

#[derive(Default)]
struct Inner {
    namespaces: HashMap<String, Namespace>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber_id: u64,
    denied: HashSet<(String, StreamKey)>,
}

#[derive(Default)]
struct Namespace {
    collections: HashMap<String, BTreeMap<String, Document>>,
}

struct Subscriber {
    uid: String,
    key: StreamKey,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

/// In-process document store with ordered snapshot-stream delivery.
///
/// Backs the demo binary and the test suite; a cloud-backed client would
/// satisfy the same [`FarmStore`] contract. Mutation and notification run
/// under one lock, so every subscriber observes a collection's listings in
/// mutation order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make future `subscribe` calls for this stream fail with
    /// `PermissionDenied`. Demo/test hook for the degraded-stream path.
    pub fn deny_stream(&self, uid: &str, key: StreamKey) {
        self.lock().denied.insert((uid.to_string(), key));
    }

    /// Push an informational error to every open subscription of this
    /// stream, as a backend would on a failed delivery.
    pub fn emit_stream_error(&self, uid: &str, key: StreamKey, message: &str) {
        let inner = self.lock();
        for sub in inner.subscribers.values() {
            if sub.uid == uid && sub.key == key {
                let error = crate::error::AppError::new("STORE/DELIVERY", message)
                    .with_context("stream", key.as_str());
                let _ = sub.tx.send(StreamEvent::Error(error));
            }
        }
    }
}

fn listing_of(inner: &Inner, uid: &str, collection: &str) -> Vec<Value> {
    inner
        .namespaces
        .get(uid)
        .and_then(|ns| ns.collections.get(collection))
        .map(|docs| docs.values().cloned().map(Value::Object).collect())
        .unwrap_or_default()
}

fn doc_of(inner: &Inner, uid: &str, collection: &str, doc_id: &str) -> Option<Document> {
    inner
        .namespaces
        .get(uid)
        .and_then(|ns| ns.collections.get(collection))
        .and_then(|docs| docs.get(doc_id))
        .cloned()
}

fn collection_mut<'a>(
    inner: &'a mut Inner,
    uid: &str,
    collection: &str,
) -> &'a mut BTreeMap<String, Document> {
    inner
        .namespaces
        .entry(uid.to_string())
        .or_default()
        .collections
        .entry(collection.to_string())
        .or_default()
}

/// Notify every matching subscriber about a change to one document.
/// Listing streams get the full current listing; record streams get the
/// document contents, and nothing at all while the document is absent.
fn notify(inner: &mut Inner, uid: &str, collection: &str, changed_doc: &str) {
    let listing = listing_of(inner, uid, collection);
    let record = doc_of(inner, uid, collection, changed_doc);

    let mut disconnected = Vec::new();
    for (&id, sub) in &inner.subscribers {
        if sub.uid != uid {
            continue;
        }
        let event = match sub.key.source() {
            StreamSource::Listing { collection: c } if c == collection => Some(
                StreamEvent::Snapshot(SnapshotPayload::Listing(listing.clone())),
            ),
            StreamSource::Document { collection: c, doc } if c == collection && doc == changed_doc => {
                record
                    .clone()
                    .map(|doc| StreamEvent::Snapshot(SnapshotPayload::Record(doc)))
            }
            _ => None,
        };
        if let Some(event) = event {
            if sub.tx.send(event).is_err() {
                disconnected.push(id);
            }
        }
    }
    for id in disconnected {
        inner.subscribers.remove(&id);
    }
}

fn field_as_f64(doc: &Document, field: &str) -> f64 {
    doc.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Keep counters integral in the stored JSON when they are whole numbers,
/// so typed decoding on the read side sees `15`, not `15.0`.
fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl FarmStore for MemoryStore {
    async fn get_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
    ) -> AppResult<Option<Document>> {
        Ok(doc_of(&self.lock(), uid, collection, doc_id))
    }

    async fn create_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        mut doc: Document,
    ) -> AppResult<()> {
        let mut inner = self.lock();
        let docs = collection_mut(&mut inner, uid, collection);
        if docs.contains_key(doc_id) {
            return Err(StoreError::AlreadyExists.into());
        }
        doc.insert("id".into(), Value::String(doc_id.to_string()));
        docs.insert(doc_id.to_string(), doc);
        notify(&mut inner, uid, collection, doc_id);
        Ok(())
    }

    async fn add_doc(&self, uid: &str, collection: &str, mut doc: Document) -> AppResult<String> {
        let doc_id = new_uuid_v7();
        let mut inner = self.lock();
        doc.insert("id".into(), Value::String(doc_id.clone()));
        collection_mut(&mut inner, uid, collection).insert(doc_id.clone(), doc);
        notify(&mut inner, uid, collection, &doc_id);
        Ok(doc_id)
    }

    async fn merge_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        patch: Document,
    ) -> AppResult<()> {
        let mut inner = self.lock();
        let docs = collection_mut(&mut inner, uid, collection);
        let doc = docs.entry(doc_id.to_string()).or_default();
        for (field, value) in patch {
            doc.insert(field, value);
        }
        notify(&mut inner, uid, collection, doc_id);
        Ok(())
    }

    async fn increment_fields(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        deltas: &[(&str, f64)],
    ) -> AppResult<()> {
        let mut inner = self.lock();
        let docs = collection_mut(&mut inner, uid, collection);
        let doc = docs.entry(doc_id.to_string()).or_default();
        for (field, delta) in deltas {
            let next = field_as_f64(doc, field) + delta;
            doc.insert((*field).to_string(), json_number(next));
        }
        notify(&mut inner, uid, collection, doc_id);
        Ok(())
    }

    async fn update_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        patch: Document,
    ) -> AppResult<()> {
        let mut inner = self.lock();
        let docs = collection_mut(&mut inner, uid, collection);
        let doc = docs.get_mut(doc_id).ok_or(StoreError::NotFound)?;
        for (field, value) in patch {
            doc.insert(field, value);
        }
        notify(&mut inner, uid, collection, doc_id);
        Ok(())
    }

    async fn delete_doc(&self, uid: &str, collection: &str, doc_id: &str) -> AppResult<()> {
        let mut inner = self.lock();
        let docs = collection_mut(&mut inner, uid, collection);
        if docs.remove(doc_id).is_none() {
            return Err(StoreError::NotFound.into());
        }
        notify(&mut inner, uid, collection, doc_id);
        Ok(())
    }

    fn subscribe(&self, uid: &str, key: StreamKey) -> AppResult<SnapshotStream> {
        let mut inner = self.lock();
        if inner.denied.contains(&(uid.to_string(), key)) {
            return Err(crate::error::AppError::from(StoreError::PermissionDenied)
                .with_context("stream", key.as_str()));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        // Deliver the current state first: listings always (possibly
        // empty), record documents only once they exist.
        let initial = match key.source() {
            StreamSource::Listing { collection } => Some(SnapshotPayload::Listing(listing_of(
                &inner, uid, collection,
            ))),
            StreamSource::Document { collection, doc } => {
                doc_of(&inner, uid, collection, doc).map(SnapshotPayload::Record)
            }
        };
        if let Some(payload) = initial {
            let _ = tx.send(StreamEvent::Snapshot(payload));
        }

        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                uid: uid.to_string(),
                key,
                tx,
            },
        );

        let registry = Arc::clone(&self.inner);
        let guard = SubscriptionGuard::new(move || {
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .subscribers
                .remove(&id);
        });
        Ok(SnapshotStream::new(key, rx, guard))
    }

    fn open_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }
}
