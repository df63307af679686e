use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};

mod memory;

pub use memory::MemoryStore;

/// Application namespace prefix inside the backing store.
pub const APP_ID: &str = "farmsync-app";

/// Root of one user's private partition.
pub fn user_root(uid: &str) -> String {
    format!("artifacts/{APP_ID}/users/{uid}")
}

/// A JSON document as stored; ids live inside the document under `id`.
pub type Document = serde_json::Map<String, Value>;

/// The nine per-user data streams the session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKey {
    Stats,
    DailySummary,
    Batches,
    Inventory,
    MedicationLogs,
    Expenses,
    Sales,
    Notifications,
    DailyRecords,
}

/// Where a stream reads from: a single record document or a whole
/// collection listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Document {
        collection: &'static str,
        doc: &'static str,
    },
    Listing {
        collection: &'static str,
    },
}

impl StreamKey {
    pub const ALL: [StreamKey; 9] = [
        StreamKey::Stats,
        StreamKey::DailySummary,
        StreamKey::Batches,
        StreamKey::Inventory,
        StreamKey::MedicationLogs,
        StreamKey::Expenses,
        StreamKey::Sales,
        StreamKey::Notifications,
        StreamKey::DailyRecords,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKey::Stats => "stats",
            StreamKey::DailySummary => "daily_summary",
            StreamKey::Batches => "batches",
            StreamKey::Inventory => "inventory",
            StreamKey::MedicationLogs => "medication_logs",
            StreamKey::Expenses => "expenses",
            StreamKey::Sales => "sales",
            StreamKey::Notifications => "notifications",
            StreamKey::DailyRecords => "daily_records",
        }
    }

    pub fn source(self) -> StreamSource {
        match self {
            StreamKey::Stats => StreamSource::Document {
                collection: collections::FARM,
                doc: docs::STATS,
            },
            StreamKey::DailySummary => StreamSource::Document {
                collection: collections::FARM,
                doc: docs::DAILY_SUMMARY,
            },
            StreamKey::Batches => StreamSource::Listing {
                collection: collections::BATCHES,
            },
            StreamKey::Inventory => StreamSource::Listing {
                collection: collections::INVENTORY,
            },
            StreamKey::MedicationLogs => StreamSource::Listing {
                collection: collections::LOGS,
            },
            StreamKey::Expenses => StreamSource::Listing {
                collection: collections::EXPENSES,
            },
            StreamKey::Sales => StreamSource::Listing {
                collection: collections::SALES,
            },
            StreamKey::Notifications => StreamSource::Listing {
                collection: collections::NOTIFICATIONS,
            },
            StreamKey::DailyRecords => StreamSource::Listing {
                collection: collections::DAILY_RECORDS,
            },
        }
    }
}

/// Collection names inside a user namespace.
pub mod collections {
    pub const FARM: &str = "farm";
    pub const BATCHES: &str = "batches";
    pub const INVENTORY: &str = "inventory";
    pub const LOGS: &str = "logs";
    pub const EXPENSES: &str = "expenses";
    pub const SALES: &str = "sales";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const DAILY_RECORDS: &str = "daily_records";
}

/// Well-known document ids inside the `farm` collection.
pub mod docs {
    pub const STATS: &str = "stats";
    pub const DAILY_SUMMARY: &str = "dailySummary";
}

/// A complete, self-consistent payload delivered by a subscription.
#[derive(Debug, Clone)]
pub enum SnapshotPayload {
    /// Current contents of a record document.
    Record(Document),
    /// Full current listing of a collection, not a delta.
    Listing(Vec<Value>),
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Snapshot(SnapshotPayload),
    /// Informational. The subscription stays open and previously delivered
    /// data remains valid.
    Error(AppError),
}

/// Cancels one subscription. Safe to invoke any number of times; dropping
/// the guard cancels as well.
pub struct SubscriptionGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        SubscriptionGuard {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One live subscription: an ordered event receiver plus its cancel guard.
pub struct SnapshotStream {
    key: StreamKey,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    guard: SubscriptionGuard,
}

impl fmt::Debug for SnapshotStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStream")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SnapshotStream {
    pub fn new(
        key: StreamKey,
        rx: mpsc::UnboundedReceiver<StreamEvent>,
        guard: SubscriptionGuard,
    ) -> Self {
        SnapshotStream { key, rx, guard }
    }

    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Next event in delivery order; `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Stop the subscription and discard anything still buffered, so no
    /// event is observable after close is requested.
    pub fn unsubscribe(&mut self) {
        self.guard.cancel();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("a document with this id already exists")]
    AlreadyExists,
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        let code = match error {
            StoreError::NotFound => "STORE/NOT_FOUND",
            StoreError::PermissionDenied => "STORE/PERMISSION_DENIED",
            StoreError::AlreadyExists => "STORE/ALREADY_EXISTS",
        };
        AppError::new(code, error.to_string())
    }
}

/// Boundary contract with the backing document store.
///
/// Writes are independent of the read-side subscriptions; the session only
/// reacts to the snapshots a write eventually produces.
#[async_trait]
pub trait FarmStore: Send + Sync {
    async fn get_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
    ) -> AppResult<Option<Document>>;

    /// Create a document under a caller-chosen id; rejects duplicates.
    async fn create_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        doc: Document,
    ) -> AppResult<()>;

    /// Create a document under a generated id and return the id.
    async fn add_doc(&self, uid: &str, collection: &str, doc: Document) -> AppResult<String>;

    /// Shallow field-wise merge; creates the document when absent.
    async fn merge_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        patch: Document,
    ) -> AppResult<()>;

    /// Numeric field-wise increments; missing fields start from zero and an
    /// absent document is created. Increments from racing writers must all
    /// be applied, never lost to a read-modify-write overwrite.
    async fn increment_fields(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        deltas: &[(&str, f64)],
    ) -> AppResult<()>;

    /// Field-wise update of an existing document; `NotFound` when absent.
    async fn update_doc(
        &self,
        uid: &str,
        collection: &str,
        doc_id: &str,
        patch: Document,
    ) -> AppResult<()>;

    async fn delete_doc(&self, uid: &str, collection: &str, doc_id: &str) -> AppResult<()>;

    /// Open one long-lived snapshot stream for `key`, scoped to `uid`'s
    /// namespace. The stream delivers the current state first, then every
    /// subsequent change, in order.
    fn subscribe(&self, uid: &str, key: StreamKey) -> AppResult<SnapshotStream>;

    /// Number of currently open subscriptions across all users.
    fn open_subscriptions(&self) -> usize;
}
