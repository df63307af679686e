use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::AuthState;
use crate::model::{
    Batch, DailyDelta, DailySummaryPatch, Expense, FarmData, FarmStatsPatch, InventoryItem,
    MedicationLog, Notification, ProductionRecord, Sale,
};
use crate::store::{
    Document, FarmStore, SnapshotPayload, SnapshotStream, StreamEvent, StreamKey,
};
use crate::time::DayWindow;

use super::merge;

/// A typed, boundary-validated update produced from one stream's snapshot.
#[derive(Debug)]
enum StreamUpdate {
    Stats(FarmStatsPatch),
    DailySummary(DailySummaryPatch),
    Batches(Vec<Batch>),
    Inventory(Vec<InventoryItem>),
    MedicationLogs(Vec<MedicationLog>),
    Expenses(Vec<Expense>),
    Sales(Vec<Sale>),
    Notifications(Vec<Notification>),
    DailyRecords(Vec<ProductionRecord>),
}

enum SessionCommand {
    OptimisticDailyDelta(DailyDelta),
    Shutdown,
}

/// Owner handle for a running session. The merged aggregate state is read
/// through [`SessionHandle::data`]; the session task is the only writer.
pub struct SessionHandle {
    data_rx: watch::Receiver<FarmData>,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Read-only view of the merged aggregate state. Every slice is always
    /// populated; absent data reads as the zero-valued default.
    pub fn data(&self) -> watch::Receiver<FarmData> {
        self.data_rx.clone()
    }

    /// Clone of the current aggregate state.
    pub fn snapshot(&self) -> FarmData {
        self.data_rx.borrow().clone()
    }

    /// Bump today's summary locally before the authoritative snapshot
    /// confirms a just-submitted production record. The next snapshot for
    /// the category overwrites the bump.
    pub fn apply_optimistic_daily_delta(&self, delta: DailyDelta) {
        let _ = self
            .cmd_tx
            .send(SessionCommand::OptimisticDailyDelta(delta));
    }

    /// Close every open subscription and stop the session task.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
        let _ = self.task.await;
    }
}

/// Spawn the session task: it follows identity transitions from `auth_rx`,
/// keeps exactly one subscription per stream open for the signed-in user,
/// and folds every delivered snapshot into the shared aggregate state.
pub fn spawn_session(
    store: Arc<dyn FarmStore>,
    auth_rx: watch::Receiver<AuthState>,
) -> SessionHandle {
    let (data_tx, data_rx) = watch::channel(FarmData::default());
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    let runner = SessionRunner {
        store,
        data_tx,
        update_tx,
        forwarders: Vec::new(),
        epoch: 0,
        records_authoritative: false,
    };
    let task = tokio::spawn(runner.run(auth_rx, cmd_rx, update_rx));

    SessionHandle {
        data_rx,
        cmd_tx,
        task,
    }
}

struct SessionRunner {
    store: Arc<dyn FarmStore>,
    data_tx: watch::Sender<FarmData>,
    update_tx: mpsc::UnboundedSender<(u64, StreamUpdate)>,
    forwarders: Vec<JoinHandle<()>>,
    /// Bumped on every identity transition; updates carrying an older epoch
    /// belong to a closed identity and are discarded.
    epoch: u64,
    /// Set once the windowed records stream has delivered for this epoch.
    /// From then on the recompute owns the Daily Summary numerals and the
    /// incremented summary document is ignored as a legacy input; until
    /// then (e.g. when that stream failed to open) the document still
    /// drives the slice.
    records_authoritative: bool,
}

impl SessionRunner {
    async fn run(
        mut self,
        mut auth_rx: watch::Receiver<AuthState>,
        mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut update_rx: mpsc::UnboundedReceiver<(u64, StreamUpdate)>,
    ) {
        // The gate may have transitioned before the session spawned.
        let initial = auth_rx.borrow_and_update().clone();
        if initial.is_known() {
            self.transition(initial).await;
        }

        loop {
            tokio::select! {
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        // Identity gate dropped; nothing can transition us
                        // back in, so tear everything down.
                        self.close_streams().await;
                        break;
                    }
                    let state = auth_rx.borrow_and_update().clone();
                    self.transition(state).await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::OptimisticDailyDelta(delta)) => {
                            debug!(target: "farmsync", event = "optimistic_daily_delta");
                            self.data_tx.send_modify(|data| merge::apply_daily_delta(data, delta));
                        }
                        Some(SessionCommand::Shutdown) | None => {
                            self.close_streams().await;
                            break;
                        }
                    }
                }
                update = update_rx.recv() => {
                    // The runner holds a sender clone, so this never closes.
                    if let Some((epoch, update)) = update {
                        if epoch != self.epoch {
                            debug!(target: "farmsync", event = "stale_update_discarded", epoch);
                            continue;
                        }
                        self.apply(update);
                    }
                }
            }
        }
    }

    /// Identity changed: close everything owned by the previous identity,
    /// reset the aggregate to its default shape, then open streams for the
    /// new identity if there is one.
    async fn transition(&mut self, state: AuthState) {
        self.close_streams().await;
        self.epoch += 1;
        self.records_authoritative = false;
        self.data_tx.send_replace(FarmData::default());

        match state {
            AuthState::SignedIn(uid) => self.open_streams(&uid),
            AuthState::SignedOut | AuthState::Unknown => {
                info!(target: "farmsync", event = "session_reset");
            }
        }
    }

    fn open_streams(&mut self, uid: &str) {
        let mut degraded = 0usize;
        for key in StreamKey::ALL {
            match self.store.subscribe(uid, key) {
                Ok(stream) => {
                    let tx = self.update_tx.clone();
                    let epoch = self.epoch;
                    self.forwarders.push(tokio::spawn(forward_stream(stream, epoch, tx)));
                }
                Err(err) => {
                    // The slice stays at its default value; the rest of the
                    // streams still open.
                    degraded += 1;
                    err.log_warn("stream_subscribe_failed");
                }
            }
        }
        info!(
            target: "farmsync",
            event = "streams_opened",
            uid = %uid,
            open = self.forwarders.len(),
            degraded,
        );
    }

    /// Unconditionally cancel every forwarder and wait for the streams to
    /// drop, so no subscription outlives its identity.
    async fn close_streams(&mut self) {
        if self.forwarders.is_empty() {
            return;
        }
        for handle in &self.forwarders {
            handle.abort();
        }
        join_all(self.forwarders.drain(..)).await;
        debug!(target: "farmsync", event = "streams_closed");
    }

    fn apply(&mut self, update: StreamUpdate) {
        match &update {
            StreamUpdate::DailyRecords(_) => self.records_authoritative = true,
            StreamUpdate::DailySummary(_) if self.records_authoritative => {
                debug!(target: "farmsync", event = "legacy_summary_patch_ignored");
                return;
            }
            _ => {}
        }
        self.data_tx.send_modify(|data| match update {
            StreamUpdate::Stats(patch) => merge::apply_stats(data, patch),
            StreamUpdate::DailySummary(patch) => merge::apply_daily_summary(data, patch),
            StreamUpdate::Batches(rows) => merge::apply_batches(data, rows),
            StreamUpdate::Inventory(rows) => merge::apply_inventory(data, rows),
            StreamUpdate::MedicationLogs(rows) => merge::apply_logs(data, rows),
            StreamUpdate::Expenses(rows) => merge::apply_expenses(data, rows),
            StreamUpdate::Sales(rows) => merge::apply_sales(data, rows),
            StreamUpdate::Notifications(rows) => merge::apply_notifications(data, rows),
            StreamUpdate::DailyRecords(rows) => {
                merge::apply_production_records(data, &rows, DayWindow::today_local())
            }
        });
    }
}

/// Pump one stream: decode each snapshot at the boundary and forward the
/// typed update, tagged with the epoch it was opened under. Delivery errors
/// are informational; previously merged data stays in place.
async fn forward_stream(
    mut stream: SnapshotStream,
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, StreamUpdate)>,
) {
    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Snapshot(payload) => {
                if let Some(update) = decode_update(stream.key(), payload) {
                    if tx.send((epoch, update)).is_err() {
                        break;
                    }
                }
            }
            StreamEvent::Error(err) => {
                err.log_warn("stream_delivery_error");
            }
        }
    }
}

fn decode_update(key: StreamKey, payload: SnapshotPayload) -> Option<StreamUpdate> {
    match (key, payload) {
        (StreamKey::Stats, SnapshotPayload::Record(doc)) => {
            decode_record(key, doc).map(StreamUpdate::Stats)
        }
        (StreamKey::DailySummary, SnapshotPayload::Record(doc)) => {
            decode_record(key, doc).map(StreamUpdate::DailySummary)
        }
        (StreamKey::Batches, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::Batches(decode_listing(key, rows)))
        }
        (StreamKey::Inventory, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::Inventory(decode_listing(key, rows)))
        }
        (StreamKey::MedicationLogs, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::MedicationLogs(decode_listing(key, rows)))
        }
        (StreamKey::Expenses, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::Expenses(decode_listing(key, rows)))
        }
        (StreamKey::Sales, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::Sales(decode_listing(key, rows)))
        }
        (StreamKey::Notifications, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::Notifications(decode_listing(key, rows)))
        }
        (StreamKey::DailyRecords, SnapshotPayload::Listing(rows)) => {
            Some(StreamUpdate::DailyRecords(decode_listing(key, rows)))
        }
        (key, _) => {
            warn!(
                target: "farmsync",
                event = "snapshot_shape_mismatch",
                stream = key.as_str(),
            );
            None
        }
    }
}

fn decode_record<T: DeserializeOwned>(key: StreamKey, doc: Document) -> Option<T> {
    match serde_json::from_value(Value::Object(doc)) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                target: "farmsync",
                event = "snapshot_decode_failed",
                stream = key.as_str(),
                error = %err,
            );
            None
        }
    }
}

fn decode_listing<T: DeserializeOwned>(key: StreamKey, rows: Vec<Value>) -> Vec<T> {
    let total = rows.len();
    let mut decoded = Vec::with_capacity(total);
    for row in rows {
        match serde_json::from_value(row) {
            Ok(value) => decoded.push(value),
            Err(err) => {
                debug!(
                    target: "farmsync",
                    event = "listing_element_skipped",
                    stream = key.as_str(),
                    error = %err,
                );
            }
        }
    }
    if decoded.len() < total {
        warn!(
            target: "farmsync",
            event = "listing_partially_decoded",
            stream = key.as_str(),
            decoded = decoded.len(),
            total,
        );
    }
    decoded
}
