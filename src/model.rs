use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Denormalized whole-farm counters, one document per user.
///
/// Multiple write flows race to bump different fields of this record, so it
/// is only ever adjusted with field-wise increments, never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct FarmStats {
    #[serde(default, alias = "totalBirds")]
    #[ts(type = "number")]
    pub total_birds: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub sick: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub mortality: i64,
    #[serde(default, alias = "totalExpenses")]
    pub total_expenses: f64,
    #[serde(default, alias = "totalSales")]
    pub total_sales: f64,
}

/// Partial overlay of [`FarmStats`]; only fields present in the incoming
/// snapshot are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmStatsPatch {
    #[serde(default, alias = "totalBirds")]
    pub total_birds: Option<i64>,
    #[serde(default)]
    pub sick: Option<i64>,
    #[serde(default)]
    pub mortality: Option<i64>,
    #[serde(default, alias = "totalExpenses")]
    pub total_expenses: Option<f64>,
    #[serde(default, alias = "totalSales")]
    pub total_sales: Option<f64>,
}

/// Today's production totals: egg crates, feed bags, sick birds, deaths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct DailySummary {
    #[serde(default)]
    #[ts(type = "number")]
    pub eggs: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub feed: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub sick: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub mortality: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryPatch {
    #[serde(default)]
    pub eggs: Option<i64>,
    #[serde(default)]
    pub feed: Option<i64>,
    #[serde(default)]
    pub sick: Option<i64>,
    #[serde(default)]
    pub mortality: Option<i64>,
}

/// Signed adjustment applied optimistically to [`DailySummary`] while the
/// authoritative snapshot is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct DailyDelta {
    #[ts(type = "number")]
    pub eggs: i64,
    #[ts(type = "number")]
    pub feed: i64,
    #[ts(type = "number")]
    pub sick: i64,
    #[ts(type = "number")]
    pub mortality: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Active,
    Inactive,
}

/// A flock started on one date and managed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Batch {
    #[serde(default)]
    pub id: String,
    pub breed: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub quantity: i64,
    #[serde(default, alias = "startDate")]
    pub start_date: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub status: BatchStatus,
    #[serde(default)]
    #[ts(type = "number")]
    pub mortality: i64,
    #[serde(default)]
    pub health: String,
    #[serde(default, alias = "avgWeight")]
    pub avg_weight: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub progress: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct InventoryItem {
    #[serde(default)]
    pub id: String,
    pub item: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub stock: i64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub low_stock_threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct MedicationLog {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: String,
    #[serde(alias = "batchId")]
    pub batch_id: String,
    pub medication: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Expense {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: String,
    pub category: String,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Sale {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, alias = "invoiceId")]
    pub invoice_id: String,
    pub item: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub quantity: i64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub customer: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Critical,
    Warning,
    #[default]
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
}

/// One production entry as recorded from the quick-entry flow. Append-only;
/// the records inside the current day window are summed into
/// [`DailySummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ProductionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "batchId")]
    pub batch_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    #[ts(type = "number")]
    pub timestamp: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub crates: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub bags: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub sick: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub mortality: i64,
}

/// The merged aggregate state every page renders from.
///
/// Every slice is always populated: collections default to empty, records to
/// zero-valued. Consumers never observe a missing category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct FarmData {
    pub stats: FarmStats,
    pub daily_summary: DailySummary,
    pub batches: Vec<Batch>,
    pub inventory: Vec<InventoryItem>,
    pub logs: Vec<MedicationLog>,
    pub expenses: Vec<Expense>,
    pub sales: Vec<Sale>,
    pub notifications: Vec<Notification>,
}

impl FarmData {
    /// Badge count shown in the top bar.
    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Items at or below their restock threshold.
    pub fn low_stock_items(&self) -> Vec<&InventoryItem> {
        self.inventory
            .iter()
            .filter(|i| i.stock < i.low_stock_threshold)
            .collect()
    }
}
