//! Write flows issued by the dashboard pages.
//!
//! Every flow is fire-and-forget from the view model's perspective: it
//! writes documents and bumps the denormalized counters, and the session
//! observes the result only when the corresponding snapshot stream fires
//! again. Failures surface to the caller and never touch session state.

use chrono::{Local, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::id::new_invoice_id;
use crate::model::DailyDelta;
use crate::store::{collections, docs, Document, FarmStore};
use crate::time::{format_entry_date, now_ms};

pub const VALIDATION_BATCH_REQUIRED: &str = "VALIDATION/BATCH_REQUIRED";
pub const VALIDATION_BREED_REQUIRED: &str = "VALIDATION/BREED_REQUIRED";
pub const VALIDATION_ITEM_REQUIRED: &str = "VALIDATION/ITEM_REQUIRED";
pub const VALIDATION_CATEGORY_REQUIRED: &str = "VALIDATION/CATEGORY_REQUIRED";
pub const VALIDATION_MEDICATION_REQUIRED: &str = "VALIDATION/MEDICATION_REQUIRED";
pub const VALIDATION_AMOUNT_POSITIVE: &str = "VALIDATION/AMOUNT_POSITIVE";
pub const VALIDATION_QUANTITY_POSITIVE: &str = "VALIDATION/QUANTITY_POSITIVE";
pub const VALIDATION_COUNT_NEGATIVE: &str = "VALIDATION/COUNT_NEGATIVE";

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn require(value: &str, code: &str, message: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::new(code, message));
    }
    Ok(())
}

/// One quick-entry form submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductionEntry {
    #[serde(alias = "batchId")]
    pub batch_id: String,
    #[serde(default)]
    pub eggs: i64,
    #[serde(default)]
    pub feed: i64,
    #[serde(default)]
    pub sick: i64,
    #[serde(default)]
    pub mortality: i64,
}

impl From<&ProductionEntry> for DailyDelta {
    fn from(entry: &ProductionEntry) -> Self {
        DailyDelta {
            eggs: entry.eggs,
            feed: entry.feed,
            sick: entry.sick,
            mortality: entry.mortality,
        }
    }
}

/// Append a production record and bump the two denormalized aggregates.
/// Returns the new record id.
pub async fn record_production(
    store: &dyn FarmStore,
    uid: &str,
    entry: &ProductionEntry,
) -> AppResult<String> {
    require(
        &entry.batch_id,
        VALIDATION_BATCH_REQUIRED,
        "Please select a batch first.",
    )?;
    if entry.eggs < 0 || entry.feed < 0 || entry.sick < 0 || entry.mortality < 0 {
        return Err(AppError::new(
            VALIDATION_COUNT_NEGATIVE,
            "Counts cannot be negative.",
        ));
    }

    let timestamp = now_ms();
    let record = object(json!({
        "batch_id": entry.batch_id,
        "date": Utc::now().to_rfc3339(),
        "crates": entry.eggs,
        "bags": entry.feed,
        "sick": entry.sick,
        "mortality": entry.mortality,
        "timestamp": timestamp,
    }));
    let record_id = store
        .add_doc(uid, collections::DAILY_RECORDS, record)
        .await
        .map_err(|err| err.with_context("operation", "record_production"))?;

    store
        .increment_fields(
            uid,
            collections::FARM,
            docs::DAILY_SUMMARY,
            &[
                ("eggs", entry.eggs as f64),
                ("feed", entry.feed as f64),
                ("sick", entry.sick as f64),
                ("mortality", entry.mortality as f64),
            ],
        )
        .await?;
    store
        .increment_fields(
            uid,
            collections::FARM,
            docs::STATS,
            &[
                ("sick", entry.sick as f64),
                ("mortality", entry.mortality as f64),
            ],
        )
        .await?;

    info!(
        target: "farmsync",
        event = "production_recorded",
        batch_id = %entry.batch_id,
        record_id = %record_id,
    );
    Ok(record_id)
}

/// Create the zeroed daily-summary document if it does not exist yet, so
/// the record stream has something to deliver on first subscribe.
pub async fn ensure_daily_summary(store: &dyn FarmStore, uid: &str) -> AppResult<()> {
    if store
        .get_doc(uid, collections::FARM, docs::DAILY_SUMMARY)
        .await?
        .is_none()
    {
        store
            .merge_doc(
                uid,
                collections::FARM,
                docs::DAILY_SUMMARY,
                object(json!({ "eggs": 0, "feed": 0, "sick": 0, "mortality": 0 })),
            )
            .await?;
        info!(target: "farmsync", event = "daily_summary_created");
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBatch {
    pub id: String,
    pub breed: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default, alias = "startDate")]
    pub start_date: String,
}

/// Register a new flock under a caller-chosen id and add its headcount to
/// the whole-farm counters.
pub async fn create_batch(store: &dyn FarmStore, uid: &str, input: &NewBatch) -> AppResult<()> {
    require(
        &input.id,
        VALIDATION_BATCH_REQUIRED,
        "Please fill out Batch ID and Breed.",
    )?;
    require(
        &input.breed,
        VALIDATION_BREED_REQUIRED,
        "Please fill out Batch ID and Breed.",
    )?;
    if input.quantity <= 0 {
        return Err(AppError::new(
            VALIDATION_QUANTITY_POSITIVE,
            "Batch quantity must be positive.",
        ));
    }

    let start_date = if input.start_date.trim().is_empty() {
        Local::now().date_naive().to_string()
    } else {
        input.start_date.clone()
    };

    let doc = object(json!({
        "breed": input.breed,
        "quantity": input.quantity,
        "start_date": start_date,
        "age": "1 day",
        "status": "active",
        "mortality": 0,
        "health": "Excellent",
        "avg_weight": "0.1",
        "progress": 1,
    }));
    store
        .create_doc(uid, collections::BATCHES, &input.id, doc)
        .await
        .map_err(|err| {
            err.with_context("operation", "create_batch")
                .with_context("batch_id", input.id.clone())
        })?;

    store
        .increment_fields(
            uid,
            collections::FARM,
            docs::STATS,
            &[("total_birds", input.quantity as f64)],
        )
        .await?;

    info!(target: "farmsync", event = "batch_created", batch_id = %input.id);
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInventoryItem {
    pub item: String,
    pub category: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub low_stock_threshold: i64,
}

pub async fn add_inventory_item(
    store: &dyn FarmStore,
    uid: &str,
    input: &NewInventoryItem,
) -> AppResult<String> {
    require(
        &input.item,
        VALIDATION_ITEM_REQUIRED,
        "Please fill out Item and Category.",
    )?;
    require(
        &input.category,
        VALIDATION_CATEGORY_REQUIRED,
        "Please fill out Item and Category.",
    )?;

    let doc = object(json!({
        "item": input.item,
        "category": input.category,
        "stock": input.stock,
        "unit": input.unit,
        "low_stock_threshold": input.low_stock_threshold,
    }));
    let id = store.add_doc(uid, collections::INVENTORY, doc).await?;
    info!(target: "farmsync", event = "inventory_item_added", item = %input.item);
    Ok(id)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMedicationLog {
    pub date: NaiveDate,
    #[serde(alias = "batchId")]
    pub batch_id: String,
    pub medication: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn add_medication_log(
    store: &dyn FarmStore,
    uid: &str,
    input: &NewMedicationLog,
) -> AppResult<String> {
    require(
        &input.batch_id,
        VALIDATION_BATCH_REQUIRED,
        "Please fill out Batch ID and Medication.",
    )?;
    require(
        &input.medication,
        VALIDATION_MEDICATION_REQUIRED,
        "Please fill out Batch ID and Medication.",
    )?;

    let doc = object(json!({
        "date": format_entry_date(input.date),
        "batch_id": input.batch_id,
        "medication": input.medication,
        "dosage": input.dosage,
        "reason": input.reason,
    }));
    let id = store.add_doc(uid, collections::LOGS, doc).await?;
    info!(
        target: "farmsync",
        event = "medication_logged",
        batch_id = %input.batch_id,
    );
    Ok(id)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    pub date: NaiveDate,
    pub category: String,
    pub amount: f64,
}

/// Append an expense entry and bump the cumulative expense counter.
pub async fn add_expense(store: &dyn FarmStore, uid: &str, input: &NewExpense) -> AppResult<String> {
    require(
        &input.category,
        VALIDATION_CATEGORY_REQUIRED,
        "Please enter a valid category and amount.",
    )?;
    if input.amount <= 0.0 {
        return Err(AppError::new(
            VALIDATION_AMOUNT_POSITIVE,
            "Please enter a valid category and amount.",
        ));
    }

    let doc = object(json!({
        "date": format_entry_date(input.date),
        "category": input.category,
        "amount": input.amount,
    }));
    let id = store.add_doc(uid, collections::EXPENSES, doc).await?;
    store
        .increment_fields(
            uid,
            collections::FARM,
            docs::STATS,
            &[("total_expenses", input.amount)],
        )
        .await?;
    info!(target: "farmsync", event = "expense_added", category = %input.category);
    Ok(id)
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSale {
    pub date: NaiveDate,
    #[serde(default, alias = "invoiceId")]
    pub invoice_id: String,
    pub item: String,
    #[serde(default)]
    pub quantity: i64,
    pub amount: f64,
    #[serde(default)]
    pub customer: String,
}

/// Append a sale entry and bump the cumulative sales counter.
pub async fn add_sale(store: &dyn FarmStore, uid: &str, input: &NewSale) -> AppResult<String> {
    require(
        &input.item,
        VALIDATION_ITEM_REQUIRED,
        "Please enter a valid item and amount.",
    )?;
    if input.amount <= 0.0 {
        return Err(AppError::new(
            VALIDATION_AMOUNT_POSITIVE,
            "Please enter a valid item and amount.",
        ));
    }

    let invoice_id = if input.invoice_id.trim().is_empty() {
        new_invoice_id()
    } else {
        input.invoice_id.clone()
    };
    let doc = object(json!({
        "date": format_entry_date(input.date),
        "invoice_id": invoice_id,
        "item": input.item,
        "quantity": input.quantity,
        "amount": input.amount,
        "customer": input.customer,
    }));
    let id = store.add_doc(uid, collections::SALES, doc).await?;
    store
        .increment_fields(
            uid,
            collections::FARM,
            docs::STATS,
            &[("total_sales", input.amount)],
        )
        .await?;
    info!(target: "farmsync", event = "sale_added", item = %input.item);
    Ok(id)
}

pub async fn mark_notification_read(
    store: &dyn FarmStore,
    uid: &str,
    notification_id: &str,
) -> AppResult<()> {
    store
        .update_doc(
            uid,
            collections::NOTIFICATIONS,
            notification_id,
            object(json!({ "read": true })),
        )
        .await
        .map_err(|err| err.with_context("notification_id", notification_id.to_string()))
}

/// Flip the read flag on each of the given notifications; the caller passes
/// the unread ids it currently sees in the aggregate state.
pub async fn mark_all_notifications_read(
    store: &dyn FarmStore,
    uid: &str,
    notification_ids: &[String],
) -> AppResult<()> {
    for id in notification_ids {
        mark_notification_read(store, uid, id).await?;
    }
    Ok(())
}

pub async fn delete_notification(
    store: &dyn FarmStore,
    uid: &str,
    notification_id: &str,
) -> AppResult<()> {
    store
        .delete_doc(uid, collections::NOTIFICATIONS, notification_id)
        .await
        .map_err(|err| err.with_context("notification_id", notification_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const UID: &str = "u1";

    fn entry(batch_id: &str) -> ProductionEntry {
        ProductionEntry {
            batch_id: batch_id.into(),
            eggs: 10,
            feed: 2,
            sick: 1,
            mortality: 0,
        }
    }

    #[tokio::test]
    async fn production_entry_writes_record_and_aggregates() {
        let store = MemoryStore::new();
        record_production(&store, UID, &entry("B-001")).await.unwrap();

        let summary = store
            .get_doc(UID, collections::FARM, docs::DAILY_SUMMARY)
            .await
            .unwrap()
            .expect("summary doc");
        assert_eq!(summary["eggs"], 10);
        assert_eq!(summary["feed"], 2);

        let stats = store
            .get_doc(UID, collections::FARM, docs::STATS)
            .await
            .unwrap()
            .expect("stats doc");
        assert_eq!(stats["sick"], 1);
        assert_eq!(stats["mortality"], 0);
    }

    #[tokio::test]
    async fn production_entry_requires_a_batch() {
        let store = MemoryStore::new();
        let err = record_production(&store, UID, &entry(""))
            .await
            .expect_err("missing batch");
        assert_eq!(err.code(), VALIDATION_BATCH_REQUIRED);
    }

    #[tokio::test]
    async fn ensure_daily_summary_is_idempotent() {
        let store = MemoryStore::new();
        ensure_daily_summary(&store, UID).await.unwrap();
        store
            .increment_fields(UID, collections::FARM, docs::DAILY_SUMMARY, &[("eggs", 4.0)])
            .await
            .unwrap();
        ensure_daily_summary(&store, UID).await.unwrap();

        let summary = store
            .get_doc(UID, collections::FARM, docs::DAILY_SUMMARY)
            .await
            .unwrap()
            .expect("summary doc");
        assert_eq!(summary["eggs"], 4);
    }

    #[tokio::test]
    async fn batch_creation_seeds_defaults_and_counts_birds() {
        let store = MemoryStore::new();
        let input = NewBatch {
            id: "B-001".into(),
            breed: "Isa Brown".into(),
            quantity: 200,
            start_date: "2026-08-01".into(),
        };
        create_batch(&store, UID, &input).await.unwrap();

        let batch = store
            .get_doc(UID, collections::BATCHES, "B-001")
            .await
            .unwrap()
            .expect("batch doc");
        assert_eq!(batch["status"], "active");
        assert_eq!(batch["health"], "Excellent");
        assert_eq!(batch["progress"], 1);

        let stats = store
            .get_doc(UID, collections::FARM, docs::STATS)
            .await
            .unwrap()
            .expect("stats doc");
        assert_eq!(stats["total_birds"], 200);

        let err = create_batch(&store, UID, &input).await.expect_err("dup id");
        assert_eq!(err.code(), "STORE/ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn expense_and_sale_bump_their_counters() {
        let store = MemoryStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();

        add_expense(
            &store,
            UID,
            &NewExpense {
                date,
                category: "Feed".into(),
                amount: 1500.0,
            },
        )
        .await
        .unwrap();
        add_sale(
            &store,
            UID,
            &NewSale {
                date,
                invoice_id: String::new(),
                item: "Egg Crates".into(),
                quantity: 10,
                amount: 4000.0,
                customer: "Mrs. Adeyemi".into(),
            },
        )
        .await
        .unwrap();

        let stats = store
            .get_doc(UID, collections::FARM, docs::STATS)
            .await
            .unwrap()
            .expect("stats doc");
        assert_eq!(stats["total_expenses"], 1500);
        assert_eq!(stats["total_sales"], 4000);
    }

    #[tokio::test]
    async fn sale_entries_get_a_generated_invoice_when_blank() {
        let store = MemoryStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let id = add_sale(
            &store,
            UID,
            &NewSale {
                date,
                invoice_id: String::new(),
                item: "Broilers".into(),
                quantity: 5,
                amount: 2500.0,
                customer: String::new(),
            },
        )
        .await
        .unwrap();

        let sale = store
            .get_doc(UID, collections::SALES, &id)
            .await
            .unwrap()
            .expect("sale doc");
        let invoice = sale["invoice_id"].as_str().unwrap();
        assert!(invoice.starts_with("INV-"));
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let store = MemoryStore::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let err = add_expense(
            &store,
            UID,
            &NewExpense {
                date,
                category: "Feed".into(),
                amount: 0.0,
            },
        )
        .await
        .expect_err("zero amount");
        assert_eq!(err.code(), VALIDATION_AMOUNT_POSITIVE);
    }

    #[tokio::test]
    async fn notification_read_and_delete_flows() {
        let store = MemoryStore::new();
        let id = store
            .add_doc(
                UID,
                collections::NOTIFICATIONS,
                object(json!({
                    "type": "warning",
                    "title": "Low stock",
                    "message": "Layer Mash below threshold",
                    "timestamp": 1,
                    "read": false,
                })),
            )
            .await
            .unwrap();

        mark_notification_read(&store, UID, &id).await.unwrap();
        let doc = store
            .get_doc(UID, collections::NOTIFICATIONS, &id)
            .await
            .unwrap()
            .expect("notification");
        assert_eq!(doc["read"], true);

        delete_notification(&store, UID, &id).await.unwrap();
        assert!(store
            .get_doc(UID, collections::NOTIFICATIONS, &id)
            .await
            .unwrap()
            .is_none());

        let err = delete_notification(&store, UID, &id)
            .await
            .expect_err("already gone");
        assert_eq!(err.code(), "STORE/NOT_FOUND");
    }

    #[tokio::test]
    async fn medication_log_formats_the_entry_date() {
        let store = MemoryStore::new();
        let id = add_medication_log(
            &store,
            UID,
            &NewMedicationLog {
                date: chrono::NaiveDate::from_ymd_opt(2026, 8, 5).unwrap(),
                batch_id: "B-001".into(),
                medication: "Amprolium".into(),
                dosage: "1ml/L".into(),
                reason: "Coccidiosis prevention".into(),
            },
        )
        .await
        .unwrap();

        let log = store
            .get_doc(UID, collections::LOGS, &id)
            .await
            .unwrap()
            .expect("log doc");
        assert_eq!(log["date"], "Aug 5, 2026");
    }
}
