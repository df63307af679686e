//! Per-category merge functions over the aggregate state.
//!
//! Each function touches exactly one slice of [`FarmData`] and leaves every
//! other slice untouched. Record slices merge field-wise from partial
//! patches; collection slices are replaced wholesale, since subscriptions
//! deliver complete listings rather than deltas.

use paste::paste;

use crate::model::{
    Batch, DailyDelta, DailySummary, DailySummaryPatch, Expense, FarmData, FarmStatsPatch,
    InventoryItem, MedicationLog, Notification, ProductionRecord, Sale,
};
use crate::time::DayWindow;

/// Overlay the fields present in the incoming counters snapshot.
pub fn apply_stats(data: &mut FarmData, patch: FarmStatsPatch) {
    let stats = &mut data.stats;
    if let Some(total_birds) = patch.total_birds {
        stats.total_birds = total_birds;
    }
    if let Some(sick) = patch.sick {
        stats.sick = sick;
    }
    if let Some(mortality) = patch.mortality {
        stats.mortality = mortality;
    }
    if let Some(total_expenses) = patch.total_expenses {
        stats.total_expenses = total_expenses;
    }
    if let Some(total_sales) = patch.total_sales {
        stats.total_sales = total_sales;
    }
}

/// Overlay the fields present in the incoming summary document snapshot.
///
/// This is the legacy increment-driven input; the windowed recomputation in
/// [`apply_production_records`] remains authoritative and overwrites the
/// same four fields whenever its stream fires.
pub fn apply_daily_summary(data: &mut FarmData, patch: DailySummaryPatch) {
    let summary = &mut data.daily_summary;
    if let Some(eggs) = patch.eggs {
        summary.eggs = eggs;
    }
    if let Some(feed) = patch.feed {
        summary.feed = feed;
    }
    if let Some(sick) = patch.sick {
        summary.sick = sick;
    }
    if let Some(mortality) = patch.mortality {
        summary.mortality = mortality;
    }
}

macro_rules! gen_listing_merges {
    ( $( $field:ident : $ty:ty ),+ $(,)? ) => {
        paste! {
            $(
                #[doc = concat!("Replace the `", stringify!($field), "` slice with the snapshot's full listing.")]
                pub fn [<apply_ $field>](data: &mut FarmData, rows: Vec<$ty>) {
                    data.$field = rows;
                }
            )+
        }
    };
}

gen_listing_merges!(
    batches: Batch,
    inventory: InventoryItem,
    logs: MedicationLog,
    expenses: Expense,
    sales: Sale,
    notifications: Notification,
);

/// Recompute today's totals from the windowed production records and fold
/// them into the Daily Summary slice. Records outside the window are
/// ignored, so the result is idempotent and self-correcting.
pub fn apply_production_records(data: &mut FarmData, records: &[ProductionRecord], window: DayWindow) {
    let mut totals = DailySummary::default();
    for record in records.iter().filter(|r| window.contains(r.timestamp)) {
        totals.eggs += record.crates;
        totals.feed += record.bags;
        totals.sick += record.sick;
        totals.mortality += record.mortality;
    }
    data.daily_summary = totals;
}

/// Locally bump the Daily Summary ahead of the authoritative snapshot. The
/// next snapshot for the category overwrites these fields, so the bump can
/// never double-count.
pub fn apply_daily_delta(data: &mut FarmData, delta: DailyDelta) {
    let summary = &mut data.daily_summary;
    summary.eggs += delta.eggs;
    summary.feed += delta.feed;
    summary.sick += delta.sick;
    summary.mortality += delta.mortality;
}
