use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::json;

use farmsync_lib::auth::IdentityGate;
use farmsync_lib::commands::{
    self, NewBatch, NewExpense, NewInventoryItem, NewMedicationLog, NewSale, ProductionEntry,
};
use farmsync_lib::model::DailyDelta;
use farmsync_lib::store::{collections, FarmStore, MemoryStore};
use farmsync_lib::sync::spawn_session;

#[derive(Debug, Parser)]
#[command(name = "farmsync", about = "FarmSync session core", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive a complete scripted session against the in-memory store and
    /// print the merged aggregate state.
    Demo {
        /// Emit the final aggregate state as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    farmsync_lib::init_logging();

    let cli = Cli::parse();
    let json = match cli.command {
        Some(Commands::Demo { json }) => json,
        None => false,
    };

    match run_demo(json) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run_demo(json: bool) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(demo(json))
}

async fn demo(json: bool) -> Result<i32> {
    let uid = "demo-farmer";
    let store = MemoryStore::new();
    let gate = IdentityGate::new();
    let session = spawn_session(Arc::new(store.clone()), gate.subscribe());

    gate.sign_in(uid);

    commands::ensure_daily_summary(&store, uid).await?;
    commands::create_batch(
        &store,
        uid,
        &NewBatch {
            id: "B-001".into(),
            breed: "Isa Brown".into(),
            quantity: 200,
            start_date: String::new(),
        },
    )
    .await?;
    commands::add_inventory_item(
        &store,
        uid,
        &NewInventoryItem {
            item: "Layer Mash".into(),
            category: "Feed".into(),
            stock: 40,
            unit: "bags".into(),
            low_stock_threshold: 20,
        },
    )
    .await?;

    let entry = ProductionEntry {
        batch_id: "B-001".into(),
        eggs: 10,
        feed: 2,
        sick: 1,
        mortality: 0,
    };
    // Optimistic bump first, exactly as the quick-entry page does; the
    // authoritative snapshots supersede it moments later.
    session.apply_optimistic_daily_delta(DailyDelta::from(&entry));
    commands::record_production(&store, uid, &entry).await?;

    let today = Local::now().date_naive();
    commands::add_expense(
        &store,
        uid,
        &NewExpense {
            date: today,
            category: "Feed".into(),
            amount: 15000.0,
        },
    )
    .await?;
    commands::add_sale(
        &store,
        uid,
        &NewSale {
            date: today,
            invoice_id: String::new(),
            item: "Egg Crates".into(),
            quantity: 10,
            amount: 40000.0,
            customer: "Mrs. Adeyemi".into(),
        },
    )
    .await?;
    commands::add_medication_log(
        &store,
        uid,
        &NewMedicationLog {
            date: today,
            batch_id: "B-001".into(),
            medication: "Amprolium".into(),
            dosage: "1ml/L".into(),
            reason: "Coccidiosis prevention".into(),
        },
    )
    .await?;

    // Notifications come from external triggers; seed one directly.
    let notification = json!({
        "type": "warning",
        "title": "Inventory running low",
        "message": "Layer Mash is close to its restock threshold",
        "timestamp": farmsync_lib::time::now_ms(),
        "read": false,
    });
    store
        .add_doc(
            uid,
            collections::NOTIFICATIONS,
            notification.as_object().cloned().unwrap_or_default(),
        )
        .await?;

    // Let the snapshot streams drain into the merge loop.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let data = session.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("FarmSync demo session for '{uid}'");
        println!(
            "  birds: {}  sick: {}  mortality: {}",
            data.stats.total_birds, data.stats.sick, data.stats.mortality
        );
        println!(
            "  today: {} crates, {} bags, {} sick, {} dead",
            data.daily_summary.eggs,
            data.daily_summary.feed,
            data.daily_summary.sick,
            data.daily_summary.mortality
        );
        println!(
            "  expenses: {:.0}  sales: {:.0}",
            data.stats.total_expenses, data.stats.total_sales
        );
        println!(
            "  batches: {}  inventory: {}  logs: {}  unread alerts: {}",
            data.batches.len(),
            data.inventory.len(),
            data.logs.len(),
            data.unread_notifications()
        );
    }

    gate.sign_out();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let leaked = store.open_subscriptions();
    session.shutdown().await;

    if leaked != 0 {
        eprintln!("{leaked} subscriptions still open after sign-out");
        return Ok(1);
    }
    println!("signed out, all subscriptions closed");
    Ok(0)
}
