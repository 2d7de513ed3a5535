//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - simulate: Run a task against a seeded sandbox world
//! - placements: List recorded block placements
//! - events: List recent task and reflex events
//! - config show / validate

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::context::AgentContext;
use crate::db::{spawn_event_recorder, spawn_placement_writer, Database};
use crate::message_bus::{Event, EventType, MessageBus};
use crate::scheduler::{Scheduler, TickReport};
use crate::sim::Scenario;
use crate::task::{TaskSpec, TickStatus};
use sdk::WorldView;

/// Simulated time between ticks
const TICK_INTERVAL_MS: u64 = 50;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Result of a simulation run
#[derive(Debug)]
pub struct SimulationSummary {
    pub ticks: u32,
    pub final_status: Option<TickStatus>,
    pub said: Vec<String>,
    pub events: Vec<Event>,
    pub inventory: Vec<(String, u32)>,
}

/// Run a task against a seeded sandbox world until it ends or `ticks` pass
///
/// Time is simulated: every tick advances a manual clock by 50 ms. With
/// `persist`, placements and events are written to the configured database.
pub async fn run_simulation(
    task: &str,
    ticks: u32,
    seed: u64,
    persist: bool,
    config: &Config,
) -> Result<SimulationSummary> {
    let spec = TaskSpec::from_json(task).context("Invalid task")?;
    let world = Arc::new(Scenario::for_task(&spec).build(seed));
    let clock = Arc::new(ManualClock::new());
    let ctx = AgentContext::from_adapter(Arc::clone(&world), Arc::clone(&clock) as Arc<dyn Clock>);
    let bus = MessageBus::new();
    let mut events = bus.subscribe(EventType::All).await;

    let mut ledger = world.ledger().clone();
    let mut database = None;
    let mut background = Vec::new();
    if persist {
        let db = Database::open(config)
            .await
            .context("Failed to open database")?;
        let loaded = db.placements().hydrate(&ledger).await?;
        info!("Loaded {} placement records", loaded);

        let (tx, rx) = mpsc::unbounded_channel();
        ledger = ledger.with_sink(tx);
        background.push(spawn_placement_writer(db.placements(), rx));
        background.push(
            spawn_event_recorder(&bus, db.events(), Arc::clone(&clock) as Arc<dyn Clock>).await,
        );
        database = Some(db);
    }

    let mut scheduler = Scheduler::from_config(ctx, ledger, config, bus, Some(seed));
    scheduler.executor_mut().start_task(spec).await;

    let mut ran = 0;
    let mut final_status = None;
    while ran < ticks {
        clock.advance_ms(TICK_INTERVAL_MS);
        ran += 1;
        let report = scheduler.tick().await;
        tokio::task::yield_now().await;
        if let TickReport::Ran(status) = report {
            final_status = Some(status);
            if !status.is_busy() {
                break;
            }
        }
    }

    // Dropping the scheduler closes the bus and the placement sink, which
    // lets the background writers drain and exit.
    drop(scheduler);
    for handle in background {
        handle.await.context("Background writer panicked")?;
    }
    if let Some(db) = database {
        db.close().await?;
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    Ok(SimulationSummary {
        ticks: ran,
        final_status,
        said: world.said(),
        events: seen,
        inventory: world
            .inventory()
            .into_iter()
            .map(|s| (s.name, s.count))
            .collect(),
    })
}

/// Handle `kestrel simulate`
pub async fn handle_simulate(
    task: &str,
    ticks: u32,
    seed: u64,
    persist: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let summary = run_simulation(task, ticks, seed, persist, config).await?;

    match format {
        OutputFormat::Text => {
            println!("Simulation finished after {} ticks", summary.ticks);
            if let Some(status) = summary.final_status {
                println!("  Final status: {:?}", status);
            }
            println!();
            println!("Chat:");
            for line in &summary.said {
                println!("  <kestrel> {}", line);
            }
            println!();
            println!("Events:");
            for event in &summary.events {
                if let Some(detail) = event.detail() {
                    println!("  {} {}", event.name(), detail);
                }
            }
            println!();
            println!("Inventory:");
            for (item, count) in &summary.inventory {
                println!("  {:>4} {}", count, item);
            }
        }
        OutputFormat::Json => {
            let events: Vec<_> = summary
                .events
                .iter()
                .filter_map(|e| e.detail().map(|d| json!({ "kind": e.name(), "detail": d })))
                .collect();
            let inventory: serde_json::Map<String, serde_json::Value> = summary
                .inventory
                .iter()
                .map(|(item, count)| (item.clone(), json!(count)))
                .collect();
            let output = json!({
                "ticks": summary.ticks,
                "final_status": summary.final_status.map(|s| format!("{:?}", s)),
                "said": summary.said,
                "events": events,
                "inventory": inventory,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Handle `kestrel placements`
pub async fn handle_placements(limit: u32, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::open(config)
        .await
        .context("Failed to open database")?;
    let records = database
        .placements()
        .recent(limit)
        .await
        .context("Failed to fetch placements")?;

    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No placements recorded");
            } else {
                println!("Placements (last {}):", limit);
                for record in &records {
                    println!(
                        "  {:<16} {:<20} by {} at {}",
                        record.pos.to_string(),
                        record.item_name,
                        record.placed_by,
                        format_millis(record.timestamp_ms)
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "placements": records,
                "count": records.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Handle `kestrel events`
pub async fn handle_events(limit: u32, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::open(config)
        .await
        .context("Failed to open database")?;
    let events = database
        .events()
        .recent(limit)
        .await
        .context("Failed to fetch events")?;

    match format {
        OutputFormat::Text => {
            if events.is_empty() {
                println!("No events recorded");
            } else {
                println!("Events (last {}):", limit);
                for event in &events {
                    println!(
                        "  #{:<5} {} {:<15} {}",
                        event.id,
                        format_millis(event.timestamp_ms),
                        event.kind,
                        event.detail
                    );
                }
            }
        }
        OutputFormat::Json => {
            let events: Vec<_> = events
                .iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "kind": e.kind,
                        "detail": serde_json::from_str::<serde_json::Value>(&e.detail)
                            .unwrap_or_else(|_| json!(e.detail)),
                        "timestamp_ms": e.timestamp_ms,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "events": events }))?);
        }
    }

    database.close().await
}

/// Handle `kestrel config show`
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = toml::to_string_pretty(config).context("Failed to serialize config")?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
