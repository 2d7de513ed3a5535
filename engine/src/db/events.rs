/// World event history
///
/// Task lifecycle and reflex events are written here by a recorder task that
/// listens on the message bus. Recording is best-effort: a failed write is
/// logged and the event is dropped.
use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::message_bus::{Event, EventType, MessageBus};

/// A stored event
#[derive(Debug, Clone, PartialEq)]
pub struct WorldEvent {
    pub id: i64,
    pub kind: String,
    /// JSON object with the event's fields
    pub detail: String,
    pub timestamp_ms: i64,
}

/// World event repository for database operations
#[derive(Clone)]
pub struct WorldEventRepository {
    pool: SqlitePool,
}

impl WorldEventRepository {
    /// Create a new world event repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store one event and return its row id
    pub async fn add(&self, kind: &str, detail: &str, timestamp_ms: i64) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO world_events (kind, detail, timestamp_ms) VALUES (?, ?, ?)",
        )
        .bind(kind)
        .bind(detail)
        .bind(timestamp_ms)
        .execute(&self.pool)
        .await
        .context("Failed to insert world event")?;

        Ok(result.last_insert_rowid())
    }

    /// Newest events first
    pub async fn recent(&self, limit: u32) -> Result<Vec<WorldEvent>> {
        let rows = sqlx::query(
            "SELECT id, kind, detail, timestamp_ms FROM world_events ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load world events")?;

        rows.iter()
            .map(|row| {
                Ok(WorldEvent {
                    id: row.try_get("id")?,
                    kind: row.try_get("kind")?,
                    detail: row.try_get("detail")?,
                    timestamp_ms: row.try_get("timestamp_ms")?,
                })
            })
            .collect()
    }

    /// Store a bus event. World feed events (ticks, health) are skipped and
    /// return `None`.
    pub async fn record(&self, event: &Event, timestamp_ms: i64) -> Result<Option<i64>> {
        let Some(detail) = event.detail() else {
            return Ok(None);
        };
        self.add(event.name(), &detail.to_string(), timestamp_ms)
            .await
            .map(Some)
    }
}

/// Persist engine events from `bus` until the bus is dropped
///
/// Subscribes before returning, so every event published after this call is
/// seen by the recorder.
pub async fn spawn_event_recorder(
    bus: &MessageBus,
    repo: WorldEventRepository,
    clock: Arc<dyn Clock>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe(EventType::All).await;
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match repo.record(&event, clock.unix_millis()).await {
                Ok(Some(id)) => debug!("Recorded {} as event {}", event.name(), id),
                Ok(None) => {}
                Err(e) => warn!("Failed to record {}: {:#}", event.name(), e),
            }
        }
        debug!("Event recorder stopped");
    })
}
