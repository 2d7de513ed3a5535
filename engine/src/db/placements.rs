/// Placement record persistence
///
/// Mirrors the in-memory [`PlacementLedger`](crate::placement::PlacementLedger)
/// so protection of agent-built blocks survives restarts. Records are keyed
/// by position; writing a second record at the same position replaces the
/// first.
use anyhow::{Context, Result};
use sdk::{BlockPos, Vec3};
use sqlx::{Row, SqlitePool};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::placement::{PlacementLedger, PlacementRecord};

/// Placement repository for database operations
#[derive(Clone)]
pub struct PlacementRepository {
    pool: SqlitePool,
}

impl PlacementRepository {
    /// Create a new placement repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the record at `record.pos`
    pub async fn upsert(&self, record: &PlacementRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO placements (x, y, z, item_name, placed_by, timestamp_ms) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(x, y, z) DO UPDATE SET
                item_name = excluded.item_name,
                placed_by = excluded.placed_by,
                timestamp_ms = excluded.timestamp_ms",
        )
        .bind(record.pos.x)
        .bind(record.pos.y)
        .bind(record.pos.z)
        .bind(&record.item_name)
        .bind(&record.placed_by)
        .bind(record.timestamp_ms)
        .execute(&self.pool)
        .await
        .context("Failed to store placement record")?;

        Ok(())
    }

    /// Every stored record
    pub async fn load_all(&self) -> Result<Vec<PlacementRecord>> {
        let rows = sqlx::query(
            "SELECT x, y, z, item_name, placed_by, timestamp_ms FROM placements ORDER BY timestamp_ms",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load placement records")?;

        rows.iter().map(row_to_record).collect()
    }

    /// Most recent records first, at most `limit`
    pub async fn recent(&self, limit: u32) -> Result<Vec<PlacementRecord>> {
        let rows = sqlx::query(
            "SELECT x, y, z, item_name, placed_by, timestamp_ms FROM placements ORDER BY timestamp_ms DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent placement records")?;

        rows.iter().map(row_to_record).collect()
    }

    /// Records within `radius` of `center`, nearest first
    ///
    /// The database narrows by bounding box; exact distance and ordering are
    /// computed here.
    pub async fn near(
        &self,
        center: Vec3,
        radius: f64,
        limit: usize,
    ) -> Result<Vec<PlacementRecord>> {
        let r = radius.ceil() as i32;
        let c = center.floored();
        let rows = sqlx::query(
            "SELECT x, y, z, item_name, placed_by, timestamp_ms FROM placements
             WHERE x BETWEEN ? AND ? AND y BETWEEN ? AND ? AND z BETWEEN ? AND ?",
        )
        .bind(c.x - r)
        .bind(c.x + r)
        .bind(c.y - r)
        .bind(c.y + r)
        .bind(c.z - r)
        .bind(c.z + r)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query nearby placement records")?;

        let mut records: Vec<(f64, PlacementRecord)> = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|record| (record.pos.center().distance_to(center), record))
            .filter(|(d, _)| *d <= radius)
            .collect();
        records.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(records.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM placements")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count placement records")?;
        Ok(count)
    }

    /// Fill `ledger` with every stored record
    pub async fn hydrate(&self, ledger: &PlacementLedger) -> Result<usize> {
        let records = self.load_all().await?;
        let loaded = records.len();
        ledger.load(records);
        Ok(loaded)
    }

    /// Store every record currently in `ledger`
    pub async fn persist(&self, ledger: &PlacementLedger) -> Result<usize> {
        let records = ledger.all();
        for record in &records {
            self.upsert(record).await?;
        }
        Ok(records.len())
    }
}

/// Write records arriving on `records` until every sender is dropped
///
/// Pair with [`PlacementLedger::with_sink`] for write-through persistence.
/// Failed writes are logged and skipped.
pub fn spawn_placement_writer(
    repo: PlacementRepository,
    mut records: mpsc::UnboundedReceiver<PlacementRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            match repo.upsert(&record).await {
                Ok(()) => debug!("Persisted placement at {}", record.pos),
                Err(e) => warn!("Failed to persist placement at {}: {:#}", record.pos, e),
            }
        }
    })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<PlacementRecord> {
    Ok(PlacementRecord {
        pos: BlockPos::new(row.try_get("x")?, row.try_get("y")?, row.try_get("z")?),
        item_name: row.try_get("item_name")?,
        placed_by: row.try_get("placed_by")?,
        timestamp_ms: row.try_get("timestamp_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn record(x: i32, item: &str, ts: i64) -> PlacementRecord {
        PlacementRecord {
            pos: BlockPos::new(x, 64, 0),
            item_name: item.to_string(),
            placed_by: "kestrel".to_string(),
            timestamp_ms: ts,
        }
    }

    async fn setup() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_upsert_and_load() {
        let (_dir, db) = setup().await;
        let repo = db.placements();

        repo.upsert(&record(1, "cobblestone", 10)).await.unwrap();
        repo.upsert(&record(2, "torch", 20)).await.unwrap();

        let all = repo.load_all().await.unwrap();
        assert_eq!(all, vec![record(1, "cobblestone", 10), record(2, "torch", 20)]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_position() {
        let (_dir, db) = setup().await;
        let repo = db.placements();

        repo.upsert(&record(1, "cobblestone", 10)).await.unwrap();
        repo.upsert(&record(1, "oak_planks", 30)).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.load_all().await.unwrap()[0].item_name, "oak_planks");
    }

    #[tokio::test]
    async fn test_near_filters_and_sorts() {
        let (_dir, db) = setup().await;
        let repo = db.placements();
        for (x, ts) in [(9, 1), (1, 2), (4, 3), (30, 4)] {
            repo.upsert(&record(x, "dirt", ts)).await.unwrap();
        }

        let hits = repo.near(Vec3::new(0.5, 64.5, 0.5), 10.0, 10).await.unwrap();
        let xs: Vec<i32> = hits.iter().map(|r| r.pos.x).collect();
        assert_eq!(xs, vec![1, 4, 9]);
    }

    #[tokio::test]
    async fn test_hydrate_and_persist_ledger() {
        let (_dir, db) = setup().await;
        let repo = db.placements();

        let ledger = PlacementLedger::new();
        ledger.mark(record(5, "glass", 1));
        ledger.mark(record(6, "glass", 2));
        assert_eq!(repo.persist(&ledger).await.unwrap(), 2);

        let restored = PlacementLedger::new();
        assert_eq!(repo.hydrate(&restored).await.unwrap(), 2);
        assert!(restored.is_recorded(BlockPos::new(5, 64, 0)));

        let recent = repo.recent(1).await.unwrap();
        assert_eq!(recent[0].pos.x, 6);
    }

    #[tokio::test]
    async fn test_write_through_ledger() {
        let (_dir, db) = setup().await;
        let repo = db.placements();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = spawn_placement_writer(repo.clone(), rx);

        let ledger = PlacementLedger::new().with_sink(tx);
        ledger.mark(record(7, "cobblestone", 1));
        drop(ledger);
        writer.await.unwrap();

        assert_eq!(repo.load_all().await.unwrap(), vec![record(7, "cobblestone", 1)]);
    }
}
