/// SQLite persistence
///
/// Two tables live here: the placement ledger, so agent-built blocks stay
/// protected across restarts, and the world event history written by the
/// event recorder. The file is opened in WAL mode; the recorder writes while
/// `kestrel events` reads.
///
/// Schema changes are numbered migrations. The highest applied number is
/// kept in SQLite's `user_version`, so opening a current file runs nothing.
use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;

pub mod events;
pub mod placements;

pub use events::{spawn_event_recorder, WorldEvent, WorldEventRepository};
pub use placements::{spawn_placement_writer, PlacementRepository};

/// Numbered schema migrations, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "001_initial.sql",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Handle to the agent's database
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database configured under `core.data_dir`
    pub async fn open(config: &Config) -> Result<Self> {
        Self::new(&config.database_path()).await
    }

    /// Open or create the database at `db_path` and bring its schema up to date
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Opening database at {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .disable_statement_logging();

        // One writer at a time in SQLite; a small pool covers the recorder,
        // the placement writer and a reader.
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", db_path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply every migration newer than the stored schema version
    async fn migrate(&self) -> Result<()> {
        let current = self.schema_version().await?;
        for (version, name, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            info!("Applying migration {}", name);
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to apply migration {}", name))?;
            // PRAGMA does not take bound parameters
            sqlx::query(&format!("PRAGMA user_version = {}", version))
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to record migration {}", name))?;
        }
        debug!("Schema at version {}", self.schema_version().await?);
        Ok(())
    }

    /// Highest migration applied to this file, 0 for a fresh one
    pub async fn schema_version(&self) -> Result<i64> {
        sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read schema version")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to checkpoint WAL")?;
        debug!("WAL checkpointed");
        Ok(())
    }

    /// Checkpoint and close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Database closed");
        Ok(())
    }

    pub fn placements(&self) -> PlacementRepository {
        PlacementRepository::new(self.pool.clone())
    }

    pub fn events(&self) -> WorldEventRepository {
        WorldEventRepository::new(self.pool.clone())
    }
}
