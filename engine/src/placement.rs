//! Placement ledger
//!
//! Remembers every position where the agent placed a block. The safety
//! filter reads it so the agent never mines its own (or anyone's recorded)
//! constructions. Records are never purged: a record whose position now
//! holds something else is *orphaned* and ignored by
//! [`PlacementLedger::is_agent_placed`], but it stays in the ledger.
//!
//! The ledger is an in-memory map shared behind an `Arc`; persistence is
//! handled by `db::placements`, which hydrates the ledger on startup and
//! receives new records as they are written.

use sdk::{Block, BlockPos, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// A block placed by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub pos: BlockPos,
    pub item_name: String,
    pub placed_by: String,
    pub timestamp_ms: i64,
}

/// Shared map of placement records keyed by position
#[derive(Debug, Clone, Default)]
pub struct PlacementLedger {
    records: Arc<RwLock<HashMap<BlockPos, PlacementRecord>>>,
    sink: Option<mpsc::UnboundedSender<PlacementRecord>>,
}

impl PlacementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every newly marked record to `sink`
    ///
    /// Bulk loads are not forwarded. Clones made after this call share the
    /// sink.
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<PlacementRecord>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record a placement, replacing any earlier record at the same position
    pub fn mark(&self, record: PlacementRecord) {
        if let Some(sink) = &self.sink {
            if sink.send(record.clone()).is_err() {
                warn!("Placement writer is gone, {} not persisted", record.pos);
            }
        }
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.pos, record);
    }

    /// Bulk-load records (e.g. from the database on startup)
    pub fn load(&self, loaded: impl IntoIterator<Item = PlacementRecord>) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        for record in loaded {
            records.insert(record.pos, record);
        }
    }

    /// Whether any record exists for this position, orphaned or not
    pub fn is_recorded(&self, pos: BlockPos) -> bool {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.contains_key(&pos)
    }

    pub fn get(&self, pos: BlockPos) -> Option<PlacementRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&pos).cloned()
    }

    /// Whether the live block is still the one the agent placed
    ///
    /// A record for a position that now holds a different block is orphaned
    /// and reads as `false`.
    pub fn is_agent_placed(&self, block: &Block) -> bool {
        self.get(block.pos)
            .is_some_and(|record| record.item_name == block.name)
    }

    /// Records within `radius` of `center`, nearest first, at most `limit`
    pub fn near(&self, center: Vec3, radius: f64, limit: usize) -> Vec<PlacementRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<(f64, PlacementRecord)> = records
            .values()
            .map(|r| (r.pos.center().distance_to(center), r))
            .filter(|(d, _)| *d <= radius)
            .map(|(d, r)| (d, r.clone()))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    /// Snapshot of every record, in no particular order
    pub fn all(&self) -> Vec<PlacementRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: i32, item: &str) -> PlacementRecord {
        PlacementRecord {
            pos: BlockPos::new(x, 64, 0),
            item_name: item.to_string(),
            placed_by: "kestrel".to_string(),
            timestamp_ms: 1,
        }
    }

    #[test]
    fn test_sink_receives_marked_records_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ledger = PlacementLedger::new().with_sink(tx);

        ledger.load(vec![record(1, "dirt")]);
        ledger.mark(record(2, "torch"));

        assert_eq!(rx.try_recv().unwrap().pos, BlockPos::new(2, 64, 0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mark_and_lookup() {
        let ledger = PlacementLedger::new();
        ledger.mark(record(1, "cobblestone"));

        assert!(ledger.is_recorded(BlockPos::new(1, 64, 0)));
        assert!(!ledger.is_recorded(BlockPos::new(2, 64, 0)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_orphaned_record_is_ignored_but_kept() {
        let ledger = PlacementLedger::new();
        ledger.mark(record(1, "cobblestone"));
        let pos = BlockPos::new(1, 64, 0);

        assert!(ledger.is_agent_placed(&Block::solid("cobblestone", pos)));

        // Someone replaced it with dirt
        assert!(!ledger.is_agent_placed(&Block::solid("dirt", pos)));
        assert!(!ledger.is_agent_placed(&Block::air(pos)));
        assert!(ledger.is_recorded(pos));
    }

    #[test]
    fn test_clones_share_state() {
        let ledger = PlacementLedger::new();
        let view = ledger.clone();
        ledger.mark(record(3, "torch"));
        assert!(view.is_recorded(BlockPos::new(3, 64, 0)));
    }

    #[test]
    fn test_near_sorted_and_limited() {
        let ledger = PlacementLedger::new();
        ledger.load(vec![record(10, "a"), record(2, "b"), record(5, "c"), record(40, "d")]);

        let hits = ledger.near(Vec3::new(0.5, 64.5, 0.5), 16.0, 2);
        let xs: Vec<i32> = hits.iter().map(|r| r.pos.x).collect();
        assert_eq!(xs, vec![2, 5]);
    }
}
