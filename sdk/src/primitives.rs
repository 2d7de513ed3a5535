//! Action primitives and status output
//!
//! Atomic operations the engine can ask the game adapter to perform. The
//! async operations may take many ticks and may fail; on failure the adapter
//! must leave the agent in a safe idle state. The synchronous operations
//! only flip client-side state (goal, controls, look direction) and cannot
//! fail.

use async_trait::async_trait;

use crate::errors::PrimitiveError;
use crate::types::{Block, BlockPos, Control, EquipSlot, Goal, Vec3};

/// Movement, block interaction, crafting and inventory operations
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    /// Path to a goal and resolve once reached
    async fn travel_to(&self, goal: Goal) -> Result<(), PrimitiveError>;

    /// Replace the pathfinder's background goal (`None` clears it)
    fn set_goal(&self, goal: Option<Goal>);

    /// Whether the pathfinder is currently moving toward a goal
    fn is_moving(&self) -> bool;

    /// Whether a dig is in progress
    fn is_digging(&self) -> bool;

    /// Travel to a block, mine it and pick up its drops
    async fn collect(&self, block: &Block) -> Result<(), PrimitiveError>;

    /// Mine a block within reach
    async fn dig(&self, block: &Block) -> Result<(), PrimitiveError>;

    /// Place the held item against `reference` on the side given by `face`
    async fn place(&self, reference: BlockPos, face: BlockPos) -> Result<(), PrimitiveError>;

    /// Craft `count` of `item`, optionally at a crafting station
    async fn craft(
        &self,
        item: &str,
        count: u32,
        station: Option<BlockPos>,
    ) -> Result<(), PrimitiveError>;

    /// Load the furnace at `furnace`
    ///
    /// Takes out any finished output first, then puts in `input_count` of
    /// `input` and `fuel_count` of `fuel`. Resolves once the furnace is
    /// loaded, not when smelting finishes.
    async fn smelt(
        &self,
        furnace: BlockPos,
        input: &str,
        input_count: u32,
        fuel: &str,
        fuel_count: u32,
    ) -> Result<(), PrimitiveError>;

    /// Move an inventory item into a slot
    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), PrimitiveError>;

    /// Eat or drink the held item
    async fn consume(&self) -> Result<(), PrimitiveError>;

    /// Attack an entity
    async fn attack(&self, entity_id: u64) -> Result<(), PrimitiveError>;

    fn look_at(&self, target: Vec3);

    fn set_control(&self, control: Control, active: bool);

    /// Start using the held item (`off_hand` selects the off-hand)
    fn activate_item(&self, off_hand: bool);

    fn deactivate_item(&self);
}

/// Outbound status lines (chat)
///
/// Delivery is best-effort; nothing in the engine depends on a line being
/// seen.
pub trait StatusSink: Send + Sync {
    fn say(&self, line: &str);
}
