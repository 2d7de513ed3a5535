//! Read-only world view
//!
//! `WorldView` is the engine's only window onto the game. Implementations
//! answer from the client's live state; the engine polls it for every
//! decision and never caches results across ticks.

use crate::types::{Block, BlockPos, Entity, ItemStack, PlayerInfo, Recipe, Vec3};

/// Live, read-only access to the world around the agent
pub trait WorldView: Send + Sync {
    /// Agent position
    fn position(&self) -> Vec3;

    /// Block at a position, `None` when the chunk is not loaded
    fn block_at(&self, pos: BlockPos) -> Option<Block>;

    /// Positions of blocks accepted by `matching` within `max_distance` of
    /// the agent, nearest first, at most `count` results
    fn find_blocks(
        &self,
        matching: &dyn Fn(&Block) -> bool,
        max_distance: f64,
        count: usize,
    ) -> Vec<BlockPos>;

    /// Loaded entities other than the agent itself
    fn entities(&self) -> Vec<Entity>;

    /// Players known to the client
    fn players(&self) -> Vec<PlayerInfo>;

    /// Inventory contents
    fn inventory(&self) -> Vec<ItemStack>;

    fn health(&self) -> f32;

    fn food(&self) -> f32;

    /// Whether the item registry knows this name
    fn item_known(&self, name: &str) -> bool;

    /// First recipe able to produce `item`, if any
    fn recipe_for(&self, item: &str) -> Option<Recipe>;

    /// Nearest entity accepted by `matching`
    fn nearest_entity(&self, matching: &dyn Fn(&Entity) -> bool) -> Option<Entity> {
        let origin = self.position();
        self.entities()
            .into_iter()
            .filter(|e| matching(e))
            .min_by(|a, b| {
                origin
                    .distance_to(a.position)
                    .total_cmp(&origin.distance_to(b.position))
            })
    }

    /// Total count of an item across all stacks
    fn inventory_count(&self, name: &str) -> u32 {
        self.inventory()
            .iter()
            .filter(|stack| stack.name == name)
            .map(|stack| stack.count)
            .sum()
    }

    /// First stack with the given name
    fn find_item(&self, name: &str) -> Option<ItemStack> {
        self.inventory().into_iter().find(|stack| stack.name == name)
    }
}
