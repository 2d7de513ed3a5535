//! Safety filter
//!
//! Decides which blocks the agent may destroy and where it may place blocks.
//! The filter is a set of predicates over the live world plus the placement
//! ledger; it holds no state of its own.
//!
//! # Mining rules
//!
//! A block is safe to mine only when all of these hold:
//!
//! 1. Its position is not in the placement ledger
//! 2. Its name does not look manufactured (planks, glass, doors, ...)
//! 3. It looks natural: ores, the stone family, soil, ice, leaves, or a log
//!    with leaves within two blocks in every direction (a tree, not a beam)
//! 4. None of its six face neighbours looks manufactured, so the agent never
//!    undermines a build even when the block itself is plain stone
//!
//! `safe_mining = false` in the configuration turns every check off.
//!
//! # Placement rules
//!
//! A target position accepts a block only if it is air and has a solid face
//! neighbour to click against. The face vector `target - reference` must be
//! a unit axis vector; diagonal or coincident references are rejected.

use sdk::{Block, BlockPos, WorldView};
use tracing::debug;

use crate::placement::PlacementLedger;

/// Substrings of block names that indicate something built
const STRUCTURE_PATTERNS: &[&str] = &[
    "planks",
    "brick",
    "bricks",
    "stairs",
    "slab",
    "wall",
    "fence",
    "gate",
    "door",
    "trapdoor",
    "glass",
    "pane",
    "torch",
    "lantern",
    "bed",
    "carpet",
    "banner",
    "sign",
    "chest",
    "barrel",
    "furnace",
    "crafting_table",
    "anvil",
    "smithing",
    "enchanting",
    "loom",
    "cartography",
    "stonecutter",
    "grindstone",
    "lectern",
    "jukebox",
    "composter",
    "beehive",
    "beacon",
    "concrete",
    "terracotta",
    "wool",
    "glazed",
    "prismarine",
    "quartz",
    "deepslate_bricks",
    "polished",
    "smooth",
    "tiles",
];

/// Blocks that are generated by terrain
const NATURAL_NAMES: &[&str] = &[
    "stone",
    "deepslate",
    "dirt",
    "grass_block",
    "sand",
    "red_sand",
    "gravel",
    "clay",
    "netherrack",
    "basalt",
    "blackstone",
    "end_stone",
    "andesite",
    "diorite",
    "granite",
    "cobblestone",
    "mossy_cobblestone",
    "sandstone",
    "red_sandstone",
    "soul_sand",
    "soul_soil",
    "snow",
    "ice",
    "packed_ice",
    "blue_ice",
];

/// Neighbour offsets tried when looking for a placement reference, in order
const PLACEMENT_OFFSETS: [BlockPos; 6] = [
    BlockPos::new(0, -1, 0),
    BlockPos::new(0, 1, 0),
    BlockPos::new(1, 0, 0),
    BlockPos::new(-1, 0, 0),
    BlockPos::new(0, 0, 1),
    BlockPos::new(0, 0, -1),
];

/// Half-width of the cube searched for leaves around a log
const LEAF_SEARCH_RADIUS: i32 = 2;

/// Whether a block name looks manufactured
pub fn is_structure_block_name(name: &str) -> bool {
    !name.is_empty() && STRUCTURE_PATTERNS.iter().any(|p| name.contains(p))
}

/// Whether a face vector joins two face-adjacent blocks
///
/// ```
/// use kestrel_engine::safety::face_vector_is_valid;
/// use sdk::BlockPos;
///
/// let target = BlockPos::new(0, 65, 0);
/// assert!(face_vector_is_valid(target, BlockPos::new(0, 64, 0)));
/// assert!(!face_vector_is_valid(target, BlockPos::new(1, 64, 0)));
/// assert!(!face_vector_is_valid(target, target));
/// ```
pub fn face_vector_is_valid(target: BlockPos, reference: BlockPos) -> bool {
    (target - reference).manhattan() == 1
}

/// A solid block to click against and the face to click
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementReference {
    pub reference: Block,
    /// `target - reference`, always a unit axis vector
    pub face: BlockPos,
}

/// Mining and placement eligibility checks
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    ledger: PlacementLedger,
    safe_mining: bool,
}

impl SafetyFilter {
    pub fn new(ledger: PlacementLedger, safe_mining: bool) -> Self {
        Self {
            ledger,
            safe_mining,
        }
    }

    pub fn ledger(&self) -> &PlacementLedger {
        &self.ledger
    }

    /// Whether the agent may destroy this block
    pub fn is_safe_to_mine(&self, world: &dyn WorldView, block: &Block) -> bool {
        if block.name.is_empty() {
            return false;
        }
        if !self.safe_mining {
            return true;
        }
        if self.ledger.is_recorded(block.pos) {
            debug!("{} at {} is in the placement ledger", block.name, block.pos);
            return false;
        }
        if is_structure_block_name(&block.name) {
            return false;
        }
        if !self.is_likely_natural(world, block) {
            return false;
        }

        let touches_structure = BlockPos::FACES.iter().any(|offset| {
            world
                .block_at(block.pos + *offset)
                .is_some_and(|neighbor| is_structure_block_name(&neighbor.name))
        });
        if touches_structure {
            debug!("{} at {} borders a structure", block.name, block.pos);
            return false;
        }

        true
    }

    /// Whether the block was most likely generated by terrain
    pub fn is_likely_natural(&self, world: &dyn WorldView, block: &Block) -> bool {
        let name = block.name.as_str();
        if name.is_empty() {
            return false;
        }
        if name.contains("_ore") || NATURAL_NAMES.contains(&name) {
            return true;
        }
        if name.ends_with("_log") || name.ends_with("_wood") {
            return has_leaves_nearby(world, block.pos);
        }
        name.contains("leaves")
    }

    /// All valid references for placing at `target`, in preference order
    ///
    /// Empty when the target is not air or not loaded.
    pub fn placement_references(
        &self,
        world: &dyn WorldView,
        target: BlockPos,
    ) -> Vec<PlacementReference> {
        let Some(target_block) = world.block_at(target) else {
            return Vec::new();
        };
        if !target_block.is_air() {
            return Vec::new();
        }

        PLACEMENT_OFFSETS
            .iter()
            .filter_map(|offset| world.block_at(target + *offset))
            .filter(|reference| reference.is_solid())
            .filter(|reference| face_vector_is_valid(target, reference.pos))
            .map(|reference| PlacementReference {
                face: target - reference.pos,
                reference,
            })
            .collect()
    }

    /// First valid reference for placing at `target`
    pub fn find_placement_reference(
        &self,
        world: &dyn WorldView,
        target: BlockPos,
    ) -> Option<PlacementReference> {
        self.placement_references(world, target).into_iter().next()
    }
}

/// Whether any leaf block lies within the 5x5x5 cube around `pos`
///
/// One block search from the agent, wide enough to cover the whole cube.
fn has_leaves_nearby(world: &dyn WorldView, pos: BlockPos) -> bool {
    let cube_corner = f64::from(LEAF_SEARCH_RADIUS) * 3f64.sqrt();
    let max_distance = world.position().distance_to(pos.center()) + cube_corner + 1.0;
    let is_nearby_leaf = |b: &Block| {
        b.name.contains("leaves")
            && b.pos != pos
            && b.pos.chebyshev_to(pos) <= LEAF_SEARCH_RADIUS
    };
    !world.find_blocks(&is_nearby_leaf, max_distance, 1).is_empty()
}
