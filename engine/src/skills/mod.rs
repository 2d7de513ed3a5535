//! One-shot composite actions
//!
//! Skills chain several primitives into a single request: place a block
//! somewhere sensible, craft an item (placing a crafting table first when
//! the recipe needs one), load a furnace, eat. Unlike tasks they finish within one call and
//! report their outcome as a `Result`.
//!
//! Every block a skill places is written to the placement ledger so the
//! safety filter will never let the agent mine it again.

use sdk::errors::PrimitiveError;
use sdk::{Block, BlockPos, EquipSlot, Goal, WorldView};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SafetyConfig;
use crate::context::AgentContext;
use crate::items::ItemNames;
use crate::placement::PlacementRecord;
use crate::safety::{PlacementReference, SafetyFilter};

/// Items crafted at most once: if one is carried, crafting is skipped
const SINGLETON_ITEMS: &[&str] = &[
    "crafting_table",
    "wooden_pickaxe",
    "stone_pickaxe",
    "iron_pickaxe",
    "furnace",
];

const CRAFTING_TABLE: &str = "crafting_table";

const FURNACE: &str = "furnace";
const FURNACE_BLOCKS: &[&str] = &["furnace", "lit_furnace"];

/// Furnace fuels, preferred first
const FUELS: &[&str] = &[
    "coal",
    "charcoal",
    "coal_block",
    "lava_bucket",
    "oak_log",
    "birch_log",
    "spruce_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
    "mangrove_log",
    "cherry_log",
    "crimson_stem",
    "warped_stem",
    "oak_planks",
    "birch_planks",
    "spruce_planks",
    "jungle_planks",
    "acacia_planks",
    "dark_oak_planks",
    "mangrove_planks",
    "cherry_planks",
    "crimson_planks",
    "warped_planks",
    "stick",
];

/// How close the agent stands to a reference block it had to walk to
const APPROACH_RANGE: f64 = 2.0;

/// Most candidate surfaces tried by the fallback placement search
const FALLBACK_CANDIDATES: usize = 30;

/// Why a skill could not finish
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("No valid placement near the agent")]
    NoPlacement,

    #[error("No crafting table available")]
    NoCraftingTable,

    #[error("No furnace available")]
    NoFurnace,

    #[error("No fuel for the furnace")]
    NoFuel,

    #[error("No recipe for {0}")]
    NoRecipe(String),

    #[error("Missing item: {0}")]
    MissingItem(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
}

impl SkillError {
    /// Status line for the player
    pub fn status_line(&self) -> String {
        match self {
            SkillError::NoPlacement => "couldn't find a spot for the block".to_string(),
            SkillError::NoCraftingTable => {
                "need a crafting table nearby and can't place one".to_string()
            }
            SkillError::NoFurnace => "can't find or place a furnace".to_string(),
            SkillError::NoFuel => "no fuel for the furnace".to_string(),
            SkillError::NoRecipe(item) => format!("don't know how to craft {}", item),
            SkillError::MissingItem(item) => format!("no {} on me", item),
            SkillError::UnknownItem(item) => format!("what's {}? never heard of it", item),
            SkillError::Primitive(_) => "that didn't work".to_string(),
        }
    }
}

/// Block placement, crafting, smelting and eating
#[derive(Clone)]
pub struct Skills {
    ctx: AgentContext,
    safety: SafetyFilter,
    names: ItemNames,
    config: SafetyConfig,
    agent_name: String,
}

impl Skills {
    pub fn new(
        ctx: AgentContext,
        safety: SafetyFilter,
        names: ItemNames,
        config: SafetyConfig,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            safety,
            names,
            config,
            agent_name: agent_name.into(),
        }
    }

    /// Place `item` at `target`, or on top of any nearby surface
    ///
    /// The explicit target is tried first. If it is missing or no reference
    /// around it works, every non-air block within `fallback_radius` is tried
    /// as a floor. Returns the position the block ended up at.
    ///
    /// # Errors
    ///
    /// - [`SkillError::MissingItem`] when the item is not carried
    /// - [`SkillError::NoPlacement`] when no position accepted the block
    pub async fn place_block(
        &self,
        item: &str,
        target: Option<BlockPos>,
    ) -> Result<BlockPos, SkillError> {
        let item = self.names.normalize(item);
        if self.ctx.world.find_item(&item).is_none() {
            self.ctx.say(&format!("no {} to build with", item));
            return Err(SkillError::MissingItem(item));
        }

        if let Some(target) = target {
            if self.try_place_at(&item, target).await {
                return Ok(target);
            }
            debug!("Explicit target {} rejected, searching nearby", target);
        }

        let surfaces = self.ctx.world.find_blocks(
            &|b: &Block| !b.is_air(),
            self.config.fallback_radius,
            FALLBACK_CANDIDATES,
        );
        for surface in surfaces {
            let top = surface + BlockPos::UP;
            if self.try_place_at(&item, top).await {
                return Ok(top);
            }
        }

        self.ctx.say(&SkillError::NoPlacement.status_line());
        Err(SkillError::NoPlacement)
    }

    /// Try every valid reference around `target` until one placement works
    async fn try_place_at(&self, item: &str, target: BlockPos) -> bool {
        let world = self.ctx.world.as_ref();
        for PlacementReference { reference, face } in
            self.safety.placement_references(world, target)
        {
            let distance = world.position().distance_to(reference.pos.to_vec3());
            if distance > self.config.reach {
                let approach = Goal::Near {
                    pos: reference.pos.to_vec3(),
                    range: APPROACH_RANGE,
                };
                if let Err(e) = self.ctx.actions.travel_to(approach).await {
                    debug!("Could not reach {}: {}", reference.pos, e);
                    continue;
                }
            }

            match self.place_against(item, reference.pos, face).await {
                Ok(()) => {
                    self.record(target, item);
                    return true;
                }
                Err(e) => warn!("Placing {} at {} failed: {}", item, target, e),
            }
        }
        false
    }

    async fn place_against(
        &self,
        item: &str,
        reference: BlockPos,
        face: BlockPos,
    ) -> Result<(), PrimitiveError> {
        self.ctx.actions.equip(item, EquipSlot::Hand).await?;
        self.ctx.actions.place(reference, face).await
    }

    fn record(&self, pos: BlockPos, item: &str) {
        info!("Placed {} at {}", item, pos);
        self.safety.ledger().mark(PlacementRecord {
            pos,
            item_name: item.to_string(),
            placed_by: self.agent_name.clone(),
            timestamp_ms: self.ctx.clock.unix_millis(),
        });
    }

    /// Place `item` on the block the agent stands on
    ///
    /// # Errors
    ///
    /// [`SkillError::MissingItem`] when the item is not carried,
    /// [`SkillError::NoPlacement`] when the floor is not solid or the space
    /// above it is occupied.
    pub async fn place_near(&self, item: &str) -> Result<BlockPos, SkillError> {
        let world = self.ctx.world.as_ref();
        if world.find_item(item).is_none() {
            return Err(SkillError::MissingItem(item.to_string()));
        }

        let floor_pos = world.position().floored() + BlockPos::DOWN;
        let floor = world
            .block_at(floor_pos)
            .filter(|b| b.is_solid())
            .ok_or(SkillError::NoPlacement)?;
        let above = floor.pos + BlockPos::UP;
        let free = world.block_at(above).is_some_and(|b| !b.is_solid());
        if !free {
            return Err(SkillError::NoPlacement);
        }

        self.place_against(item, floor.pos, BlockPos::UP).await?;
        self.record(above, item);
        Ok(above)
    }

    /// Find a crafting table within reach, placing one if needed
    ///
    /// A table is crafted from the inventory first when none is carried.
    ///
    /// # Errors
    ///
    /// [`SkillError::NoCraftingTable`] when no table can be found, crafted or
    /// placed.
    pub async fn ensure_crafting_table(&self) -> Result<BlockPos, SkillError> {
        if let Some(pos) = self.nearby(&[CRAFTING_TABLE]) {
            return Ok(pos);
        }

        if self.ctx.world.find_item(CRAFTING_TABLE).is_none() {
            let recipe = self
                .ctx
                .world
                .recipe_for(CRAFTING_TABLE)
                .ok_or(SkillError::NoCraftingTable)?;
            if recipe.requires_table {
                return Err(SkillError::NoCraftingTable);
            }
            self.ctx
                .actions
                .craft(CRAFTING_TABLE, 1, None)
                .await
                .map_err(|e| {
                    debug!("Crafting a crafting table failed: {}", e);
                    SkillError::NoCraftingTable
                })?;
        }

        if let Err(e) = self.place_near(CRAFTING_TABLE).await {
            debug!("Placing a crafting table failed: {}", e);
        }
        self.nearby(&[CRAFTING_TABLE])
            .ok_or(SkillError::NoCraftingTable)
    }

    /// Closest block named one of `names` within the fallback radius
    fn nearby(&self, names: &[&str]) -> Option<BlockPos> {
        self.ctx
            .world
            .find_blocks(
                &|b: &Block| names.contains(&b.name.as_str()),
                self.config.fallback_radius,
                1,
            )
            .into_iter()
            .next()
    }

    /// Craft `count` of `item`
    ///
    /// Tools, tables and furnaces already carried are not crafted again.
    ///
    /// # Errors
    ///
    /// - [`SkillError::UnknownItem`] for names the registry doesn't know
    /// - [`SkillError::NoRecipe`] when no recipe is available
    /// - [`SkillError::NoCraftingTable`] when the recipe needs a table and
    ///   none can be provided
    /// - [`SkillError::Primitive`] when crafting itself fails
    pub async fn craft_item(&self, item: &str, count: u32) -> Result<(), SkillError> {
        let item = self.names.normalize(item);
        let count = count.max(1);
        info!("Requested craft: {} x{}", item, count);

        if SINGLETON_ITEMS.contains(&item.as_str()) && self.ctx.world.find_item(&item).is_some() {
            info!("Skipping craft {}, already have it", item);
            return Ok(());
        }

        let result = self.craft_checked(&item, count).await;
        match &result {
            Ok(()) => self.ctx.say(&format!("crafted {}", item)),
            Err(e) => self.ctx.say(&e.status_line()),
        }
        result
    }

    async fn craft_checked(&self, item: &str, count: u32) -> Result<(), SkillError> {
        if !self.ctx.world.item_known(item) {
            return Err(SkillError::UnknownItem(item.to_string()));
        }
        let recipe = self
            .ctx
            .world
            .recipe_for(item)
            .ok_or_else(|| SkillError::NoRecipe(item.to_string()))?;

        let station = if recipe.requires_table {
            let table = self.ensure_crafting_table().await?;
            self.ctx
                .actions
                .travel_to(Goal::Near {
                    pos: table.to_vec3(),
                    range: APPROACH_RANGE,
                })
                .await?;
            Some(table)
        } else {
            None
        };

        self.ctx.actions.craft(item, count, station).await?;
        Ok(())
    }

    /// Find a furnace nearby, placing one if needed
    ///
    /// A furnace is crafted first when none is carried. It goes underfoot
    /// when there is room, otherwise on any nearby surface.
    ///
    /// # Errors
    ///
    /// [`SkillError::NoFurnace`] when no furnace can be found, crafted or
    /// placed.
    pub async fn ensure_furnace(&self) -> Result<BlockPos, SkillError> {
        if let Some(pos) = self.nearby(FURNACE_BLOCKS) {
            return Ok(pos);
        }

        if self.ctx.world.find_item(FURNACE).is_none() {
            self.craft_checked(FURNACE, 1).await.map_err(|e| {
                debug!("Crafting a furnace failed: {}", e);
                SkillError::NoFurnace
            })?;
        }

        if let Err(e) = self.place_near(FURNACE).await {
            debug!("No room for a furnace underfoot ({}), searching nearby", e);
            if let Err(e) = self.place_block(FURNACE, None).await {
                debug!("Placing a furnace failed: {}", e);
            }
        }
        self.nearby(FURNACE_BLOCKS).ok_or(SkillError::NoFurnace)
    }

    /// Put up to `count` of `input` into a furnace with enough fuel for it
    ///
    /// Without an explicit `fuel` the first carried entry of the fuel table
    /// is burned, skipping `input` itself. One fuel item goes in per input
    /// item, as far as the stack allows. Output left from an earlier load is
    /// collected on the way.
    ///
    /// # Errors
    ///
    /// - [`SkillError::MissingItem`] when `input` is not carried
    /// - [`SkillError::NoFuel`] when no usable fuel is carried
    /// - [`SkillError::NoFurnace`] when no furnace can be found or placed
    /// - [`SkillError::Primitive`] when travelling or loading fails
    pub async fn smelt(
        &self,
        input: &str,
        fuel: Option<&str>,
        count: u32,
    ) -> Result<(), SkillError> {
        let input = self.names.normalize(input);
        info!("Requested smelt: {} x{}", input, count.max(1));

        let result = self.smelt_checked(&input, fuel, count).await;
        match &result {
            Ok(()) => self.ctx.say(&format!("put {} in the furnace", input)),
            Err(SkillError::MissingItem(item)) => {
                self.ctx.say(&format!("no {} for the furnace", item))
            }
            Err(e) => self.ctx.say(&e.status_line()),
        }
        result
    }

    async fn smelt_checked(
        &self,
        input: &str,
        fuel: Option<&str>,
        count: u32,
    ) -> Result<(), SkillError> {
        let world = self.ctx.world.as_ref();
        let stack = world
            .find_item(input)
            .ok_or_else(|| SkillError::MissingItem(input.to_string()))?;
        let input_count = count.max(1).min(stack.count);

        let fuel = match fuel {
            Some(name) => world.find_item(&self.names.normalize(name)),
            None => FUELS
                .iter()
                .filter(|f| **f != input)
                .find_map(|f| world.find_item(f)),
        }
        .ok_or(SkillError::NoFuel)?;
        let fuel_count = if fuel.name == input {
            // Burning part of the input stack itself
            let spare = fuel.count.saturating_sub(input_count);
            if spare == 0 {
                return Err(SkillError::NoFuel);
            }
            spare.min(input_count)
        } else {
            fuel.count.min(input_count)
        };

        let furnace = self.ensure_furnace().await?;
        self.ctx
            .actions
            .travel_to(Goal::Near {
                pos: furnace.to_vec3(),
                range: APPROACH_RANGE,
            })
            .await?;

        info!(
            "Loading furnace at {}: {} x{}, {} x{}",
            furnace, input, input_count, fuel.name, fuel_count
        );
        self.ctx
            .actions
            .smelt(furnace, input, input_count, &fuel.name, fuel_count)
            .await?;
        Ok(())
    }

    /// Eat `item`, or the first edible item carried
    ///
    /// # Errors
    ///
    /// [`SkillError::MissingItem`] when there is nothing to eat.
    pub async fn eat(&self, item: Option<&str>) -> Result<(), SkillError> {
        let world: &dyn WorldView = self.ctx.world.as_ref();
        let food = match item {
            Some(name) => world.find_item(&self.names.normalize(name)),
            None => world.inventory().into_iter().find(|s| s.is_edible()),
        };
        let Some(food) = food else {
            self.ctx.say("nothing to eat");
            return Err(SkillError::MissingItem(item.unwrap_or("food").to_string()));
        };

        self.ctx.actions.equip(&food.name, EquipSlot::Hand).await?;
        self.ctx.actions.consume().await?;
        Ok(())
    }
}
