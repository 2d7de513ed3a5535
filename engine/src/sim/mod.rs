//! In-process world simulator
//!
//! [`SimWorld`] implements the three adapter traits against a sparse block
//! map, an entity list and an inventory. It backs the `simulate` command and
//! every test in the crate. It is small: no physics, no
//! pathfinding (travel teleports), one hit kills, and recipes don't consume
//! ingredients.
//!
//! Positions that were never set read as air. Primitives complete without
//! awaiting anything unless the gate is closed with
//! [`SimWorld::set_gate_open`], so a single `yield_now` after a tick is
//! enough for a spawned primitive to finish on a current-thread runtime.

pub mod scenario;

pub use scenario::Scenario;

use async_trait::async_trait;
use sdk::errors::PrimitiveError;
use sdk::{
    ActionPrimitives, Block, BlockPos, Control, Entity, EntityKind, EquipSlot, Goal, ItemStack,
    PlayerInfo, Recipe, StatusSink, Vec3, WorldView,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

use crate::placement::PlacementLedger;

/// Item names the simulated registry always knows
const KNOWN_ITEMS: &[&str] = &[
    "stone",
    "cobblestone",
    "dirt",
    "grass_block",
    "sand",
    "gravel",
    "farmland",
    "coal_ore",
    "iron_ore",
    "gold_ore",
    "diamond_ore",
    "oak_log",
    "birch_log",
    "spruce_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
    "oak_leaves",
    "birch_leaves",
    "oak_planks",
    "stick",
    "crafting_table",
    "furnace",
    "coal",
    "charcoal",
    "raw_iron",
    "iron_ingot",
    "raw_gold",
    "gold_ingot",
    "glass",
    "torch",
    "wooden_pickaxe",
    "stone_pickaxe",
    "iron_pickaxe",
    "shield",
    "wheat",
    "wheat_seeds",
    "potato",
    "carrot",
    "beetroot",
    "beetroot_seeds",
    "bread",
    "cooked_beef",
    "apple",
];

const MAX_FOOD: f32 = 20.0;

/// Item dropped when a block is broken
fn drop_for(block: &Block) -> String {
    match block.name.as_str() {
        "potatoes" => "potato".to_string(),
        "carrots" => "carrot".to_string(),
        "beetroots" => "beetroot".to_string(),
        "grass_block" => "dirt".to_string(),
        name => name.to_string(),
    }
}

/// What a furnace turns `input` into
fn smelted_from(input: &str) -> Option<&'static str> {
    match input {
        "raw_iron" | "iron_ore" => Some("iron_ingot"),
        "raw_gold" | "gold_ore" => Some("gold_ingot"),
        "sand" => Some("glass"),
        "cobblestone" => Some("stone"),
        "beef" => Some("cooked_beef"),
        name if name.ends_with("_log") => Some("charcoal"),
        _ => None,
    }
}

/// Block that grows from a planted item, if it is a seed
fn crop_for_seed(item: &str) -> Option<&'static str> {
    match item {
        "wheat_seeds" => Some("wheat"),
        "potato" => Some("potatoes"),
        "carrot" => Some("carrots"),
        "beetroot_seeds" => Some("beetroots"),
        _ => None,
    }
}

struct SimState {
    position: Vec3,
    blocks: HashMap<BlockPos, Block>,
    entities: Vec<Entity>,
    next_entity_id: u64,
    inventory: Vec<ItemStack>,
    health: f32,
    food: f32,
    extra_items: HashSet<String>,
    recipes: HashMap<String, Recipe>,
    furnaces: HashMap<BlockPos, ItemStack>,
    goal: Option<Goal>,
    goal_changes: usize,
    moving: bool,
    digging: bool,
    controls: HashSet<Control>,
    looking_at: Option<Vec3>,
    hand: Option<String>,
    off_hand: Option<String>,
    item_active: bool,
    said: Vec<String>,
    failures: VecDeque<PrimitiveError>,
    respawn_blocks: bool,
    calls: HashMap<&'static str, usize>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.5, 64.0, 0.5),
            blocks: HashMap::new(),
            entities: Vec::new(),
            next_entity_id: 1,
            inventory: Vec::new(),
            health: 20.0,
            food: MAX_FOOD,
            extra_items: HashSet::new(),
            recipes: HashMap::new(),
            furnaces: HashMap::new(),
            goal: None,
            goal_changes: 0,
            moving: false,
            digging: false,
            controls: HashSet::new(),
            looking_at: None,
            hand: None,
            off_hand: None,
            item_active: false,
            said: Vec::new(),
            failures: VecDeque::new(),
            respawn_blocks: false,
            calls: HashMap::new(),
        }
    }
}

impl SimState {
    fn add_item(&mut self, name: &str, count: u32) {
        match self.inventory.iter_mut().find(|s| s.name == name) {
            Some(stack) => stack.count += count,
            None => self.inventory.push(ItemStack::new(name, count)),
        }
    }

    /// Remove one of `name`; clears any slot holding the last one
    fn take_one(&mut self, name: &str) -> Option<ItemStack> {
        let index = self.inventory.iter().position(|s| s.name == name)?;
        let stack = &mut self.inventory[index];
        let taken = ItemStack {
            count: 1,
            ..stack.clone()
        };
        stack.count -= 1;
        if stack.count == 0 {
            self.inventory.remove(index);
            if self.hand.as_deref() == Some(name) {
                self.hand = None;
            }
            if self.off_hand.as_deref() == Some(name) {
                self.off_hand = None;
            }
        }
        Some(taken)
    }

    fn carried(&self, name: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.count)
            .sum()
    }

    /// Remove `count` of `name`, or nothing if fewer are carried
    fn take(&mut self, name: &str, count: u32) -> Result<(), PrimitiveError> {
        let carried = self.carried(name);
        if carried < count {
            return Err(PrimitiveError::NoItem(format!(
                "{} x{} (have {})",
                name, count, carried
            )));
        }
        for _ in 0..count {
            self.take_one(name);
        }
        Ok(())
    }

    fn block(&self, pos: BlockPos) -> Block {
        self.blocks
            .get(&pos)
            .cloned()
            .unwrap_or_else(|| Block::air(pos))
    }

    /// Count a primitive call and pop any scripted failure
    fn begin(&mut self, call: &'static str) -> Result<(), PrimitiveError> {
        *self.calls.entry(call).or_insert(0) += 1;
        match self.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn break_block(&mut self, block: &Block) -> Result<(), PrimitiveError> {
        let live = self.block(block.pos);
        if live.is_air() || live.name != block.name {
            return Err(PrimitiveError::TargetGone(format!(
                "{} at {}",
                block.name, block.pos
            )));
        }
        if !self.respawn_blocks {
            self.blocks.remove(&block.pos);
        }
        let drop = drop_for(&live);
        self.add_item(&drop, 1);
        if live.name == "wheat" {
            self.add_item("wheat_seeds", 1);
        }
        Ok(())
    }
}

/// A deterministic, in-memory game adapter
pub struct SimWorld {
    state: Mutex<SimState>,
    ledger: PlacementLedger,
    gate: watch::Sender<bool>,
}

impl SimWorld {
    /// An empty world with the agent standing at (0.5, 64, 0.5)
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(SimState::default()),
            ledger: PlacementLedger::new(),
            gate,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Placement records shared with the safety filter
    pub fn ledger(&self) -> &PlacementLedger {
        &self.ledger
    }

    // World setup

    pub fn set_block(&self, block: Block) {
        self.state().blocks.insert(block.pos, block);
    }

    pub fn clear_block(&self, pos: BlockPos) {
        self.state().blocks.remove(&pos);
    }

    /// A flat `size`×`size` floor of `name` at height `y`, centred on the origin
    pub fn fill_floor(&self, name: &str, y: i32, size: i32) {
        let half = size / 2;
        let mut state = self.state();
        for x in -half..=half {
            for z in -half..=half {
                let pos = BlockPos::new(x, y, z);
                state.blocks.insert(pos, Block::solid(name, pos));
            }
        }
    }

    pub fn set_position(&self, position: Vec3) {
        self.state().position = position;
    }

    /// Add a player and return its entity id
    pub fn add_player(&self, username: &str, position: Vec3) -> u64 {
        let mut state = self.state();
        let id = state.next_entity_id;
        state.next_entity_id += 1;
        state.entities.push(Entity {
            id,
            name: "player".to_string(),
            kind: EntityKind::Player,
            position,
            username: Some(username.to_string()),
        });
        id
    }

    /// Add a mob and return its entity id
    pub fn add_mob(&self, name: &str, position: Vec3) -> u64 {
        let mut state = self.state();
        let id = state.next_entity_id;
        state.next_entity_id += 1;
        state.entities.push(Entity {
            id,
            name: name.to_string(),
            kind: EntityKind::Mob,
            position,
            username: None,
        });
        id
    }

    pub fn move_entity(&self, id: u64, position: Vec3) {
        if let Some(entity) = self.state().entities.iter_mut().find(|e| e.id == id) {
            entity.position = position;
        }
    }

    pub fn remove_entity(&self, id: u64) {
        self.state().entities.retain(|e| e.id != id);
    }

    /// Add to the inventory
    pub fn give(&self, name: &str, count: u32) {
        self.state().add_item(name, count);
    }

    /// Add an edible stack restoring `food` points per item
    pub fn give_food(&self, name: &str, count: u32, food: u32) {
        self.state().inventory.push(ItemStack::food(name, count, food));
    }

    pub fn set_inventory(&self, inventory: Vec<ItemStack>) {
        self.state().inventory = inventory;
    }

    pub fn set_health(&self, health: f32) {
        self.state().health = health;
    }

    pub fn set_food(&self, food: f32) {
        self.state().food = food;
    }

    pub fn add_recipe(&self, item: &str, requires_table: bool) {
        self.state().recipes.insert(
            item.to_string(),
            Recipe {
                item: item.to_string(),
                requires_table,
            },
        );
    }

    /// Make the registry know an item outside the built-in list
    pub fn add_known_item(&self, name: &str) {
        self.state().extra_items.insert(name.to_string());
    }

    pub fn set_moving(&self, moving: bool) {
        self.state().moving = moving;
    }

    pub fn set_digging(&self, digging: bool) {
        self.state().digging = digging;
    }

    /// Fail the next primitive call with `error`. Queued failures are used
    /// in order.
    pub fn fail_next(&self, error: PrimitiveError) {
        self.state().failures.push_back(error);
    }

    /// Broken blocks stay in place, so a single log can be collected forever
    pub fn set_respawn_blocks(&self, respawn: bool) {
        self.state().respawn_blocks = respawn;
    }

    /// Close the gate to hold every primitive before it takes effect
    pub fn set_gate_open(&self, open: bool) {
        self.gate.send_replace(open);
    }

    // Observations

    pub fn current_goal(&self) -> Option<Goal> {
        self.state().goal.clone()
    }

    /// Number of `set_goal` calls so far
    pub fn goal_changes(&self) -> usize {
        self.state().goal_changes
    }

    /// Status lines, oldest first
    pub fn said(&self) -> Vec<String> {
        self.state().said.clone()
    }

    pub fn control_active(&self, control: Control) -> bool {
        self.state().controls.contains(&control)
    }

    pub fn looking_at(&self) -> Option<Vec3> {
        self.state().looking_at
    }

    pub fn item_active(&self) -> bool {
        self.state().item_active
    }

    pub fn held_item(&self) -> Option<String> {
        self.state().hand.clone()
    }

    pub fn off_hand_item(&self) -> Option<String> {
        self.state().off_hand.clone()
    }

    /// Finished output waiting in the furnace at `pos`
    pub fn furnace_output(&self, pos: BlockPos) -> Option<ItemStack> {
        self.state().furnaces.get(&pos).cloned()
    }

    /// How many times the named primitive was called (e.g. `"collect"`)
    pub fn calls(&self, primitive: &str) -> usize {
        self.state().calls.get(primitive).copied().unwrap_or(0)
    }

    async fn pass_gate(&self) {
        let mut rx = self.gate.subscribe();
        if rx.wait_for(|open| *open).await.is_err() {
            debug!("Simulator gate dropped");
        }
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldView for SimWorld {
    fn position(&self) -> Vec3 {
        self.state().position
    }

    fn block_at(&self, pos: BlockPos) -> Option<Block> {
        Some(self.state().block(pos))
    }

    fn find_blocks(
        &self,
        matching: &dyn Fn(&Block) -> bool,
        max_distance: f64,
        count: usize,
    ) -> Vec<BlockPos> {
        let state = self.state();
        let origin = state.position;
        let mut hits: Vec<(f64, BlockPos)> = state
            .blocks
            .values()
            .filter(|b| matching(b))
            .map(|b| (b.pos.center().distance_to(origin), b.pos))
            .filter(|(d, _)| *d <= max_distance)
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().take(count).map(|(_, pos)| pos).collect()
    }

    fn entities(&self) -> Vec<Entity> {
        self.state().entities.clone()
    }

    fn players(&self) -> Vec<PlayerInfo> {
        self.state()
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Player)
            .map(|e| PlayerInfo {
                username: e.label().to_string(),
                entity: Some(e.clone()),
            })
            .collect()
    }

    fn inventory(&self) -> Vec<ItemStack> {
        self.state().inventory.clone()
    }

    fn health(&self) -> f32 {
        self.state().health
    }

    fn food(&self) -> f32 {
        self.state().food
    }

    fn item_known(&self, name: &str) -> bool {
        KNOWN_ITEMS.contains(&name) || self.state().extra_items.contains(name)
    }

    fn recipe_for(&self, item: &str) -> Option<Recipe> {
        self.state().recipes.get(item).cloned()
    }
}

#[async_trait]
impl ActionPrimitives for SimWorld {
    async fn travel_to(&self, goal: Goal) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("travel_to")?;
        let destination = match goal {
            Goal::Near { pos, .. } => pos,
            Goal::Block(pos) => pos.center(),
            Goal::Follow { entity_id, .. } => state
                .entities
                .iter()
                .find(|e| e.id == entity_id)
                .map(|e| e.position)
                .ok_or_else(|| PrimitiveError::TargetGone(format!("entity {}", entity_id)))?,
        };
        state.position = destination;
        Ok(())
    }

    fn set_goal(&self, goal: Option<Goal>) {
        let mut state = self.state();
        state.goal = goal;
        state.goal_changes += 1;
    }

    fn is_moving(&self) -> bool {
        self.state().moving
    }

    fn is_digging(&self) -> bool {
        self.state().digging
    }

    async fn collect(&self, block: &Block) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("collect")?;
        state.break_block(block)?;
        debug!("Sim collected {} at {}", block.name, block.pos);
        Ok(())
    }

    async fn dig(&self, block: &Block) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("dig")?;
        state.break_block(block)
    }

    async fn place(&self, reference: BlockPos, face: BlockPos) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("place")?;

        let item = state
            .hand
            .clone()
            .ok_or_else(|| PrimitiveError::NoItem("nothing in hand".to_string()))?;
        if !state.block(reference).is_solid() {
            return Err(PrimitiveError::Other(format!(
                "nothing to place against at {}",
                reference
            )));
        }
        let target = reference + face;
        if !state.block(target).is_air() {
            return Err(PrimitiveError::Other(format!("{} is occupied", target)));
        }

        state.take_one(&item);
        let block = match crop_for_seed(&item) {
            Some(crop) => Block::passable(crop, target).with_property("age", "0"),
            None => Block::solid(item.as_str(), target),
        };
        state.blocks.insert(target, block);
        Ok(())
    }

    async fn craft(
        &self,
        item: &str,
        count: u32,
        station: Option<BlockPos>,
    ) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("craft")?;

        let recipe = state
            .recipes
            .get(item)
            .cloned()
            .ok_or_else(|| PrimitiveError::Other(format!("no recipe for {}", item)))?;
        if recipe.requires_table {
            let at_table = station.is_some_and(|pos| state.block(pos).name == "crafting_table");
            if !at_table {
                return Err(PrimitiveError::Other(format!(
                    "{} needs a crafting table",
                    item
                )));
            }
        }
        state.add_item(item, count);
        Ok(())
    }

    async fn smelt(
        &self,
        furnace: BlockPos,
        input: &str,
        input_count: u32,
        fuel: &str,
        fuel_count: u32,
    ) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("smelt")?;

        let name = state.block(furnace).name;
        if name != "furnace" && name != "lit_furnace" {
            return Err(PrimitiveError::TargetGone(format!("furnace at {}", furnace)));
        }
        let fuel_needed = if fuel == input {
            fuel_count + input_count
        } else {
            fuel_count
        };
        if state.carried(fuel) < fuel_needed {
            return Err(PrimitiveError::NoItem(fuel.to_string()));
        }
        state.take(input, input_count)?;
        state.take(fuel, fuel_count)?;
        if let Some(done) = state.furnaces.remove(&furnace) {
            state.add_item(&done.name, done.count);
        }

        // Smelting is instant here; the result waits for the next visit
        if let Some(output) = smelted_from(input) {
            state
                .furnaces
                .insert(furnace, ItemStack::new(output, input_count));
        }
        Ok(())
    }

    async fn equip(&self, item: &str, slot: EquipSlot) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("equip")?;
        if !state.inventory.iter().any(|s| s.name == item) {
            return Err(PrimitiveError::NoItem(item.to_string()));
        }
        match slot {
            EquipSlot::Hand => state.hand = Some(item.to_string()),
            EquipSlot::OffHand => state.off_hand = Some(item.to_string()),
        }
        Ok(())
    }

    async fn consume(&self) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("consume")?;
        let held = state
            .hand
            .clone()
            .ok_or_else(|| PrimitiveError::NoItem("food".to_string()))?;
        let eaten = state
            .take_one(&held)
            .filter(|s| s.is_edible())
            .ok_or_else(|| PrimitiveError::NoItem(held.clone()))?;
        state.food = (state.food + eaten.food as f32).min(MAX_FOOD);
        Ok(())
    }

    async fn attack(&self, entity_id: u64) -> Result<(), PrimitiveError> {
        self.pass_gate().await;
        let mut state = self.state();
        state.begin("attack")?;
        let before = state.entities.len();
        state.entities.retain(|e| e.id != entity_id);
        if state.entities.len() == before {
            return Err(PrimitiveError::TargetGone(format!("entity {}", entity_id)));
        }
        Ok(())
    }

    fn look_at(&self, target: Vec3) {
        self.state().looking_at = Some(target);
    }

    fn set_control(&self, control: Control, active: bool) {
        let mut state = self.state();
        if active {
            state.controls.insert(control);
        } else {
            state.controls.remove(&control);
        }
    }

    fn activate_item(&self, _off_hand: bool) {
        self.state().item_active = true;
    }

    fn deactivate_item(&self) {
        self.state().item_active = false;
    }
}

impl StatusSink for SimWorld {
    fn say(&self, line: &str) {
        debug!("Sim chat: {}", line);
        self.state().said.push(line.to_string());
    }
}
