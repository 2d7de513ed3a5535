//! Seeded starting worlds for the `simulate` command

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdk::{Block, BlockPos, Vec3, WorldView};

use super::SimWorld;
use crate::task::{crop_maturity, TaskSpec};

const GROUND_Y: i32 = 63;
const WORLD_SIZE: i32 = 40;

/// Kind of world to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Grass with scattered oak and birch trees
    Forest,
    /// Exposed stone with ore veins and a small hut
    Quarry,
    /// Farmland rows of crops at mixed growth stages
    Farm,
    /// Open field with a few zombies
    Field,
}

impl Scenario {
    /// The world a task of this kind makes sense in
    pub fn for_task(spec: &TaskSpec) -> Self {
        match spec {
            TaskSpec::Mine { .. } => Scenario::Quarry,
            TaskSpec::GatherWood { .. } => Scenario::Forest,
            TaskSpec::Farm { .. } => Scenario::Farm,
            TaskSpec::Defend { .. } => Scenario::Field,
        }
    }

    /// Build the world; the same seed always yields the same world
    pub fn build(self, seed: u64) -> SimWorld {
        let mut rng = StdRng::seed_from_u64(seed);
        let world = SimWorld::new();
        world.set_position(Vec3::new(0.5, (GROUND_Y + 1) as f64, 0.5));

        match self {
            Scenario::Forest => {
                world.fill_floor("grass_block", GROUND_Y, WORLD_SIZE);
                for _ in 0..12 {
                    let x = rng.gen_range(-15..=15);
                    let z = rng.gen_range(-15..=15);
                    let species = if rng.gen_bool(0.7) { "oak" } else { "birch" };
                    let height = rng.gen_range(4..=5);
                    plant_tree(&world, BlockPos::new(x, GROUND_Y + 1, z), species, height);
                }
            }
            Scenario::Quarry => {
                world.fill_floor("stone", GROUND_Y, WORLD_SIZE);
                for _ in 0..30 {
                    let x = rng.gen_range(-18..=18);
                    let z = rng.gen_range(-18..=18);
                    let ore = match rng.gen_range(0..10) {
                        0 => "diamond_ore",
                        1..=3 => "iron_ore",
                        _ => "coal_ore",
                    };
                    let pos = BlockPos::new(x, GROUND_Y, z);
                    world.set_block(Block::solid(ore, pos));
                }
                build_hut(&world, BlockPos::new(8, GROUND_Y + 1, 8));
            }
            Scenario::Farm => {
                world.fill_floor("dirt", GROUND_Y, WORLD_SIZE);
                let crops = ["wheat", "carrots", "potatoes", "beetroots"];
                for (row, crop) in crops.iter().enumerate() {
                    for x in -6..=6 {
                        let soil = BlockPos::new(x, GROUND_Y, 2 + row as i32 * 2);
                        world.set_block(Block::solid("farmland", soil));
                        let age = rng.gen_range(0..=7u32).min(crop_maturity(crop));
                        world.set_block(
                            Block::passable(*crop, soil + BlockPos::UP)
                                .with_property("age", age.to_string()),
                        );
                    }
                }
                world.give("wheat_seeds", 8);
                world.give("beetroot_seeds", 4);
            }
            Scenario::Field => {
                world.fill_floor("grass_block", GROUND_Y, WORLD_SIZE);
                for _ in 0..3 {
                    let x = rng.gen_range(-8.0..8.0);
                    let z = rng.gen_range(-8.0..8.0);
                    world.add_mob("zombie", Vec3::new(x, (GROUND_Y + 1) as f64, z));
                }
            }
        }
        world
    }
}

fn plant_tree(world: &SimWorld, base: BlockPos, species: &str, height: i32) {
    let log = format!("{}_log", species);
    let leaves = format!("{}_leaves", species);
    for dy in 0..height {
        world.set_block(Block::solid(log.as_str(), base.offset(0, dy, 0)));
    }
    let crown = base.offset(0, height, 0);
    for dx in -1..=1 {
        for dz in -1..=1 {
            for dy in -3..=1 {
                let pos = crown.offset(dx, dy, dz);
                if world.block_at(pos).is_some_and(|b| b.is_air()) {
                    world.set_block(Block::solid(leaves.as_str(), pos));
                }
            }
        }
    }
}

fn build_hut(world: &SimWorld, corner: BlockPos) {
    for dx in 0..4 {
        for dz in 0..4 {
            let edge = dx == 0 || dx == 3 || dz == 0 || dz == 3;
            if !edge {
                continue;
            }
            for dy in 0..3 {
                world.set_block(Block::solid("oak_planks", corner.offset(dx, dy, dz)));
            }
        }
    }
}
