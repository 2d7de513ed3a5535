//! World value types
//!
//! Plain data shared between the engine and the game adapter. Positions come
//! in two flavours: [`Vec3`] for continuous entity coordinates and
//! [`BlockPos`] for integer block coordinates (also used as face vectors).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Sub};

/// Continuous world coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Vec3) -> f64 {
        let d = *self - other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    pub fn normalize(&self) -> Vec3 {
        let len = self.length();
        if len == 0.0 {
            return *self;
        }
        Vec3::new(self.x / len, self.y / len, self.z / len)
    }

    pub fn scaled(&self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Block containing this point
    pub fn floored(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Integer block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const UP: BlockPos = BlockPos::new(0, 1, 0);
    pub const DOWN: BlockPos = BlockPos::new(0, -1, 0);

    /// The six axis-aligned unit offsets
    pub const FACES: [BlockPos; 6] = [
        BlockPos::new(1, 0, 0),
        BlockPos::new(-1, 0, 0),
        BlockPos::new(0, 0, 1),
        BlockPos::new(0, 0, -1),
        BlockPos::new(0, 1, 0),
        BlockPos::new(0, -1, 0),
    ];

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> BlockPos {
        BlockPos::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// |dx| + |dy| + |dz|
    pub fn manhattan(&self) -> i32 {
        self.x.abs() + self.y.abs() + self.z.abs()
    }

    /// max(|dx|, |dy|, |dz|) between two positions
    pub fn chebyshev_to(&self, other: BlockPos) -> i32 {
        let d = *self - other;
        d.x.abs().max(d.y.abs()).max(d.z.abs())
    }

    /// Centre of the block in continuous coordinates
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    /// Corner of the block in continuous coordinates
    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl Add for BlockPos {
    type Output = BlockPos;

    fn add(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = BlockPos;

    fn sub(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Collision shape of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundingBox {
    /// Nothing to stand on or place against (air, flowers, water)
    Empty,
    /// A solid block
    Block,
}

/// A block as observed in the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub pos: BlockPos,
    pub bounding_box: BoundingBox,
    /// Block state properties (e.g. `age` for crops)
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Block {
    /// A solid block with no properties
    pub fn solid(name: impl Into<String>, pos: BlockPos) -> Self {
        Self {
            name: name.into(),
            pos,
            bounding_box: BoundingBox::Block,
            properties: HashMap::new(),
        }
    }

    /// An air block
    pub fn air(pos: BlockPos) -> Self {
        Self {
            name: "air".to_string(),
            pos,
            bounding_box: BoundingBox::Empty,
            properties: HashMap::new(),
        }
    }

    /// A non-solid block such as a crop
    pub fn passable(name: impl Into<String>, pos: BlockPos) -> Self {
        Self {
            name: name.into(),
            pos,
            bounding_box: BoundingBox::Empty,
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Air-equivalent: `air`, `cave_air`, `void_air`
    pub fn is_air(&self) -> bool {
        self.name.ends_with("air")
    }

    pub fn is_solid(&self) -> bool {
        self.bounding_box == BoundingBox::Block
    }

    /// Growth stage for crops; missing or malformed reads as 0
    pub fn age(&self) -> u32 {
        self.properties
            .get("age")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Broad entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    /// Hostile or neutral mob
    Mob,
    /// Dropped items, projectiles, vehicles
    Object,
    Other,
}

/// An entity near the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    pub name: String,
    pub kind: EntityKind,
    pub position: Vec3,
    #[serde(default)]
    pub username: Option<String>,
}

impl Entity {
    /// Name used to refer to the entity in status lines and follow history
    pub fn label(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.name)
    }
}

/// A known player, possibly out of render distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub username: String,
    /// Present when the player's entity is loaded
    pub entity: Option<Entity>,
}

/// An inventory stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub count: u32,
    /// Food points restored when eaten; zero for inedible items
    #[serde(default)]
    pub food: u32,
}

impl ItemStack {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            food: 0,
        }
    }

    pub fn food(name: impl Into<String>, count: u32, food: u32) -> Self {
        Self {
            name: name.into(),
            count,
            food,
        }
    }

    pub fn is_edible(&self) -> bool {
        self.food > 0
    }
}

/// Crafting recipe as resolved by the game adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub item: String,
    pub requires_table: bool,
}

/// Movement goal handed to the pathfinder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Goal {
    /// Get within `range` of a point
    Near { pos: Vec3, range: f64 },
    /// Stand on a specific block
    Block(BlockPos),
    /// Keep within `range` of a moving entity
    Follow { entity_id: u64, range: f64 },
}

/// Equipment destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipSlot {
    Hand,
    OffHand,
}

/// Raw locomotion controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Control {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Sprint,
    Sneak,
}
