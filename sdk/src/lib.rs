//! Kestrel SDK
//!
//! Shared contract between the Kestrel engine and the game-side adapter.
//! The engine never talks to a game client directly: everything it knows
//! about the world comes through [`WorldView`], and everything it does goes
//! through [`ActionPrimitives`].

/// Error types and handling
pub mod errors;

/// World value types (positions, blocks, entities, items)
pub mod types;

/// Read-only world view
pub mod world;

/// Action primitives and status output
pub mod primitives;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt, PrimitiveError};
pub use primitives::{ActionPrimitives, StatusSink};
pub use types::{
    Block, BlockPos, BoundingBox, Control, Entity, EntityKind, EquipSlot, Goal, ItemStack,
    PlayerInfo, Recipe, Vec3,
};
pub use world::WorldView;
