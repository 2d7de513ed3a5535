//! Shared collaborator handles
//!
//! Every arbiter in the engine talks to the same four collaborators: the
//! world view, the action primitives, the status sink and the clock.
//! [`AgentContext`] bundles them so they are wired once and cloned cheaply.

use sdk::{ActionPrimitives, StatusSink, WorldView};
use std::sync::Arc;

use crate::clock::Clock;

/// Handles to the game adapter and the time source
#[derive(Clone)]
pub struct AgentContext {
    /// Read-only world state, polled per decision
    pub world: Arc<dyn WorldView>,

    /// Movement, digging, placing, crafting
    pub actions: Arc<dyn ActionPrimitives>,

    /// Best-effort status lines
    pub status: Arc<dyn StatusSink>,

    pub clock: Arc<dyn Clock>,
}

impl AgentContext {
    pub fn new(
        world: Arc<dyn WorldView>,
        actions: Arc<dyn ActionPrimitives>,
        status: Arc<dyn StatusSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            world,
            actions,
            status,
            clock,
        }
    }

    /// Context backed by one adapter that implements all three traits
    pub fn from_adapter<A>(adapter: Arc<A>, clock: Arc<dyn Clock>) -> Self
    where
        A: WorldView + ActionPrimitives + StatusSink + 'static,
    {
        Self {
            world: Arc::clone(&adapter) as Arc<dyn WorldView>,
            actions: Arc::clone(&adapter) as Arc<dyn ActionPrimitives>,
            status: adapter as Arc<dyn StatusSink>,
            clock,
        }
    }

    /// Send a status line
    pub fn say(&self, line: &str) {
        self.status.say(line);
    }
}
