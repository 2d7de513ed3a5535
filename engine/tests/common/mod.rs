//! Shared fixtures for the integration tests
#![allow(dead_code)]

use kestrel_engine::clock::{Clock, ManualClock};
use kestrel_engine::config::Config;
use kestrel_engine::context::AgentContext;
use kestrel_engine::message_bus::{Event, EventType, MessageBus};
use kestrel_engine::scheduler::{Scheduler, TickReport};
use kestrel_engine::sim::SimWorld;
use sdk::{Block, BlockPos};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Config with every default filled in
pub fn default_config() -> Config {
    Config::from_toml_str("[core]\n").unwrap()
}

/// A simulated world wired to a scheduler with a manual clock
pub struct Harness {
    pub world: Arc<SimWorld>,
    pub clock: Arc<ManualClock>,
    pub bus: MessageBus,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&default_config())
    }

    pub fn with_config(config: &Config) -> Self {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let ctx =
            AgentContext::from_adapter(Arc::clone(&world), Arc::clone(&clock) as Arc<dyn Clock>);
        let bus = MessageBus::new();
        let scheduler =
            Scheduler::from_config(ctx, world.ledger().clone(), config, bus.clone(), Some(7));
        Self {
            world,
            clock,
            bus,
            scheduler,
        }
    }

    /// Run one tick and let any primitive it spawned finish
    pub async fn tick(&mut self) -> TickReport {
        let report = self.scheduler.tick().await;
        tokio::task::yield_now().await;
        report
    }

    /// Advance the clock, then tick
    pub async fn tick_after(&mut self, ms: u64) -> TickReport {
        self.clock.advance_ms(ms);
        self.tick().await
    }

    /// Tick until the executor reports a non-busy status or `limit` ticks pass
    pub async fn run_until_done(&mut self, limit: usize) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..limit {
            let report = self.tick_after(50).await;
            reports.push(report);
            if matches!(report, TickReport::Ran(status) if !status.is_busy()) {
                break;
            }
        }
        reports
    }

    pub async fn subscribe_all(&self) -> mpsc::Receiver<Event> {
        self.bus.subscribe(EventType::All).await
    }
}

/// Everything currently buffered on a subscription
pub fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A log with a leaf block two above it, so it reads as natural
pub fn plant_tree(world: &SimWorld, base: BlockPos, log: &str) {
    world.set_block(Block::solid(log, base));
    world.set_block(Block::solid("oak_leaves", base.offset(0, 2, 0)));
}

/// A crop block at `pos` on farmland
pub fn plant_crop(world: &SimWorld, pos: BlockPos, crop: &str, age: u32) {
    world.set_block(Block::solid("farmland", pos + BlockPos::DOWN));
    world.set_block(Block::passable(crop, pos).with_property("age", age.to_string()));
}
