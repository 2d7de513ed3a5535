//! Reflexes
//!
//! Reflexes run before the task executor on every event and may preempt it.
//! There are two:
//!
//! - **Health**: when both health and food are low, eat the first edible
//!   item. Rate limited by the `auto_eat` cooldown.
//! - **Threat**: when a dangerous mob (a creeper by default) is within
//!   `threat_radius`, stop the active task, drop the movement goal, face the
//!   threat, back off at a sprint and raise a shield if one is carried. The
//!   controls are released once the panic window has passed.
//!
//! # Error policy
//!
//! Nothing here returns an error. Every sub-step (equip, consume, activate)
//! logs its failure and the reflex carries on.

use sdk::errors::PrimitiveError;
use sdk::{Control, Entity, EquipSlot, Vec3};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReflexConfig;
use crate::context::AgentContext;
use crate::cooldown::{Cooldowns, AUTO_EAT};
use crate::message_bus::{Event, MessageBus};
use crate::task::TaskExecutor;

/// Off-hand item raised during the panic maneuver
const SHIELD: &str = "shield";

/// Whether the task executor may run this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflexOutcome {
    Clear,
    Preempted,
}

/// An escape in progress
#[derive(Debug, Clone, PartialEq)]
pub struct PanicManeuver {
    pub threat: Entity,
    /// Point `escape_distance` away from the threat, directly behind the agent
    pub escape: Vec3,
    pub until: Instant,
}

/// Health and threat reflexes for one agent
pub struct ReflexArbiter {
    ctx: AgentContext,
    config: ReflexConfig,
    cooldowns: Cooldowns,
    bus: Option<MessageBus>,
    panic: Option<PanicManeuver>,
    shield: Option<JoinHandle<()>>,
    eating: Option<JoinHandle<Result<(), PrimitiveError>>>,
}

impl ReflexArbiter {
    pub fn new(ctx: AgentContext, config: ReflexConfig) -> Self {
        Self {
            ctx,
            config,
            cooldowns: Cooldowns::new(),
            bus: None,
            panic: None,
            shield: None,
            eating: None,
        }
    }

    /// Publish `ReflexFired` events on `bus`
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The escape currently holding the controls, if any
    pub fn panic(&self) -> Option<&PanicManeuver> {
        self.panic.as_ref()
    }

    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    /// Run the threat reflex for one world tick
    ///
    /// Returns [`ReflexOutcome::Preempted`] while a panic maneuver holds the
    /// controls; the executor must not run on those ticks.
    pub async fn on_tick(&mut self, executor: &mut TaskExecutor) -> ReflexOutcome {
        self.poll_eating();
        let now = self.ctx.clock.now();

        if let Some(maneuver) = &self.panic {
            if now < maneuver.until {
                return ReflexOutcome::Preempted;
            }
            self.release();
        }

        let Some(threat) = self.nearest_threat() else {
            return ReflexOutcome::Clear;
        };

        self.start_panic(executor, threat, now).await;
        ReflexOutcome::Preempted
    }

    /// Run the health reflex
    ///
    /// Returns `true` when an eat attempt was started.
    pub async fn on_health(&mut self) -> bool {
        self.poll_eating();
        if self.eating.is_some() {
            return false;
        }

        let world = &self.ctx.world;
        if world.health() >= self.config.low_health || world.food() >= self.config.low_food {
            return false;
        }
        let now = self.ctx.clock.now();
        if !self
            .cooldowns
            .ready(AUTO_EAT, self.config.eat_cooldown(), now)
        {
            return false;
        }

        let Some(food) = world.inventory().into_iter().find(|s| s.is_edible()) else {
            debug!("Low health but nothing to eat");
            return false;
        };

        info!(
            "Reflex: low health ({:.1}), eating {}",
            world.health(),
            food.name
        );
        let actions = Arc::clone(&self.ctx.actions);
        let item = food.name.clone();
        self.eating = Some(tokio::spawn(async move {
            actions.equip(&item, EquipSlot::Hand).await?;
            actions.consume().await
        }));

        self.emit(Event::ReflexFired {
            reflex: AUTO_EAT.to_string(),
            detail: food.name,
        })
        .await;
        true
    }

    /// Collect a finished eat attempt; success starts the cooldown
    fn poll_eating(&mut self) {
        let finished = self.eating.as_ref().is_some_and(|h| h.is_finished());
        if !finished {
            return;
        }
        let Some(handle) = self.eating.take() else {
            return;
        };
        match futures::FutureExt::now_or_never(handle) {
            Some(Ok(Ok(()))) => self.cooldowns.mark(AUTO_EAT, self.ctx.clock.now()),
            Some(Ok(Err(e))) => debug!("Auto-eat failed: {}", e),
            Some(Err(e)) => warn!("Auto-eat task ended abnormally: {}", e),
            None => {}
        }
    }

    fn nearest_threat(&self) -> Option<Entity> {
        let origin = self.ctx.world.position();
        let threats = &self.config.threats;
        let radius = self.config.threat_radius;
        self.ctx.world.nearest_entity(&|e: &Entity| {
            threats.iter().any(|t| *t == e.name) && e.position.distance_to(origin) < radius
        })
    }

    async fn start_panic(&mut self, executor: &mut TaskExecutor, threat: Entity, now: Instant) {
        warn!("Reflex: {} within {:.1} blocks", threat.name, self.config.threat_radius);

        executor.stop_task().await;
        self.ctx.actions.set_goal(None);

        let position = self.ctx.world.position();
        let away = (position - threat.position).normalize();
        let escape = position + away.scaled(self.config.escape_distance);

        let actions = &self.ctx.actions;
        actions.look_at(threat.position);
        actions.set_control(Control::Back, true);
        actions.set_control(Control::Sprint, true);

        if self.ctx.world.find_item(SHIELD).is_some() {
            let actions = Arc::clone(&self.ctx.actions);
            self.shield = Some(tokio::spawn(async move {
                match actions.equip(SHIELD, EquipSlot::OffHand).await {
                    Ok(()) => actions.activate_item(true),
                    Err(e) => debug!("Could not raise shield: {}", e),
                }
            }));
        }

        self.emit(Event::ReflexFired {
            reflex: "threat".to_string(),
            detail: threat.name.clone(),
        })
        .await;

        self.panic = Some(PanicManeuver {
            threat,
            escape,
            until: now + self.config.panic_window(),
        });
    }

    /// Give the controls back
    fn release(&mut self) {
        debug!("Reflex: releasing panic controls");
        if let Some(shield) = self.shield.take() {
            shield.abort();
        }
        let actions = &self.ctx.actions;
        actions.set_control(Control::Back, false);
        actions.set_control(Control::Sprint, false);
        actions.deactivate_item();
        self.panic = None;
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}
