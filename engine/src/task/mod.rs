//! Task executor
//!
//! Owns at most one long-running task and advances it once per scheduling
//! tick. Each tick:
//!
//! 1. Recompute progress from the live inventory (or, for `defend`, from the
//!    mobs around). Reaching the goal ends the task, even with a primitive
//!    still in flight.
//! 2. Harvest the primitive in flight, if any. Still running means wait;
//!    a failure ends the task unless the kind tolerates it.
//! 3. Wait while the agent is still moving or digging.
//! 4. Search for eligible targets, filter them through the safety filter
//!    and pick the nearest.
//! 5. Nothing found: mining gives up, wood and farm tasks wander at a
//!    limited rate and try again later.
//! 6. Found: spawn the composite primitive and report `Issued`.
//!
//! Progress is never accumulated. Whatever the inventory says this tick is
//! the truth, so a missed tick or a player handing the agent items can
//! never desynchronise the task.
//!
//! # In-flight primitives
//!
//! Primitives run as spawned tokio tasks tagged with the id of the task
//! that issued them. The executor holds at most one. Stopping or replacing
//! a task aborts it, and a completion tagged with an id other than the
//! active task's is discarded.

pub mod spec;

pub use spec::{Task, TaskSpec, TASK_KINDS};

use sdk::errors::{ErrorExt, PrimitiveError};
use sdk::{
    ActionPrimitives, Block, BlockPos, Entity, EntityKind, EquipSlot, Goal, WorldView,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::TasksConfig;
use crate::context::AgentContext;
use crate::items::{ItemNames, DEFAULT_LOG_TYPES};
use crate::message_bus::{Event, MessageBus};
use crate::movement::MovementGoalArbiter;
use crate::safety::SafetyFilter;

/// Crops farmed when a farm task names none
pub const DEFAULT_CROPS: &[&str] = &["wheat", "potatoes", "carrots", "beetroots"];

/// Items that count toward a farm task's goal
pub const FARM_PRODUCE: &[&str] = &["wheat", "potato", "carrot", "beetroot"];

/// Growth stage at which a crop block is ready to harvest
pub fn crop_maturity(crop: &str) -> u32 {
    match crop {
        "beetroots" => 3,
        _ => 7,
    }
}

/// Item replanted after harvesting a crop block
pub fn seed_for(crop: &str) -> Option<&'static str> {
    match crop {
        "wheat" => Some("wheat_seeds"),
        "potatoes" => Some("potato"),
        "carrots" => Some("carrot"),
        "beetroots" => Some("beetroot_seeds"),
        _ => None,
    }
}

/// What one call to [`TaskExecutor::update`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// No task
    Idle,
    /// Task active, nothing issued this tick
    Waiting,
    /// Task active, a primitive was issued this tick
    Issued,
    /// Goal reached; now idle
    Completed,
    /// Target absent or unknown; now idle
    Abandoned,
    /// A primitive failed; now idle
    Failed,
}

impl TickStatus {
    /// Whether a task is still active after this tick
    pub fn is_busy(&self) -> bool {
        matches!(self, TickStatus::Waiting | TickStatus::Issued)
    }
}

struct InFlight {
    task_id: Uuid,
    handle: JoinHandle<Result<(), PrimitiveError>>,
}

/// The long-running task state machine
pub struct TaskExecutor {
    ctx: AgentContext,
    safety: SafetyFilter,
    movement: MovementGoalArbiter,
    names: ItemNames,
    config: TasksConfig,
    bus: Option<MessageBus>,
    active: Option<Task>,
    in_flight: Option<InFlight>,
}

impl TaskExecutor {
    pub fn new(
        ctx: AgentContext,
        safety: SafetyFilter,
        movement: MovementGoalArbiter,
        names: ItemNames,
        config: TasksConfig,
    ) -> Self {
        Self {
            ctx,
            safety,
            movement,
            names,
            config,
            bus: None,
            active: None,
            in_flight: None,
        }
    }

    /// Publish task lifecycle events on `bus`
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Task> {
        self.active.as_ref()
    }

    pub fn safety(&self) -> &SafetyFilter {
        &self.safety
    }

    pub fn movement(&self) -> &MovementGoalArbiter {
        &self.movement
    }

    pub fn movement_mut(&mut self) -> &mut MovementGoalArbiter {
        &mut self.movement
    }

    /// Whether a primitive issued by the active task is still running
    pub fn has_in_flight(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| !f.handle.is_finished())
    }

    /// Make `spec` the active task, discarding any previous one
    ///
    /// Item names are normalised before the task is stored. Returns the new
    /// task's id.
    pub async fn start_task(&mut self, spec: TaskSpec) -> Uuid {
        if let Some(previous) = self.active.take() {
            info!(
                "Replacing task {} ({}) with {}",
                previous.kind(),
                previous.id,
                spec.kind()
            );
            self.abort_in_flight();
        }

        let spec = spec.normalized(&self.names);
        let task = Task::new(spec, self.ctx.clock.now());
        let id = task.id;
        info!("Starting task {} ({}): {}", task.kind(), id, task.spec);

        self.emit(Event::TaskStarted {
            task_id: id,
            kind: task.kind().to_string(),
        })
        .await;
        self.active = Some(task);
        id
    }

    /// Drop the active task, cancel its primitive and clear the movement goal
    pub async fn stop_task(&mut self) {
        let Some(task) = self.active.take() else {
            return;
        };
        info!("Stopping task {} ({})", task.kind(), task.id);
        self.abort_in_flight();
        self.ctx.actions.set_goal(None);
        self.emit(Event::TaskStopped {
            task_id: task.id,
            kind: task.kind().to_string(),
        })
        .await;
    }

    /// Advance the active task by one tick
    ///
    /// A no-op returning [`TickStatus::Idle`] when no task is active.
    pub async fn update(&mut self) -> TickStatus {
        let Some(task) = self.active.clone() else {
            return TickStatus::Idle;
        };

        if let Some(status) = self.check_progress(&task).await {
            return status;
        }
        if let Some(status) = self.harvest(&task).await {
            return status;
        }

        match &task.spec {
            TaskSpec::Mine { target, .. } => self.advance_mine(&task, target).await,
            TaskSpec::GatherWood { types, .. } => self.advance_wood(&task, types).await,
            TaskSpec::Farm { crops, .. } => self.advance_farm(&task, crops).await,
            TaskSpec::Defend { radius } => {
                let radius = radius.unwrap_or(self.config.defend_radius);
                self.advance_defend(&task, radius).await
            }
        }
    }

    /// End the task if its goal is met, or if it can never be met
    async fn check_progress(&mut self, task: &Task) -> Option<TickStatus> {
        let world = Arc::clone(&self.ctx.world);
        let status = match &task.spec {
            TaskSpec::Mine { target, amount } => {
                if !world.item_known(target) {
                    return Some(
                        self.abandon(task, format!("what's {}? never heard of it", target))
                            .await,
                    );
                }
                let have = world.inventory_count(target);
                if have < *amount {
                    return None;
                }
                self.complete(task, format!("got {} {}, that's enough for now", have, target))
                    .await
            }
            TaskSpec::GatherWood { types, amount } => {
                let total: u32 = wood_types(types)
                    .iter()
                    .filter(|t| world.item_known(t))
                    .map(|t| world.inventory_count(t))
                    .sum();
                if total < *amount {
                    return None;
                }
                self.complete(task, format!("wood gathered ({})", total))
                    .await
            }
            TaskSpec::Farm { amount, .. } => {
                let amount = (*amount)?;
                let have: u32 = FARM_PRODUCE.iter().map(|p| world.inventory_count(p)).sum();
                if have < amount {
                    return None;
                }
                self.complete(task, format!("harvest done ({})", have)).await
            }
            TaskSpec::Defend { radius } => {
                let radius = radius.unwrap_or(self.config.defend_radius);
                if self.nearest_hostile(radius).is_some() {
                    return None;
                }
                self.complete(task, "all quiet".to_string()).await
            }
        };
        Some(status)
    }

    /// Collect the in-flight result, if any
    ///
    /// Returns a status when the tick should end here.
    async fn harvest(&mut self, task: &Task) -> Option<TickStatus> {
        let in_flight = self.in_flight.take()?;
        if !in_flight.handle.is_finished() {
            self.in_flight = Some(in_flight);
            return Some(TickStatus::Waiting);
        }

        let result = match in_flight.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => return None,
            Err(e) => Err(PrimitiveError::Other(format!("primitive panicked: {}", e))),
        };

        if in_flight.task_id != task.id {
            debug!("Discarding completion from stale task {}", in_flight.task_id);
            return None;
        }

        match result {
            Ok(()) => None,
            Err(e) if tolerates(&task.spec, &e) => {
                warn!("{} step failed, continuing: {}", task.kind(), e);
                None
            }
            Err(e) => {
                error!(
                    task_kind = task.kind(),
                    task_id = %task.id,
                    "Task step failed: {}",
                    e
                );
                self.finish(task);
                self.ctx
                    .say(&format!("giving up on {}: {}", task.kind(), e.user_hint()));
                self.emit(Event::TaskFailed {
                    task_id: task.id,
                    kind: task.kind().to_string(),
                    error: e.to_string(),
                })
                .await;
                Some(TickStatus::Failed)
            }
        }
    }

    async fn advance_mine(&mut self, task: &Task, target: &str) -> TickStatus {
        if self.agent_busy() {
            return TickStatus::Waiting;
        }

        let matcher = |b: &Block| b.name == target;
        let Some(block) =
            self.find_minable(&matcher, self.config.mine_radius, self.config.mine_candidates)
        else {
            return self
                .abandon(task, format!("no more {} nearby", target))
                .await;
        };

        self.issue_collect(task, block);
        TickStatus::Issued
    }

    async fn advance_wood(&mut self, task: &Task, types: &[String]) -> TickStatus {
        if self.agent_busy() {
            return TickStatus::Waiting;
        }

        let types = wood_types(types);
        let matcher = |b: &Block| types.iter().any(|t| *t == b.name);
        let Some(block) =
            self.find_minable(&matcher, self.config.wood_radius, self.config.wood_candidates)
        else {
            self.maybe_wander(
                self.config.wood_wander_interval_ms,
                self.config.wood_wander_range,
            );
            return TickStatus::Waiting;
        };

        self.issue_collect(task, block);
        TickStatus::Issued
    }

    async fn advance_farm(&mut self, task: &Task, crops: &[String]) -> TickStatus {
        if self.agent_busy() {
            return TickStatus::Waiting;
        }

        let crops: Vec<String> = if crops.is_empty() {
            DEFAULT_CROPS.iter().map(|c| c.to_string()).collect()
        } else {
            crops.to_vec()
        };
        let matcher =
            |b: &Block| crops.iter().any(|c| *c == b.name) && b.age() >= crop_maturity(&b.name);

        let mature = self
            .ctx
            .world
            .find_blocks(&matcher, self.config.farm_radius, self.config.farm_candidates)
            .into_iter()
            .find_map(|pos| self.ctx.world.block_at(pos).filter(|b| matcher(b)));

        let Some(crop) = mature else {
            self.maybe_wander(
                self.config.farm_wander_interval_ms,
                self.config.farm_wander_range,
            );
            return TickStatus::Waiting;
        };

        debug!("Harvesting {} at {}", crop.name, crop.pos);
        let world = Arc::clone(&self.ctx.world);
        let actions = Arc::clone(&self.ctx.actions);
        self.issue(task, async move {
            actions
                .travel_to(Goal::Near {
                    pos: crop.pos.center(),
                    range: 1.0,
                })
                .await?;
            actions.dig(&crop).await?;
            replant(world.as_ref(), actions.as_ref(), &crop).await
        });
        TickStatus::Issued
    }

    async fn advance_defend(&mut self, task: &Task, radius: f64) -> TickStatus {
        let Some(hostile) = self.nearest_hostile(radius) else {
            return self.complete(task, "all quiet".to_string()).await;
        };

        if self.agent_busy() {
            return TickStatus::Waiting;
        }

        debug!("Attacking {} ({})", hostile.name, hostile.id);
        let actions = Arc::clone(&self.ctx.actions);
        self.issue(task, async move { actions.attack(hostile.id).await });
        TickStatus::Issued
    }

    fn nearest_hostile(&self, radius: f64) -> Option<Entity> {
        let origin = self.ctx.world.position();
        self.ctx.world.nearest_entity(&|e: &Entity| {
            e.kind == EntityKind::Mob && e.position.distance_to(origin) < radius
        })
    }

    /// Nearest candidate accepted by `matcher` that is safe to mine
    fn find_minable(
        &self,
        matcher: &dyn Fn(&Block) -> bool,
        radius: f64,
        cap: usize,
    ) -> Option<Block> {
        let world = self.ctx.world.as_ref();
        world
            .find_blocks(matcher, radius, cap)
            .into_iter()
            .filter_map(|pos| world.block_at(pos))
            .find(|block| self.safety.is_safe_to_mine(world, block))
    }

    fn agent_busy(&self) -> bool {
        self.ctx.actions.is_moving() || self.ctx.actions.is_digging()
    }

    /// Wander if the active task has not wandered within `interval_ms`
    fn maybe_wander(&mut self, interval_ms: u64, range: f64) {
        let now = self.ctx.clock.now();
        let Some(task) = self.active.as_mut() else {
            return;
        };
        let due = task.last_wander_at.map_or(true, |at| {
            now.saturating_duration_since(at) > Duration::from_millis(interval_ms)
        });
        if due {
            task.last_wander_at = Some(now);
            self.movement.wander(Some(range));
        }
    }

    fn issue_collect(&mut self, task: &Task, block: Block) {
        debug!("Collecting {} at {}", block.name, block.pos);
        let actions = Arc::clone(&self.ctx.actions);
        self.issue(task, async move { actions.collect(&block).await });
    }

    fn issue<F>(&mut self, task: &Task, primitive: F)
    where
        F: Future<Output = Result<(), PrimitiveError>> + Send + 'static,
    {
        self.in_flight = Some(InFlight {
            task_id: task.id,
            handle: tokio::spawn(primitive),
        });
    }

    fn abort_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
    }

    /// Clear the task and its movement goal
    fn finish(&mut self, task: &Task) {
        if self.active.as_ref().is_some_and(|t| t.id == task.id) {
            self.active = None;
        }
        self.abort_in_flight();
        self.ctx.actions.set_goal(None);
    }

    async fn complete(&mut self, task: &Task, message: String) -> TickStatus {
        let took = self
            .ctx
            .clock
            .now()
            .saturating_duration_since(task.started_at);
        info!(
            "Task {} ({}) complete after {:.1}s: {}",
            task.kind(),
            task.id,
            took.as_secs_f64(),
            message
        );
        self.finish(task);
        self.ctx.say(&message);
        self.emit(Event::TaskCompleted {
            task_id: task.id,
            kind: task.kind().to_string(),
            detail: message,
        })
        .await;
        TickStatus::Completed
    }

    async fn abandon(&mut self, task: &Task, message: String) -> TickStatus {
        info!("Task {} ({}) abandoned: {}", task.kind(), task.id, message);
        self.finish(task);
        self.ctx.say(&message);
        self.emit(Event::TaskFailed {
            task_id: task.id,
            kind: task.kind().to_string(),
            error: message,
        })
        .await;
        TickStatus::Abandoned
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}

/// Log species a wood task collects; none listed means all common ones
fn wood_types(types: &[String]) -> Vec<String> {
    if types.is_empty() {
        DEFAULT_LOG_TYPES.iter().map(|t| t.to_string()).collect()
    } else {
        types.to_vec()
    }
}

/// Whether a failed step leaves the task running
fn tolerates(spec: &TaskSpec, error: &PrimitiveError) -> bool {
    match spec {
        TaskSpec::Farm { .. } => error.is_recoverable(),
        TaskSpec::Defend { .. } => matches!(error, PrimitiveError::TargetGone(_)),
        _ => false,
    }
}

/// Put the matching seed back on the farmland under a harvested crop
async fn replant(
    world: &dyn WorldView,
    actions: &dyn ActionPrimitives,
    crop: &Block,
) -> Result<(), PrimitiveError> {
    let Some(seed) = seed_for(&crop.name) else {
        return Ok(());
    };
    if world.find_item(seed).is_none() {
        return Ok(());
    }
    let soil_pos: BlockPos = crop.pos + BlockPos::DOWN;
    let on_farmland = world
        .block_at(soil_pos)
        .is_some_and(|soil| soil.name == "farmland");
    if !on_farmland {
        return Ok(());
    }

    actions.equip(seed, EquipSlot::Hand).await?;
    actions.place(soil_pos, BlockPos::UP).await
}
