//! Event-driven scheduler
//!
//! The scheduler is the single owner of the task executor and the reflex
//! arbiter. It reacts to world events from the message bus:
//!
//! - `Tick`: run the threat reflex, then advance the active task unless the
//!   reflex preempted it or a one-shot skill holds the controls.
//! - `Health`: run the health reflex.
//!
//! Requests from outside (start or stop a task, follow, wander, mute,
//! one-shot skills) arrive on a command channel and are applied between
//! events, so the executor is never touched from two places at once.
//!
//! A skill runs on its own spawned task while the loop keeps serving ticks.
//! At most one is pending; a new one interrupts it, and so does the threat
//! reflex. The requester then gets [`PrimitiveError::Interrupted`].

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sdk::errors::PrimitiveError;
use sdk::BlockPos;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::AgentContext;
use crate::items::ItemNames;
use crate::message_bus::{Event, EventType, MessageBus};
use crate::movement::{FollowOutcome, MovementGoalArbiter, WanderOutcome};
use crate::placement::PlacementLedger;
use crate::reflex::{ReflexArbiter, ReflexOutcome};
use crate::safety::SafetyFilter;
use crate::skills::{SkillError, Skills};
use crate::task::{TaskExecutor, TaskSpec, TickStatus};

/// Command channel capacity
const COMMAND_BUFFER_SIZE: usize = 32;

/// Requests applied by the scheduler loop
#[derive(Debug)]
pub enum Command {
    StartTask {
        spec: TaskSpec,
        reply: oneshot::Sender<Uuid>,
    },
    StopTask,
    Follow(Option<String>),
    Wander(Option<f64>),
    Mute {
        name: String,
        muted: bool,
    },
    PlaceBlock {
        item: String,
        target: Option<BlockPos>,
        reply: oneshot::Sender<Result<BlockPos, SkillError>>,
    },
    Craft {
        item: String,
        count: u32,
        reply: oneshot::Sender<Result<(), SkillError>>,
    },
    Smelt {
        input: String,
        fuel: Option<String>,
        count: u32,
        reply: oneshot::Sender<Result<(), SkillError>>,
    },
    Eat {
        item: Option<String>,
        reply: oneshot::Sender<Result<(), SkillError>>,
    },
    Shutdown,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// A reflex held the controls; the executor did not run
    Preempted,
    /// A one-shot skill held the controls; the executor did not run
    SkillPending,
    Ran(TickStatus),
}

/// A skill running on its own task
struct PendingSkill {
    name: &'static str,
    cancel: oneshot::Sender<()>,
    done: JoinHandle<()>,
}

/// Owns the executor and the reflexes and feeds them events
pub struct Scheduler {
    executor: TaskExecutor,
    reflex: ReflexArbiter,
    skills: Skills,
    skill: Option<PendingSkill>,
    bus: MessageBus,
}

impl Scheduler {
    pub fn new(
        executor: TaskExecutor,
        reflex: ReflexArbiter,
        skills: Skills,
        bus: MessageBus,
    ) -> Self {
        Self {
            executor,
            reflex,
            skills,
            skill: None,
            bus,
        }
    }

    /// Wire every component from configuration
    ///
    /// `seed` fixes the wander RNG; `None` seeds it from entropy.
    pub fn from_config(
        ctx: AgentContext,
        ledger: PlacementLedger,
        config: &Config,
        bus: MessageBus,
        seed: Option<u64>,
    ) -> Self {
        let names = ItemNames::with_aliases(&config.items.aliases);
        let safety = SafetyFilter::new(ledger, config.safety.safe_mining);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let movement = MovementGoalArbiter::with_rng(ctx.clone(), config.movement.clone(), rng);
        let executor = TaskExecutor::new(
            ctx.clone(),
            safety.clone(),
            movement,
            names.clone(),
            config.tasks.clone(),
        )
        .with_bus(bus.clone());
        let reflex = ReflexArbiter::new(ctx.clone(), config.reflex.clone()).with_bus(bus.clone());
        let skills = Skills::new(
            ctx,
            safety,
            names,
            config.safety.clone(),
            config.core.agent_name.clone(),
        );
        Self::new(executor, reflex, skills, bus)
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut TaskExecutor {
        &mut self.executor
    }

    pub fn reflex(&self) -> &ReflexArbiter {
        &self.reflex
    }

    pub fn skills(&self) -> &Skills {
        &self.skills
    }

    /// Whether a one-shot skill is still running
    pub fn has_pending_skill(&self) -> bool {
        self.skill.as_ref().is_some_and(|s| !s.done.is_finished())
    }

    /// Run one tick: reflexes first, then the executor
    pub async fn tick(&mut self) -> TickReport {
        if self.skill.as_ref().is_some_and(|s| s.done.is_finished()) {
            self.skill = None;
        }

        match self.reflex.on_tick(&mut self.executor).await {
            ReflexOutcome::Preempted => {
                self.interrupt_skill();
                TickReport::Preempted
            }
            ReflexOutcome::Clear if self.skill.is_some() => TickReport::SkillPending,
            ReflexOutcome::Clear => TickReport::Ran(self.executor.update().await),
        }
    }

    /// Run `run` on its own task and send its result to `reply`
    ///
    /// Any skill still pending is interrupted first.
    fn spawn_skill<T, F>(
        &mut self,
        name: &'static str,
        reply: oneshot::Sender<Result<T, SkillError>>,
        run: F,
    ) where
        T: Send + 'static,
        F: Future<Output = Result<T, SkillError>> + Send + 'static,
    {
        self.interrupt_skill();

        let (cancel, cancelled) = oneshot::channel::<()>();
        let done = tokio::spawn(async move {
            let result = tokio::select! {
                result = run => result,
                _ = cancelled => Err(SkillError::Primitive(PrimitiveError::Interrupted)),
            };
            if reply.send(result).is_err() {
                debug!("Skill {} finished but the requester went away", name);
            }
        });
        debug!("Skill {} started", name);
        self.skill = Some(PendingSkill { name, cancel, done });
    }

    fn interrupt_skill(&mut self) {
        let Some(skill) = self.skill.take() else {
            return;
        };
        if skill.done.is_finished() {
            return;
        }
        warn!("Interrupting skill {}", skill.name);
        // The skill task answers its requester once it sees the signal
        if skill.cancel.send(()).is_err() {
            skill.done.abort();
        }
    }

    /// React to one bus event. Engine events are ignored.
    pub async fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Tick => {
                self.tick().await;
            }
            Event::Health => {
                self.reflex.on_health().await;
            }
            _ => {}
        }
    }

    /// Apply one command; returns `false` on shutdown
    pub async fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::StartTask { spec, reply } => {
                let id = self.executor.start_task(spec).await;
                if reply.send(id).is_err() {
                    debug!("Task {} started but the requester went away", id);
                }
            }
            Command::StopTask => self.executor.stop_task().await,
            Command::Follow(name) => {
                if let FollowOutcome::Following(label) =
                    self.executor.movement_mut().follow(name.as_deref())
                {
                    info!("Following {}", label);
                }
            }
            Command::Wander(range) => {
                if let WanderOutcome::Started(target) = self.executor.movement_mut().wander(range) {
                    debug!("Wandering to {:?}", target);
                }
            }
            Command::Mute { name, muted } => {
                info!("{} {}", if muted { "Muting" } else { "Unmuting" }, name);
                self.executor.movement_mut().set_muted(&name, muted);
            }
            Command::PlaceBlock {
                item,
                target,
                reply,
            } => {
                let skills = self.skills.clone();
                self.spawn_skill("place_block", reply, async move {
                    skills.place_block(&item, target).await
                });
            }
            Command::Craft { item, count, reply } => {
                let skills = self.skills.clone();
                self.spawn_skill("craft", reply, async move {
                    skills.craft_item(&item, count).await
                });
            }
            Command::Smelt {
                input,
                fuel,
                count,
                reply,
            } => {
                let skills = self.skills.clone();
                self.spawn_skill("smelt", reply, async move {
                    skills.smelt(&input, fuel.as_deref(), count).await
                });
            }
            Command::Eat { item, reply } => {
                let skills = self.skills.clone();
                self.spawn_skill("eat", reply, async move {
                    skills.eat(item.as_deref()).await
                });
            }
            Command::Shutdown => {
                self.interrupt_skill();
                return false;
            }
        }
        true
    }

    /// Subscribe to the world feed and run the loop on a background task
    ///
    /// The subscriptions are in place when this returns, so no event
    /// published afterwards is missed. The loop ends on
    /// [`SchedulerHandle::stop`] or when the bus and every handle are
    /// gone; the scheduler is handed back through the join handle.
    pub async fn start(self) -> SchedulerHandle {
        let mut ticks = self.bus.subscribe(EventType::Tick).await;
        let mut health = self.bus.subscribe(EventType::Health).await;
        let (commands, mut command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        let mut scheduler = self;
        let join = tokio::spawn(async move {
            info!("Scheduler started");
            loop {
                tokio::select! {
                    biased;
                    command = command_rx.recv() => match command {
                        Some(command) => {
                            if !scheduler.apply(command).await {
                                break;
                            }
                        }
                        None => break,
                    },
                    Some(event) = health.recv() => scheduler.handle_event(&event).await,
                    Some(event) = ticks.recv() => scheduler.handle_event(&event).await,
                    else => break,
                }
            }
            info!("Scheduler stopped");
            scheduler
        });

        SchedulerHandle {
            commands,
            join: Some(join),
        }
    }
}

/// Handle to a running scheduler loop
///
/// Dropping the handle without calling [`SchedulerHandle::stop`] aborts
/// the loop.
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    join: Option<JoinHandle<Scheduler>>,
}

impl SchedulerHandle {
    /// Start a task and return its id
    pub async fn start_task(&self, spec: TaskSpec) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartTask { spec, reply }).await?;
        rx.await.context("Scheduler dropped the start request")
    }

    pub async fn stop_task(&self) -> Result<()> {
        self.send(Command::StopTask).await
    }

    pub async fn follow(&self, name: Option<String>) -> Result<()> {
        self.send(Command::Follow(name)).await
    }

    pub async fn wander(&self, range: Option<f64>) -> Result<()> {
        self.send(Command::Wander(range)).await
    }

    /// Mute or unmute a player; muted players are never followed
    pub async fn mute(&self, name: &str, muted: bool) -> Result<()> {
        self.send(Command::Mute {
            name: name.to_string(),
            muted,
        })
        .await
    }

    /// Place a block and return where it went
    pub async fn place_block(
        &self,
        item: &str,
        target: Option<BlockPos>,
    ) -> Result<Result<BlockPos, SkillError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PlaceBlock {
            item: item.to_string(),
            target,
            reply,
        })
        .await?;
        rx.await.context("Scheduler dropped the place request")
    }

    pub async fn craft(&self, item: &str, count: u32) -> Result<Result<(), SkillError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Craft {
            item: item.to_string(),
            count,
            reply,
        })
        .await?;
        rx.await.context("Scheduler dropped the craft request")
    }

    /// Load a furnace with up to `count` of `input`
    pub async fn smelt(
        &self,
        input: &str,
        fuel: Option<&str>,
        count: u32,
    ) -> Result<Result<(), SkillError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Smelt {
            input: input.to_string(),
            fuel: fuel.map(str::to_string),
            count,
            reply,
        })
        .await?;
        rx.await.context("Scheduler dropped the smelt request")
    }

    pub async fn eat(&self, item: Option<&str>) -> Result<Result<(), SkillError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Eat {
            item: item.map(str::to_string),
            reply,
        })
        .await?;
        rx.await.context("Scheduler dropped the eat request")
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Scheduler is not running"))
    }

    /// Stop the loop and take the scheduler back
    pub async fn stop(mut self) -> Result<Scheduler> {
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("Scheduler already stopped"))?;
        // The loop may already have exited; the join below still succeeds
        let _ = self.commands.send(Command::Shutdown).await;
        join.await.context("Scheduler loop panicked")
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
