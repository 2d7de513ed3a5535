//! Movement goal arbitration
//!
//! Wander and follow both want to own the pathfinder goal. The arbiter
//! decides when a new goal may replace the current one and keeps enough
//! memory to stop the agent oscillating:
//!
//! - **Wander** does not replace a goal it set less than
//!   `wander_min_interval_ms` ago while the agent is still moving, and
//!   avoids picking a target right next to the previous one.
//! - **Follow** counts requests per target label. Once a label has been
//!   requested `follow_max_attempts` times inside `follow_window_ms`, the
//!   next request assumes the target is unreachable and switches to the
//!   nearest other player.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdk::{Entity, EntityKind, Goal, Vec3};
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::MovementConfig;
use crate::context::AgentContext;

/// Range used when a caller does not ask for one
pub const DEFAULT_WANDER_RANGE: f64 = 20.0;

/// Wander ranges below this are raised to it
pub const MIN_WANDER_RANGE: f64 = 6.0;

/// Closest a wander target may be to the agent
const MIN_WANDER_DISTANCE: f64 = 5.0;

/// Pathfinder tolerance around a wander target
const WANDER_GOAL_RANGE: f64 = 2.0;

/// Result of a wander request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WanderOutcome {
    /// A fresh goal was set toward this point
    Started(Vec3),
    /// Still moving toward a recent wander goal; nothing changed
    Skipped,
}

/// Result of a follow request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Following the player with this label
    Following(String),
    /// Nobody to follow
    NoTarget,
    /// Gave up without touching the goal: the requested player is muted,
    /// or looked stuck with nobody else around
    Abandoned,
}

/// Follow attempts toward one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowHistoryEntry {
    pub count: u32,
    pub last_at: Instant,
}

/// Owns the wander and follow bookkeeping for one agent
pub struct MovementGoalArbiter {
    ctx: AgentContext,
    config: MovementConfig,
    rng: StdRng,
    last_wander_at: Option<Instant>,
    last_wander_target: Option<Vec3>,
    follow_history: HashMap<String, FollowHistoryEntry>,
    muted: HashSet<String>,
}

impl MovementGoalArbiter {
    pub fn new(ctx: AgentContext, config: MovementConfig) -> Self {
        Self::with_rng(ctx, config, StdRng::from_entropy())
    }

    /// Same as [`new`](Self::new) with a caller-provided random source
    pub fn with_rng(ctx: AgentContext, config: MovementConfig, rng: StdRng) -> Self {
        Self {
            ctx,
            config,
            rng,
            last_wander_at: None,
            last_wander_target: None,
            follow_history: HashMap::new(),
            muted: HashSet::new(),
        }
    }

    /// Mute or unmute a player; muted players are never picked to follow
    pub fn set_muted(&mut self, name: &str, muted: bool) {
        if muted {
            self.muted.insert(name.to_string());
        } else {
            self.muted.remove(name);
        }
    }

    pub fn is_muted(&self, name: &str) -> bool {
        self.muted.contains(name)
    }

    pub fn last_wander_target(&self) -> Option<Vec3> {
        self.last_wander_target
    }

    pub fn follow_history(&self, label: &str) -> Option<FollowHistoryEntry> {
        self.follow_history.get(label).copied()
    }

    /// Pick a random nearby point and walk toward it
    ///
    /// `range` is raised to at least [`MIN_WANDER_RANGE`]; `None` means
    /// [`DEFAULT_WANDER_RANGE`].
    pub fn wander(&mut self, range: Option<f64>) -> WanderOutcome {
        let range = match range {
            Some(r) if r.is_finite() => r.max(MIN_WANDER_RANGE),
            _ => DEFAULT_WANDER_RANGE,
        };
        let now = self.ctx.clock.now();
        let min_interval = Duration::from_millis(self.config.wander_min_interval_ms);

        if self.ctx.actions.is_moving() {
            if let Some(last) = self.last_wander_at {
                if now.saturating_duration_since(last) < min_interval {
                    debug!("Wander skipped, still moving toward the last goal");
                    return WanderOutcome::Skipped;
                }
            }
        }

        let origin = self.ctx.world.position();
        let mut target = self.random_point(origin, range);
        for _ in 1..self.config.wander_attempts.max(1) {
            let repeats = self
                .last_wander_target
                .is_some_and(|prev| prev.distance_to(target) <= self.config.wander_repeat_radius);
            if !repeats {
                break;
            }
            target = self.random_point(origin, range);
        }

        self.ctx.actions.set_goal(Some(Goal::Near {
            pos: target,
            range: WANDER_GOAL_RANGE,
        }));
        self.ctx.actions.look_at(target);
        self.last_wander_at = Some(now);
        self.last_wander_target = Some(target);

        debug!("Wandering toward ({:.1}, {:.1}, {:.1})", target.x, target.y, target.z);
        WanderOutcome::Started(target)
    }

    fn random_point(&mut self, origin: Vec3, range: f64) -> Vec3 {
        let angle = self.rng.gen_range(0.0..TAU);
        let distance = MIN_WANDER_DISTANCE + self.rng.gen::<f64>() * (range - MIN_WANDER_DISTANCE);
        Vec3::new(
            origin.x + angle.cos() * distance,
            origin.y,
            origin.z + angle.sin() * distance,
        )
    }

    /// Follow a named player, or the nearest unmuted player
    pub fn follow(&mut self, name: Option<&str>) -> FollowOutcome {
        let name = name.filter(|n| !n.eq_ignore_ascii_case("player"));
        if let Some(muted) = name.filter(|n| self.is_muted(n)) {
            debug!("Not following muted player {}", muted);
            return FollowOutcome::Abandoned;
        }

        let requested = name.and_then(|n| {
            self.ctx
                .world
                .players()
                .into_iter()
                .find(|p| p.username == n)
                .and_then(|p| p.entity)
        });

        let target = match requested {
            Some(entity) => Some(entity),
            None => {
                let muted = &self.muted;
                self.ctx.world.nearest_entity(&|e: &Entity| {
                    e.kind == EntityKind::Player && !muted.contains(e.label())
                })
            }
        };

        let Some(mut target) = target else {
            self.ctx.say("nobody around to follow");
            return FollowOutcome::NoTarget;
        };

        let now = self.ctx.clock.now();
        let window = Duration::from_millis(self.config.follow_window_ms);
        let mut label = target.label().to_string();

        let entry = self
            .follow_history
            .entry(label.clone())
            .or_insert(FollowHistoryEntry {
                count: 0,
                last_at: now,
            });
        if entry.count > 0 && now.saturating_duration_since(entry.last_at) < window {
            entry.count += 1;
        } else {
            entry.count = 1;
        }
        entry.last_at = now;
        let attempts = entry.count;

        if attempts > self.config.follow_max_attempts {
            let stuck_id = target.id;
            let muted = &self.muted;
            let alternative = self.ctx.world.nearest_entity(&|e: &Entity| {
                e.kind == EntityKind::Player && e.id != stuck_id && !muted.contains(e.label())
            });
            let Some(alternative) = alternative else {
                debug!("Follow target {} looks stuck and nobody else is around", label);
                return FollowOutcome::Abandoned;
            };
            debug!(
                "Follow target {} requested {} times, switching to {}",
                label,
                attempts,
                alternative.label()
            );
            target = alternative;
            label = target.label().to_string();
            self.follow_history.insert(
                label.clone(),
                FollowHistoryEntry {
                    count: 1,
                    last_at: now,
                },
            );
        }

        self.ctx.actions.set_goal(Some(Goal::Follow {
            entity_id: target.id,
            range: self.config.follow_range,
        }));
        FollowOutcome::Following(label)
    }

    /// Clear whatever goal is active
    pub fn stop(&self) {
        self.ctx.actions.set_goal(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimWorld;
    use sdk::WorldView;
    use std::sync::Arc;

    fn arbiter(world: &Arc<SimWorld>, clock: &Arc<ManualClock>) -> MovementGoalArbiter {
        let ctx = AgentContext::from_adapter(Arc::clone(world), clock.clone());
        MovementGoalArbiter::with_rng(ctx, MovementConfig::default(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_wander_sets_goal_within_range() {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);

        let WanderOutcome::Started(target) = movement.wander(Some(10.0)) else {
            panic!("expected a wander goal");
        };
        let distance = world.position().distance_to(target);
        assert!((MIN_WANDER_DISTANCE..=10.0).contains(&distance));
        assert_eq!(
            world.current_goal(),
            Some(Goal::Near {
                pos: target,
                range: WANDER_GOAL_RANGE
            })
        );
    }

    #[test]
    fn test_wander_range_is_clamped() {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);

        for _ in 0..20 {
            clock.advance_ms(10_000);
            let WanderOutcome::Started(target) = movement.wander(Some(1.0)) else {
                panic!("expected a wander goal");
            };
            assert!(world.position().distance_to(target) <= MIN_WANDER_RANGE + 1e-9);
        }
    }

    #[test]
    fn test_wander_not_replaced_while_moving() {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);
        world.set_moving(true);

        assert!(matches!(movement.wander(None), WanderOutcome::Started(_)));
        clock.advance_ms(7_999);
        assert_eq!(movement.wander(None), WanderOutcome::Skipped);
        assert_eq!(world.goal_changes(), 1);

        clock.advance_ms(1);
        assert!(matches!(movement.wander(None), WanderOutcome::Started(_)));
        assert_eq!(world.goal_changes(), 2);
    }

    #[test]
    fn test_wander_replaced_freely_when_idle() {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);

        movement.wander(None);
        movement.wander(None);
        assert_eq!(world.goal_changes(), 2);
    }

    #[test]
    fn test_follow_without_players() {
        let world = Arc::new(SimWorld::new());
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);

        assert_eq!(movement.follow(None), FollowOutcome::NoTarget);
        assert_eq!(world.said(), vec!["nobody around to follow".to_string()]);
        assert_eq!(world.current_goal(), None);
    }

    #[test]
    fn test_follow_skips_muted_players() {
        let world = Arc::new(SimWorld::new());
        world.add_player("alice", Vec3::new(2.0, 64.0, 0.0));
        world.add_player("bob", Vec3::new(9.0, 64.0, 0.0));
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);
        movement.set_muted("alice", true);

        assert_eq!(movement.follow(None), FollowOutcome::Following("bob".into()));
    }

    #[test]
    fn test_follow_muted_player_by_name_is_refused() {
        let world = Arc::new(SimWorld::new());
        world.add_player("alice", Vec3::new(2.0, 64.0, 0.0));
        world.add_player("bob", Vec3::new(9.0, 64.0, 0.0));
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);
        movement.set_muted("alice", true);

        assert_eq!(movement.follow(Some("alice")), FollowOutcome::Abandoned);
        assert_eq!(world.current_goal(), None);
        assert!(world.said().is_empty());
        assert!(movement.follow_history("alice").is_none());

        movement.set_muted("alice", false);
        assert_eq!(
            movement.follow(Some("alice")),
            FollowOutcome::Following("alice".into())
        );
    }

    #[test]
    fn test_stop_clears_goal() {
        let world = Arc::new(SimWorld::new());
        world.add_player("alice", Vec3::new(2.0, 64.0, 0.0));
        let clock = Arc::new(ManualClock::new());
        let mut movement = arbiter(&world, &clock);

        movement.follow(Some("alice"));
        assert!(world.current_goal().is_some());
        movement.stop();
        assert_eq!(world.current_goal(), None);
    }
}
