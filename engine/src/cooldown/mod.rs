//! Action cooldowns
//!
//! Tracks when an action last happened so reflexes and periodic behaviours
//! don't repeat themselves inside a minimum interval. Each key (`"auto_eat"`,
//! a player name, ...) has its own timestamp.
//!
//! All methods take the current instant explicitly; callers read it from
//! the injected [`Clock`](crate::clock::Clock).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Key used by the health reflex
pub const AUTO_EAT: &str = "auto_eat";

/// Last-action timestamps per key
#[derive(Debug, Clone, Default)]
pub struct Cooldowns {
    per_key: HashMap<String, Instant>,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `interval` has elapsed since `key` was last marked
    ///
    /// A key that was never marked is always ready.
    pub fn ready(&self, key: &str, interval: Duration, now: Instant) -> bool {
        elapsed(self.per_key.get(key).copied(), interval, now)
    }

    pub fn mark(&mut self, key: &str, now: Instant) {
        self.per_key.insert(key.to_string(), now);
    }

    pub fn last(&self, key: &str) -> Option<Instant> {
        self.per_key.get(key).copied()
    }
}

fn elapsed(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    last.map_or(true, |at| now.saturating_duration_since(at) >= interval)
}
