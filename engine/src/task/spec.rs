//! Task requests
//!
//! A [`TaskSpec`] is what a planner asks for; a [`Task`] is the accepted,
//! normalised request plus the bookkeeping the executor needs while it runs.
//!
//! Specs arrive as JSON tagged by `kind`:
//!
//! ```json
//! { "kind": "mine", "target": "iron ore", "amount": 8 }
//! { "kind": "gather_wood", "amount": 32 }
//! { "kind": "farm", "crops": ["wheat"] }
//! { "kind": "defend" }
//! ```
//!
//! Unknown kinds are rejected while parsing, so the executor never sees a
//! request it cannot dispatch.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::items::ItemNames;

/// Kind names accepted in the `kind` field
pub const TASK_KINDS: &[&str] = &["mine", "gather_wood", "farm", "defend"];

/// A long-running task request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    /// Mine blocks of one kind until the inventory holds `amount` of them
    Mine {
        target: String,
        #[serde(default = "default_mine_amount")]
        amount: u32,
    },

    /// Fell trees until the listed log species add up to `amount`
    ///
    /// An empty `types` list means every common log species.
    GatherWood {
        #[serde(default)]
        types: Vec<String>,
        #[serde(default = "default_wood_amount")]
        amount: u32,
    },

    /// Harvest mature crops and replant them
    ///
    /// With no `amount` the task farms until stopped.
    Farm {
        #[serde(default)]
        crops: Vec<String>,
        #[serde(default)]
        amount: Option<u32>,
    },

    /// Fight hostile mobs until none are within `radius`
    Defend {
        #[serde(default)]
        radius: Option<f64>,
    },
}

fn default_mine_amount() -> u32 {
    10
}

fn default_wood_amount() -> u32 {
    32
}

impl TaskSpec {
    /// Parse a JSON task request
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownTaskKind`] when `kind` is missing from
    ///   [`TASK_KINDS`]
    /// - [`EngineError::InvalidTaskSpec`] when the JSON is malformed or the
    ///   fields don't fit the kind
    ///
    /// # Examples
    ///
    /// ```
    /// use kestrel_engine::task::TaskSpec;
    ///
    /// let spec = TaskSpec::from_json(r#"{"kind":"gather_wood","amount":32}"#).unwrap();
    /// assert_eq!(spec.kind(), "gather_wood");
    ///
    /// assert!(TaskSpec::from_json(r#"{"kind":"dance"}"#).is_err());
    /// ```
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidTaskSpec(e.to_string()))?;

        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| EngineError::InvalidTaskSpec("missing \"kind\"".to_string()))?;
        if !TASK_KINDS.contains(&kind) {
            return Err(EngineError::UnknownTaskKind(kind.to_string()));
        }

        let spec: TaskSpec = serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidTaskSpec(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Snake-case kind name, as used in the `kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            TaskSpec::Mine { .. } => "mine",
            TaskSpec::GatherWood { .. } => "gather_wood",
            TaskSpec::Farm { .. } => "farm",
            TaskSpec::Defend { .. } => "defend",
        }
    }

    /// Check field ranges
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTaskSpec`] for a zero amount, an empty
    /// mining target or a non-positive defend radius.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            TaskSpec::Mine { target, amount } => {
                if target.trim().is_empty() {
                    return Err(EngineError::InvalidTaskSpec(
                        "mine needs a target".to_string(),
                    ));
                }
                check_amount(*amount)
            }
            TaskSpec::GatherWood { amount, .. } => check_amount(*amount),
            TaskSpec::Farm { amount, .. } => amount.map_or(Ok(()), check_amount),
            TaskSpec::Defend { radius } => match radius {
                Some(r) if !(r.is_finite() && *r > 0.0) => Err(EngineError::InvalidTaskSpec(
                    format!("defend radius must be positive, got {}", r),
                )),
                _ => Ok(()),
            },
        }
    }

    /// Resolve loose item names to registry names
    pub fn normalized(&self, names: &ItemNames) -> TaskSpec {
        let all = |list: &[String]| -> Vec<String> {
            list.iter().map(|n| names.normalize(n)).collect()
        };
        match self {
            TaskSpec::Mine { target, amount } => TaskSpec::Mine {
                target: names.normalize(target),
                amount: *amount,
            },
            TaskSpec::GatherWood { types, amount } => TaskSpec::GatherWood {
                types: all(types),
                amount: *amount,
            },
            TaskSpec::Farm { crops, amount } => TaskSpec::Farm {
                crops: all(crops),
                amount: *amount,
            },
            TaskSpec::Defend { radius } => TaskSpec::Defend { radius: *radius },
        }
    }
}

fn check_amount(amount: u32) -> Result<(), EngineError> {
    if amount == 0 {
        return Err(EngineError::InvalidTaskSpec(
            "amount must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSpec::Mine { target, amount } => write!(f, "mine {} x{}", target, amount),
            TaskSpec::GatherWood { amount, .. } => write!(f, "gather_wood x{}", amount),
            TaskSpec::Farm {
                amount: Some(a), ..
            } => write!(f, "farm x{}", a),
            TaskSpec::Farm { amount: None, .. } => write!(f, "farm"),
            TaskSpec::Defend { .. } => write!(f, "defend"),
        }
    }
}

/// The active task
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub spec: TaskSpec,
    pub started_at: Instant,
    /// Last fallback wander, for rate limiting exploration
    pub last_wander_at: Option<Instant>,
}

impl Task {
    pub fn new(spec: TaskSpec, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            started_at: now,
            last_wander_at: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.spec.kind()
    }
}
