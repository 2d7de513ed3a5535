//! Configuration management
//!
//! This module handles loading, validation, and management of the Kestrel
//! configuration. Configuration is stored in TOML format at
//! ~/.kestrel/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Agent name, log level, data directory
//! - **safety**: Mining safety switch, reach and placement search radius
//! - **tasks**: Search radii, candidate caps and wander pacing per task kind
//! - **reflex**: Auto-eat thresholds and threat reflex parameters
//! - **movement**: Wander and follow anti-oscillation parameters
//! - **items**: Extra item-name aliases
//!
//! Every section except `core` may be omitted; missing values fall back to
//! the defaults below.
//!
//! # Examples
//!
//! ```no_run
//! use kestrel_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Agent: {}", config.core.agent_name);
//! println!("Safe mining: {}", config.safety.safe_mining);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Mining and placement safety
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Long-running task parameters
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Reflex thresholds
    #[serde(default)]
    pub reflex: ReflexConfig,

    /// Movement arbitration
    #[serde(default)]
    pub movement: MovementConfig,

    /// Item aliases
    #[serde(default)]
    pub items: ItemsConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// In-game username of the agent, recorded as `placed_by`
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Safety filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// When false every block is considered minable (creative/trusted worlds)
    #[serde(default = "default_true")]
    pub safe_mining: bool,

    /// Maximum distance to a placement reference before travelling closer
    #[serde(default = "default_reach")]
    pub reach: f64,

    /// Radius of the "place on any nearby surface" fallback search
    #[serde(default = "default_fallback_radius")]
    pub fallback_radius: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            safe_mining: true,
            reach: default_reach(),
            fallback_radius: default_fallback_radius(),
        }
    }
}

/// Long-running task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_mine_radius")]
    pub mine_radius: f64,

    #[serde(default = "default_mine_candidates")]
    pub mine_candidates: usize,

    #[serde(default = "default_wood_radius")]
    pub wood_radius: f64,

    #[serde(default = "default_wood_candidates")]
    pub wood_candidates: usize,

    /// Minimum gap between fallback wanders while gathering wood
    #[serde(default = "default_wood_wander_interval_ms")]
    pub wood_wander_interval_ms: u64,

    #[serde(default = "default_wood_wander_range")]
    pub wood_wander_range: f64,

    #[serde(default = "default_farm_radius")]
    pub farm_radius: f64,

    #[serde(default = "default_farm_candidates")]
    pub farm_candidates: usize,

    /// Minimum gap between fallback wanders while farming
    #[serde(default = "default_farm_wander_interval_ms")]
    pub farm_wander_interval_ms: u64,

    #[serde(default = "default_farm_wander_range")]
    pub farm_wander_range: f64,

    /// Radius inside which a hostile keeps a defend task alive
    #[serde(default = "default_defend_radius")]
    pub defend_radius: f64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            mine_radius: default_mine_radius(),
            mine_candidates: default_mine_candidates(),
            wood_radius: default_wood_radius(),
            wood_candidates: default_wood_candidates(),
            wood_wander_interval_ms: default_wood_wander_interval_ms(),
            wood_wander_range: default_wood_wander_range(),
            farm_radius: default_farm_radius(),
            farm_candidates: default_farm_candidates(),
            farm_wander_interval_ms: default_farm_wander_interval_ms(),
            farm_wander_range: default_farm_wander_range(),
            defend_radius: default_defend_radius(),
        }
    }
}

/// Reflex configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexConfig {
    /// Eat when health drops below this...
    #[serde(default = "default_low_health")]
    pub low_health: f32,

    /// ...and food is below this
    #[serde(default = "default_low_food")]
    pub low_food: f32,

    #[serde(default = "default_eat_cooldown_ms")]
    pub eat_cooldown_ms: u64,

    /// Entity names that trigger the panic maneuver
    #[serde(default = "default_threats")]
    pub threats: Vec<String>,

    #[serde(default = "default_threat_radius")]
    pub threat_radius: f64,

    /// How long the panic maneuver holds its controls
    #[serde(default = "default_panic_ms")]
    pub panic_ms: u64,

    /// Distance of the escape point from the agent
    #[serde(default = "default_escape_distance")]
    pub escape_distance: f64,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            low_health: default_low_health(),
            low_food: default_low_food(),
            eat_cooldown_ms: default_eat_cooldown_ms(),
            threats: default_threats(),
            threat_radius: default_threat_radius(),
            panic_ms: default_panic_ms(),
            escape_distance: default_escape_distance(),
        }
    }
}

impl ReflexConfig {
    pub fn eat_cooldown(&self) -> Duration {
        Duration::from_millis(self.eat_cooldown_ms)
    }

    pub fn panic_window(&self) -> Duration {
        Duration::from_millis(self.panic_ms)
    }
}

/// Movement arbitration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Minimum gap between wander goal replacements while moving
    #[serde(default = "default_wander_min_interval_ms")]
    pub wander_min_interval_ms: u64,

    /// Candidates closer than this to the previous wander target are retried
    #[serde(default = "default_wander_repeat_radius")]
    pub wander_repeat_radius: f64,

    #[serde(default = "default_wander_attempts")]
    pub wander_attempts: u32,

    #[serde(default = "default_follow_window_ms")]
    pub follow_window_ms: u64,

    /// Follow requests toward one label within the window before switching
    #[serde(default = "default_follow_max_attempts")]
    pub follow_max_attempts: u32,

    #[serde(default = "default_follow_range")]
    pub follow_range: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            wander_min_interval_ms: default_wander_min_interval_ms(),
            wander_repeat_radius: default_wander_repeat_radius(),
            wander_attempts: default_wander_attempts(),
            follow_window_ms: default_follow_window_ms(),
            follow_max_attempts: default_follow_max_attempts(),
            follow_range: default_follow_range(),
        }
    }
}

/// Item alias configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemsConfig {
    /// Extra spoken name -> registry name mappings
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

// Default value functions
fn default_agent_name() -> String {
    "kestrel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.kestrel")
}

fn default_reach() -> f64 {
    4.5
}

fn default_fallback_radius() -> f64 {
    4.0
}

fn default_mine_radius() -> f64 {
    32.0
}

fn default_mine_candidates() -> usize {
    20
}

fn default_wood_radius() -> f64 {
    48.0
}

fn default_wood_candidates() -> usize {
    30
}

fn default_wood_wander_interval_ms() -> u64 {
    12_000
}

fn default_wood_wander_range() -> f64 {
    32.0
}

fn default_farm_radius() -> f64 {
    32.0
}

fn default_farm_candidates() -> usize {
    30
}

fn default_farm_wander_interval_ms() -> u64 {
    15_000
}

fn default_farm_wander_range() -> f64 {
    24.0
}

fn default_defend_radius() -> f64 {
    10.0
}

fn default_low_health() -> f32 {
    10.0
}

fn default_low_food() -> f32 {
    20.0
}

fn default_eat_cooldown_ms() -> u64 {
    5_000
}

fn default_threats() -> Vec<String> {
    vec!["creeper".to_string()]
}

fn default_threat_radius() -> f64 {
    4.0
}

fn default_panic_ms() -> u64 {
    1_000
}

fn default_escape_distance() -> f64 {
    5.0
}

fn default_wander_min_interval_ms() -> u64 {
    8_000
}

fn default_wander_repeat_radius() -> f64 {
    3.0
}

fn default_wander_attempts() -> u32 {
    3
}

fn default_follow_window_ms() -> u64 {
    15_000
}

fn default_follow_max_attempts() -> u32 {
    3
}

fn default_follow_range() -> f64 {
    2.0
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location (~/.kestrel/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.kestrel/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".kestrel").join("config.toml"))
    }

    /// Create a default configuration
    fn default_config() -> Self {
        Self {
            core: CoreConfig {
                agent_name: default_agent_name(),
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            safety: SafetyConfig::default(),
            tasks: TasksConfig::default(),
            reflex: ReflexConfig::default(),
            movement: MovementConfig::default(),
            items: ItemsConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("kestrel.db")
    }

    /// Validate and process configuration
    ///
    /// Checks value ranges and expands ~ in the data directory. Does not
    /// touch the file system.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.agent_name.trim().is_empty() {
            return Err(EngineError::Config(
                "agent_name must not be empty".to_string(),
            ));
        }

        let radii = [
            ("safety.reach", self.safety.reach),
            ("safety.fallback_radius", self.safety.fallback_radius),
            ("tasks.mine_radius", self.tasks.mine_radius),
            ("tasks.wood_radius", self.tasks.wood_radius),
            ("tasks.farm_radius", self.tasks.farm_radius),
            ("tasks.defend_radius", self.tasks.defend_radius),
            ("reflex.threat_radius", self.reflex.threat_radius),
        ];
        for (name, value) in radii {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Config(format!(
                    "{} must be a positive number",
                    name
                )));
            }
        }

        if self.movement.follow_max_attempts == 0 {
            return Err(EngineError::Config(
                "movement.follow_max_attempts must be at least 1".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
