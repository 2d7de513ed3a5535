//! Item name normalisation
//!
//! Players refer to items loosely ("Oak", "cobble", "dark oak"). Task specs
//! and skills resolve those to registry names before touching the world.

use std::collections::HashMap;

/// Built-in spoken name -> registry name table
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("oak", "oak_log"),
    ("oak wood", "oak_log"),
    ("birch", "birch_log"),
    ("birch wood", "birch_log"),
    ("spruce", "spruce_log"),
    ("pine", "spruce_log"),
    ("jungle", "jungle_log"),
    ("acacia", "acacia_log"),
    ("dark oak", "dark_oak_log"),
    ("mangrove", "mangrove_log"),
    ("cherry", "cherry_log"),
    ("planks", "oak_planks"),
    ("wood planks", "oak_planks"),
    ("cobble", "cobblestone"),
    ("rock", "stone"),
    ("iron", "iron_ore"),
    ("gold", "gold_ore"),
    ("diamonds", "diamond_ore"),
    ("coal ore", "coal_ore"),
    ("potatoes", "potatoes"),
    ("carrots", "carrots"),
    ("beets", "beetroots"),
];

/// Log species counted by a wood-gathering task when none are requested
pub const DEFAULT_LOG_TYPES: &[&str] = &[
    "oak_log",
    "birch_log",
    "spruce_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
    "mangrove_log",
    "cherry_log",
];

/// Resolves loose item names to registry names
#[derive(Debug, Clone)]
pub struct ItemNames {
    aliases: HashMap<String, String>,
}

impl ItemNames {
    /// Built-in aliases only
    pub fn new() -> Self {
        Self::with_aliases(&HashMap::new())
    }

    /// Built-in aliases plus `extra`; entries in `extra` win
    pub fn with_aliases(extra: &HashMap<String, String>) -> Self {
        let mut aliases: HashMap<String, String> = BUILTIN_ALIASES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in extra {
            aliases.insert(k.trim().to_lowercase(), v.clone());
        }
        Self { aliases }
    }

    /// Lowercase, trim, apply aliases, and join words with underscores
    ///
    /// ```
    /// use kestrel_engine::items::ItemNames;
    ///
    /// let names = ItemNames::new();
    /// assert_eq!(names.normalize("  Dark Oak "), "dark_oak_log");
    /// assert_eq!(names.normalize("Red Sand"), "red_sand");
    /// ```
    pub fn normalize(&self, name: &str) -> String {
        let raw = name.trim().to_lowercase();
        if let Some(hit) = self.aliases.get(&raw) {
            return hit.clone();
        }
        let joined = raw.split_whitespace().collect::<Vec<_>>().join("_");
        if let Some(hit) = self.aliases.get(&joined) {
            return hit.clone();
        }
        // Aliases are keyed with spaces; "dark_oak" should resolve like "dark oak"
        let spaced = joined.replace('_', " ");
        self.aliases.get(&spaced).cloned().unwrap_or(joined)
    }
}

impl Default for ItemNames {
    fn default() -> Self {
        Self::new()
    }
}
