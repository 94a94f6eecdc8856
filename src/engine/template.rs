// Static creature definitions, loaded once from JSON and shared read-only.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

/// How a creature's faction category relates to players.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactionCategory {
    /// Hostile to all players.
    Hostile,
    /// Hostile to none unless explicitly attacked.
    Neutral,
    /// Never hostile.
    Friendly,
}

/// AI disposition: whether a creature starts fights, answers them, or
/// ignores them entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Passive,
    Aggressive,
    Defensive,
}

/// Reputation granted to a kill's participants.
#[derive(Clone, Debug, Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct ReputationReward {
    pub faction_id: u32,
    pub amount: i32,
}

pub const MELEE_ATTACK_RANGE: f32 = 5.0;
pub const RANGED_ATTACK_RANGE: f32 = 20.0;

fn default_aggro_range() -> f32 {
    15.0
}

fn default_leash_range() -> f32 {
    40.0
}

fn default_social_aggro_range() -> f32 {
    10.0
}

fn default_attack_speed_ms() -> i64 {
    2_000
}

fn default_move_speed() -> f32 {
    7.0
}

/// Immutable creature definition keyed by template id.
#[derive(Clone, Debug, Deserialize)]
pub struct CreatureTemplate {
    pub id: u32,
    pub name: String,
    pub level: u32,
    pub max_health: i64,
    pub faction: FactionCategory,
    #[serde(default)]
    pub display_id: u32,
    pub disposition: Disposition,
    #[serde(default = "default_aggro_range")]
    pub aggro_range: f32,
    #[serde(default = "default_leash_range")]
    pub leash_range: f32,
    #[serde(default = "default_social_aggro_range")]
    pub social_aggro_range: f32,
    pub respawn_time_ms: i64,
    pub xp_reward: u64,
    /// 0 means no loot table.
    #[serde(default)]
    pub loot_table_id: u32,
    pub damage_min: i64,
    pub damage_max: i64,
    #[serde(default = "default_attack_speed_ms")]
    pub attack_speed_ms: i64,
    #[serde(default)]
    pub is_ranged: bool,
    /// Explicit attack range; when absent the melee/ranged default applies.
    #[serde(default)]
    pub attack_range: Option<f32>,
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// 0 disables wandering.
    #[serde(default)]
    pub wander_range: f32,
    #[serde(default)]
    pub reputation_rewards: Vec<ReputationReward>,
}

impl CreatureTemplate {
    pub fn attack_range(&self) -> f32 {
        self.attack_range.unwrap_or(if self.is_ranged {
            RANGED_ATTACK_RANGE
        } else {
            MELEE_ATTACK_RANGE
        })
    }
}

/// In-memory store of all creature templates.
#[derive(Default)]
pub struct TemplateStore {
    templates: HashMap<u32, Arc<CreatureTemplate>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store from a JSON array of templates.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let templates: Vec<CreatureTemplate> =
            serde_json::from_str(json).map_err(|e| format!("invalid template data: {e}"))?;
        let mut store = Self::new();
        for t in templates {
            store.insert(t);
        }
        Ok(store)
    }

    /// Load templates from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn insert(&mut self, template: CreatureTemplate) {
        self.templates.insert(template.id, Arc::new(template));
    }

    pub fn get(&self, id: u32) -> Option<Arc<CreatureTemplate>> {
        self.templates.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
