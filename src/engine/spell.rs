// Spell definitions, cooldown bookkeeping, and damage/heal math.
//
// Cast validation and effect application live on the zone, which owns the
// entities involved; this module holds the static definitions and the pure
// pieces of the resolver.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;

use super::buff::BuffDef;
use super::entity::Resource;
use super::geometry::Vec3;
use super::telegraph::TelegraphShape;

/// Damage school, deciding which mitigation stat applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellSchool {
    Physical,
    Magic,
    Tech,
}

/// What a spell may be aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[serde(rename = "self")]
    SelfCast,
    Enemy,
    Ally,
    Ground,
    Aoe,
}

/// Conditions that cancel a cast in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptFlag {
    Damage,
    Move,
    Stun,
}

/// One effect a completed cast applies to each struck target.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpellEffectDef {
    Damage {
        base: i64,
        scaling: f32,
        school: SpellSchool,
    },
    Heal {
        base: i64,
        scaling: f32,
    },
    Dot {
        base: i64,
        scaling: f32,
        duration_ms: i64,
        tick_interval_ms: i64,
        buff_id: u32,
    },
    Hot {
        base: i64,
        scaling: f32,
        duration_ms: i64,
        tick_interval_ms: i64,
        buff_id: u32,
    },
    Buff {
        buff: BuffDef,
    },
    Debuff {
        buff: BuffDef,
    },
}

fn default_true() -> bool {
    true
}

/// Static spell definition keyed by spell id.
#[derive(Clone, Debug, Deserialize)]
pub struct SpellDef {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub cast_time_ms: i64,
    pub range: f32,
    pub target_type: TargetType,
    #[serde(default)]
    pub cost: i64,
    #[serde(default = "default_resource")]
    pub resource: Resource,
    #[serde(default)]
    pub cooldown_ms: i64,
    #[serde(default = "default_true")]
    pub triggers_gcd: bool,
    #[serde(default)]
    pub interrupt_flags: Vec<InterruptFlag>,
    /// Shape for ground/aoe spells; point-target spells leave this unset.
    #[serde(default)]
    pub telegraph: Option<TelegraphShape>,
    pub effects: Vec<SpellEffectDef>,
}

fn default_resource() -> Resource {
    Resource::Energy
}

impl SpellDef {
    pub fn interrupted_by(&self, flag: InterruptFlag) -> bool {
        self.interrupt_flags.contains(&flag)
    }
}

/// All spell definitions.
#[derive(Default)]
pub struct SpellStore {
    spells: HashMap<u32, SpellDef>,
}

impl SpellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        let spells: Vec<SpellDef> =
            serde_json::from_str(json).map_err(|e| format!("invalid spell data: {e}"))?;
        let mut store = Self::new();
        for s in spells {
            store.insert(s);
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn insert(&mut self, spell: SpellDef) {
        self.spells.insert(spell.id, spell);
    }

    pub fn get(&self, id: u32) -> Option<&SpellDef> {
        self.spells.get(&id)
    }
}

/// Shared lockout after most casts.
pub const GLOBAL_COOLDOWN_MS: i64 = 1_000;

/// Per-caster cooldown state. Cooldowns are absolute expiration timestamps,
/// never decremented counters.
#[derive(Clone, Debug, Default)]
pub struct Cooldowns {
    until: HashMap<u32, i64>,
    gcd_until: i64,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the spell can fire at `now`, considering both its own
    /// cooldown and the global cooldown (unless exempt).
    pub fn ready(&self, spell: &SpellDef, now: i64) -> bool {
        if self.until.get(&spell.id).copied().unwrap_or(0) > now {
            return false;
        }
        !(spell.triggers_gcd && self.gcd_until > now)
    }

    /// Start the spell's cooldown and, if applicable, the GCD.
    pub fn trigger(&mut self, spell: &SpellDef, now: i64) {
        if spell.cooldown_ms > 0 {
            self.until.insert(spell.id, now + spell.cooldown_ms);
        }
        if spell.triggers_gcd {
            self.gcd_until = self.gcd_until.max(now + GLOBAL_COOLDOWN_MS);
        }
    }

    pub fn remaining(&self, spell_id: u32, now: i64) -> i64 {
        (self.until.get(&spell_id).copied().unwrap_or(0) - now).max(0)
    }
}

/// A cast with a wind-up, waiting on its completion time.
#[derive(Clone, Debug)]
pub struct ActiveCast {
    pub spell_id: u32,
    pub target_id: Option<u64>,
    pub position: Option<Vec3>,
    pub started_at: i64,
    pub end_at: i64,
}

/// Multiplier applied on a critical hit, as a ratio.
pub const CRIT_NUMERATOR: i64 = 3;
pub const CRIT_DENOMINATOR: i64 = 2;

/// Base-plus-scaling amount computation shared by damage and heals.
pub fn compute_amount(base: i64, scaling: f32, power: i64) -> i64 {
    base + (power as f32 * scaling) as i64
}

/// Roll a crit: `crit_chance` percent against `rand(1..=100)`.
pub fn roll_crit(crit_chance: i64, rng: &mut impl Rng) -> bool {
    rng.gen_range(1..=100) <= crit_chance
}

pub fn apply_crit(amount: i64) -> i64 {
    amount * CRIT_NUMERATOR / CRIT_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn bolt(id: u32, cooldown_ms: i64, triggers_gcd: bool) -> SpellDef {
        SpellDef {
            id,
            name: format!("Bolt {id}"),
            cast_time_ms: 0,
            range: 30.0,
            target_type: TargetType::Enemy,
            cost: 10,
            resource: Resource::Energy,
            cooldown_ms,
            triggers_gcd,
            interrupt_flags: vec![],
            telegraph: None,
            effects: vec![],
        }
    }

    #[test]
    fn test_cooldown_expires_at_absolute_time() {
        let spell = bolt(1, 5_000, false);
        let mut cd = Cooldowns::new();
        assert!(cd.ready(&spell, 0));

        cd.trigger(&spell, 1_000);
        assert!(!cd.ready(&spell, 5_999));
        assert!(cd.ready(&spell, 6_000));
        assert_eq!(cd.remaining(1, 2_000), 4_000);
    }

    #[test]
    fn test_gcd_blocks_other_gcd_spells() {
        let a = bolt(1, 0, true);
        let b = bolt(2, 0, true);
        let off_gcd = bolt(3, 0, false);

        let mut cd = Cooldowns::new();
        cd.trigger(&a, 0);

        assert!(!cd.ready(&b, 500));
        assert!(cd.ready(&off_gcd, 500));
        assert!(cd.ready(&b, GLOBAL_COOLDOWN_MS));
    }

    #[test]
    fn test_compute_amount_scales_with_power() {
        assert_eq!(compute_amount(50, 0.5, 40), 70);
        assert_eq!(compute_amount(50, 0.0, 40), 50);
    }

    #[test]
    fn test_apply_crit_is_floor_of_one_and_a_half() {
        assert_eq!(apply_crit(100), 150);
        assert_eq!(apply_crit(7), 10);
    }

    #[test]
    fn test_roll_crit_extremes() {
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..100 {
            assert!(roll_crit(100, &mut rng));
            assert!(!roll_crit(0, &mut rng));
        }
    }

    #[test]
    fn test_spell_store_parses_effects() {
        let json = r#"[{
            "id": 101,
            "name": "Mind Burst",
            "range": 25.0,
            "target_type": "enemy",
            "cost": 30,
            "resource": "focus",
            "cooldown_ms": 8000,
            "effects": [
                {"kind": "damage", "base": 80, "scaling": 1.2, "school": "magic"},
                {"kind": "dot", "base": 10, "scaling": 0.2, "duration_ms": 6000,
                 "tick_interval_ms": 1000, "buff_id": 9101}
            ]
        }]"#;
        let store = SpellStore::from_json(json).unwrap();
        let spell = store.get(101).unwrap();
        assert_eq!(spell.effects.len(), 2);
        assert_eq!(spell.resource, Resource::Focus);
        assert!(spell.triggers_gcd);
    }

    #[test]
    fn test_unknown_effect_kind_rejected() {
        let json = r#"[{
            "id": 1, "name": "Bad", "range": 5.0, "target_type": "self",
            "effects": [{"kind": "summon_demon"}]
        }]"#;
        assert!(SpellStore::from_json(json).is_err());
    }
}
