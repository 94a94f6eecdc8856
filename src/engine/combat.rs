// Combat resolution math and death bookkeeping shared by the zone.

use serde::Serialize;

use super::entity::Entity;
use super::geometry::Vec3;
use super::loot::LootDrop;
use super::spell::SpellSchool;
use super::template::ReputationReward;

/// Grace period before a dead player is force-respawned at a bindpoint.
pub const DEATH_GRACE_MS: i64 = 30_000;

/// Reduce incoming damage by the target's mitigation stat for the school.
/// Mitigation fractions are clamped to `0.0..=0.75`.
pub fn mitigate(amount: i64, school: SpellSchool, target: &Entity) -> i64 {
    let fraction = match school {
        SpellSchool::Physical => target.armor,
        SpellSchool::Magic => target.magic_resist,
        SpellSchool::Tech => target.tech_resist,
    }
    .clamp(0.0, 0.75);
    amount - (amount as f64 * fraction as f64) as i64
}

/// XP for a kill, scaled by the level difference `victim - killer`.
///
/// Bands: +5 and up 120%, +2..+4 110%, within one level 100%, -4..-2 50%,
/// -5 and below 10%. Integer math floors.
pub fn xp_from_kill(killer_level: u32, victim_level: u32, base: u64) -> u64 {
    let diff = victim_level as i64 - killer_level as i64;
    let percent: u64 = if diff >= 5 {
        120
    } else if diff >= 2 {
        110
    } else if diff >= -1 {
        100
    } else if diff >= -4 {
        50
    } else {
        10
    };
    base * percent / 100
}

/// Health percentage a player respawns with, by level.
pub fn respawn_health_percent(level: u32) -> u32 {
    if level < 20 {
        50
    } else if level < 40 {
        35
    } else {
        25
    }
}

/// Durability percentage lost on death, by level.
pub fn durability_penalty_percent(level: u32) -> u32 {
    if level < 10 {
        0
    } else if level < 30 {
        5
    } else if level < 50 {
        10
    } else {
        15
    }
}

/// Everything granted when a creature dies.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KillRewards {
    pub xp: u64,
    pub drops: Vec<LootDrop>,
    pub reputation: Vec<ReputationReward>,
}

/// Result of a `damage_entity` command.
#[derive(Clone, Debug, PartialEq)]
pub enum DamageOutcome {
    Damaged {
        absorbed: i64,
        dealt: i64,
        remaining_health: i64,
    },
    Killed {
        absorbed: i64,
        dealt: i64,
        rewards: KillRewards,
    },
}

/// A standing resurrection offer for a dead player.
#[derive(Clone, Copy, Debug)]
pub struct ResurrectionOffer {
    pub caster_id: u64,
    pub spell_id: u32,
    /// Health percentage granted on accept.
    pub health_percent: u32,
}

/// Death bookkeeping for one player, kept until they respawn.
#[derive(Clone, Debug)]
pub struct PlayerDeath {
    pub position: Vec3,
    pub killer_id: Option<u64>,
    pub died_at: i64,
    pub respawn_at: i64,
    pub resurrection: Option<ResurrectionOffer>,
}

impl PlayerDeath {
    pub fn new(position: Vec3, killer_id: Option<u64>, now: i64) -> Self {
        PlayerDeath {
            position,
            killer_id,
            died_at: now,
            respawn_at: now + DEATH_GRACE_MS,
            resurrection: None,
        }
    }
}

/// A registered respawn location.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct Bindpoint {
    pub id: u32,
    pub position: Vec3,
}

/// Closest bindpoint to a death position, by ground-plane distance.
pub fn nearest_bindpoint<'a>(position: Vec3, bindpoints: &'a [Bindpoint]) -> Option<&'a Bindpoint> {
    bindpoints.iter().min_by(|a, b| {
        position
            .distance_2d_sq(a.position)
            .total_cmp(&position.distance_2d_sq(b.position))
    })
}
