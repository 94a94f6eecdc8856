// Corpses: short-lived lootable remains with per-looter eligibility.

use std::collections::HashSet;

use crate::error::EngineError;

use super::geometry::Vec3;
use super::loot::LootDrop;

/// How long a corpse stays lootable after creation.
pub const CORPSE_DESPAWN_MS: i64 = 120_000;

/// A lootable corpse. Loot is personal: every eligible looter can take the
/// full drop list exactly once.
#[derive(Clone, Debug)]
pub struct Corpse {
    pub id: u64,
    pub source_creature: u64,
    pub position: Vec3,
    pub world_id: u32,
    pub instance_id: u32,
    loot: Vec<LootDrop>,
    eligible: HashSet<u64>,
    looted_by: HashSet<u64>,
    pub created_at: i64,
    pub despawn_at: i64,
}

impl Corpse {
    pub fn new(
        id: u64,
        source_creature: u64,
        position: Vec3,
        world_id: u32,
        instance_id: u32,
        loot: Vec<LootDrop>,
        eligible: HashSet<u64>,
        now: i64,
    ) -> Self {
        Corpse {
            id,
            source_creature,
            position,
            world_id,
            instance_id,
            loot,
            eligible,
            looted_by: HashSet::new(),
            created_at: now,
            despawn_at: now + CORPSE_DESPAWN_MS,
        }
    }

    pub fn loot(&self) -> &[LootDrop] {
        &self.loot
    }

    /// Whether `looter` may still take this corpse's loot.
    pub fn can_loot(&self, looter: u64) -> bool {
        !self.loot.is_empty() && self.eligible.contains(&looter) && !self.looted_by.contains(&looter)
    }

    /// Consume the loot for one looter. Ineligible or repeat looters are
    /// rejected without state change.
    pub fn take_loot(&mut self, looter: u64) -> Result<Vec<LootDrop>, EngineError> {
        if !self.eligible.contains(&looter) {
            return Err(EngineError::InvalidTarget);
        }
        if self.looted_by.contains(&looter) || self.loot.is_empty() {
            return Err(EngineError::NotFound);
        }
        self.looted_by.insert(looter);
        Ok(self.loot.clone())
    }

    /// Whether every eligible looter has taken their share.
    pub fn fully_looted(&self) -> bool {
        self.loot.is_empty() || self.eligible.iter().all(|id| self.looted_by.contains(id))
    }

    pub fn expired(&self, now: i64) -> bool {
        now >= self.despawn_at
    }
}
