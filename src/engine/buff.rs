// Buff/debuff engine: the per-entity active-effect container.
//
// Effects are swept from the zone tick rather than carrying their own
// timers: expiry and periodic cursors are both advanced by the shared
// heartbeat, so a zone full of dots stays in lockstep.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What an active effect does while it is up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffCategory {
    Absorb,
    StatModifier,
    DamageBoost,
    HealBoost,
    Periodic,
}

/// Stats a `StatModifier` effect can touch. Data files naming anything
/// outside this set fail to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Power,
    Armor,
    CritChance,
    MoveSpeed,
}

/// Static definition of a buff or debuff.
///
/// `amount` is category-dependent: absorb capacity for `Absorb`, a signed
/// stat delta for `StatModifier`, and the per-tick value for `Periodic`
/// (negative ticks damage, positive ticks heal).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuffDef {
    pub id: u32,
    pub spell_id: u32,
    pub category: BuffCategory,
    #[serde(default)]
    pub stat: Option<Stat>,
    pub amount: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub is_debuff: bool,
    #[serde(default = "one")]
    pub stacks: u32,
    #[serde(default = "one")]
    pub max_stacks: u32,
    /// Tick period for `Periodic` effects; ignored otherwise.
    #[serde(default)]
    pub tick_interval_ms: i64,
}

fn one() -> u32 {
    1
}

/// A buff instance on one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveEffect {
    pub def: BuffDef,
    pub caster_id: u64,
    pub applied_at: i64,
    pub expires_at: i64,
    /// Remaining capacity for absorb effects.
    pub remaining_absorb: i64,
    /// When the next periodic tick is due.
    pub next_tick_at: i64,
}

impl ActiveEffect {
    pub fn active(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// One due periodic tick, produced by [`EffectContainer::periodic_due`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodicTick {
    pub effect_id: u32,
    pub spell_id: u32,
    pub caster_id: u64,
    /// Magnitude of the tick, always positive.
    pub amount: i64,
    pub is_heal: bool,
}

/// Active effects on one entity, keyed by effect id. The `BTreeMap` gives
/// the id-ascending iteration order that absorb consumption requires.
#[derive(Clone, Debug, Default)]
pub struct EffectContainer {
    effects: BTreeMap<u32, ActiveEffect>,
}

impl EffectContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ActiveEffect> {
        self.effects.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.effects.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.values()
    }

    /// Apply a buff. Re-applying the same effect id replaces the old
    /// instance (refresh), resetting duration, absorb capacity, and the
    /// periodic cursor.
    pub fn apply(&mut self, def: BuffDef, caster_id: u64, now: i64) {
        let remaining_absorb = if def.category == BuffCategory::Absorb {
            def.amount.max(0)
        } else {
            0
        };
        let next_tick_at = if def.category == BuffCategory::Periodic {
            now + def.tick_interval_ms.max(1)
        } else {
            i64::MAX
        };
        let effect = ActiveEffect {
            expires_at: now + def.duration_ms,
            applied_at: now,
            caster_id,
            remaining_absorb,
            next_tick_at,
            def,
        };
        self.effects.insert(effect.def.id, effect);
    }

    /// Remove an effect by id.
    pub fn remove(&mut self, id: u32) -> Result<ActiveEffect, EngineError> {
        self.effects.remove(&id).ok_or(EngineError::NotFound)
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Sum of active stat-modifier amounts for one stat.
    pub fn stat_modifier(&self, stat: Stat, now: i64) -> i64 {
        self.effects
            .values()
            .filter(|e| e.active(now))
            .filter(|e| e.def.category == BuffCategory::StatModifier && e.def.stat == Some(stat))
            .map(|e| e.def.amount)
            .sum()
    }

    /// Total remaining absorb capacity across active shields.
    pub fn total_absorb(&self, now: i64) -> i64 {
        self.effects
            .values()
            .filter(|e| e.active(now) && e.def.category == BuffCategory::Absorb)
            .map(|e| e.remaining_absorb)
            .sum()
    }

    /// Feed incoming damage through absorb shields, oldest effect id first.
    /// Returns `(absorbed, remaining_damage)`; the two always sum to
    /// `damage`. Fully drained shields are removed.
    pub fn consume_absorb(&mut self, damage: i64, now: i64) -> (i64, i64) {
        let mut remaining = damage.max(0);
        let mut absorbed = 0;
        let mut drained = Vec::new();

        for (&id, effect) in self.effects.iter_mut() {
            if remaining == 0 {
                break;
            }
            if effect.def.category != BuffCategory::Absorb || !effect.active(now) {
                continue;
            }
            if effect.remaining_absorb > remaining {
                effect.remaining_absorb -= remaining;
                absorbed += remaining;
                remaining = 0;
            } else {
                absorbed += effect.remaining_absorb;
                remaining -= effect.remaining_absorb;
                drained.push(id);
            }
        }
        for id in drained {
            self.effects.remove(&id);
        }
        (absorbed, remaining)
    }

    /// Drop expired effects, returning their ids for event emission.
    pub fn cleanup(&mut self, now: i64) -> Vec<u32> {
        let expired: Vec<u32> = self
            .effects
            .values()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.def.id)
            .collect();
        for id in &expired {
            self.effects.remove(id);
        }
        expired
    }

    /// Advance periodic cursors up to `now` and return the ticks that came
    /// due. A cursor that fell several intervals behind emits one tick per
    /// missed interval, keeping total healing/damage independent of
    /// heartbeat jitter.
    pub fn periodic_due(&mut self, now: i64) -> Vec<PeriodicTick> {
        let mut ticks = Vec::new();
        for effect in self.effects.values_mut() {
            if effect.def.category != BuffCategory::Periodic {
                continue;
            }
            let interval = effect.def.tick_interval_ms.max(1);
            while effect.next_tick_at <= now && effect.next_tick_at <= effect.expires_at {
                ticks.push(PeriodicTick {
                    effect_id: effect.def.id,
                    spell_id: effect.def.spell_id,
                    caster_id: effect.caster_id,
                    amount: effect.def.amount.abs(),
                    is_heal: effect.def.amount > 0,
                });
                effect.next_tick_at += interval;
            }
        }
        ticks
    }
}
