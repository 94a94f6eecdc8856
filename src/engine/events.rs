// Outbound events: what a zone tells observer sessions.
//
// Events fan out over a broadcast channel. Slow subscribers lag and drop
// messages; a zone worker never blocks on delivery.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::metrics;

use super::geometry::Vec3;
use super::loot::LootDrop;
use super::template::ReputationReward;

/// Whether a spell effect damaged or healed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellEffectKind {
    Damage,
    Heal,
}

/// Everything a zone broadcasts upward.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldEvent {
    EntityMoved {
        id: u64,
        position: Vec3,
        rotation: Vec3,
    },
    EntityDeath {
        id: u64,
        killer_id: Option<u64>,
    },
    XpGain {
        player_id: u64,
        amount: u64,
    },
    SpellEffect {
        caster_id: u64,
        target_id: u64,
        spell_id: u32,
        kind: SpellEffectKind,
        amount: i64,
        absorbed: i64,
        crit: bool,
    },
    KillRewards {
        killer_id: u64,
        victim_id: u64,
        xp: u64,
        drops: Vec<LootDrop>,
        reputation: Vec<ReputationReward>,
    },
    CorpseSpawn {
        corpse_id: u64,
        source_creature: u64,
        position: Vec3,
    },
    CorpseLootTaken {
        corpse_id: u64,
        looter_id: u64,
        drops: Vec<LootDrop>,
    },
    BuffApplied {
        target_id: u64,
        effect_id: u32,
        spell_id: u32,
        caster_id: u64,
        is_debuff: bool,
    },
    BuffRemoved {
        target_id: u64,
        effect_id: u32,
    },
    BuffTick {
        target_id: u64,
        effect_id: u32,
        amount: i64,
        is_heal: bool,
    },
}

/// Capacity of the per-zone broadcast ring. Subscribers further behind
/// than this lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The zone's sending end of the broadcast port.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<WorldEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventSink { tx }
    }

    /// Deliver an event to all subscribers. Never blocks; an event with no
    /// listeners is counted and discarded.
    pub fn send(&self, event: WorldEvent) {
        if self.tx.send(event).is_err() {
            metrics::EVENTS_DROPPED_TOTAL.inc();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
