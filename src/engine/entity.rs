// Entity model: every live thing a zone owns.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::buff::{EffectContainer, Stat};
use super::geometry::Vec3;

// GUID type tags, stored in the high 8 bits.
pub const GUID_TAG_PLAYER: u8 = 0x10;
pub const GUID_TAG_CREATURE: u8 = 0x02;
pub const GUID_TAG_OBJECT: u8 = 0x03;
pub const GUID_TAG_VEHICLE: u8 = 0x04;
pub const GUID_TAG_CORPSE: u8 = 0x06;

const GUID_TAG_SHIFT: u32 = 56;

/// What kind of thing an entity is. The kind is recoverable from the GUID
/// alone via [`EntityKind::of_guid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Creature,
    Object,
    Vehicle,
    Corpse,
}

impl EntityKind {
    pub fn tag(self) -> u8 {
        match self {
            EntityKind::Player => GUID_TAG_PLAYER,
            EntityKind::Creature => GUID_TAG_CREATURE,
            EntityKind::Object => GUID_TAG_OBJECT,
            EntityKind::Vehicle => GUID_TAG_VEHICLE,
            EntityKind::Corpse => GUID_TAG_CORPSE,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            GUID_TAG_PLAYER => Some(EntityKind::Player),
            GUID_TAG_CREATURE => Some(EntityKind::Creature),
            GUID_TAG_OBJECT => Some(EntityKind::Object),
            GUID_TAG_VEHICLE => Some(EntityKind::Vehicle),
            GUID_TAG_CORPSE => Some(EntityKind::Corpse),
            _ => None,
        }
    }

    /// Extract the kind encoded in a GUID's high byte.
    pub fn of_guid(guid: u64) -> Option<Self> {
        Self::from_tag((guid >> GUID_TAG_SHIFT) as u8)
    }

    /// Kinds for which `is_dead ⇔ health == 0` holds.
    pub fn is_combat_mortal(self) -> bool {
        matches!(self, EntityKind::Player | EntityKind::Creature)
    }
}

/// Allocates tagged 64-bit GUIDs from a counter scoped to the server
/// process. Never yields the same id twice, even across zones.
pub struct GuidAllocator {
    counter: AtomicU64,
}

impl GuidAllocator {
    pub const fn new() -> Self {
        GuidAllocator {
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self, kind: EntityKind) -> u64 {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ((kind.tag() as u64) << GUID_TAG_SHIFT) | n
    }
}

impl Default for GuidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static GUIDS: GuidAllocator = GuidAllocator::new();

/// Allocate a fresh GUID from the process-wide counter.
pub fn allocate_guid(kind: EntityKind) -> u64 {
    GUIDS.next(kind)
}

/// Spendable resource pools. Indexes into [`Entity::resources`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Energy,
    Focus,
}

pub const RESOURCE_KINDS: usize = 2;

impl Resource {
    pub fn index(self) -> usize {
        match self {
            Resource::Energy => 0,
            Resource::Focus => 1,
        }
    }
}

/// A live in-world object: player, creature, vehicle, or interactable.
///
/// Entities are plain data owned by exactly one zone; everything that
/// refers to one holds its GUID, never the struct itself.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: u64,
    pub kind: EntityKind,
    pub name: String,
    pub faction_id: u32,
    pub level: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub health: i64,
    pub max_health: i64,
    pub target_id: Option<u64>,
    pub xp: u64,
    pub is_dead: bool,
    pub effects: EffectContainer,
    pub resources: [i64; RESOURCE_KINDS],
    /// Base spell power; buffs add on top via stat modifiers.
    pub power: i64,
    /// Base crit chance in percent.
    pub crit_chance: i64,
    /// Mitigation fractions per damage school, `0.0..1.0`.
    pub armor: f32,
    pub magic_resist: f32,
    pub tech_resist: f32,
    pub account_id: Option<u64>,
    pub character_id: Option<u64>,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>, level: u32, max_health: i64) -> Self {
        Entity {
            id: allocate_guid(kind),
            kind,
            name: name.into(),
            faction_id: 0,
            level,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            health: max_health,
            max_health,
            target_id: None,
            xp: 0,
            is_dead: false,
            effects: EffectContainer::new(),
            resources: [100; RESOURCE_KINDS],
            power: 10,
            crit_chance: 5,
            armor: 0.0,
            magic_resist: 0.0,
            tech_resist: 0.0,
            account_id: None,
            character_id: None,
        }
    }

    pub fn player(
        name: impl Into<String>,
        level: u32,
        max_health: i64,
        account_id: u64,
        character_id: u64,
    ) -> Self {
        let mut e = Entity::new(EntityKind::Player, name, level, max_health);
        e.account_id = Some(account_id);
        e.character_id = Some(character_id);
        e
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }

    /// Reduce health, clamping at zero. Returns the amount actually taken.
    pub fn apply_damage(&mut self, amount: i64) -> i64 {
        let taken = amount.max(0).min(self.health);
        self.health -= taken;
        taken
    }

    /// Raise health, clamping at max. Returns the amount actually healed.
    pub fn heal(&mut self, amount: i64) -> i64 {
        let healed = amount.max(0).min(self.max_health - self.health);
        self.health += healed;
        healed
    }

    /// Effective spell power including stat-modifier buffs.
    pub fn effective_power(&self, now: i64) -> i64 {
        self.power + self.effects.stat_modifier(Stat::Power, now)
    }

    /// Effective crit chance in percent, clamped to `0..=100`.
    pub fn effective_crit_chance(&self, now: i64) -> i64 {
        (self.crit_chance + self.effects.stat_modifier(Stat::CritChance, now)).clamp(0, 100)
    }

    pub fn resource(&self, kind: Resource) -> i64 {
        self.resources[kind.index()]
    }

    pub fn spend_resource(&mut self, kind: Resource, amount: i64) {
        let slot = &mut self.resources[kind.index()];
        *slot = (*slot - amount).max(0);
    }
}
