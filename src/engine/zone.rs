// Zone instance: the single owner of all live state inside one world
// instance.
//
// A zone owns its entity table, creature records, corpses, spatial grid,
// and buff state, and is driven by ticks. All mutation happens through the
// command methods below; the actor in `registry` maps mailbox messages
// onto them. Intents from the AI are collected first and committed after,
// so a tick never mutates what it is still iterating.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metrics;

use super::ai::{AiContext, AiIntent, AiMode, PatrolMode, PatrolWaypoint, TargetInfo};
use super::buff::BuffDef;
use super::combat::{
    self, Bindpoint, DamageOutcome, KillRewards, PlayerDeath, ResurrectionOffer,
};
use super::corpse::Corpse;
use super::creature::Creature;
use super::entity::{allocate_guid, Entity, EntityKind};
use super::events::{EventSink, SpellEffectKind, WorldEvent};
use super::geometry::Vec3;
use super::loot::LootTableStore;
use super::spell::{
    self, ActiveCast, Cooldowns, InterruptFlag, SpellDef, SpellEffectDef, SpellSchool, SpellStore,
    TargetType,
};
use super::spatial::{SpatialGrid, DEFAULT_CELL_SIZE};
use super::telegraph::Telegraph;
use super::template::{CreatureTemplate, Disposition, FactionCategory, TemplateStore};

/// Default hit radius used when testing entities against telegraphs.
pub const DEFAULT_HIT_RADIUS: f32 = 1.0;

/// Fallback effect radius for ground spells without a telegraph shape.
const GROUND_EFFECT_RADIUS: f32 = 5.0;

/// Kinds of gatherable nodes a spawn table may place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestKind {
    Mineral,
    Plant,
    Tree,
    Relic,
}

/// A patrol route attached to a spawn entry.
#[derive(Clone, Debug, Deserialize)]
pub struct PatrolRoute {
    pub mode: PatrolMode,
    pub waypoints: Vec<PatrolWaypoint>,
}

/// One entry in a world's spawn table.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpawnDef {
    Creature {
        template_id: u32,
        position: Vec3,
        #[serde(default)]
        rotation: Vec3,
        #[serde(default)]
        patrol: Option<PatrolRoute>,
    },
    HarvestNode {
        node: HarvestKind,
        position: Vec3,
    },
}

/// Spawn table for one world.
#[derive(Clone, Debug, Deserialize)]
pub struct WorldSpawnTable {
    pub world_id: u32,
    pub spawns: Vec<SpawnDef>,
}

/// All static data shared read-only between zones.
#[derive(Default)]
pub struct StaticData {
    pub templates: TemplateStore,
    pub loot_tables: LootTableStore,
    pub spells: SpellStore,
    pub spawns: HashMap<u32, Vec<SpawnDef>>,
    pub bindpoints: Vec<Bindpoint>,
}

impl StaticData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all data files from a directory: `templates.json`,
    /// `loot_tables.json`, `spells.json`, `spawns.json`, `bindpoints.json`.
    /// Missing files leave the corresponding store empty.
    pub fn load(dir: &Path) -> Result<Self, String> {
        let mut data = Self::new();

        let templates = dir.join("templates.json");
        if templates.exists() {
            data.templates = TemplateStore::load(&templates)?;
        }
        let loot = dir.join("loot_tables.json");
        if loot.exists() {
            data.loot_tables = LootTableStore::load(&loot)?;
        }
        let spells = dir.join("spells.json");
        if spells.exists() {
            data.spells = SpellStore::load(&spells)?;
        }
        let spawns = dir.join("spawns.json");
        if spawns.exists() {
            let contents = std::fs::read_to_string(&spawns)
                .map_err(|e| format!("failed to read {}: {e}", spawns.display()))?;
            let tables: Vec<WorldSpawnTable> = serde_json::from_str(&contents)
                .map_err(|e| format!("invalid spawn data: {e}"))?;
            for table in tables {
                data.spawns.insert(table.world_id, table.spawns);
            }
        }
        let bindpoints = dir.join("bindpoints.json");
        if bindpoints.exists() {
            let contents = std::fs::read_to_string(&bindpoints)
                .map_err(|e| format!("failed to read {}: {e}", bindpoints.display()))?;
            data.bindpoints = serde_json::from_str(&contents)
                .map_err(|e| format!("invalid bindpoint data: {e}"))?;
        }
        Ok(data)
    }
}

/// Per-zone tunables.
#[derive(Clone, Copy, Debug)]
pub struct ZoneSettings {
    pub cell_size: f32,
    pub lazy_loading: bool,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        ZoneSettings {
            cell_size: DEFAULT_CELL_SIZE,
            lazy_loading: true,
        }
    }
}

/// Result of a cast command.
#[derive(Clone, Debug, PartialEq)]
pub enum CastOutcome {
    Instant { effects: Vec<AppliedEffect> },
    Started { end_at: i64 },
}

/// One resolved spell effect on one target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppliedEffect {
    pub target_id: u64,
    pub kind: SpellEffectKind,
    pub amount: i64,
    pub crit: bool,
}

/// Snapshot of one entity for observers.
#[derive(Clone, Debug, Serialize)]
pub struct EntitySnapshot {
    pub id: u64,
    pub kind: EntityKind,
    pub name: String,
    pub position: Vec3,
    pub health: i64,
    pub max_health: i64,
    pub is_dead: bool,
    pub ai_mode: Option<AiMode>,
}

/// Snapshot of the whole zone at one tick.
#[derive(Clone, Debug, Serialize)]
pub struct ZoneSnapshot {
    pub world_id: u32,
    pub instance_id: u32,
    pub entities: Vec<EntitySnapshot>,
    pub corpse_count: usize,
}

/// The authoritative state of one world instance.
pub struct Zone {
    pub world_id: u32,
    pub instance_id: u32,
    settings: ZoneSettings,
    data: Arc<StaticData>,
    entities: HashMap<u64, Entity>,
    creatures: HashMap<u64, Creature>,
    corpses: HashMap<u64, Corpse>,
    harvest_nodes: HashSet<u64>,
    grid: SpatialGrid,
    casts: HashMap<u64, ActiveCast>,
    cooldowns: HashMap<u64, Cooldowns>,
    player_deaths: HashMap<u64, PlayerDeath>,
    events: EventSink,
    rng: SmallRng,
    spawns_loaded: bool,
    player_count: usize,
    last_player_left: Option<i64>,
}

impl Zone {
    pub fn new(world_id: u32, instance_id: u32, data: Arc<StaticData>, settings: ZoneSettings) -> Self {
        Zone {
            world_id,
            instance_id,
            grid: SpatialGrid::new(settings.cell_size),
            settings,
            data,
            entities: HashMap::new(),
            creatures: HashMap::new(),
            corpses: HashMap::new(),
            harvest_nodes: HashSet::new(),
            casts: HashMap::new(),
            cooldowns: HashMap::new(),
            player_deaths: HashMap::new(),
            events: EventSink::new(),
            rng: SmallRng::from_entropy(),
            spawns_loaded: false,
            player_count: 0,
            last_player_left: None,
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(
        world_id: u32,
        instance_id: u32,
        data: Arc<StaticData>,
        settings: ZoneSettings,
        seed: u64,
    ) -> Self {
        let mut zone = Self::new(world_id, instance_id, data, settings);
        zone.rng = SmallRng::seed_from_u64(seed);
        zone
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn entity(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn creature(&self, id: u64) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn corpse(&self, id: u64) -> Option<&Corpse> {
        self.corpses.get(&id)
    }

    pub fn corpses(&self) -> impl Iterator<Item = &Corpse> {
        self.corpses.values()
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    pub fn last_player_left(&self) -> Option<i64> {
        self.last_player_left
    }

    pub fn spawns_loaded(&self) -> bool {
        self.spawns_loaded
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ── Entity lifecycle ─────────────────────────────────────────────

    /// Add an entity to the zone. The first player entering a lazily
    /// loaded zone triggers spawn-table resolution.
    pub fn add_entity(&mut self, entity: Entity, now: i64) -> Result<(), EngineError> {
        if self.entities.contains_key(&entity.id) {
            return Err(EngineError::AlreadyRegistered);
        }
        let id = entity.id;
        let position = entity.position;
        let is_player = entity.kind == EntityKind::Player;
        self.entities.insert(id, entity);
        self.grid.insert(id, position);
        metrics::ENTITIES.inc();

        if is_player {
            self.player_count += 1;
            self.last_player_left = None;
            if self.settings.lazy_loading && !self.spawns_loaded {
                self.load_spawns(now);
            }
        }
        Ok(())
    }

    /// Remove an entity. Creatures targeting it retarget from their threat
    /// tables on their next tick.
    pub fn remove_entity(&mut self, id: u64, now: i64) -> Result<Entity, EngineError> {
        let entity = self.entities.remove(&id).ok_or(EngineError::NotFound)?;
        self.grid.remove(id);
        self.casts.remove(&id);
        self.cooldowns.remove(&id);
        self.player_deaths.remove(&id);
        self.creatures.remove(&id);
        self.harvest_nodes.remove(&id);
        metrics::ENTITIES.dec();

        for creature in self.creatures.values_mut() {
            creature.ai.remove_target(id);
        }

        if entity.kind == EntityKind::Player {
            self.player_count = self.player_count.saturating_sub(1);
            if self.player_count == 0 {
                self.last_player_left = Some(now);
            }
        }
        Ok(entity)
    }

    /// Move an entity, updating the spatial index and cancelling casts
    /// that movement interrupts.
    pub fn move_entity(
        &mut self,
        id: u64,
        position: Vec3,
        rotation: Vec3,
        _now: i64,
    ) -> Result<(), EngineError> {
        let entity = self.entities.get_mut(&id).ok_or(EngineError::NotFound)?;
        entity.position = position;
        entity.rotation = rotation;
        self.grid.update(id, position);
        self.interrupt_cast(id, InterruptFlag::Move);
        self.events.send(WorldEvent::EntityMoved {
            id,
            position,
            rotation,
        });
        Ok(())
    }

    /// All entity ids within `radius` of `center`.
    pub fn query_range(&self, center: Vec3, radius: f32) -> Vec<u64> {
        self.grid.query_range(center, radius)
    }

    // ── Spawning ─────────────────────────────────────────────────────

    /// Resolve the spawn table for this zone's world. Idempotent.
    pub fn load_spawns(&mut self, now: i64) {
        if self.spawns_loaded {
            return;
        }
        self.spawns_loaded = true;
        let defs = match self.data.spawns.get(&self.world_id) {
            Some(d) => d.clone(),
            None => return,
        };
        let mut creatures = 0usize;
        let mut nodes = 0usize;
        for def in defs {
            match def {
                SpawnDef::Creature {
                    template_id,
                    position,
                    rotation,
                    patrol,
                } => match self.spawn_creature_full(template_id, position, rotation, patrol, now) {
                    Ok(_) => creatures += 1,
                    Err(_) => {
                        tracing::warn!(
                            world_id = self.world_id,
                            template_id,
                            "spawn entry references unknown template"
                        );
                    }
                },
                SpawnDef::HarvestNode { node, position } => {
                    let mut entity =
                        Entity::new(EntityKind::Object, format!("{node:?} Node"), 1, 1);
                    entity.position = position;
                    let id = entity.id;
                    self.entities.insert(id, entity);
                    self.grid.insert(id, position);
                    self.harvest_nodes.insert(id);
                    metrics::ENTITIES.inc();
                    nodes += 1;
                }
            }
        }
        tracing::info!(
            world_id = self.world_id,
            instance_id = self.instance_id,
            creatures,
            harvest_nodes = nodes,
            "spawns loaded"
        );
    }

    /// Spawn a creature from its template at a position.
    pub fn spawn_creature(
        &mut self,
        template_id: u32,
        position: Vec3,
        now: i64,
    ) -> Result<u64, EngineError> {
        self.spawn_creature_full(template_id, position, Vec3::ZERO, None, now)
    }

    fn spawn_creature_full(
        &mut self,
        template_id: u32,
        position: Vec3,
        rotation: Vec3,
        patrol: Option<PatrolRoute>,
        _now: i64,
    ) -> Result<u64, EngineError> {
        let template = self
            .data
            .templates
            .get(template_id)
            .ok_or(EngineError::TemplateNotFound)?;
        let mut entity = Entity::new(
            EntityKind::Creature,
            template.name.clone(),
            template.level,
            template.max_health,
        );
        entity.position = position;
        entity.rotation = rotation;
        let id = entity.id;

        let mut creature = Creature::new(id, template.clone(), position);
        if let Some(route) = patrol {
            creature.ai = super::ai::CreatureAi::with_patrol(route.waypoints, route.mode);
        }

        self.entities.insert(id, entity);
        self.creatures.insert(id, creature);
        self.grid.insert(id, position);
        metrics::ENTITIES.inc();
        metrics::CREATURES_SPAWNED_TOTAL
            .with_label_values(&[&template_id.to_string()])
            .inc();
        Ok(id)
    }

    // ── Combat commands ──────────────────────────────────────────────

    /// Apply damage to an entity: mitigation, absorb, threat, and death
    /// handling in one atomic step.
    pub fn damage_entity(
        &mut self,
        target_id: u64,
        attacker_id: u64,
        amount: i64,
        school: Option<SpellSchool>,
        now: i64,
    ) -> Result<DamageOutcome, EngineError> {
        let (absorbed, dealt, remaining, target_kind) = {
            let target = self
                .entities
                .get_mut(&target_id)
                .ok_or(EngineError::NotFound)?;
            if target.is_dead {
                return Err(EngineError::TargetDead);
            }
            let mitigated = school
                .map(|s| combat::mitigate(amount, s, target))
                .unwrap_or(amount)
                .max(0);
            let (absorbed, after_absorb) = target.effects.consume_absorb(mitigated, now);
            let dealt = target.apply_damage(after_absorb);
            (absorbed, dealt, target.health, target.kind)
        };

        self.interrupt_cast(target_id, InterruptFlag::Damage);

        // Threat and combat entry for creatures that fight back
        if self.creatures.contains_key(&target_id) {
            let entered = {
                let creature = self.creatures.get_mut(&target_id).unwrap();
                let fights = creature.fights_back();
                let was_in_combat = creature.ai.in_combat();
                creature
                    .ai
                    .note_damage(attacker_id, absorbed + dealt, now, fights);
                !was_in_combat && creature.ai.in_combat()
            };
            if entered {
                self.social_aggro(target_id, now);
            }
        }

        if remaining > 0 {
            return Ok(DamageOutcome::Damaged {
                absorbed,
                dealt,
                remaining_health: remaining,
            });
        }

        let rewards = match target_kind {
            EntityKind::Creature => self.handle_creature_death(target_id, attacker_id, now),
            EntityKind::Player => {
                self.handle_player_death(target_id, attacker_id, now);
                KillRewards::default()
            }
            _ => {
                if let Some(e) = self.entities.get_mut(&target_id) {
                    e.is_dead = true;
                }
                KillRewards::default()
            }
        };
        Ok(DamageOutcome::Killed {
            absorbed,
            dealt,
            rewards,
        })
    }

    /// Pull a creature into combat (taunts, scripted pulls, social aggro).
    pub fn enter_combat(
        &mut self,
        creature_id: u64,
        attacker_id: u64,
        now: i64,
    ) -> Result<(), EngineError> {
        if !self.entities.contains_key(&attacker_id) {
            return Err(EngineError::NotFound);
        }
        let entered = {
            let creature = self
                .creatures
                .get_mut(&creature_id)
                .ok_or(EngineError::NotFound)?;
            if creature.ai.is_dead() {
                return Err(EngineError::CreatureDead);
            }
            if !creature.fights_back() {
                return Ok(());
            }
            let was_in_combat = creature.ai.in_combat();
            creature.ai.enter_combat(attacker_id, now);
            !was_in_combat && creature.ai.in_combat()
        };
        if entered {
            self.social_aggro(creature_id, now);
        }
        Ok(())
    }

    /// Additive threat for an already-fighting creature (heals, taunts).
    pub fn add_threat(
        &mut self,
        creature_id: u64,
        source_id: u64,
        amount: i64,
    ) -> Result<(), EngineError> {
        let creature = self
            .creatures
            .get_mut(&creature_id)
            .ok_or(EngineError::NotFound)?;
        if !creature.ai.in_combat() {
            return Err(EngineError::NotInCombat);
        }
        creature.ai.add_threat(source_id, amount);
        Ok(())
    }

    /// Apply a buff directly (items, scripted effects).
    pub fn apply_buff(
        &mut self,
        target_id: u64,
        def: BuffDef,
        caster_id: u64,
        now: i64,
    ) -> Result<(), EngineError> {
        let target = self
            .entities
            .get_mut(&target_id)
            .ok_or(EngineError::NotFound)?;
        let event = WorldEvent::BuffApplied {
            target_id,
            effect_id: def.id,
            spell_id: def.spell_id,
            caster_id,
            is_debuff: def.is_debuff,
        };
        target.effects.apply(def, caster_id, now);
        self.events.send(event);
        Ok(())
    }

    /// Remove a buff by effect id.
    pub fn remove_buff(&mut self, target_id: u64, effect_id: u32) -> Result<(), EngineError> {
        let target = self
            .entities
            .get_mut(&target_id)
            .ok_or(EngineError::NotFound)?;
        target.effects.remove(effect_id)?;
        self.events.send(WorldEvent::BuffRemoved {
            target_id,
            effect_id,
        });
        Ok(())
    }

    // ── Spell casting ────────────────────────────────────────────────

    /// Validate and start (or instantly resolve) a cast.
    pub fn cast_spell(
        &mut self,
        caster_id: u64,
        spell_id: u32,
        target_id: Option<u64>,
        position: Option<Vec3>,
        now: i64,
    ) -> Result<CastOutcome, EngineError> {
        let result = self.cast_spell_inner(caster_id, spell_id, target_id, position, now);
        let label = if result.is_ok() { "ok" } else { "error" };
        metrics::SPELL_CASTS_TOTAL.with_label_values(&[label]).inc();
        result
    }

    fn cast_spell_inner(
        &mut self,
        caster_id: u64,
        spell_id: u32,
        target_id: Option<u64>,
        position: Option<Vec3>,
        now: i64,
    ) -> Result<CastOutcome, EngineError> {
        let spell = self
            .data
            .spells
            .get(spell_id)
            .ok_or(EngineError::UnknownSpell)?
            .clone();

        let caster = self.entities.get(&caster_id).ok_or(EngineError::NotFound)?;
        if caster.is_dead {
            return Err(EngineError::CasterDead);
        }
        let caster_pos = caster.position;
        let caster_faction = caster.faction_id;

        match spell.target_type {
            TargetType::SelfCast | TargetType::Aoe => {}
            TargetType::Enemy | TargetType::Ally => {
                let tid = target_id.ok_or(EngineError::InvalidTarget)?;
                let target = self.entities.get(&tid).ok_or(EngineError::InvalidTarget)?;
                if target.is_dead {
                    return Err(EngineError::TargetDead);
                }
                let same_faction = target.faction_id == caster_faction;
                let valid = match spell.target_type {
                    TargetType::Enemy => !same_faction && tid != caster_id,
                    TargetType::Ally => same_faction,
                    _ => unreachable!(),
                };
                if !valid {
                    return Err(EngineError::InvalidTarget);
                }
                if caster_pos.distance(target.position) > spell.range {
                    return Err(EngineError::OutOfRange);
                }
            }
            TargetType::Ground => {
                let pos = position.ok_or(EngineError::InvalidTarget)?;
                if caster_pos.distance(pos) > spell.range {
                    return Err(EngineError::OutOfRange);
                }
            }
        }

        let caster = &self.entities[&caster_id];
        if caster.resource(spell.resource) < spell.cost {
            return Err(EngineError::InsufficientResource);
        }

        let cooldowns = self.cooldowns.entry(caster_id).or_default();
        if !cooldowns.ready(&spell, now) {
            return Err(EngineError::OnCooldown);
        }

        if self.casts.contains_key(&caster_id) {
            return Err(EngineError::Busy);
        }

        if spell.cast_time_ms == 0 {
            let effects = self.execute_spell(caster_id, &spell, target_id, position, now);
            return Ok(CastOutcome::Instant { effects });
        }

        let end_at = now + spell.cast_time_ms;
        self.casts.insert(
            caster_id,
            ActiveCast {
                spell_id,
                target_id,
                position,
                started_at: now,
                end_at,
            },
        );
        Ok(CastOutcome::Started { end_at })
    }

    /// Cancel a cast in progress when `flag` is in the spell's interrupt
    /// set.
    fn interrupt_cast(&mut self, caster_id: u64, flag: InterruptFlag) {
        let interrupted = match self.casts.get(&caster_id) {
            Some(cast) => self
                .data
                .spells
                .get(cast.spell_id)
                .map(|s| s.interrupted_by(flag))
                .unwrap_or(true),
            None => false,
        };
        if interrupted {
            self.casts.remove(&caster_id);
        }
    }

    /// Resolve a completed cast: consume resource, start cooldowns, apply
    /// effects to every struck target.
    fn execute_spell(
        &mut self,
        caster_id: u64,
        spell: &SpellDef,
        target_id: Option<u64>,
        position: Option<Vec3>,
        now: i64,
    ) -> Vec<AppliedEffect> {
        let (caster_pos, caster_rot, caster_faction, power, crit_chance) =
            match self.entities.get_mut(&caster_id) {
                Some(caster) => {
                    caster.spend_resource(spell.resource, spell.cost);
                    (
                        caster.position,
                        caster.rotation,
                        caster.faction_id,
                        caster.effective_power(now),
                        caster.effective_crit_chance(now),
                    )
                }
                None => return Vec::new(),
            };
        self.cooldowns
            .entry(caster_id)
            .or_default()
            .trigger(spell, now);

        let targets: Vec<u64> = match spell.target_type {
            TargetType::SelfCast => vec![caster_id],
            TargetType::Enemy | TargetType::Ally => match target_id {
                Some(tid) if self.entities.get(&tid).is_some_and(|t| !t.is_dead) => vec![tid],
                _ => Vec::new(),
            },
            TargetType::Ground | TargetType::Aoe => {
                let center = if spell.target_type == TargetType::Ground {
                    position.unwrap_or(caster_pos)
                } else {
                    caster_pos
                };
                self.telegraph_targets(spell, center, caster_rot.z, caster_id, caster_faction)
            }
        };

        let mut applied = Vec::new();
        for effect in &spell.effects {
            for &tid in &targets {
                match effect {
                    SpellEffectDef::Damage {
                        base,
                        scaling,
                        school,
                    } => {
                        let mut amount = spell::compute_amount(*base, *scaling, power);
                        let crit = spell::roll_crit(crit_chance, &mut self.rng);
                        if crit {
                            amount = spell::apply_crit(amount);
                        }
                        let outcome =
                            self.damage_entity(tid, caster_id, amount, Some(*school), now);
                        if let Ok(outcome) = outcome {
                            let (absorbed, dealt) = match outcome {
                                DamageOutcome::Damaged {
                                    absorbed, dealt, ..
                                }
                                | DamageOutcome::Killed {
                                    absorbed, dealt, ..
                                } => (absorbed, dealt),
                            };
                            self.events.send(WorldEvent::SpellEffect {
                                caster_id,
                                target_id: tid,
                                spell_id: spell.id,
                                kind: SpellEffectKind::Damage,
                                amount: absorbed + dealt,
                                absorbed,
                                crit,
                            });
                            applied.push(AppliedEffect {
                                target_id: tid,
                                kind: SpellEffectKind::Damage,
                                amount: absorbed + dealt,
                                crit,
                            });
                        }
                    }
                    SpellEffectDef::Heal { base, scaling } => {
                        let mut amount = spell::compute_amount(*base, *scaling, power);
                        let crit = spell::roll_crit(crit_chance, &mut self.rng);
                        if crit {
                            amount = spell::apply_crit(amount);
                        }
                        if let Some(target) = self.entities.get_mut(&tid) {
                            if target.is_dead {
                                continue;
                            }
                            let healed = target.heal(amount);
                            self.events.send(WorldEvent::SpellEffect {
                                caster_id,
                                target_id: tid,
                                spell_id: spell.id,
                                kind: SpellEffectKind::Heal,
                                amount: healed,
                                absorbed: 0,
                                crit,
                            });
                            applied.push(AppliedEffect {
                                target_id: tid,
                                kind: SpellEffectKind::Heal,
                                amount: healed,
                                crit,
                            });
                        }
                    }
                    SpellEffectDef::Dot {
                        base,
                        scaling,
                        duration_ms,
                        tick_interval_ms,
                        buff_id,
                    } => {
                        let amount = spell::compute_amount(*base, *scaling, power);
                        let def = BuffDef {
                            id: *buff_id,
                            spell_id: spell.id,
                            category: super::buff::BuffCategory::Periodic,
                            stat: None,
                            amount: -amount,
                            duration_ms: *duration_ms,
                            is_debuff: true,
                            stacks: 1,
                            max_stacks: 1,
                            tick_interval_ms: *tick_interval_ms,
                        };
                        let _ = self.apply_buff(tid, def, caster_id, now);
                    }
                    SpellEffectDef::Hot {
                        base,
                        scaling,
                        duration_ms,
                        tick_interval_ms,
                        buff_id,
                    } => {
                        let amount = spell::compute_amount(*base, *scaling, power);
                        let def = BuffDef {
                            id: *buff_id,
                            spell_id: spell.id,
                            category: super::buff::BuffCategory::Periodic,
                            stat: None,
                            amount,
                            duration_ms: *duration_ms,
                            is_debuff: false,
                            stacks: 1,
                            max_stacks: 1,
                            tick_interval_ms: *tick_interval_ms,
                        };
                        let _ = self.apply_buff(tid, def, caster_id, now);
                    }
                    SpellEffectDef::Buff { buff } | SpellEffectDef::Debuff { buff } => {
                        let _ = self.apply_buff(tid, buff.clone(), caster_id, now);
                    }
                }
            }
        }
        applied
    }

    /// Entities struck by a spell's telegraph (or a fallback circle) at
    /// `center`: alive, hostile to the caster, never the caster itself.
    fn telegraph_targets(
        &self,
        spell: &SpellDef,
        center: Vec3,
        rotation_z: f32,
        caster_id: u64,
        caster_faction: u32,
    ) -> Vec<u64> {
        let telegraph = spell.telegraph.map(|shape| Telegraph::new(shape, center, rotation_z));
        let radius = telegraph
            .as_ref()
            .map(|t| t.search_radius(DEFAULT_HIT_RADIUS))
            .unwrap_or(GROUND_EFFECT_RADIUS);

        self.grid
            .query_range(center, radius)
            .into_iter()
            .filter(|&id| id != caster_id)
            .filter(|id| {
                self.entities.get(id).is_some_and(|e| {
                    !e.is_dead
                        && e.kind.is_combat_mortal()
                        && e.faction_id != caster_faction
                })
            })
            .filter(|id| match &telegraph {
                Some(t) => t.contains(self.entities[id].position, DEFAULT_HIT_RADIUS),
                None => true,
            })
            .collect()
    }

    // ── Death, corpses, rewards ──────────────────────────────────────

    fn handle_creature_death(&mut self, victim_id: u64, killer_id: u64, now: i64) -> KillRewards {
        let (template, participants) = {
            let creature = match self.creatures.get_mut(&victim_id) {
                Some(c) => c,
                None => return KillRewards::default(),
            };
            let template = creature.template.clone();
            creature.ai.participants.insert(killer_id);
            creature.ai.on_death(now, template.respawn_time_ms);
            (template, creature.ai.participants.clone())
        };

        let death_position = {
            let entity = self.entities.get_mut(&victim_id).expect("creature entity");
            entity.is_dead = true;
            entity.target_id = None;
            entity.position
        };
        self.casts.remove(&victim_id);

        // XP to the killer, scaled by level difference
        let mut xp = 0;
        if let Some(killer) = self.entities.get_mut(&killer_id) {
            if killer.kind == EntityKind::Player {
                xp = combat::xp_from_kill(killer.level, template.level, template.xp_reward);
                killer.xp += xp;
            }
        }

        let drops = self
            .data
            .loot_tables
            .get(template.loot_table_id)
            .map(|t| t.roll(&mut self.rng))
            .unwrap_or_default();

        let corpse_id = allocate_guid(EntityKind::Corpse);
        let corpse = Corpse::new(
            corpse_id,
            victim_id,
            death_position,
            self.world_id,
            self.instance_id,
            drops.clone(),
            participants,
            now,
        );
        self.corpses.insert(corpse_id, corpse);

        let rewards = KillRewards {
            xp,
            drops,
            reputation: template.reputation_rewards.clone(),
        };

        self.events.send(WorldEvent::EntityDeath {
            id: victim_id,
            killer_id: Some(killer_id),
        });
        if xp > 0 {
            self.events.send(WorldEvent::XpGain {
                player_id: killer_id,
                amount: xp,
            });
        }
        self.events.send(WorldEvent::KillRewards {
            killer_id,
            victim_id,
            xp: rewards.xp,
            drops: rewards.drops.clone(),
            reputation: rewards.reputation.clone(),
        });
        self.events.send(WorldEvent::CorpseSpawn {
            corpse_id,
            source_creature: victim_id,
            position: death_position,
        });
        metrics::CREATURES_KILLED_TOTAL
            .with_label_values(&[&template.id.to_string()])
            .inc();
        rewards
    }

    fn handle_player_death(&mut self, player_id: u64, killer_id: u64, now: i64) {
        let position = {
            let entity = self.entities.get_mut(&player_id).expect("player entity");
            entity.is_dead = true;
            entity.target_id = None;
            entity.position
        };
        self.casts.remove(&player_id);
        self.player_deaths
            .insert(player_id, PlayerDeath::new(position, Some(killer_id), now));
        self.events.send(WorldEvent::EntityDeath {
            id: player_id,
            killer_id: Some(killer_id),
        });
    }

    /// Record a resurrection offer for a dead player.
    pub fn offer_resurrection(
        &mut self,
        player_id: u64,
        caster_id: u64,
        spell_id: u32,
        health_percent: u32,
    ) -> Result<(), EngineError> {
        let death = self
            .player_deaths
            .get_mut(&player_id)
            .ok_or(EngineError::NotFound)?;
        death.resurrection = Some(ResurrectionOffer {
            caster_id,
            spell_id,
            health_percent,
        });
        Ok(())
    }

    /// Accept a pending resurrection: revive in place at the offered
    /// health, pre-empting the bindpoint respawn.
    pub fn accept_resurrection(&mut self, player_id: u64, now: i64) -> Result<(), EngineError> {
        let death = self
            .player_deaths
            .get(&player_id)
            .ok_or(EngineError::NotFound)?;
        let offer = death.resurrection.ok_or(EngineError::NotFound)?;
        let position = death.position;
        self.revive_player(player_id, position, offer.health_percent, now)
    }

    fn revive_player(
        &mut self,
        player_id: u64,
        position: Vec3,
        health_percent: u32,
        _now: i64,
    ) -> Result<(), EngineError> {
        let rotation = {
            let entity = self
                .entities
                .get_mut(&player_id)
                .ok_or(EngineError::NotFound)?;
            entity.is_dead = false;
            entity.health = (entity.max_health * health_percent as i64 / 100).max(1);
            entity.position = position;
            entity.rotation
        };
        self.grid.update(player_id, position);
        self.player_deaths.remove(&player_id);
        self.events.send(WorldEvent::EntityMoved {
            id: player_id,
            position,
            rotation,
        });
        Ok(())
    }

    /// Take a corpse's loot as `looter`.
    pub fn take_corpse_loot(
        &mut self,
        corpse_id: u64,
        looter_id: u64,
    ) -> Result<Vec<super::loot::LootDrop>, EngineError> {
        let corpse = self
            .corpses
            .get_mut(&corpse_id)
            .ok_or(EngineError::NotFound)?;
        let drops = corpse.take_loot(looter_id)?;
        self.events.send(WorldEvent::CorpseLootTaken {
            corpse_id,
            looter_id,
            drops: drops.clone(),
        });
        Ok(drops)
    }

    // ── Tick pipeline ────────────────────────────────────────────────

    /// Advance the zone one heartbeat.
    pub fn tick(&mut self, now: i64) {
        self.complete_due_casts(now);
        self.respawn_due_creatures(now);
        self.tick_creatures(now);
        self.tick_buffs(now);
        self.respawn_due_players(now);
        self.despawn_corpses(now);
    }

    fn complete_due_casts(&mut self, now: i64) {
        let due: Vec<u64> = self
            .casts
            .iter()
            .filter(|(_, c)| c.end_at <= now)
            .map(|(&id, _)| id)
            .collect();
        for caster_id in due {
            let cast = match self.casts.remove(&caster_id) {
                Some(c) => c,
                None => continue,
            };
            if self.entities.get(&caster_id).map_or(true, |e| e.is_dead) {
                continue;
            }
            let spell = match self.data.spells.get(cast.spell_id) {
                Some(s) => s.clone(),
                None => continue,
            };
            self.execute_spell(caster_id, &spell, cast.target_id, cast.position, now);
        }
    }

    fn respawn_due_creatures(&mut self, now: i64) {
        let due: Vec<u64> = self
            .creatures
            .iter()
            .filter(|(_, c)| c.ai.respawn_at.is_some_and(|at| at <= now))
            .map(|(&id, _)| id)
            .collect();
        for id in due {
            let spawn_position = {
                let creature = self.creatures.get_mut(&id).unwrap();
                creature.ai.on_respawn();
                creature.spawn_position
            };
            let rotation = {
                let entity = self.entities.get_mut(&id).expect("creature entity");
                entity.is_dead = false;
                entity.health = entity.max_health;
                entity.position = spawn_position;
                entity.rotation
            };
            self.grid.update(id, spawn_position);
            self.events.send(WorldEvent::EntityMoved {
                id,
                position: spawn_position,
                rotation,
            });
        }
    }

    fn tick_creatures(&mut self, now: i64) {
        let ids: Vec<u64> = self.creatures.keys().copied().collect();
        for id in ids {
            let (template, spawn_position, mode, target_id) = match self.creatures.get(&id) {
                Some(c) => (
                    c.template.clone(),
                    c.spawn_position,
                    c.ai.mode,
                    c.ai.target_id,
                ),
                None => continue,
            };
            if mode == AiMode::Dead {
                continue;
            }
            let position = match self.entities.get(&id) {
                Some(e) => e.position,
                None => continue,
            };

            // Aggro candidates are only relevant to idle aggressive mobs
            let hostiles: Vec<(u64, Vec3)> =
                if mode == AiMode::Idle && template.disposition == Disposition::Aggressive {
                    self.aggro_candidates(&template, position)
                } else {
                    Vec::new()
                };

            let target = target_id.and_then(|tid| {
                self.entities.get(&tid).map(|e| TargetInfo {
                    id: tid,
                    position: e.position,
                    alive: !e.is_dead,
                })
            });

            let ctx = AiContext {
                now,
                position,
                spawn_position,
                template: &template,
                hostiles: &hostiles,
                target,
            };
            let (intent, entered_combat) = {
                let creature = self.creatures.get_mut(&id).unwrap();
                let was_in_combat = creature.ai.in_combat();
                let intent = creature.ai.tick(&ctx, &mut self.rng);
                (intent, !was_in_combat && creature.ai.in_combat())
            };
            if entered_combat {
                self.social_aggro(id, now);
            }
            self.commit_intent(id, intent, now);
        }
    }

    /// Players this creature would attack on sight: alive, within aggro
    /// range, and of a faction the creature is hostile to.
    fn aggro_candidates(&self, template: &CreatureTemplate, position: Vec3) -> Vec<(u64, Vec3)> {
        if template.faction != FactionCategory::Hostile {
            return Vec::new();
        }
        self.grid
            .query_range(position, template.aggro_range)
            .into_iter()
            .filter_map(|id| {
                let e = self.entities.get(&id)?;
                (e.kind == EntityKind::Player && !e.is_dead).then_some((id, e.position))
            })
            .collect()
    }

    fn commit_intent(&mut self, id: u64, intent: AiIntent, now: i64) {
        match intent {
            AiIntent::None => {}
            AiIntent::Attack { target_id } => self.auto_attack(id, target_id, now),
            AiIntent::MoveTo { position }
            | AiIntent::WanderComplete { position }
            | AiIntent::PatrolSegmentComplete { position }
            | AiIntent::ChaseComplete { position } => {
                self.commit_creature_move(id, position);
            }
            AiIntent::StartWander { destination }
            | AiIntent::StartPatrol { destination }
            | AiIntent::StartChase { destination }
            | AiIntent::StartEvade { destination } => {
                // Face the destination; movement follows on later ticks
                if let Some(entity) = self.entities.get_mut(&id) {
                    entity.rotation.z = entity.position.bearing_to(destination);
                    let (position, rotation) = (entity.position, entity.rotation);
                    self.events.send(WorldEvent::EntityMoved {
                        id,
                        position,
                        rotation,
                    });
                }
            }
            AiIntent::EvadeComplete { position } => {
                self.commit_creature_move(id, position);
                if let Some(entity) = self.entities.get_mut(&id) {
                    entity.health = entity.max_health;
                    entity.target_id = None;
                }
            }
        }
    }

    fn commit_creature_move(&mut self, id: u64, position: Vec3) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.position = position;
            let rotation = entity.rotation;
            self.grid.update(id, position);
            self.events.send(WorldEvent::EntityMoved {
                id,
                position,
                rotation,
            });
        }
    }

    /// A creature auto-attack: template damage roll through the normal
    /// damage pipeline.
    fn auto_attack(&mut self, attacker_id: u64, target_id: u64, now: i64) {
        let (damage_min, damage_max) = match self.creatures.get(&attacker_id) {
            Some(c) => (c.template.damage_min, c.template.damage_max),
            None => return,
        };
        let amount = if damage_max > damage_min {
            self.rng.gen_range(damage_min..=damage_max)
        } else {
            damage_min
        };
        if amount <= 0 {
            return;
        }
        if let Ok(outcome) =
            self.damage_entity(target_id, attacker_id, amount, Some(SpellSchool::Physical), now)
        {
            let (absorbed, dealt) = match outcome {
                DamageOutcome::Damaged {
                    absorbed, dealt, ..
                }
                | DamageOutcome::Killed {
                    absorbed, dealt, ..
                } => (absorbed, dealt),
            };
            self.events.send(WorldEvent::SpellEffect {
                caster_id: attacker_id,
                target_id,
                spell_id: 0,
                kind: SpellEffectKind::Damage,
                amount: absorbed + dealt,
                absorbed,
                crit: false,
            });
        }
    }

    /// Spread combat to nearby same-faction idle creatures. Entering
    /// combat recursively pulls their own neighbors.
    fn social_aggro(&mut self, creature_id: u64, now: i64) {
        let mut worklist = vec![creature_id];
        while let Some(cid) = worklist.pop() {
            let (faction, range, target) = match self.creatures.get(&cid) {
                Some(c) => match c.ai.target_id {
                    Some(t) => (c.template.faction, c.template.social_aggro_range, t),
                    None => continue,
                },
                None => continue,
            };
            let center = match self.entities.get(&cid) {
                Some(e) => e.position,
                None => continue,
            };
            for other_id in self.grid.query_range(center, range) {
                if other_id == cid {
                    continue;
                }
                let joined = match self.creatures.get_mut(&other_id) {
                    Some(other) => {
                        if other.template.faction != faction
                            || !other.fights_back()
                            || other.ai.in_combat()
                            || other.ai.is_dead()
                        {
                            false
                        } else {
                            other.ai.enter_combat(target, now);
                            other.ai.in_combat()
                        }
                    }
                    None => false,
                };
                if joined {
                    worklist.push(other_id);
                }
            }
        }
    }

    fn tick_buffs(&mut self, now: i64) {
        let ids: Vec<u64> = self.entities.keys().copied().collect();
        let mut pending: Vec<(u64, super::buff::PeriodicTick)> = Vec::new();

        for id in &ids {
            let entity = match self.entities.get_mut(id) {
                Some(e) => e,
                None => continue,
            };
            for tick in entity.effects.periodic_due(now) {
                pending.push((*id, tick));
            }
            for effect_id in entity.effects.cleanup(now) {
                self.events.send(WorldEvent::BuffRemoved {
                    target_id: *id,
                    effect_id,
                });
            }
        }

        for (target_id, tick) in pending {
            if tick.is_heal {
                if let Some(entity) = self.entities.get_mut(&target_id) {
                    if entity.is_dead {
                        continue;
                    }
                    entity.heal(tick.amount);
                }
            } else if self
                .damage_entity(target_id, tick.caster_id, tick.amount, None, now)
                .is_err()
            {
                continue;
            }
            self.events.send(WorldEvent::BuffTick {
                target_id,
                effect_id: tick.effect_id,
                amount: tick.amount,
                is_heal: tick.is_heal,
            });
        }
    }

    fn respawn_due_players(&mut self, now: i64) {
        let due: Vec<u64> = self
            .player_deaths
            .iter()
            .filter(|(_, d)| d.respawn_at <= now)
            .map(|(&id, _)| id)
            .collect();
        for player_id in due {
            let death = self.player_deaths[&player_id].clone();
            let level = self
                .entities
                .get(&player_id)
                .map(|e| e.level)
                .unwrap_or(1);
            let position = combat::nearest_bindpoint(death.position, &self.data.bindpoints)
                .map(|b| b.position)
                .unwrap_or(death.position);
            let _ = self.revive_player(
                player_id,
                position,
                combat::respawn_health_percent(level),
                now,
            );
        }
    }

    fn despawn_corpses(&mut self, now: i64) {
        self.corpses.retain(|_, c| !c.expired(now));
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Snapshot of the zone for observer sessions.
    pub fn snapshot(&self) -> ZoneSnapshot {
        let entities = self
            .entities
            .values()
            .map(|e| EntitySnapshot {
                id: e.id,
                kind: e.kind,
                name: e.name.clone(),
                position: e.position,
                health: e.health,
                max_health: e.max_health,
                is_dead: e.is_dead,
                ai_mode: self.creatures.get(&e.id).map(|c| c.ai.mode),
            })
            .collect();
        ZoneSnapshot {
            world_id: self.world_id,
            instance_id: self.instance_id,
            entities,
            corpse_count: self.corpses.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::buff::{BuffCategory, Stat};
    use super::super::entity::Resource;
    use super::*;

    fn test_data() -> Arc<StaticData> {
        let mut data = StaticData::new();
        data.templates = TemplateStore::from_json(
            r#"[
            {"id": 1, "name": "Training Dummy", "level": 1, "max_health": 100,
             "faction": "neutral", "disposition": "passive",
             "respawn_time_ms": 10000, "xp_reward": 10,
             "damage_min": 0, "damage_max": 0, "loot_table_id": 10},
            {"id": 2, "name": "Razortail Wolf", "level": 5, "max_health": 300,
             "faction": "hostile", "disposition": "aggressive",
             "aggro_range": 15.0, "leash_range": 40.0,
             "respawn_time_ms": 30000, "xp_reward": 50,
             "damage_min": 5, "damage_max": 9, "attack_speed_ms": 2000,
             "move_speed": 7.0, "loot_table_id": 10}
        ]"#,
        )
        .unwrap();
        data.loot_tables = LootTableStore::from_json(
            r#"[{"id": 10, "entries": [
                {"item_id": 0, "chance": 100, "min": 5, "max": 5},
                {"item_id": 2001, "chance": 100, "min": 1, "max": 1}
            ]}]"#,
        )
        .unwrap();
        data.spells = SpellStore::from_json(
            r#"[
            {"id": 101, "name": "Bolt", "range": 30.0, "target_type": "enemy",
             "cost": 10, "effects": [
                {"kind": "damage", "base": 40, "scaling": 0.0, "school": "magic"}]},
            {"id": 102, "name": "Mend", "range": 30.0, "target_type": "self",
             "cost": 10, "effects": [{"kind": "heal", "base": 30, "scaling": 0.0}]},
            {"id": 103, "name": "Charged Shot", "cast_time_ms": 2000, "range": 30.0,
             "target_type": "enemy", "cost": 10,
             "interrupt_flags": ["damage", "move"],
             "effects": [
                {"kind": "damage", "base": 100, "scaling": 0.0, "school": "physical"}]}
        ]"#,
        )
        .unwrap();
        Arc::new(data)
    }

    fn test_zone() -> Zone {
        Zone::with_seed(1, 1, test_data(), ZoneSettings::default(), 42)
    }

    fn add_player(zone: &mut Zone, name: &str, level: u32, position: Vec3) -> u64 {
        let mut p = Entity::player(name, level, 500, 1, 1);
        p.position = position;
        p.faction_id = 166;
        p.crit_chance = 0;
        let id = p.id;
        zone.add_entity(p, 0).unwrap();
        id
    }

    #[test]
    fn test_spawn_creature_unknown_template() {
        let mut zone = test_zone();
        assert_eq!(
            zone.spawn_creature(999, Vec3::ZERO, 0),
            Err(EngineError::TemplateNotFound)
        );
    }

    #[test]
    fn test_training_dummy_kill_and_respawn() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 1, Vec3::new(2.0, 0.0, 0.0));
        let dummy = zone.spawn_creature(1, Vec3::ZERO, 0).unwrap();

        let outcome = zone.damage_entity(dummy, player, 1_000, None, 0).unwrap();
        match outcome {
            DamageOutcome::Killed { rewards, .. } => {
                assert_eq!(rewards.xp, 10);
            }
            other => panic!("expected kill, got {other:?}"),
        }
        assert!(zone.entity(dummy).unwrap().is_dead);
        assert_eq!(zone.creature(dummy).unwrap().ai.mode, AiMode::Dead);
        assert_eq!(zone.entity(player).unwrap().xp, 10);

        // Damaging a dead creature fails
        assert_eq!(
            zone.damage_entity(dummy, player, 10, None, 100),
            Err(EngineError::TargetDead)
        );

        // Not yet due
        zone.tick(9_999);
        assert!(zone.entity(dummy).unwrap().is_dead);

        // Respawn restores full health at spawn, idle, no participants
        zone.tick(10_000);
        let entity = zone.entity(dummy).unwrap();
        assert!(!entity.is_dead);
        assert_eq!(entity.health, 100);
        assert_eq!(entity.position, Vec3::ZERO);
        let creature = zone.creature(dummy).unwrap();
        assert_eq!(creature.ai.mode, AiMode::Idle);
        assert!(creature.ai.participants.is_empty());
    }

    #[test]
    fn test_kill_creates_corpse_with_participant_loot() {
        let mut zone = test_zone();
        let p1 = add_player(&mut zone, "Kara", 5, Vec3::new(2.0, 0.0, 0.0));
        let p2 = add_player(&mut zone, "Dorian", 5, Vec3::new(3.0, 0.0, 0.0));
        let outsider = add_player(&mut zone, "Slacker", 5, Vec3::new(4.0, 0.0, 0.0));
        let dummy = zone.spawn_creature(1, Vec3::ZERO, 0).unwrap();

        zone.damage_entity(dummy, p1, 60, None, 0).unwrap();
        zone.damage_entity(dummy, p2, 40, None, 0).unwrap();

        let corpse_id = zone.corpses().next().unwrap().id;
        assert_eq!(EntityKind::of_guid(corpse_id), Some(EntityKind::Corpse));

        let drops = zone.take_corpse_loot(corpse_id, p1).unwrap();
        assert_eq!(drops.len(), 2);
        zone.take_corpse_loot(corpse_id, p2).unwrap();
        assert_eq!(
            zone.take_corpse_loot(corpse_id, p1),
            Err(EngineError::NotFound)
        );
        assert_eq!(
            zone.take_corpse_loot(corpse_id, outsider),
            Err(EngineError::InvalidTarget)
        );
    }

    #[test]
    fn test_aggro_pulls_nearby_player() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::new(10.0, 0.0, 0.0));
        let wolf = zone.spawn_creature(2, Vec3::ZERO, 0).unwrap();

        zone.tick(100);
        let creature = zone.creature(wolf).unwrap();
        assert!(creature.ai.in_combat());
        assert_eq!(creature.ai.target_id, Some(player));
    }

    #[test]
    fn test_dead_player_not_aggroed() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::new(10.0, 0.0, 0.0));
        let wolf = zone.spawn_creature(2, Vec3::ZERO, 0).unwrap();

        zone.damage_entity(player, wolf, 10_000, None, 0).unwrap();
        zone.tick(100);
        assert!(!zone.creature(wolf).unwrap().ai.in_combat());
    }

    #[test]
    fn test_social_aggro_cluster() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::new(200.0, 0.0, 0.0));
        let w1 = zone.spawn_creature(2, Vec3::new(0.0, 0.0, 0.0), 0).unwrap();
        let w2 = zone.spawn_creature(2, Vec3::new(8.0, 0.0, 0.0), 0).unwrap();
        let w3 = zone.spawn_creature(2, Vec3::new(6.0, 6.0, 0.0), 0).unwrap();
        let w4 = zone.spawn_creature(2, Vec3::new(100.0, 0.0, 0.0), 0).unwrap();

        zone.damage_entity(w1, player, 10, None, 0).unwrap();

        for id in [w1, w2, w3] {
            let c = zone.creature(id).unwrap();
            assert!(c.ai.in_combat(), "wolf {id} should be in combat");
            assert_eq!(c.ai.target_id, Some(player));
        }
        assert!(!zone.creature(w4).unwrap().ai.in_combat());
    }

    #[test]
    fn test_leash_evade_restores_health_and_clears_threat() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::new(10.0, 0.0, 0.0));
        let wolf = zone.spawn_creature(2, Vec3::ZERO, 0).unwrap();

        zone.damage_entity(wolf, player, 100, None, 0).unwrap();
        assert!(zone.creature(wolf).unwrap().ai.in_combat());

        // Drag the wolf past its 40 unit leash and move the player away
        zone.move_entity(wolf, Vec3::new(45.0, 0.0, 0.0), Vec3::ZERO, 100)
            .unwrap();
        zone.move_entity(player, Vec3::new(50.0, 0.0, 0.0), Vec3::ZERO, 100)
            .unwrap();

        zone.tick(200);
        assert_eq!(zone.creature(wolf).unwrap().ai.mode, AiMode::Evade);

        // Give it ample time to walk home
        zone.tick(120_000);
        let creature = zone.creature(wolf).unwrap();
        assert_eq!(creature.ai.mode, AiMode::Idle);
        assert!(creature.ai.threat.is_empty());
        let entity = zone.entity(wolf).unwrap();
        assert_eq!(entity.position, Vec3::ZERO);
        assert_eq!(entity.health, entity.max_health);
    }

    #[test]
    fn test_absorb_shields_consume_before_health() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::ZERO);

        for (id, amount) in [(1u32, 30i64), (2, 50)] {
            zone.apply_buff(
                player,
                BuffDef {
                    id,
                    spell_id: 900,
                    category: BuffCategory::Absorb,
                    stat: None,
                    amount,
                    duration_ms: 60_000,
                    is_debuff: false,
                    stacks: 1,
                    max_stacks: 1,
                    tick_interval_ms: 0,
                },
                player,
                0,
            )
            .unwrap();
        }

        let health_before = zone.entity(player).unwrap().health;
        let outcome = zone.damage_entity(player, 99, 40, None, 100).unwrap();
        match outcome {
            DamageOutcome::Damaged {
                absorbed, dealt, ..
            } => {
                assert_eq!(absorbed, 40);
                assert_eq!(dealt, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let entity = zone.entity(player).unwrap();
        assert_eq!(entity.health, health_before);
        assert!(!entity.effects.contains(1));
        assert_eq!(entity.effects.get(2).unwrap().remaining_absorb, 40);
    }

    #[test]
    fn test_cast_validation_ladder() {
        let mut zone = test_zone();
        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let enemy = zone.spawn_creature(2, Vec3::new(5.0, 0.0, 0.0), 0).unwrap();

        assert_eq!(
            zone.cast_spell(caster, 999, Some(enemy), None, 0),
            Err(EngineError::UnknownSpell)
        );
        assert_eq!(
            zone.cast_spell(caster, 101, None, None, 0),
            Err(EngineError::InvalidTarget)
        );

        // Out of range
        zone.move_entity(enemy, Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO, 0)
            .unwrap();
        assert_eq!(
            zone.cast_spell(caster, 101, Some(enemy), None, 0),
            Err(EngineError::OutOfRange)
        );
        zone.move_entity(enemy, Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, 0)
            .unwrap();

        // Insufficient resource
        if let Some(e) = zone.entities.get_mut(&caster) {
            e.resources = [5, 5];
        }
        assert_eq!(
            zone.cast_spell(caster, 101, Some(enemy), None, 0),
            Err(EngineError::InsufficientResource)
        );
        if let Some(e) = zone.entities.get_mut(&caster) {
            e.resources = [100, 100];
        }

        // Success, then GCD blocks the immediate recast
        let outcome = zone.cast_spell(caster, 101, Some(enemy), None, 0).unwrap();
        match outcome {
            CastOutcome::Instant { effects } => {
                assert_eq!(effects.len(), 1);
                assert_eq!(effects[0].amount, 40);
            }
            other => panic!("expected instant cast, got {other:?}"),
        }
        assert_eq!(
            zone.entity(caster).unwrap().resource(Resource::Energy),
            90
        );
        assert_eq!(
            zone.cast_spell(caster, 101, Some(enemy), None, 100),
            Err(EngineError::OnCooldown)
        );
    }

    #[test]
    fn test_cast_with_windup_completes_on_tick() {
        let mut zone = test_zone();
        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let enemy = zone.spawn_creature(2, Vec3::new(5.0, 0.0, 0.0), 0).unwrap();

        let outcome = zone.cast_spell(caster, 103, Some(enemy), None, 0).unwrap();
        match outcome {
            CastOutcome::Started { end_at } => assert_eq!(end_at, 2_000),
            other => panic!("expected windup, got {other:?}"),
        }

        // Busy while the cast is in flight
        assert_eq!(
            zone.cast_spell(caster, 101, Some(enemy), None, 100),
            Err(EngineError::Busy)
        );

        let before = zone.entity(enemy).unwrap().health;
        zone.tick(2_000);
        assert_eq!(zone.entity(enemy).unwrap().health, before - 100);
        assert!(zone.casts.is_empty());
    }

    #[test]
    fn test_damage_interrupts_flagged_cast() {
        let mut zone = test_zone();
        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let enemy = zone.spawn_creature(2, Vec3::new(5.0, 0.0, 0.0), 0).unwrap();

        zone.cast_spell(caster, 103, Some(enemy), None, 0).unwrap();
        zone.damage_entity(caster, enemy, 10, None, 500).unwrap();
        assert!(zone.casts.is_empty());

        // The interrupted cast never lands
        let before = zone.entity(enemy).unwrap().health;
        zone.tick(2_000);
        assert_eq!(zone.entity(enemy).unwrap().health, before);
    }

    #[test]
    fn test_caster_death_cancels_cast() {
        let mut zone = test_zone();
        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let enemy = zone.spawn_creature(2, Vec3::new(5.0, 0.0, 0.0), 0).unwrap();

        zone.cast_spell(caster, 103, Some(enemy), None, 0).unwrap();
        zone.damage_entity(caster, enemy, 10_000, None, 500).unwrap();
        assert!(zone.casts.is_empty());
    }

    #[test]
    fn test_player_death_and_bindpoint_respawn() {
        let mut data = StaticData::new();
        data.templates = TemplateStore::from_json(
            r#"[{"id": 2, "name": "Wolf", "level": 5, "max_health": 300,
             "faction": "hostile", "disposition": "aggressive",
             "respawn_time_ms": 30000, "xp_reward": 50,
             "damage_min": 5, "damage_max": 9}]"#,
        )
        .unwrap();
        data.bindpoints = vec![
            Bindpoint {
                id: 1,
                position: Vec3::new(500.0, 0.0, 0.0),
            },
            Bindpoint {
                id: 2,
                position: Vec3::new(20.0, 0.0, 0.0),
            },
        ];
        let mut zone = Zone::with_seed(1, 1, Arc::new(data), ZoneSettings::default(), 3);

        let player = add_player(&mut zone, "Kara", 10, Vec3::ZERO);
        let wolf = zone.spawn_creature(2, Vec3::new(2.0, 0.0, 0.0), 0).unwrap();

        zone.damage_entity(player, wolf, 10_000, None, 1_000).unwrap();
        assert!(zone.entity(player).unwrap().is_dead);

        // Grace period holds
        zone.tick(1_000 + combat::DEATH_GRACE_MS - 1);
        assert!(zone.entity(player).unwrap().is_dead);

        // Respawn at the nearest bindpoint with level-scaled health
        zone.tick(1_000 + combat::DEATH_GRACE_MS);
        let entity = zone.entity(player).unwrap();
        assert!(!entity.is_dead);
        assert_eq!(entity.position, Vec3::new(20.0, 0.0, 0.0));
        assert_eq!(entity.health, 250); // 50% of 500 below level 20
    }

    #[test]
    fn test_resurrection_preempts_bindpoint() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 10, Vec3::new(7.0, 0.0, 0.0));
        let healer = add_player(&mut zone, "Dorian", 10, Vec3::new(8.0, 0.0, 0.0));
        let wolf = zone.spawn_creature(2, Vec3::new(2.0, 0.0, 0.0), 0).unwrap();

        zone.damage_entity(player, wolf, 10_000, None, 0).unwrap();
        zone.offer_resurrection(player, healer, 777, 35).unwrap();
        zone.accept_resurrection(player, 5_000).unwrap();

        let entity = zone.entity(player).unwrap();
        assert!(!entity.is_dead);
        // Revived in place, not at a bindpoint
        assert_eq!(entity.position, Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(entity.health, 175);
    }

    #[test]
    fn test_lazy_spawn_loading_on_first_player() {
        let mut data = StaticData::new();
        data.templates = TemplateStore::from_json(
            r#"[{"id": 2, "name": "Wolf", "level": 5, "max_health": 300,
             "faction": "hostile", "disposition": "aggressive",
             "respawn_time_ms": 30000, "xp_reward": 50,
             "damage_min": 5, "damage_max": 9}]"#,
        )
        .unwrap();
        data.spawns.insert(
            7,
            vec![
                SpawnDef::Creature {
                    template_id: 2,
                    position: Vec3::new(10.0, 0.0, 10.0),
                    rotation: Vec3::ZERO,
                    patrol: None,
                },
                SpawnDef::HarvestNode {
                    node: HarvestKind::Mineral,
                    position: Vec3::new(30.0, 0.0, 0.0),
                },
            ],
        );
        let mut zone = Zone::with_seed(7, 1, Arc::new(data), ZoneSettings::default(), 3);
        assert!(!zone.spawns_loaded());
        assert_eq!(zone.entity_count(), 0);

        add_player(&mut zone, "Kara", 10, Vec3::ZERO);
        assert!(zone.spawns_loaded());
        // Player + creature + harvest node
        assert_eq!(zone.entity_count(), 3);
        assert_eq!(zone.harvest_nodes.len(), 1);
    }

    #[test]
    fn test_idle_tracking_for_shutdown() {
        let mut zone = test_zone();
        let p = add_player(&mut zone, "Kara", 10, Vec3::ZERO);
        assert_eq!(zone.player_count(), 1);
        assert_eq!(zone.last_player_left(), None);

        zone.remove_entity(p, 5_000).unwrap();
        assert_eq!(zone.player_count(), 0);
        assert_eq!(zone.last_player_left(), Some(5_000));

        add_player(&mut zone, "Kara", 10, Vec3::ZERO);
        assert_eq!(zone.last_player_left(), None);
    }

    #[test]
    fn test_remove_entity_retargets_creatures() {
        let mut zone = test_zone();
        let p1 = add_player(&mut zone, "Kara", 5, Vec3::new(5.0, 0.0, 0.0));
        let p2 = add_player(&mut zone, "Dorian", 5, Vec3::new(6.0, 0.0, 0.0));
        let wolf = zone.spawn_creature(2, Vec3::ZERO, 0).unwrap();

        zone.damage_entity(wolf, p1, 10, None, 0).unwrap();
        zone.damage_entity(wolf, p2, 5, None, 0).unwrap();
        assert_eq!(zone.creature(wolf).unwrap().ai.target_id, Some(p1));

        zone.remove_entity(p1, 100).unwrap();
        assert_eq!(zone.creature(wolf).unwrap().ai.target_id, Some(p2));

        zone.remove_entity(p2, 200).unwrap();
        let creature = zone.creature(wolf).unwrap();
        assert!(!creature.ai.in_combat());
        assert!(creature.ai.threat.is_empty());
    }

    #[test]
    fn test_dot_ticks_through_heartbeat() {
        let mut data = StaticData::new();
        data.templates = TemplateStore::from_json(
            r#"[{"id": 1, "name": "Training Dummy", "level": 1, "max_health": 100,
             "faction": "neutral", "disposition": "passive",
             "respawn_time_ms": 10000, "xp_reward": 10,
             "damage_min": 0, "damage_max": 0}]"#,
        )
        .unwrap();
        data.spells = SpellStore::from_json(
            r#"[{"id": 201, "name": "Ignite", "range": 30.0, "target_type": "enemy",
             "effects": [{"kind": "dot", "base": 10, "scaling": 0.0,
                "duration_ms": 3000, "tick_interval_ms": 1000, "buff_id": 9201}]}]"#,
        )
        .unwrap();
        let mut zone = Zone::with_seed(1, 1, Arc::new(data), ZoneSettings::default(), 5);

        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let dummy = zone.spawn_creature(1, Vec3::new(3.0, 0.0, 0.0), 0).unwrap();

        zone.cast_spell(caster, 201, Some(dummy), None, 0).unwrap();
        assert!(zone.entity(dummy).unwrap().effects.contains(9201));

        zone.tick(1_000);
        assert_eq!(zone.entity(dummy).unwrap().health, 90);
        zone.tick(2_000);
        zone.tick(3_000);
        assert_eq!(zone.entity(dummy).unwrap().health, 70);

        // Expired and cleaned up; no further ticks
        zone.tick(4_000);
        let entity = zone.entity(dummy).unwrap();
        assert_eq!(entity.health, 70);
        assert!(!entity.effects.contains(9201));
    }

    #[test]
    fn test_stat_buff_raises_spell_damage() {
        let mut zone = test_zone();
        let caster = add_player(&mut zone, "Kara", 5, Vec3::ZERO);
        let enemy = zone.spawn_creature(2, Vec3::new(5.0, 0.0, 0.0), 0).unwrap();

        zone.apply_buff(
            caster,
            BuffDef {
                id: 50,
                spell_id: 950,
                category: BuffCategory::StatModifier,
                stat: Some(Stat::Power),
                amount: 100,
                duration_ms: 60_000,
                is_debuff: false,
                stacks: 1,
                max_stacks: 1,
                tick_interval_ms: 0,
            },
            caster,
            0,
        )
        .unwrap();

        // Bolt has zero scaling, so power should not change it
        let outcome = zone.cast_spell(caster, 101, Some(enemy), None, 0).unwrap();
        match outcome {
            CastOutcome::Instant { effects } => assert_eq!(effects[0].amount, 40),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_corpse_despawns() {
        let mut zone = test_zone();
        let player = add_player(&mut zone, "Kara", 5, Vec3::new(2.0, 0.0, 0.0));
        let dummy = zone.spawn_creature(1, Vec3::ZERO, 0).unwrap();
        zone.damage_entity(dummy, player, 1_000, None, 0).unwrap();
        assert_eq!(zone.corpses().count(), 1);

        zone.tick(super::super::corpse::CORPSE_DESPAWN_MS + 1);
        assert_eq!(zone.corpses().count(), 0);
    }

    #[test]
    fn test_add_entity_twice_rejected() {
        let mut zone = test_zone();
        let mut p = Entity::player("Kara", 5, 500, 1, 1);
        p.faction_id = 166;
        let clone = p.clone();
        zone.add_entity(p, 0).unwrap();
        assert_eq!(zone.add_entity(clone, 0), Err(EngineError::AlreadyRegistered));
    }
}
