// Zone registry: lookup, lazy creation, and the per-zone actor task.
//
// Each zone runs as one spawned task that owns its `Zone` state and drains
// a bounded command mailbox; callers get replies over oneshot channels.
// Ticks arrive on a separate small mailbox registered with the shared
// scheduler, so a zone busy with commands simply skips beats. When a zone
// task ends (shutdown or idle timeout) it scrubs its own registration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::engine::buff::BuffDef;
use crate::engine::combat::DamageOutcome;
use crate::engine::entity::Entity;
use crate::engine::events::{EventSink, WorldEvent};
use crate::engine::geometry::Vec3;
use crate::engine::spell::SpellSchool;
use crate::engine::zone::{CastOutcome, StaticData, Zone, ZoneSettings, ZoneSnapshot};
use crate::error::EngineError;
use crate::metrics;
use crate::scheduler::{Tick, TickScheduler};

/// Zone instances are keyed by world and instance id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    pub world_id: u32,
    pub instance_id: u32,
}

/// Command mailbox depth per zone.
const COMMAND_MAILBOX: usize = 256;

/// Tick mailbox depth: small on purpose, so a busy zone skips beats.
const TICK_MAILBOX: usize = 2;

/// Messages a zone actor accepts.
pub enum ZoneCommand {
    AddEntity {
        entity: Box<Entity>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    RemoveEntity {
        id: u64,
        reply: oneshot::Sender<Result<Entity, EngineError>>,
    },
    MoveEntity {
        id: u64,
        position: Vec3,
        rotation: Vec3,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SpawnCreature {
        template_id: u32,
        position: Vec3,
        reply: oneshot::Sender<Result<u64, EngineError>>,
    },
    DamageEntity {
        target_id: u64,
        attacker_id: u64,
        amount: i64,
        school: Option<SpellSchool>,
        reply: oneshot::Sender<Result<DamageOutcome, EngineError>>,
    },
    CastSpell {
        caster_id: u64,
        spell_id: u32,
        target_id: Option<u64>,
        position: Option<Vec3>,
        reply: oneshot::Sender<Result<CastOutcome, EngineError>>,
    },
    ApplyBuff {
        target_id: u64,
        def: BuffDef,
        caster_id: u64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    EnterCombat {
        creature_id: u64,
        attacker_id: u64,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    QueryRange {
        center: Vec3,
        radius: f32,
        reply: oneshot::Sender<Vec<u64>>,
    },
    Snapshot {
        reply: oneshot::Sender<ZoneSnapshot>,
    },
    Shutdown,
}

/// A cheap, cloneable reference to a running zone.
#[derive(Clone)]
pub struct ZoneHandle {
    pub key: ZoneKey,
    tx: mpsc::Sender<ZoneCommand>,
    events: EventSink,
}

impl ZoneHandle {
    /// Subscribe to the zone's outbound events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> ZoneCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| EngineError::NotFound)?;
        rx.await.map_err(|_| EngineError::NotFound)?
    }

    pub async fn add_entity(&self, entity: Entity) -> Result<(), EngineError> {
        self.request(|reply| ZoneCommand::AddEntity {
            entity: Box::new(entity),
            reply,
        })
        .await
    }

    pub async fn remove_entity(&self, id: u64) -> Result<Entity, EngineError> {
        self.request(|reply| ZoneCommand::RemoveEntity { id, reply }).await
    }

    pub async fn move_entity(
        &self,
        id: u64,
        position: Vec3,
        rotation: Vec3,
    ) -> Result<(), EngineError> {
        self.request(|reply| ZoneCommand::MoveEntity {
            id,
            position,
            rotation,
            reply,
        })
        .await
    }

    pub async fn spawn_creature(&self, template_id: u32, position: Vec3) -> Result<u64, EngineError> {
        self.request(|reply| ZoneCommand::SpawnCreature {
            template_id,
            position,
            reply,
        })
        .await
    }

    pub async fn damage_entity(
        &self,
        target_id: u64,
        attacker_id: u64,
        amount: i64,
        school: Option<SpellSchool>,
    ) -> Result<DamageOutcome, EngineError> {
        self.request(|reply| ZoneCommand::DamageEntity {
            target_id,
            attacker_id,
            amount,
            school,
            reply,
        })
        .await
    }

    pub async fn cast_spell(
        &self,
        caster_id: u64,
        spell_id: u32,
        target_id: Option<u64>,
        position: Option<Vec3>,
    ) -> Result<CastOutcome, EngineError> {
        self.request(|reply| ZoneCommand::CastSpell {
            caster_id,
            spell_id,
            target_id,
            position,
            reply,
        })
        .await
    }

    pub async fn apply_buff(
        &self,
        target_id: u64,
        def: BuffDef,
        caster_id: u64,
    ) -> Result<(), EngineError> {
        self.request(|reply| ZoneCommand::ApplyBuff {
            target_id,
            def,
            caster_id,
            reply,
        })
        .await
    }

    pub async fn enter_combat(&self, creature_id: u64, attacker_id: u64) -> Result<(), EngineError> {
        self.request(|reply| ZoneCommand::EnterCombat {
            creature_id,
            attacker_id,
            reply,
        })
        .await
    }

    pub async fn query_range(&self, center: Vec3, radius: f32) -> Result<Vec<u64>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ZoneCommand::QueryRange {
                center,
                radius,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::NotFound)?;
        rx.await.map_err(|_| EngineError::NotFound)
    }

    pub async fn snapshot(&self) -> Result<ZoneSnapshot, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ZoneCommand::Snapshot { reply: tx })
            .await
            .map_err(|_| EngineError::NotFound)?;
        rx.await.map_err(|_| EngineError::NotFound)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(ZoneCommand::Shutdown).await;
    }
}

/// The process-wide zone registry.
pub struct ZoneRegistry {
    zones: Arc<Mutex<HashMap<ZoneKey, ZoneHandle>>>,
    data: Arc<StaticData>,
    settings: ZoneSettings,
    scheduler: Arc<TickScheduler>,
    idle_timeout_ms: i64,
}

impl ZoneRegistry {
    pub fn new(
        data: Arc<StaticData>,
        settings: ZoneSettings,
        scheduler: Arc<TickScheduler>,
        idle_timeout_ms: i64,
    ) -> Self {
        ZoneRegistry {
            zones: Arc::new(Mutex::new(HashMap::new())),
            data,
            settings,
            scheduler,
            idle_timeout_ms,
        }
    }

    pub fn get(&self, key: ZoneKey) -> Option<ZoneHandle> {
        self.zones.lock().unwrap().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.zones.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.lock().unwrap().is_empty()
    }

    /// Look up a zone, creating and starting it on first access.
    pub fn get_or_create(&self, key: ZoneKey) -> ZoneHandle {
        if let Some(handle) = self.get(key) {
            return handle;
        }
        let mut zones = self.zones.lock().unwrap();
        // Double-check under the lock
        if let Some(handle) = zones.get(&key) {
            return handle.clone();
        }

        let zone = Zone::new(key.world_id, key.instance_id, self.data.clone(), self.settings);
        let events = zone.events().clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_MAILBOX);
        let (tick_tx, tick_rx) = mpsc::channel(TICK_MAILBOX);
        self.scheduler.register(tick_tx);

        let handle = ZoneHandle {
            key,
            tx: cmd_tx,
            events,
        };
        zones.insert(key, handle.clone());
        metrics::ACTIVE_ZONES.inc();
        tracing::info!(
            world_id = key.world_id,
            instance_id = key.instance_id,
            "zone instance started"
        );

        let registration = self.zones.clone();
        let idle_timeout_ms = self.idle_timeout_ms;
        tokio::spawn(run_zone(
            zone,
            cmd_rx,
            tick_rx,
            idle_timeout_ms,
            registration,
            key,
        ));
        handle
    }

    /// Shut down every registered zone.
    pub async fn shutdown_all(&self) {
        let handles: Vec<ZoneHandle> = self.zones.lock().unwrap().values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

async fn run_zone(
    mut zone: Zone,
    mut cmd_rx: mpsc::Receiver<ZoneCommand>,
    mut tick_rx: mpsc::Receiver<Tick>,
    idle_timeout_ms: i64,
    registration: Arc<Mutex<HashMap<ZoneKey, ZoneHandle>>>,
    key: ZoneKey,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(ZoneCommand::Shutdown) => break,
                Some(cmd) => handle_command(&mut zone, cmd),
            },
            tick = tick_rx.recv() => match tick {
                Some(tick) => {
                    let start = Instant::now();
                    zone.tick(tick.now_ms);
                    metrics::ZONE_TICK_DURATION_MS
                        .observe(start.elapsed().as_secs_f64() * 1000.0);

                    if zone.player_count() == 0 {
                        if let Some(left_at) = zone.last_player_left() {
                            if tick.now_ms - left_at >= idle_timeout_ms {
                                tracing::info!(
                                    world_id = key.world_id,
                                    instance_id = key.instance_id,
                                    "zone idle timeout, shutting down"
                                );
                                break;
                            }
                        }
                    }
                }
                None => break,
            },
        }
    }

    registration.lock().unwrap().remove(&key);
    metrics::ACTIVE_ZONES.dec();
    tracing::info!(
        world_id = key.world_id,
        instance_id = key.instance_id,
        "zone instance stopped"
    );
}

fn handle_command(zone: &mut Zone, cmd: ZoneCommand) {
    let now = crate::scheduler::monotonic_ms();
    match cmd {
        ZoneCommand::AddEntity { entity, reply } => {
            let _ = reply.send(zone.add_entity(*entity, now));
        }
        ZoneCommand::RemoveEntity { id, reply } => {
            let _ = reply.send(zone.remove_entity(id, now));
        }
        ZoneCommand::MoveEntity {
            id,
            position,
            rotation,
            reply,
        } => {
            let _ = reply.send(zone.move_entity(id, position, rotation, now));
        }
        ZoneCommand::SpawnCreature {
            template_id,
            position,
            reply,
        } => {
            let _ = reply.send(zone.spawn_creature(template_id, position, now));
        }
        ZoneCommand::DamageEntity {
            target_id,
            attacker_id,
            amount,
            school,
            reply,
        } => {
            let _ = reply.send(zone.damage_entity(target_id, attacker_id, amount, school, now));
        }
        ZoneCommand::CastSpell {
            caster_id,
            spell_id,
            target_id,
            position,
            reply,
        } => {
            let _ = reply.send(zone.cast_spell(caster_id, spell_id, target_id, position, now));
        }
        ZoneCommand::ApplyBuff {
            target_id,
            def,
            caster_id,
            reply,
        } => {
            let _ = reply.send(zone.apply_buff(target_id, def, caster_id, now));
        }
        ZoneCommand::EnterCombat {
            creature_id,
            attacker_id,
            reply,
        } => {
            let _ = reply.send(zone.enter_combat(creature_id, attacker_id, now));
        }
        ZoneCommand::QueryRange {
            center,
            radius,
            reply,
        } => {
            let _ = reply.send(zone.query_range(center, radius));
        }
        ZoneCommand::Snapshot { reply } => {
            let _ = reply.send(zone.snapshot());
        }
        ZoneCommand::Shutdown => {}
    }
}
