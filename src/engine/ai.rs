// Creature AI: a per-creature state machine ticked by the zone.
//
// The machine never touches zone state directly. Each tick consumes a
// read-only context (own position, template, nearby hostiles, current
// target) and returns a single intent; the zone pattern-matches the intent
// and commits movement, attacks, and broadcasts.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::Vec3;
use super::template::{CreatureTemplate, Disposition};

/// Threat assigned on first engagement, before any damage threat.
pub const INITIAL_THREAT: i64 = 100;

/// Chance to start wandering on an eligible tick.
pub const WANDER_CHANCE: f64 = 0.5;

/// Minimum delay between wander attempts.
pub const WANDER_INTERVAL_MS: i64 = 5_000;

/// Sentinel allowing the first attack to fire immediately.
const NEVER_ATTACKED: i64 = i64::MIN / 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    Idle,
    Wandering,
    Patrol,
    Combat,
    Evade,
    Dead,
}

/// Waypoint traversal order for patrol routes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolMode {
    Cyclic,
    CyclicReverse,
    OneShot,
    OneShotReverse,
    BackAndForth,
    BackAndForthReverse,
}

impl PatrolMode {
    fn starts_reversed(self) -> bool {
        matches!(
            self,
            PatrolMode::CyclicReverse | PatrolMode::OneShotReverse | PatrolMode::BackAndForthReverse
        )
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PatrolWaypoint {
    pub position: Vec3,
    #[serde(default)]
    pub pause_ms: i64,
}

/// A planned straight-segment movement with a fixed duration, interpolated
/// by the ticks that observe it.
#[derive(Clone, Debug)]
pub struct MovementPath {
    pub waypoints: Vec<Vec3>,
    pub started_at: i64,
    pub duration_ms: i64,
}

impl MovementPath {
    /// Plan a path over `waypoints` (first entry is the start position) at
    /// `speed` world units per second.
    pub fn new(waypoints: Vec<Vec3>, started_at: i64, speed: f32) -> Self {
        let mut length = 0.0;
        for pair in waypoints.windows(2) {
            length += pair[0].distance(pair[1]);
        }
        let speed = speed.max(0.1);
        let duration_ms = ((length / speed) * 1000.0) as i64;
        MovementPath {
            waypoints,
            started_at,
            duration_ms: duration_ms.max(1),
        }
    }

    pub fn finished(&self, now: i64) -> bool {
        now >= self.started_at + self.duration_ms
    }

    pub fn end(&self) -> Vec3 {
        *self.waypoints.last().expect("path has at least one waypoint")
    }

    /// Interpolated position along the path at `now`.
    pub fn position_at(&self, now: i64) -> Vec3 {
        let t = (now - self.started_at) as f32 / self.duration_ms as f32;
        let t = t.clamp(0.0, 1.0);

        let total: f32 = self
            .waypoints
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum();
        if total <= f32::EPSILON {
            return self.end();
        }
        let mut remaining = total * t;
        for pair in self.waypoints.windows(2) {
            let seg = pair[0].distance(pair[1]);
            if remaining <= seg {
                return pair[0].lerp(pair[1], if seg > 0.0 { remaining / seg } else { 1.0 });
            }
            remaining -= seg;
        }
        self.end()
    }
}

/// Per-attacker threat with first-inserted-wins tie-breaking.
#[derive(Clone, Debug, Default)]
pub struct ThreatTable {
    entries: Vec<(u64, i64)>,
}

impl ThreatTable {
    pub fn add(&mut self, id: u64, amount: i64) {
        let amount = amount.max(0);
        match self.entries.iter_mut().find(|(e, _)| *e == id) {
            Some((_, score)) => *score += amount,
            None => self.entries.push((id, amount)),
        }
    }

    pub fn remove(&mut self, id: u64) {
        self.entries.retain(|(e, _)| *e != id);
    }

    pub fn get(&self, id: u64) -> i64 {
        self.entries
            .iter()
            .find(|(e, _)| *e == id)
            .map(|(_, s)| *s)
            .unwrap_or(0)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(e, _)| *e == id)
    }

    /// Highest-threat attacker; earlier entries win ties.
    pub fn highest(&self) -> Option<u64> {
        let mut best: Option<(u64, i64)> = None;
        for &(id, score) in &self.entries {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// What a tick decided. The zone commits the state change and broadcasts.
#[derive(Clone, Debug, PartialEq)]
pub enum AiIntent {
    None,
    Attack { target_id: u64 },
    MoveTo { position: Vec3 },
    StartWander { destination: Vec3 },
    WanderComplete { position: Vec3 },
    StartPatrol { destination: Vec3 },
    PatrolSegmentComplete { position: Vec3 },
    StartChase { destination: Vec3 },
    ChaseComplete { position: Vec3 },
    StartEvade { destination: Vec3 },
    EvadeComplete { position: Vec3 },
}

/// Read-only view of the world for one AI tick.
pub struct AiContext<'a> {
    pub now: i64,
    pub position: Vec3,
    pub spawn_position: Vec3,
    pub template: &'a CreatureTemplate,
    /// Valid aggro candidates within aggro range, faction-filtered by the
    /// zone.
    pub hostiles: &'a [(u64, Vec3)],
    /// Current target, if it still exists.
    pub target: Option<TargetInfo>,
}

#[derive(Clone, Copy, Debug)]
pub struct TargetInfo {
    pub id: u64,
    pub position: Vec3,
    pub alive: bool,
}

/// Mutable AI state for one creature.
#[derive(Clone, Debug)]
pub struct CreatureAi {
    pub mode: AiMode,
    pub target_id: Option<u64>,
    pub combat_started_at: i64,
    pub last_attack_at: i64,
    pub threat: ThreatTable,
    /// Everyone who contributed damage; kept across death for kill credit.
    pub participants: HashSet<u64>,
    path: Option<MovementPath>,
    chase: Option<MovementPath>,
    patrol_route: Vec<PatrolWaypoint>,
    patrol_mode: PatrolMode,
    patrol_index: usize,
    patrol_forward: bool,
    patrol_pause_until: i64,
    patrol_done: bool,
    next_wander_at: i64,
    pub respawn_at: Option<i64>,
}

impl CreatureAi {
    pub fn new() -> Self {
        CreatureAi {
            mode: AiMode::Idle,
            target_id: None,
            combat_started_at: 0,
            last_attack_at: NEVER_ATTACKED,
            threat: ThreatTable::default(),
            participants: HashSet::new(),
            path: None,
            chase: None,
            patrol_route: Vec::new(),
            patrol_mode: PatrolMode::Cyclic,
            patrol_index: 0,
            patrol_forward: true,
            patrol_pause_until: 0,
            patrol_done: false,
            next_wander_at: 0,
            respawn_at: None,
        }
    }

    pub fn with_patrol(route: Vec<PatrolWaypoint>, mode: PatrolMode) -> Self {
        let mut ai = Self::new();
        ai.patrol_forward = !mode.starts_reversed();
        ai.patrol_index = if mode.starts_reversed() && !route.is_empty() {
            route.len() - 1
        } else {
            0
        };
        ai.patrol_route = route;
        ai.patrol_mode = mode;
        ai
    }

    pub fn in_combat(&self) -> bool {
        self.mode == AiMode::Combat
    }

    pub fn is_dead(&self) -> bool {
        self.mode == AiMode::Dead
    }

    /// Pull the creature into combat against `attacker`. Creatures already
    /// fighting keep their target; dead or evading creatures ignore this.
    pub fn enter_combat(&mut self, attacker: u64, now: i64) {
        match self.mode {
            AiMode::Combat | AiMode::Evade | AiMode::Dead => return,
            AiMode::Idle | AiMode::Wandering | AiMode::Patrol => {}
        }
        self.mode = AiMode::Combat;
        self.target_id = Some(attacker);
        self.combat_started_at = now;
        self.threat.add(attacker, INITIAL_THREAT);
        self.path = None;
        self.chase = None;
    }

    /// Record incoming damage: kill credit always, threat and combat entry
    /// only for creatures that fight back.
    pub fn note_damage(&mut self, attacker: u64, amount: i64, now: i64, fights_back: bool) {
        self.participants.insert(attacker);
        if !fights_back || self.mode == AiMode::Dead {
            return;
        }
        if !self.in_combat() {
            self.enter_combat(attacker, now);
        }
        if self.in_combat() {
            self.threat.add(attacker, amount);
        }
    }

    /// Additive threat (taunts, healing aggro).
    pub fn add_threat(&mut self, id: u64, amount: i64) {
        if self.in_combat() {
            self.threat.add(id, amount);
        }
    }

    /// Forget a target entirely (despawn, zone leave). Retargets from the
    /// threat table or drops combat when it was the last entry.
    pub fn remove_target(&mut self, id: u64) {
        self.threat.remove(id);
        if self.target_id == Some(id) {
            self.target_id = self.threat.highest();
            if self.target_id.is_none() && self.in_combat() {
                self.exit_combat();
            }
        }
    }

    pub fn on_death(&mut self, now: i64, respawn_delay_ms: i64) {
        self.mode = AiMode::Dead;
        self.target_id = None;
        self.threat.clear();
        self.path = None;
        self.chase = None;
        self.respawn_at = Some(now + respawn_delay_ms);
    }

    pub fn on_respawn(&mut self) {
        self.mode = AiMode::Idle;
        self.participants.clear();
        self.respawn_at = None;
        self.last_attack_at = NEVER_ATTACKED;
        self.next_wander_at = 0;
        self.patrol_done = false;
    }

    fn exit_combat(&mut self) {
        self.mode = AiMode::Idle;
        self.target_id = None;
        self.threat.clear();
        self.chase = None;
    }

    /// Advance the machine one tick.
    pub fn tick(&mut self, ctx: &AiContext, rng: &mut impl Rng) -> AiIntent {
        match self.mode {
            AiMode::Dead => AiIntent::None,
            AiMode::Idle => self.tick_idle(ctx, rng),
            AiMode::Wandering => self.tick_wandering(ctx),
            AiMode::Patrol => self.tick_patrol(ctx),
            AiMode::Combat => self.tick_combat(ctx),
            AiMode::Evade => self.tick_evade(ctx),
        }
    }

    fn tick_idle(&mut self, ctx: &AiContext, rng: &mut impl Rng) -> AiIntent {
        if ctx.template.disposition == Disposition::Aggressive {
            if let Some(target) = nearest_hostile(ctx.position, ctx.hostiles) {
                self.enter_combat(target, ctx.now);
                return AiIntent::None;
            }
        }

        if !self.patrol_route.is_empty() && !self.patrol_done {
            self.mode = AiMode::Patrol;
            return self.start_patrol_segment(ctx);
        }

        if ctx.template.wander_range > 0.0 && ctx.now >= self.next_wander_at {
            self.next_wander_at = ctx.now + WANDER_INTERVAL_MS;
            if rng.gen_bool(WANDER_CHANCE) {
                let destination = random_point_near(ctx.spawn_position, ctx.template.wander_range, rng);
                self.path = Some(MovementPath::new(
                    vec![ctx.position, destination],
                    ctx.now,
                    ctx.template.move_speed,
                ));
                self.mode = AiMode::Wandering;
                return AiIntent::StartWander { destination };
            }
        }
        AiIntent::None
    }

    fn tick_wandering(&mut self, ctx: &AiContext) -> AiIntent {
        let path = match &self.path {
            Some(p) => p,
            None => {
                self.mode = AiMode::Idle;
                return AiIntent::None;
            }
        };
        if path.finished(ctx.now) {
            let position = path.end();
            self.path = None;
            self.mode = AiMode::Idle;
            AiIntent::WanderComplete { position }
        } else {
            AiIntent::MoveTo {
                position: path.position_at(ctx.now),
            }
        }
    }

    fn tick_patrol(&mut self, ctx: &AiContext) -> AiIntent {
        if ctx.now < self.patrol_pause_until {
            return AiIntent::None;
        }
        if let Some(path) = &self.path {
            if !path.finished(ctx.now) {
                return AiIntent::MoveTo {
                    position: path.position_at(ctx.now),
                };
            }
            let position = path.end();
            self.path = None;
            let arrived = self.patrol_index;
            let pause = self.patrol_route[arrived].pause_ms;
            if pause > 0 {
                self.patrol_pause_until = ctx.now + pause;
            }
            self.advance_patrol();
            if self.patrol_done {
                self.mode = AiMode::Idle;
            }
            return AiIntent::PatrolSegmentComplete { position };
        }
        self.start_patrol_segment(ctx)
    }

    fn start_patrol_segment(&mut self, ctx: &AiContext) -> AiIntent {
        if self.patrol_route.is_empty() || self.patrol_done {
            self.mode = AiMode::Idle;
            return AiIntent::None;
        }
        let destination = self.patrol_route[self.patrol_index].position;
        self.path = Some(MovementPath::new(
            vec![ctx.position, destination],
            ctx.now,
            ctx.template.move_speed,
        ));
        AiIntent::StartPatrol { destination }
    }

    fn advance_patrol(&mut self) {
        let len = self.patrol_route.len();
        if len <= 1 {
            if matches!(
                self.patrol_mode,
                PatrolMode::OneShot | PatrolMode::OneShotReverse
            ) {
                self.patrol_done = true;
            }
            return;
        }
        match self.patrol_mode {
            PatrolMode::Cyclic => {
                self.patrol_index = (self.patrol_index + 1) % len;
            }
            PatrolMode::CyclicReverse => {
                self.patrol_index = (self.patrol_index + len - 1) % len;
            }
            PatrolMode::OneShot => {
                if self.patrol_index + 1 >= len {
                    self.patrol_done = true;
                } else {
                    self.patrol_index += 1;
                }
            }
            PatrolMode::OneShotReverse => {
                if self.patrol_index == 0 {
                    self.patrol_done = true;
                } else {
                    self.patrol_index -= 1;
                }
            }
            PatrolMode::BackAndForth | PatrolMode::BackAndForthReverse => {
                if self.patrol_forward {
                    if self.patrol_index + 1 >= len {
                        self.patrol_forward = false;
                        self.patrol_index -= 1;
                    } else {
                        self.patrol_index += 1;
                    }
                } else if self.patrol_index == 0 {
                    self.patrol_forward = true;
                    self.patrol_index += 1;
                } else {
                    self.patrol_index -= 1;
                }
            }
        }
    }

    fn tick_combat(&mut self, ctx: &AiContext) -> AiIntent {
        // Leash: too far from spawn means break off and run home
        if ctx.position.distance_2d(ctx.spawn_position) > ctx.template.leash_range {
            return self.begin_evade(ctx);
        }

        // Resolve the current target, falling back to the threat table
        let target = match ctx.target {
            Some(t) if t.alive && Some(t.id) == self.target_id => t,
            _ => {
                if let Some(old) = self.target_id {
                    self.threat.remove(old);
                }
                self.target_id = self.threat.highest();
                if self.target_id.is_none() {
                    self.exit_combat();
                }
                return AiIntent::None;
            }
        };

        // A chase in flight is never re-planned
        if let Some(chase) = &self.chase {
            if !chase.finished(ctx.now) {
                return AiIntent::MoveTo {
                    position: chase.position_at(ctx.now),
                };
            }
            let position = chase.end();
            self.chase = None;
            return AiIntent::ChaseComplete { position };
        }

        let attack_range = ctx.template.attack_range();
        let d = ctx.position.distance_2d(target.position);

        if ctx.template.is_ranged {
            let min_range = attack_range / 2.0;
            if d < min_range || d > attack_range {
                // Reposition to the optimal band midpoint, backing away or
                // advancing along the target-to-self line
                let optimal = (min_range + attack_range) / 2.0;
                let away = target.position.direction_2d(ctx.position);
                let destination = target.position + away.scale(optimal);
                self.chase = Some(MovementPath::new(
                    vec![ctx.position, destination],
                    ctx.now,
                    ctx.template.move_speed,
                ));
                return AiIntent::StartChase { destination };
            }
        } else if d > attack_range {
            let toward = ctx.position.direction_2d(target.position);
            let destination = target.position - toward.scale(attack_range);
            self.chase = Some(MovementPath::new(
                vec![ctx.position, destination],
                ctx.now,
                ctx.template.move_speed,
            ));
            return AiIntent::StartChase { destination };
        }

        if ctx.now - self.last_attack_at >= ctx.template.attack_speed_ms {
            self.last_attack_at = ctx.now;
            return AiIntent::Attack { target_id: target.id };
        }
        AiIntent::None
    }

    fn begin_evade(&mut self, ctx: &AiContext) -> AiIntent {
        self.mode = AiMode::Evade;
        self.target_id = None;
        self.chase = None;
        self.path = Some(MovementPath::new(
            vec![ctx.position, ctx.spawn_position],
            ctx.now,
            ctx.template.move_speed,
        ));
        AiIntent::StartEvade {
            destination: ctx.spawn_position,
        }
    }

    fn tick_evade(&mut self, ctx: &AiContext) -> AiIntent {
        let path = match &self.path {
            Some(p) => p,
            None => {
                self.mode = AiMode::Idle;
                self.threat.clear();
                return AiIntent::None;
            }
        };
        if path.finished(ctx.now) {
            let position = path.end();
            self.path = None;
            self.mode = AiMode::Idle;
            self.threat.clear();
            AiIntent::EvadeComplete { position }
        } else {
            AiIntent::MoveTo {
                position: path.position_at(ctx.now),
            }
        }
    }
}

impl Default for CreatureAi {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest hostile by ground-plane distance.
fn nearest_hostile(position: Vec3, hostiles: &[(u64, Vec3)]) -> Option<u64> {
    hostiles
        .iter()
        .min_by(|a, b| {
            position
                .distance_2d_sq(a.1)
                .total_cmp(&position.distance_2d_sq(b.1))
        })
        .map(|(id, _)| *id)
}

/// Uniformly distributed point within `range` of `center` on the ground
/// plane.
fn random_point_near(center: Vec3, range: f32, rng: &mut impl Rng) -> Vec3 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let radius = rng.gen_range(0.0f32..1.0).sqrt() * range;
    Vec3::new(
        center.x + radius * angle.sin(),
        center.y,
        center.z + radius * angle.cos(),
    )
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::super::template::FactionCategory;
    use super::*;

    fn wolf() -> CreatureTemplate {
        serde_json::from_value(serde_json::json!({
            "id": 100,
            "name": "Razortail Wolf",
            "level": 5,
            "max_health": 300,
            "faction": "hostile",
            "disposition": "aggressive",
            "aggro_range": 15.0,
            "leash_range": 40.0,
            "respawn_time_ms": 30000,
            "xp_reward": 50,
            "damage_min": 5,
            "damage_max": 9,
            "attack_speed_ms": 2000,
            "move_speed": 7.0,
            "wander_range": 12.0
        }))
        .unwrap()
    }

    fn sniper() -> CreatureTemplate {
        let mut t = wolf();
        t.is_ranged = true;
        t.attack_range = Some(20.0);
        t
    }

    fn ctx<'a>(
        template: &'a CreatureTemplate,
        now: i64,
        position: Vec3,
        hostiles: &'a [(u64, Vec3)],
        target: Option<TargetInfo>,
    ) -> AiContext<'a> {
        AiContext {
            now,
            position,
            spawn_position: Vec3::ZERO,
            template,
            hostiles,
            target,
        }
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn test_idle_aggro_picks_nearest() {
        let t = wolf();
        let mut ai = CreatureAi::new();
        let hostiles = [
            (10, Vec3::new(12.0, 0.0, 0.0)),
            (11, Vec3::new(4.0, 0.0, 0.0)),
        ];
        ai.tick(&ctx(&t, 0, Vec3::ZERO, &hostiles, None), &mut rng());

        assert!(ai.in_combat());
        assert_eq!(ai.target_id, Some(11));
        assert_eq!(ai.threat.get(11), INITIAL_THREAT);
    }

    #[test]
    fn test_passive_template_never_aggroes() {
        let mut t = wolf();
        t.disposition = Disposition::Passive;
        let mut ai = CreatureAi::new();
        let hostiles = [(10, Vec3::new(2.0, 0.0, 0.0))];
        ai.tick(&ctx(&t, 0, Vec3::ZERO, &hostiles, None), &mut rng());
        assert_eq!(ai.mode, AiMode::Idle);
    }

    #[test]
    fn test_first_damage_enters_combat_with_base_threat() {
        let mut ai = CreatureAi::new();
        ai.note_damage(42, 25, 100, true);

        assert!(ai.in_combat());
        assert_eq!(ai.target_id, Some(42));
        assert_eq!(ai.threat.get(42), INITIAL_THREAT + 25);
        assert!(ai.participants.contains(&42));
    }

    #[test]
    fn test_passive_damage_records_participant_only() {
        let mut ai = CreatureAi::new();
        ai.note_damage(42, 25, 100, false);

        assert_eq!(ai.mode, AiMode::Idle);
        assert!(ai.threat.is_empty());
        assert!(ai.participants.contains(&42));
    }

    #[test]
    fn test_threat_tie_first_inserted_wins() {
        let mut t = ThreatTable::default();
        t.add(1, 50);
        t.add(2, 50);
        assert_eq!(t.highest(), Some(1));

        t.add(2, 1);
        assert_eq!(t.highest(), Some(2));
    }

    #[test]
    fn test_target_switch_on_death_of_current() {
        let mut ai = CreatureAi::new();
        ai.note_damage(1, 10, 0, true);
        ai.note_damage(2, 500, 0, true);
        assert_eq!(ai.target_id, Some(1));

        let t = wolf();
        // Current target reported dead: switch to highest remaining threat
        let target = TargetInfo {
            id: 1,
            position: Vec3::new(2.0, 0.0, 0.0),
            alive: false,
        };
        ai.tick(&ctx(&t, 100, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert_eq!(ai.target_id, Some(2));
        assert!(ai.in_combat());
    }

    #[test]
    fn test_combat_exit_clears_threat() {
        let mut ai = CreatureAi::new();
        ai.note_damage(1, 10, 0, true);

        let t = wolf();
        // Target gone and no other threat: back to idle
        ai.tick(&ctx(&t, 100, Vec3::ZERO, &[], None), &mut rng());
        assert_eq!(ai.mode, AiMode::Idle);
        assert!(ai.threat.is_empty());
        assert_eq!(ai.target_id, None);
    }

    #[test]
    fn test_melee_attacks_in_range_and_respects_cooldown() {
        let t = wolf();
        let mut ai = CreatureAi::new();
        ai.note_damage(9, 5, 0, true);

        let target = TargetInfo {
            id: 9,
            position: Vec3::new(3.0, 0.0, 0.0),
            alive: true,
        };
        let intent = ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert_eq!(intent, AiIntent::Attack { target_id: 9 });

        // Cooldown not yet elapsed
        let intent = ai.tick(&ctx(&t, 500, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert_eq!(intent, AiIntent::None);

        let intent = ai.tick(&ctx(&t, 2_000, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert_eq!(intent, AiIntent::Attack { target_id: 9 });
    }

    #[test]
    fn test_melee_chases_out_of_range_target() {
        let t = wolf();
        let mut ai = CreatureAi::new();
        ai.note_damage(9, 5, 0, true);

        let target = TargetInfo {
            id: 9,
            position: Vec3::new(20.0, 0.0, 0.0),
            alive: true,
        };
        let intent = ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], Some(target)), &mut rng());
        match intent {
            AiIntent::StartChase { destination } => {
                // Stops attack_range short of the target
                assert!((destination.x - 15.0).abs() < 1e-3);
            }
            other => panic!("expected StartChase, got {other:?}"),
        }

        // While the chase is in flight the path is not re-planned
        let intent = ai.tick(&ctx(&t, 100, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert!(matches!(intent, AiIntent::MoveTo { .. }));
    }

    #[test]
    fn test_ranged_backs_away_when_too_close() {
        let t = sniper();
        let mut ai = CreatureAi::new();
        ai.note_damage(9, 5, 0, true);

        // Target 4 units away, min range is 10
        let target = TargetInfo {
            id: 9,
            position: Vec3::new(4.0, 0.0, 0.0),
            alive: true,
        };
        let intent = ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], Some(target)), &mut rng());
        match intent {
            AiIntent::StartChase { destination } => {
                // Optimal band midpoint is 15 units from the target, on the
                // far side of the creature
                assert!(destination.x < 0.0);
                assert!((target.position.distance_2d(destination) - 15.0).abs() < 1e-3);
            }
            other => panic!("expected StartChase, got {other:?}"),
        }
    }

    #[test]
    fn test_ranged_holds_and_fires_inside_band() {
        let t = sniper();
        let mut ai = CreatureAi::new();
        ai.note_damage(9, 5, 0, true);

        let target = TargetInfo {
            id: 9,
            position: Vec3::new(15.0, 0.0, 0.0),
            alive: true,
        };
        let intent = ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], Some(target)), &mut rng());
        assert_eq!(intent, AiIntent::Attack { target_id: 9 });
    }

    #[test]
    fn test_leash_triggers_evade_and_recovery() {
        let t = wolf();
        let mut ai = CreatureAi::new();
        ai.note_damage(9, 5, 0, true);

        // Dragged past the 40 unit leash
        let position = Vec3::new(45.0, 0.0, 0.0);
        let target = TargetInfo {
            id: 9,
            position: Vec3::new(50.0, 0.0, 0.0),
            alive: true,
        };
        let intent = ai.tick(&ctx(&t, 0, position, &[], Some(target)), &mut rng());
        assert_eq!(
            intent,
            AiIntent::StartEvade {
                destination: Vec3::ZERO
            }
        );
        assert_eq!(ai.mode, AiMode::Evade);

        // Mid-flight: moving home
        let intent = ai.tick(&ctx(&t, 1_000, position, &[], None), &mut rng());
        assert!(matches!(intent, AiIntent::MoveTo { .. }));

        // Long after: arrival resets to idle with cleared threat
        let intent = ai.tick(&ctx(&t, 60_000, position, &[], None), &mut rng());
        assert_eq!(
            intent,
            AiIntent::EvadeComplete {
                position: Vec3::ZERO
            }
        );
        assert_eq!(ai.mode, AiMode::Idle);
        assert!(ai.threat.is_empty());
    }

    #[test]
    fn test_death_preserves_participants_until_respawn() {
        let mut ai = CreatureAi::new();
        ai.note_damage(5, 10, 0, true);
        ai.note_damage(6, 10, 0, true);

        ai.on_death(1_000, 30_000);
        assert_eq!(ai.mode, AiMode::Dead);
        assert!(ai.threat.is_empty());
        assert_eq!(ai.target_id, None);
        assert_eq!(ai.participants.len(), 2);
        assert_eq!(ai.respawn_at, Some(31_000));

        ai.on_respawn();
        assert_eq!(ai.mode, AiMode::Idle);
        assert!(ai.participants.is_empty());
    }

    #[test]
    fn test_social_pull_does_not_override_target() {
        let mut ai = CreatureAi::new();
        ai.enter_combat(1, 0);
        ai.enter_combat(2, 50);
        assert_eq!(ai.target_id, Some(1));
    }

    #[test]
    fn test_wander_starts_within_range_and_completes() {
        let t = wolf();
        let mut ai = CreatureAi::new();
        let mut r = rng();

        // Roll until the 50% gate passes; each attempt advances past the
        // wander cooldown
        let mut now = 0;
        let destination = loop {
            match ai.tick(&ctx(&t, now, Vec3::ZERO, &[], None), &mut r) {
                AiIntent::StartWander { destination } => break destination,
                AiIntent::None => now += WANDER_INTERVAL_MS,
                other => panic!("unexpected intent {other:?}"),
            }
        };
        assert!(destination.distance_2d(Vec3::ZERO) <= t.wander_range + 1e-3);
        assert_eq!(ai.mode, AiMode::Wandering);

        let intent = ai.tick(&ctx(&t, now + 120_000, Vec3::ZERO, &[], None), &mut r);
        assert_eq!(
            intent,
            AiIntent::WanderComplete {
                position: destination
            }
        );
        assert_eq!(ai.mode, AiMode::Idle);
    }

    #[test]
    fn test_patrol_cyclic_advances_and_wraps() {
        let t = wolf();
        let route = vec![
            PatrolWaypoint {
                position: Vec3::new(10.0, 0.0, 0.0),
                pause_ms: 0,
            },
            PatrolWaypoint {
                position: Vec3::new(10.0, 0.0, 10.0),
                pause_ms: 0,
            },
        ];
        let mut ai = CreatureAi::with_patrol(route, PatrolMode::Cyclic);
        let mut r = rng();

        let intent = ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], None), &mut r);
        assert_eq!(
            intent,
            AiIntent::StartPatrol {
                destination: Vec3::new(10.0, 0.0, 0.0)
            }
        );

        // Arrive, advance to the second waypoint
        let intent = ai.tick(&ctx(&t, 100_000, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);
        assert!(matches!(intent, AiIntent::PatrolSegmentComplete { .. }));

        let intent = ai.tick(&ctx(&t, 100_100, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);
        assert_eq!(
            intent,
            AiIntent::StartPatrol {
                destination: Vec3::new(10.0, 0.0, 10.0)
            }
        );

        // Arriving at the last waypoint wraps back to the first
        let intent = ai.tick(&ctx(&t, 300_000, Vec3::new(10.0, 0.0, 10.0), &[], None), &mut r);
        assert!(matches!(intent, AiIntent::PatrolSegmentComplete { .. }));
        let intent = ai.tick(&ctx(&t, 300_100, Vec3::new(10.0, 0.0, 10.0), &[], None), &mut r);
        assert_eq!(
            intent,
            AiIntent::StartPatrol {
                destination: Vec3::new(10.0, 0.0, 0.0)
            }
        );
    }

    #[test]
    fn test_patrol_pause_holds_position() {
        let t = wolf();
        let route = vec![
            PatrolWaypoint {
                position: Vec3::new(10.0, 0.0, 0.0),
                pause_ms: 5_000,
            },
            PatrolWaypoint {
                position: Vec3::new(20.0, 0.0, 0.0),
                pause_ms: 0,
            },
        ];
        let mut ai = CreatureAi::with_patrol(route, PatrolMode::Cyclic);
        let mut r = rng();

        ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], None), &mut r);
        // Arrive at the paused waypoint
        ai.tick(&ctx(&t, 100_000, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);

        // Paused: no movement
        let intent = ai.tick(&ctx(&t, 102_000, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);
        assert_eq!(intent, AiIntent::None);

        // Pause over: next segment starts
        let intent = ai.tick(&ctx(&t, 105_100, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);
        assert!(matches!(intent, AiIntent::StartPatrol { .. }));
    }

    #[test]
    fn test_patrol_one_shot_halts_at_terminal() {
        let t = wolf();
        let route = vec![
            PatrolWaypoint {
                position: Vec3::new(5.0, 0.0, 0.0),
                pause_ms: 0,
            },
            PatrolWaypoint {
                position: Vec3::new(10.0, 0.0, 0.0),
                pause_ms: 0,
            },
        ];
        let mut ai = CreatureAi::with_patrol(route, PatrolMode::OneShot);
        let mut r = rng();

        ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], None), &mut r);
        ai.tick(&ctx(&t, 50_000, Vec3::new(5.0, 0.0, 0.0), &[], None), &mut r);
        ai.tick(&ctx(&t, 50_100, Vec3::new(5.0, 0.0, 0.0), &[], None), &mut r);
        ai.tick(&ctx(&t, 100_000, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);

        // Route exhausted: idle, and wandering is the only thing left
        assert_eq!(ai.mode, AiMode::Idle);
        let intent = ai.tick(&ctx(&t, 100_100, Vec3::new(10.0, 0.0, 0.0), &[], None), &mut r);
        assert!(matches!(intent, AiIntent::None | AiIntent::StartWander { .. }));
    }

    #[test]
    fn test_patrol_back_and_forth_bounces() {
        let mut ai = CreatureAi::with_patrol(
            vec![
                PatrolWaypoint {
                    position: Vec3::new(0.0, 0.0, 0.0),
                    pause_ms: 0,
                },
                PatrolWaypoint {
                    position: Vec3::new(1.0, 0.0, 0.0),
                    pause_ms: 0,
                },
                PatrolWaypoint {
                    position: Vec3::new(2.0, 0.0, 0.0),
                    pause_ms: 0,
                },
            ],
            PatrolMode::BackAndForth,
        );
        let visits: Vec<usize> = (0..6)
            .map(|_| {
                let at = ai.patrol_index;
                ai.advance_patrol();
                at
            })
            .collect();
        assert_eq!(visits, vec![0, 1, 2, 1, 0, 1]);
    }

    #[test]
    fn test_patrol_reverse_starts_at_far_end() {
        let ai = CreatureAi::with_patrol(
            vec![
                PatrolWaypoint {
                    position: Vec3::ZERO,
                    pause_ms: 0,
                },
                PatrolWaypoint {
                    position: Vec3::new(1.0, 0.0, 0.0),
                    pause_ms: 0,
                },
            ],
            PatrolMode::CyclicReverse,
        );
        assert_eq!(ai.patrol_index, 1);
    }

    #[test]
    fn test_combat_faction_check_is_zone_side() {
        // Friendly creatures get an empty hostile list from the zone and
        // must stay idle even with players around
        let mut t = wolf();
        t.faction = FactionCategory::Friendly;
        let mut ai = CreatureAi::new();
        ai.tick(&ctx(&t, 0, Vec3::ZERO, &[], None), &mut rng());
        assert_eq!(ai.mode, AiMode::Idle);
    }

    #[test]
    fn test_path_interpolation() {
        let path = MovementPath::new(
            vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)],
            0,
            5.0, // 10 units at 5/s = 2000ms
        );
        assert_eq!(path.duration_ms, 2_000);
        assert!(!path.finished(1_999));
        assert!(path.finished(2_000));

        let mid = path.position_at(1_000);
        assert!((mid.x - 5.0).abs() < 1e-3);
        assert_eq!(path.position_at(5_000), Vec3::new(10.0, 0.0, 0.0));
    }
}
