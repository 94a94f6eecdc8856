// A creature record: the AI-side companion to a creature entity.

use std::sync::Arc;

use super::ai::CreatureAi;
use super::geometry::Vec3;
use super::template::{CreatureTemplate, Disposition};

/// Per-creature state owned by the zone next to the creature's entity.
/// The entity holds the live position and health; this record holds what
/// never changes (template, spawn position) plus the AI state machine.
pub struct Creature {
    pub entity_id: u64,
    pub template: Arc<CreatureTemplate>,
    /// Immutable after spawn; all leashing and evading references it.
    pub spawn_position: Vec3,
    pub ai: CreatureAi,
}

impl Creature {
    pub fn new(entity_id: u64, template: Arc<CreatureTemplate>, spawn_position: Vec3) -> Self {
        Creature {
            entity_id,
            template,
            spawn_position,
            ai: CreatureAi::new(),
        }
    }

    /// Whether this creature answers damage with combat.
    pub fn fights_back(&self) -> bool {
        self.template.disposition != Disposition::Passive
    }
}
