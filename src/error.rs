// Engine errors: a small closed set, returned as values.
//
// Every command-surface operation returns `Result<_, EngineError>`. Nothing
// is retried inside the engine and failed operations leave state untouched.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("entity not found")]
    NotFound,
    #[error("creature template not found")]
    TemplateNotFound,
    #[error("caster is dead")]
    CasterDead,
    #[error("target is dead")]
    TargetDead,
    #[error("creature is dead")]
    CreatureDead,
    #[error("id already registered")]
    AlreadyRegistered,
    #[error("creature is not in combat")]
    NotInCombat,
    #[error("invalid target for this operation")]
    InvalidTarget,
    #[error("target out of range")]
    OutOfRange,
    #[error("insufficient resource")]
    InsufficientResource,
    #[error("spell is on cooldown")]
    OnCooldown,
    #[error("unknown spell")]
    UnknownSpell,
    #[error("a cast is already in progress")]
    Busy,
}
