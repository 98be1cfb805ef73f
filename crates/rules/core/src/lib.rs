//! Deterministic d20 3.5e rules engine shared across hosts.
//!
//! `srd35-core` defines the canonical rules data (actors, items, derived
//! state) and exposes pure APIs for formula evaluation, charge accounting,
//! derived-state recomputation, conditional-modifier resolution, timed
//! effects, and action-script planning. There is no I/O here: randomness
//! is injected through [`formula::DiceRoller`] and every mutation of host
//! documents is expressed as a directive for the runtime to apply.

pub mod changes;
pub mod charges;
pub mod combat;
pub mod config;
pub mod formula;
pub mod model;
pub mod recompile;
pub mod rolldata;
pub mod script;
pub mod timeline;

pub use changes::{ChangeContext, FoldMode, ResolvedChange, Resolution, apply_changes, resolve_changes};
pub use charges::{
    ChargePool, ChargeTarget, ChargeUpdate, ResourceError, add_charges, charge_cost, get_charges,
    get_max_charges,
};
pub use combat::{RoundFlags, RoundState, buff_initiative};
pub use config::{HealthConfig, HitDieRule, SaveFormulas, WorldConfig};
pub use formula::{
    DiceRoller, Formula, FormulaError, PcgRoller, RollOutcome, evaluate, safe_evaluate,
};
pub use model::{Actor, ActorId, Item, ItemId, ItemKind};
pub use recompile::{RecomputeOutcome, recompute};
pub use rolldata::{ContextCache, RollData, Value, build_actor_context, build_item_context};
pub use script::{ExecutionPlan, PlannedOp, ScriptError, ScriptTarget, build_plan, parse_script};
pub use timeline::{TimedDirective, advance_time};
