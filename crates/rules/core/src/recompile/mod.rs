//! Derived-state recomputation.
//!
//! One pass rebuilds the whole `Derived` block in a fixed order: class
//! blocks, defensive merges, spellbooks, card decks, resource mirrors,
//! advancement. The pass is idempotent; running it twice on unchanged
//! inputs produces identical state. Formula failures inside any step
//! degrade that value to zero and push a warning, so one bad item never
//! takes the whole actor down.

mod classes;
mod decks;
mod defenses;
mod spellbooks;

use crate::config::WorldConfig;
use crate::formula::DiceRoller;
use crate::model::{Actor, Derived, ResourceMirror, create_tag};
use crate::rolldata::build_actor_context;

/// Result of one recompute pass. The same warnings are also stored on
/// `actor.derived.warnings`.
#[derive(Clone, Debug, Default)]
pub struct RecomputeOutcome {
    pub warnings: Vec<String>,
}

/// Derived formulas must stay deterministic, so dice inside them resolve
/// to their minimum face instead of consuming real randomness.
struct MinRoller;

impl DiceRoller for MinRoller {
    fn roll_die(&mut self, _sides: u32) -> u32 {
        1
    }
}

/// Rebuild `actor.derived` and the derived parts of spellbooks, decks,
/// and resource mirrors.
pub fn recompute(actor: &mut Actor, config: &WorldConfig) -> RecomputeOutcome {
    let mut warnings = Vec::new();
    let mut roller = MinRoller;

    let mut derived = Derived::default();
    classes::rebuild(
        &actor.items,
        actor.attributes.bab_base,
        config,
        &mut roller,
        &mut derived,
        &mut warnings,
    );
    actor.derived = derived;
    actor.attributes.init_total = actor.abilities.dex.modifier();

    // Later steps evaluate formulas against the context, which already
    // needs the class blocks and totals in place.
    let data = build_actor_context(actor, config);

    let mut derived = std::mem::take(&mut actor.derived);
    defenses::rebuild(
        &actor.items,
        &actor.energy_resistance,
        &actor.damage_reduction,
        &actor.senses,
        &data,
        &mut roller,
        &mut derived,
        &mut warnings,
    );
    actor.derived = derived;

    spellbooks::rebuild(
        &mut actor.attributes.spellbooks,
        &actor.attributes.prestige_cl,
        &actor.derived,
        &data,
        &mut roller,
        &mut warnings,
    );
    decks::rebuild(
        &mut actor.attributes.decks,
        &actor.attributes.prestige_cl,
        &actor.derived,
        &data,
        &mut roller,
        &mut warnings,
    );

    rebuild_resources(actor);
    rebuild_advancement(actor, config);

    actor.derived.warnings = warnings.clone();
    RecomputeOutcome { warnings }
}

/// Mirror every resource-flagged charge pool under `resources.<tag>`.
fn rebuild_resources(actor: &mut Actor) {
    let mut resources = std::collections::BTreeMap::new();
    for item in &actor.items {
        let Some(uses) = &item.uses else { continue };
        if !uses.is_resource {
            continue;
        }
        resources.insert(
            create_tag(&item.name),
            ResourceMirror {
                value: uses.value,
                max: uses.max,
                item_id: Some(item.id),
            },
        );
    }
    actor.resources = resources;
}

fn rebuild_advancement(actor: &mut Actor, config: &WorldConfig) {
    actor.details.level = actor.derived.total_non_ecl_levels;
    actor.details.xp.max = config.xp_for_level(actor.derived.total_non_ecl_levels);
    actor.derived.can_level_up = actor.details.xp.value >= actor.details.xp.max;
}
