//! Spellbook pass: caster levels, slot maxima, known-spell arrays.

use std::collections::BTreeMap;

use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::{ClassBlock, Derived, PrestigeClPool, Spellbook, SpellcastingType};
use crate::rolldata::RollData;

/// Spellbooks keyed on this class tag draw their caster level from total
/// hit dice instead of a class.
const HIT_DIE_TAG: &str = "_hd";

pub(super) fn rebuild(
    spellbooks: &mut BTreeMap<String, Spellbook>,
    prestige_pools: &BTreeMap<SpellcastingType, PrestigeClPool>,
    derived: &Derived,
    data: &RollData,
    roller: &mut dyn DiceRoller,
    warnings: &mut Vec<String>,
) {
    // Prestige caster levels are a shared pool per spellcasting type;
    // books draw from it in key order.
    let mut remaining: BTreeMap<SpellcastingType, i32> = prestige_pools
        .iter()
        .map(|(kind, pool)| (*kind, pool.max))
        .collect();

    for (key, book) in spellbooks.iter_mut() {
        let block = derived.classes.get(&book.class_tag);

        if let Some(block) = block {
            book.spellcasting_type = block.spellcasting_type;
            book.spontaneous = block.is_spontaneous;
            book.all_spells_known = block.all_spells_known;
        }

        let class_cl = if book.class_tag == HIT_DIE_TAG {
            derived.hd_total as i32
        } else {
            match block {
                Some(block) if block.half_caster_level => (block.level / 2) as i32,
                Some(block) => block.level as i32,
                None => 0,
            }
        };

        let formula_cl = if book.cl_formula.is_empty() {
            0
        } else {
            let outcome = safe_evaluate(&book.cl_formula, data, roller);
            if let Some(error) = outcome.error {
                warnings.push(format!("spellbook {key}: caster level: {error}"));
            }
            outcome.total as i32
        };

        let pool = remaining
            .entry(book.spellcasting_type)
            .or_insert(0);
        book.max_prestige_cl = prestige_pools
            .get(&book.spellcasting_type)
            .map(|pool| pool.max)
            .unwrap_or(0);
        let applied_prestige = book.bonus_prestige_cl.clamp(0, *pool);
        *pool -= applied_prestige;
        book.available_prestige_cl = *pool;

        book.cl_total = book.cl_base + class_cl + formula_cl + applied_prestige;

        if let Some(block) = block {
            rebuild_slots(book, block);
        }
    }
}

/// Slot and known maxima from the class progression arrays, indexed by
/// class level. Manual base overrides win over the array value; current
/// slot values clamp to the rebuilt maximum but are never refilled here.
fn rebuild_slots(book: &mut Spellbook, block: &ClassBlock) {
    let level_index = match block.level {
        0 => return,
        level => (level - 1) as usize,
    };

    let per_level = block
        .spells_per_level
        .get(level_index)
        .cloned()
        .unwrap_or_default();
    let known = block
        .spells_known_per_level
        .get(level_index)
        .cloned()
        .unwrap_or_default();

    for (spell_level, slot) in book.spells.iter_mut().enumerate() {
        let array_max = per_level.get(spell_level).copied().unwrap_or(0);
        slot.max = slot.base.unwrap_or(array_max);
        slot.value = slot.value.min(slot.max);
        slot.max_known = known.get(spell_level).copied().unwrap_or(0);
    }

    book.powers_known = block
        .powers_known
        .get(level_index)
        .copied()
        .unwrap_or(0);
    book.powers_max_level = block
        .powers_max_level
        .get(level_index)
        .copied()
        .unwrap_or(0);
}
