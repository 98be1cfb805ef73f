//! Class-block pass: tags, level totals, attack bonus, saving throws.

use std::collections::BTreeMap;

use crate::config::WorldConfig;
use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::{
    ClassBlock, ClassType, Counter, Derived, Item, ItemKind, SaveSet, create_tag,
};
use crate::rolldata::RollData;

pub(super) fn rebuild(
    items: &[Item],
    bab_base: i32,
    config: &WorldConfig,
    roller: &mut dyn DiceRoller,
    derived: &mut Derived,
    warnings: &mut Vec<String>,
) {
    let mut classes: BTreeMap<String, ClassBlock> = BTreeMap::new();
    let mut aliases: Vec<(String, String)> = Vec::new();

    let mut class_levels: u32 = 0;
    let mut total_non_ecl: u32 = 0;
    let mut hd_total: u32 = 0;
    let mut bab_total: i32 = bab_base;

    for item in items {
        if item.kind != ItemKind::Class || !item.is_contributing() {
            continue;
        }
        let Some(class) = item.class_data() else {
            continue;
        };

        let base_tag = class
            .custom_tag
            .clone()
            .filter(|tag| !tag.is_empty())
            .unwrap_or_else(|| create_tag(&item.name));
        let tag = unique_tag(&classes, &base_tag);

        let saving_throws = class_saves(&tag, class, config, roller, warnings);

        let block = ClassBlock {
            item_id: item.id,
            name: item.name.clone(),
            level: class.levels,
            max_level: class.max_level,
            hit_die: class.hit_die,
            bab: class.bab,
            auto_health: config.health.rule != crate::config::HitDieRule::Roll,
            skills_per_level: class.skills_per_level,
            saving_throws,
            favored_class: class.favored_class,
            spellcasting_type: class.spellcasting,
            is_spellcaster: class.spellcasting != crate::model::SpellcastingType::None,
            is_spontaneous: class.spellcasting_spontaneous,
            half_caster_level: class.half_caster_level,
            all_spells_known: class.all_spells_known,
            has_special_slot: class.has_special_slot,
            has_spellbook: class.has_spellbook,
            spells_per_level: class.spells_per_level.clone(),
            spells_known_per_level: class.spells_known_per_level.clone(),
            powers_known: class.powers_known.clone(),
            powers_max_level: class.powers_max_level.clone(),
            deck_hand_size_formula: class.deck_hand_size_formula.clone(),
            known_cards_size_formula: class.known_cards_size_formula.clone(),
            deck_prestige_class: class.deck_prestige_class,
        };

        match class.class_type {
            ClassType::Template => {}
            ClassType::Racial => total_non_ecl += class.levels,
            _ => {
                class_levels += class.levels;
                total_non_ecl += class.levels;
            }
        }
        hd_total += class.levels;
        bab_total += class.bab.at_level(class.levels);

        // Items are addressable under the renamed and the original name
        // too, as long as those tags are free.
        for alias in [create_tag(&item.name), create_tag(&item.original_name)] {
            if alias != tag {
                aliases.push((alias, tag.clone()));
            }
        }
        classes.insert(tag, block);
    }

    for (alias, tag) in aliases {
        if !classes.contains_key(&alias)
            && let Some(block) = classes.get(&tag).cloned()
        {
            classes.insert(alias, block);
        }
    }

    derived.classes = classes;
    derived.class_levels = class_levels.min(20);
    derived.total_non_ecl_levels = total_non_ecl;
    derived.hd_total = hd_total;
    derived.bab_total = bab_total;

    rebuild_counters(items, total_non_ecl, config, derived);
}

/// Resolve tag collisions with a numeric suffix: `fighter`, `fighter2`.
fn unique_tag(classes: &BTreeMap<String, ClassBlock>, base: &str) -> String {
    if !classes.contains_key(base) {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}{counter}");
        if !classes.contains_key(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn class_saves(
    tag: &str,
    class: &crate::model::ClassData,
    config: &WorldConfig,
    roller: &mut dyn DiceRoller,
    warnings: &mut Vec<String>,
) -> SaveSet {
    let Some(formulas) = config.save_formulas(class.class_type) else {
        warnings.push(format!("{tag}: no save formulas for {}", class.class_type));
        return SaveSet::default();
    };
    let mut data = RollData::new();
    data.set("level", class.levels);

    let mut eval = |progression| {
        let formula = formulas.for_progression(progression);
        let outcome = safe_evaluate(formula, &data, &mut *roller);
        if let Some(error) = outcome.error {
            warnings.push(format!("{tag}: save formula: {error}"));
        }
        outcome.total as i32
    };

    SaveSet {
        fort: eval(class.saves.fort),
        reflex: eval(class.saves.reflex),
        will: eval(class.saves.will),
    }
}

/// Grouped counters; for now the bonus-feat cadence plus how many feats
/// the actor actually holds.
fn rebuild_counters(
    items: &[Item],
    total_non_ecl: u32,
    config: &WorldConfig,
    derived: &mut Derived,
) {
    let divisor = config.feat_level_divisor.max(1);
    let granted = (total_non_ecl / divisor) as i32 + 1;
    let held = items
        .iter()
        .filter(|item| item.kind == ItemKind::Feat && item.is_contributing())
        .count() as i32;

    let mut feats = BTreeMap::new();
    feats.insert(
        "base".to_string(),
        Counter {
            value: granted,
            counted: held,
        },
    );
    derived.counters.insert("feat".to_string(), feats);
}
