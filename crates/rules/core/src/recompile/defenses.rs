//! Defensive merge pass: energy resistance, damage reduction, senses.
//!
//! Sources of the same kind do not stack in 3.5e; every merge keeps the
//! per-kind maximum.

use std::collections::BTreeMap;

use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::{
    Derived, DerivedSenses, Item, ReductionEntry, ResistanceEntry, ResolvedReduction,
    ResolvedResistance, SenseBlock,
};
use crate::rolldata::RollData;

pub(super) fn rebuild(
    items: &[Item],
    base_resistance: &[ResistanceEntry],
    base_reduction: &[ReductionEntry],
    base_senses: &SenseBlock,
    data: &RollData,
    roller: &mut dyn DiceRoller,
    derived: &mut Derived,
    warnings: &mut Vec<String>,
) {
    let mut resistances: BTreeMap<String, i32> = BTreeMap::new();
    let mut reductions: BTreeMap<String, i32> = BTreeMap::new();

    let mut eval = |formula: &str, owner: &str, warnings: &mut Vec<String>| {
        let outcome = safe_evaluate(formula, data, &mut *roller);
        if let Some(error) = outcome.error {
            warnings.push(format!("{owner}: {error}"));
        }
        outcome.total as i32
    };

    for entry in base_resistance {
        let value = eval(&entry.formula, "base resistance", warnings);
        merge_max(&mut resistances, &entry.kind, value);
    }
    for entry in base_reduction {
        let value = eval(&entry.formula, "base damage reduction", warnings);
        merge_max(&mut reductions, &entry.bypass, value);
    }

    for item in items.iter().filter(|item| item.is_contributing()) {
        for entry in &item.resistances {
            let value = eval(&entry.formula, &item.name, warnings);
            merge_max(&mut resistances, &entry.kind, value);
        }
        for entry in &item.damage_reduction {
            let value = eval(&entry.formula, &item.name, warnings);
            merge_max(&mut reductions, &entry.bypass, value);
        }
    }

    derived.combined_resistances = resistances
        .into_iter()
        .map(|(kind, value)| ResolvedResistance { kind, value })
        .collect();
    derived.combined_dr = reductions
        .into_iter()
        .map(|(bypass, value)| ResolvedReduction { bypass, value })
        .collect();

    derived.senses = merge_senses(items, base_senses);
}

fn merge_max(map: &mut BTreeMap<String, i32>, key: &str, value: i32) {
    let slot = map.entry(key.to_string()).or_insert(i32::MIN);
    *slot = (*slot).max(value);
}

/// Max-merge sense contributions over the actor's base block, flagging
/// which keys an item actually raised.
fn merge_senses(items: &[Item], base: &SenseBlock) -> DerivedSenses {
    let mut merged = base.clone();
    let mut modified = BTreeMap::new();

    for item in items.iter().filter(|item| item.is_contributing()) {
        let Some(senses) = &item.senses else {
            continue;
        };
        if senses.darkvision > merged.darkvision {
            merged.darkvision = senses.darkvision;
            modified.insert("darkvision".to_string(), true);
        }
        if senses.low_light && !merged.low_light {
            merged.low_light = true;
            modified.insert("lowLight".to_string(), true);
        }
        if senses.low_light_multiplier > merged.low_light_multiplier {
            merged.low_light_multiplier = senses.low_light_multiplier;
            modified.insert("lowLightMultiplier".to_string(), true);
        }
        for (name, range) in &senses.named {
            let current = merged.named.get(name).copied().unwrap_or(0);
            if *range > current {
                merged.named.insert(name.clone(), *range);
                modified.insert(name.clone(), true);
            }
        }
    }

    DerivedSenses {
        senses: merged,
        modified,
    }
}
