//! Card-deck pass: hand size and known-card totals for card casters.

use std::collections::BTreeMap;

use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::{CardDeck, Derived, PrestigeClPool, SpellcastingType};
use crate::rolldata::RollData;

pub(super) fn rebuild(
    decks: &mut BTreeMap<String, CardDeck>,
    prestige_pools: &BTreeMap<SpellcastingType, PrestigeClPool>,
    derived: &Derived,
    data: &RollData,
    roller: &mut dyn DiceRoller,
    warnings: &mut Vec<String>,
) {
    let pool_max = prestige_pools
        .get(&SpellcastingType::Cards)
        .map(|pool| pool.max)
        .unwrap_or(0);
    let mut remaining = pool_max;

    for (key, deck) in decks.iter_mut() {
        let Some(block) = derived.classes.get(&deck.class_tag) else {
            deck.hand_size = 0;
            deck.known_cards = 0;
            continue;
        };

        let mut eval = |formula: &Option<String>, what: &str| {
            let Some(formula) = formula else { return 0 };
            let outcome = safe_evaluate(formula, data, &mut *roller);
            if let Some(error) = outcome.error {
                warnings.push(format!("deck {key}: {what}: {error}"));
            }
            outcome.total.max(0.0) as u32
        };

        deck.hand_size = eval(&block.deck_hand_size_formula, "hand size");
        deck.known_cards = eval(&block.known_cards_size_formula, "known cards");

        deck.max_prestige_cl = pool_max;
        let applied = deck.bonus_prestige_cl.clamp(0, remaining);
        remaining -= applied;
        deck.available_prestige_cl = remaining;
    }
}
