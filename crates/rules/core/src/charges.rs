//! Charge and resource accounting.
//!
//! Every chargeable item resolves to exactly one backing pool: stacked
//! quantity for single-use items, prepared counts or spellbook slot pools
//! or power points for spells, hand membership for cards, the linked
//! item's pool when a link is set, and the item's own uses block otherwise.
//!
//! Mutation is expressed as a [`ChargeUpdate`] directive rather than
//! applied in place; the runtime turns directives into document-store
//! writes so a batch of consumptions flushes as one update.

use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::{Actor, CardState, Item, ItemId, ItemKind, UsagePeriod};
use crate::rolldata::RollData;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{item_name}: needs {needed} charges, {available} available")]
    Insufficient {
        item_name: String,
        needed: u32,
        available: u32,
    },
    #[error("linked charge item {0} not found on actor")]
    BrokenLink(ItemId),
    #[error("item {0} not found on actor")]
    UnknownItem(ItemId),
    #[error("{0} has no charge pool")]
    NoPool(String),
}

/// Remaining or maximum capacity of a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargePool {
    Limited(u32),
    Unlimited,
}

impl ChargePool {
    pub fn available(&self) -> u32 {
        match self {
            ChargePool::Limited(n) => *n,
            ChargePool::Unlimited => u32::MAX,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, ChargePool::Unlimited)
    }
}

/// Which stored field a charge mutation lands on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeTarget {
    /// `uses.value` on an item.
    ItemUses { item: ItemId, value: u32 },
    /// Stacked quantity on a single-use item.
    ItemQuantity { item: ItemId, quantity: u32 },
    /// Prepared count on a prepared spell.
    SpellPrepared { item: ItemId, value: u32 },
    /// Spontaneous slot pool for one spell level.
    SpontaneousSlots {
        spellbook: String,
        level: u32,
        value: u32,
    },
    /// Power-point pool of a psionic book.
    PowerPoints { spellbook: String, value: i32 },
    /// Card moved between deck, hand, and discard.
    CardMoved { item: ItemId, state: CardState },
    /// At-will pool: nothing to persist.
    None,
}

/// Directive produced by [`add_charges`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeUpdate {
    pub target: ChargeTarget,
    /// Set when driving the pool to zero started the recharge timer; the
    /// value is the rolled time until refill.
    pub recharge_started: Option<u32>,
}

/// Resolve the item actually backing `item`'s charges, following at most
/// one link hop the way the source data uses them.
fn backing_item<'a>(actor: &'a Actor, item: &'a Item) -> Result<&'a Item, ResourceError> {
    match item.linked_charge_item {
        Some(link) => actor.item(link).ok_or(ResourceError::BrokenLink(link)),
        None => Ok(item),
    }
}

/// Remaining charges of an item's pool.
pub fn get_charges(actor: &Actor, item: &Item) -> Result<ChargePool, ResourceError> {
    let item = backing_item(actor, item)?;

    if item.kind == ItemKind::Spell {
        return Ok(spell_charges(actor, item));
    }
    if item.kind == ItemKind::Card {
        let in_hand = item
            .card_data()
            .is_some_and(|card| card.state == CardState::Hand);
        return Ok(ChargePool::Limited(u32::from(in_hand)));
    }
    if item.is_single_use() {
        return Ok(ChargePool::Limited(item.quantity));
    }
    match &item.uses {
        Some(uses) if uses.per == UsagePeriod::Unlimited => Ok(ChargePool::Unlimited),
        Some(uses) => Ok(ChargePool::Limited(uses.value)),
        None => Ok(ChargePool::Unlimited),
    }
}

/// Maximum capacity of an item's pool.
pub fn get_max_charges(actor: &Actor, item: &Item) -> Result<ChargePool, ResourceError> {
    let item = backing_item(actor, item)?;

    if item.kind == ItemKind::Spell {
        return Ok(spell_max_charges(actor, item));
    }
    if item.kind == ItemKind::Card {
        return Ok(ChargePool::Limited(1));
    }
    if item.is_single_use() {
        return Ok(ChargePool::Limited(item.quantity));
    }
    match &item.uses {
        Some(uses) if uses.per == UsagePeriod::Unlimited => Ok(ChargePool::Unlimited),
        Some(uses) => Ok(ChargePool::Limited(uses.max)),
        None => Ok(ChargePool::Unlimited),
    }
}

fn spell_charges(actor: &Actor, item: &Item) -> ChargePool {
    let Some(spell) = item.spell_data() else {
        return ChargePool::Limited(0);
    };
    if spell.at_will {
        return ChargePool::Unlimited;
    }
    let Some(book) = actor.attributes.spellbooks.get(&spell.spellbook) else {
        return ChargePool::Limited(0);
    };
    if book.use_power_points {
        return ChargePool::Limited(book.power_points.max(0) as u32);
    }
    if book.spontaneous {
        let slots = book
            .spells
            .get(spell.level as usize)
            .map(|slot| slot.value)
            .unwrap_or(0);
        return ChargePool::Limited(slots);
    }
    ChargePool::Limited(spell.prepared_amount)
}

fn spell_max_charges(actor: &Actor, item: &Item) -> ChargePool {
    let Some(spell) = item.spell_data() else {
        return ChargePool::Limited(0);
    };
    if spell.at_will {
        return ChargePool::Unlimited;
    }
    let Some(book) = actor.attributes.spellbooks.get(&spell.spellbook) else {
        return ChargePool::Limited(0);
    };
    if book.use_power_points {
        return ChargePool::Limited(book.power_points_total.max(0) as u32);
    }
    if book.spontaneous {
        let slots = book
            .spells
            .get(spell.level as usize)
            .map(|slot| slot.max)
            .unwrap_or(0);
        return ChargePool::Limited(slots);
    }
    ChargePool::Limited(spell.prepared_amount)
}

/// Charges consumed by one activation.
pub fn charge_cost(actor: &Actor, item: &Item) -> u32 {
    if item.kind == ItemKind::Spell {
        if let Some(spell) = item.spell_data() {
            let uses_power_points = actor
                .attributes
                .spellbooks
                .get(&spell.spellbook)
                .is_some_and(|book| book.use_power_points);
            if uses_power_points {
                return spell.power_points_cost.max(1);
            }
        }
        return 1;
    }
    item.uses
        .as_ref()
        .map(|uses| uses.charges_per_use.max(1))
        .unwrap_or(1)
}

/// Adjust an item's pool by `delta` (negative consumes) and describe the
/// resulting write.
///
/// The pool is never mutated here. Consuming past the available amount
/// fails with [`ResourceError::Insufficient`] and produces no directive,
/// so a rejected activation leaves no partial state behind.
pub fn add_charges(
    actor: &Actor,
    item_id: ItemId,
    delta: i64,
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> Result<ChargeUpdate, ResourceError> {
    let item = actor
        .item(item_id)
        .ok_or(ResourceError::UnknownItem(item_id))?;
    let item = backing_item(actor, item)?;

    if item.kind == ItemKind::Card {
        return card_update(item, delta);
    }

    let current = get_charges(actor, item)?;
    if current.is_unlimited() {
        return Ok(ChargeUpdate {
            target: ChargeTarget::None,
            recharge_started: None,
        });
    }

    let available = current.available() as i64;
    let next = available + delta;
    if next < 0 {
        return Err(ResourceError::Insufficient {
            item_name: item.name.clone(),
            needed: (-delta) as u32,
            available: available as u32,
        });
    }
    let max = get_max_charges(actor, item)?;
    let next = match max {
        ChargePool::Limited(max) => next.min(max as i64) as u32,
        ChargePool::Unlimited => next as u32,
    };

    let target = if item.kind == ItemKind::Spell {
        spell_target(actor, item, next)?
    } else if item.is_single_use() {
        ChargeTarget::ItemQuantity {
            item: item.id,
            quantity: next,
        }
    } else {
        ChargeTarget::ItemUses {
            item: item.id,
            value: next,
        }
    };

    // The recharge timer starts only when a consumption empties the pool
    // exactly; an already-empty pool does not re-roll it.
    let recharge_started = if next == 0 && delta < 0 {
        item.recharge
            .as_ref()
            .filter(|recharge| recharge.enabled && !recharge.formula.is_empty())
            .map(|recharge| {
                safe_evaluate(&recharge.formula, data, roller)
                    .total
                    .max(0.0) as u32
            })
    } else {
        None
    };

    Ok(ChargeUpdate {
        target,
        recharge_started,
    })
}

fn spell_target(actor: &Actor, item: &Item, next: u32) -> Result<ChargeTarget, ResourceError> {
    let spell = item
        .spell_data()
        .ok_or_else(|| ResourceError::NoPool(item.name.clone()))?;
    let Some(book) = actor.attributes.spellbooks.get(&spell.spellbook) else {
        return Err(ResourceError::NoPool(item.name.clone()));
    };
    if book.use_power_points {
        return Ok(ChargeTarget::PowerPoints {
            spellbook: spell.spellbook.clone(),
            value: next as i32,
        });
    }
    if book.spontaneous {
        return Ok(ChargeTarget::SpontaneousSlots {
            spellbook: spell.spellbook.clone(),
            level: spell.level,
            value: next,
        });
    }
    Ok(ChargeTarget::SpellPrepared {
        item: item.id,
        value: next,
    })
}

/// Cards move through states instead of counting: consuming discards a
/// card from hand, restoring returns it to hand from deck or discard.
fn card_update(item: &Item, delta: i64) -> Result<ChargeUpdate, ResourceError> {
    let state = item
        .card_data()
        .map(|card| card.state)
        .ok_or_else(|| ResourceError::NoPool(item.name.clone()))?;
    let next = match (delta.signum(), state) {
        (-1, CardState::Hand) => CardState::Discarded,
        (-1, _) => {
            return Err(ResourceError::Insufficient {
                item_name: item.name.clone(),
                needed: 1,
                available: 0,
            });
        }
        (1, _) => CardState::Hand,
        _ => state,
    };
    Ok(ChargeUpdate {
        target: ChargeTarget::CardMoved {
            item: item.id,
            state: next,
        },
        recharge_started: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::SequenceRoller;
    use crate::model::{
        Actor, ActorId, CardData, Item, ItemId, ItemPayload, Recharge, SpellData, Spellbook, Uses,
    };

    fn wand(value: u32, max: u32) -> Item {
        let mut item = Item::new(ItemId(1), "Wand of Magic Missile", ItemKind::Equipment);
        item.uses = Some(Uses {
            per: UsagePeriod::Charges,
            value,
            max,
            max_formula: None,
            charges_per_use: 1,
            is_resource: false,
        });
        item
    }

    fn owner(items: Vec<Item>) -> Actor {
        let mut actor = Actor::new(ActorId(1), "Owner");
        actor.items = items;
        actor
    }

    #[test]
    fn consumption_decrements_and_clamps_at_error() {
        let actor = owner(vec![wand(3, 50)]);
        let mut roller = SequenceRoller::new(vec![]);
        let data = RollData::new();

        let update = add_charges(&actor, ItemId(1), -2, &data, &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::ItemUses {
                item: ItemId(1),
                value: 1
            }
        );

        let err = add_charges(&actor, ItemId(1), -4, &data, &mut roller).unwrap_err();
        assert!(matches!(err, ResourceError::Insufficient { .. }));
    }

    #[test]
    fn restore_clamps_to_max() {
        let actor = owner(vec![wand(48, 50)]);
        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(1), 10, &RollData::new(), &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::ItemUses {
                item: ItemId(1),
                value: 50
            }
        );
    }

    #[test]
    fn single_use_tracks_quantity() {
        let mut potion = Item::new(ItemId(2), "Potion of Cure Light Wounds", ItemKind::Consumable);
        potion.quantity = 3;
        potion.uses = Some(Uses {
            per: UsagePeriod::Single,
            ..Default::default()
        });
        let actor = owner(vec![potion]);
        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(2), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::ItemQuantity {
                item: ItemId(2),
                quantity: 2
            }
        );
    }

    #[test]
    fn emptying_a_recharging_pool_starts_the_timer() {
        let mut item = wand(1, 10);
        item.recharge = Some(Recharge {
            enabled: true,
            formula: "1d4".to_string(),
            current: 0,
        });
        let actor = owner(vec![item]);
        let mut roller = SequenceRoller::new(vec![3]);
        let update =
            add_charges(&actor, ItemId(1), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(update.recharge_started, Some(3));
    }

    #[test]
    fn linked_items_delegate_to_the_target_pool() {
        let staff = wand(5, 10);
        let mut strike = Item::new(ItemId(2), "Staff Strike", ItemKind::Attack);
        strike.linked_charge_item = Some(ItemId(1));
        let actor = owner(vec![staff, strike]);
        let strike = actor.item(ItemId(2)).unwrap();
        assert_eq!(
            get_charges(&actor, strike).unwrap(),
            ChargePool::Limited(5)
        );

        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(2), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::ItemUses {
                item: ItemId(1),
                value: 4
            }
        );
    }

    #[test]
    fn spontaneous_spells_share_the_level_pool() {
        let mut book = Spellbook {
            spontaneous: true,
            ..Default::default()
        };
        book.spells[1].value = 4;
        book.spells[1].max = 5;
        let mut spell = Item::new(ItemId(3), "Burning Hands", ItemKind::Spell);
        spell.payload = ItemPayload::Spell(SpellData {
            level: 1,
            spellbook: "primary".to_string(),
            ..Default::default()
        });
        let mut actor = owner(vec![spell]);
        actor
            .attributes
            .spellbooks
            .insert("primary".to_string(), book);

        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(3), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::SpontaneousSlots {
                spellbook: "primary".to_string(),
                level: 1,
                value: 3
            }
        );
    }

    #[test]
    fn at_will_spells_never_deplete() {
        let mut spell = Item::new(ItemId(4), "Detect Magic", ItemKind::Spell);
        spell.payload = ItemPayload::Spell(SpellData {
            at_will: true,
            ..Default::default()
        });
        let actor = owner(vec![spell]);
        let spell = actor.item(ItemId(4)).unwrap();
        assert!(get_charges(&actor, spell).unwrap().is_unlimited());

        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(4), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(update.target, ChargeTarget::None);
    }

    #[test]
    fn cards_move_between_hand_and_discard() {
        let mut card = Item::new(ItemId(5), "The Tower", ItemKind::Card);
        card.payload = ItemPayload::Card(CardData {
            state: CardState::Hand,
            deck: "harrow".to_string(),
        });
        let actor = owner(vec![card]);
        let mut roller = SequenceRoller::new(vec![]);
        let update =
            add_charges(&actor, ItemId(5), -1, &RollData::new(), &mut roller).unwrap();
        assert_eq!(
            update.target,
            ChargeTarget::CardMoved {
                item: ItemId(5),
                state: CardState::Discarded
            }
        );
    }
}
