//! The actor aggregate: abilities, attributes, owned items, and the
//! derived block rebuilt by the recompiler.
//!
//! The derived block is a pure function of (abilities, owned items, world
//! configuration); nothing outside `recompile` may write to it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ids::{ActorId, ItemId, create_tag};
use super::item::{Item, ReductionEntry, ResistanceEntry, SenseBlock, SpellcastingType};

/// The six ability scores.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AbilityKind {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

/// One ability score with temporary damage and permanent drain applied on
/// top of the raw value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScore {
    pub value: i32,
    pub damage: i32,
    pub drain: i32,
}

impl Default for AbilityScore {
    fn default() -> Self {
        Self {
            value: 10,
            damage: 0,
            drain: 0,
        }
    }
}

impl AbilityScore {
    pub fn new(value: i32) -> Self {
        Self {
            value,
            damage: 0,
            drain: 0,
        }
    }

    pub fn total(&self) -> i32 {
        self.value - self.damage - self.drain
    }

    /// Standard d20 modifier: floor((total - 10) / 2).
    pub fn modifier(&self) -> i32 {
        (self.total() - 10).div_euclid(2)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Abilities {
    pub str_: AbilityScore,
    pub dex: AbilityScore,
    pub con: AbilityScore,
    pub int: AbilityScore,
    pub wis: AbilityScore,
    pub cha: AbilityScore,
}

impl Abilities {
    pub fn get(&self, kind: AbilityKind) -> &AbilityScore {
        match kind {
            AbilityKind::Str => &self.str_,
            AbilityKind::Dex => &self.dex,
            AbilityKind::Con => &self.con,
            AbilityKind::Int => &self.int,
            AbilityKind::Wis => &self.wis,
            AbilityKind::Cha => &self.cha,
        }
    }

    pub fn get_mut(&mut self, kind: AbilityKind) -> &mut AbilityScore {
        match kind {
            AbilityKind::Str => &mut self.str_,
            AbilityKind::Dex => &mut self.dex,
            AbilityKind::Con => &mut self.con,
            AbilityKind::Int => &mut self.int,
            AbilityKind::Wis => &mut self.wis,
            AbilityKind::Cha => &mut self.cha,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HitPoints {
    pub value: i32,
    pub max: i32,
    pub temp: i32,
    pub nonlethal: i32,
}

/// One spell level's slot block inside a spellbook.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellLevelSlots {
    pub value: u32,
    pub max: u32,
    /// Manual override; `None` means "computed from class arrays".
    pub base: Option<u32>,
    pub known: u32,
    pub max_known: u32,
}

/// A named container of spell slots tied to a class or standalone caster
/// progression. Fields under "derived" are recomputed every pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spellbook {
    /// Owning class tag, `_hd` for hit-die-based casters, or empty.
    pub class_tag: String,
    pub spellcasting_type: SpellcastingType,
    pub spontaneous: bool,
    pub use_power_points: bool,
    pub power_points: i32,
    pub power_points_total: i32,
    pub cl_base: i32,
    pub cl_formula: String,
    pub bonus_prestige_cl: i32,

    // Derived.
    pub cl_total: i32,
    pub max_prestige_cl: i32,
    pub available_prestige_cl: i32,
    pub powers_known: u32,
    pub powers_max_level: u32,
    pub all_spells_known: bool,
    pub spells: [SpellLevelSlots; 10],
}

/// Card-deck analogue of a spellbook.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardDeck {
    pub class_tag: String,
    pub bonus_prestige_cl: i32,

    // Derived.
    pub hand_size: u32,
    pub known_cards: u32,
    pub max_prestige_cl: i32,
    pub available_prestige_cl: i32,
}

/// Prestige caster-level pool for one spellcasting type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrestigeClPool {
    pub max: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub hp: HitPoints,
    /// Base-attack-bonus override added on top of the class-derived value.
    pub bab_base: i32,
    pub init_total: i32,
    pub psionic_focus: bool,
    /// Named boolean condition flags (`prone`, `shaken`, custom ones).
    pub conditions: BTreeMap<String, bool>,
    pub prestige_cl: BTreeMap<SpellcastingType, PrestigeClPool>,
    pub spellbooks: BTreeMap<String, Spellbook>,
    pub decks: BTreeMap<String, CardDeck>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub value: u64,
    /// Threshold for the next level; recomputed from the experience table.
    pub max: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Details {
    pub xp: Experience,
    pub level: u32,
    /// Size category key into the world size chart (`med`, `lg`, ...).
    pub actual_size: String,
}

/// Mirror of one charged item's pool under `resources.<tag>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMirror {
    pub value: u32,
    pub max: u32,
    pub item_id: Option<ItemId>,
}

// ============================================================================
// Derived block
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSet {
    pub fort: i32,
    pub reflex: i32,
    pub will: i32,
}

/// Per-class computed block, stored under the class tag (plus name-tag
/// aliases pointing at the same data).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassBlock {
    pub item_id: ItemId,
    pub name: String,
    pub level: u32,
    pub max_level: u32,
    pub hit_die: u32,
    pub bab: super::item::BabProgression,
    /// Whether health rolls automatically under the world health config.
    pub auto_health: bool,
    pub skills_per_level: u32,
    pub saving_throws: SaveSet,
    pub favored_class: super::item::FavoredClass,

    pub spellcasting_type: SpellcastingType,
    pub is_spellcaster: bool,
    pub is_spontaneous: bool,
    pub half_caster_level: bool,
    pub all_spells_known: bool,
    pub has_special_slot: bool,
    pub has_spellbook: bool,
    /// Slot/known arrays indexed by class level - 1, then spell level.
    pub spells_per_level: Vec<Vec<u32>>,
    pub spells_known_per_level: Vec<Vec<u32>>,
    pub powers_known: Vec<u32>,
    pub powers_max_level: Vec<u32>,

    pub deck_hand_size_formula: Option<String>,
    pub known_cards_size_formula: Option<String>,
    pub deck_prestige_class: bool,
}

/// A grouped counter (feat slots and similar): granted vs. consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub value: i32,
    pub counted: i32,
}

/// Resolved resistance/reduction entry after merging item contributions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResistance {
    pub kind: String,
    pub value: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReduction {
    pub bypass: String,
    pub value: i32,
}

/// Merged senses plus which keys differ from the actor's base block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedSenses {
    pub senses: SenseBlock,
    pub modified: BTreeMap<String, bool>,
}

/// The derived attribute block. Rebuilt from scratch by every recompute
/// pass; treat as read-only everywhere else.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub classes: BTreeMap<String, ClassBlock>,
    /// Non-racial class levels, capped at 20.
    pub class_levels: u32,
    /// All non-template levels (effective character level basis).
    pub total_non_ecl_levels: u32,
    pub bab_total: i32,
    pub hd_total: u32,
    pub counters: BTreeMap<String, BTreeMap<String, Counter>>,
    pub combined_resistances: Vec<ResolvedResistance>,
    pub combined_dr: Vec<ResolvedReduction>,
    pub senses: DerivedSenses,
    pub can_level_up: bool,
    /// Warnings accumulated during the pass (bad formulas and the like).
    pub warnings: Vec<String>,
}

// ============================================================================
// Actor
// ============================================================================

/// A character or creature aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub abilities: Abilities,
    pub attributes: Attributes,
    pub details: Details,
    /// Base lists; item contributions merge into `derived`.
    pub energy_resistance: Vec<ResistanceEntry>,
    pub damage_reduction: Vec<ReductionEntry>,
    pub senses: SenseBlock,
    pub resources: BTreeMap<String, ResourceMirror>,
    pub items: Vec<Item>,
    pub derived: Derived,
}

impl Actor {
    pub fn new(id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Find an owned item by original name, the way scripts address items.
    pub fn item_by_original_name(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.original_name == name)
    }

    pub fn item_by_tag(&self, tag: &str) -> Option<&Item> {
        self.items.iter().find(|item| create_tag(&item.name) == tag)
    }

    /// Buffs currently tracked by an active combat (active, with an
    /// enabled timeline).
    pub fn tracked_buffs(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| {
            item.is_buff_like()
                && item.active
                && item.timeline().is_some_and(|timeline| timeline.enabled)
        })
    }

    pub fn condition(&self, name: &str) -> bool {
        self.attributes
            .conditions
            .get(name)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::item::ItemKind;

    #[test]
    fn ability_modifiers() {
        assert_eq!(AbilityScore::new(14).modifier(), 2);
        assert_eq!(AbilityScore::new(10).modifier(), 0);
        assert_eq!(AbilityScore::new(9).modifier(), -1);
        assert_eq!(AbilityScore::new(7).modifier(), -2);
        let drained = AbilityScore {
            value: 14,
            damage: 2,
            drain: 1,
        };
        assert_eq!(drained.total(), 11);
        assert_eq!(drained.modifier(), 0);
    }

    #[test]
    fn item_lookup_by_original_name() {
        let mut actor = Actor::new(ActorId(1), "Test");
        let mut item = Item::new(ItemId(1), "Rage", ItemKind::Buff);
        item.name = "Greater Rage".to_string();
        actor.items.push(item);
        assert!(actor.item_by_original_name("Rage").is_some());
        assert!(actor.item_by_original_name("Greater Rage").is_none());
    }
}
