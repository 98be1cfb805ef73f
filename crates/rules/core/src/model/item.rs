//! Owned items: the sub-entities an actor's derived state is computed from.
//!
//! Every item carries the shared fields (charges, combat changes, sense and
//! resistance contributions, scripts) plus a kind-specific payload. The
//! payload layout follows the split the recompiler cares about: classes
//! feed the class/spellbook pipeline, buffs and auras carry timelines,
//! spells sit in spellbooks, cards in decks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::ids::ItemId;

/// Item kind, matching the document types delivered by the host.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Class,
    Race,
    Buff,
    Aura,
    Weapon,
    Equipment,
    Spell,
    Feat,
    Consumable,
    Enhancement,
    Card,
    Attack,
}

/// Usage period for a charge pool.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UsagePeriod {
    /// Consumed per use and tracked through stacked quantity.
    Single,
    Day,
    Week,
    #[default]
    Charges,
    Unlimited,
}

/// Charge/uses state of an item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Uses {
    pub per: UsagePeriod,
    pub value: u32,
    pub max: u32,
    pub max_formula: Option<String>,
    /// Charges consumed per activation (1 when unset in source data).
    pub charges_per_use: u32,
    /// Mirrored into the actor's `resources.<tag>` block.
    pub is_resource: bool,
}

/// Recharge-over-time state for day/week/charges pools.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Recharge {
    pub enabled: bool,
    pub formula: String,
    /// Remaining time until refill; 0 when not recharging.
    pub current: u32,
}

/// Elapsed/total duration tracker driving buff expiry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub enabled: bool,
    pub elapsed: u32,
    pub total: u32,
    pub delete_on_expiry: bool,
    /// Virtual combatant ordering: tick after the owner's turn when set,
    /// before it otherwise.
    pub tick_on_end: bool,
}

/// A conditional, action-type-scoped formula bonus (spec: "combat change").
///
/// `target` may carry a one-character sigil: `$` replaces the destination
/// by template fill, `&` appends, no sigil adds numerically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatChange {
    /// `all` or an item-type scope such as `attack`, `spell`, `savingThrow`.
    pub scope: String,
    /// Empty, or an action type such as `mwak`, `rwak`.
    pub action_filter: String,
    /// Empty, or a condition formula evaluated for truthiness.
    pub condition: String,
    /// Destination roll-data path, with optional sigil.
    pub target: String,
    /// Value formula; dice-bearing formulas are resolved at use time.
    pub formula: String,
    /// Optional special-action payload attached to the change.
    pub special: Option<String>,
}

/// Energy-resistance contribution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistanceEntry {
    pub kind: String,
    pub formula: String,
}

/// Damage-reduction contribution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionEntry {
    /// Bypass type, e.g. `magic`, `good`, or empty for DR/-.
    pub bypass: String,
    pub formula: String,
}

/// Sense values contributed by an item or owned as an actor's base block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SenseBlock {
    pub darkvision: u32,
    pub low_light: bool,
    pub low_light_multiplier: u32,
    /// Arbitrary named senses (blindsense, tremorsense, ...).
    pub named: BTreeMap<String, u32>,
}

/// Per-item user-defined attribute surfaced in roll data under
/// `item.custom.<normalized name>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub id: String,
    pub name: String,
    pub value: String,
    /// For select-list attributes, the labels indexed by the value.
    pub select_list: Option<Vec<String>>,
}

// ============================================================================
// Kind-specific payloads
// ============================================================================

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClassType {
    #[default]
    Base,
    Prestige,
    Racial,
    Template,
    Minion,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BabProgression {
    #[default]
    Low,
    Medium,
    High,
}

impl BabProgression {
    /// Base attack bonus granted by `level` class levels.
    pub fn at_level(self, level: u32) -> i32 {
        match self {
            BabProgression::High => level as i32,
            BabProgression::Medium => (level * 3 / 4) as i32,
            BabProgression::Low => (level / 2) as i32,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SaveProgression {
    Good,
    #[default]
    Poor,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SpellcastingType {
    #[default]
    None,
    Arcane,
    Divine,
    Psionic,
    Cards,
    Other,
}

/// Per-save progression assignment for a class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSaves {
    pub fort: SaveProgression,
    pub reflex: SaveProgression,
    pub will: SaveProgression,
}

/// Favored-class bonus allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoredClass {
    pub hp: i32,
    pub skill: i32,
    pub alt: i32,
}

/// Class progression data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    pub levels: u32,
    pub max_level: u32,
    pub class_type: ClassType,
    /// Hit die size (d6 stored as 6).
    pub hit_die: u32,
    pub bab: BabProgression,
    pub saves: ClassSaves,
    pub skills_per_level: u32,
    pub custom_tag: Option<String>,
    pub favored_class: FavoredClass,

    pub spellcasting: SpellcastingType,
    pub spellcasting_spontaneous: bool,
    pub spellcasting_ability: Option<String>,
    pub spellslot_ability: Option<String>,
    pub all_spells_known: bool,
    pub half_caster_level: bool,
    pub has_special_slot: bool,
    pub has_spellbook: bool,
    /// Spell slots per spell level (0..=9), indexed by class level - 1.
    pub spells_per_level: Vec<Vec<u32>>,
    /// Spells known per spell level (0..=9), indexed by class level - 1.
    pub spells_known_per_level: Vec<Vec<u32>>,
    /// Powers known, indexed by class level - 1.
    pub powers_known: Vec<u32>,
    /// Highest power level, indexed by class level - 1.
    pub powers_max_level: Vec<u32>,

    pub deck_hand_size_formula: Option<String>,
    pub known_cards_size_formula: Option<String>,
    pub deck_prestige_class: bool,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BuffType {
    #[default]
    Temporary,
    Permanent,
    Inherent,
    Shapechange,
}

/// Buff/aura payload. The `active` flag lives on [`Item`] because the
/// activity predicate spans kinds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuffData {
    pub buff_type: BuffType,
    pub timeline: Timeline,
    pub hide_from_token: bool,
    /// Script executed when the buff activates.
    pub activation_script: String,
    /// Script executed when the buff deactivates or expires.
    pub deactivation_script: String,
    /// Script executed once per round while active and in combat.
    pub per_round_script: String,
    /// Items materialized by a shapechange activation, removed again on
    /// deactivation.
    pub materialized_items: Vec<ItemId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellData {
    pub level: u32,
    /// Key of the owning spellbook.
    pub spellbook: String,
    pub prepared_amount: u32,
    pub at_will: bool,
    pub power_points_cost: u32,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    #[default]
    Deck,
    Hand,
    Discarded,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    pub state: CardState,
    /// Key of the owning deck.
    pub deck: String,
}

/// Kind-specific payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ItemPayload {
    Class(ClassData),
    Buff(BuffData),
    Spell(SpellData),
    Card(CardData),
    #[default]
    None,
}

// ============================================================================
// Item
// ============================================================================

/// An owned sub-entity of an actor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Name before any rename (scripts address items by original name).
    pub original_name: String,
    pub kind: ItemKind,
    pub payload: ItemPayload,

    pub quantity: u32,
    pub equipped: bool,
    pub melded: bool,
    pub broken: bool,
    /// Buffs/auras only; always false for other kinds.
    pub active: bool,

    pub uses: Option<Uses>,
    pub recharge: Option<Recharge>,
    /// Delegate the charge pool to another owned item.
    pub linked_charge_item: Option<ItemId>,
    pub requires_psionic_focus: bool,
    /// Action economy cost (`standard`, `swift`, ...); empty when passive.
    pub activation_type: String,

    pub combat_changes: Vec<CombatChange>,
    pub resistances: Vec<ResistanceEntry>,
    pub damage_reduction: Vec<ReductionEntry>,
    pub senses: Option<SenseBlock>,
    pub custom_attributes: Vec<CustomAttribute>,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, kind: ItemKind) -> Self {
        let name = name.into();
        Self {
            id,
            original_name: name.clone(),
            name,
            kind,
            payload: ItemPayload::None,
            quantity: 1,
            equipped: false,
            melded: false,
            broken: false,
            active: false,
            uses: None,
            recharge: None,
            linked_charge_item: None,
            requires_psionic_focus: false,
            activation_type: String::new(),
            combat_changes: Vec::new(),
            resistances: Vec::new(),
            damage_reduction: Vec::new(),
            senses: None,
            custom_attributes: Vec::new(),
        }
    }

    pub fn class_data(&self) -> Option<&ClassData> {
        match &self.payload {
            ItemPayload::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn buff_data(&self) -> Option<&BuffData> {
        match &self.payload {
            ItemPayload::Buff(data) => Some(data),
            _ => None,
        }
    }

    pub fn buff_data_mut(&mut self) -> Option<&mut BuffData> {
        match &mut self.payload {
            ItemPayload::Buff(data) => Some(data),
            _ => None,
        }
    }

    pub fn spell_data(&self) -> Option<&SpellData> {
        match &self.payload {
            ItemPayload::Spell(data) => Some(data),
            _ => None,
        }
    }

    pub fn spell_data_mut(&mut self) -> Option<&mut SpellData> {
        match &mut self.payload {
            ItemPayload::Spell(data) => Some(data),
            _ => None,
        }
    }

    pub fn card_data(&self) -> Option<&CardData> {
        match &self.payload {
            ItemPayload::Card(data) => Some(data),
            _ => None,
        }
    }

    pub fn card_data_mut(&mut self) -> Option<&mut CardData> {
        match &mut self.payload {
            ItemPayload::Card(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_buff_like(&self) -> bool {
        matches!(self.kind, ItemKind::Buff | ItemKind::Aura)
    }

    /// Single-use items track their pool through stacked quantity.
    pub fn is_single_use(&self) -> bool {
        self.uses
            .as_ref()
            .is_some_and(|uses| uses.per == UsagePeriod::Single)
    }

    /// Whether activating this item consumes from a charge pool.
    pub fn is_charged(&self) -> bool {
        self.is_single_use()
            || self.kind == ItemKind::Spell
            || self.linked_charge_item.is_some()
            || self
                .uses
                .as_ref()
                .is_some_and(|uses| uses.per != UsagePeriod::Unlimited && uses.max > 0)
    }

    /// Activity predicate used by the recompiler and change resolver:
    /// buffs/auras must be active, gear must be equipped and usable, and
    /// every other kind contributes unconditionally.
    pub fn is_contributing(&self) -> bool {
        match self.kind {
            ItemKind::Buff | ItemKind::Aura => self.active,
            ItemKind::Weapon | ItemKind::Equipment => {
                self.equipped && !self.melded && !self.broken
            }
            _ => true,
        }
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.buff_data().map(|buff| &buff.timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributing_predicate() {
        let mut buff = Item::new(ItemId(1), "Bless", ItemKind::Buff);
        assert!(!buff.is_contributing());
        buff.active = true;
        assert!(buff.is_contributing());

        let mut sword = Item::new(ItemId(2), "Longsword", ItemKind::Weapon);
        assert!(!sword.is_contributing());
        sword.equipped = true;
        assert!(sword.is_contributing());
        sword.broken = true;
        assert!(!sword.is_contributing());

        let feat = Item::new(ItemId(3), "Dodge", ItemKind::Feat);
        assert!(feat.is_contributing());
    }

    #[test]
    fn bab_progressions() {
        assert_eq!(BabProgression::High.at_level(5), 5);
        assert_eq!(BabProgression::Medium.at_level(5), 3);
        assert_eq!(BabProgression::Low.at_level(5), 2);
    }
}
