//! Typed data model: actors, owned items, and the derived block.

mod actor;
mod ids;
mod item;

pub use actor::{
    Abilities, AbilityKind, AbilityScore, Actor, Attributes, CardDeck, ClassBlock, Counter,
    Derived, DerivedSenses, Details, Experience, HitPoints, PrestigeClPool, ResolvedReduction,
    ResolvedResistance, ResourceMirror, SaveSet, SpellLevelSlots, Spellbook,
};
pub use ids::{ActorId, ItemId, create_tag};
pub use item::{
    BabProgression, BuffData, BuffType, CardData, CardState, ClassData, ClassSaves, ClassType,
    CombatChange, CustomAttribute, FavoredClass, Item, ItemKind, ItemPayload, Recharge,
    ReductionEntry, ResistanceEntry, SaveProgression, SenseBlock, SpellData, SpellcastingType,
    Timeline, UsagePeriod, Uses,
};
