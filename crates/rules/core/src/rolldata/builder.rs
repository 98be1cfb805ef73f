//! Context construction from the typed model.
//!
//! The builder flattens the parts of an actor that formulas are allowed to
//! reference. The layout here is the stable surface formulas are written
//! against; renaming a path is a breaking change for every content pack.

use crate::config::WorldConfig;
use crate::model::{Actor, CustomAttribute, Item, ItemKind, create_tag};

use super::{RollData, Value};

/// Build the actor-level evaluation context.
pub fn build_actor_context(actor: &Actor, config: &WorldConfig) -> RollData {
    let mut data = RollData::new();

    for (name, score) in [
        ("str", &actor.abilities.str_),
        ("dex", &actor.abilities.dex),
        ("con", &actor.abilities.con),
        ("int", &actor.abilities.int),
        ("wis", &actor.abilities.wis),
        ("cha", &actor.abilities.cha),
    ] {
        data.set(&format!("abilities.{name}.value"), score.value);
        data.set(&format!("abilities.{name}.total"), score.total());
        data.set(&format!("abilities.{name}.mod"), score.modifier());
    }

    data.set("attributes.hp.value", actor.attributes.hp.value);
    data.set("attributes.hp.max", actor.attributes.hp.max);
    data.set("attributes.hp.temp", actor.attributes.hp.temp);
    data.set("attributes.hp.nonlethal", actor.attributes.hp.nonlethal);
    data.set("attributes.bab.total", actor.derived.bab_total);
    data.set("attributes.hd.total", actor.derived.hd_total);
    data.set("attributes.init.total", actor.attributes.init_total);
    data.set("attributes.psionic_focus", actor.attributes.psionic_focus);

    for (name, on) in &actor.attributes.conditions {
        data.set(&format!("conditions.{name}"), *on);
    }

    for (tag, block) in &actor.derived.classes {
        data.set(&format!("classes.{tag}.level"), block.level);
        data.set(&format!("classes.{tag}.hitdice"), block.hit_die);
        data.set(
            &format!("classes.{tag}.bab"),
            block.bab.at_level(block.level),
        );
        data.set(&format!("classes.{tag}.fort"), block.saving_throws.fort);
        data.set(&format!("classes.{tag}.reflex"), block.saving_throws.reflex);
        data.set(&format!("classes.{tag}.will"), block.saving_throws.will);
    }

    for (key, book) in &actor.attributes.spellbooks {
        data.set(&format!("spellbooks.{key}.cl.total"), book.cl_total);
        data.set(
            &format!("spellbooks.{key}.powerPoints"),
            book.power_points,
        );
    }

    for (tag, resource) in &actor.resources {
        data.set(&format!("resources.{tag}.value"), resource.value);
        data.set(&format!("resources.{tag}.max"), resource.max);
    }

    data.set("details.level.value", actor.details.level);
    data.set("details.xp.value", actor.details.xp.value as f64);
    data.set("details.xp.max", actor.details.xp.max as f64);
    data.set("level", actor.derived.class_levels);

    data.set("size", config.size_value(&actor.details.actual_size));

    data
}

/// Build an item-level context: the actor context with the item's own
/// fields merged under `item`.
pub fn build_item_context(item: &Item, actor: &Actor, config: &WorldConfig) -> RollData {
    let mut data = build_actor_context(actor, config);

    let mut local = RollData::new();
    local.set("name", item.name.as_str());
    local.set("quantity", item.quantity);
    if let Some(uses) = &item.uses {
        local.set("charges.value", uses.value);
        local.set("charges.max", uses.max);
    }
    match item.kind {
        ItemKind::Spell => {
            if let Some(spell) = item.spell_data() {
                local.set("level", spell.level);
            }
        }
        ItemKind::Class => {
            if let Some(class) = item.class_data() {
                local.set("level", class.levels);
            }
        }
        _ => {}
    }
    for attribute in &item.custom_attributes {
        let key = create_tag(&attribute.name);
        local.set(&format!("custom.{key}"), custom_attribute_value(attribute));
    }

    data.merge(Some("item"), &local);
    data
}

/// Select-list attributes resolve to the selected label; plain attributes
/// carry their raw text, which the evaluator coerces numerically when it
/// parses as a number.
fn custom_attribute_value(attribute: &CustomAttribute) -> Value {
    if let Some(list) = &attribute.select_list {
        let index: usize = attribute.value.parse().unwrap_or(0);
        if let Some(label) = list.get(index) {
            return Value::from(label.as_str());
        }
    }
    Value::from(attribute.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AbilityScore, ActorId, ItemId, SpellData};

    fn actor() -> Actor {
        let mut actor = Actor::new(ActorId(1), "Theren");
        actor.abilities.str_ = AbilityScore::new(16);
        actor.abilities.dex = AbilityScore::new(13);
        actor.derived.bab_total = 4;
        actor.details.actual_size = "lg".to_string();
        actor
    }

    #[test]
    fn actor_context_surface() {
        let data = build_actor_context(&actor(), &WorldConfig::default());
        assert_eq!(data.number("abilities.str.mod"), 3.0);
        assert_eq!(data.number("abilities.dex.mod"), 1.0);
        assert_eq!(data.number("attributes.bab.total"), 4.0);
        assert_eq!(data.number("size"), 1.0);
    }

    #[test]
    fn item_context_merges_under_item() {
        let mut item = Item::new(ItemId(9), "Scorching Ray", ItemKind::Spell);
        item.payload = crate::model::ItemPayload::Spell(SpellData {
            level: 2,
            ..Default::default()
        });
        item.custom_attributes.push(CustomAttribute {
            id: "a1".to_string(),
            name: "Ray Count".to_string(),
            value: "3".to_string(),
            select_list: None,
        });
        let data = build_item_context(&item, &actor(), &WorldConfig::default());
        assert_eq!(data.number("item.level"), 2.0);
        assert_eq!(data.number("item.custom.raycount"), 3.0);
        // Actor paths stay reachable from the item context.
        assert_eq!(data.number("abilities.str.mod"), 3.0);
    }

    #[test]
    fn select_list_attributes_resolve_labels() {
        let attribute = CustomAttribute {
            id: "a2".to_string(),
            name: "Stance".to_string(),
            value: "1".to_string(),
            select_list: Some(vec!["Defensive".to_string(), "Aggressive".to_string()]),
        };
        assert_eq!(
            custom_attribute_value(&attribute),
            Value::from("Aggressive")
        );
    }
}
