//! Actor-service integration: charge flow, dirty batching, attack math.

mod common;

use common::{StoreCall, fighter, harness};
use serde_json::json;

use srd35_core::changes::{ChangeContext, apply_changes, resolve_changes};
use srd35_core::formula::{SequenceRoller, evaluate};
use srd35_core::model::{ActorId, CombatChange, Item, ItemId, ItemKind, UsagePeriod, Uses};
use srd35_core::recompute;
use srd35_core::rolldata::build_actor_context;

#[tokio::test]
async fn charge_use_hits_the_store_once() {
    let mut h = harness(vec![], vec![]);
    let mut actor = fighter(1, 5);
    let mut wand = Item::new(ItemId(2), "Wand of Magic Missile", ItemKind::Equipment);
    wand.equipped = true;
    wand.uses = Some(Uses {
        per: UsagePeriod::Charges,
        value: 50,
        max: 50,
        max_formula: None,
        charges_per_use: 1,
        is_resource: false,
    });
    actor.items.push(wand);
    h.service.insert_actor(actor);
    h.service.flush().await.expect("initial flush");
    let baseline = h.store.calls().len();

    h.service
        .use_item_charges(ActorId(1), ItemId(2))
        .await
        .expect("charge use");

    let calls = &h.store.calls()[baseline..];
    assert_eq!(
        calls[0],
        StoreCall::UpdateItems(
            ActorId(1),
            vec![(ItemId(2), json!({ "uses": { "value": 49 } }))]
        )
    );
    assert_eq!(
        h.service.actor(ActorId(1)).unwrap().item(ItemId(2)).unwrap().uses.as_ref().unwrap().value,
        49
    );
}

#[tokio::test]
async fn over_consumption_leaves_no_trace() {
    let mut h = harness(vec![], vec![]);
    let mut actor = fighter(1, 5);
    let mut wand = Item::new(ItemId(2), "Depleted Wand", ItemKind::Equipment);
    wand.equipped = true;
    wand.uses = Some(Uses {
        per: UsagePeriod::Charges,
        value: 0,
        max: 50,
        max_formula: None,
        charges_per_use: 1,
        is_resource: false,
    });
    actor.items.push(wand);
    h.service.insert_actor(actor);
    h.service.flush().await.expect("initial flush");
    let baseline = h.store.calls().len();

    let err = h
        .service
        .use_item_charges(ActorId(1), ItemId(2))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("charges"));
    assert_eq!(h.store.calls().len(), baseline);
}

#[tokio::test]
async fn flush_recomputes_each_dirty_actor_once() {
    let mut h = harness(vec![], vec![]);
    h.service.insert_actor(fighter(1, 5));
    h.service.mark_dirty(ActorId(1));
    h.service.mark_dirty(ActorId(1));
    h.service.flush().await.expect("flush");
    assert_eq!(h.store.actor_update_count(), 1);

    // Clean service: flushing again writes nothing.
    h.service.flush().await.expect("flush");
    assert_eq!(h.store.actor_update_count(), 1);
}

#[tokio::test]
async fn psionic_focus_gates_and_clears() {
    let mut h = harness(vec![], vec![]);
    let mut actor = fighter(1, 5);
    let mut stone = Item::new(ItemId(2), "Power Stone", ItemKind::Equipment);
    stone.equipped = true;
    stone.requires_psionic_focus = true;
    stone.uses = Some(Uses {
        per: UsagePeriod::Charges,
        value: 3,
        max: 3,
        max_formula: None,
        charges_per_use: 1,
        is_resource: false,
    });
    actor.items.push(stone);
    h.service.insert_actor(actor);
    h.service.flush().await.expect("initial flush");

    let err = h
        .service
        .use_item_charges(ActorId(1), ItemId(2))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("focus"));

    h.service
        .set_psionic_focus(ActorId(1), true)
        .await
        .expect("gain focus");
    h.service
        .use_item_charges(ActorId(1), ItemId(2))
        .await
        .expect("focused use");
    assert!(!h.service.actor(ActorId(1)).unwrap().attributes.psionic_focus);
}

/// A full melee attack: recompute, resolve scoped changes, fold, roll.
#[test]
fn melee_attack_end_to_end() {
    let mut actor = fighter(1, 5);
    let mut feat = Item::new(ItemId(2), "Weapon Focus (Longsword)", ItemKind::Feat);
    feat.combat_changes.push(CombatChange {
        scope: "attack".to_string(),
        action_filter: "mwak".to_string(),
        condition: String::new(),
        target: "attack.bonus".to_string(),
        formula: "1".to_string(),
        special: None,
    });
    actor.items.push(feat);
    recompute(&mut actor, &srd35_content::srd_defaults());

    let mut data = build_actor_context(&actor, &srd35_content::srd_defaults());
    let context = ChangeContext {
        roll_kind: "attack".to_string(),
        action_type: "mwak".to_string(),
        ..Default::default()
    };
    let mut roller = SequenceRoller::new(vec![13]);
    let resolution = resolve_changes(&actor, &context, &data, &mut roller);
    assert!(resolution.warnings.is_empty());
    apply_changes(&mut data, &resolution.changes, &mut roller);

    let outcome = evaluate(
        "1d20 + @attributes.bab.total + @abilities.str.mod + @attack.bonus",
        &data,
        &mut roller,
    )
    .expect("attack roll");
    // 13 (die) + 5 (bab) + 3 (str) + 1 (feat).
    assert_eq!(outcome.total, 22.0);
}
