//! The actor service: local actor state, dirty tracking, and the bridge
//! between engine directives and host persistence.
//!
//! Every mutation path (charge use, script execution, clock ticks) goes
//! through this service, which marks actors dirty and recomputes each at
//! most once per [`ActorService::flush`]. Store writes carry
//! `stop_updates` so the host does not re-enter its own reaction pipeline
//! while a batch is in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Value as Json, json};
use tracing::{debug, warn};

use srd35_core::charges::{ChargeTarget, ChargeUpdate, add_charges, charge_cost};
use srd35_core::formula::{DiceRoller, PcgRoller, safe_evaluate};
use srd35_core::model::{Actor, ActorId, Item, ItemId};
use srd35_core::rolldata::{ContextCache, RollData, build_actor_context, build_item_context};
use srd35_core::script::{ExecutionPlan, PlannedOp, ScriptTarget, build_plan, parse_script};
use srd35_core::{WorldConfig, recompute};

use crate::error::{Result, RuntimeError};
use crate::host::{CollectionSource, DocumentStore, Notifier, PermissionGate, UpdateOptions};

/// Host adapters bundled for service construction.
pub struct HostAdapters {
    pub store: Arc<dyn DocumentStore>,
    pub collections: Arc<dyn CollectionSource>,
    pub notifier: Arc<dyn Notifier>,
    pub gate: Arc<dyn PermissionGate>,
}

pub struct ActorService {
    config: WorldConfig,
    store: Arc<dyn DocumentStore>,
    collections: Arc<dyn CollectionSource>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<dyn PermissionGate>,
    actors: HashMap<ActorId, Actor>,
    dirty: HashSet<ActorId>,
    cache: ContextCache,
    roller: Box<dyn DiceRoller + Send>,
}

impl ActorService {
    pub fn new(config: WorldConfig, hosts: HostAdapters) -> Self {
        Self::with_roller(config, hosts, Box::new(PcgRoller::new(rand::random())))
    }

    /// Construct with an explicit roller; tests inject fixed sequences.
    pub fn with_roller(
        config: WorldConfig,
        hosts: HostAdapters,
        roller: Box<dyn DiceRoller + Send>,
    ) -> Self {
        Self {
            config,
            store: hosts.store,
            collections: hosts.collections,
            notifier: hosts.notifier,
            gate: hosts.gate,
            actors: HashMap::new(),
            dirty: HashSet::new(),
            cache: ContextCache::new(),
            roller,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Adopt an actor into the service and queue its first recompute.
    pub fn insert_actor(&mut self, actor: Actor) {
        let id = actor.id;
        self.actors.insert(id, actor);
        self.mark_dirty(id);
    }

    pub fn actor(&self, id: ActorId) -> Result<&Actor> {
        self.actors.get(&id).ok_or(RuntimeError::UnknownActor(id))
    }

    fn actor_mut(&mut self, id: ActorId) -> Result<&mut Actor> {
        self.actors
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownActor(id))
    }

    pub fn mark_dirty(&mut self, id: ActorId) {
        self.dirty.insert(id);
        self.cache.invalidate(id);
    }

    /// Cached actor context, built on demand.
    pub fn context(&mut self, id: ActorId) -> Result<Arc<RollData>> {
        if !self.actors.contains_key(&id) {
            return Err(RuntimeError::UnknownActor(id));
        }
        let Self {
            actors,
            cache,
            config,
            ..
        } = self;
        let actor = &actors[&id];
        Ok(cache.get_or_build(id, || build_actor_context(actor, config)))
    }

    /// Recompute every dirty actor exactly once and persist the derived
    /// state. Degraded formulas surface as host warnings, not failures.
    pub async fn flush(&mut self) -> Result<()> {
        let dirty: Vec<ActorId> = self.dirty.drain().collect();
        for id in dirty {
            let Some(actor) = self.actors.get_mut(&id) else {
                continue;
            };
            let outcome = recompute(actor, &self.config);
            debug!(actor = %id, warnings = outcome.warnings.len(), "recomputed actor");
            for warning in &outcome.warnings {
                warn!(actor = %id, warning = %warning, "formula degraded during recompute");
                self.notifier.warn(warning).await;
            }
            let diff = json!({
                "derived": serde_json::to_value(&actor.derived).unwrap_or(Json::Null),
                "attributes": serde_json::to_value(&actor.attributes).unwrap_or(Json::Null),
                "resources": serde_json::to_value(&actor.resources).unwrap_or(Json::Null),
            });
            self.cache.invalidate(id);
            self.store
                .update_actor(id, diff, UpdateOptions { stop_updates: true })
                .await
                .map_err(RuntimeError::Store)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Charges
    // ------------------------------------------------------------------

    /// Consume one activation's worth of charges from an item, applying
    /// the resulting directive locally and to the store.
    pub async fn use_item_charges(&mut self, actor_id: ActorId, item_id: ItemId) -> Result<()> {
        if !self.gate.can_modify(actor_id) {
            return Err(RuntimeError::PermissionDenied(actor_id));
        }
        let actor = self
            .actors
            .get(&actor_id)
            .ok_or(RuntimeError::UnknownActor(actor_id))?;
        let item = actor
            .item(item_id)
            .ok_or(RuntimeError::UnknownItem {
                actor: actor_id,
                item: item_id,
            })?;

        let focus_gated = item.requires_psionic_focus;
        if focus_gated && !actor.attributes.psionic_focus {
            return Err(RuntimeError::PsionicFocusRequired(item.name.clone()));
        }

        let cost = charge_cost(actor, item) as i64;
        let data = build_item_context(item, actor, &self.config);
        let update = add_charges(actor, item_id, -cost, &data, self.roller.as_mut())?;

        let actor = self.actor_mut(actor_id)?;
        if focus_gated {
            actor.attributes.psionic_focus = false;
        }
        let item_diffs = apply_charge_update(actor, &update);
        if !item_diffs.is_empty() {
            self.store
                .update_items(actor_id, item_diffs, UpdateOptions { stop_updates: true })
                .await
                .map_err(RuntimeError::Store)?;
        }
        self.mark_dirty(actor_id);
        Ok(())
    }

    /// Gain or expend psionic focus.
    pub async fn set_psionic_focus(&mut self, id: ActorId, focused: bool) -> Result<()> {
        let actor = self.actor_mut(id)?;
        actor.attributes.psionic_focus = focused;
        self.store
            .update_actor(
                id,
                dotted_diff("attributes.psionic_focus", json!(focused)),
                UpdateOptions { stop_updates: true },
            )
            .await
            .map_err(RuntimeError::Store)?;
        self.mark_dirty(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    /// Parse, plan, and execute an item script. Returns the warnings
    /// gathered along the way; they are also posted to the notifier.
    pub async fn run_script(
        &mut self,
        source: ActorId,
        script: &str,
        target: Option<ActorId>,
    ) -> Result<Vec<String>> {
        if script.trim().is_empty() {
            return Ok(Vec::new());
        }
        if !self.gate.can_modify(source) {
            return Err(RuntimeError::PermissionDenied(source));
        }

        let parsed = parse_script(script);
        let data = build_actor_context(self.actor(source)?, &self.config);
        let plan = build_plan(&parsed.clauses, &data, self.roller.as_mut());

        let mut warnings = parsed.warnings;
        warnings.extend(plan.warnings.iter().cloned());
        for warning in &warnings {
            warn!(actor = %source, warning = %warning, "script clause skipped");
            self.notifier.warn(warning).await;
        }

        self.execute_plan(source, target, plan).await?;
        self.flush().await?;
        Ok(warnings)
    }

    /// Apply a plan in batched category order: creations, removals, item
    /// updates, actor updates, everything else.
    async fn execute_plan(
        &mut self,
        source: ActorId,
        target: Option<ActorId>,
        plan: ExecutionPlan,
    ) -> Result<()> {
        // A clause addressed `on target` with no target selected is
        // skipped, not redirected at the caster.
        let resolve = |script_target: ScriptTarget| match script_target {
            ScriptTarget::Itself => Some(source),
            ScriptTarget::Target => target,
        };

        // Creations.
        let mut creations: HashMap<ActorId, Vec<Item>> = HashMap::new();
        for op in &plan.item_creations {
            let (recipient, name) = match op {
                PlannedOp::CreateItem { target, name } => (resolve(*target), name),
                PlannedOp::GiveItem { name } => (resolve(ScriptTarget::Target), name),
                _ => continue,
            };
            let Some(recipient) = recipient else { continue };
            match self
                .collections
                .find_item(name)
                .await
                .map_err(RuntimeError::Store)?
            {
                Some(item) => creations.entry(recipient).or_default().push(item),
                None => {
                    let message = format!("compendium entry `{name}` not found");
                    self.notifier.warn(&message).await;
                }
            }
        }
        for (recipient, items) in creations {
            let ids = self
                .store
                .create_items(recipient, items.clone())
                .await
                .map_err(RuntimeError::Store)?;
            let actor = self.actor_mut(recipient)?;
            for (mut item, id) in items.into_iter().zip(ids) {
                item.id = id;
                actor.items.push(item);
            }
            self.mark_dirty(recipient);
        }

        // Removals.
        let mut removals: HashMap<ActorId, Vec<ItemId>> = HashMap::new();
        for op in &plan.item_removals {
            let PlannedOp::RemoveItem { target, name } = op else {
                continue;
            };
            let Some(owner) = resolve(*target) else { continue };
            match self.actor(owner)?.item_by_original_name(name) {
                Some(item) => removals.entry(owner).or_default().push(item.id),
                None => {
                    self.notifier
                        .warn(&format!("no item named `{name}` to remove"))
                        .await;
                }
            }
        }
        for (owner, ids) in removals {
            self.store
                .delete_items(owner, ids.clone())
                .await
                .map_err(RuntimeError::Store)?;
            let actor = self.actor_mut(owner)?;
            actor.items.retain(|item| !ids.contains(&item.id));
            self.mark_dirty(owner);
        }

        // Item updates.
        let mut item_diffs: HashMap<ActorId, Vec<(ItemId, Json)>> = HashMap::new();
        for op in &plan.item_updates {
            match op {
                PlannedOp::ActivateItem {
                    target,
                    name,
                    active,
                } => {
                    let Some(owner) = resolve(*target) else { continue };
                    let actor = self.actor_mut(owner)?;
                    let Some(item) = actor
                        .items
                        .iter_mut()
                        .find(|item| item.original_name == *name)
                    else {
                        self.notifier
                            .warn(&format!("no item named `{name}` to toggle"))
                            .await;
                        continue;
                    };
                    item.active = *active;
                    let id = item.id;
                    item_diffs
                        .entry(owner)
                        .or_default()
                        .push((id, json!({ "active": active })));
                    self.mark_dirty(owner);
                }
                PlannedOp::UpdateItem {
                    target,
                    name,
                    path,
                    value,
                } => {
                    let Some(owner) = resolve(*target) else { continue };
                    let actor = self.actor(owner)?;
                    let Some(item) = actor.item_by_original_name(name) else {
                        self.notifier
                            .warn(&format!("no item named `{name}` to update"))
                            .await;
                        continue;
                    };
                    item_diffs
                        .entry(owner)
                        .or_default()
                        .push((item.id, dotted_diff(path, param_json(value))));
                    self.mark_dirty(owner);
                }
                _ => {}
            }
        }
        for (owner, diffs) in item_diffs {
            self.store
                .update_items(owner, diffs, UpdateOptions { stop_updates: true })
                .await
                .map_err(RuntimeError::Store)?;
        }

        // Actor updates.
        let mut actor_diffs: HashMap<ActorId, Json> = HashMap::new();
        for op in &plan.actor_updates {
            let Some((owner, diff)) = self.apply_actor_op(op, &resolve)? else {
                continue;
            };
            merge_json(actor_diffs.entry(owner).or_insert(json!({})), diff);
            self.mark_dirty(owner);
        }
        for (owner, diff) in actor_diffs {
            self.store
                .update_actor(owner, diff, UpdateOptions { stop_updates: true })
                .await
                .map_err(RuntimeError::Store)?;
        }

        // Everything else is a host-surface action.
        for op in &plan.other {
            self.apply_other_op(op, &resolve).await?;
        }

        Ok(())
    }

    /// Apply one actor-category op locally, returning the store diff.
    /// `None` means the op addressed a target role that is not present.
    fn apply_actor_op(
        &mut self,
        op: &PlannedOp,
        resolve: &dyn Fn(ScriptTarget) -> Option<ActorId>,
    ) -> Result<Option<(ActorId, Json)>> {
        match op {
            PlannedOp::SetCondition {
                target,
                name,
                value,
            } => {
                let Some(owner) = resolve(*target) else {
                    return Ok(None);
                };
                let actor = self.actor_mut(owner)?;
                actor.attributes.conditions.insert(name.clone(), *value);
                Ok(Some((
                    owner,
                    dotted_diff(&format!("attributes.conditions.{name}"), json!(value)),
                )))
            }
            PlannedOp::SetTrait {
                target,
                group,
                name,
                value,
            } => {
                let Some(owner) = resolve(*target) else {
                    return Ok(None);
                };
                Ok(Some((
                    owner,
                    dotted_diff(&format!("traits.{group}.{name}"), json!(value)),
                )))
            }
            PlannedOp::SetPath {
                target,
                path,
                value,
            } => {
                let Some(owner) = resolve(*target) else {
                    return Ok(None);
                };
                Ok(Some((owner, dotted_diff(path, param_json(value)))))
            }
            PlannedOp::AbilityDamage {
                target,
                ability,
                amount,
                drain,
            } => {
                let Some(owner) = resolve(*target) else {
                    return Ok(None);
                };
                let actor = self.actor_mut(owner)?;
                let score = actor.abilities.get_mut(*ability);
                let field = if *drain {
                    score.drain += *amount as i32;
                    "drain"
                } else {
                    score.damage += *amount as i32;
                    "damage"
                };
                let current = if *drain { score.drain } else { score.damage };
                Ok(Some((
                    owner,
                    dotted_diff(&format!("abilities.{ability}.{field}"), json!(current)),
                )))
            }
            PlannedOp::SelfDamage { amount } => {
                let Some(owner) = resolve(ScriptTarget::Itself) else {
                    return Ok(None);
                };
                let actor = self.actor_mut(owner)?;
                actor.attributes.hp.value -= *amount as i32;
                let hp = actor.attributes.hp.value;
                Ok(Some((owner, dotted_diff("attributes.hp.value", json!(hp)))))
            }
            _ => Ok(None),
        }
    }

    async fn apply_other_op(
        &mut self,
        op: &PlannedOp,
        resolve: &dyn Fn(ScriptTarget) -> Option<ActorId>,
    ) -> Result<()> {
        match op {
            PlannedOp::Message { text } => self.notifier.post(text).await,
            PlannedOp::Roll { formula, flavor } => {
                let Some(owner) = resolve(ScriptTarget::Itself) else {
                    return Ok(());
                };
                let data = build_actor_context(self.actor(owner)?, &self.config);
                let outcome = safe_evaluate(formula, &data, self.roller.as_mut());
                let label = flavor.clone().unwrap_or_else(|| formula.clone());
                self.notifier
                    .post(&format!("{label}: {} = {}", outcome.result, outcome.total))
                    .await;
            }
            PlannedOp::Damage { target, formula } => {
                let Some(victim) = resolve(*target) else {
                    return Ok(());
                };
                let data = build_actor_context(self.actor(victim)?, &self.config);
                let outcome = safe_evaluate(formula, &data, self.roller.as_mut());
                self.damage_actor(victim, outcome.total as i32).await?;
            }
            PlannedOp::ApplyDamage { target, amount } => {
                let Some(victim) = resolve(*target) else {
                    return Ok(());
                };
                self.damage_actor(victim, *amount as i32).await?;
            }
            PlannedOp::Regenerate { amount } => {
                let Some(owner) = resolve(ScriptTarget::Itself) else {
                    return Ok(());
                };
                self.damage_actor(owner, -(*amount as i32)).await?;
            }
            PlannedOp::TurnUndead { max_hd } => {
                self.notifier
                    .post(&format!("Turn undead (max {max_hd} HD)"))
                    .await;
            }
            PlannedOp::Grapple { bonus } => {
                self.notifier
                    .post(&format!("Grapple check ({bonus:+})"))
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Apply hit-point damage (negative heals, capped at max).
    pub async fn damage_actor(&mut self, id: ActorId, amount: i32) -> Result<()> {
        let actor = self.actor_mut(id)?;
        let hp = &mut actor.attributes.hp;
        hp.value = (hp.value - amount).min(hp.max);
        let value = hp.value;
        self.store
            .update_actor(
                id,
                dotted_diff("attributes.hp.value", json!(value)),
                UpdateOptions { stop_updates: true },
            )
            .await
            .map_err(RuntimeError::Store)?;
        self.mark_dirty(id);
        Ok(())
    }

    pub(crate) fn roller_mut(&mut self) -> &mut dyn DiceRoller {
        self.roller.as_mut()
    }

    pub(crate) fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    pub(crate) fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub(crate) fn actor_mut_internal(&mut self, id: ActorId) -> Result<&mut Actor> {
        self.actor_mut(id)
    }
}

/// Apply a charge directive to local state, producing the item diffs to
/// persist. Spellbook-side targets land on the actor during flush instead.
fn apply_charge_update(actor: &mut Actor, update: &ChargeUpdate) -> Vec<(ItemId, Json)> {
    let mut diffs = Vec::new();
    match &update.target {
        ChargeTarget::ItemUses { item, value } => {
            if let Some(item_ref) = actor.item_mut(*item) {
                if let Some(uses) = &mut item_ref.uses {
                    uses.value = *value;
                }
                diffs.push((*item, json!({ "uses": { "value": value } })));
            }
        }
        ChargeTarget::ItemQuantity { item, quantity } => {
            if let Some(item_ref) = actor.item_mut(*item) {
                item_ref.quantity = *quantity;
                diffs.push((*item, json!({ "quantity": quantity })));
            }
        }
        ChargeTarget::SpellPrepared { item, value } => {
            if let Some(spell) = actor.item_mut(*item).and_then(|i| i.spell_data_mut()) {
                spell.prepared_amount = *value;
                diffs.push((*item, json!({ "preparation": { "amount": value } })));
            }
        }
        ChargeTarget::SpontaneousSlots {
            spellbook,
            level,
            value,
        } => {
            if let Some(book) = actor.attributes.spellbooks.get_mut(spellbook)
                && let Some(slot) = book.spells.get_mut(*level as usize)
            {
                slot.value = *value;
            }
        }
        ChargeTarget::PowerPoints { spellbook, value } => {
            if let Some(book) = actor.attributes.spellbooks.get_mut(spellbook) {
                book.power_points = *value;
            }
        }
        ChargeTarget::CardMoved { item, state } => {
            if let Some(card) = actor.item_mut(*item).and_then(|i| i.card_data_mut()) {
                card.state = *state;
                diffs.push((*item, json!({ "state": state })));
            }
        }
        ChargeTarget::None => {}
    }
    if let Some(timer) = update.recharge_started {
        let item_id = match &update.target {
            ChargeTarget::ItemUses { item, .. }
            | ChargeTarget::ItemQuantity { item, .. }
            | ChargeTarget::SpellPrepared { item, .. }
            | ChargeTarget::CardMoved { item, .. } => Some(*item),
            _ => None,
        };
        if let Some(item_id) = item_id
            && let Some(recharge) = actor.item_mut(item_id).and_then(|i| i.recharge.as_mut())
        {
            recharge.current = timer;
            diffs.push((item_id, json!({ "recharge": { "current": timer } })));
        }
    }
    diffs
}

/// Expand a dotted path into a nested JSON diff.
fn dotted_diff(path: &str, value: Json) -> Json {
    let mut diff = value;
    for segment in path.rsplit('.') {
        diff = json!({ segment: diff });
    }
    diff
}

fn param_json(param: &srd35_core::script::Param) -> Json {
    match param {
        srd35_core::script::Param::Number(n) => json!(n),
        srd35_core::script::Param::Text(s) => json!(s),
    }
}

/// Merge `addition` into `base`, object-wise.
fn merge_json(base: &mut Json, addition: Json) {
    match (base, addition) {
        (Json::Object(base_map), Json::Object(add_map)) => {
            for (key, value) in add_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, addition) => *base_slot = addition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_diff_nests() {
        assert_eq!(
            dotted_diff("attributes.hp.value", json!(7)),
            json!({ "attributes": { "hp": { "value": 7 } } })
        );
    }

    #[test]
    fn merge_json_deep_merges_objects() {
        let mut base = json!({ "a": { "x": 1 } });
        merge_json(&mut base, json!({ "a": { "y": 2 }, "b": 3 }));
        assert_eq!(base, json!({ "a": { "x": 1, "y": 2 }, "b": 3 }));
    }
}
