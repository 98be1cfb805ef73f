//! Combat clock: initiative order, per-round state, and timed-effect
//! progression.
//!
//! Tracked buffs join the order as virtual combatants bracketing their
//! owner's slot, so a duration measured in rounds expires at the right
//! moment inside the round, not at an arbitrary boundary.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use srd35_core::combat::{RoundState, buff_initiative};
use srd35_core::model::{Actor, ActorId, ItemId};
use srd35_core::timeline::{TimedDirective, advance_time};

use crate::error::{Result, RuntimeError};
use crate::host::UpdateOptions;
use crate::service::ActorService;

/// Hook invoked at the top of each actor's turn, after flag reset. Hosts
/// hang fast healing and regeneration here.
pub type RoundHook = Box<dyn FnMut(&mut Actor) + Send>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CombatantKind {
    Actor,
    /// Virtual slot ticking one tracked buff.
    Buff { item: ItemId },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Combatant {
    pub actor: ActorId,
    pub initiative: f64,
    pub kind: CombatantKind,
}

/// Events reported by a clock step.
#[derive(Clone, Debug, PartialEq)]
pub enum ClockEvent {
    RoundStarted { round: u32 },
    TurnStarted { actor: ActorId },
    BuffTicked {
        actor: ActorId,
        item: ItemId,
        expired: bool,
    },
}

#[derive(Default)]
pub struct CombatClock {
    combatants: Vec<Combatant>,
    /// Index of the slot whose turn it is; `None` before combat starts.
    turn: Option<usize>,
    round: u32,
    states: HashMap<ActorId, RoundState>,
    round_hook: Option<RoundHook>,
}

impl CombatClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn round_state(&self, actor: ActorId) -> RoundState {
        self.states.get(&actor).copied().unwrap_or_default()
    }

    pub fn round_state_mut(&mut self, actor: ActorId) -> &mut RoundState {
        self.states.entry(actor).or_default()
    }

    pub fn set_round_hook(&mut self, hook: RoundHook) {
        self.round_hook = Some(hook);
    }

    /// Roll initiative for an actor and insert it plus virtual slots for
    /// its tracked buffs. The modifier echoes into the decimals as the
    /// standard tie-break.
    pub fn add_combatant(&mut self, service: &mut ActorService, id: ActorId) -> Result<f64> {
        let modifier = service.actor(id)?.attributes.init_total;
        let roll = service.roller_mut().roll_die(20) as f64;
        let initiative = roll + modifier as f64 + modifier as f64 / 100.0;

        self.combatants.push(Combatant {
            actor: id,
            initiative,
            kind: CombatantKind::Actor,
        });
        self.sync_buffs(service, id)?;
        Ok(initiative)
    }

    /// Rebuild the virtual combatants for one actor's tracked buffs.
    pub fn sync_buffs(&mut self, service: &ActorService, id: ActorId) -> Result<()> {
        let owner_initiative = self
            .combatants
            .iter()
            .find(|c| c.actor == id && c.kind == CombatantKind::Actor)
            .map(|c| c.initiative)
            .unwrap_or(0.0);

        self.combatants
            .retain(|c| !(c.actor == id && matches!(c.kind, CombatantKind::Buff { .. })));

        let actor = service.actor(id)?;
        for buff in actor.tracked_buffs() {
            let tick_on_end = buff.timeline().is_some_and(|t| t.tick_on_end);
            self.combatants.push(Combatant {
                actor: id,
                initiative: buff_initiative(owner_initiative, tick_on_end),
                kind: CombatantKind::Buff { item: buff.id },
            });
        }
        self.combatants
            .sort_by(|a, b| b.initiative.total_cmp(&a.initiative));
        Ok(())
    }

    /// Advance one slot, processing whatever sits there.
    pub async fn next_turn(&mut self, service: &mut ActorService) -> Result<Vec<ClockEvent>> {
        if self.combatants.is_empty() {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();

        let next = match self.turn {
            None if self.round == 0 => {
                self.round = 1;
                events.push(ClockEvent::RoundStarted { round: 1 });
                0
            }
            // Expiry removed the slot at the head of the order mid-round.
            None => 0,
            Some(current) if current + 1 >= self.combatants.len() => {
                self.round += 1;
                events.push(ClockEvent::RoundStarted { round: self.round });
                0
            }
            Some(current) => current + 1,
        };
        self.turn = Some(next);

        let slot = self.combatants[next];
        match slot.kind {
            CombatantKind::Actor => {
                self.begin_actor_turn(service, slot.actor, &mut events).await?;
            }
            CombatantKind::Buff { item } => {
                let expired = tick_buff(service, slot.actor, item).await?;
                if expired {
                    self.sync_buffs(service, slot.actor)?;
                    // The slot we were standing on is gone; re-seat the
                    // cursor so the next advance lands on whoever would
                    // have followed it in the order.
                    let seated = self
                        .combatants
                        .partition_point(|c| c.initiative > slot.initiative);
                    self.turn = seated.checked_sub(1);
                }
                events.push(ClockEvent::BuffTicked {
                    actor: slot.actor,
                    item,
                    expired,
                });
            }
        }

        service.flush().await?;
        Ok(events)
    }

    /// Advance through every remaining slot of the current round, stopping
    /// after the last one.
    pub async fn next_round(&mut self, service: &mut ActorService) -> Result<Vec<ClockEvent>> {
        let mut events = Vec::new();
        let budget = self.combatants.len() + 1;
        for _ in 0..budget {
            if self.combatants.is_empty() {
                break;
            }
            events.extend(self.next_turn(service).await?);
            if self.turn == Some(self.combatants.len() - 1) {
                break;
            }
        }
        Ok(events)
    }

    async fn begin_actor_turn(
        &mut self,
        service: &mut ActorService,
        id: ActorId,
        events: &mut Vec<ClockEvent>,
    ) -> Result<()> {
        debug!(actor = %id, round = self.round, "turn start");
        self.states.entry(id).or_default().reset_round();

        // Recharge timers count in rounds; tick the actor's items.
        tick_recharges(service, id).await?;

        // Per-round scripts of the actor's active buffs.
        let scripts: Vec<String> = service
            .actor(id)?
            .items
            .iter()
            .filter(|item| item.is_buff_like() && item.active)
            .filter_map(|item| item.buff_data())
            .map(|buff| buff.per_round_script.clone())
            .filter(|script| !script.trim().is_empty())
            .collect();
        for script in scripts {
            service.run_script(id, &script, None).await?;
        }

        if let Some(hook) = &mut self.round_hook {
            hook(service.actor_mut_internal(id)?);
            service.mark_dirty(id);
        }

        events.push(ClockEvent::TurnStarted { actor: id });
        Ok(())
    }
}

/// Advance one tracked buff's duration by a round. Returns whether the
/// buff expired.
async fn tick_buff(service: &mut ActorService, owner: ActorId, item_id: ItemId) -> Result<bool> {
    let actor = service.actor(owner)?;
    let Some(item) = actor.item(item_id) else {
        return Ok(false);
    };
    let name = item.name.clone();
    let directives = advance_time(item, 1);

    let mut expired = false;
    for directive in directives {
        match directive {
            TimedDirective::Elapsed { elapsed } => {
                let actor = service.actor_mut_internal(owner)?;
                if let Some(buff) = actor.item_mut(item_id).and_then(|i| i.buff_data_mut()) {
                    buff.timeline.elapsed = elapsed;
                }
                service
                    .store()
                    .update_items(
                        owner,
                        vec![(item_id, json!({ "timeline": { "elapsed": elapsed } }))],
                        UpdateOptions { stop_updates: true },
                    )
                    .await
                    .map_err(RuntimeError::Store)?;
            }
            TimedDirective::Deactivate => {
                expired = true;
                deactivate_buff(service, owner, item_id, &name, false).await?;
            }
            TimedDirective::Delete => {
                expired = true;
                deactivate_buff(service, owner, item_id, &name, true).await?;
            }
            // Buff slots carry no recharge pools.
            TimedDirective::RechargeTick { .. } | TimedDirective::RechargeDone { .. } => {}
        }
    }
    Ok(expired)
}

/// Expire a buff: deactivate or delete it, clean up materialized items,
/// run its deactivation script, and notify.
async fn deactivate_buff(
    service: &mut ActorService,
    owner: ActorId,
    item_id: ItemId,
    name: &str,
    delete: bool,
) -> Result<()> {
    let actor = service.actor_mut_internal(owner)?;
    let Some(item) = actor.item_mut(item_id) else {
        return Ok(());
    };
    let (script, materialized) = match item.buff_data_mut() {
        Some(buff) => {
            let script = buff.deactivation_script.clone();
            let materialized = std::mem::take(&mut buff.materialized_items);
            buff.timeline.elapsed = 0;
            (script, materialized)
        }
        None => (String::new(), Vec::new()),
    };
    item.active = false;

    let mut doomed = materialized;
    if delete {
        doomed.push(item_id);
    }
    let actor = service.actor_mut_internal(owner)?;
    actor.items.retain(|item| !doomed.contains(&item.id));
    service.mark_dirty(owner);

    if !doomed.is_empty() {
        service
            .store()
            .delete_items(owner, doomed)
            .await
            .map_err(RuntimeError::Store)?;
    }
    if !delete {
        service
            .store()
            .update_items(
                owner,
                vec![(
                    item_id,
                    json!({ "active": false, "timeline": { "elapsed": 0 } }),
                )],
                UpdateOptions { stop_updates: true },
            )
            .await
            .map_err(RuntimeError::Store)?;
    }

    if !script.trim().is_empty() {
        service.run_script(owner, &script, None).await?;
    }
    service.notifier().post(&format!("{name} has expired")).await;
    Ok(())
}

/// Tick recharge timers on everything the actor owns.
async fn tick_recharges(service: &mut ActorService, id: ActorId) -> Result<()> {
    let actor = service.actor(id)?;
    let mut pending: Vec<(ItemId, TimedDirective)> = Vec::new();
    for item in &actor.items {
        for directive in advance_time(item, 1) {
            if matches!(
                directive,
                TimedDirective::RechargeTick { .. } | TimedDirective::RechargeDone { .. }
            ) {
                pending.push((item.id, directive));
            }
        }
    }
    if pending.is_empty() {
        return Ok(());
    }

    let mut diffs = Vec::new();
    let actor = service.actor_mut_internal(id)?;
    for (item_id, directive) in pending {
        let Some(item) = actor.item_mut(item_id) else {
            continue;
        };
        match directive {
            TimedDirective::RechargeTick { current } => {
                if let Some(recharge) = item.recharge.as_mut() {
                    recharge.current = current;
                }
                diffs.push((item_id, json!({ "recharge": { "current": current } })));
            }
            TimedDirective::RechargeDone { value } => {
                if let Some(recharge) = item.recharge.as_mut() {
                    recharge.current = 0;
                }
                if let Some(uses) = item.uses.as_mut() {
                    uses.value = value;
                }
                diffs.push((
                    item_id,
                    json!({ "recharge": { "current": 0 }, "uses": { "value": value } }),
                ));
            }
            _ => {}
        }
    }
    service.mark_dirty(id);
    service
        .store()
        .update_items(id, diffs, UpdateOptions { stop_updates: true })
        .await
        .map_err(RuntimeError::Store)?;
    Ok(())
}
