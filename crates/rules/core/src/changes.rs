//! Conditional modifier resolution ("combat changes").
//!
//! Items attach scoped formula bonuses; resolving a roll collects the
//! applicable ones from every contributing item and folds them into the
//! roll's data. Dice-bearing formulas stay deferred until the fold so the
//! randomness is consumed at use time, not at collection time.

use crate::charges::{ChargePool, get_charges};
use crate::formula::{DiceRoller, Formula, safe_evaluate};
use crate::model::{Actor, CombatChange, Item};
use crate::rolldata::RollData;

/// The roll being modified, for applicability filtering and the
/// pre-substituted tokens.
#[derive(Clone, Debug, Default)]
pub struct ChangeContext {
    /// Roll kind matched against change scopes (`attack`, `spell`,
    /// `savingThrow`, ...). Scope `all` always matches.
    pub roll_kind: String,
    /// Action type matched against change action filters (`mwak`, `rwak`,
    /// ...). An empty filter always matches.
    pub action_type: String,
    /// Values substituted for `@range`, `@range1`, `@range2`, `@range3`.
    pub ranges: [f64; 3],
    /// Tree substituted for `@source.*` references.
    pub source: Option<RollData>,
}

/// How a resolved change folds into the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldMode {
    /// Numeric add (no sigil).
    Add,
    /// `$`: overwrite the destination with the rendered value.
    Template,
    /// `&`: append the formula text to the destination string.
    Append,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    Immediate(f64),
    /// Dice-bearing or appended formula, carried as pre-substituted text.
    Deferred(String),
}

/// One applicable change, ready to fold.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedChange {
    pub target: String,
    pub mode: FoldMode,
    pub value: ResolvedValue,
    /// Source item name, kept for chat-card attribution.
    pub source_name: String,
    pub special: Option<String>,
}

/// Outcome of a resolution pass.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub changes: Vec<ResolvedChange>,
    pub warnings: Vec<String>,
}

/// Collect and resolve every applicable change on the actor's
/// contributing items.
///
/// Optional-kind requests (the roll kind ends in `Optional`) skip items
/// whose charge pool is empty; the player could not pay to opt in. A
/// plain query still sees the passive changes of a depleted item.
/// Condition formulas that fail to evaluate suppress their change with a
/// warning.
pub fn resolve_changes(
    actor: &Actor,
    context: &ChangeContext,
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> Resolution {
    let mut resolution = Resolution::default();
    let optional_request = context.roll_kind.ends_with("Optional");

    for item in actor.items.iter().filter(|item| item.is_contributing()) {
        if optional_request && suppressed_by_empty_pool(actor, item) {
            continue;
        }
        for change in &item.combat_changes {
            if !applies(change, context) {
                continue;
            }
            if !change.condition.is_empty() {
                let outcome = safe_evaluate(&change.condition, data, roller);
                if let Some(error) = outcome.error {
                    resolution
                        .warnings
                        .push(format!("{}: condition {error}", item.name));
                    continue;
                }
                if !outcome.is_truthy() {
                    continue;
                }
            }
            match resolve_one(item, change, context, data, roller) {
                Ok(resolved) => resolution.changes.push(resolved),
                Err(warning) => resolution.warnings.push(warning),
            }
        }
    }

    resolution
}

fn suppressed_by_empty_pool(actor: &Actor, item: &Item) -> bool {
    item.is_charged()
        && matches!(get_charges(actor, item), Ok(ChargePool::Limited(0)) | Err(_))
}

fn applies(change: &CombatChange, context: &ChangeContext) -> bool {
    let scope_ok = change.scope == "all" || change.scope == context.roll_kind;
    let action_ok = change.action_filter.is_empty()
        || change.action_filter == context.action_type;
    scope_ok && action_ok
}

fn resolve_one(
    item: &Item,
    change: &CombatChange,
    context: &ChangeContext,
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> Result<ResolvedChange, String> {
    let (mode, target) = split_sigil(&change.target);
    let formula = presubstitute(&change.formula, context);

    let value = if mode == FoldMode::Append {
        // Appends carry text into the destination formula untouched.
        ResolvedValue::Deferred(formula)
    } else {
        let parsed = Formula::parse(&formula)
            .map_err(|error| format!("{}: {error}", item.name))?;
        if parsed.has_dice() {
            ResolvedValue::Deferred(formula)
        } else {
            let outcome = parsed
                .evaluate(data, roller)
                .map_err(|error| format!("{}: {error}", item.name))?;
            ResolvedValue::Immediate(outcome.total)
        }
    };

    Ok(ResolvedChange {
        target: target.to_string(),
        mode,
        value,
        source_name: item.name.clone(),
        special: change.special.clone(),
    })
}

fn split_sigil(target: &str) -> (FoldMode, &str) {
    match target.as_bytes().first() {
        Some(b'$') => (FoldMode::Template, &target[1..]),
        Some(b'&') => (FoldMode::Append, &target[1..]),
        _ => (FoldMode::Add, target),
    }
}

/// Replace `@range`/`@range1..3` and `@source.*` with concrete values.
///
/// This happens textually so deferred formulas still carry the resolved
/// numbers when they are finally rolled.
fn presubstitute(formula: &str, context: &ChangeContext) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;
    while i < formula.len() {
        let remainder = &formula[i..];
        if !remainder.starts_with('@') {
            let mut chars = remainder.chars();
            let c = chars.next().unwrap_or('@');
            out.push(c);
            i += c.len_utf8();
            continue;
        }
        let rest = &formula[i + 1..];
        if let Some(stripped) = rest.strip_prefix("source.") {
            let path_len = stripped
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '.' && c != '_')
                .unwrap_or(stripped.len());
            let path = stripped[..path_len].trim_end_matches('.');
            let value = context
                .source
                .as_ref()
                .map(|source| source.number(path))
                .unwrap_or(0.0);
            out.push_str(&crate::rolldata::value_render(value));
            i += 1 + "source.".len() + path_len;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix("range") {
            let (index, consumed) = match stripped.as_bytes().first() {
                Some(b'1') => (0, 1),
                Some(b'2') => (1, 1),
                Some(b'3') => (2, 1),
                _ => (0, 0),
            };
            // Bare identifier continuations like `@rangedAttack` are not
            // range tokens.
            let next = stripped.as_bytes().get(consumed);
            if !next.is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_') {
                out.push_str(&crate::rolldata::value_render(context.ranges[index]));
                i += 1 + "range".len() + consumed;
                continue;
            }
        }
        out.push('@');
        i += 1;
    }
    out
}

/// Fold resolved changes into the roll data.
///
/// Deferred add/template values are evaluated now, consuming `roller`;
/// appends concatenate their text onto the destination with a `+` joint.
pub fn apply_changes(
    data: &mut RollData,
    changes: &[ResolvedChange],
    roller: &mut dyn DiceRoller,
) -> Vec<String> {
    let mut warnings = Vec::new();

    for change in changes {
        match (&change.mode, &change.value) {
            (FoldMode::Add, value) => {
                let amount = materialize(value, data, roller, &mut warnings);
                let current = data.number(&change.target);
                data.set(change.target.as_str(), current + amount);
            }
            (FoldMode::Template, value) => {
                let amount = materialize(value, data, roller, &mut warnings);
                data.set(change.target.as_str(), amount);
            }
            (FoldMode::Append, ResolvedValue::Deferred(text)) => {
                let current = data
                    .get(&change.target)
                    .map(|value| value.render())
                    .unwrap_or_default();
                let joined = if current.is_empty() {
                    text.clone()
                } else {
                    format!("{current} + {text}")
                };
                data.set(change.target.as_str(), joined);
            }
            (FoldMode::Append, ResolvedValue::Immediate(n)) => {
                // Appends are always built deferred; keep a sane fallback.
                let current = data.number(&change.target);
                data.set(change.target.as_str(), current + n);
            }
        }
    }

    warnings
}

fn materialize(
    value: &ResolvedValue,
    data: &RollData,
    roller: &mut dyn DiceRoller,
    warnings: &mut Vec<String>,
) -> f64 {
    match value {
        ResolvedValue::Immediate(n) => *n,
        ResolvedValue::Deferred(text) => {
            let outcome = safe_evaluate(text, data, roller);
            if let Some(error) = outcome.error {
                warnings.push(error);
            }
            outcome.total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::SequenceRoller;
    use crate::model::{Actor, ActorId, Item, ItemId, ItemKind, UsagePeriod, Uses};

    fn actor_with_changes(changes: Vec<(Item, Vec<CombatChange>)>) -> Actor {
        let mut actor = Actor::new(ActorId(1), "Test");
        for (mut item, item_changes) in changes {
            item.combat_changes = item_changes;
            actor.items.push(item);
        }
        actor
    }

    fn change(scope: &str, action: &str, target: &str, formula: &str) -> CombatChange {
        CombatChange {
            scope: scope.to_string(),
            action_filter: action.to_string(),
            condition: String::new(),
            target: target.to_string(),
            formula: formula.to_string(),
            special: None,
        }
    }

    fn melee_context() -> ChangeContext {
        ChangeContext {
            roll_kind: "attack".to_string(),
            action_type: "mwak".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn scope_and_action_filtering() {
        let feat = Item::new(ItemId(1), "Weapon Focus", ItemKind::Feat);
        let actor = actor_with_changes(vec![(
            feat,
            vec![
                change("attack", "mwak", "attack.bonus", "1"),
                change("attack", "rwak", "attack.bonus", "2"),
                change("savingThrow", "", "save.bonus", "3"),
                change("all", "", "attack.bonus", "4"),
            ],
        )]);
        let mut roller = SequenceRoller::new(vec![]);
        let resolution =
            resolve_changes(&actor, &melee_context(), &RollData::new(), &mut roller);
        let totals: Vec<f64> = resolution
            .changes
            .iter()
            .map(|c| match c.value {
                ResolvedValue::Immediate(n) => n,
                _ => f64::NAN,
            })
            .collect();
        assert_eq!(totals, vec![1.0, 4.0]);
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn conditions_gate_application() {
        let feat = Item::new(ItemId(1), "Power Attack", ItemKind::Feat);
        let actor = actor_with_changes(vec![(
            feat,
            vec![change("attack", "", "attack.bonus", "2")
                .with_condition("@conditions.raging")],
        )]);
        let mut roller = SequenceRoller::new(vec![]);
        let mut data = RollData::new();
        assert!(
            resolve_changes(&actor, &melee_context(), &data, &mut roller)
                .changes
                .is_empty()
        );
        data.set("conditions.raging", true);
        assert_eq!(
            resolve_changes(&actor, &melee_context(), &data, &mut roller)
                .changes
                .len(),
            1
        );
    }

    #[test]
    fn empty_pools_suppress_only_optional_requests() {
        let mut rod = Item::new(ItemId(1), "Rod of Smiting", ItemKind::Equipment);
        rod.equipped = true;
        rod.uses = Some(Uses {
            per: UsagePeriod::Charges,
            value: 0,
            max: 3,
            max_formula: None,
            charges_per_use: 1,
            is_resource: false,
        });
        let actor = actor_with_changes(vec![(
            rod,
            vec![change("all", "", "attack.bonus", "2")],
        )]);
        let mut roller = SequenceRoller::new(vec![]);

        // Passive query: the depleted rod's always-on bonus still applies.
        let resolution =
            resolve_changes(&actor, &melee_context(), &RollData::new(), &mut roller);
        assert_eq!(resolution.changes.len(), 1);

        // Opting in costs a charge the pool cannot pay.
        let optional = ChangeContext {
            roll_kind: "attackOptional".to_string(),
            ..Default::default()
        };
        let resolution = resolve_changes(&actor, &optional, &RollData::new(), &mut roller);
        assert!(resolution.changes.is_empty());
    }

    #[test]
    fn dice_stay_deferred_until_the_fold() {
        let buff = {
            let mut item = Item::new(ItemId(1), "Divine Favor", ItemKind::Buff);
            item.active = true;
            item
        };
        let actor = actor_with_changes(vec![(
            buff,
            vec![change("attack", "", "damage.bonus", "1d6")],
        )]);
        let mut roller = SequenceRoller::new(vec![]);
        let resolution =
            resolve_changes(&actor, &melee_context(), &RollData::new(), &mut roller);
        assert_eq!(
            resolution.changes[0].value,
            ResolvedValue::Deferred("1d6".to_string())
        );

        let mut data = RollData::new();
        let mut roller = SequenceRoller::new(vec![4]);
        apply_changes(&mut data, &resolution.changes, &mut roller);
        assert_eq!(data.number("damage.bonus"), 4.0);
    }

    #[test]
    fn fold_modes() {
        let mut data = RollData::new();
        data.set("attack.bonus", 3);
        data.set("damage.formula", "1d8");
        let changes = vec![
            ResolvedChange {
                target: "attack.bonus".to_string(),
                mode: FoldMode::Add,
                value: ResolvedValue::Immediate(2.0),
                source_name: "Bless".to_string(),
                special: None,
            },
            ResolvedChange {
                target: "attack.note".to_string(),
                mode: FoldMode::Template,
                value: ResolvedValue::Immediate(20.0),
                source_name: "Keen Edge".to_string(),
                special: None,
            },
            ResolvedChange {
                target: "damage.formula".to_string(),
                mode: FoldMode::Append,
                value: ResolvedValue::Deferred("2d6".to_string()),
                source_name: "Flaming Burst".to_string(),
                special: None,
            },
        ];
        let mut roller = SequenceRoller::new(vec![]);
        let warnings = apply_changes(&mut data, &changes, &mut roller);
        assert!(warnings.is_empty());
        assert_eq!(data.number("attack.bonus"), 5.0);
        assert_eq!(data.number("attack.note"), 20.0);
        assert_eq!(
            data.get("damage.formula").unwrap().render(),
            "1d8 + 2d6"
        );
    }

    #[test]
    fn range_and_source_presubstitution() {
        let context = ChangeContext {
            roll_kind: "attack".to_string(),
            action_type: String::new(),
            ranges: [30.0, 60.0, 90.0],
            source: Some({
                let mut source = RollData::new();
                source.set("cl", 7);
                source
            }),
        };
        assert_eq!(presubstitute("@range / 10", &context), "30 / 10");
        assert_eq!(presubstitute("@range2 + @range3", &context), "60 + 90");
        assert_eq!(presubstitute("@source.cl * 2", &context), "7 * 2");
        // Non-range identifiers pass through untouched.
        assert_eq!(
            presubstitute("@attributes.bab.total", &context),
            "@attributes.bab.total"
        );
    }

    impl CombatChange {
        fn with_condition(mut self, condition: &str) -> Self {
            self.condition = condition.to_string();
            self
        }
    }
}
