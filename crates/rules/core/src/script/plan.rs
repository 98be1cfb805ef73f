//! Clause-to-directive planning.
//!
//! Clauses are grouped into batched mutation categories so the runtime
//! issues at most one store call per category, in creation, removal,
//! item-update, actor-update, other order.

use crate::formula::{DiceRoller, safe_evaluate};
use crate::model::AbilityKind;
use crate::rolldata::RollData;

use super::parser::{Clause, ScriptTarget, Verb};
use super::ScriptError;

/// A parameter that may be a formula (dice, `@` references) or a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Number(f64),
    Text(String),
}

impl Param {
    pub fn as_number(&self) -> f64 {
        match self {
            Param::Number(n) => *n,
            Param::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Param::Number(n) => crate::rolldata::value_render(*n),
            Param::Text(s) => s.clone(),
        }
    }
}

/// One typed mutation planned from a clause.
#[derive(Clone, Debug, PartialEq)]
pub enum PlannedOp {
    CreateItem {
        target: ScriptTarget,
        name: String,
    },
    GiveItem {
        name: String,
    },
    RemoveItem {
        target: ScriptTarget,
        name: String,
    },
    ActivateItem {
        target: ScriptTarget,
        name: String,
        active: bool,
    },
    UpdateItem {
        target: ScriptTarget,
        name: String,
        path: String,
        value: Param,
    },
    SetPath {
        target: ScriptTarget,
        path: String,
        value: Param,
    },
    SetCondition {
        target: ScriptTarget,
        name: String,
        value: bool,
    },
    SetTrait {
        target: ScriptTarget,
        group: String,
        name: String,
        value: bool,
    },
    AbilityDamage {
        target: ScriptTarget,
        ability: AbilityKind,
        amount: f64,
        drain: bool,
    },
    SelfDamage {
        amount: f64,
    },
    Damage {
        target: ScriptTarget,
        formula: String,
    },
    ApplyDamage {
        target: ScriptTarget,
        amount: f64,
    },
    Regenerate {
        amount: f64,
    },
    TurnUndead {
        max_hd: f64,
    },
    Grapple {
        bonus: f64,
    },
    Roll {
        formula: String,
        flavor: Option<String>,
    },
    Message {
        text: String,
    },
}

/// Directives grouped for batched application.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionPlan {
    pub item_creations: Vec<PlannedOp>,
    pub item_removals: Vec<PlannedOp>,
    pub item_updates: Vec<PlannedOp>,
    pub actor_updates: Vec<PlannedOp>,
    pub other: Vec<PlannedOp>,
    pub warnings: Vec<String>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.item_creations.is_empty()
            && self.item_removals.is_empty()
            && self.item_updates.is_empty()
            && self.actor_updates.is_empty()
            && self.other.is_empty()
    }
}

/// Plan a clause list against the invocation's roll data.
///
/// Conditions gate their clause here, and rollable parameters consume
/// `roller` now, so the plan the runtime applies is fully concrete.
pub fn build_plan(
    clauses: &[Clause],
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();

    for clause in clauses {
        if let Some(condition) = &clause.condition {
            let outcome = safe_evaluate(condition, data, &mut *roller);
            if let Some(error) = outcome.error {
                plan.warnings.push(format!("{}: {error}", clause.source));
                continue;
            }
            if !outcome.is_truthy() {
                continue;
            }
        }
        match plan_clause(clause, data, roller) {
            Ok(op) => plan.push(op),
            Err(error) => plan.warnings.push(format!("{}: {error}", clause.source)),
        }
    }

    plan
}

impl ExecutionPlan {
    fn push(&mut self, op: PlannedOp) {
        match &op {
            PlannedOp::CreateItem { .. } | PlannedOp::GiveItem { .. } => {
                self.item_creations.push(op)
            }
            PlannedOp::RemoveItem { .. } => self.item_removals.push(op),
            PlannedOp::ActivateItem { .. } | PlannedOp::UpdateItem { .. } => {
                self.item_updates.push(op)
            }
            PlannedOp::SetPath { .. }
            | PlannedOp::SetCondition { .. }
            | PlannedOp::SetTrait { .. }
            | PlannedOp::AbilityDamage { .. }
            | PlannedOp::SelfDamage { .. } => self.actor_updates.push(op),
            _ => self.other.push(op),
        }
    }
}

fn plan_clause(
    clause: &Clause,
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> Result<PlannedOp, ScriptError> {
    let params = &clause.params;
    let target = clause.target;

    let arity = |expected: usize| -> Result<(), ScriptError> {
        if params.len() == expected {
            Ok(())
        } else {
            Err(ScriptError::WrongArity {
                verb: format!("{:?}", clause.verb),
                expected,
                got: params.len(),
            })
        }
    };

    match clause.verb {
        Verb::Create => {
            arity(1)?;
            Ok(PlannedOp::CreateItem {
                target,
                name: params[0].clone(),
            })
        }
        Verb::Give => {
            arity(1)?;
            Ok(PlannedOp::GiveItem {
                name: params[0].clone(),
            })
        }
        Verb::Remove => {
            arity(1)?;
            Ok(PlannedOp::RemoveItem {
                target,
                name: params[0].clone(),
            })
        }
        Verb::Activate | Verb::Deactivate => {
            arity(1)?;
            Ok(PlannedOp::ActivateItem {
                target,
                name: params[0].clone(),
                active: clause.verb == Verb::Activate,
            })
        }
        Verb::Update => {
            arity(3)?;
            Ok(PlannedOp::UpdateItem {
                target,
                name: params[0].clone(),
                path: params[1].clone(),
                value: resolve_param(&params[2], data, roller),
            })
        }
        Verb::Set => {
            // `Set path to value` or `Set path value`.
            let (path, value) = match params.as_slice() {
                [path, to, value] if to.eq_ignore_ascii_case("to") => (path, value),
                [path, value] => (path, value),
                _ => {
                    return Err(ScriptError::WrongArity {
                        verb: "Set".to_string(),
                        expected: 2,
                        got: params.len(),
                    });
                }
            };
            Ok(PlannedOp::SetPath {
                target,
                path: path.clone(),
                value: resolve_param(value, data, roller),
            })
        }
        Verb::Condition => {
            // `Condition set <name> to <true|false>`.
            match params.as_slice() {
                [set, name, to, value]
                    if set.eq_ignore_ascii_case("set") && to.eq_ignore_ascii_case("to") =>
                {
                    Ok(PlannedOp::SetCondition {
                        target,
                        name: name.clone(),
                        value: parse_bool(value)?,
                    })
                }
                _ => Err(ScriptError::MalformedClause(clause.source.clone())),
            }
        }
        Verb::Trait => {
            // `Trait set <group> <name> to <true|false>`.
            match params.as_slice() {
                [set, group, name, to, value]
                    if set.eq_ignore_ascii_case("set") && to.eq_ignore_ascii_case("to") =>
                {
                    Ok(PlannedOp::SetTrait {
                        target,
                        group: group.clone(),
                        name: name.clone(),
                        value: parse_bool(value)?,
                    })
                }
                _ => Err(ScriptError::MalformedClause(clause.source.clone())),
            }
        }
        Verb::AbilityDamage | Verb::AbilityDrain => {
            arity(2)?;
            let ability: AbilityKind = params[0]
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| ScriptError::UnknownAbility(params[0].clone()))?;
            Ok(PlannedOp::AbilityDamage {
                target,
                ability,
                amount: resolve_param(&params[1], data, roller).as_number(),
                drain: clause.verb == Verb::AbilityDrain,
            })
        }
        Verb::SelfDamage => {
            arity(1)?;
            Ok(PlannedOp::SelfDamage {
                amount: resolve_param(&params[0], data, roller).as_number(),
            })
        }
        Verb::Damage => {
            arity(1)?;
            // Damage formulas stay textual; the runtime rolls them in the
            // damage pipeline where resistances apply.
            Ok(PlannedOp::Damage {
                target,
                formula: params[0].clone(),
            })
        }
        Verb::ApplyDamage => {
            arity(1)?;
            Ok(PlannedOp::ApplyDamage {
                target,
                amount: resolve_param(&params[0], data, roller).as_number(),
            })
        }
        Verb::Regenerate => {
            arity(1)?;
            Ok(PlannedOp::Regenerate {
                amount: resolve_param(&params[0], data, roller).as_number(),
            })
        }
        Verb::TurnUndead => {
            let max_hd = params
                .first()
                .map(|p| resolve_param(p, data, roller).as_number())
                .unwrap_or(0.0);
            Ok(PlannedOp::TurnUndead { max_hd })
        }
        Verb::Grapple => {
            let bonus = params
                .first()
                .map(|p| resolve_param(p, data, roller).as_number())
                .unwrap_or(0.0);
            Ok(PlannedOp::Grapple { bonus })
        }
        Verb::Roll => {
            if params.is_empty() {
                return Err(ScriptError::WrongArity {
                    verb: "Roll".to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            Ok(PlannedOp::Roll {
                formula: params[0].clone(),
                flavor: params.get(1).cloned(),
            })
        }
        Verb::Message => {
            arity(1)?;
            Ok(PlannedOp::Message {
                text: params[0].clone(),
            })
        }
    }
}

fn parse_bool(text: &str) -> Result<bool, ScriptError> {
    match text.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ScriptError::BadBool(other.to_string())),
    }
}

/// Detect formula-shaped parameters and evaluate them now; everything
/// else passes through as text.
fn resolve_param(raw: &str, data: &RollData, roller: &mut dyn DiceRoller) -> Param {
    if looks_rollable(raw) {
        return Param::Number(safe_evaluate(raw, data, roller).total);
    }
    match raw.trim().parse::<f64>() {
        Ok(n) => Param::Number(n),
        Err(_) => Param::Text(raw.to_string()),
    }
}

/// Heuristic matching the parameter shapes that need evaluation: dice
/// notation, context references, function calls, or arithmetic.
fn looks_rollable(raw: &str) -> bool {
    if raw.contains('@') || raw.contains('+') || raw.contains(',') {
        return true;
    }
    if raw.contains("min(") || raw.contains("max(") || raw.contains("floor(") {
        return true;
    }
    has_dice_notation(raw)
}

fn has_dice_notation(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        (b == b'd' || b == b'D')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_digit()
            && (i == 0 || bytes[i - 1].is_ascii_digit() || bytes[i - 1].is_ascii_whitespace())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::SequenceRoller;
    use crate::script::parser::parse_script;

    fn plan(script: &str, faces: Vec<u32>) -> ExecutionPlan {
        let parsed = parse_script(script);
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        let mut roller = SequenceRoller::new(faces);
        build_plan(&parsed.clauses, &RollData::new(), &mut roller)
    }

    #[test]
    fn condition_clause_plans_an_actor_update() {
        let plan = plan("Condition set prone to true on self", vec![]);
        assert_eq!(
            plan.actor_updates,
            vec![PlannedOp::SetCondition {
                target: ScriptTarget::Itself,
                name: "prone".to_string(),
                value: true,
            }]
        );
    }

    #[test]
    fn clauses_land_in_their_categories() {
        let plan = plan(
            r#"Create "Claws" on self; Remove "Old Form" on self; Activate "Rage" on self; Set attributes.hp.temp 5 on self; Message "done""#,
            vec![],
        );
        assert_eq!(plan.item_creations.len(), 1);
        assert_eq!(plan.item_removals.len(), 1);
        assert_eq!(plan.item_updates.len(), 1);
        assert_eq!(plan.actor_updates.len(), 1);
        assert_eq!(plan.other.len(), 1);
    }

    #[test]
    fn rollable_params_consume_the_roller() {
        let plan = plan("SelfDamage 2d6 on self", vec![3, 5]);
        assert_eq!(plan.actor_updates, vec![PlannedOp::SelfDamage { amount: 8.0 }]);
    }

    #[test]
    fn false_conditions_drop_the_clause() {
        let plan = plan("SelfDamage 5 on self if 1 > 2", vec![]);
        assert!(plan.is_empty());
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn wrong_arity_warns_without_aborting() {
        let plan = plan("Give; Message \"hi\"", vec![]);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.other.len(), 1);
    }

    #[test]
    fn rollable_detection() {
        assert!(looks_rollable("1d6"));
        assert!(looks_rollable("@level + 2"));
        assert!(looks_rollable("max(1, 2)"));
        assert!(!looks_rollable("prone"));
        assert!(!looks_rollable("Bear Form"));
    }
}
