//! Formula evaluation against a roll-data context.

use crate::rolldata::RollData;

use super::dice::DiceRoller;
use super::parser::{BinOp, Expr, Formula, Func};
use super::{FormulaError, RollOutcome};

impl Formula {
    /// Evaluate against a context, consuming randomness from `roller`.
    ///
    /// Missing `@paths` substitute zero; arithmetic on malformed data never
    /// panics. Division by zero is the one runtime failure, reported as
    /// [`FormulaError::Eval`].
    pub fn evaluate(
        &self,
        data: &RollData,
        roller: &mut dyn DiceRoller,
    ) -> Result<RollOutcome, FormulaError> {
        let mut eval = Evaluator { data, roller };
        let node = eval.eval(&self.root)?;
        Ok(RollOutcome {
            total: node.value,
            formula: node.formula,
            result: node.result,
            error: None,
        })
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(
    source: &str,
    data: &RollData,
    roller: &mut dyn DiceRoller,
) -> Result<RollOutcome, FormulaError> {
    Formula::parse(source)?.evaluate(data, roller)
}

/// Evaluate, degrading every failure to a zero-valued outcome.
///
/// The returned outcome carries the error text so callers can surface a
/// warning; a bad formula on one item must never abort a recompute pass.
pub fn safe_evaluate(source: &str, data: &RollData, roller: &mut dyn DiceRoller) -> RollOutcome {
    match evaluate(source, data, roller) {
        Ok(outcome) => outcome,
        Err(error) => RollOutcome {
            total: 0.0,
            formula: source.to_string(),
            result: "0".to_string(),
            error: Some(error.to_string()),
        },
    }
}

/// Evaluated node: its value plus two renderings, one with paths
/// substituted (`formula`) and one with dice also collapsed (`result`).
struct Node {
    value: f64,
    formula: String,
    result: String,
}

struct Evaluator<'a> {
    data: &'a RollData,
    roller: &'a mut dyn DiceRoller,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> Result<Node, FormulaError> {
        match expr {
            Expr::Number(n) => Ok(Node {
                value: *n,
                formula: render_number(*n),
                result: render_number(*n),
            }),
            Expr::Path(path) => {
                let value = self.data.number(path);
                let rendered = render_number(value);
                Ok(Node {
                    value,
                    formula: rendered.clone(),
                    result: rendered,
                })
            }
            Expr::Dice(spec) => {
                let rolled = spec.roll(self.roller);
                let faces = rolled
                    .faces
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join("+");
                Ok(Node {
                    value: rolled.total as f64,
                    formula: spec.notation(),
                    result: format!("[{faces}]"),
                })
            }
            Expr::Neg(inner) => {
                let node = self.eval(inner)?;
                Ok(Node {
                    value: -node.value,
                    formula: format!("-{}", node.formula),
                    result: format!("-{}", node.result),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                let value = apply_binop(*op, lhs.value, rhs.value)?;
                let symbol = binop_symbol(*op);
                Ok(Node {
                    value,
                    formula: format!("{} {symbol} {}", lhs.formula, rhs.formula),
                    result: format!("{} {symbol} {}", lhs.result, rhs.result),
                })
            }
            Expr::Call(func, args) => {
                let nodes = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = apply_func(*func, &nodes);
                let formula_args = nodes
                    .iter()
                    .map(|n| n.formula.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let result_args = nodes
                    .iter()
                    .map(|n| n.result.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(Node {
                    value,
                    formula: format!("{}({formula_args})", func.name()),
                    result: format!("{}({result_args})", func.name()),
                })
            }
        }
    }
}

fn apply_binop(op: BinOp, lhs: f64, rhs: f64) -> Result<f64, FormulaError> {
    let bool_to_f = |b: bool| if b { 1.0 } else { 0.0 };
    Ok(match op {
        BinOp::Add => lhs + rhs,
        BinOp::Sub => lhs - rhs,
        BinOp::Mul => lhs * rhs,
        BinOp::Div => {
            if rhs == 0.0 {
                return Err(FormulaError::Eval {
                    reason: "division by zero".to_string(),
                });
            }
            lhs / rhs
        }
        BinOp::Lt => bool_to_f(lhs < rhs),
        BinOp::Le => bool_to_f(lhs <= rhs),
        BinOp::Gt => bool_to_f(lhs > rhs),
        BinOp::Ge => bool_to_f(lhs >= rhs),
        BinOp::Eq => bool_to_f(lhs == rhs),
        BinOp::Ne => bool_to_f(lhs != rhs),
        BinOp::And => bool_to_f(lhs != 0.0 && rhs != 0.0),
        BinOp::Or => bool_to_f(lhs != 0.0 || rhs != 0.0),
    })
}

fn binop_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

fn apply_func(func: Func, args: &[Node]) -> f64 {
    let first = args.first().map(|n| n.value).unwrap_or(0.0);
    match func {
        Func::Min => args.iter().map(|n| n.value).fold(f64::INFINITY, f64::min),
        Func::Max => args
            .iter()
            .map(|n| n.value)
            .fold(f64::NEG_INFINITY, f64::max),
        Func::Floor => first.floor(),
        Func::Ceil => first.ceil(),
        Func::Abs => first.abs(),
    }
}

fn render_number(n: f64) -> String {
    crate::rolldata::value_render(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::dice::SequenceRoller;

    fn ctx() -> RollData {
        let mut data = RollData::new();
        data.set("abilities.str.mod", 2);
        data.set("attributes.bab.total", 5);
        data.set("level", 7);
        data
    }

    #[test]
    fn arithmetic_and_paths() {
        let mut roller = SequenceRoller::new(vec![]);
        let outcome = evaluate("@attributes.bab.total + @abilities.str.mod", &ctx(), &mut roller)
            .unwrap();
        assert_eq!(outcome.total, 7.0);
        assert_eq!(outcome.formula, "5 + 2");
    }

    #[test]
    fn missing_path_is_zero() {
        let mut roller = SequenceRoller::new(vec![]);
        let outcome = evaluate("@foo.bar + 5", &RollData::new(), &mut roller).unwrap();
        assert_eq!(outcome.total, 5.0);
    }

    #[test]
    fn dice_consume_the_injected_roller() {
        let mut roller = SequenceRoller::new(vec![4, 2, 6]);
        let outcome = evaluate("3d6 + 1", &ctx(), &mut roller).unwrap();
        assert_eq!(outcome.total, 13.0);
        assert_eq!(outcome.result, "[4+2+6] + 1");
    }

    #[test]
    fn functions_and_comparisons() {
        let mut roller = SequenceRoller::new(vec![]);
        assert_eq!(
            evaluate("max(3, floor(@level / 2))", &ctx(), &mut roller)
                .unwrap()
                .total,
            3.0
        );
        assert_eq!(
            evaluate("@level > 3", &ctx(), &mut roller).unwrap().total,
            1.0
        );
        assert_eq!(
            evaluate("@level > 3 && @level < 5", &ctx(), &mut roller)
                .unwrap()
                .total,
            0.0
        );
    }

    #[test]
    fn safe_evaluate_degrades_to_zero() {
        let mut roller = SequenceRoller::new(vec![]);
        let outcome = safe_evaluate("2 +* 3", &RollData::new(), &mut roller);
        assert_eq!(outcome.total, 0.0);
        assert!(outcome.error.is_some());

        let outcome = safe_evaluate("1 / 0", &RollData::new(), &mut roller);
        assert_eq!(outcome.total, 0.0);
        assert!(outcome.error.is_some());
    }
}
