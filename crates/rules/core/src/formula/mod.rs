//! Formula language: algebra, dice notation, and `@path` substitution.
//!
//! Formulas are parsed into an AST by a real parser (no string patching)
//! and evaluated against a [`crate::rolldata::RollData`] context with an
//! injectable randomness source. The function set is a closed whitelist.
//!
//! Failure policy: parsing returns [`FormulaError`]; [`safe_evaluate`]
//! converts any failure into a zero-valued outcome carrying the error
//! text, so a bad item definition degrades to a warning instead of
//! aborting the computation that triggered it.

mod dice;
mod eval;
mod parser;
mod token;

pub use dice::{DiceResult, DiceRoller, DiceSpec, KeepRule, PcgRoller, SequenceRoller};
pub use eval::{evaluate, safe_evaluate};
pub use parser::{Expr, Formula, Func};

use thiserror::Error;

/// Result of evaluating a formula.
#[derive(Clone, Debug, PartialEq)]
pub struct RollOutcome {
    pub total: f64,
    /// The expression with `@path` references substituted.
    pub formula: String,
    /// The expression with dice terms collapsed to their rolled faces.
    pub result: String,
    /// Set when the outcome was degraded to zero by [`safe_evaluate`].
    pub error: Option<String>,
}

impl RollOutcome {
    /// Integer view of the total, rounding toward zero.
    pub fn total_int(&self) -> i32 {
        self.total as i32
    }

    /// Truthiness for condition formulas.
    pub fn is_truthy(&self) -> bool {
        self.total != 0.0
    }
}

/// Formula failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormulaError {
    #[error("syntax error in '{source_text}': {reason}")]
    Syntax { source_text: String, reason: String },

    #[error("evaluation failed: {reason}")]
    Eval { reason: String },
}

impl FormulaError {
    pub(crate) fn syntax(source: &str, reason: impl Into<String>) -> Self {
        FormulaError::Syntax {
            source_text: source.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected_char(source: &str, c: char, pos: usize) -> Self {
        Self::syntax(source, format!("unexpected character '{c}' at offset {pos}"))
    }
}
