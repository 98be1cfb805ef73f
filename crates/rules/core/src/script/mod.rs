//! Item action scripts: a closed clause grammar planned into typed,
//! batchable directives.

mod parser;
mod plan;

pub use parser::{Clause, ParsedScript, ScriptTarget, Verb, parse_script};
pub use plan::{ExecutionPlan, Param, PlannedOp, build_plan};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("empty clause")]
    EmptyClause,
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("`on` without a target")]
    MissingTarget,
    #[error("bad target `{0}`, expected self or target")]
    BadTarget(String),
    #[error("`if` without a condition")]
    MissingCondition,
    #[error("unexpected tokens after target")]
    TrailingTokens,
    #[error("{verb}: expected {expected} parameters, got {got}")]
    WrongArity {
        verb: String,
        expected: usize,
        got: usize,
    },
    #[error("malformed clause `{0}`")]
    MalformedClause(String),
    #[error("unknown ability `{0}`")]
    UnknownAbility(String),
    #[error("expected true or false, got `{0}`")]
    BadBool(String),
}
