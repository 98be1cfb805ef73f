//! Clause parser for item action scripts.
//!
//! A script is a semicolon-separated clause list. Each clause reads
//!
//! ```text
//! Verb param param... [on self|target] [if condition]
//! ```
//!
//! with double quotes grouping a multi-word phrase into one parameter.
//! Unknown verbs and malformed clauses are reported per clause; one bad
//! clause never invalidates its neighbors.

use strum::EnumString;

use super::ScriptError;

/// The closed verb set. Scripts cannot evaluate arbitrary code; every
/// verb maps to one typed directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Verb {
    Set,
    Condition,
    Trait,
    Update,
    Damage,
    SelfDamage,
    ApplyDamage,
    AbilityDamage,
    AbilityDrain,
    Create,
    Give,
    Remove,
    Activate,
    Deactivate,
    Regenerate,
    TurnUndead,
    Grapple,
    Roll,
    Message,
}

/// Who a clause acts on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScriptTarget {
    #[default]
    Itself,
    Target,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub verb: Verb,
    pub params: Vec<String>,
    pub target: ScriptTarget,
    /// Formula evaluated for truthiness before the clause runs.
    pub condition: Option<String>,
    /// Original clause text, for warnings.
    pub source: String,
}

/// Parse result: the good clauses plus one warning per rejected clause.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedScript {
    pub clauses: Vec<Clause>,
    pub warnings: Vec<String>,
}

pub fn parse_script(text: &str) -> ParsedScript {
    let mut parsed = ParsedScript::default();
    for raw in split_clauses(text) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_clause(trimmed) {
            Ok(clause) => parsed.clauses.push(clause),
            Err(error) => parsed.warnings.push(format!("{trimmed}: {error}")),
        }
    }
    parsed
}

/// Split on semicolons outside quoted phrases.
fn split_clauses(text: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => {
                clauses.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    clauses.push(current);
    clauses
}

fn parse_clause(text: &str) -> Result<Clause, ScriptError> {
    let tokens = tokenize(text)?;
    let mut tokens = tokens.into_iter();
    let verb_word = tokens.next().ok_or(ScriptError::EmptyClause)?;
    let verb: Verb = verb_word
        .text
        .parse()
        .map_err(|_| ScriptError::UnknownVerb(verb_word.text.clone()))?;

    let mut params = Vec::new();
    let mut target = ScriptTarget::default();
    let mut condition: Option<String> = None;

    let mut rest: Vec<Token> = tokens.collect();
    // The trailing `if` clause swallows everything after it.
    if let Some(pos) = rest
        .iter()
        .position(|t| !t.quoted && t.text.eq_ignore_ascii_case("if"))
    {
        let cond_tokens: Vec<Token> = rest.split_off(pos)[1..].to_vec();
        if cond_tokens.is_empty() {
            return Err(ScriptError::MissingCondition);
        }
        condition = Some(
            cond_tokens
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );
    }
    if let Some(pos) = rest
        .iter()
        .position(|t| !t.quoted && t.text.eq_ignore_ascii_case("on"))
    {
        let target_tokens = rest.split_off(pos);
        let name = target_tokens
            .get(1)
            .ok_or(ScriptError::MissingTarget)?;
        target = match name.text.to_ascii_lowercase().as_str() {
            "self" => ScriptTarget::Itself,
            "target" => ScriptTarget::Target,
            other => return Err(ScriptError::BadTarget(other.to_string())),
        };
        if target_tokens.len() > 2 {
            return Err(ScriptError::TrailingTokens);
        }
    }
    params.extend(rest.into_iter().map(|t| t.text));

    Ok(Clause {
        verb,
        params,
        target,
        condition,
        source: text.to_string(),
    })
}

#[derive(Clone, Debug)]
struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(text: &str) -> Result<Vec<Token>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut phrase = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                phrase.push(c);
            }
            if !closed {
                return Err(ScriptError::UnterminatedQuote);
            }
            tokens.push(Token {
                text: phrase,
                quoted: true,
            });
            continue;
        }
        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(Token {
            text: word,
            quoted: false,
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_canonical_condition_clause() {
        let parsed = parse_script("Condition set prone to true on self");
        assert!(parsed.warnings.is_empty());
        let clause = &parsed.clauses[0];
        assert_eq!(clause.verb, Verb::Condition);
        assert_eq!(clause.params, vec!["set", "prone", "to", "true"]);
        assert_eq!(clause.target, ScriptTarget::Itself);
        assert_eq!(clause.condition, None);
    }

    #[test]
    fn quoted_phrases_are_single_params() {
        let parsed = parse_script(r#"Create "Bear Form Claws" on self"#);
        let clause = &parsed.clauses[0];
        assert_eq!(clause.params, vec!["Bear Form Claws"]);
    }

    #[test]
    fn semicolons_separate_clauses_outside_quotes() {
        let parsed =
            parse_script(r#"Message "first; still first"; Damage 1d6 on target"#);
        assert_eq!(parsed.clauses.len(), 2);
        assert_eq!(parsed.clauses[0].params, vec!["first; still first"]);
        assert_eq!(parsed.clauses[1].target, ScriptTarget::Target);
    }

    #[test]
    fn conditions_capture_the_tail() {
        let parsed =
            parse_script("Damage 2d6 on target if @attributes.hd.total > 5");
        let clause = &parsed.clauses[0];
        assert_eq!(
            clause.condition.as_deref(),
            Some("@attributes.hd.total > 5")
        );
        assert_eq!(clause.params, vec!["2d6"]);
    }

    #[test]
    fn bad_clauses_warn_and_skip() {
        let parsed = parse_script("Explode everything on self; Message \"ok\"");
        assert_eq!(parsed.clauses.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("Explode"));
    }
}
