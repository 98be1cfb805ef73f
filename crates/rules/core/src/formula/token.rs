//! Tokenizer for the formula language.

use super::FormulaError;
use super::dice::{DiceSpec, KeepRule};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    /// `@a.b.c` context reference, stored without the leading `@`.
    Path(String),
    /// Bare identifier (function names).
    Ident(String),
    Dice(DiceSpec),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => pos += 1,
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    pos += 2;
                } else {
                    tokens.push(Token::Lt);
                    pos += 1;
                }
            }
            '>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    pos += 2;
                } else {
                    tokens.push(Token::Gt);
                    pos += 1;
                }
            }
            '=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    pos += 2;
                } else {
                    return Err(FormulaError::unexpected_char(input, '=', pos));
                }
            }
            '!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    pos += 2;
                } else {
                    return Err(FormulaError::unexpected_char(input, '!', pos));
                }
            }
            '&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    pos += 2;
                } else {
                    return Err(FormulaError::unexpected_char(input, '&', pos));
                }
            }
            '|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    pos += 2;
                } else {
                    return Err(FormulaError::unexpected_char(input, '|', pos));
                }
            }
            '@' => {
                pos += 1;
                let start = pos;
                while pos < bytes.len() {
                    let c = bytes[pos] as char;
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                if pos == start {
                    return Err(FormulaError::syntax(input, "dangling '@'"));
                }
                tokens.push(Token::Path(input[start..pos].trim_end_matches('.').to_string()));
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let run = read_alnum_run(input, pos);
                pos += run.len();
                tokens.push(classify_numeric_run(input, run)?);
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let run = read_alnum_run(input, pos);
                pos += run.len();
                tokens.push(classify_ident_run(input, run)?);
            }
            _ => return Err(FormulaError::unexpected_char(input, c, pos)),
        }
    }

    Ok(tokens)
}

/// Read a maximal run of alphanumerics, `_` and `.` (numbers, identifiers
/// and dice notation all live in such runs).
fn read_alnum_run(input: &str, start: usize) -> &str {
    let bytes = input.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        let c = bytes[end] as char;
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            end += 1;
        } else {
            break;
        }
    }
    &input[start..end]
}

/// A run starting with a digit is either a plain number or dice notation
/// (`2d6`, `4d6kh3`, `1d8r1`).
fn classify_numeric_run(input: &str, run: &str) -> Result<Token, FormulaError> {
    if let Some(d_pos) = run.find(['d', 'D']) {
        if run[d_pos + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            let count: u32 = run[..d_pos]
                .parse()
                .map_err(|_| FormulaError::syntax(input, "bad dice count"))?;
            return parse_dice(input, count, &run[d_pos + 1..]);
        }
    }
    run.parse::<f64>()
        .map(Token::Number)
        .map_err(|_| FormulaError::syntax(input, format!("bad number '{run}'")))
}

/// A run starting with a letter is a function name, or dice with an
/// implicit count of one (`d20`).
fn classify_ident_run(input: &str, run: &str) -> Result<Token, FormulaError> {
    if let Some(rest) = run.strip_prefix(['d', 'D']) {
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_dice(input, 1, rest);
        }
    }
    Ok(Token::Ident(run.to_string()))
}

/// Parse `<sides><modifiers>` where modifiers are any of `khN`, `klN`,
/// `dhN`, `dlN`, `rN`.
fn parse_dice(input: &str, count: u32, rest: &str) -> Result<Token, FormulaError> {
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let sides: u32 = rest[..digits_end]
        .parse()
        .map_err(|_| FormulaError::syntax(input, "bad dice sides"))?;
    if count == 0 || count > DiceSpec::MAX_COUNT || sides == 0 {
        return Err(FormulaError::syntax(
            input,
            format!("dice out of range: {count}d{sides}"),
        ));
    }

    let mut spec = DiceSpec::new(count, sides);
    let mut tail = &rest[digits_end..];
    while !tail.is_empty() {
        let (rule, remaining) = parse_dice_modifier(input, tail)?;
        match rule {
            DiceModifier::Keep(keep, n) => spec.keep = Some((keep, n)),
            DiceModifier::Reroll(n) => spec.reroll_below = Some(n),
        }
        tail = remaining;
    }
    Ok(Token::Dice(spec))
}

enum DiceModifier {
    Keep(KeepRule, u32),
    Reroll(u32),
}

fn parse_dice_modifier<'a>(
    input: &str,
    tail: &'a str,
) -> Result<(DiceModifier, &'a str), FormulaError> {
    let (rule_len, make): (usize, fn(u32) -> DiceModifier) = if tail.starts_with("kh") {
        (2, |n| DiceModifier::Keep(KeepRule::KeepHighest, n))
    } else if tail.starts_with("kl") {
        (2, |n| DiceModifier::Keep(KeepRule::KeepLowest, n))
    } else if tail.starts_with("dh") {
        (2, |n| DiceModifier::Keep(KeepRule::DropHighest, n))
    } else if tail.starts_with("dl") {
        (2, |n| DiceModifier::Keep(KeepRule::DropLowest, n))
    } else if tail.starts_with('r') {
        (1, DiceModifier::Reroll)
    } else {
        return Err(FormulaError::syntax(
            input,
            format!("bad dice modifier '{tail}'"),
        ));
    };

    let digits = &tail[rule_len..];
    let digits_end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if digits_end == 0 {
        return Err(FormulaError::syntax(input, "dice modifier needs a number"));
    }
    let n: u32 = digits[..digits_end]
        .parse()
        .map_err(|_| FormulaError::syntax(input, "bad dice modifier value"))?;
    Ok((make(n), &tail[rule_len + digits_end..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_arithmetic() {
        let tokens = tokenize("1 + 2 * (3 - 4)").unwrap();
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0], Token::Number(1.0));
        assert_eq!(tokens[3], Token::Star);
    }

    #[test]
    fn lexes_paths_and_dice() {
        let tokens = tokenize("@abilities.str.mod + 2d6kh1 + d20").unwrap();
        assert_eq!(tokens[0], Token::Path("abilities.str.mod".into()));
        match &tokens[2] {
            Token::Dice(spec) => {
                assert_eq!(spec.count, 2);
                assert_eq!(spec.sides, 6);
                assert_eq!(spec.keep, Some((KeepRule::KeepHighest, 1)));
            }
            other => panic!("expected dice, got {other:?}"),
        }
        match &tokens[4] {
            Token::Dice(spec) => assert_eq!((spec.count, spec.sides), (1, 20)),
            other => panic!("expected dice, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(tokenize("2 $ 2").is_err());
        assert!(tokenize("@").is_err());
        assert!(tokenize("0d6").is_err());
    }
}
