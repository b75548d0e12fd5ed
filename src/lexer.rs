//! Lexical analyzer for a single Tiny BASIC line.
//!
//! Tokenisation is a two-pass left-to-right scan over one physical line
//! (never embedded newlines — each REPL input or stored program line is
//! lexed independently):
//!
//! 1. **Splitting**: whitespace and `"` are separators that flush the
//!    accumulated lexeme; `(`/`)` are self-delimiting and always flush.
//!    Quoted spans become `Token::Str` immediately; everything else is a
//!    placeholder lexeme awaiting classification.
//! 2. **Classification**: each placeholder lexeme is matched, first rule
//!    wins, against: numeric literal, reserved word, named constant, the
//!    bare `=` assignment marker, identifier, operator. Anything matching
//!    none of these stays a `Token::Unknown` and is rejected later by the
//!    evaluator or statement dispatcher.
//!
//! A token's kind is fixed the moment it is produced here and is never
//! mutated afterward — except for the single `FOR`-loop counter token,
//! which the control-flow engine deliberately rewrites in place (see
//! `interpreter::run_for`).

use log::trace;

use crate::error::{BasicError, Result};
use std::f64::consts::{E, PI, TAU};

/// Reserved words recognized by the lexer. Every dialect keyword lives
/// here even when the statement dispatcher has no handler for it (`SLEEP`,
/// `READ`, `WRITE`, `APPEND` execute as no-ops — see `interpreter::dispatch`).
pub const RESERVED_WORDS: &[&str] = &[
    "LET", "PRINT", "INPUT", "IF", "GOTO", "SLEEP", "END", "LIST", "REM", "READ", "WRITE",
    "APPEND", "RUN", "CLS", "CLEAR", "EXIT", "LOAD", "SAVE", "THEN", "ELSE", "FOR", "TO", "DO",
    "GOSUB", "RETURN", "STA", "STS", "STT", "LDA", "LDS", "LDT", "DIR",
];

/// Unary prefix math functions, same token kind as any other non-variable
/// identifier use.
pub const MATH_FUNCTIONS: &[&str] = &[
    "COS", "SIN", "TAN", "ACOS", "ASIN", "ATAN", "COSH", "SINH", "TANH", "ACOSH", "ASINH",
    "ATANH", "DEG", "RAD", "ABS", "SQRT", "LOG", "LOG2", "LOG10", "EXP", "ROUND", "CEIL", "FLOOR",
];

/// Every operator lexeme across every precedence level (see `eval` for the
/// level-ordered tables the evaluator actually uses); the lexer only needs
/// to know "is this an operator at all".
const OPERATOR_LEXEMES: &[&str] = &[
    "==", "!=", ">", "<", ">=", "<=", "<<", ">>", ".", "+", "-", "*", "/", "&", "|", "%", "^", "!",
];

/// A classified token. The kind was decided once, at lex time, and every
/// downstream component (evaluator, dispatcher, persistence bridge) trusts
/// it without re-checking.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `NUM` — a parsed numeric literal, reserved constant, or computed
    /// line number.
    Num(f64),
    /// `STRING` — the unquoted payload of a `"..."` literal.
    Str(String),
    /// `RESVD` — an uppercased reserved word.
    Resvd(String),
    /// `ID` — a case-preserved variable or generic identifier.
    Id(String),
    /// `OP` — an operator lexeme.
    Op(String),
    /// `PAREN` — `(` or `)`.
    Paren(char),
    /// `ASGN` — the bare `=` used by `LET`.
    Asgn,
    /// Lexeme matched none of the classification rules; rejected wherever
    /// it's consumed.
    Unknown(String),
}

impl Token {
    pub fn is_num(&self) -> bool {
        matches!(self, Token::Num(_))
    }

    pub fn is_resvd(&self, word: &str) -> bool {
        matches!(self, Token::Resvd(w) if w == word)
    }

    /// The raw lexeme text, reconstructed for error messages and for the
    /// persistence bridge's "raw lexeme" fallback case.
    pub fn lexeme(&self) -> String {
        match self {
            Token::Num(n) => crate::value::canonical_number(*n),
            Token::Str(s) => s.clone(),
            Token::Resvd(s) => s.clone(),
            Token::Id(s) => s.clone(),
            Token::Op(s) => s.clone(),
            Token::Paren(c) => c.to_string(),
            Token::Asgn => "=".to_string(),
            Token::Unknown(s) => s.clone(),
        }
    }
}

/// An intermediate token produced by the splitting pass: either already
/// fully classified (`Str`/`Paren`), or a raw lexeme still awaiting
/// classification.
enum Pending {
    Done(Token),
    Tbd(String),
}

/// Tokenizes a single physical source line.
pub fn lex(line: &str) -> Result<Vec<Token>> {
    trace!("lex: {:?}", line);
    let pending = split(line);
    let tokens: Vec<Token> = pending.into_iter().map(classify).collect::<Result<_>>()?;
    trace!("lex produced {:?}", tokens);
    Ok(tokens)
}

/// Splitting pass: whitespace/`"` flush, `(`/`)` self-delimit, quoted
/// spans become `Str` immediately.
fn split(line: &str) -> Vec<Pending> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    // A trailing space guarantees the final accumulated lexeme flushes,
    // mirroring the original scanner's `line + " "` padding.
    for c in line.chars().chain(std::iter::once(' ')) {
        if !in_string && (c == ' ' || c == '\t' || c == '\r' || c == '"') {
            if !current.is_empty() {
                tokens.push(Pending::Tbd(std::mem::take(&mut current)));
            }
            if c == '"' {
                in_string = true;
            }
        } else if in_string && c == '"' {
            tokens.push(Pending::Done(Token::Str(std::mem::take(&mut current))));
            in_string = false;
        } else if c == '(' || c == ')' {
            if !current.is_empty() {
                tokens.push(Pending::Tbd(std::mem::take(&mut current)));
            }
            tokens.push(Pending::Done(Token::Paren(c)));
        } else {
            current.push(c);
        }
    }

    tokens
}

/// Classification pass: first matching rule wins.
fn classify(pending: Pending) -> Result<Token> {
    let lexeme = match pending {
        Pending::Done(token) => {
            trace!("classify: already-done token {:?}", token);
            return Ok(token);
        }
        Pending::Tbd(lexeme) => lexeme,
    };
    trace!("classify: {:?}", lexeme);

    if let Ok(n) = lexeme.parse::<f64>() {
        return Ok(Token::Num(n));
    }

    let upper = lexeme.to_uppercase();
    if RESERVED_WORDS.contains(&upper.as_str()) {
        return Ok(Token::Resvd(upper));
    }

    if let Some(value) = named_constant(&upper) {
        return Ok(Token::Num(value));
    }

    if lexeme == "=" {
        return Ok(Token::Asgn);
    }

    // Math-function exclusion (and the operator-table match below) compare
    // the lexeme in its original case, not uppercased: `SIN` is the unary
    // operator, but `sin` is a perfectly ordinary variable name. This is a
    // quirk of the original interpreter's classification order, preserved
    // here rather than smoothed over.
    if is_valid_identifier(&lexeme) && !MATH_FUNCTIONS.contains(&lexeme.as_str()) {
        return Ok(Token::Id(lexeme));
    }

    if OPERATOR_LEXEMES.contains(&lexeme.as_str()) || MATH_FUNCTIONS.contains(&lexeme.as_str()) {
        return Ok(Token::Op(lexeme));
    }

    Ok(Token::Unknown(lexeme))
}

fn named_constant(upper: &str) -> Option<f64> {
    match upper {
        "PI" => Some(PI),
        "E" => Some(E),
        "TAU" => Some(TAU),
        _ => None,
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*` with an optional trailing `$`.
pub fn is_valid_identifier(token: &str) -> bool {
    let body = token.strip_suffix('$').unwrap_or(token);
    if body.is_empty() {
        return false;
    }
    let mut chars = body.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `true` for a `$`-suffixed (string-typed) identifier, `false` for a
/// number-typed one. Callers must already know `name` passed
/// `is_valid_identifier`.
pub fn is_string_identifier(name: &str) -> bool {
    name.ends_with('$')
}

/// Re-validates a name produced by evaluating a computed `LET`/`INPUT`
/// target before it is used as a variable name.
pub fn validate_identifier(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(BasicError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_let_assignment() {
        let tokens = lex("LET X = 2").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Resvd("LET".to_string()),
                Token::Id("X".to_string()),
                Token::Asgn,
                Token::Num(2.0),
            ]
        );
    }

    #[test]
    fn lexes_string_literal() {
        let tokens = lex("LET A$ = \"foo\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Resvd("LET".to_string()),
                Token::Id("A$".to_string()),
                Token::Asgn,
                Token::Str("foo".to_string()),
            ]
        );
    }

    #[test]
    fn parens_are_self_delimiting() {
        let tokens = lex("(1+2)*3").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Paren('('),
                Token::Num(1.0),
                Token::Op("+".to_string()),
                Token::Num(2.0),
                Token::Paren(')'),
                Token::Op("*".to_string()),
                Token::Num(3.0),
            ]
        );
    }

    #[test]
    fn reserved_words_are_case_insensitive_but_identifiers_are_not() {
        let tokens = lex("let X = x").unwrap();
        assert_eq!(tokens[0], Token::Resvd("LET".to_string()));
        assert_eq!(tokens[1], Token::Id("X".to_string()));
        assert_eq!(tokens[3], Token::Id("x".to_string()));
    }

    #[test]
    fn named_constants_lex_as_numbers() {
        let tokens = lex("PRINT pi").unwrap();
        assert_eq!(tokens[1], Token::Num(std::f64::consts::PI));
    }

    #[test]
    fn uppercase_math_function_is_an_operator() {
        let tokens = lex("PRINT SIN 0").unwrap();
        assert_eq!(tokens[1], Token::Op("SIN".to_string()));
    }

    #[test]
    fn lowercase_math_function_name_is_an_ordinary_identifier() {
        let tokens = lex("LET sin = 1").unwrap();
        assert_eq!(tokens[1], Token::Id("sin".to_string()));
    }

    #[test]
    fn unclassifiable_lexeme_is_unknown() {
        let tokens = lex("@").unwrap();
        assert_eq!(tokens, vec![Token::Unknown("@".to_string())]);
    }
}
