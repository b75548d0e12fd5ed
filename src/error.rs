//! Error handling for the Tiny BASIC interpreter.
//!
//! One enum covers every failure the lexer, evaluator, store, and statement
//! dispatcher can produce, each variant carrying the detail text needed to
//! render the `Error: <kind> <detail>.` diagnostic shape the REPL prints.
//!
//! Errors never print themselves. They propagate as `Result<T, BasicError>`
//! through any number of recursive evaluator calls and are rendered exactly
//! once, at the statement-dispatch boundary that caught them.

use std::error::Error;
use std::fmt;

/// Every failure kind a Tiny BASIC program can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicError {
    /// First token of a command line was neither a line number nor a
    /// recognized reserved word.
    UnknownCommand(String),

    /// `IF`, `FOR`, `LET`, or `RETURN` syntax was malformed: missing
    /// `THEN`/`TO`/`DO`, an empty selected branch, a missing `=`, and so on.
    MalformedStatement(String),

    /// A token in an expression was not one of `OP`, `NUM`, `STRING`, `ID`,
    /// `PAREN`.
    UnknownOperand(String),

    /// A `(` had no matching `)` within the token slice.
    UnmatchedParentheses,

    /// An operator or math function was applied to a missing operand.
    OperatorMissingOperand(String),

    /// An operator required operands of a type it didn't receive: a shift
    /// on non-integral numbers, arithmetic on a string, etc.
    OperandTypeMismatch(String),

    /// An identifier was read before ever being assigned in the top scope.
    VariableUninitialized(String),

    /// A value assigned to a variable didn't match the variable's
    /// `$`-suffix type marker.
    VariableTypeMismatch(String),

    /// `GOTO`/`GOSUB` target expression did not evaluate to a number.
    LineNumberExpected,

    /// A computed or typed-out variable name failed identifier validation.
    InvalidIdentifier(String),

    /// `SAVE`/`LOAD` argument was not a single string literal.
    InvalidFilename,

    /// `LOAD` named a file that doesn't exist.
    FileNotFound(String),

    /// `RETURN` with an empty return stack.
    NotInSubroutine,

    /// Underlying I/O failure during `SAVE`/`LOAD`.
    Io(String),

    /// `EXIT` was executed; the caller should terminate the process.
    Exit,
}

impl BasicError {
    /// The stable `<kind>` tag from the §7 error-kind table, used as the
    /// first word of the rendered diagnostic.
    pub fn kind(&self) -> &'static str {
        match self {
            BasicError::UnknownCommand(_) => "unknown-command",
            BasicError::MalformedStatement(_) => "malformed-statement",
            BasicError::UnknownOperand(_) => "unknown-operand",
            BasicError::UnmatchedParentheses => "unmatched-parentheses",
            BasicError::OperatorMissingOperand(_) => "operator-missing-operand",
            BasicError::OperandTypeMismatch(_) => "operand-type-mismatch",
            BasicError::VariableUninitialized(_) => "variable-uninitialized",
            BasicError::VariableTypeMismatch(_) => "variable-type-mismatch",
            BasicError::LineNumberExpected => "line-number-expected",
            BasicError::InvalidIdentifier(_) => "invalid-identifier",
            BasicError::InvalidFilename => "invalid-filename",
            BasicError::FileNotFound(_) => "file-not-found",
            BasicError::NotInSubroutine => "not-in-subroutine",
            BasicError::Io(_) => "io-error",
            BasicError::Exit => "exit",
        }
    }
}

impl fmt::Display for BasicError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BasicError::UnknownCommand(tok) => write!(f, "Unknown command {}", tok),
            BasicError::MalformedStatement(detail) => write!(f, "{}", detail),
            BasicError::UnknownOperand(tok) => write!(f, "Unknown operand {}", tok),
            BasicError::UnmatchedParentheses => write!(f, "Unmatched parentheses"),
            BasicError::OperatorMissingOperand(op) => write!(f, "{} expects an operand", op),
            BasicError::OperandTypeMismatch(detail) => write!(f, "{}", detail),
            BasicError::VariableUninitialized(name) => {
                write!(f, "Variable {} not initialized", name)
            }
            BasicError::VariableTypeMismatch(name) => write!(f, "Variable {} type mismatch", name),
            BasicError::LineNumberExpected => write!(f, "Line number expected"),
            BasicError::InvalidIdentifier(tok) => write!(f, "{} is not a valid identifier", tok),
            BasicError::InvalidFilename => write!(f, "Invalid filename"),
            BasicError::FileNotFound(name) => write!(f, "File not found: {}", name),
            BasicError::NotInSubroutine => write!(f, "Not in a subroutine"),
            BasicError::Io(detail) => write!(f, "{}", detail),
            BasicError::Exit => write!(f, "exit"),
        }
    }
}

impl Error for BasicError {}

impl From<std::io::Error> for BasicError {
    fn from(err: std::io::Error) -> Self {
        BasicError::Io(err.to_string())
    }
}

/// Convenience alias used throughout the interpreter.
pub type Result<T> = std::result::Result<T, BasicError>;
