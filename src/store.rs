//! Interpreter state: variable scopes, the register file, and the stored
//! program buffer.
//!
//! None of this lives in module-level statics. Every piece of mutable
//! state an executing program can touch is reachable from a single
//! `Store`, which the interpreter owns and threads through statement
//! dispatch by `&mut` reference.

use std::collections::{BTreeMap, HashMap};

use crate::error::{BasicError, Result};
use crate::lexer::Token;
use crate::value::Value;

/// One variable scope: the globals, or the locals pushed by a `GOSUB`.
/// Named after the teacher's original pixel-buffer `Frame` — same word,
/// unrelated meaning here.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    vars: HashMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Frame {
            vars: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

/// The three single-letter scratch registers every Tiny BASIC program
/// shares: `A`, `S`, `T`. Distinct from ordinary variables — `STA`/`LDA`
/// and friends address these directly and never go through a `Frame`.
#[derive(Debug, Clone, Default)]
pub struct Registers {
    pub a: f64,
    pub s: f64,
    pub t: f64,
}

impl Registers {
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "A" => Some(self.a),
            "S" => Some(self.s),
            "T" => Some(self.t),
            _ => None,
        }
    }

    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match name {
            "A" => self.a = value,
            "S" => self.s = value,
            "T" => self.t = value,
            _ => return false,
        }
        true
    }
}

/// All interpreter state bundled together: no globals, no statics.
pub struct Store {
    /// Scope stack. `scopes[0]` is the top-level/global scope; a `GOSUB`
    /// pushes a fresh one, `RETURN` pops it.
    scopes: Vec<Frame>,
    /// Line numbers `GOSUB` must return to, one per outstanding call.
    pub return_stack: Vec<u32>,
    pub registers: Registers,
    /// The stored program: line number to its already-lexed tokens.
    /// A `BTreeMap` gives ascending-order iteration for `RUN`/`LIST`/`SAVE`
    /// for free, which is why this is a stronger choice than the
    /// dict-plus-cached-max-line the original interpreter used.
    pub program: BTreeMap<u32, Vec<Token>>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            scopes: vec![Frame::new()],
            return_stack: Vec::new(),
            registers: Registers::default(),
            program: BTreeMap::new(),
        }
    }

    pub fn current_frame(&self) -> &Frame {
        self.scopes.last().expect("scope stack is never empty")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Frame::new());
    }

    /// Writes `value` into the top scope under `name`, enforcing that the
    /// trailing-`$` type marker on `name` agrees with `value`'s tag.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        let wants_text = crate::lexer::is_string_identifier(name);
        let is_text = matches!(value, Value::Text(_));
        if wants_text != is_text {
            return Err(BasicError::VariableTypeMismatch(name.to_string()));
        }
        self.current_frame_mut().set(name, value);
        Ok(())
    }

    pub fn pop_scope(&mut self) -> Result<()> {
        if self.scopes.len() <= 1 {
            return Err(BasicError::NotInSubroutine);
        }
        self.scopes.pop();
        Ok(())
    }

    /// Clears variables, registers, the return stack, and the stored
    /// program — what `CLEAR`/a fresh `RUN` start from.
    pub fn reset_runtime(&mut self) {
        self.scopes = vec![Frame::new()];
        self.return_stack.clear();
        self.registers = Registers::default();
    }

    pub fn max_line(&self) -> Option<u32> {
        self.program.keys().next_back().copied()
    }

    pub fn next_line_after(&self, line: u32) -> Option<u32> {
        self.program
            .range((std::ops::Bound::Excluded(line), std::ops::Bound::Unbounded))
            .next()
            .map(|(&n, _)| n)
    }
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrips_a_variable() {
        let mut frame = Frame::new();
        frame.set("X", Value::Number(3.0));
        assert_eq!(frame.get("X"), Some(&Value::Number(3.0)));
        assert_eq!(frame.get("Y"), None);
    }

    #[test]
    fn scope_stack_starts_with_one_frame_and_rejects_an_extra_pop() {
        let mut store = Store::new();
        assert!(store.pop_scope().is_err());
        store.push_scope();
        assert!(store.pop_scope().is_ok());
        assert!(store.pop_scope().is_err());
    }

    #[test]
    fn registers_are_distinct_from_variables() {
        let mut store = Store::new();
        store.registers.set("A", 5.0);
        assert_eq!(store.registers.get("A"), Some(5.0));
        assert_eq!(store.current_frame().get("A"), None);
    }

    #[test]
    fn next_line_after_skips_to_the_next_stored_line() {
        let mut store = Store::new();
        store.program.insert(10, Vec::new());
        store.program.insert(30, Vec::new());
        assert_eq!(store.next_line_after(10), Some(30));
        assert_eq!(store.next_line_after(30), None);
    }
}
