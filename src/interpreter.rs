//! Statement dispatch and the control-flow engine.
//!
//! Everything the interpreter can do to a line of tokens — store it,
//! run it immediately, or feed it to `RUN` — goes through `Interpreter`.
//! There is exactly one mutable-state owner in the whole crate: this
//! struct, generic over the reader/writer it talks to so tests can swap
//! in an in-memory buffer instead of a real terminal.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

use log::{debug, trace};

use crate::error::{BasicError, Result};
use crate::eval::{self, display};
use crate::lexer::{self, Token};
use crate::persistence;
use crate::store::Store;
use crate::value::Value;

pub struct Interpreter<R: BufRead, W: Write> {
    store: Store,
    input: R,
    output: W,
    line_pointer: u32,
    stop_execution: bool,
    /// Whether the REPL should print the `OK.` prompt before the next
    /// read — suppressed for one turn right after a stored-line
    /// assignment (see §6).
    pub print_ready: bool,
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Interpreter {
            store: Store::new(),
            input,
            output,
            line_pointer: 0,
            stop_execution: false,
            print_ready: true,
        }
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn program_len(&self) -> usize {
        self.store.program.len()
    }

    /// Lexes and executes one line of interactive (or scripted, non
    /// line-numbered) input. Line-numbered input is stored, not
    /// executed.
    pub fn execute_line(&mut self, line: &str) -> Result<()> {
        self.stop_execution = false;
        let tokens = lexer::lex(line)?;
        trace!("lexed {} tokens from {:?}", tokens.len(), line);
        if tokens.is_empty() {
            return Ok(());
        }

        if let Token::Num(n) = &tokens[0] {
            self.store_program_line(*n, tokens[1..].to_vec())?;
            self.print_ready = false;
            return Ok(());
        }

        self.print_ready = true;
        self.dispatch(&tokens)
    }

    fn store_program_line(&mut self, line_no: f64, body: Vec<Token>) -> Result<()> {
        let line_no = line_no as u32;
        if body.is_empty() {
            self.store.program.remove(&line_no);
        } else {
            self.store.program.insert(line_no, body);
        }
        Ok(())
    }

    /// Prints `Error: <kind> <detail>.`, the one-shot diagnostic shape
    /// every caught error renders as.
    pub fn print_error(&mut self, err: &BasicError) -> Result<()> {
        writeln!(self.output, "Error: {} {}.", err.kind(), err)?;
        Ok(())
    }

    fn dispatch(&mut self, tokens: &[Token]) -> Result<()> {
        let (head, tail) = tokens
            .split_first()
            .expect("dispatch is never called with an empty token list");
        let word = match head {
            Token::Resvd(w) => w.clone(),
            other => return Err(BasicError::UnknownCommand(other.lexeme())),
        };
        debug!("dispatch {} ({} tail tokens)", word, tail.len());

        match word.as_str() {
            "REM" | "SLEEP" | "READ" | "WRITE" | "APPEND" => Ok(()),
            "CLS" => {
                for _ in 0..500 {
                    writeln!(self.output)?;
                }
                Ok(())
            }
            "END" => {
                self.stop_execution = true;
                Ok(())
            }
            "EXIT" => Err(BasicError::Exit),
            "CLEAR" => {
                self.store.program.clear();
                self.store.reset_runtime();
                Ok(())
            }
            "DIR" => self.handle_dir(),
            "LIST" => self.handle_list(),
            "PRINT" => self.handle_print(tail),
            "LET" => self.handle_let(tail),
            "INPUT" => self.handle_input(tail),
            "GOTO" => self.handle_goto(tail),
            "GOSUB" => self.handle_gosub(tail),
            "RETURN" => self.handle_return(tail),
            "IF" => self.handle_if(tail),
            "FOR" => self.handle_for(tail),
            "SAVE" => self.handle_save(tail),
            "LOAD" => self.handle_load(tail),
            "RUN" => self.run(),
            "STA" => self.handle_store_register("A", tail),
            "STS" => self.handle_store_register("S", tail),
            "STT" => self.handle_store_register("T", tail),
            "LDA" => self.handle_load_register("A", tail),
            "LDS" => self.handle_load_register("S", tail),
            "LDT" => self.handle_load_register("T", tail),
            _ => Err(BasicError::UnknownCommand(word)),
        }
    }

    fn resolve_target_name(&self, tokens: &[Token]) -> Result<String> {
        let name = if let [Token::Id(name)] = tokens {
            name.clone()
        } else {
            if tokens.is_empty() {
                return Err(BasicError::MalformedStatement(
                    "expected a variable name".to_string(),
                ));
            }
            let value = eval::eval(tokens, 0, self.store.current_frame())?;
            display(&value)
        };
        lexer::validate_identifier(&name)?;
        Ok(name)
    }

    fn handle_print(&mut self, tail: &[Token]) -> Result<()> {
        if tail.is_empty() {
            writeln!(self.output)?;
            return Ok(());
        }
        let value = eval::eval(tail, 0, self.store.current_frame())?;
        writeln!(self.output, "{}", display(&value))?;
        Ok(())
    }

    fn handle_let(&mut self, tail: &[Token]) -> Result<()> {
        let asgn_idx = tail
            .iter()
            .position(|t| matches!(t, Token::Asgn))
            .ok_or_else(|| BasicError::MalformedStatement("LET requires '='".to_string()))?;
        let target_tokens = &tail[..asgn_idx];
        let expr_tokens = &tail[asgn_idx + 1..];
        if expr_tokens.is_empty() {
            return Err(BasicError::MalformedStatement(
                "LET requires an expression after '='".to_string(),
            ));
        }
        let name = self.resolve_target_name(target_tokens)?;
        let value = eval::eval(expr_tokens, 0, self.store.current_frame())?;
        self.store.assign(&name, value)
    }

    fn handle_input(&mut self, tail: &[Token]) -> Result<()> {
        let name = self.resolve_target_name(tail)?;
        let is_text = lexer::is_string_identifier(&name);
        loop {
            write!(self.output, "? ")?;
            self.output.flush()?;
            let mut line = String::new();
            self.input.read_line(&mut line)?;
            let line = line.trim_end_matches(['\n', '\r']);
            if is_text {
                self.store.assign(&name, Value::Text(line.to_string()))?;
                return Ok(());
            }
            match line.trim().parse::<f64>() {
                Ok(n) => {
                    self.store.assign(&name, Value::Number(n))?;
                    return Ok(());
                }
                Err(_) => continue,
            }
        }
    }

    fn handle_goto(&mut self, tail: &[Token]) -> Result<()> {
        self.line_pointer = self.target_line(tail)?;
        Ok(())
    }

    fn handle_gosub(&mut self, tail: &[Token]) -> Result<()> {
        let target = self.target_line(tail)?;
        self.store.return_stack.push(self.line_pointer);
        self.store.push_scope();
        self.line_pointer = target;
        Ok(())
    }

    fn handle_return(&mut self, tail: &[Token]) -> Result<()> {
        if !tail.is_empty() {
            return Err(BasicError::MalformedStatement(
                "invalid RETURN command".to_string(),
            ));
        }
        let target = self
            .store
            .return_stack
            .pop()
            .ok_or(BasicError::NotInSubroutine)?;
        self.store.pop_scope()?;
        self.line_pointer = target;
        Ok(())
    }

    fn target_line(&self, tail: &[Token]) -> Result<u32> {
        let value = eval::eval(tail, 0, self.store.current_frame())?;
        let n = value.as_number().ok_or(BasicError::LineNumberExpected)?;
        let target = n as i64;
        if target < 1 {
            return Err(BasicError::LineNumberExpected);
        }
        Ok((target - 1) as u32)
    }

    fn handle_if(&mut self, tail: &[Token]) -> Result<()> {
        let then_idx = tail.iter().position(|t| t.is_resvd("THEN"));
        let else_idx = tail.iter().position(|t| t.is_resvd("ELSE"));

        let then_idx = match (then_idx, else_idx) {
            (Some(t), Some(e)) if e < t => {
                return Err(BasicError::MalformedStatement("malformed IF".to_string()))
            }
            (Some(t), _) => t,
            (None, _) => return Err(BasicError::MalformedStatement("malformed IF".to_string())),
        };

        let cond_tokens = &tail[..then_idx];
        let true_branch = &tail[then_idx + 1..else_idx.unwrap_or(tail.len())];
        let false_branch = else_idx.map(|idx| &tail[idx + 1..]);

        let cond = eval::eval(cond_tokens, 0, self.store.current_frame())?;
        if cond.is_truthy() {
            if true_branch.is_empty() {
                return Err(BasicError::MalformedStatement(
                    "empty IF branch".to_string(),
                ));
            }
            self.dispatch(true_branch)
        } else if let Some(false_branch) = false_branch {
            if false_branch.is_empty() {
                return Err(BasicError::MalformedStatement(
                    "empty IF branch".to_string(),
                ));
            }
            self.dispatch(false_branch)
        } else {
            Ok(())
        }
    }

    fn handle_for(&mut self, tail: &[Token]) -> Result<()> {
        let to_idx = tail.iter().position(|t| t.is_resvd("TO"));
        let do_idx = tail.iter().position(|t| t.is_resvd("DO"));
        let (to_idx, do_idx) = match (to_idx, do_idx) {
            (Some(t), Some(d)) if t < d && t > 0 => (t, d),
            _ => return Err(BasicError::MalformedStatement("malformed FOR".to_string())),
        };

        let start_idx = to_idx - 1;
        if !tail[start_idx].is_num() {
            return Err(BasicError::MalformedStatement(
                "FOR requires a numeric literal start value".to_string(),
            ));
        }

        let id_name = match &tail[0] {
            Token::Id(name) => name.clone(),
            _ => return Err(BasicError::MalformedStatement("malformed FOR".to_string())),
        };

        let end_tokens = &tail[to_idx + 1..do_idx];
        let body = &tail[do_idx + 1..];
        if body.is_empty() {
            return Err(BasicError::MalformedStatement(
                "empty FOR body".to_string(),
            ));
        }

        let end = eval::eval(end_tokens, 0, self.store.current_frame())?
            .as_number()
            .ok_or_else(|| {
                BasicError::OperandTypeMismatch("FOR bound must be numeric".to_string())
            })?;

        let snapshot = self.store.current_frame().clone();
        let mut let_tail = tail[..to_idx].to_vec();
        self.handle_let(&let_tail)?;

        loop {
            let current = self
                .store
                .current_frame()
                .get(&id_name)
                .and_then(Value::as_number)
                .ok_or_else(|| BasicError::VariableUninitialized(id_name.clone()))?;
            if current > end {
                break;
            }

            self.dispatch(body)?;
            if self.stop_execution {
                break;
            }

            if let Token::Num(n) = &mut let_tail[start_idx] {
                *n += 1.0;
            }
            self.handle_let(&let_tail)?;
        }

        *self.store.current_frame_mut() = snapshot;
        Ok(())
    }

    fn handle_store_register(&mut self, register: &str, tail: &[Token]) -> Result<()> {
        let value = eval::eval(tail, 0, self.store.current_frame())?;
        let n = value.as_number().ok_or_else(|| {
            BasicError::OperandTypeMismatch(format!("{} requires a numeric value", register))
        })?;
        self.store.registers.set(register, n);
        Ok(())
    }

    fn handle_load_register(&mut self, register: &str, tail: &[Token]) -> Result<()> {
        let name = self.resolve_target_name(tail)?;
        if lexer::is_string_identifier(&name) {
            return Err(BasicError::VariableTypeMismatch(name));
        }
        let n = self
            .store
            .registers
            .get(register)
            .expect("register name is one of A/S/T");
        self.store.assign(&name, Value::Number(n))
    }

    fn handle_dir(&mut self) -> Result<()> {
        let snapshot: BTreeMap<String, Value> = self
            .store
            .current_frame()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in snapshot {
            writeln!(self.output, "{} = {}", name, display(&value))?;
        }
        Ok(())
    }

    fn handle_list(&mut self) -> Result<()> {
        let listing = persistence::format_program(&self.store.program);
        if !listing.is_empty() {
            writeln!(self.output, "{}", listing)?;
        }
        Ok(())
    }

    fn handle_save(&mut self, tail: &[Token]) -> Result<()> {
        let name = match tail {
            [Token::Str(name)] => name.clone(),
            _ => return Err(BasicError::InvalidFilename),
        };
        let path = persistence::normalize_filename(&name);
        if path.exists() {
            write!(self.output, "file exists, overwrite? y/n ")?;
            self.output.flush()?;
            let mut answer = String::new();
            self.input.read_line(&mut answer)?;
            if !answer.trim().eq_ignore_ascii_case("y") {
                return Ok(());
            }
        }
        persistence::save_to_path(&self.store.program, &path)
    }

    fn handle_load(&mut self, tail: &[Token]) -> Result<()> {
        let name = match tail {
            [Token::Str(name)] => name.clone(),
            _ => return Err(BasicError::InvalidFilename),
        };
        let path = persistence::normalize_filename(&name);
        self.store.program = persistence::load_from_path(&path)?;
        Ok(())
    }

    /// Loads a program from `path` directly, bypassing `.tb`-extension
    /// normalization — used by the non-interactive CLI entry point,
    /// which takes the file path exactly as given on the command line.
    pub fn load_script(&mut self, path: &Path) -> Result<()> {
        self.store.program = persistence::load_from_path(path)?;
        Ok(())
    }

    /// Executes the stored program from line 0 in ascending order,
    /// honoring `GOTO`/`GOSUB` jumps via `line_pointer` mutation.
    pub fn run(&mut self) -> Result<()> {
        self.store.reset_runtime();
        self.line_pointer = 0;

        let max_line = self.store.max_line().unwrap_or(0);
        while self.line_pointer <= max_line {
            if let Some(tokens) = self.store.program.get(&self.line_pointer).cloned() {
                trace!("RUN at line {}", self.line_pointer);
                self.stop_execution = false;
                match self.dispatch(&tokens) {
                    Ok(()) => {}
                    Err(BasicError::Exit) => return Err(BasicError::Exit),
                    Err(err) => {
                        self.print_error(&err)?;
                        self.stop_execution = true;
                    }
                }
                if self.stop_execution {
                    self.stop_execution = false;
                    break;
                }
            }
            self.line_pointer += 1;
        }

        self.store.reset_runtime();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_interpreter(input: &str) -> Interpreter<Cursor<Vec<u8>>, Vec<u8>> {
        Interpreter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn run_program(lines: &[&str]) -> String {
        let mut interp = new_interpreter("");
        for line in lines {
            interp.execute_line(line).unwrap();
        }
        interp.execute_line("RUN").unwrap();
        String::from_utf8(interp.output_mut().clone()).unwrap()
    }

    #[test]
    fn power_expression() {
        let out = run_program(&["10 LET X = 2", "20 LET Y = X ^ 10", "30 PRINT Y"]);
        assert_eq!(out.trim(), "1024");
    }

    #[test]
    fn string_concatenation_variable() {
        let mut interp = new_interpreter("");
        interp.execute_line("LET A$ = \"foo\"").unwrap();
        interp.execute_line("LET B$ = A$ . 1").unwrap();
        interp.execute_line("PRINT B$").unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert_eq!(out.trim(), "foo1");
    }

    #[test]
    fn for_loop_accumulates_and_restores_scope() {
        let out = run_program(&[
            "10 LET S = 0",
            "20 FOR I = 1 TO 5 DO LET S = S + I",
            "30 PRINT S",
        ]);
        assert_eq!(out.trim(), "15");

        let mut interp = new_interpreter("");
        for line in [
            "10 LET S = 0",
            "20 FOR I = 1 TO 5 DO LET S = S + I",
            "30 PRINT S",
        ] {
            interp.execute_line(line).unwrap();
        }
        interp.execute_line("RUN").unwrap();
        interp.execute_line("DIR").unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert!(!out.contains("I ="));
    }

    #[test]
    fn gosub_and_return() {
        let out = run_program(&[
            "10 GOSUB 100",
            "20 PRINT \"back\"",
            "30 END",
            "100 PRINT \"sub\"",
            "110 RETURN",
        ]);
        assert_eq!(out.trim(), "sub\nback");
    }

    #[test]
    fn if_then_else() {
        let mut interp = new_interpreter("");
        interp.execute_line("LET X = 5").unwrap();
        interp
            .execute_line("IF X > 1 THEN PRINT \"big\" ELSE PRINT \"small\"")
            .unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert_eq!(out.trim(), "big");
    }

    #[test]
    fn registers_round_trip_through_variable() {
        let mut interp = new_interpreter("");
        interp.execute_line("STA 5").unwrap();
        interp.execute_line("LDA X").unwrap();
        interp.execute_line("PRINT X").unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert_eq!(out.trim(), "5");
    }

    #[test]
    fn goto_skips_a_line() {
        let out = run_program(&[
            "10 GOTO 30",
            "20 PRINT \"skipped\"",
            "30 PRINT \"landed\"",
        ]);
        assert_eq!(out.trim(), "landed");
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut interp = new_interpreter("");
        let err = interp.execute_line("FROBNICATE").unwrap_err();
        assert_eq!(err.kind(), "unknown-command");
    }

    #[test]
    fn return_without_gosub_fails() {
        let mut interp = new_interpreter("");
        let err = interp.execute_line("RETURN").unwrap_err();
        assert_eq!(err.kind(), "not-in-subroutine");
    }

    #[test]
    fn return_with_trailing_tokens_is_malformed() {
        let mut interp = new_interpreter("");
        interp.execute_line("10 GOSUB 100").unwrap();
        interp.execute_line("100 RETURN X Y Z").unwrap();
        interp.execute_line("RUN").unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert!(out.contains("malformed-statement"));
    }

    #[test]
    fn save_prompts_before_overwriting_an_existing_file() {
        let dir = std::env::temp_dir().join(format!(
            "tinybasic-save-overwrite-test-{}-{}",
            std::process::id(),
            line!()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prog.tb");
        std::fs::write(&path, "10 PRINT 1\n").unwrap();
        let save_cmd = format!("SAVE \"{}\"", path.display());

        // Declining leaves the original file untouched.
        let mut interp = new_interpreter("n\n");
        interp.execute_line("10 PRINT 2").unwrap();
        interp.execute_line(&save_cmd).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10 PRINT 1\n");

        // Accepting overwrites it.
        let mut interp = new_interpreter("y\n");
        interp.execute_line("10 PRINT 2").unwrap();
        interp.execute_line(&save_cmd).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10 PRINT 2\n");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn input_retries_on_unparseable_number() {
        let mut interp = new_interpreter("not-a-number\n42\n");
        interp.execute_line("INPUT X").unwrap();
        interp.execute_line("PRINT X").unwrap();
        let out = String::from_utf8(interp.output_mut().clone()).unwrap();
        assert_eq!(out.trim_end(), "? ? \n42");
    }
}
