//! Textual program persistence — the `SAVE`/`LOAD` bridge.
//!
//! The on-disk format is deliberately just the lexer's own output
//! serialized back to text: one program line per textual line, line
//! number first, tokens space-separated. `LOAD` is implemented in terms
//! of the same `lex` the REPL uses for ordinary input, so the format is
//! exactly "what you'd type back in", not a separate encoding.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BasicError, Result};
use crate::lexer::{self, Token};
use crate::value::canonical_number;

fn serialize_token(token: &Token) -> String {
    match token {
        Token::Str(s) => format!("\"{}\"", s),
        Token::Num(n) => canonical_number(*n),
        other => other.lexeme(),
    }
}

fn format_line(line: u32, tokens: &[Token]) -> String {
    let body = tokens
        .iter()
        .map(serialize_token)
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", line, body)
}

/// Renders the full program listing, ascending by line number — shared
/// by `LIST` and `SAVE`.
pub fn format_program(program: &BTreeMap<u32, Vec<Token>>) -> String {
    program
        .iter()
        .map(|(line, tokens)| format_line(*line, tokens))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A bare filename with no `.` gets `.tb` appended.
pub fn normalize_filename(name: &str) -> PathBuf {
    if name.contains('.') {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.tb", name))
    }
}

pub fn save_to_path(program: &BTreeMap<u32, Vec<Token>>, path: &Path) -> Result<()> {
    let mut contents = format_program(program);
    contents.push('\n');
    fs::write(path, contents)?;
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<BTreeMap<u32, Vec<Token>>> {
    if !path.exists() {
        return Err(BasicError::FileNotFound(path.display().to_string()));
    }
    let text = fs::read_to_string(path)?;
    let mut program = BTreeMap::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let tokens = lexer::lex(line)?;
        let (head, body) = tokens
            .split_first()
            .ok_or(BasicError::LineNumberExpected)?;
        let line_no = match head {
            Token::Num(n) if n.fract() == 0.0 && *n > 0.0 => *n as u32,
            _ => return Err(BasicError::LineNumberExpected),
        };
        if !body.is_empty() {
            program.insert(line_no, body.to_vec());
        }
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_program() {
        let mut program = BTreeMap::new();
        program.insert(10, lexer::lex("LET X = 2").unwrap());
        program.insert(20, lexer::lex("PRINT X").unwrap());

        let dir = std::env::temp_dir().join(format!(
            "tinybasic-persistence-test-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prog.tb");

        save_to_path(&program, &path).unwrap();
        let reloaded = load_from_path(&path).unwrap();
        assert_eq!(reloaded, program);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn normalize_filename_appends_tb_extension() {
        assert_eq!(normalize_filename("prog"), PathBuf::from("prog.tb"));
        assert_eq!(normalize_filename("prog.bas"), PathBuf::from("prog.bas"));
    }

    #[test]
    fn load_missing_file_fails() {
        let err = load_from_path(Path::new("/nonexistent/does-not-exist.tb")).unwrap_err();
        assert_eq!(err.kind(), "file-not-found");
    }
}
