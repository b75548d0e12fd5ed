//! Tiny BASIC — an interactive interpreter for a line-numbered BASIC
//! dialect with numeric and string variables, arithmetic and logical
//! expressions, and control flow (conditionals, loops, subroutines).
//!
//! ## Architecture overview
//!
//! - **lexer**: tokenizes a single physical line into a typed token list.
//! - **eval**: a precedence-ordered recursive descent directly over a
//!   flat token slice — there is no statement or expression AST.
//! - **store**: variable scopes, the register file, and the program
//!   buffer.
//! - **interpreter**: statement dispatch and the control-flow engine
//!   (`RUN`, `GOTO`, `GOSUB`/`RETURN`, `FOR`, `IF`/`THEN`/`ELSE`).
//! - **persistence**: the `SAVE`/`LOAD` textual program format.
//! - **error**: the single `BasicError` type every component returns.
//!
//! Run with no arguments to start the interactive REPL, or pass a
//! `.tb` script path to load and run it non-interactively.

mod error;
mod eval;
mod interpreter;
mod lexer;
mod persistence;
mod store;
mod value;

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::LevelFilter;

use error::BasicError;
use interpreter::Interpreter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHOR: &str = "the tinybasic project";

thread_local! {
    /// Set by the panic hook installed in `main`, read back by whichever
    /// `catch_unwind` boundary just caught the unwind. Carries the
    /// `<location>: [panic] <detail>` half of the §6 "Execution halted"
    /// diagnostic, since `PanicHookInfo` itself isn't available once
    /// `catch_unwind` has already returned.
    static LAST_PANIC: RefCell<Option<String>> = RefCell::new(None);
}

fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown>".to_string());
        let detail = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        LAST_PANIC.with(|cell| {
            *cell.borrow_mut() = Some(format!("{}: [panic] {}", location, detail));
        });
    }));
}

/// Renders the mandated `Execution halted:\n<location>: [<error-class>]
/// <detail>` diagnostic for a caught panic, i.e. a failure no `BasicError`
/// variant modeled — the REPL/script runner prints this and keeps going.
fn execution_halted_message() -> String {
    let detail = LAST_PANIC
        .with(|cell| cell.borrow_mut().take())
        .unwrap_or_else(|| "<unknown>: [panic] unknown panic".to_string());
    format!("Execution halted:\n{}", detail)
}

/// Tiny BASIC: an interactive interpreter for a line-numbered BASIC dialect.
#[derive(Parser, Debug)]
#[command(name = "tinybasic", version = VERSION)]
struct Cli {
    /// A `.tb` program to load and run non-interactively. Omit to start
    /// the interactive REPL.
    file: Option<PathBuf>,

    /// Raise the log level (repeatable: -v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    install_panic_hook();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut interp = Interpreter::new(stdin.lock(), stdout.lock());

    match cli.file {
        Some(path) => run_script(&mut interp, &path),
        None => run_repl(&mut interp),
    }
}

fn run_script(interp: &mut Interpreter<io::StdinLock, io::StdoutLock>, path: &PathBuf) -> ExitCode {
    if let Err(err) = interp.load_script(path) {
        eprintln!("{}", format!("Error: {} {}.", err.kind(), err).red());
        return ExitCode::FAILURE;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| interp.run())) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(BasicError::Exit)) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            eprintln!("{}", format!("Error: {} {}.", err.kind(), err).red());
            ExitCode::FAILURE
        }
        Err(_) => {
            eprintln!("{}", execution_halted_message().red());
            ExitCode::FAILURE
        }
    }
}

fn run_repl(interp: &mut Interpreter<io::StdinLock, io::StdoutLock>) -> ExitCode {
    println!("Tiny BASIC version {}\nby {}", VERSION, AUTHOR);

    let stdin = io::stdin();
    loop {
        if interp.print_ready {
            print!("OK.\n> ");
            if io::stdout().flush().is_err() {
                return ExitCode::FAILURE;
            }
        }

        let mut line = String::new();
        let bytes_read = match stdin.lock().read_line(&mut line) {
            Ok(n) => n,
            Err(_) => {
                // A Ctrl-C during the read aborts only this read.
                continue;
            }
        };

        if bytes_read == 0 {
            println!("Bye!");
            return ExitCode::SUCCESS;
        }

        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| interp.execute_line(line))) {
            Ok(Ok(())) => {}
            Ok(Err(BasicError::Exit)) => {
                println!("Bye!");
                return ExitCode::SUCCESS;
            }
            Ok(Err(err)) => {
                println!("{}", format!("Error: {} {}.", err.kind(), err).red());
            }
            Err(_) => {
                println!("{}", execution_halted_message().red());
            }
        }
    }
}
