//! A command line host for `boa_eval`.
//!
//! Evaluates files and snippets in one engine, optionally calls a global
//! function, and can expose the engine to a remote debugger client over TCP.
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(unused_crate_dependencies))]

mod debug;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boa_eval::{Engine, Runtime, RuntimeOptions};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use log::LevelFilter;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use simple_logger::SimpleLogger;

/// CLI configuration for `boa-eval`.
#[derive(Debug, Parser)]
#[command(author, version, about, name = "boa-eval")]
struct Opt {
    /// The JavaScript file(s) to be evaluated, in order.
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    files: Vec<PathBuf>,

    /// Evaluate a snippet after the files.
    #[arg(long, short = 'e', value_name = "SOURCE")]
    eval: Option<String>,

    /// Call a global function after evaluation.
    #[arg(long, value_name = "FUNC")]
    call: Option<String>,

    /// Arguments of `--call`, as a JSON array.
    #[arg(long, value_name = "JSON", default_value = "[]")]
    args: String,

    /// Start the debugger server on this port, 0 for an ephemeral one.
    #[arg(long, value_name = "PORT")]
    debug_port: Option<u16>,

    /// Don't install the `console` global.
    #[arg(long)]
    no_console: bool,

    /// Log level of the engine and debugger server.
    #[arg(long, value_name = "LEVEL", env = "BOA_EVAL_LOG", default_value = "warn")]
    log_level: LevelFilter,
}

impl Opt {
    fn is_interactive(&self) -> bool {
        self.files.is_empty() && self.eval.is_none() && self.call.is_none()
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Opt::parse();
    SimpleLogger::new()
        .with_level(args.log_level)
        .init()
        .wrap_err("failed to install the logger")?;

    let runtime = Runtime::new(RuntimeOptions {
        console: !args.no_console,
        ..RuntimeOptions::default()
    });
    let engine = Arc::new(runtime.create_engine()?);

    let _debugger = args
        .debug_port
        .map(|port| debug::start(&engine, port))
        .transpose()?;

    for file in &args.files {
        let result = eval_file(&engine, file)?;
        println!("{result}");
    }

    if let Some(source) = &args.eval {
        println!("{}", engine.eval(source)?);
    }

    if let Some(function) = &args.call {
        println!("{}", engine.call(function, &args.args)?);
    }

    if args.is_interactive() {
        repl(&engine)?;
    }

    Ok(())
}

fn eval_file(engine: &Engine, path: &Path) -> Result<String> {
    let source = fs::read_to_string(path)
        .wrap_err_with(|| format!("could not read {}", path.display()))?;
    engine
        .eval(&source)
        .wrap_err_with(|| format!("uncaught exception in {}", path.display()))
}

/// Evaluates lines until EOF. Script errors are printed, not returned.
fn repl(engine: &Engine) -> Result<()> {
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(err) = editor.add_history_entry(line.as_str()) {
                    log::debug!("could not record history: {err}");
                }

                match engine.eval(&line) {
                    Ok(result) => println!("{result}"),
                    Err(err) => eprintln!("Uncaught {err}"),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}
