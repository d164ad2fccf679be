//! `rill` command-line interpreter and REPL (SPEC_FULL.md §10). The flag set
//! (`-h/-?/--help`, `-v/--version`, `-t/--test`, and the `-d{a,s,c,r}` debug
//! cluster) mirrors `original_source/source/main.cpp`'s `main` byte for byte;
//! `clap` only drives the discoverable long-form surface on top of it.

mod config;
mod repl;
mod test_runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rill::bytecode::compiler::Compiler;
use rill::bytecode::Program;
use rill::{analyzer, parser::Parser as RillParser, Interpreter};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "rill", version = VERSION, about = "A small bytecode-compiled scripting language", long_about = None)]
struct Cli {
    /// Script to run. Starts the REPL if omitted.
    file: Option<PathBuf>,

    /// Run the file in unit-test mode (`TEST_CASE` comment blocks).
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Debug-print the parsed abstract syntax tree.
    #[arg(short = 'a', long = "print-ast", hide_short_help = true)]
    print_ast: bool,

    /// Debug-print the generated symbol table.
    #[arg(short = 's', long = "print-symbols", hide_short_help = true)]
    print_symbols: bool,

    /// Debug-print the constant pool.
    #[arg(short = 'c', long = "print-constants", hide_short_help = true)]
    print_constants: bool,

    /// Run the file after debug printing (instead of stopping once printed).
    #[arg(short = 'r', long = "run-after-print", hide_short_help = true)]
    run_after_print: bool,

    /// Optional TOML config file for resource-limit and debug-flag defaults.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = std::env::args().collect::<Vec<_>>();
    let expanded = expand_combined_debug_flags(&args);
    let cli = Cli::parse_from(expanded);

    let cli_config = match &cli.config {
        Some(path) => match config::CliConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => config::CliConfig::default(),
    };

    let print_ast = cli.print_ast || cli_config.debug.print_ast;
    let print_symbols = cli.print_symbols || cli_config.debug.print_symbols;
    let print_constants = cli.print_constants || cli_config.debug.print_constants;

    let Some(file) = cli.file.clone() else {
        let mut interp = Interpreter::with_limits(cli_config.resource_limits());
        return match repl::run(&mut interp) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        };
    };

    let source = match std::fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };

    if print_ast || print_symbols || print_constants {
        debug_print(&source, print_ast, print_symbols, print_constants);
        if !cli.run_after_print && !cli_config.debug.print_ast {
            return ExitCode::SUCCESS;
        }
    }

    if cli.test {
        return test_runner::run(&source, cli_config.resource_limits());
    }

    let mut interp = Interpreter::with_limits(cli_config.resource_limits());
    let mut out = std::io::stdout();
    match interp.compile_and_run(&source, &mut out) {
        Ok(value) => {
            println!("{}", value.display(&interp.heap));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn debug_print(source: &str, ast: bool, symbols: bool, constants: bool) {
    let mut diags = rill::error::Diagnostics::new();
    let function = match RillParser::parse_program(source, &mut diags) {
        Ok(f) => f,
        Err(()) => {
            println!("{diags}");
            return;
        }
    };
    if !diags.is_empty() {
        println!("{diags}");
        return;
    }

    if ast {
        println!("{function:#?}");
    }
    if !(symbols || constants) {
        return;
    }

    let analyzed = analyzer::analyze(function, &mut diags);
    if !diags.is_empty() {
        println!("{diags}");
        return;
    }

    let mut program = Program::new();
    Compiler::new(&mut program).compile_program(&analyzed.function);
    if !diags.is_empty() {
        println!("{diags}");
        return;
    }

    if symbols {
        let mut entries: Vec<_> = program.symbols.iter().collect();
        entries.sort_by_key(|(_, sym)| sym.global_index);
        for (hash, sym) in entries {
            println!("{hash:#010x}  {:<5} {}", sym.global_index, sym.name);
        }
    }
    if constants {
        for (i, constant) in program.constants.iter().enumerate() {
            println!("{i:<5} {constant:?}");
        }
    }
}

/// Rewrites legacy single-token debug clusters (`-da`, `-dsc`, ...) into the
/// individual long flags `clap` understands, so `-da` still behaves exactly
/// like `original_source`'s hand-rolled parser did.
fn expand_combined_debug_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(letters) = arg.strip_prefix("-d").filter(|rest| !rest.is_empty() && !arg.starts_with("--")) {
            for letter in letters.chars() {
                match letter {
                    'a' => out.push("--print-ast".to_string()),
                    's' => out.push("--print-symbols".to_string()),
                    'c' => out.push("--print-constants".to_string()),
                    'r' => out.push("--run-after-print".to_string()),
                    _ => out.push(arg.clone()),
                }
            }
        } else {
            out.push(arg.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_a_combined_debug_cluster() {
        let args = vec!["rill".to_string(), "-dar".to_string(), "script.rl".to_string()];
        let expanded = expand_combined_debug_flags(&args);
        assert_eq!(expanded, vec!["rill", "--print-ast", "--run-after-print", "script.rl"]);
    }

    #[test]
    fn leaves_ordinary_long_flags_alone() {
        let args = vec!["rill".to_string(), "--test".to_string()];
        assert_eq!(expand_combined_debug_flags(&args), args);
    }
}
