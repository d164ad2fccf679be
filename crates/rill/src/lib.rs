//! `rill`: a lexer, parser, semantic analyzer, bytecode compiler, and
//! tri-color-GC virtual machine for a small dynamically-typed scripting
//! language (§1).
//!
//! [`Interpreter`] is the embedding surface: construct one, `compile` a
//! source string as many times as you like (each call only emits the
//! symbols/constants appended since the last one, so a REPL can keep
//! reusing one interpreter), then `run` the result.

pub mod analyzer;
pub mod ast;
pub mod bytecode;
pub mod error;
pub mod heap;
pub mod intern;
pub mod lexer;
pub mod natives;
pub mod parser;
pub mod resource;
pub mod token;
pub mod types;
pub mod value;
pub mod vm;

use std::io::Write;

use bytecode::serialize::SerializeCursor;
use bytecode::Program;
use error::Diagnostics;
use heap::gc::Collector;
use heap::Heap;
use parser::Parser;
use resource::{ResourceLimits, ResourceTracker};
use value::Value;
use vm::run::{RunOutcome, Vm};
use vm::RuntimeError;

/// Everything a `compile` call produces: the entry point's constant slot,
/// plus any diagnostics gathered along the way (non-fatal if `entry` is
/// `Some`).
pub struct CompileOutput {
    pub entry: Option<u32>,
    pub diagnostics: Diagnostics,
}

/// An embeddable interpreter instance: a heap, a growing program (constant
/// pool + symbol table), the global-variable slots the analyzer assigns
/// script-level bindings to, and the incremental collector driving them
/// (§4.6).
pub struct Interpreter {
    pub program: Program,
    pub heap: Heap,
    pub globals: Vec<Value>,
    pub limits: ResourceLimits,
    gc: Collector,
    tracker: ResourceTracker,
    cursor: SerializeCursor,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            heap: Heap::new(),
            globals: Vec::new(),
            limits: ResourceLimits::default(),
            gc: Collector::new(),
            tracker: ResourceTracker::new(),
            cursor: SerializeCursor::new(),
        }
    }

    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self { limits, ..Self::new() }
    }

    /// Runs the lexer -> parser -> analyzer -> compiler pipeline over one
    /// chunk of source, appending to this interpreter's program (§4).
    pub fn compile(&mut self, source: &str) -> CompileOutput {
        let mut diags = Diagnostics::new();
        let function = match Parser::parse_program(source, &mut diags) {
            Ok(f) => f,
            Err(()) => {
                return CompileOutput { entry: None, diagnostics: diags };
            }
        };
        if !diags.is_empty() {
            return CompileOutput { entry: None, diagnostics: diags };
        }

        let analyzed = analyzer::analyze(function, &mut diags);
        if !diags.is_empty() {
            return CompileOutput { entry: None, diagnostics: diags };
        }
        if self.globals.len() < analyzed.global_count as usize {
            self.globals.resize(analyzed.global_count as usize, Value::Nil);
        }

        let entry = bytecode::compiler::Compiler::new(&mut self.program).compile_program(&analyzed.function);
        CompileOutput {
            entry: Some(entry),
            diagnostics: diags,
        }
    }

    /// Serializes every symbol/constant appended since the last call with
    /// this interpreter's cursor (§6).
    pub fn encode_delta(&mut self) -> Vec<u8> {
        self.cursor.encode_delta(&self.program)
    }

    /// Runs a previously compiled entry point's `CodeObject` to completion,
    /// writing anything `print` produces to `output`.
    pub fn run(&mut self, entry_const: u32, output: &mut dyn Write) -> Result<Value, RuntimeError> {
        let function_id = self.heap.alloc_function(crate::types::function::FunctionObj::plain(entry_const, Vec::new()));
        let mut vm = Vm {
            program: &self.program,
            heap: &mut self.heap,
            globals: &mut self.globals,
            gc: &mut self.gc,
            limits: &self.limits,
            tracker: &mut self.tracker,
            output,
            context_roots: Vec::new(),
        };
        match vm.run_function(function_id, Vec::new(), Value::Nil)? {
            RunOutcome::Completed(v) => Ok(v),
            RunOutcome::Yielded(v) => Ok(v),
        }
    }

    /// Convenience: compiles and immediately runs one chunk of source,
    /// surfacing compile diagnostics as a `RuntimeError` if compilation
    /// failed.
    pub fn compile_and_run(&mut self, source: &str, output: &mut dyn Write) -> Result<Value, RuntimeError> {
        let result = self.compile(source);
        let Some(entry) = result.entry else {
            return Err(RuntimeError::new(result.diagnostics.to_string()));
        };
        self.run(entry, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_trivial_expression_script() {
        let mut interp = Interpreter::new();
        let mut out = Vec::new();
        let result = interp.compile_and_run("1 + 2", &mut out).expect("should run");
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn print_writes_to_the_given_output() {
        let mut interp = Interpreter::new();
        let mut out = Vec::new();
        interp.compile_and_run(r#"print("hello")"#, &mut out).expect("should run");
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n");
    }
}
