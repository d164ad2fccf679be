//! Bytecode blob round-trips: compiling a script through [`rill::Interpreter`]
//! and re-serializing its program via [`SerializeCursor`] must decode back
//! into a program the VM can still run (a REPL replays these blobs to
//! reconstruct later sessions, see SPEC_FULL.md §10.4).

use rill::bytecode::serialize::{decode_into, SerializeCursor};
use rill::bytecode::Program;
use rill::value::Value;
use rill::Interpreter;

#[test]
fn a_single_delta_decodes_to_an_equivalent_constant_pool() {
    let mut interp = Interpreter::new();
    interp.compile("let x = 40 + 2 x");

    let mut cursor = SerializeCursor::new();
    let blob = cursor.encode_delta(&interp.program);

    let mut decoded = Program::new();
    decode_into(&mut decoded, &blob);

    assert_eq!(decoded.constants.len(), interp.program.constants.len());
    assert!(decoded.constants.iter().any(|c| matches!(c, rill::bytecode::Constant::Int(42))));
}

#[test]
fn successive_compiles_each_emit_only_their_own_delta() {
    let mut interp = Interpreter::new();
    let mut cursor = SerializeCursor::new();

    interp.compile("1 + 1");
    let first = cursor.encode_delta(&interp.program);

    interp.compile("2 + 2");
    let second = cursor.encode_delta(&interp.program);

    assert!(!first.is_empty());
    assert!(!second.is_empty());

    let mut decoded = Program::new();
    decode_into(&mut decoded, &first);
    decode_into(&mut decoded, &second);
    assert_eq!(decoded.constants.len(), interp.program.constants.len());
}

#[test]
fn a_running_program_keeps_producing_correct_results_after_many_deltas() {
    let mut interp = Interpreter::new();
    let mut cursor = SerializeCursor::new();
    let mut out = Vec::new();

    for i in 1..=5 {
        let entry = interp.compile(&format!("{i} * {i}")).entry.expect("should compile");
        let _ = cursor.encode_delta(&interp.program);
        let result = interp.run(entry, &mut out).expect("should run");
        assert_eq!(result, Value::Int(i * i));
    }
}
