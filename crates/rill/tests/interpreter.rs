//! End-to-end interpreter scenarios: each compiles and runs a small script
//! through the full lexer -> parser -> analyzer -> compiler -> VM pipeline.

use rill::value::Value;
use rill::Interpreter;

fn run(source: &str) -> (Value, String) {
    let mut interp = Interpreter::new();
    let mut out = Vec::new();
    let result = interp.compile_and_run(source, &mut out).unwrap_or_else(|e| panic!("{source}\n -> {e}"));
    (result, String::from_utf8(out).expect("valid utf-8 output"))
}

#[test]
fn arithmetic_and_precedence() {
    let (v, _) = run("2 + 3 * 4");
    assert_eq!(v, Value::Int(14));
}

#[test]
fn string_concatenation_coerces_numbers() {
    let (v, out) = run(r#"print("x = " ~ (1 + 2))"#);
    assert_eq!(v, Value::Nil);
    assert_eq!(out, "x = 3\n");
}

#[test]
fn if_expression_value() {
    let (v, _) = run("if true { 1 } else { 2 }");
    assert_eq!(v, Value::Int(1));
}

#[test]
fn while_loop_break_value() {
    let (v, _) = run(
        r#"
        let i = 0
        let result = while true {
            i = i + 1
            if i == 5 { break i * 10 }
        }
        result
        "#,
    );
    assert_eq!(v, Value::Int(50));
}

#[test]
fn while_loop_without_break_yields_nil() {
    let (v, _) = run(
        r#"
        let i = 0
        let result = while i < 3 { i = i + 1 }
        result
        "#,
    );
    assert_eq!(v, Value::Nil);
}

#[test]
fn for_loop_sums_an_array() {
    let (v, _) = run(
        r#"
        let total = 0
        for x in [1, 2, 3, 4] {
            total = total + x
        }
        total
        "#,
    );
    assert_eq!(v, Value::Int(10));
}

#[test]
fn for_loop_break_drops_the_iterator_cleanly() {
    let (v, _) = run(
        r#"
        let result = for x in [1, 2, 3] {
            if x == 2 { break x * 100 }
        }
        result
        "#,
    );
    assert_eq!(v, Value::Int(200));
}

#[test]
fn closures_capture_by_reference() {
    let (v, _) = run(
        r#"
        let make_counter = fn() {
            let n = 0
            fn() {
                n = n + 1
                n
            }
        }
        let counter = make_counter()
        counter()
        counter()
        counter()
        "#,
    );
    assert_eq!(v, Value::Int(3));
}

#[test]
fn object_member_access_and_proto_delegation() {
    let (v, _) = run(
        r#"
        let base = { greeting: "hi" }
        let child = { proto: base }
        child.greeting
        "#,
    );
    match v {
        Value::Heap(_) => {}
        other => panic!("expected a string value, got {other:?}"),
    }
}

#[test]
fn array_negative_index_wraps() {
    let (v, _) = run("[10, 20, 30][-1]");
    assert_eq!(v, Value::Int(30));
}

#[test]
fn array_push_and_pop_back() {
    let (v, _) = run(
        r#"
        let a = [1, 2]
        a << 3
        a >> nil
        a
        "#,
    );
    match v {
        Value::Heap(_) => {}
        other => panic!("expected an array value, got {other:?}"),
    }
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let mut interp = Interpreter::new();
    let mut out = Vec::new();
    let err = interp.compile_and_run("1 / 0", &mut out).unwrap_err();
    assert!(err.message.contains("division by zero"));
}

#[test]
fn destructuring_assignment() {
    let (v, _) = run(
        r#"
        let a, b = [1, 2]
        b
        "#,
    );
    assert_eq!(v, Value::Int(2));
}

#[test]
fn native_map_and_reduce() {
    let (v, _) = run(
        r#"
        let doubled = map([1, 2, 3], fn(x) { x * 2 })
        reduce(doubled, fn(acc, x) { acc + x }, 0)
        "#,
    );
    assert_eq!(v, Value::Int(12));
}

#[test]
fn native_sort_with_custom_comparator() {
    let (v, _) = run(
        r#"
        let sorted = sort([3, 1, 2], fn(a, b) { a > b })
        sorted
        "#,
    );
    match v {
        Value::Heap(_) => {}
        other => panic!("expected an array value, got {other:?}"),
    }
}

#[test]
fn coroutine_yields_values_across_resumes() {
    let (v, _) = run(
        r#"
        let gen = make_coroutine(fn() {
            yield 1
            yield 2
            3
        })
        let it = make_iterator(gen)
        let total = 0
        while iterator_has_next(it) {
            total = total + iterator_get_next(it)
        }
        total
        "#,
    );
    assert_eq!(v, Value::Int(3));
}
