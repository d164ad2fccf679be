//! `-t/--test` mode: splits a source file on `TEST_CASE` comment markers and
//! runs each chunk as an independent script, exactly as
//! `original_source/source/main.cpp`'s `InterpretTests` does. A case is
//! marked `MUST_BE_ERROR` when it's expected to fail to compile or run.

use std::process::ExitCode;

use rill::value::Value;
use rill::resource::ResourceLimits;
use rill::Interpreter;

struct Case {
    description: String,
    source: String,
    error_expected: bool,
}

fn split_cases(source: &str) -> Vec<Case> {
    let mut cases = Vec::new();
    let mut description = String::new();
    let mut error_expected = false;
    let mut body = String::new();

    for line in source.lines() {
        if let Some(pos) = line.find("TEST_CASE") {
            if !body.trim().is_empty() {
                cases.push(Case { description: description.clone(), source: std::mem::take(&mut body), error_expected });
            }
            if let Some(err_pos) = line.find("MUST_BE_ERROR") {
                error_expected = true;
                description = line[err_pos + "MUST_BE_ERROR".len()..].trim().to_string();
            } else {
                error_expected = false;
                description = line[pos + "TEST_CASE".len()..].trim().to_string();
            }
            body.clear();
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    if !body.trim().is_empty() {
        cases.push(Case { description, source: body, error_expected });
    }
    cases
}

pub fn run(source: &str, limits: ResourceLimits) -> ExitCode {
    let cases = split_cases(source);
    let mut failures = Vec::new();

    for case in &cases {
        let mut interp = Interpreter::with_limits(limits);
        let mut out = Vec::new();
        match interp.compile_and_run(&case.source, &mut out) {
            Ok(Value::Bool(true)) if !case.error_expected => print!("."),
            Ok(_) if !case.error_expected => failures.push(format!("Failed test case:{}", case.description)),
            Ok(v) => failures.push(format!("Failed test case:{} (expected an error, got {v})", case.description)),
            Err(e) if case.error_expected => {
                let _ = e;
                print!(".");
            }
            Err(e) => failures.push(format!("Failed test case:{}\nwith error:\n{e}", case.description)),
        }
    }

    println!();
    for failure in &failures {
        println!("{failure}");
    }

    if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_labeled_blocks() {
        let source = "// TEST_CASE addition works\n1 + 1 == 2\n// TEST_CASE MUST_BE_ERROR division by zero\n1 / 0\n";
        let cases = split_cases(source);
        assert_eq!(cases.len(), 2);
        assert!(!cases[0].error_expected);
        assert!(cases[1].error_expected);
    }
}
