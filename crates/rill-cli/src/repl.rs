//! Interactive REPL (SPEC_FULL.md §10.5). Lines are buffered until brace and
//! paren nesting returns to zero before being handed to the interpreter,
//! matching `original_source/source/main.cpp`'s `InterpretREPL` behavior of
//! reading one line at a time but only interpreting once a statement is
//! complete.

use std::io::Write;

use rill::Interpreter;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

fn nesting_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '(' | '[' => delta += 1,
            '}' | ')' | ']' => delta -= 1,
            _ => {}
        }
    }
    delta
}

pub fn run(interp: &mut Interpreter) -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut pending = String::new();
    let mut nesting = 0i32;

    loop {
        let prompt = if nesting > 0 { ".. " } else { ">> " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        };

        nesting += nesting_delta(&line);
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(&line);

        if nesting > 0 {
            continue;
        }
        nesting = 0;

        let _ = editor.add_history_entry(pending.as_str());
        let source = std::mem::take(&mut pending);
        if source.trim().is_empty() {
            continue;
        }

        let mut out = std::io::stdout();
        match interp.compile_and_run(&source, &mut out) {
            Ok(value) => println!("{}", value.display(&interp.heap)),
            Err(err) => eprintln!("{err}"),
        }
        let _ = out.flush();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_line_has_zero_delta() {
        assert_eq!(nesting_delta("let x = [1, 2, 3]"), 0);
    }

    #[test]
    fn unclosed_brace_is_positive() {
        assert_eq!(nesting_delta("fn() {"), 1);
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        assert_eq!(nesting_delta(r#"print("{ not nesting")"#), 0);
    }

    #[test]
    fn closing_brace_balances_a_previous_line() {
        assert_eq!(nesting_delta("}"), -1);
    }
}
