//! Source coordinates and the pipeline-wide diagnostics log.
//!
//! Every stage of the pipeline (lexer, parser, analyzer, compiler) reports
//! failures into a [`Diagnostics`] log rather than bailing out on the first
//! error where that is feasible; the VM instead halts immediately and
//! records a call-stack trace (see `vm::RuntimeError`).

use std::fmt;

/// A `(line, column)` pair, both 1-based, attached to every token and AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, serde::Serialize, serde::Deserialize)]
pub struct Coords {
    pub line: u32,
    pub column: u32,
}

impl Coords {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Which pipeline stage produced a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    Lexical,
    Syntax,
    Semantic,
    Compile,
}

/// A single compile-time failure with source coordinates.
///
/// Diagnostics accumulate in a [`Diagnostics`] log; the pipeline keeps
/// running where it safely can (e.g. the analyzer keeps validating after
/// one bad `break` placement) so a single run can report more than one
/// problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub at: Coords,
}

impl Diagnostic {
    #[must_use]
    pub fn new(stage: Stage, message: impl Into<String>, at: Coords) -> Self {
        Self {
            stage,
            message: message.into(),
            at,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error at {}: {}", self.stage, self.at, self.message)
    }
}

/// Accumulates diagnostics for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, message: impl Into<String>, at: Coords) {
        self.0.push(Diagnostic::new(stage, message, at));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
