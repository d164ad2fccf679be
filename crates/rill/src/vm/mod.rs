//! The bytecode virtual machine (§4.5, §5).

pub mod frame;
pub mod ops;
pub mod run;

use crate::heap::HeapId;
use crate::value::Value;
use frame::StackFrame;

/// A runtime error as it propagates out of the VM, accumulating a
/// "called from here" trace as it unwinds through nested scripted calls
/// (§5).
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    pub call_trace: Vec<String>,
}

impl RuntimeError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            call_trace: Vec::new(),
        }
    }

    /// Appends one "called from here" entry, innermost call first.
    #[must_use]
    pub fn with_frame(mut self, label: impl Into<String>) -> Self {
        self.call_trace.push(label.into());
        self
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in &self.call_trace {
            write!(f, "\n  called from {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Where one call-frame stands relative to an in-flight error (§5): a
/// frame that raised or observed a propagating error is marked so the
/// embedder's trace reflects it, even though the `ExecutionContext`'s own
/// frame stack has already unwound past it by the time the error reaches
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Running,
    Error,
    Propagated,
}

/// One run's mutable state: the value stack, the active call frames, the
/// `this`-latch set by the most recent member load, and any error in the
/// process of propagating out (§4.5).
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub stack: Vec<Value>,
    pub frames: Vec<StackFrame>,
    /// Set by `LoadMember`, consumed by the next `FunctionCall` to become
    /// the callee's `this` (§4.5).
    pub last_object: Option<HeapId>,
    pub pending_error: Option<RuntimeError>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
