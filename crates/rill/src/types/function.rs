//! Heap function payload: a closure over a compiled `CodeObject`, optionally
//! carrying a suspended coroutine's saved execution state (§4.5, §4.6).

use crate::value::Value;
use crate::vm::frame::SavedContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    NotStarted,
    Started,
    Finished,
}

#[derive(Debug, Clone)]
pub struct CoroutineState {
    pub resume_state: ResumeState,
    pub saved: Option<SavedContext>,
    /// The value from the most recent `yield`, consumed by the next
    /// `iterator_get_next` on this coroutine (§4.5).
    pub last_yielded: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FunctionObj {
    /// Index of this function's `CodeObject` in the program constant pool.
    pub const_index: u32,
    /// Captured free variables, in `closure_mapping` order. Each entry is
    /// either the box the enclosing frame allocated for the captured slot,
    /// or a value threaded through from an outer closure's own list.
    pub closure: Vec<Value>,
    /// `Some` only for instances created by `make_coroutine`/`make_iterator`
    /// (§4.5); a coroutine's `ExecutionContext` is otherwise identical to an
    /// ordinary call's.
    pub coroutine: Option<CoroutineState>,
}

impl FunctionObj {
    #[must_use]
    pub fn plain(const_index: u32, closure: Vec<Value>) -> Self {
        Self {
            const_index,
            closure,
            coroutine: None,
        }
    }

    #[must_use]
    pub fn coroutine(const_index: u32, closure: Vec<Value>) -> Self {
        Self {
            const_index,
            closure,
            coroutine: Some(CoroutineState {
                resume_state: ResumeState::NotStarted,
                saved: None,
                last_yielded: None,
            }),
        }
    }

    #[must_use]
    pub fn is_coroutine(&self) -> bool {
        self.coroutine.is_some()
    }
}
