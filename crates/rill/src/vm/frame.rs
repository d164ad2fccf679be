//! Per-call activation record (§4.5).

use crate::heap::HeapId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The `Function` heap object being executed.
    pub function: HeapId,
    pub ip: usize,
    pub locals: Vec<Value>,
    /// The implicit `$$` anonymous-argument array, a heap array object.
    pub args_array: HeapId,
    pub this: Value,
}

impl StackFrame {
    #[must_use]
    pub fn new(function: HeapId, local_count: usize, args_array: HeapId, this: Value) -> Self {
        Self {
            function,
            ip: 0,
            locals: vec![Value::Nil; local_count],
            args_array,
            this,
        }
    }
}

/// A whole execution's suspended state, saved across a coroutine `yield`
/// and restored on the next resume (§4.5).
#[derive(Debug, Clone)]
pub struct SavedContext {
    pub frames: Vec<StackFrame>,
    pub stack: Vec<Value>,
}
