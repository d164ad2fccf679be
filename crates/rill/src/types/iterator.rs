//! Heap iterator payload (§4.5). Built-in array/string iterators carry
//! their own cursor; user-object and coroutine iterators dispatch through
//! the VM's call machinery, so their variants only remember which heap
//! object to call into.

use crate::heap::HeapId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum IteratorObj {
    Array { target: HeapId, pos: usize },
    Str { target: HeapId, pos: usize },
    /// A user object exposing `has_next`/`get_next` methods, validated on
    /// first use (§4.5).
    UserObject { target: HeapId, validated: bool },
    /// A coroutine created by `make_coroutine`/`make_iterator`; `has_next`
    /// resumes it until the next `yield` or `EndFunction`.
    Coroutine { function: HeapId },
}

impl IteratorObj {
    pub fn visit_children(&self, mut visit: impl FnMut(Value)) {
        let target = match self {
            Self::Array { target, .. } | Self::Str { target, .. } | Self::UserObject { target, .. } => *target,
            Self::Coroutine { function } => *function,
        };
        visit(Value::Heap(target));
    }
}
