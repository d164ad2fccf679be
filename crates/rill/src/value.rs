//! The tagged runtime value (§4.5): nil, numbers, booleans, a native-function
//! index, or a reference into the [`crate::heap::Heap`] arena.

use std::fmt;

use crate::heap::{Heap, HeapId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Native(u32),
    Heap(HeapId),
}

impl Value {
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    #[must_use]
    pub fn type_name(&self, heap: &Heap) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Native(_) => "native",
            Value::Heap(id) => heap.get(*id).type_name(),
        }
    }

    #[must_use]
    pub fn as_heap(&self) -> Option<HeapId> {
        match self {
            Value::Heap(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Formats this value's string coercion (used by `~` and `print`), per
    /// §4.5's unary-operator rules.
    #[must_use]
    pub fn display(&self, heap: &Heap) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Native(idx) => format!("<native#{idx}>"),
            Value::Heap(id) => match heap.get(*id) {
                crate::heap::GcObject::Str(s) => s.0.clone(),
                crate::heap::GcObject::Array(a) => {
                    let parts: Vec<String> = a.elements.iter().map(|v| v.display(heap)).collect();
                    format!("[{}]", parts.join(", "))
                }
                crate::heap::GcObject::Object(_) => "<object>".to_string(),
                crate::heap::GcObject::Box(b) => b.0.display(heap),
                crate::heap::GcObject::Iterator(_) => "<iterator>".to_string(),
                crate::heap::GcObject::Function(_) => "<function>".to_string(),
                crate::heap::GcObject::Error(e) => format!("error: {}", e.payload.display(heap)),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Native(idx) => write!(f, "<native#{idx}>"),
            Value::Heap(id) => write!(f, "<heap#{}>", id.0),
        }
    }
}
