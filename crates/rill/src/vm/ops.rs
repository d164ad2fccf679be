//! Binary/unary operator and member-access semantics (§4.5).

use crate::heap::gc::Collector;
use crate::heap::{GcObject, Heap, HeapId};
use crate::types::object::{ObjectObj, PROTO_HASH};
use crate::value::Value;

pub type OpResult = Result<Value, String>;

fn string_of(heap: &Heap, v: Value) -> String {
    v.display(heap)
}

/// `+, -, *, /, %, ^, ~, xor, ==, !=, <, >, <=, >=`. Arithmetic requires
/// numeric operands; `+` also concatenates arrays and merges objects (later
/// keys win); `~` coerces both operands to string; `%` is integer modulo;
/// division by zero is an error (§4.5).
pub fn binary_numeric_or_structural(heap: &mut Heap, op: &str, lhs: Value, rhs: Value) -> OpResult {
    match op {
        "+" => add(heap, lhs, rhs),
        "-" => arith(lhs, rhs, |a, b| a - b, |a, b| a - b),
        "*" => arith(lhs, rhs, |a, b| a * b, |a, b| a * b),
        "/" => divide(lhs, rhs),
        "%" => modulo(lhs, rhs),
        "^" => Ok(Value::Float(pow(lhs, rhs)?)),
        "~" => {
            let s = format!("{}{}", string_of(heap, lhs), string_of(heap, rhs));
            Ok(Value::Heap(heap.alloc_string(s)))
        }
        "xor" => Ok(Value::Bool(lhs.is_truthy() ^ rhs.is_truthy())),
        "==" => Ok(Value::Bool(values_equal(heap, lhs, rhs))),
        "!=" => Ok(Value::Bool(!values_equal(heap, lhs, rhs))),
        "<" | ">" | "<=" | ">=" => compare(lhs, rhs, op),
        other => Err(format!("unsupported binary operator `{other}`")),
    }
}

fn add(heap: &mut Heap, lhs: Value, rhs: Value) -> OpResult {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (a, b) if a.as_number().is_some() && b.as_number().is_some() => {
            Ok(Value::Float(a.as_number().unwrap() + b.as_number().unwrap()))
        }
        (Value::Heap(a), Value::Heap(b)) => match (heap.get(a), heap.get(b)) {
            (GcObject::Array(left), GcObject::Array(right)) => {
                let mut merged = left.elements.clone();
                merged.extend(right.elements.clone());
                Ok(Value::Heap(heap.alloc_array(merged)))
            }
            (GcObject::Object(left), GcObject::Object(right)) => {
                let mut obj = ObjectObj { members: left.members.clone() };
                for (h, v) in right.members.clone() {
                    obj.set_own_or_insert(h, v);
                }
                Ok(Value::Heap(heap.alloc_object(obj.members)))
            }
            _ => Err("`+` requires two numbers, two arrays, or two objects".to_string()),
        },
        _ => Err("`+` requires two numbers, two arrays, or two objects".to_string()),
    }
}

fn arith(lhs: Value, rhs: Value, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> OpResult {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(fi(a, b))),
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Float(ff(x, y))),
            _ => Err("arithmetic requires numeric operands".to_string()),
        },
    }
}

fn divide(lhs: Value, rhs: Value) -> OpResult {
    match (lhs, rhs) {
        (Value::Int(_), Value::Int(0)) => Err("division by zero".to_string()),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(b))),
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(_), Some(y)) if y == 0.0 => Err("division by zero".to_string()),
            (Some(x), Some(y)) => Ok(Value::Float(x / y)),
            _ => Err("`/` requires numeric operands".to_string()),
        },
    }
}

fn modulo(lhs: Value, rhs: Value) -> OpResult {
    match (lhs.as_int(), rhs.as_int()) {
        (Some(_), Some(0)) => Err("division by zero".to_string()),
        (Some(a), Some(b)) => Ok(Value::Int(a.rem_euclid(b))),
        _ => Err("`%` requires integer operands".to_string()),
    }
}

fn pow(lhs: Value, rhs: Value) -> Result<f64, String> {
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => Ok(a.powf(b)),
        _ => Err("`^` requires numeric operands".to_string()),
    }
}

fn compare(lhs: Value, rhs: Value, op: &str) -> OpResult {
    let (a, b) = match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(format!("`{op}` requires numeric operands")),
    };
    Ok(Value::Bool(match op {
        "<" => a < b,
        ">" => a > b,
        "<=" => a <= b,
        ">=" => a >= b,
        _ => unreachable!(),
    }))
}

/// `==`/`!=` compare by numeric value, bool, string content, or reference
/// identity otherwise (§4.5).
#[must_use]
pub fn values_equal(heap: &Heap, lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (a, b) if a.as_number().is_some() && b.as_number().is_some() => a.as_number() == b.as_number(),
        (Value::Heap(a), Value::Heap(b)) => match (heap.get(a), heap.get(b)) {
            (GcObject::Str(x), GcObject::Str(y)) => x.0 == y.0,
            _ => a == b,
        },
        (Value::Native(a), Value::Native(b)) => a == b,
        _ => false,
    }
}

/// `+` (no-op on numbers), `-` (negate), `not` (boolean-negate anything),
/// `~` (string-coerce anything), `#` (size of array/object/string) (§4.5).
pub fn unary(heap: &mut Heap, op: &str, operand: Value) -> OpResult {
    match op {
        "+" => match operand {
            Value::Int(_) | Value::Float(_) => Ok(operand),
            _ => Err("unary `+` requires a number".to_string()),
        },
        "-" => match operand {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err("unary `-` requires a number".to_string()),
        },
        "not" => Ok(Value::Bool(!operand.is_truthy())),
        "~" => Ok(Value::Heap(heap.alloc_string(string_of(heap, operand)))),
        "#" => match operand {
            Value::Heap(id) => match heap.get(id) {
                GcObject::Array(a) => Ok(Value::Int(a.len() as i64)),
                GcObject::Object(o) => Ok(Value::Int(o.len() as i64)),
                GcObject::Str(s) => Ok(Value::Int(s.len() as i64)),
                _ => Err("`#` requires an array, object, or string".to_string()),
            },
            _ => Err("`#` requires an array, object, or string".to_string()),
        },
        other => Err(format!("unsupported unary operator `{other}`")),
    }
}

/// `LoadMember`: binary-searches `object`'s members, following `proto`
/// chains on a miss; missing returns nil (§4.5).
#[must_use]
pub fn load_member(heap: &Heap, object: HeapId, hash: u32) -> Value {
    match heap.get(object) {
        GcObject::Object(o) => o.get(hash, heap),
        _ => Value::Nil,
    }
}

/// `StoreMember`/`PopStoreMember`: assign in place on a hit; on a miss walk
/// protos for an existing member to overwrite; otherwise insert, keeping
/// the member vector sorted. Triggers the write barrier (§4.5, §5).
pub fn store_member(heap: &mut Heap, gc: &mut Collector, object: HeapId, hash: u32, value: Value) {
    let owner = find_member_owner(heap, object, hash).unwrap_or(object);
    if let GcObject::Object(o) = heap.get_mut(owner) {
        o.set_own_or_insert(hash, value);
    }
    gc.write_barrier(heap, owner, value);
}

fn find_member_owner(heap: &Heap, object: HeapId, hash: u32) -> Option<HeapId> {
    let mut current = object;
    loop {
        let (has_own, proto) = match heap.get(current) {
            GcObject::Object(o) => (o.get_own(hash).is_some(), o.get_own(PROTO_HASH)),
            _ => return None,
        };
        if has_own {
            return Some(current);
        }
        match proto {
            Some(Value::Heap(next)) => current = next,
            _ => return None,
        }
    }
}
