//! `keys, range, each, times, count, map, filter, reduce, all, any, min,
//! max, sort` (§6). The callback-taking natives (`each`, `map`, `filter`,
//! `reduce`, `all`, `any`, `sort`) re-enter the VM through
//! [`Vm::call_value`] for every element, mirroring how a user-object
//! iterator's `has_next`/`get_next` methods are invoked.

use crate::heap::GcObject;
use crate::natives::{arg, NativeResult};
use crate::value::Value;
use crate::vm::run::Vm;
use crate::vm::RuntimeError;

fn array_elements(vm: &Vm, v: Value, who: &str) -> Result<Vec<Value>, String> {
    match v {
        Value::Heap(id) => match vm.heap.get(id) {
            GcObject::Array(a) => Ok(a.elements.clone()),
            _ => Err(format!("{who} requires an array argument")),
        },
        _ => Err(format!("{who} requires an array argument")),
    }
}

fn call(vm: &mut Vm, f: Value, call_args: Vec<Value>) -> Result<Value, String> {
    vm.call_value(f, call_args, Value::Nil).map_err(|e: RuntimeError| e.message)
}

pub fn keys(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let members = match arg(args, 0) {
        Value::Heap(id) => match vm.heap.get(id) {
            GcObject::Object(o) => o.keys(),
            _ => return Err("keys requires an object argument".to_string()),
        },
        _ => return Err("keys requires an object argument".to_string()),
    };
    let elements = members.into_iter().map(|h| Value::Int(i64::from(h))).collect();
    Ok(Value::Heap(vm.heap.alloc_array(elements)))
}

pub fn range(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let start = arg(args, 0).as_int().ok_or("range requires integer arguments")?;
    let end = arg(args, 1).as_int().ok_or("range requires integer arguments")?;
    let step = if args.len() > 2 {
        arg(args, 2).as_int().ok_or("range requires integer arguments")?
    } else {
        1
    };
    if step == 0 {
        return Err("range step must not be zero".to_string());
    }
    let mut elements = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < end {
            elements.push(Value::Int(i));
            i += step;
        }
    } else {
        while i > end {
            elements.push(Value::Int(i));
            i += step;
        }
    }
    Ok(Value::Heap(vm.heap.alloc_array(elements)))
}

pub fn each(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "each")?;
    let f = arg(args, 1);
    for (i, e) in elements.into_iter().enumerate() {
        call(vm, f, vec![e, Value::Int(i as i64)])?;
    }
    Ok(Value::Nil)
}

pub fn times(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let n = arg(args, 0).as_int().ok_or("times requires an integer count")?;
    let f = arg(args, 1);
    for i in 0..n.max(0) {
        call(vm, f, vec![Value::Int(i)])?;
    }
    Ok(Value::Nil)
}

pub fn count(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "count")?;
    if args.len() < 2 {
        return Ok(Value::Int(elements.len() as i64));
    }
    let f = arg(args, 1);
    let mut n = 0i64;
    for e in elements {
        if call(vm, f, vec![e])?.is_truthy() {
            n += 1;
        }
    }
    Ok(Value::Int(n))
}

pub fn map(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "map")?;
    let f = arg(args, 1);
    let mut out = Vec::with_capacity(elements.len());
    for e in elements {
        out.push(call(vm, f, vec![e])?);
    }
    Ok(Value::Heap(vm.heap.alloc_array(out)))
}

pub fn filter(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "filter")?;
    let f = arg(args, 1);
    let mut out = Vec::new();
    for e in elements {
        if call(vm, f, vec![e])?.is_truthy() {
            out.push(e);
        }
    }
    Ok(Value::Heap(vm.heap.alloc_array(out)))
}

pub fn reduce(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "reduce")?;
    let f = arg(args, 1);
    let mut acc = arg(args, 2);
    for e in elements {
        acc = call(vm, f, vec![acc, e])?;
    }
    Ok(acc)
}

pub fn all(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "all")?;
    let f = arg(args, 1);
    for e in elements {
        if !call(vm, f, vec![e])?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn any(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), "any")?;
    let f = arg(args, 1);
    for e in elements {
        if call(vm, f, vec![e])?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn numeric_extreme(vm: &Vm, args: &[Value], who: &str, pick_min: bool) -> NativeResult {
    let elements = array_elements(vm, arg(args, 0), who)?;
    let mut best: Option<Value> = None;
    for e in elements {
        let n = e.as_number().ok_or_else(|| format!("{who} requires numeric elements"))?;
        best = match best {
            None => Some(e),
            Some(b) => {
                let bn = b.as_number().unwrap();
                let take = if pick_min { n < bn } else { n > bn };
                Some(if take { e } else { b })
            }
        };
    }
    Ok(best.unwrap_or(Value::Nil))
}

pub fn min(vm: &mut Vm, args: &[Value]) -> NativeResult {
    numeric_extreme(vm, args, "min", true)
}

pub fn max(vm: &mut Vm, args: &[Value]) -> NativeResult {
    numeric_extreme(vm, args, "max", false)
}

/// Sorts ascending. With a second argument, calls it as `cmp(a, b)` and
/// treats a truthy result as "`a` sorts before `b`"; otherwise compares
/// numerically. Insertion sort, since the comparator may itself fail.
pub fn sort(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let mut elements = array_elements(vm, arg(args, 0), "sort")?;
    let cmp = if args.len() > 1 { Some(arg(args, 1)) } else { None };
    for i in 1..elements.len() {
        let mut j = i;
        while j > 0 {
            let before = less_than(vm, cmp, elements[j], elements[j - 1])?;
            if !before {
                break;
            }
            elements.swap(j, j - 1);
            j -= 1;
        }
    }
    Ok(Value::Heap(vm.heap.alloc_array(elements)))
}

fn less_than(vm: &mut Vm, cmp: Option<Value>, a: Value, b: Value) -> Result<bool, String> {
    match cmp {
        Some(f) => Ok(call(vm, f, vec![a, b])?.is_truthy()),
        None => {
            let (x, y) = (
                a.as_number().ok_or("sort requires numeric elements or an explicit comparator")?,
                b.as_number().ok_or("sort requires numeric elements or an explicit comparator")?,
            );
            Ok(x < y)
        }
    }
}
