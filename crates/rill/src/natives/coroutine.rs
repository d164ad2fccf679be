//! `this_call, make_error, is_error, make_coroutine, make_iterator,
//! iterator_has_next, iterator_get_next` (§6).

use crate::heap::GcObject;
use crate::natives::{arg, NativeResult};
use crate::types::error::ErrorObj;
use crate::types::function::FunctionObj;
use crate::value::Value;
use crate::vm::run::Vm;
use crate::vm::RuntimeError;

/// `this_call(f, this, ...args)`: calls `f` with an explicit `this`,
/// bypassing the member-access `this`-latch (§6).
pub fn this_call(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let callee = arg(args, 0);
    let this = arg(args, 1);
    let rest = if args.len() > 2 { args[2..].to_vec() } else { Vec::new() };
    vm.call_value(callee, rest, this).map_err(|e: RuntimeError| e.message)
}

pub fn make_error(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let payload = arg(args, 0);
    Ok(Value::Heap(vm.heap.alloc_error(ErrorObj { payload })))
}

pub fn is_error(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let is_err = matches!(arg(args, 0), Value::Heap(id) if matches!(vm.heap.get(id), GcObject::Error(_)));
    Ok(Value::Bool(is_err))
}

pub fn make_coroutine(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let callee = arg(args, 0);
    let id = match callee {
        Value::Heap(id) if matches!(vm.heap.get(id), GcObject::Function(_)) => id,
        _ => return Err("make_coroutine requires a function value".to_string()),
    };
    let (const_index, closure) = match vm.heap.get(id) {
        GcObject::Function(f) => (f.const_index, f.closure.clone()),
        _ => unreachable!(),
    };
    Ok(Value::Heap(vm.heap.alloc_function(FunctionObj::coroutine(const_index, closure))))
}

pub fn make_iterator(vm: &mut Vm, args: &[Value]) -> NativeResult {
    vm.make_iterator_value(arg(args, 0))
}

pub fn iterator_has_next(vm: &mut Vm, args: &[Value]) -> NativeResult {
    vm.iterator_has_next_value(arg(args, 0)).map(Value::Bool)
}

pub fn iterator_get_next(vm: &mut Vm, args: &[Value]) -> NativeResult {
    vm.iterator_get_next_value(arg(args, 0))
}
