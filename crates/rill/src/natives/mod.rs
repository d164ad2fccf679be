//! Native function registry (§6). Indices must match
//! `crate::analyzer::NATIVES` exactly, since the analyzer binds identifier
//! references to slots in this same order.

mod collections;
mod coroutine;
mod io;
mod math;

use crate::value::Value;
use crate::vm::run::Vm;

pub type NativeResult = Result<Value, String>;

/// Dispatches a native call by its analyzer-assigned slot.
pub fn dispatch(vm: &mut Vm, idx: u32, args: &[Value]) -> NativeResult {
    match idx {
        0 => io::type_of(vm, args),
        1 => coroutine::this_call(vm, args),
        2 => io::garbage_collect(vm, args),
        3 => io::memory_stats(vm, args),
        4 => io::print(vm, args),
        5 => io::to_upper(vm, args),
        6 => io::to_lower(vm, args),
        7 => collections::keys(vm, args),
        8 => coroutine::make_error(vm, args),
        9 => coroutine::is_error(vm, args),
        10 => coroutine::make_coroutine(vm, args),
        11 => coroutine::make_iterator(vm, args),
        12 => coroutine::iterator_has_next(vm, args),
        13 => coroutine::iterator_get_next(vm, args),
        14 => collections::range(vm, args),
        15 => collections::each(vm, args),
        16 => collections::times(vm, args),
        17 => collections::count(vm, args),
        18 => collections::map(vm, args),
        19 => collections::filter(vm, args),
        20 => collections::reduce(vm, args),
        21 => collections::all(vm, args),
        22 => collections::any(vm, args),
        23 => collections::min(vm, args),
        24 => collections::max(vm, args),
        25 => collections::sort(vm, args),
        26 => math::abs(vm, args),
        27 => math::floor(vm, args),
        28 => math::ceil(vm, args),
        29 => math::round(vm, args),
        30 => math::sqrt(vm, args),
        31 => math::sin(vm, args),
        32 => math::cos(vm, args),
        33 => math::tan(vm, args),
        other => Err(format!("no native function registered at slot {other}")),
    }
}

pub(super) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).copied().unwrap_or(Value::Nil)
}

pub(super) fn require_number(args: &[Value], i: usize, who: &str) -> Result<f64, String> {
    arg(args, i).as_number().ok_or_else(|| format!("{who} requires a numeric argument"))
}
