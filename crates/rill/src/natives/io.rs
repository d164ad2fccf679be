//! `type, print, to_upper, to_lower, garbage_collect, memory_stats` (§6).

use std::io::Write;

use crate::heap::GcObject;
use crate::intern::hash_name;
use crate::natives::{arg, NativeResult};
use crate::value::Value;
use crate::vm::run::Vm;

pub fn type_of(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let name = arg(args, 0).type_name(vm.heap);
    Ok(Value::Heap(vm.heap.alloc_string(name.to_string())))
}

pub fn print(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let parts: Vec<String> = args.iter().map(|v| v.display(vm.heap)).collect();
    let _ = writeln!(vm.output, "{}", parts.join(" "));
    Ok(Value::Nil)
}

fn string_arg(vm: &Vm, args: &[Value], i: usize, who: &str) -> Result<String, String> {
    match arg(args, i) {
        Value::Heap(id) => match vm.heap.get(id) {
            GcObject::Str(s) => Ok(s.0.clone()),
            _ => Err(format!("{who} requires a string argument")),
        },
        _ => Err(format!("{who} requires a string argument")),
    }
}

pub fn to_upper(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let s = string_arg(vm, args, 0, "to_upper")?;
    Ok(Value::Heap(vm.heap.alloc_string(s.to_uppercase())))
}

pub fn to_lower(vm: &mut Vm, args: &[Value]) -> NativeResult {
    let s = string_arg(vm, args, 0, "to_lower")?;
    Ok(Value::Heap(vm.heap.alloc_string(s.to_lowercase())))
}

pub fn garbage_collect(vm: &mut Vm, _args: &[Value]) -> NativeResult {
    vm.run_gc_burst(vm.heap.len().max(64));
    Ok(Value::Nil)
}

pub fn memory_stats(vm: &mut Vm, _args: &[Value]) -> NativeResult {
    let stats = vm.heap.stats;
    let mut members = vec![
        (hash_name("strings"), Value::Int(stats.strings as i64)),
        (hash_name("arrays"), Value::Int(stats.arrays as i64)),
        (hash_name("objects"), Value::Int(stats.objects as i64)),
        (hash_name("boxes"), Value::Int(stats.boxes as i64)),
        (hash_name("iterators"), Value::Int(stats.iterators as i64)),
        (hash_name("functions"), Value::Int(stats.functions as i64)),
        (hash_name("errors"), Value::Int(stats.errors as i64)),
        (hash_name("live"), Value::Int(stats.live as i64)),
        (hash_name("freed"), Value::Int(stats.freed as i64)),
    ];
    members.sort_by_key(|(h, _)| *h);
    Ok(Value::Heap(vm.heap.alloc_object(members)))
}
