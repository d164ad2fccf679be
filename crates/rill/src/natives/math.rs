//! `abs, floor, ceil, round, sqrt, sin, cos, tan` (§6). All take one
//! numeric argument and return a float, except `abs` which preserves an
//! integer argument's type.

use crate::natives::{arg, require_number, NativeResult};
use crate::value::Value;
use crate::vm::run::Vm;

pub fn abs(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    match arg(args, 0) {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => Err("abs requires a numeric argument".to_string()),
    }
}

pub fn floor(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "floor")?.floor()))
}

pub fn ceil(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "ceil")?.ceil()))
}

pub fn round(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "round")?.round()))
}

pub fn sqrt(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "sqrt")?.sqrt()))
}

pub fn sin(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "sin")?.sin()))
}

pub fn cos(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "cos")?.cos()))
}

pub fn tan(_vm: &mut Vm, args: &[Value]) -> NativeResult {
    Ok(Value::Float(require_number(args, 0, "tan")?.tan()))
}
