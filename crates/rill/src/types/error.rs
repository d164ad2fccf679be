//! The `make_error`/`is_error` native bridge's payload: a first-class
//! error value, distinct from the VM's own [`crate::vm::RuntimeError`]
//! propagation (§6).

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ErrorObj {
    pub payload: Value,
}
