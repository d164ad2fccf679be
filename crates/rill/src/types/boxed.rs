//! A single mutable cell, used to give a captured local or parameter a
//! stable heap address once a nested function closes over it (§4.3).

use crate::value::Value;

#[derive(Debug, Clone)]
pub struct BoxObj(pub Value);
