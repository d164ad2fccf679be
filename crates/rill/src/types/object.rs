//! Heap object payload: a sorted `(hash, value)` vector with prototype
//! delegation through the reserved `proto` member (hash 0, §4.3, §4.5).

use crate::heap::Heap;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ObjectObj {
    /// Kept sorted by hash so member access can binary-search (§4.5).
    pub members: Vec<(u32, Value)>,
}

pub const PROTO_HASH: u32 = 0;

impl ObjectObj {
    #[must_use]
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    fn position(&self, hash: u32) -> Result<usize, usize> {
        self.members.binary_search_by_key(&hash, |(h, _)| *h)
    }

    #[must_use]
    pub fn get_own(&self, hash: u32) -> Option<Value> {
        self.position(hash).ok().map(|i| self.members[i].1)
    }

    /// Walks the `proto` chain (member 0) until a hit or a non-object proto,
    /// returning `nil` if the member is never found (§4.5).
    #[must_use]
    pub fn get(&self, hash: u32, heap: &Heap) -> Value {
        if let Some(v) = self.get_own(hash) {
            return v;
        }
        let mut current = self.get_own(PROTO_HASH);
        while let Some(Value::Heap(id)) = current {
            if let crate::heap::GcObject::Object(obj) = heap.get(id) {
                if let Some(v) = obj.get_own(hash) {
                    return v;
                }
                current = obj.get_own(PROTO_HASH);
            } else {
                break;
            }
        }
        Value::Nil
    }

    /// Assigns in place on a hit; otherwise walks protos looking for an
    /// existing member to overwrite, and only inserts fresh if none is
    /// found anywhere in the chain (§4.5).
    pub fn set_own_or_insert(&mut self, hash: u32, value: Value) {
        match self.position(hash) {
            Ok(i) => self.members[i].1 = value,
            Err(i) => self.members.insert(i, (hash, value)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<u32> {
        self.members.iter().map(|(h, _)| *h).collect()
    }
}

impl Default for ObjectObj {
    fn default() -> Self {
        Self::new()
    }
}
