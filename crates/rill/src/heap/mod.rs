//! The heap arena and its tri-color incremental collector (§4.6).
//!
//! Every reference-bearing runtime value (strings, arrays, objects, boxes,
//! iterators, closures, coroutines, errors) lives in a single arena indexed
//! by [`HeapId`]. Using a generational-free `Vec<Slot>` arena instead of
//! raw pointers keeps the collector entirely in safe Rust, at the cost of
//! the usual arena caveat: an id outliving its slot's generation would be a
//! bug, which is why freed slots are never reused within one VM's lifetime
//! (the VM itself is short-lived per script run; see `gc-stats-strict`
//! in the dev profile for a debug-only reuse check).
//!
//! The write barrier itself lives on [`gc::Collector`], not here: demoting
//! a mutated Black object back to Gray is only half the invariant, it also
//! has to be re-enqueued on the collector's mark worklist, and `Collector`
//! is the only thing holding that queue.

pub mod gc;

use crate::types::array::ArrayObj;
use crate::types::boxed::BoxObj;
use crate::types::error::ErrorObj;
use crate::types::function::FunctionObj;
use crate::types::iterator::IteratorObj;
use crate::types::object::ObjectObj;
use crate::types::string::StringObj;
use crate::value::Value;

/// Index into the heap arena. Stable for the lifetime of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub usize);

/// Tri-color mark used by the incremental collector, plus `Static` for
/// deserialized constants that are never collected (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White0,
    White1,
    Gray,
    Black,
    Static,
}

#[derive(Debug)]
pub enum GcObject {
    Str(StringObj),
    Array(ArrayObj),
    Object(ObjectObj),
    Box(BoxObj),
    Iterator(IteratorObj),
    Function(FunctionObj),
    Error(ErrorObj),
}

impl GcObject {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Box(_) => "box",
            Self::Iterator(_) => "iterator",
            Self::Function(_) => "function",
            Self::Error(_) => "error",
        }
    }

    /// Visits every `Value` this object directly references, for both GC
    /// marking and the write barrier's child-promotion.
    pub fn visit_children(&self, mut visit: impl FnMut(Value)) {
        match self {
            Self::Array(a) => a.elements.iter().copied().for_each(visit),
            Self::Object(o) => o.members.iter().for_each(|(_, v)| visit(*v)),
            Self::Box(b) => visit(b.0),
            Self::Function(f) => f.closure.iter().copied().for_each(visit),
            Self::Iterator(it) => it.visit_children(visit),
            Self::Error(e) => visit(e.payload),
            Self::Str(_) => {}
        }
    }
}

struct Slot {
    color: Color,
    object: Option<GcObject>,
}

/// Per-type allocation counters for `memory_stats` (§6 natives).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStats {
    pub strings: u64,
    pub arrays: u64,
    pub objects: u64,
    pub boxes: u64,
    pub iterators: u64,
    pub functions: u64,
    pub errors: u64,
    pub live: u64,
    pub freed: u64,
}

/// The arena. Slot order doubles as the intrusive heap list the spec's GC
/// sweep walks head-to-tail; new allocations are appended, not prepended,
/// since a `Vec` can't cheaply prepend — sweep direction doesn't depend on
/// insertion order, only on visiting every slot once per cycle.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    current_white: Color,
    pub stats: HeapStats,
}

impl Default for Color {
    fn default() -> Self {
        Color::White0
    }
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            current_white: Color::White0,
            stats: HeapStats::default(),
        }
    }

    fn alloc(&mut self, object: GcObject) -> HeapId {
        let next_white = self.next_white_color();
        let id = HeapId(self.slots.len());
        match &object {
            GcObject::Str(_) => self.stats.strings += 1,
            GcObject::Array(_) => self.stats.arrays += 1,
            GcObject::Object(_) => self.stats.objects += 1,
            GcObject::Box(_) => self.stats.boxes += 1,
            GcObject::Iterator(_) => self.stats.iterators += 1,
            GcObject::Function(_) => self.stats.functions += 1,
            GcObject::Error(_) => self.stats.errors += 1,
        }
        self.stats.live += 1;
        self.slots.push(Slot {
            color: next_white,
            object: Some(object),
        });
        id
    }

    pub fn alloc_string(&mut self, s: String) -> HeapId {
        self.alloc(GcObject::Str(StringObj(s)))
    }

    pub fn alloc_array(&mut self, elements: Vec<Value>) -> HeapId {
        self.alloc(GcObject::Array(ArrayObj { elements }))
    }

    pub fn alloc_object(&mut self, members: Vec<(u32, Value)>) -> HeapId {
        self.alloc(GcObject::Object(ObjectObj { members }))
    }

    pub fn alloc_box(&mut self, value: Value) -> HeapId {
        self.alloc(GcObject::Box(BoxObj(value)))
    }

    pub fn alloc_iterator(&mut self, it: IteratorObj) -> HeapId {
        self.alloc(GcObject::Iterator(it))
    }

    pub fn alloc_function(&mut self, f: FunctionObj) -> HeapId {
        self.alloc(GcObject::Function(f))
    }

    pub fn alloc_error(&mut self, e: ErrorObj) -> HeapId {
        self.alloc(GcObject::Error(e))
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &GcObject {
        self.slots[id.0].object.as_ref().expect("heap slot already freed")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut GcObject {
        self.slots[id.0].object.as_mut().expect("heap slot already freed")
    }

    #[must_use]
    pub fn color(&self, id: HeapId) -> Color {
        self.slots[id.0].color
    }

    pub fn set_color(&mut self, id: HeapId, color: Color) {
        self.slots[id.0].color = color;
    }

    #[must_use]
    pub fn current_white(&self) -> Color {
        self.current_white
    }

    #[must_use]
    pub fn is_current_white(&self, id: HeapId) -> bool {
        self.color(id) == self.current_white
    }

    fn next_white_color(&self) -> Color {
        match self.current_white {
            Color::White0 => Color::White1,
            _ => Color::White0,
        }
    }

    /// Swaps current-white and next-white, the `Ready -> MarkRoots`
    /// transition (§4.6).
    pub fn flip(&mut self) {
        self.current_white = self.next_white_color();
    }

    #[must_use]
    pub fn next_white(&self) -> Color {
        self.next_white_color()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn free(&mut self, id: HeapId) {
        if self.slots[id.0].object.take().is_some() {
            self.stats.live = self.stats.live.saturating_sub(1);
            self.stats.freed += 1;
        }
    }

    /// Number of slots ever allocated, including freed ones — the bound the
    /// sweep stages walk over (§4.6). Freed slots are skipped, not reused.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn slot_is_live(&self, idx: usize) -> bool {
        self.slots[idx].object.is_some()
    }

    #[must_use]
    pub fn slot_color(&self, idx: usize) -> Color {
        self.slots[idx].color
    }

    pub fn set_slot_color(&mut self, idx: usize, color: Color) {
        self.slots[idx].color = color;
    }

    /// Marks `id` static: never collected and never enqueued, used for
    /// constants deserialized from a bytecode blob (§4.6).
    pub fn make_static(&mut self, id: HeapId) {
        self.set_color(id, Color::Static);
    }
}
