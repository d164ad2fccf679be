//! Incremental tri-color collector (§4.6): `Ready -> MarkRoots -> Mark ->
//! SweepHead -> SweepRest -> Ready`, bounded per call by a step budget.

use std::collections::VecDeque;

use tracing::trace;

use crate::heap::{Color, Heap, HeapId};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
    Ready,
    MarkRoots,
    Mark,
    SweepHead,
    SweepRest,
}

/// Driver state for the incremental collector; owned by the VM's
/// `Interpreter` so it persists across `garbage_collect(steps)` calls.
#[derive(Debug)]
pub struct Collector {
    stage: Stage,
    gray: VecDeque<HeapId>,
    cursor: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Ready,
            gray: VecDeque::new(),
            cursor: 0,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enqueue_if_white(&mut self, heap: &mut Heap, value: Value) {
        if let Value::Heap(id) = value {
            if heap.color(id) != Color::Static && heap.is_current_white(id) {
                heap.set_color(id, Color::Gray);
                self.gray.push_back(id);
            }
        }
    }

    /// The write barrier (§5): call whenever a `Black` object is mutated to
    /// reference a current-white child. Demotes the parent to Gray and
    /// pushes it back onto the mark worklist, so the invariant "no Black
    /// object holds a direct reference to a White object" keeps holding
    /// without a synchronous re-mark. A no-op once the parent has already
    /// been demoted (it's Gray, not Black, on the next call).
    pub fn write_barrier(&mut self, heap: &mut Heap, parent: HeapId, child: Value) {
        if heap.color(parent) != Color::Black {
            return;
        }
        if let Value::Heap(child_id) = child {
            if heap.is_current_white(child_id) {
                heap.set_color(parent, Color::Gray);
                self.gray.push_back(parent);
            }
        }
    }

    /// Performs up to `steps` units of work, falling through to the next
    /// stage in the same call when the current one is exhausted (§4.6).
    /// `roots` is invoked once, lazily, only when entering `MarkRoots`; it
    /// must call the provided sink for every root `Value` (globals, every
    /// live frame's locals and `$$` array, every context's value stack).
    pub fn garbage_collect(&mut self, heap: &mut Heap, mut steps: usize, roots: impl FnOnce(&mut dyn FnMut(Value))) {
        let mut roots = Some(roots);
        while steps > 0 {
            match self.stage {
                Stage::Ready => {
                    heap.flip();
                    self.stage = Stage::MarkRoots;
                    trace!("gc: Ready -> MarkRoots");
                }
                Stage::MarkRoots => {
                    if let Some(roots) = roots.take() {
                        let mut local_self = &mut *self;
                        let mut sink = |v: Value| local_self.enqueue_if_white(heap, v);
                        roots(&mut sink);
                    }
                    self.stage = Stage::Mark;
                    steps -= 1;
                    trace!("gc: MarkRoots -> Mark");
                }
                Stage::Mark => {
                    if let Some(id) = self.gray.pop_front() {
                        let mut children = Vec::new();
                        heap.get(id).visit_children(|v| children.push(v));
                        for child in children {
                            self.enqueue_if_white(heap, child);
                        }
                        heap.set_color(id, Color::Black);
                        steps -= 1;
                    } else {
                        self.stage = Stage::SweepHead;
                        self.cursor = 0;
                        trace!("gc: Mark -> SweepHead");
                    }
                }
                Stage::SweepHead => {
                    if self.cursor >= heap.slot_count() {
                        self.stage = Stage::Ready;
                        trace!("gc: SweepHead -> Ready (empty heap)");
                        continue;
                    }
                    if self.sweep_one(heap) {
                        // retained: this slot is the anchor, sweep continues from here + 1
                        self.cursor += 1;
                        self.stage = Stage::SweepRest;
                        steps -= 1;
                        trace!("gc: SweepHead -> SweepRest");
                    } else {
                        self.cursor += 1;
                        steps -= 1;
                    }
                }
                Stage::SweepRest => {
                    if self.cursor >= heap.slot_count() {
                        self.stage = Stage::Ready;
                        self.cursor = 0;
                        trace!("gc: SweepRest -> Ready");
                        continue;
                    }
                    self.sweep_one(heap);
                    self.cursor += 1;
                    steps -= 1;
                }
            }
        }
    }

    /// Examines one slot: frees it if unreachable (current-white), else
    /// recolors it to next-white and reports it retained.
    fn sweep_one(&mut self, heap: &mut Heap) -> bool {
        let idx = self.cursor;
        if !heap.slot_is_live(idx) {
            return false;
        }
        let color = heap.slot_color(idx);
        if color == Color::Static {
            return true;
        }
        if color == heap.current_white() {
            heap.free(HeapId(idx));
            false
        } else {
            heap.set_slot_color(idx, heap.next_white());
            true
        }
    }
}
