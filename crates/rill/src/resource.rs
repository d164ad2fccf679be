//! Ambient resource limits for an embedded interpreter (SPEC_FULL §10.3),
//! mirroring the teacher's `ResourceLimits`/`ResourceTracker` split between
//! an unlimited and a bounded tracker.

/// Caps an [`crate::Interpreter`] run. Defaults are generous enough for
/// ordinary scripts; an embedder running untrusted code should tighten
/// them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    /// Maximum live call-frame depth before the VM raises a runtime error
    /// instead of recursing further.
    pub max_call_depth: usize,
    /// Maximum number of live heap objects before allocation fails.
    pub max_heap_objects: usize,
    /// How many GC work-units `garbage_collect` performs per dispatched
    /// instruction (§4.6).
    pub gc_steps_per_instruction: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_heap_objects: 1_000_000,
            gc_steps_per_instruction: 4,
        }
    }
}

/// Tracks consumption against a [`ResourceLimits`] during one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceTracker {
    pub call_depth: usize,
}

impl ResourceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_call(&mut self, limits: &ResourceLimits) -> Result<(), String> {
        if self.call_depth >= limits.max_call_depth {
            return Err(format!("call depth exceeded the configured limit of {}", limits.max_call_depth));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    pub fn check_heap(&self, heap_len: usize, limits: &ResourceLimits) -> Result<(), String> {
        if heap_len >= limits.max_heap_objects {
            return Err(format!("heap object count exceeded the configured limit of {}", limits.max_heap_objects));
        }
        Ok(())
    }
}
