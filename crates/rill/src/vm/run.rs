//! The dispatch loop: reads one instruction, switches on its opcode,
//! mutates the stack/frame, and advances or jumps the instruction pointer
//! (§4.5).

use tracing::{trace, warn};

use crate::bytecode::code::CodeObject;
use crate::bytecode::op::Op;
use crate::bytecode::Program;
use crate::heap::gc::Collector;
use crate::heap::{GcObject, Heap, HeapId};
use crate::natives;
use crate::resource::{ResourceLimits, ResourceTracker};
use crate::types::function::{FunctionObj, ResumeState};
use crate::types::iterator::IteratorObj;
use crate::value::Value;
use crate::vm::frame::{SavedContext, StackFrame};
use crate::vm::ops;
use crate::vm::{ExecutionContext, RuntimeError};

/// Outcome of one `yield`-suspendable run: either it ran to completion, or
/// it suspended on a coroutine `yield`.
pub enum RunOutcome {
    Completed(Value),
    Yielded(Value),
}

/// What `drive_loop` should do after one `step`: keep stepping with an
/// updated `ip`, re-loop immediately because a frame was pushed or popped
/// (so the caller's `frame_idx` is stale), or the whole run is done.
enum StepControl {
    Advance(usize),
    Continue,
    Return(RunOutcome),
}

pub struct Vm<'a> {
    pub program: &'a Program,
    pub heap: &'a mut Heap,
    pub globals: &'a mut Vec<Value>,
    pub gc: &'a mut Collector,
    pub limits: &'a ResourceLimits,
    pub tracker: &'a mut ResourceTracker,
    /// Where `print` writes; a `Vec<u8>` in tests, stdout in the CLI
    /// (teacher's `PrintWriter` pattern, see `natives::io`).
    pub output: &'a mut dyn std::io::Write,
    /// Every [`ExecutionContext`] currently mid-`drive` on the Rust call
    /// stack, innermost last: the top-level call plus one entry per
    /// re-entrant native-to-script call (`each`/`map`/a user iterator's
    /// `has_next`/`get_next`/...). `drive` pushes its `ctx` on entry and
    /// pops it on every exit path, so a GC pass mid-call can still root
    /// over an *outer*, currently-suspended context's locals and stack
    /// (§4.6) even though that context only exists as a local variable in
    /// a caller's Rust stack frame, not as a field of `Vm` itself.
    context_roots: Vec<*const ExecutionContext>,
}

impl<'a> Vm<'a> {
    fn function_obj(&self, id: HeapId) -> &FunctionObj {
        match self.heap.get(id) {
            GcObject::Function(f) => f,
            _ => panic!("heap id does not reference a Function object"),
        }
    }

    fn code_of(&self, function_id: HeapId) -> &CodeObject {
        let const_index = self.function_obj(function_id).const_index;
        self.program.code(const_index)
    }

    /// Visits every GC root: the globals vector, every live execution
    /// context's value stack, and every one of its frames' locals, `$$`
    /// anonymous-argument array, and `this` (§4.6). `contexts` is a
    /// snapshot of `self.context_roots` taken by the caller so this can run
    /// inside the closure handed to `Collector::garbage_collect` without
    /// re-borrowing `self`.
    fn visit_roots(globals: &[Value], contexts: &[*const ExecutionContext], visit: &mut dyn FnMut(Value)) {
        for g in globals {
            visit(*g);
        }
        for ctx_ptr in contexts {
            // SAFETY: every pointer here was pushed by a `drive` call that
            // is still on the Rust call stack (popped before it returns),
            // so the `ExecutionContext` it points to outlives this visit.
            let ctx = unsafe { &**ctx_ptr };
            for frame in &ctx.frames {
                for v in &frame.locals {
                    visit(*v);
                }
                visit(Value::Heap(frame.args_array));
                visit(frame.this);
            }
            for v in &ctx.stack {
                visit(*v);
            }
        }
    }

    fn maybe_collect(&mut self) {
        let steps = self.limits.gc_steps_per_instruction;
        let globals = self.globals.clone();
        let contexts = self.context_roots.clone();
        self.gc.garbage_collect(self.heap, steps, |visit| {
            Self::visit_roots(&globals, &contexts, visit);
        });
    }

    /// Runs a burst of extra GC steps on demand, for the `garbage_collect`
    /// native. Roots the same way `maybe_collect` does: globals, plus every
    /// live execution context's frames and stack, which covers the calling
    /// script's locals even though the native itself holds no `ctx`.
    pub fn run_gc_burst(&mut self, steps: usize) {
        let globals = self.globals.clone();
        let contexts = self.context_roots.clone();
        self.gc.garbage_collect(self.heap, steps, |visit| {
            Self::visit_roots(&globals, &contexts, visit);
        });
    }

    /// Wraps a callable value as an iterator, the shared logic behind the
    /// `MakeIterator` opcode and the `make_iterator` native.
    pub fn make_iterator_value(&mut self, v: Value) -> Result<Value, String> {
        let it = self.make_iterator(v).map_err(|e| e.message)?;
        Ok(Value::Heap(self.heap.alloc_iterator(it)))
    }

    /// `iterator_has_next` native and opcode share this.
    pub fn iterator_has_next_value(&mut self, it: Value) -> Result<bool, String> {
        let mut ctx = ExecutionContext::new();
        self.iterator_has_next(it, &mut ctx).map_err(|e| e.message)
    }

    /// `iterator_get_next` native and opcode share this.
    pub fn iterator_get_next_value(&mut self, it: Value) -> Result<Value, String> {
        let mut ctx = ExecutionContext::new();
        self.iterator_get_next(it, &mut ctx).map_err(|e| e.message)
    }

    /// Calls a value (native or scripted) with already-evaluated arguments,
    /// the entry point natives use to re-enter the VM (§5, §6).
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>, this: Value) -> Result<Value, RuntimeError> {
        match callee {
            Value::Native(idx) => natives::dispatch(self, idx, &args).map_err(RuntimeError::new),
            Value::Heap(id) if matches!(self.heap.get(id), GcObject::Function(_)) => {
                self.tracker.enter_call(self.limits).map_err(RuntimeError::new)?;
                let result = self.run_function(id, args, this);
                self.tracker.exit_call();
                result.map(|o| match o {
                    RunOutcome::Completed(v) => v,
                    RunOutcome::Yielded(v) => v,
                })
            }
            _ => Err(RuntimeError::new(format!("value of type `{}` is not callable", callee.type_name(self.heap)))),
        }
    }

    fn make_call_frame(&mut self, function_id: HeapId, args: Vec<Value>, this: Value) -> StackFrame {
        let code = self.code_of(function_id).clone();
        let named = code.named_param_count.max(0) as usize;
        let mut locals = vec![Value::Nil; code.local_count.max(0) as usize];
        for (i, v) in args.iter().take(named).enumerate() {
            locals[i] = *v;
        }
        let overflow: Vec<Value> = if args.len() > named { args[named..].to_vec() } else { Vec::new() };
        let args_array = self.heap.alloc_array(overflow);
        let mut frame = StackFrame::new(function_id, locals.len(), args_array, this);
        frame.locals = locals;
        frame
    }

    /// Runs `function_id` to completion (or to its first `yield`, if it's a
    /// coroutine instance being resumed for the first time).
    pub fn run_function(&mut self, function_id: HeapId, args: Vec<Value>, this: Value) -> Result<RunOutcome, RuntimeError> {
        let is_coroutine = self.function_obj(function_id).is_coroutine();
        let mut ctx = ExecutionContext::new();

        if is_coroutine {
            let resumed = {
                let f = self.function_obj(function_id);
                f.coroutine.as_ref().map(|c| c.resume_state)
            };
            match resumed {
                Some(ResumeState::Started) => {
                    let saved = match &mut self.heap.get_mut(function_id) {
                        GcObject::Function(f) => f.coroutine.as_mut().and_then(|c| c.saved.take()),
                        _ => None,
                    };
                    let SavedContext { frames, stack } = saved.expect("Started coroutine missing saved state");
                    ctx.frames = frames;
                    ctx.stack = stack;
                }
                Some(ResumeState::Finished) => {
                    return Ok(RunOutcome::Completed(Value::Nil));
                }
                _ => {
                    let frame = self.make_call_frame(function_id, args, this);
                    ctx.frames.push(frame);
                }
            }
        } else {
            let frame = self.make_call_frame(function_id, args, this);
            ctx.frames.push(frame);
        }

        let outcome = self.drive(&mut ctx)?;

        if is_coroutine {
            if let GcObject::Function(f) = self.heap.get_mut(function_id) {
                if let Some(state) = f.coroutine.as_mut() {
                    match &outcome {
                        RunOutcome::Yielded(_) => {
                            state.resume_state = ResumeState::Started;
                            state.saved = Some(SavedContext {
                                frames: ctx.frames,
                                stack: ctx.stack,
                            });
                        }
                        RunOutcome::Completed(_) => {
                            state.resume_state = ResumeState::Finished;
                            state.saved = None;
                        }
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Registers `ctx` as a live GC root for the duration of the drive loop
    /// (popped on every exit path, including an early `?`-propagated
    /// error) and runs it.
    fn drive(&mut self, ctx: &mut ExecutionContext) -> Result<RunOutcome, RuntimeError> {
        self.context_roots.push(ctx as *const ExecutionContext);
        let result = self.drive_loop(ctx);
        self.context_roots.pop();
        result
    }

    /// The "called from here" label for one frame: its source line, where
    /// the line table covers it, else the raw instruction index (§7).
    fn frame_label(&self, function_id: HeapId, ip: usize) -> String {
        match self.code_of(function_id).line_for(ip) {
            Some(line) => format!("line {line}"),
            None => format!("instruction {ip}"),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn drive_loop(&mut self, ctx: &mut ExecutionContext) -> Result<RunOutcome, RuntimeError> {
        loop {
            let frame_idx = ctx.frames.len() - 1;
            let function_id = ctx.frames[frame_idx].function;
            let code = self.code_of(function_id).clone();
            let ip = ctx.frames[frame_idx].ip;

            match self.step(ctx, frame_idx, function_id, &code, ip) {
                Ok(StepControl::Advance(next_ip)) => {
                    ctx.frames[frame_idx].ip = next_ip;
                    self.maybe_collect();
                }
                Ok(StepControl::Continue) => {}
                Ok(StepControl::Return(outcome)) => return Ok(outcome),
                Err(err) => {
                    // Every frame still on `ctx.frames` observes this error
                    // unwinding through it, innermost first (§5, §7).
                    let mut err = err.with_frame(self.frame_label(function_id, ip));
                    for ancestor in ctx.frames[..frame_idx].iter().rev() {
                        err = err.with_frame(self.frame_label(ancestor.function, ancestor.ip.saturating_sub(1)));
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Executes one instruction. Kept separate from `drive_loop` so every
    /// error it produces funnels through one `Result`, letting the caller
    /// attach a "called from here" frame label uniformly instead of at
    /// scattered call sites.
    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        ctx: &mut ExecutionContext,
        frame_idx: usize,
        function_id: HeapId,
        code: &CodeObject,
        ip: usize,
    ) -> Result<StepControl, RuntimeError> {
        let Some(inst) = code.instructions.get(ip).copied() else {
            return Err(RuntimeError::new("instruction pointer ran past the end of the function"));
        };
        trace!(?inst.op, ip, "dispatch");
        let mut next_ip = ip + 1;

        macro_rules! frame {
            () => {
                ctx.frames[frame_idx]
            };
        }

        match inst.op {
            Op::Pop => {
                ctx.stack.pop();
            }
            Op::PopN => {
                let n = inst.operand as usize;
                let new_len = ctx.stack.len().saturating_sub(n);
                ctx.stack.truncate(new_len);
            }
            Op::Rotate2 => {
                let len = ctx.stack.len();
                ctx.stack.swap(len - 1, len - 2);
            }
            Op::MoveToTOS2 => {
                let top = ctx.stack.pop().expect("stack underflow");
                let len = ctx.stack.len();
                ctx.stack.insert(len - 1, top);
            }
            Op::Duplicate => {
                let top = *ctx.stack.last().expect("stack underflow");
                ctx.stack.push(top);
            }
            Op::Unpack => {
                let n = inst.operand as usize;
                let value = ctx.stack.pop().expect("stack underflow");
                let elements = match value {
                    Value::Heap(id) => match self.heap.get(id) {
                        GcObject::Array(a) => a.elements.clone(),
                        _ => return Err(RuntimeError::new("cannot destructure a non-array value")),
                    },
                    _ => return Err(RuntimeError::new("cannot destructure a non-array value")),
                };
                for i in 0..n {
                    ctx.stack.push(*elements.get(i).unwrap_or(&Value::Nil));
                }
            }

            Op::LoadConstant => {
                ctx.stack.push(self.constant_value(inst.operand));
            }
            Op::LoadGlobal => {
                ctx.stack.push(*self.globals.get(inst.operand as usize).unwrap_or(&Value::Nil));
            }
            Op::LoadLocal => {
                ctx.stack.push(frame!().locals[inst.operand as usize]);
            }
            Op::LoadNative => {
                ctx.stack.push(Value::Native(inst.operand));
            }
            Op::LoadArgument => {
                let args_id = frame!().args_array;
                let v = match self.heap.get(args_id) {
                    GcObject::Array(a) => a.get(inst.operand as i64),
                    _ => Value::Nil,
                };
                ctx.stack.push(v);
            }
            Op::LoadArgsArray => {
                ctx.stack.push(Value::Heap(frame!().args_array));
            }
            Op::LoadThis => {
                ctx.stack.push(frame!().this);
            }
            Op::LoadHash => {
                ctx.stack.push(Value::Int(i64::from(inst.operand)));
            }
            Op::LoadFromBox => {
                let boxed = frame!().locals[inst.operand as usize];
                let v = match boxed {
                    Value::Heap(id) => match self.heap.get(id) {
                        GcObject::Box(b) => b.0,
                        _ => return Err(RuntimeError::new("local slot is not a box")),
                    },
                    _ => return Err(RuntimeError::new("local slot is not a box")),
                };
                ctx.stack.push(v);
            }
            Op::LoadFromClosure => {
                let v = self.function_obj(function_id).closure[inst.operand as usize];
                ctx.stack.push(v);
            }

            Op::StoreLocal | Op::PopStoreLocal => {
                let v = *ctx.stack.last().expect("stack underflow");
                frame!().locals[inst.operand as usize] = v;
                if inst.op == Op::PopStoreLocal {
                    ctx.stack.pop();
                }
            }
            Op::StoreGlobal | Op::PopStoreGlobal => {
                let v = *ctx.stack.last().expect("stack underflow");
                let idx = inst.operand as usize;
                if idx >= self.globals.len() {
                    self.globals.resize(idx + 1, Value::Nil);
                }
                self.globals[idx] = v;
                if inst.op == Op::PopStoreGlobal {
                    ctx.stack.pop();
                }
            }
            Op::StoreToBox | Op::PopStoreToBox => {
                let v = *ctx.stack.last().expect("stack underflow");
                let boxed = frame!().locals[inst.operand as usize];
                if let Value::Heap(id) = boxed {
                    if let GcObject::Box(b) = self.heap.get_mut(id) {
                        b.0 = v;
                    }
                    self.gc.write_barrier(self.heap, id, v);
                }
                if inst.op == Op::PopStoreToBox {
                    ctx.stack.pop();
                }
            }
            Op::StoreToClosure | Op::PopStoreToClosure => {
                let v = *ctx.stack.last().expect("stack underflow");
                if let GcObject::Function(f) = self.heap.get_mut(function_id) {
                    f.closure[inst.operand as usize] = v;
                }
                self.gc.write_barrier(self.heap, function_id, v);
                if inst.op == Op::PopStoreToClosure {
                    ctx.stack.pop();
                }
            }

            Op::MakeArray => {
                let n = inst.operand as usize;
                let start = ctx.stack.len() - n;
                let elements = ctx.stack.split_off(start);
                ctx.stack.push(Value::Heap(self.heap.alloc_array(elements)));
            }
            Op::LoadElement => {
                let index = ctx.stack.pop().expect("stack underflow");
                let object = ctx.stack.pop().expect("stack underflow");
                let result = self.load_element(object, index)?;
                ctx.stack.push(result);
            }
            Op::StoreElement | Op::PopStoreElement => {
                let value = *ctx.stack.last().expect("stack underflow");
                let index = ctx.stack[ctx.stack.len() - 2];
                let object = ctx.stack[ctx.stack.len() - 3];
                self.store_element(object, index, value)?;
                let pop_n = if inst.op == Op::PopStoreElement { 3 } else { 2 };
                let new_len = ctx.stack.len() - pop_n;
                ctx.stack.truncate(new_len);
                if inst.op == Op::StoreElement {
                    ctx.stack.push(value);
                }
            }
            Op::ArrayPushBack => {
                let value = ctx.stack.pop().expect("stack underflow");
                let object = *ctx.stack.last().expect("stack underflow");
                if let Value::Heap(id) = object {
                    if let GcObject::Array(a) = self.heap.get_mut(id) {
                        a.push_back(value);
                    }
                    self.gc.write_barrier(self.heap, id, value);
                }
            }
            Op::ArrayPopBack => {
                let object = ctx.stack.pop().expect("stack underflow");
                let popped = match object {
                    Value::Heap(id) => match self.heap.get_mut(id) {
                        GcObject::Array(a) => a.pop_back(),
                        _ => None,
                    },
                    _ => None,
                };
                match popped {
                    Some(v) => ctx.stack.push(v),
                    None => return Err(RuntimeError::new("`>>` on an empty array")),
                }
            }
            Op::MakeObject => {
                let n = inst.operand as usize;
                let raw = ctx.stack.split_off(ctx.stack.len() - 2 * n);
                let mut members = Vec::with_capacity(n);
                for pair in raw.chunks(2) {
                    let hash = match pair[0] {
                        Value::Int(h) => h as u32,
                        _ => return Err(RuntimeError::new("object key must be a hash value")),
                    };
                    members.push((hash, pair[1]));
                }
                members.sort_by_key(|(h, _)| *h);
                members.dedup_by_key(|(h, _)| *h);
                ctx.stack.push(Value::Heap(self.heap.alloc_object(members)));
            }
            Op::MakeEmptyObject => {
                ctx.stack.push(Value::Heap(self.heap.alloc_object(Vec::new())));
            }
            Op::LoadMember => {
                let hash = match ctx.stack.pop().expect("stack underflow") {
                    Value::Int(h) => h as u32,
                    _ => return Err(RuntimeError::new("member hash must be an integer")),
                };
                let object = ctx.stack.pop().expect("stack underflow");
                let id = match object {
                    Value::Heap(id) if matches!(self.heap.get(id), GcObject::Object(_)) => id,
                    _ => return Err(RuntimeError::new("member access on a non-object value")),
                };
                ctx.stack.push(ops::load_member(self.heap, id, hash));
                ctx.last_object = Some(id);
            }
            Op::StoreMember | Op::PopStoreMember => {
                let value = *ctx.stack.last().expect("stack underflow");
                let hash = match ctx.stack[ctx.stack.len() - 2] {
                    Value::Int(h) => h as u32,
                    _ => return Err(RuntimeError::new("member hash must be an integer")),
                };
                let object = ctx.stack[ctx.stack.len() - 3];
                let id = match object {
                    Value::Heap(id) if matches!(self.heap.get(id), GcObject::Object(_)) => id,
                    _ => return Err(RuntimeError::new("member assignment on a non-object value")),
                };
                ops::store_member(self.heap, self.gc, id, hash, value);
                let pop_n = if inst.op == Op::PopStoreMember { 3 } else { 2 };
                let new_len = ctx.stack.len() - pop_n;
                ctx.stack.truncate(new_len);
                if inst.op == Op::StoreMember {
                    ctx.stack.push(value);
                }
            }

            Op::MakeIterator => {
                let v = ctx.stack.pop().expect("stack underflow");
                let it = self.make_iterator(v)?;
                ctx.stack.push(Value::Heap(self.heap.alloc_iterator(it)));
            }
            Op::IteratorHasNext => {
                let it = *ctx.stack.last().expect("stack underflow");
                let has_next = self.iterator_has_next(it, ctx)?;
                ctx.stack.push(Value::Bool(has_next));
            }
            Op::IteratorGetNext => {
                let it = *ctx.stack.last().expect("stack underflow");
                let v = self.iterator_get_next(it, ctx)?;
                ctx.stack.push(v);
            }

            Op::MakeBox => {
                let v = frame!().locals[inst.operand as usize];
                let box_id = self.heap.alloc_box(v);
                frame!().locals[inst.operand as usize] = Value::Heap(box_id);
            }
            Op::MakeClosure => {
                let func_value = ctx.stack.pop().expect("stack underflow");
                let const_index = match func_value {
                    Value::Heap(id) => match self.heap.get(id) {
                        GcObject::Function(f) => f.const_index,
                        _ => return Err(RuntimeError::new("MakeClosure on a non-function constant")),
                    },
                    _ => return Err(RuntimeError::new("MakeClosure on a non-function constant")),
                };
                let mapping = self.program.code(const_index).closure_mapping.clone();
                let outer_closure = self.function_obj(function_id).closure.clone();
                let mut closure = Vec::with_capacity(mapping.len());
                for m in mapping {
                    if m >= 0 {
                        closure.push(frame!().locals[m as usize]);
                    } else {
                        let idx = (-m - 1) as usize;
                        closure.push(outer_closure[idx]);
                    }
                }
                let new_fn = self.heap.alloc_function(FunctionObj::plain(const_index, closure));
                ctx.stack.push(Value::Heap(new_fn));
            }

            Op::Jump => {
                next_ip = inst.operand as usize;
            }
            Op::JumpIfFalse => {
                let v = *ctx.stack.last().expect("stack underflow");
                if !v.is_truthy() {
                    next_ip = inst.operand as usize;
                }
            }
            Op::PopJumpIfFalse => {
                let v = ctx.stack.pop().expect("stack underflow");
                if !v.is_truthy() {
                    next_ip = inst.operand as usize;
                }
            }
            Op::JumpIfFalseOrPop => {
                let v = *ctx.stack.last().expect("stack underflow");
                if !v.is_truthy() {
                    next_ip = inst.operand as usize;
                } else {
                    ctx.stack.pop();
                }
            }
            Op::JumpIfTrueOrPop => {
                let v = *ctx.stack.last().expect("stack underflow");
                if v.is_truthy() {
                    next_ip = inst.operand as usize;
                } else {
                    ctx.stack.pop();
                }
            }
            Op::FunctionCall => {
                let argc = inst.operand as usize;
                let callee = ctx.stack.pop().expect("stack underflow");
                let mut args = ctx.stack.split_off(ctx.stack.len() - argc);
                args.reverse();
                frame!().ip = next_ip;
                match callee {
                    Value::Native(idx) => {
                        let result = natives::dispatch(self, idx, &args).map_err(RuntimeError::new)?;
                        ctx.stack.push(result);
                    }
                    Value::Heap(id) if matches!(self.heap.get(id), GcObject::Function(_)) => {
                        let this = ctx.last_object.take().map_or(Value::Nil, Value::Heap);
                        self.tracker.enter_call(self.limits).map_err(RuntimeError::new)?;
                        let new_frame = self.make_call_frame(id, args, this);
                        ctx.frames.push(new_frame);
                    }
                    other => {
                        return Err(RuntimeError::new(format!(
                            "value of type `{}` is not callable",
                            other.type_name(self.heap)
                        )))
                    }
                }
                return Ok(StepControl::Continue);
            }
            Op::Yield => {
                let v = ctx.stack.pop().expect("stack underflow");
                frame!().ip = next_ip;
                return Ok(StepControl::Return(RunOutcome::Yielded(v)));
            }
            Op::EndFunction => {
                let result = ctx.stack.pop().unwrap_or(Value::Nil);
                ctx.frames.pop();
                self.tracker.exit_call();
                if ctx.frames.is_empty() {
                    return Ok(StepControl::Return(RunOutcome::Completed(result)));
                }
                ctx.stack.push(result);
                return Ok(StepControl::Continue);
            }

            Op::Add | Op::Subtract | Op::Multiply | Op::Divide | Op::Modulo | Op::Power | Op::Concatenate | Op::Xor | Op::Equal
            | Op::NotEqual | Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual => {
                let rhs = ctx.stack.pop().expect("stack underflow");
                let lhs = ctx.stack.pop().expect("stack underflow");
                let symbol = binary_symbol(inst.op);
                let result = ops::binary_numeric_or_structural(self.heap, symbol, lhs, rhs).map_err(RuntimeError::new)?;
                ctx.stack.push(result);
            }
            Op::UnaryPlus | Op::UnaryMinus | Op::UnaryNot | Op::UnaryConcatenate | Op::UnarySizeOf => {
                let operand = ctx.stack.pop().expect("stack underflow");
                let symbol = unary_symbol(inst.op);
                let result = ops::unary(self.heap, symbol, operand).map_err(RuntimeError::new)?;
                ctx.stack.push(result);
            }
        }

        Ok(StepControl::Advance(next_ip))
    }

    fn constant_value(&mut self, idx: u32) -> Value {
        match &self.program.constants[idx as usize] {
            crate::bytecode::Constant::Nil => Value::Nil,
            crate::bytecode::Constant::Bool(b) => Value::Bool(*b),
            crate::bytecode::Constant::Int(i) => Value::Int(*i),
            crate::bytecode::Constant::Float(f) => Value::Float(*f),
            crate::bytecode::Constant::Str(s) => Value::Heap(self.heap.alloc_string(s.clone())),
            crate::bytecode::Constant::Code(_) => Value::Heap(self.heap.alloc_function(FunctionObj::plain(idx, Vec::new()))),
        }
    }

    fn load_element(&mut self, object: Value, index: Value) -> Result<Value, RuntimeError> {
        match object {
            Value::Heap(id) => match self.heap.get(id) {
                GcObject::Array(a) => {
                    let i = index.as_int().ok_or_else(|| RuntimeError::new("array index must be an integer"))?;
                    Ok(a.get(i))
                }
                GcObject::Str(s) => {
                    let i = index.as_int().ok_or_else(|| RuntimeError::new("string index must be an integer"))?;
                    let i = if i < 0 { (i + s.len() as i64).max(0) } else { i };
                    match s.char_at(i as usize) {
                        Some(c) => Ok(Value::Heap(self.heap.alloc_string(c))),
                        None => Ok(Value::Nil),
                    }
                }
                _ => Err(RuntimeError::new("indexing requires an array or string")),
            },
            _ => Err(RuntimeError::new("indexing requires an array or string")),
        }
    }

    fn store_element(&mut self, object: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
        let id = match object {
            Value::Heap(id) if matches!(self.heap.get(id), GcObject::Array(_)) => id,
            _ => return Err(RuntimeError::new("element assignment requires an array")),
        };
        let i = index.as_int().ok_or_else(|| RuntimeError::new("array index must be an integer"))?;
        if let GcObject::Array(a) = self.heap.get_mut(id) {
            a.set(i, value);
        }
        self.gc.write_barrier(self.heap, id, value);
        Ok(())
    }

    fn make_iterator(&mut self, v: Value) -> Result<IteratorObj, RuntimeError> {
        match v {
            Value::Heap(id) => match self.heap.get(id) {
                GcObject::Array(_) => Ok(IteratorObj::Array { target: id, pos: 0 }),
                GcObject::Str(_) => Ok(IteratorObj::Str { target: id, pos: 0 }),
                GcObject::Iterator(existing) => Ok(existing.clone()),
                GcObject::Function(f) if f.is_coroutine() => Ok(IteratorObj::Coroutine { function: id }),
                GcObject::Object(_) => Ok(IteratorObj::UserObject {
                    target: id,
                    validated: false,
                }),
                _ => Err(RuntimeError::new("value is not iterable")),
            },
            _ => Err(RuntimeError::new("value is not iterable")),
        }
    }

    fn iterator_has_next(&mut self, it: Value, ctx: &mut ExecutionContext) -> Result<bool, RuntimeError> {
        let Value::Heap(it_id) = it else {
            return Err(RuntimeError::new("IteratorHasNext on a non-iterator value"));
        };
        let snapshot = match self.heap.get(it_id) {
            GcObject::Iterator(i) => i.clone(),
            _ => return Err(RuntimeError::new("IteratorHasNext on a non-iterator value")),
        };
        match snapshot {
            IteratorObj::Array { target, pos } => match self.heap.get(target) {
                GcObject::Array(a) => Ok(pos < a.len()),
                _ => Ok(false),
            },
            IteratorObj::Str { target, pos } => match self.heap.get(target) {
                GcObject::Str(s) => Ok(pos < s.len()),
                _ => Ok(false),
            },
            IteratorObj::UserObject { target, .. } => {
                let has_next_hash = crate::intern::hash_name("has_next");
                let method = ops::load_member(self.heap, target, has_next_hash);
                let result = self.call_value(method, Vec::new(), Value::Heap(target))?;
                Ok(result.is_truthy())
            }
            IteratorObj::Coroutine { function } => {
                let finished = matches!(
                    self.function_obj(function).coroutine.as_ref().map(|c| c.resume_state),
                    Some(ResumeState::Finished)
                );
                if finished {
                    return Ok(false);
                }
                let outcome = self.run_function(function, Vec::new(), Value::Nil)?;
                match outcome {
                    RunOutcome::Yielded(v) => {
                        if let GcObject::Function(f) = self.heap.get_mut(function) {
                            if let Some(state) = f.coroutine.as_mut() {
                                state.last_yielded = Some(v);
                            }
                        }
                        Ok(true)
                    }
                    RunOutcome::Completed(_) => Ok(false),
                }
            }
        }
        .inspect(|_| {
            let _ = (&ctx, &it_id);
        })
    }

    fn iterator_get_next(&mut self, it: Value, _ctx: &mut ExecutionContext) -> Result<Value, RuntimeError> {
        let Value::Heap(it_id) = it else {
            return Err(RuntimeError::new("IteratorGetNext on a non-iterator value"));
        };
        let snapshot = match self.heap.get(it_id) {
            GcObject::Iterator(i) => i.clone(),
            _ => return Err(RuntimeError::new("IteratorGetNext on a non-iterator value")),
        };
        match snapshot {
            IteratorObj::Array { target, pos } => {
                let v = match self.heap.get(target) {
                    GcObject::Array(a) => a.elements.get(pos).copied().unwrap_or(Value::Nil),
                    _ => Value::Nil,
                };
                if let GcObject::Iterator(i) = self.heap.get_mut(it_id) {
                    *i = IteratorObj::Array { target, pos: pos + 1 };
                }
                Ok(v)
            }
            IteratorObj::Str { target, pos } => {
                let v = match self.heap.get(target) {
                    GcObject::Str(s) => s.char_at(pos),
                    _ => None,
                };
                if let GcObject::Iterator(i) = self.heap.get_mut(it_id) {
                    *i = IteratorObj::Str { target, pos: pos + 1 };
                }
                match v {
                    Some(c) => Ok(Value::Heap(self.heap.alloc_string(c))),
                    None => Ok(Value::Nil),
                }
            }
            IteratorObj::UserObject { target, .. } => {
                let get_next_hash = crate::intern::hash_name("get_next");
                let method = ops::load_member(self.heap, target, get_next_hash);
                self.call_value(method, Vec::new(), Value::Heap(target))
            }
            IteratorObj::Coroutine { function } => {
                let taken = match self.heap.get_mut(function) {
                    GcObject::Function(f) => f.coroutine.as_mut().and_then(|c| c.last_yielded.take()),
                    _ => None,
                };
                match taken {
                    Some(v) => Ok(v),
                    None => {
                        warn!("iterator_get_next called without a preceding has_next that yielded");
                        Ok(Value::Nil)
                    }
                }
            }
        }
    }
}

fn binary_symbol(op: Op) -> &'static str {
    match op {
        Op::Add => "+",
        Op::Subtract => "-",
        Op::Multiply => "*",
        Op::Divide => "/",
        Op::Modulo => "%",
        Op::Power => "^",
        Op::Concatenate => "~",
        Op::Xor => "xor",
        Op::Equal => "==",
        Op::NotEqual => "!=",
        Op::Less => "<",
        Op::Greater => ">",
        Op::LessEqual => "<=",
        Op::GreaterEqual => ">=",
        _ => unreachable!(),
    }
}

fn unary_symbol(op: Op) -> &'static str {
    match op {
        Op::UnaryPlus => "+",
        Op::UnaryMinus => "-",
        Op::UnaryNot => "not",
        Op::UnaryConcatenate => "~",
        Op::UnarySizeOf => "#",
        _ => unreachable!(),
    }
}
