//! Emission: walks a decorated AST and writes instructions into the active
//! [`CodeBuilder`] (§4.4).
//!
//! Loop values: a `while`/`for` loop's expression value (when the
//! surrounding context keeps it) is the value of the most recently executed
//! `break <expr>`, or `nil` if the loop ends without one — `continue`
//! never affects it. This is a concrete resolution of an edge the spec
//! leaves implicit; see `DESIGN.md`.

use crate::ast::{BinaryOp, Binding, Function, Node, UnaryOp, VariableKind};
use crate::bytecode::builder::CodeBuilder;
use crate::bytecode::op::Op;
use crate::bytecode::Program;
use crate::intern::hash_name;

struct LoopCtx {
    /// Instruction indices of `Jump` ops emitted by `break`, patched to the
    /// loop's end once known.
    break_patches: Vec<usize>,
    /// Where `continue` jumps back to (the condition / `IteratorHasNext`
    /// check).
    continue_target: usize,
    keep: bool,
    /// Stack slots a `break` must drop before pushing its own value and
    /// jumping out — 1 for a `for` loop's live iterator, 0 for `while`.
    extra_slots: u32,
}

struct FnCtx {
    /// Total stack slots currently open from enclosing `for` loops, which
    /// `return` must drop with `PopN` before pushing its value (§4.4).
    garbage: u32,
    return_patches: Vec<usize>,
}

pub struct Compiler<'p> {
    program: &'p mut Program,
    builders: Vec<CodeBuilder>,
    loops: Vec<LoopCtx>,
    functions: Vec<FnCtx>,
}

impl<'p> Compiler<'p> {
    #[must_use]
    pub fn new(program: &'p mut Program) -> Self {
        Self {
            program,
            builders: Vec::new(),
            loops: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Compiles `function` (and every nested function literal it contains)
    /// into the program's constant pool, returning the root's constant
    /// slot.
    pub fn compile_program(mut self, function: &Function) -> u32 {
        self.compile_function(function)
    }

    fn builder(&mut self) -> &mut CodeBuilder {
        self.builders.last_mut().expect("no active code builder")
    }

    fn fn_ctx(&mut self) -> &mut FnCtx {
        self.functions.last_mut().expect("no active function context")
    }

    fn compile_function(&mut self, f: &Function) -> u32 {
        self.builders
            .push(CodeBuilder::new(f.named_parameters.len() as i32, f.analysis.closure_mapping.clone()));
        self.functions.push(FnCtx {
            garbage: 0,
            return_patches: Vec::new(),
        });

        for &slot in &f.analysis.parameters_to_box {
            self.builder().emit(Op::MakeBox, slot);
        }
        self.emit(&f.body, true);

        let end = self.builder().here();
        self.builder().emit_bare(Op::EndFunction);
        let fctx = self.functions.pop().expect("function context underflow");
        for patch in fctx.return_patches {
            self.builder().patch(patch, end as u32);
        }

        let mut builder = self.builders.pop().expect("code builder underflow");
        builder.set_local_count(f.analysis.local_count as i32);
        let code = builder.build();
        self.program.add_code(code)
    }

    fn load_nil(&mut self) {
        self.builder().emit(Op::LoadConstant, Program::NIL_SLOT);
    }

    fn touch_line(&mut self, at: crate::error::Coords) {
        self.builder().touch_line(at.line as i32);
    }

    /// Emits `node`. `keep` states whether its value must remain on the
    /// stack afterward (§4.4).
    fn emit(&mut self, node: &Node, keep: bool) {
        match node {
            Node::Nil(at) => {
                self.touch_line(*at);
                if keep {
                    self.load_nil();
                }
            }
            Node::Int(v, at) => {
                self.touch_line(*at);
                if keep {
                    let idx = self.program.intern_int(*v);
                    self.builder().emit(Op::LoadConstant, idx);
                }
            }
            Node::Float(v, at) => {
                self.touch_line(*at);
                if keep {
                    let idx = self.program.intern_float(*v);
                    self.builder().emit(Op::LoadConstant, idx);
                }
            }
            Node::Bool(v, at) => {
                self.touch_line(*at);
                if keep {
                    let idx = if *v { Program::TRUE_SLOT } else { Program::FALSE_SLOT };
                    self.builder().emit(Op::LoadConstant, idx);
                }
            }
            Node::Str(s, at) => {
                self.touch_line(*at);
                if keep {
                    let idx = self.program.intern_str(s.clone());
                    self.builder().emit(Op::LoadConstant, idx);
                }
            }
            Node::Variable(v) => {
                self.touch_line(v.at);
                if keep {
                    self.emit_load_variable(v);
                } else {
                    // Reading a variable has no side effect; a bare
                    // variable-expression statement emits nothing.
                }
            }
            Node::Array(elements, at) => {
                self.touch_line(*at);
                for e in elements {
                    self.emit(e, true);
                }
                self.builder().emit(Op::MakeArray, elements.len() as u32);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::Object(entries, at) => {
                self.touch_line(*at);
                if entries.is_empty() {
                    self.builder().emit_bare(Op::MakeEmptyObject);
                } else {
                    let has_proto = entries.iter().any(|e| e.key == "proto");
                    for entry in entries {
                        let hash = hash_name(&entry.key);
                        self.builder().emit(Op::LoadHash, hash);
                        self.emit(&entry.value, true);
                    }
                    let mut count = entries.len() as u32;
                    if !has_proto {
                        self.builder().emit(Op::LoadHash, 0);
                        self.builder().emit(Op::LoadConstant, Program::NIL_SLOT);
                        count += 1;
                    }
                    self.builder().emit(Op::MakeObject, count);
                }
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::Function(f) => {
                let idx = self.compile_function(f);
                if keep {
                    self.builder().emit(Op::LoadConstant, idx);
                    if !f.analysis.closure_mapping.is_empty() {
                        self.builder().emit_bare(Op::MakeClosure);
                    }
                }
            }
            Node::FunctionCall { callee, arguments, at } => {
                self.touch_line(*at);
                for a in arguments {
                    self.emit(a, true);
                }
                self.emit(callee, true);
                self.builder().emit(Op::FunctionCall, arguments.len() as u32);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::UnaryOp { op, operand, at } => {
                self.touch_line(*at);
                self.emit(operand, true);
                self.builder().emit_bare(unary_opcode(*op));
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::BinaryOp { op, lhs, rhs, at } => {
                self.touch_line(*at);
                self.emit_binary(*op, lhs, rhs, *at, keep);
            }
            Node::Destructure { targets, value, at } => {
                self.touch_line(*at);
                self.emit(value, true);
                if keep {
                    self.builder().emit_bare(Op::Duplicate);
                }
                self.builder().emit(Op::Unpack, targets.len() as u32);
                for target in targets.iter().rev() {
                    self.emit_store(target, false);
                }
            }
            Node::Index { object, index, at } => {
                self.touch_line(*at);
                self.emit(object, true);
                self.emit(index, true);
                self.builder().emit_bare(Op::LoadElement);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::Member { object, name, at } => {
                self.touch_line(*at);
                self.emit(object, true);
                let hash = hash_name(name);
                self.builder().emit(Op::LoadHash, hash);
                self.builder().emit_bare(Op::LoadMember);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            Node::Block(statements, at) => {
                self.touch_line(*at);
                if statements.is_empty() {
                    if keep {
                        self.load_nil();
                    }
                    return;
                }
                for stmt in &statements[..statements.len() - 1] {
                    self.emit(stmt, false);
                }
                self.emit(&statements[statements.len() - 1], keep);
            }
            Node::If {
                condition,
                then_branch,
                else_branch,
                at,
            } => {
                self.touch_line(*at);
                self.emit(condition, true);
                let false_jump = self.builder().emit(Op::PopJumpIfFalse, 0);
                self.emit(then_branch, keep);
                match else_branch {
                    Some(else_node) => {
                        let end_jump = self.builder().emit(Op::Jump, 0);
                        let else_start = self.builder().here() as u32;
                        self.builder().patch(false_jump, else_start);
                        self.emit(else_node, keep);
                        let end = self.builder().here() as u32;
                        self.builder().patch(end_jump, end);
                    }
                    None => {
                        if keep {
                            let end_jump = self.builder().emit(Op::Jump, 0);
                            let else_start = self.builder().here() as u32;
                            self.builder().patch(false_jump, else_start);
                            self.load_nil();
                            let end = self.builder().here() as u32;
                            self.builder().patch(end_jump, end);
                        } else {
                            let end = self.builder().here() as u32;
                            self.builder().patch(false_jump, end);
                        }
                    }
                }
            }
            Node::While { condition, body, at } => {
                self.touch_line(*at);
                let loop_start = self.builder().here();
                self.emit(condition, true);
                let false_jump = self.builder().emit(Op::PopJumpIfFalse, 0);
                self.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_target: loop_start,
                    keep,
                    extra_slots: 0,
                });
                self.emit(body, false);
                self.builder().emit(Op::Jump, loop_start as u32);
                let loop_ctx = self.loops.pop().expect("loop stack underflow");
                let nil_label = self.builder().here() as u32;
                self.builder().patch(false_jump, nil_label);
                if keep {
                    self.load_nil();
                }
                let end = self.builder().here() as u32;
                for p in loop_ctx.break_patches {
                    self.builder().patch(p, end);
                }
            }
            Node::For {
                variable,
                iterated,
                body,
                at,
            } => {
                self.touch_line(*at);
                self.emit(iterated, true);
                self.builder().emit_bare(Op::MakeIterator);
                self.fn_ctx().garbage += 1;

                let loop_start = self.builder().here();
                self.builder().emit_bare(Op::IteratorHasNext);
                let false_jump = self.builder().emit(Op::PopJumpIfFalse, 0);
                self.builder().emit_bare(Op::IteratorGetNext);
                self.emit_store(variable, false);
                self.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_target: loop_start,
                    keep,
                    extra_slots: 1,
                });
                self.emit(body, false);
                self.builder().emit(Op::Jump, loop_start as u32);
                let loop_ctx = self.loops.pop().expect("loop stack underflow");

                self.fn_ctx().garbage -= 1;
                let after_iteration = self.builder().here() as u32;
                self.builder().patch(false_jump, after_iteration);
                self.builder().emit_bare(Op::Pop); // drop the iterator
                if keep {
                    self.load_nil();
                }
                let end = self.builder().here() as u32;
                for p in loop_ctx.break_patches {
                    self.builder().patch(p, end);
                }
            }
            Node::Return(value, at) => {
                self.touch_line(*at);
                let garbage = self.fn_ctx().garbage;
                if garbage > 0 {
                    self.builder().emit(Op::PopN, garbage);
                }
                match value {
                    Some(v) => self.emit(v, true),
                    None => self.load_nil(),
                }
                let patch = self.builder().emit(Op::Jump, 0);
                self.fn_ctx().return_patches.push(patch);
            }
            Node::Break(value, at) => {
                self.touch_line(*at);
                let (keep, extra) = {
                    let ctx = self.loops.last().expect("`break` outside a loop");
                    (ctx.keep, ctx.extra_slots)
                };
                if keep {
                    match value {
                        Some(v) => self.emit(v, true),
                        None => self.load_nil(),
                    }
                    // The break value sits on top of `extra` loop-overhead
                    // slots (a `for` loop's live iterator); walk it down
                    // past each one so the loop ends with only the value.
                    for _ in 0..extra {
                        self.builder().emit_bare(Op::Rotate2);
                        self.builder().emit_bare(Op::Pop);
                    }
                } else {
                    if let Some(v) = value {
                        self.emit(v, false);
                    }
                    for _ in 0..extra {
                        self.builder().emit_bare(Op::Pop);
                    }
                }
                let patch = self.builder().emit(Op::Jump, 0);
                self.loops.last_mut().expect("`break` outside a loop").break_patches.push(patch);
            }
            Node::Continue(value, at) => {
                self.touch_line(*at);
                if let Some(v) = value {
                    self.emit(v, false);
                }
                let target = self.loops.last().expect("`continue` outside a loop").continue_target;
                self.builder().emit(Op::Jump, target as u32);
            }
            Node::Yield(value, at) => {
                self.touch_line(*at);
                match value {
                    Some(v) => self.emit(v, true),
                    None => self.load_nil(),
                }
                self.builder().emit_bare(Op::Yield);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node, at: crate::error::Coords, keep: bool) {
        if op.is_assignment() {
            if let Some(underlying) = op.underlying() {
                let synthetic = Node::BinaryOp {
                    op: underlying,
                    lhs: Box::new(lhs.clone()),
                    rhs: Box::new(rhs.clone()),
                    at,
                };
                self.compile_assign(lhs, &synthetic, keep);
            } else {
                self.compile_assign(lhs, rhs, keep);
            }
            return;
        }

        match op {
            BinaryOp::And => {
                self.emit(lhs, true);
                let jump = self.builder().emit(Op::JumpIfFalseOrPop, 0);
                self.emit(rhs, true);
                let end = self.builder().here() as u32;
                self.builder().patch(jump, end);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            BinaryOp::Or => {
                self.emit(lhs, true);
                let jump = self.builder().emit(Op::JumpIfTrueOrPop, 0);
                self.emit(rhs, true);
                let end = self.builder().here() as u32;
                self.builder().patch(jump, end);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            // `<<` pushes to the back of an array; `>>` pops from it (§4.5).
            BinaryOp::Shl => {
                self.emit(lhs, true);
                self.emit(rhs, true);
                self.builder().emit_bare(Op::ArrayPushBack);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            BinaryOp::Shr => {
                self.emit(lhs, true);
                self.emit(rhs, false);
                self.builder().emit_bare(Op::ArrayPopBack);
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
            _ => {
                self.emit(lhs, true);
                self.emit(rhs, true);
                self.builder().emit_bare(binary_opcode(op));
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
            }
        }
    }

    fn compile_assign(&mut self, lhs: &Node, rhs: &Node, keep: bool) {
        match lhs {
            Node::Variable(v) => {
                self.emit(rhs, true);
                self.emit_store_variable(v, keep);
            }
            Node::Index { object, index, .. } => {
                self.emit(object, true);
                self.emit(index, true);
                self.emit(rhs, true);
                self.builder().emit_bare(if keep { Op::StoreElement } else { Op::PopStoreElement });
            }
            Node::Member { object, name, .. } => {
                self.emit(object, true);
                let hash = hash_name(name);
                self.builder().emit(Op::LoadHash, hash);
                self.emit(rhs, true);
                self.builder().emit_bare(if keep { Op::StoreMember } else { Op::PopStoreMember });
            }
            _ => unreachable!("analyzer guarantees assignment targets are Variable, Index, or Member"),
        }
    }

    /// Stores into `target`, consuming a value already sitting on the stack
    /// below where `target`'s own sub-expressions haven't been evaluated yet
    /// (the destructuring-assignment case). A `Rotate2` after each pushed
    /// sub-expression walks that value up past it, so the stack ends in the
    /// same `object, index/hash, value` order `compile_assign` produces
    /// directly (§4.4).
    fn emit_store(&mut self, target: &Node, keep: bool) {
        match target {
            Node::Variable(v) => self.emit_store_variable(v, keep),
            Node::Index { object, index, .. } => {
                self.emit(object, true);
                self.builder().emit_bare(Op::Rotate2);
                self.emit(index, true);
                self.builder().emit_bare(Op::Rotate2);
                self.builder().emit_bare(if keep { Op::StoreElement } else { Op::PopStoreElement });
            }
            Node::Member { object, name, .. } => {
                self.emit(object, true);
                self.builder().emit_bare(Op::Rotate2);
                let hash = hash_name(name);
                self.builder().emit(Op::LoadHash, hash);
                self.builder().emit_bare(Op::Rotate2);
                self.builder().emit_bare(if keep { Op::StoreMember } else { Op::PopStoreMember });
            }
            _ => unreachable!("destructure targets are validated by the analyzer"),
        }
    }

    fn emit_load_variable(&mut self, v: &crate::ast::Variable) {
        match v.kind {
            VariableKind::This => self.builder().emit_bare(Op::LoadThis),
            VariableKind::ArgsArray => self.builder().emit_bare(Op::LoadArgsArray),
            VariableKind::ArgIndex(i) => self.builder().emit(Op::LoadArgument, i),
            VariableKind::Discard => self.load_nil(),
            VariableKind::Named(_) => match v.binding {
                Binding::Local(slot) => self.builder().emit(Op::LoadLocal, slot),
                Binding::Global(slot) => self.builder().emit(Op::LoadGlobal, slot),
                Binding::Native(slot) => self.builder().emit(Op::LoadNative, slot),
                Binding::LocalBoxed(slot) => self.builder().emit(Op::LoadFromBox, slot),
                Binding::FreeVariable(idx) => self.builder().emit(Op::LoadFromClosure, idx),
                Binding::Unresolved => unreachable!("analyzer resolves every binding before compilation"),
            },
        }
    }

    fn emit_store_variable(&mut self, v: &crate::ast::Variable, keep: bool) {
        match v.kind {
            VariableKind::Discard => {
                if !keep {
                    self.builder().emit_bare(Op::Pop);
                }
                // keep==true: the assigned value was already left on the
                // stack by the caller, which is exactly what `_ = x` as a
                // value-producing expression should leave behind.
            }
            VariableKind::Named(_) => match v.binding {
                Binding::Local(slot) => {
                    self.builder().emit(if keep { Op::StoreLocal } else { Op::PopStoreLocal }, slot);
                }
                Binding::Global(slot) => {
                    self.builder().emit(if keep { Op::StoreGlobal } else { Op::PopStoreGlobal }, slot);
                }
                Binding::LocalBoxed(slot) => {
                    if v.first_occurrence {
                        self.builder().emit(Op::MakeBox, slot);
                    }
                    self.builder().emit(if keep { Op::StoreToBox } else { Op::PopStoreToBox }, slot);
                }
                Binding::FreeVariable(idx) => {
                    self.builder()
                        .emit(if keep { Op::StoreToClosure } else { Op::PopStoreToClosure }, idx);
                }
                Binding::Native(_) | Binding::Unresolved => {
                    unreachable!("analyzer rejects assignment to natives and never leaves a binding unresolved")
                }
            },
            VariableKind::This | VariableKind::ArgsArray | VariableKind::ArgIndex(_) => {
                unreachable!("analyzer rejects assignment to non-assignable variable kinds")
            }
        }
    }
}

fn unary_opcode(op: UnaryOp) -> Op {
    match op {
        UnaryOp::Plus => Op::UnaryPlus,
        UnaryOp::Minus => Op::UnaryMinus,
        UnaryOp::Not => Op::UnaryNot,
        UnaryOp::Concatenate => Op::UnaryConcatenate,
        UnaryOp::SizeOf => Op::UnarySizeOf,
    }
}

fn binary_opcode(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Xor => Op::Xor,
        BinaryOp::Eq => Op::Equal,
        BinaryOp::NotEq => Op::NotEqual,
        BinaryOp::Lt => Op::Less,
        BinaryOp::Gt => Op::Greater,
        BinaryOp::LtEq => Op::LessEqual,
        BinaryOp::GtEq => Op::GreaterEqual,
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Subtract,
        BinaryOp::Concatenate => Op::Concatenate,
        BinaryOp::Mul => Op::Multiply,
        BinaryOp::Div => Op::Divide,
        BinaryOp::Mod => Op::Modulo,
        BinaryOp::Pow => Op::Power,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::And | BinaryOp::Or => {
            unreachable!("handled directly in emit_binary")
        }
        _ => unreachable!("assignment family handled separately"),
    }
}
