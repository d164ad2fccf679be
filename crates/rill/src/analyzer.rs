//! Two-pass semantic analysis (§4.3): structural validation plus name
//! resolution and closure-capture threading.
//!
//! Rust's ownership model makes the original pointer-chasing worklist
//! awkward, so resolution here is split into three linear walks over the
//! owned tree instead of one pointer worklist:
//!
//! 1. [`collect_own_names`] — records, per function, every name referenced
//!    directly inside it (not crossing into nested functions). This is the
//!    oracle that lets later walks answer "does this name belong to that
//!    enclosing function" without caring about source order, which is what
//!    the original's worklist bought by revisiting.
//! 2. [`Discoverer::walk`] — structural validation, plus resolving every
//!    scope's parameters/locals/free-variables/closure-mapping and
//!    recording, per function, the sequence of bindings its `Variable`
//!    nodes resolve to.
//! 3. [`Mutator::walk`] — re-walks the same tree in the same order,
//!    consuming the recorded binding sequence and writing final
//!    `Binding`/`first_occurrence` values, promoting `Local` to
//!    `LocalBoxed` wherever a descendant function captured it.

use std::collections::{HashMap, HashSet};

use crate::ast::{BinaryOp, Binding, Function, FunctionAnalysis, Node, ObjectEntry, VariableKind};
use crate::error::{Coords, Diagnostics, Stage};

pub const NATIVES: &[&str] = &[
    "type",
    "this_call",
    "garbage_collect",
    "memory_stats",
    "print",
    "to_upper",
    "to_lower",
    "keys",
    "make_error",
    "is_error",
    "make_coroutine",
    "make_iterator",
    "iterator_has_next",
    "iterator_get_next",
    "range",
    "each",
    "times",
    "count",
    "map",
    "filter",
    "reduce",
    "all",
    "any",
    "min",
    "max",
    "sort",
    "abs",
    "floor",
    "ceil",
    "round",
    "sqrt",
    "sin",
    "cos",
    "tan",
];

#[must_use]
pub fn native_index(name: &str) -> Option<u32> {
    NATIVES.iter().position(|n| *n == name).map(|i| i as u32)
}

/// Result of analysis: the decorated program plus the number of process-wide
/// global slots allocated.
pub struct AnalyzedProgram {
    pub function: Function,
    pub global_count: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CtxKind {
    Global,
    Function,
    Loop,
    Object,
    Array,
    Arguments,
}

#[derive(Default)]
struct ScopeInfo {
    param_slots: HashMap<String, u32>,
    locals: HashMap<String, u32>,
    local_count: u32,
    free_variables: Vec<String>,
    free_variable_index: HashMap<String, u32>,
    closure_mapping: Vec<i32>,
    boxed: HashSet<u32>,
    occurrences: Vec<Binding>,
    first_occurrence_positions: HashSet<usize>,
}

/// Walk 1: collect, per function (indexed in the order functions are
/// entered, pre-order), the set of distinct names it references directly.
fn collect_own_names(node: &Node, out: &mut Vec<HashSet<String>>, current: usize) {
    match node {
        Node::Variable(v) => {
            if let VariableKind::Named(name) = &v.kind {
                out[current].insert(name.clone());
            }
        }
        Node::Function(f) => {
            let idx = out.len();
            out.push(HashSet::new());
            for p in &f.named_parameters {
                out[idx].insert(p.clone());
            }
            collect_own_names(&f.body, out, idx);
        }
        Node::Array(items, _) => items.iter().for_each(|n| collect_own_names(n, out, current)),
        Node::Object(entries, _) => entries.iter().for_each(|e| collect_own_names(&e.value, out, current)),
        Node::FunctionCall { callee, arguments, .. } => {
            collect_own_names(callee, out, current);
            arguments.iter().for_each(|n| collect_own_names(n, out, current));
        }
        Node::UnaryOp { operand, .. } => collect_own_names(operand, out, current),
        Node::BinaryOp { lhs, rhs, .. } => {
            collect_own_names(lhs, out, current);
            collect_own_names(rhs, out, current);
        }
        Node::Destructure { targets, value, .. } => {
            targets.iter().for_each(|n| collect_own_names(n, out, current));
            collect_own_names(value, out, current);
        }
        Node::Index { object, index, .. } => {
            collect_own_names(object, out, current);
            collect_own_names(index, out, current);
        }
        Node::Member { object, .. } => collect_own_names(object, out, current),
        Node::Block(items, _) => items.iter().for_each(|n| collect_own_names(n, out, current)),
        Node::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            collect_own_names(condition, out, current);
            collect_own_names(then_branch, out, current);
            if let Some(e) = else_branch {
                collect_own_names(e, out, current);
            }
        }
        Node::While { condition, body, .. } => {
            collect_own_names(condition, out, current);
            collect_own_names(body, out, current);
        }
        Node::For { variable, iterated, body, .. } => {
            collect_own_names(variable, out, current);
            collect_own_names(iterated, out, current);
            collect_own_names(body, out, current);
        }
        Node::Return(v, _) | Node::Break(v, _) | Node::Continue(v, _) | Node::Yield(v, _) => {
            if let Some(v) = v {
                collect_own_names(v, out, current);
            }
        }
        Node::Nil(_) | Node::Int(..) | Node::Float(..) | Node::Bool(..) | Node::Str(..) => {}
    }
}

/// Entry point (§4.3). Runs both passes and returns the decorated AST.
pub fn analyze(mut function: Function, diags: &mut Diagnostics) -> AnalyzedProgram {
    let mut own_names = vec![HashSet::new()];
    for p in &function.named_parameters {
        own_names[0].insert(p.clone());
    }
    collect_own_names(&function.body, &mut own_names, 0);

    let mut scopes = vec![ScopeInfo::default()];
    scopes[0].param_slots = function
        .named_parameters
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), i as u32))
        .collect();
    scopes[0].local_count = function.named_parameters.len() as u32;

    let mut discoverer = Discoverer {
        own_names: &own_names,
        scopes,
        ctx: vec![CtxKind::Global],
        globals: HashMap::new(),
        global_count: 0,
        diags,
    };
    discoverer.walk_fn(0, &mut function.body);

    for scope in &mut discoverer.scopes {
        finalize_first_occurrences(scope);
    }

    let global_count = discoverer.global_count;
    let mut scopes = discoverer.scopes;
    let mut positions = vec![0usize; scopes.len()];
    let mut mutator = Mutator {
        scopes: &mut scopes,
        positions: &mut positions,
        next_idx: 1,
    };
    mutator.walk_fn(0, &mut function.body);

    function.analysis = scope_analysis(&scopes[0]);
    AnalyzedProgram { function, global_count }
}

fn scope_analysis(scope: &ScopeInfo) -> FunctionAnalysis {
    let mut parameters_to_box: Vec<u32> = scope
        .boxed
        .iter()
        .copied()
        .filter(|slot| scope.param_slots.values().any(|p| p == slot))
        .collect();
    parameters_to_box.sort_unstable();
    FunctionAnalysis {
        local_count: scope.local_count,
        parameters_to_box,
        closure_mapping: scope.closure_mapping.clone(),
    }
}

fn finalize_first_occurrences(scope: &mut ScopeInfo) {
    let mut seen = HashSet::new();
    let occurrences = scope.occurrences.clone();
    for (pos, binding) in occurrences.iter().enumerate() {
        if let Binding::Local(slot) = binding {
            let is_param = scope.param_slots.values().any(|p| p == slot);
            if !is_param && scope.boxed.contains(slot) && seen.insert(*slot) {
                scope.first_occurrence_positions.insert(pos);
            }
        }
    }
}

/// Walk 2: structural validation + scope/capture discovery.
struct Discoverer<'a> {
    own_names: &'a [HashSet<String>],
    scopes: Vec<ScopeInfo>,
    ctx: Vec<CtxKind>,
    globals: HashMap<String, u32>,
    global_count: u32,
    diags: &'a mut Diagnostics,
}

impl<'a> Discoverer<'a> {
    fn error(&mut self, message: impl Into<String>, at: Coords) {
        self.diags.push(Stage::Semantic, message, at);
    }

    fn nearest(&self, skip: CtxKind) -> Option<CtxKind> {
        self.ctx.iter().rev().find(|k| !matches_kind(**k, skip)).copied()
    }

    fn resolve(&mut self, active: &[usize], name: &str) -> Binding {
        let cur = *active.last().expect("active scope stack never empty");

        if let Some(&slot) = self.scopes[cur].param_slots.get(name) {
            return Binding::Local(slot);
        }
        if let Some(&idx) = self.scopes[cur].free_variable_index.get(name) {
            return Binding::FreeVariable(idx);
        }
        if let Some(&slot) = self.scopes[cur].locals.get(name) {
            return if cur == 0 { Binding::Global(slot) } else { Binding::Local(slot) };
        }

        if active.len() > 1 {
            for pos in (1..active.len() - 1).rev() {
                let owner = active[pos];
                if self.own_names[owner].contains(name) {
                    let base_slot = self.ensure_owned(owner, name);
                    self.thread_capture(active, pos, name, base_slot);
                    let cur_idx = *self.scopes[cur].free_variable_index.get(name).expect("threaded above");
                    return Binding::FreeVariable(cur_idx);
                }
            }
        }

        if self.own_names[0].contains(name) || self.globals.contains_key(name) {
            let slot = self.alloc_global(name);
            return Binding::Global(slot);
        }

        if let Some(idx) = native_index(name) {
            return Binding::Native(idx);
        }

        if cur == 0 {
            let slot = self.alloc_global(name);
            Binding::Global(slot)
        } else {
            let slot = self.scopes[cur].local_count;
            self.scopes[cur].local_count += 1;
            self.scopes[cur].locals.insert(name.to_string(), slot);
            Binding::Local(slot)
        }
    }

    fn alloc_global(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.globals.get(name) {
            return slot;
        }
        let slot = self.global_count;
        self.global_count += 1;
        self.globals.insert(name.to_string(), slot);
        slot
    }

    /// Ensures `name` has a slot in function `owner` (its own parameter or a
    /// freshly-allocated local), marks that slot boxed, and returns it.
    fn ensure_owned(&mut self, owner: usize, name: &str) -> u32 {
        if let Some(&slot) = self.scopes[owner].param_slots.get(name) {
            self.scopes[owner].boxed.insert(slot);
            return slot;
        }
        if let Some(&slot) = self.scopes[owner].locals.get(name) {
            self.scopes[owner].boxed.insert(slot);
            return slot;
        }
        let slot = self.scopes[owner].local_count;
        self.scopes[owner].local_count += 1;
        self.scopes[owner].locals.insert(name.to_string(), slot);
        self.scopes[owner].boxed.insert(slot);
        slot
    }

    /// Threads `name` as a free variable through every function strictly
    /// between `owner` (exclusive) and the innermost active scope
    /// (inclusive), per §4.3's closure-threading rule.
    fn thread_capture(&mut self, active: &[usize], owner_pos: usize, name: &str, owner_slot: u32) {
        let mut prev_idx: Option<u32> = None;
        for &lvl in &active[owner_pos + 1..] {
            if let Some(&idx) = self.scopes[lvl].free_variable_index.get(name) {
                prev_idx = Some(idx);
                continue;
            }
            let idx = self.scopes[lvl].free_variables.len() as u32;
            self.scopes[lvl].free_variables.push(name.to_string());
            self.scopes[lvl].free_variable_index.insert(name.to_string(), idx);
            let mapping_entry = match prev_idx {
                None => owner_slot as i32,
                Some(p) => -((p as i32) + 1),
            };
            self.scopes[lvl].closure_mapping.push(mapping_entry);
            prev_idx = Some(idx);
        }
    }

    fn walk_fn(&mut self, scope_idx: usize, body: &mut Node) {
        let mut active = vec![scope_idx];
        self.visit(body, &mut active);
    }

    fn visit(&mut self, node: &mut Node, active: &mut Vec<usize>) {
        match node {
            Node::Variable(v) => {
                if let VariableKind::Named(name) = v.kind.clone() {
                    let binding = self.resolve(active, &name);
                    let cur = *active.last().expect("active scope stack never empty");
                    self.scopes[cur].occurrences.push(binding);
                }
            }
            Node::Function(f) => {
                let idx = self.scopes.len();
                let mut scope = ScopeInfo::default();
                scope.param_slots = f
                    .named_parameters
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n.clone(), i as u32))
                    .collect();
                scope.local_count = f.named_parameters.len() as u32;
                self.scopes.push(scope);

                self.ctx.push(CtxKind::Function);
                active.push(idx);
                self.visit(&mut f.body, active);
                active.pop();
                self.ctx.pop();
            }
            Node::Array(items, _) => {
                self.ctx.push(CtxKind::Array);
                items.iter_mut().for_each(|n| self.visit(n, active));
                self.ctx.pop();
            }
            Node::Object(entries, _) => {
                self.ctx.push(CtxKind::Object);
                for e in entries.iter_mut() {
                    self.visit(&mut e.value, active);
                }
                self.ctx.pop();
            }
            Node::FunctionCall { callee, arguments, .. } => {
                self.visit(callee, active);
                self.ctx.push(CtxKind::Arguments);
                arguments.iter_mut().for_each(|n| self.visit(n, active));
                self.ctx.pop();
            }
            Node::UnaryOp { operand, .. } => self.visit(operand, active),
            Node::BinaryOp { op, lhs, rhs, at } => {
                let at = *at;
                if *op == BinaryOp::Assign {
                    if let Node::Array(elements, arr_at) = lhs.as_ref() {
                        let targets = elements.clone();
                        let arr_at = *arr_at;
                        let rhs_owned = std::mem::replace(rhs.as_mut(), Node::Nil(at));
                        *node = Node::Destructure {
                            targets,
                            value: Box::new(rhs_owned),
                            at: arr_at,
                        };
                        return self.visit(node, active);
                    }
                }
                self.validate_assignment(*op, lhs, rhs, at);
                if *op == BinaryOp::Assign {
                    if let Node::Member { object, .. } = lhs.as_ref() {
                        self.validate_member_host(object, at);
                    }
                }
                self.visit(lhs, active);
                self.visit(rhs, active);
            }
            Node::Destructure { targets, value, at } => {
                let at = *at;
                for t in targets.iter() {
                    self.validate_target(t, at);
                }
                targets.iter_mut().for_each(|n| self.visit(n, active));
                self.visit(value, active);
            }
            Node::Index { object, index, .. } => {
                self.visit(object, active);
                self.visit(index, active);
            }
            Node::Member { object, at, .. } => {
                self.validate_member_host(object, *at);
                self.visit(object, active);
            }
            Node::Block(items, _) => items.iter_mut().for_each(|n| self.visit(n, active)),
            Node::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.visit(condition, active);
                self.visit(then_branch, active);
                if let Some(e) = else_branch {
                    self.visit(e, active);
                }
            }
            Node::While { condition, body, .. } => {
                self.visit(condition, active);
                self.ctx.push(CtxKind::Loop);
                self.visit(body, active);
                self.ctx.pop();
            }
            Node::For { variable, iterated, body, .. } => {
                self.visit(variable, active);
                self.visit(iterated, active);
                self.ctx.push(CtxKind::Loop);
                self.visit(body, active);
                self.ctx.pop();
            }
            Node::Return(v, at) => {
                if self.nearest(CtxKind::Loop) != Some(CtxKind::Function) {
                    self.error("'return' outside of a function", *at);
                }
                if let Some(v) = v {
                    self.visit(v, active);
                }
            }
            Node::Yield(v, at) => {
                if self.nearest(CtxKind::Loop) != Some(CtxKind::Function) {
                    self.error("'yield' outside of a function", *at);
                }
                if let Some(v) = v {
                    self.visit(v, active);
                }
            }
            Node::Break(v, at) => {
                if self.ctx.last().copied() != Some(CtxKind::Loop) {
                    self.error("'break' outside of a loop", *at);
                }
                if let Some(v) = v {
                    self.visit(v, active);
                }
            }
            Node::Continue(v, at) => {
                if self.ctx.last().copied() != Some(CtxKind::Loop) {
                    self.error("'continue' outside of a loop", *at);
                }
                if let Some(v) = v {
                    self.visit(v, active);
                }
            }
            Node::Nil(_) | Node::Int(..) | Node::Float(..) | Node::Bool(..) | Node::Str(..) => {}
        }
    }

    fn validate_assignment(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node, at: Coords) {
        if !op.is_assignment() {
            return;
        }
        if op != BinaryOp::Assign && matches!(lhs, Node::Array(..)) {
            self.error("compound assignment cannot target a destructuring pattern", at);
        }
        self.validate_target(lhs, at);
        if op == BinaryOp::Assign {
            if let Node::Variable(v) = rhs {
                if v.kind == VariableKind::ArgsArray {
                    self.error("cannot alias the anonymous-argument array; copy it explicitly", at);
                }
            }
        }
    }

    fn validate_target(&mut self, target: &Node, at: Coords) {
        match target {
            Node::Variable(v) if !v.is_assignable() => {
                self.error("this value is not assignable", v.at);
            }
            Node::Index { object, .. } => {
                if let Node::Variable(v) = object.as_ref() {
                    if v.kind == VariableKind::ArgsArray {
                        self.error("elements of the anonymous-argument array are not assignable", at);
                    }
                }
            }
            _ => {}
        }
    }

    fn validate_member_host(&mut self, object: &Node, at: Coords) {
        let bad = matches!(
            object,
            Node::Int(..) | Node::Float(..) | Node::Bool(..) | Node::Str(..) | Node::Array(..) | Node::Function(_)
        );
        if bad {
            self.error("this value cannot hold members", at);
        }
    }
}

fn matches_kind(k: CtxKind, skip: CtxKind) -> bool {
    std::mem::discriminant(&k) == std::mem::discriminant(&skip)
}

/// Walk 3: re-walks the tree in the same order as [`Discoverer`], consuming
/// its recorded per-scope occurrence sequence to write final bindings.
struct Mutator<'a> {
    scopes: &'a mut [ScopeInfo],
    positions: &'a mut [usize],
    /// Next unassigned scope index; [`Discoverer`] pushed scopes in the same
    /// depth-first `Function`-node order this walk visits them in, so a
    /// plain counter recovers the right index without storing it on the node.
    next_idx: usize,
}

impl<'a> Mutator<'a> {
    fn walk_fn(&mut self, scope_idx: usize, body: &mut Node) {
        let mut active = vec![scope_idx];
        self.visit(body, &mut active);
    }

    fn next_binding(&mut self, scope_idx: usize) -> (Binding, bool) {
        let pos = self.positions[scope_idx];
        self.positions[scope_idx] += 1;
        let raw = self.scopes[scope_idx].occurrences[pos].clone();
        let first = self.scopes[scope_idx].first_occurrence_positions.contains(&pos);
        let resolved = match raw {
            Binding::Local(slot) if self.scopes[scope_idx].boxed.contains(&slot) => Binding::LocalBoxed(slot),
            other => other,
        };
        (resolved, first)
    }

    fn visit(&mut self, node: &mut Node, active: &mut Vec<usize>) {
        match node {
            Node::Variable(v) => {
                if matches!(v.kind, VariableKind::Named(_)) {
                    let cur = *active.last().expect("active scope stack never empty");
                    let (binding, first_occurrence) = self.next_binding(cur);
                    v.binding = binding;
                    v.first_occurrence = first_occurrence;
                }
            }
            Node::Function(f) => {
                let idx = self.next_idx;
                self.next_idx += 1;
                active.push(idx);
                self.visit(&mut f.body, active);
                active.pop();
                f.analysis = scope_analysis(&self.scopes[idx]);
            }
            Node::Array(items, _) => items.iter_mut().for_each(|n| self.visit(n, active)),
            Node::Object(entries, _) => entries.iter_mut().for_each(|e: &mut ObjectEntry| self.visit(&mut e.value, active)),
            Node::FunctionCall { callee, arguments, .. } => {
                self.visit(callee, active);
                arguments.iter_mut().for_each(|n| self.visit(n, active));
            }
            Node::UnaryOp { operand, .. } => self.visit(operand, active),
            Node::BinaryOp { lhs, rhs, .. } => {
                self.visit(lhs, active);
                self.visit(rhs, active);
            }
            Node::Destructure { targets, value, .. } => {
                targets.iter_mut().for_each(|n| self.visit(n, active));
                self.visit(value, active);
            }
            Node::Index { object, index, .. } => {
                self.visit(object, active);
                self.visit(index, active);
            }
            Node::Member { object, .. } => self.visit(object, active),
            Node::Block(items, _) => items.iter_mut().for_each(|n| self.visit(n, active)),
            Node::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.visit(condition, active);
                self.visit(then_branch, active);
                if let Some(e) = else_branch {
                    self.visit(e, active);
                }
            }
            Node::While { condition, body, .. } => {
                self.visit(condition, active);
                self.visit(body, active);
            }
            Node::For { variable, iterated, body, .. } => {
                self.visit(variable, active);
                self.visit(iterated, active);
                self.visit(body, active);
            }
            Node::Return(v, _) | Node::Break(v, _) | Node::Continue(v, _) | Node::Yield(v, _) => {
                if let Some(v) = v {
                    self.visit(v, active);
                }
            }
            Node::Nil(_) | Node::Int(..) | Node::Float(..) | Node::Bool(..) | Node::Str(..) => {}
        }
    }
}
