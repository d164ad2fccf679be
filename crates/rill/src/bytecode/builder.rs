//! Incremental instruction-stream builder for one [`CodeObject`] (§4.4).

use crate::bytecode::code::{CodeObject, LineEntry};
use crate::bytecode::op::{Instruction, Op};

#[derive(Debug)]
pub struct CodeBuilder {
    instructions: Vec<Instruction>,
    lines: Vec<LineEntry>,
    last_line: i32,
    local_count: i32,
    named_param_count: i32,
    closure_mapping: Vec<i32>,
}

impl CodeBuilder {
    #[must_use]
    pub fn new(named_param_count: i32, closure_mapping: Vec<i32>) -> Self {
        Self {
            instructions: Vec::new(),
            lines: Vec::new(),
            last_line: -1,
            local_count: 0,
            named_param_count,
            closure_mapping,
        }
    }

    /// Index the next emitted instruction will occupy.
    #[must_use]
    pub fn here(&self) -> usize {
        self.instructions.len()
    }

    /// Records that emission has reached `line`, unless it's the same line
    /// already touched. Skipped inside array/object/block nodes by callers
    /// that never call it for those.
    pub fn touch_line(&mut self, line: i32) {
        if line != self.last_line {
            self.lines.push(LineEntry {
                line,
                first_instruction_index: self.here() as i32,
            });
            self.last_line = line;
        }
    }

    pub fn emit(&mut self, op: Op, operand: u32) -> usize {
        let idx = self.here();
        self.instructions.push(Instruction::new(op, operand));
        idx
    }

    pub fn emit_bare(&mut self, op: Op) -> usize {
        self.emit(op, 0)
    }

    /// Rewrites the operand of a previously emitted instruction, used to
    /// back-patch jump targets once the destination is known.
    pub fn patch(&mut self, index: usize, operand: u32) {
        self.instructions[index].operand = operand;
    }

    pub fn set_local_count(&mut self, count: i32) {
        self.local_count = count;
    }

    #[must_use]
    pub fn build(self) -> CodeObject {
        CodeObject {
            instructions: self.instructions,
            lines: self.lines,
            local_count: self.local_count,
            named_param_count: self.named_param_count,
            closure_mapping: self.closure_mapping,
        }
    }
}
