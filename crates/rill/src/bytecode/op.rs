//! Opcode enumeration (§6).
//!
//! Every instruction is one opcode byte followed by one 32-bit operand,
//! whether or not the opcode actually uses it; unused operands are emitted
//! as zero.

use strum::{Display, FromRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Op {
    // Stack shuffling
    Pop,
    PopN,
    Rotate2,
    MoveToTOS2,
    Duplicate,
    Unpack,

    // Loads
    LoadConstant,
    LoadGlobal,
    LoadLocal,
    LoadNative,
    LoadArgument,
    LoadArgsArray,
    LoadThis,
    LoadHash,
    LoadFromBox,
    LoadFromClosure,

    // Stores
    StoreLocal,
    StoreGlobal,
    PopStoreLocal,
    PopStoreGlobal,
    StoreToBox,
    PopStoreToBox,
    StoreToClosure,
    PopStoreToClosure,

    // Collections
    MakeArray,
    LoadElement,
    StoreElement,
    PopStoreElement,
    ArrayPushBack,
    ArrayPopBack,
    MakeObject,
    MakeEmptyObject,
    LoadMember,
    StoreMember,
    PopStoreMember,

    // Iteration
    MakeIterator,
    IteratorHasNext,
    IteratorGetNext,

    // Boxing / closures
    MakeBox,
    MakeClosure,

    // Control flow
    Jump,
    JumpIfFalse,
    PopJumpIfFalse,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
    FunctionCall,
    Yield,
    EndFunction,

    // Arithmetic / logic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Concatenate,
    Xor,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Unary
    UnaryPlus,
    UnaryMinus,
    UnaryNot,
    UnaryConcatenate,
    UnarySizeOf,
}

impl Op {
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::JumpIfFalse
                | Self::PopJumpIfFalse
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
        )
    }
}

/// One decoded instruction: an opcode plus its 32-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operand: u32,
}

impl Instruction {
    #[must_use]
    pub fn new(op: Op, operand: u32) -> Self {
        Self { op, operand }
    }

    #[must_use]
    pub fn bare(op: Op) -> Self {
        Self { op, operand: 0 }
    }
}
