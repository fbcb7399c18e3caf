//! Bytecode errors

use thiserror::Error;

use crate::opcode::Opcode;
use crate::operand::OperandScale;

/// Contract violations detected in opcode metadata or instruction operands.
///
/// None of these are recoverable: they mean the opcode table or the code
/// producing instruction nodes is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Invalid opcode byte
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Opcode has no entry in the opcode table
    #[error("Opcode {0:?} is not described by the opcode table")]
    UnknownOpcode(Opcode),

    /// Opcode declared more than once
    #[error("Opcode {0:?} declared twice")]
    DuplicateOpcode(Opcode),

    /// Declared operand has no storage
    #[error("Operand {index} of {opcode:?} has no size")]
    NoneSizedOperand {
        /// Offending opcode
        opcode: Opcode,
        /// Operand position
        index: usize,
    },

    /// More operands than an instruction can carry
    #[error("{opcode:?} has {count} operands (max {max})")]
    TooManyOperands {
        /// Offending opcode
        opcode: Opcode,
        /// Number of operands supplied
        count: usize,
        /// Maximum supported
        max: usize,
    },

    /// Operand count differs from the opcode's declaration
    #[error("{opcode:?} expects {expected} operands, got {actual}")]
    OperandCountMismatch {
        /// Offending opcode
        opcode: Opcode,
        /// Declared operand count
        expected: usize,
        /// Supplied operand count
        actual: usize,
    },

    /// Operand value does not fit the width selected by the operand scale
    #[error("Operand {index} of {opcode:?} ({value:#x}) does not fit at scale {scale:?}")]
    OperandOutOfRange {
        /// Offending opcode
        opcode: Opcode,
        /// Operand position
        index: usize,
        /// Raw operand value
        value: u32,
        /// Scale the instruction was written with
        scale: OperandScale,
    },

    /// Scale prefixes missing or declared with operands
    #[error("Malformed scale prefix: {0}")]
    MalformedPrefix(String),
}

/// Result type for bytecode operations
pub type BytecodeResult<T> = std::result::Result<T, BytecodeError>;
