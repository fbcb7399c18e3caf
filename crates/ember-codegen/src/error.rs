//! Code generation errors

use ember_bytecode::{BytecodeError, OperandScale};
use thiserror::Error;

/// Internal-consistency faults raised while emitting bytecode.
///
/// Every variant aborts the compilation unit; none is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// Opcode table or instruction operands violate their contract
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// Source positions recorded out of bytecode order
    #[error("Source position at offset {offset} recorded after offset {last}")]
    SourcePositionOrder {
        /// Offending bytecode offset
        offset: u32,
        /// Offset of the previous entry
        last: u32,
    },

    /// Label bound more than once
    #[error("Label {0} is already bound")]
    LabelAlreadyBound(usize),

    /// Label was never created by this writer
    #[error("Unknown label {0}")]
    UnknownLabel(usize),

    /// Jump written against a label in the wrong state or with a non-jump opcode
    #[error("Invalid jump: {0}")]
    InvalidJump(String),

    /// Jump distance does not fit the operand width reserved for it
    #[error("Jump distance {distance} does not fit at scale {scale:?}")]
    JumpOutOfRange {
        /// Distance in bytes
        distance: usize,
        /// Scale the jump was written with
        scale: OperandScale,
    },

    /// Bytecode finished while forward jumps still lack a target
    #[error("{0} jumps were never bound")]
    UnboundJumps(usize),

    /// Register equivalence ring linkage is broken
    #[error("Corrupt equivalence ring: {0}")]
    CorruptRing(String),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CodegenError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a corrupt ring error
    pub fn corrupt_ring(msg: impl Into<String>) -> Self {
        Self::CorruptRing(msg.into())
    }

    /// Create an invalid jump error
    pub fn invalid_jump(msg: impl Into<String>) -> Self {
        Self::InvalidJump(msg.into())
    }
}

/// Result type for code generation
pub type CodegenResult<T> = Result<T, CodegenError>;
