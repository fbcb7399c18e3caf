//! # Ember Bytecode
//!
//! Instruction set definitions for the Ember register virtual machine.
//!
//! ## Design Principles
//!
//! - **Accumulator + registers**: Most instructions implicitly use a single
//!   accumulator and name explicit registers for the rest
//! - **Compact**: Operands default to one byte; `Wide`/`ExtraWide` prefixes
//!   scale an instruction's operands to 16 or 32 bits
//! - **Table driven**: Operand widths come from a validated [`OpcodeTable`]

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod opcode;
pub mod operand;
pub mod table;

pub use error::{BytecodeError, BytecodeResult};
pub use opcode::{AccumulatorUse, Opcode};
pub use operand::{OperandScale, OperandSize, OperandType, Register};
pub use table::{OpcodeDescriptor, OpcodeTable};

/// Maximum number of operands a single instruction can carry
pub const MAX_OPERANDS: usize = 5;
