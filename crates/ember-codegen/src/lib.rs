//! # Ember Codegen
//!
//! Back end of the Ember bytecode compiler.
//!
//! ## Pipeline
//!
//! 1. Instruction selection produces one [`BytecodeNode`] per operation
//! 2. The register optimizer consults [`RegisterInfoPool`] to reuse registers
//!    already known to hold a value
//! 3. [`BytecodeArrayWriter`] packs the nodes into bytes and a source
//!    position table

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod node;
pub mod register_info;
pub mod source_position;
pub mod writer;

pub use error::{CodegenError, CodegenResult};
pub use node::{BytecodeNode, SourceInfo};
pub use register_info::{EquivalenceId, InfoId, RegisterInfo, RegisterInfoPool};
pub use source_position::{
    SourcePosition, SourcePositionEntry, SourcePositionMode, SourcePositionTable, SourcePositionTableBuilder,
};
pub use writer::{BytecodeArray, BytecodeArrayWriter, Label, WriterConfig};
