//! Instruction nodes handed to the bytecode writer

use ember_bytecode::{BytecodeError, BytecodeResult, MAX_OPERANDS, Opcode, OpcodeTable, OperandScale};
use serde::{Deserialize, Serialize};

/// Source attribution carried by an instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceInfo {
    /// No attribution
    #[default]
    Invalid,
    /// Position of an expression
    Expression(i32),
    /// Position of a statement (a breakable location)
    Statement(i32),
}

impl SourceInfo {
    /// Whether this carries a position
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Whether this is a statement position
    #[inline]
    pub const fn is_statement(self) -> bool {
        matches!(self, Self::Statement(_))
    }

    /// Source position, if any
    pub const fn position(self) -> Option<i32> {
        match self {
            Self::Invalid => None,
            Self::Expression(pos) | Self::Statement(pos) => Some(pos),
        }
    }
}

/// One finalized instruction: opcode, operand scale, raw operands and
/// optional source position.
///
/// Operands are raw 32-bit values; signed immediates are stored in two's
/// complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeNode {
    opcode: Opcode,
    operand_scale: OperandScale,
    operands: [u32; MAX_OPERANDS],
    operand_count: u8,
    source_info: SourceInfo,
}

impl BytecodeNode {
    /// Create a node with an explicit operand scale
    pub fn new(opcode: Opcode, operand_scale: OperandScale, operands: &[u32]) -> BytecodeResult<Self> {
        if operands.len() > MAX_OPERANDS {
            return Err(BytecodeError::TooManyOperands {
                opcode,
                count: operands.len(),
                max: MAX_OPERANDS,
            });
        }
        let mut raw = [0u32; MAX_OPERANDS];
        raw[..operands.len()].copy_from_slice(operands);
        Ok(Self {
            opcode,
            operand_scale,
            operands: raw,
            operand_count: operands.len() as u8,
            source_info: SourceInfo::Invalid,
        })
    }

    /// Create a node checked against `table`, picking the narrowest scale
    /// that holds every operand
    pub fn create(table: &OpcodeTable, opcode: Opcode, operands: &[u32]) -> BytecodeResult<Self> {
        let types = table.operand_types(opcode)?;
        if types.len() != operands.len() {
            return Err(BytecodeError::OperandCountMismatch {
                opcode,
                expected: types.len(),
                actual: operands.len(),
            });
        }
        let scale = types
            .iter()
            .zip(operands)
            .map(|(ty, &raw)| ty.scale_for(raw))
            .max()
            .unwrap_or(OperandScale::Single);
        Self::new(opcode, scale, operands)
    }

    /// Attach source attribution
    pub fn with_source_info(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }

    /// Copy of this node with operand `index` replaced by `raw`
    pub fn with_operand(mut self, index: usize, raw: u32) -> BytecodeResult<Self> {
        if index >= self.operand_count as usize {
            return Err(BytecodeError::OperandCountMismatch {
                opcode: self.opcode,
                expected: index + 1,
                actual: self.operand_count as usize,
            });
        }
        self.operands[index] = raw;
        Ok(self)
    }

    /// Opcode
    #[inline]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Operand scale
    #[inline]
    pub fn operand_scale(&self) -> OperandScale {
        self.operand_scale
    }

    /// Raw operands
    #[inline]
    pub fn operands(&self) -> &[u32] {
        &self.operands[..self.operand_count as usize]
    }

    /// Raw operand at `index`
    pub fn operand(&self, index: usize) -> Option<u32> {
        self.operands().get(index).copied()
    }

    /// Source attribution
    #[inline]
    pub fn source_info(&self) -> SourceInfo {
        self.source_info
    }
}
