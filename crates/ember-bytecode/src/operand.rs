//! Bytecode operands: registers, operand types, sizes and scales

use serde::{Deserialize, Serialize};

/// Interpreter register slot.
///
/// The accumulator is not a register; instructions address it implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Register(pub u16);

impl Register {
    /// Create a new register
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get register index
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Raw operand value used when this register is encoded into an instruction
    #[inline]
    pub const fn to_operand(self) -> u32 {
        self.0 as u32
    }
}

impl From<u16> for Register {
    fn from(index: u16) -> Self {
        Self(index)
    }
}

/// Width tier of an instruction's scalable operands.
///
/// Anything other than `Single` is announced by a prefix bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperandScale {
    /// One byte per scalable operand
    Single = 1,
    /// Two bytes per scalable operand
    Double = 2,
    /// Four bytes per scalable operand
    Quad = 4,
}

impl OperandScale {
    /// All scales, narrowest first
    pub const fn all() -> [OperandScale; 3] {
        [Self::Single, Self::Double, Self::Quad]
    }

    /// Byte multiplier applied to scalable operands
    #[inline]
    pub const fn multiplier(self) -> usize {
        self as usize
    }

    /// Smallest scale able to hold a signed operand
    pub fn for_signed(value: i32) -> Self {
        if i8::try_from(value).is_ok() {
            Self::Single
        } else if i16::try_from(value).is_ok() {
            Self::Double
        } else {
            Self::Quad
        }
    }

    /// Smallest scale able to hold an unsigned operand
    pub fn for_unsigned(value: u32) -> Self {
        if u8::try_from(value).is_ok() {
            Self::Single
        } else if u16::try_from(value).is_ok() {
            Self::Double
        } else {
            Self::Quad
        }
    }
}

/// Encoded width of a single operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperandSize {
    /// Operand carries no storage
    None = 0,
    /// 1 byte
    Byte = 1,
    /// 2 bytes
    Short = 2,
    /// 4 bytes
    Quad = 4,
}

impl OperandSize {
    /// Number of bytes occupied in the stream
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// Kind of an operand as declared by the opcode table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandType {
    /// No operand
    None,
    /// 8-bit flag set, never scaled
    Flag8,
    /// Runtime function id, always 16 bits
    RuntimeId,
    /// Input register
    Reg,
    /// Output register
    RegOut,
    /// First register of a consecutive register list
    RegList,
    /// Number of registers in a preceding list
    RegCount,
    /// Index into the constant pool, feedback vector or context
    Idx,
    /// Unsigned immediate (also used for jump distances)
    UImm,
    /// Signed immediate
    Imm,
}

impl OperandType {
    /// Whether the operand width follows the instruction's operand scale
    pub const fn is_scalable(self) -> bool {
        !matches!(self, Self::None | Self::Flag8 | Self::RuntimeId)
    }

    /// Whether the raw operand value is a two's complement signed integer
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Imm)
    }

    /// Encoded width of this operand at `scale`
    pub const fn size(self, scale: OperandScale) -> OperandSize {
        match self {
            Self::None => OperandSize::None,
            Self::Flag8 => OperandSize::Byte,
            Self::RuntimeId => OperandSize::Short,
            _ => match scale {
                OperandScale::Single => OperandSize::Byte,
                OperandScale::Double => OperandSize::Short,
                OperandScale::Quad => OperandSize::Quad,
            },
        }
    }

    /// Smallest scale at which `raw` fits this operand
    pub fn scale_for(self, raw: u32) -> OperandScale {
        if !self.is_scalable() {
            OperandScale::Single
        } else if self.is_signed() {
            OperandScale::for_signed(raw as i32)
        } else {
            OperandScale::for_unsigned(raw)
        }
    }

    /// Whether `raw` can be stored in `size` bytes for this operand kind
    pub fn fits(self, raw: u32, size: OperandSize) -> bool {
        match (size, self.is_signed()) {
            (OperandSize::None, _) => false,
            (OperandSize::Quad, _) => true,
            (OperandSize::Byte, false) => u8::try_from(raw).is_ok(),
            (OperandSize::Short, false) => u16::try_from(raw).is_ok(),
            (OperandSize::Byte, true) => i8::try_from(raw as i32).is_ok(),
            (OperandSize::Short, true) => i16::try_from(raw as i32).is_ok(),
        }
    }
}
