//! Bytecode opcodes

use serde::{Deserialize, Serialize};

/// Bytecode opcodes
///
/// Accumulator-plus-registers instruction set. Most instructions read or
/// write the implicit accumulator and take explicit register/index operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Prefixes ====================
    /// Operand scale prefix: following instruction uses 16-bit operands
    Wide = 0x00,
    /// Operand scale prefix: following instruction uses 32-bit operands
    ExtraWide = 0x01,
    /// Debugger statement
    Debugger = 0x02,
    /// No operation
    Nop = 0x03,

    // ==================== Accumulator loads ====================
    /// acc = 0
    LdaZero = 0x10,
    /// acc = imm
    LdaSmi = 0x11,
    /// acc = undefined
    LdaUndefined = 0x12,
    /// acc = null
    LdaNull = 0x13,
    /// acc = the hole
    LdaTheHole = 0x14,
    /// acc = true
    LdaTrue = 0x15,
    /// acc = false
    LdaFalse = 0x16,
    /// acc = constants\[idx\]
    LdaConstant = 0x17,
    /// acc = context\[idx\]
    LdaCurrentContextSlot = 0x18,
    /// acc = reg
    Ldar = 0x19,

    // ==================== Registers and globals ====================
    /// reg = acc
    Star = 0x20,
    /// dst = src
    Mov = 0x21,
    /// acc = globals\[name\]
    LdaGlobal = 0x22,
    /// globals\[name\] = acc
    StaGlobal = 0x23,

    // ==================== Operators ====================
    /// acc = reg + acc
    Add = 0x30,
    /// acc = reg - acc
    Sub = 0x31,
    /// acc = reg * acc
    Mul = 0x32,
    /// acc = reg == acc
    TestEqual = 0x38,
    /// acc = reg < acc
    TestLessThan = 0x39,
    /// acc = !acc
    LogicalNot = 0x3A,
    /// acc = typeof acc
    TypeOf = 0x3B,

    // ==================== Calls ====================
    /// acc = callable.call(receiver, ...args)
    CallProperty = 0x40,
    /// acc = runtime\[id\](...args)
    CallRuntime = 0x41,

    // ==================== Control flow ====================
    /// Unconditional forward jump
    Jump = 0x50,
    /// Unconditional jump to an offset held in the constant pool
    JumpConstant = 0x51,
    /// Forward jump if acc is true
    JumpIfTrue = 0x52,
    /// Forward jump if acc is false
    JumpIfFalse = 0x53,
    /// Backward jump to a loop header
    JumpLoop = 0x54,
    /// Return acc
    Return = 0x60,
    /// Throw acc
    Throw = 0x61,
    /// Rethrow acc without updating the message
    ReThrow = 0x62,
    /// Abort execution with a reason code
    Abort = 0x63,

    // ==================== Generators ====================
    /// Suspend the generator, returning acc
    SuspendGenerator = 0x70,
    /// Restore generator registers
    ResumeGenerator = 0x71,

    /// Invalid instruction
    Illegal = 0xFF,
}

/// How an instruction touches the implicit accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccumulatorUse {
    /// Accumulator untouched
    None,
    /// Accumulator read only
    Read,
    /// Accumulator unconditionally overwritten without being read
    Write,
    /// Accumulator read, then overwritten
    ReadWrite,
}

impl AccumulatorUse {
    /// Whether the accumulator value is consumed
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether the accumulator value is replaced
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl Opcode {
    /// Every opcode, in byte order
    pub const ALL: [Opcode; 39] = [
        Self::Wide,
        Self::ExtraWide,
        Self::Debugger,
        Self::Nop,
        Self::LdaZero,
        Self::LdaSmi,
        Self::LdaUndefined,
        Self::LdaNull,
        Self::LdaTheHole,
        Self::LdaTrue,
        Self::LdaFalse,
        Self::LdaConstant,
        Self::LdaCurrentContextSlot,
        Self::Ldar,
        Self::Star,
        Self::Mov,
        Self::LdaGlobal,
        Self::StaGlobal,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::TestEqual,
        Self::TestLessThan,
        Self::LogicalNot,
        Self::TypeOf,
        Self::CallProperty,
        Self::CallRuntime,
        Self::Jump,
        Self::JumpConstant,
        Self::JumpIfTrue,
        Self::JumpIfFalse,
        Self::JumpLoop,
        Self::Return,
        Self::Throw,
        Self::ReThrow,
        Self::Abort,
        Self::SuspendGenerator,
        Self::ResumeGenerator,
        Self::Illegal,
    ];

    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Wide),
            0x01 => Some(Self::ExtraWide),
            0x02 => Some(Self::Debugger),
            0x03 => Some(Self::Nop),

            0x10 => Some(Self::LdaZero),
            0x11 => Some(Self::LdaSmi),
            0x12 => Some(Self::LdaUndefined),
            0x13 => Some(Self::LdaNull),
            0x14 => Some(Self::LdaTheHole),
            0x15 => Some(Self::LdaTrue),
            0x16 => Some(Self::LdaFalse),
            0x17 => Some(Self::LdaConstant),
            0x18 => Some(Self::LdaCurrentContextSlot),
            0x19 => Some(Self::Ldar),

            0x20 => Some(Self::Star),
            0x21 => Some(Self::Mov),
            0x22 => Some(Self::LdaGlobal),
            0x23 => Some(Self::StaGlobal),

            0x30 => Some(Self::Add),
            0x31 => Some(Self::Sub),
            0x32 => Some(Self::Mul),
            0x38 => Some(Self::TestEqual),
            0x39 => Some(Self::TestLessThan),
            0x3A => Some(Self::LogicalNot),
            0x3B => Some(Self::TypeOf),

            0x40 => Some(Self::CallProperty),
            0x41 => Some(Self::CallRuntime),

            0x50 => Some(Self::Jump),
            0x51 => Some(Self::JumpConstant),
            0x52 => Some(Self::JumpIfTrue),
            0x53 => Some(Self::JumpIfFalse),
            0x54 => Some(Self::JumpLoop),
            0x60 => Some(Self::Return),
            0x61 => Some(Self::Throw),
            0x62 => Some(Self::ReThrow),
            0x63 => Some(Self::Abort),

            0x70 => Some(Self::SuspendGenerator),
            0x71 => Some(Self::ResumeGenerator),

            0xFF => Some(Self::Illegal),

            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Get the name of this opcode
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wide => "Wide",
            Self::ExtraWide => "ExtraWide",
            Self::Debugger => "Debugger",
            Self::Nop => "Nop",
            Self::LdaZero => "LdaZero",
            Self::LdaSmi => "LdaSmi",
            Self::LdaUndefined => "LdaUndefined",
            Self::LdaNull => "LdaNull",
            Self::LdaTheHole => "LdaTheHole",
            Self::LdaTrue => "LdaTrue",
            Self::LdaFalse => "LdaFalse",
            Self::LdaConstant => "LdaConstant",
            Self::LdaCurrentContextSlot => "LdaCurrentContextSlot",
            Self::Ldar => "Ldar",
            Self::Star => "Star",
            Self::Mov => "Mov",
            Self::LdaGlobal => "LdaGlobal",
            Self::StaGlobal => "StaGlobal",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::TestEqual => "TestEqual",
            Self::TestLessThan => "TestLessThan",
            Self::LogicalNot => "LogicalNot",
            Self::TypeOf => "TypeOf",
            Self::CallProperty => "CallProperty",
            Self::CallRuntime => "CallRuntime",
            Self::Jump => "Jump",
            Self::JumpConstant => "JumpConstant",
            Self::JumpIfTrue => "JumpIfTrue",
            Self::JumpIfFalse => "JumpIfFalse",
            Self::JumpLoop => "JumpLoop",
            Self::Return => "Return",
            Self::Throw => "Throw",
            Self::ReThrow => "ReThrow",
            Self::Abort => "Abort",
            Self::SuspendGenerator => "SuspendGenerator",
            Self::ResumeGenerator => "ResumeGenerator",
            Self::Illegal => "Illegal",
        }
    }

    /// Control never falls through to the next instruction in the block
    pub const fn is_block_terminator(self) -> bool {
        matches!(
            self,
            Self::Return
                | Self::Throw
                | Self::ReThrow
                | Self::Abort
                | Self::Jump
                | Self::JumpConstant
                | Self::SuspendGenerator
        )
    }

    /// Loads the accumulator and has no other observable effect
    pub const fn is_accumulator_load_without_effects(self) -> bool {
        matches!(
            self,
            Self::LdaZero
                | Self::LdaSmi
                | Self::LdaUndefined
                | Self::LdaNull
                | Self::LdaTheHole
                | Self::LdaTrue
                | Self::LdaFalse
                | Self::LdaConstant
                | Self::LdaCurrentContextSlot
                | Self::Ldar
        )
    }

    /// Jumps whose first operand is a forward distance patched at label binding
    pub const fn is_forward_jump(self) -> bool {
        matches!(self, Self::Jump | Self::JumpIfTrue | Self::JumpIfFalse)
    }

    /// Operand scale prefix
    pub const fn is_prefix(self) -> bool {
        matches!(self, Self::Wide | Self::ExtraWide)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
