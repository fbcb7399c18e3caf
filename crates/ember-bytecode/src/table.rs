//! Opcode metadata table
//!
//! Maps every opcode to its accumulator use and declared operand types, and
//! precomputes the per-operand byte widths for each operand scale. Tables are
//! validated when built so that emission never meets an operand without
//! storage.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::MAX_OPERANDS;
use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::{AccumulatorUse, Opcode};
use crate::operand::{OperandScale, OperandSize, OperandType};

/// Static description of one opcode
#[derive(Debug, Clone, Copy)]
pub struct OpcodeDescriptor {
    /// Described opcode
    pub opcode: Opcode,
    /// Accumulator behaviour
    pub accumulator_use: AccumulatorUse,
    /// Declared operand types, in encoding order
    pub operands: &'static [OperandType],
}

impl OpcodeDescriptor {
    /// Describe an opcode
    pub const fn new(
        opcode: Opcode,
        accumulator_use: AccumulatorUse,
        operands: &'static [OperandType],
    ) -> Self {
        Self {
            opcode,
            accumulator_use,
            operands,
        }
    }
}

#[derive(Debug, Clone)]
struct OpcodeEntry {
    accumulator_use: AccumulatorUse,
    operand_types: &'static [OperandType],
    /// Widths indexed by `scale_slot`
    sizes: [Vec<OperandSize>; 3],
}

#[inline]
const fn scale_slot(scale: OperandScale) -> usize {
    match scale {
        OperandScale::Single => 0,
        OperandScale::Double => 1,
        OperandScale::Quad => 2,
    }
}

/// Opcode metadata consulted by the bytecode writer
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    entries: FxHashMap<Opcode, OpcodeEntry>,
}

impl OpcodeTable {
    /// Build a table from descriptors, rejecting malformed declarations
    pub fn new(descriptors: &[OpcodeDescriptor]) -> BytecodeResult<Self> {
        let mut seen = FxHashSet::default();
        for desc in descriptors {
            if !seen.insert(desc.opcode) {
                return Err(BytecodeError::DuplicateOpcode(desc.opcode));
            }
            if desc.operands.len() > MAX_OPERANDS {
                return Err(BytecodeError::TooManyOperands {
                    opcode: desc.opcode,
                    count: desc.operands.len(),
                    max: MAX_OPERANDS,
                });
            }
            if desc.opcode.is_prefix() && !desc.operands.is_empty() {
                return Err(BytecodeError::MalformedPrefix(format!(
                    "{} declares operands",
                    desc.opcode
                )));
            }
            for (index, ty) in desc.operands.iter().enumerate() {
                let unsized_at_some_scale = OperandScale::all()
                    .into_iter()
                    .any(|scale| ty.size(scale) == OperandSize::None);
                if unsized_at_some_scale {
                    return Err(BytecodeError::NoneSizedOperand {
                        opcode: desc.opcode,
                        index,
                    });
                }
            }
        }
        for prefix in [Opcode::Wide, Opcode::ExtraWide] {
            if !seen.contains(&prefix) {
                return Err(BytecodeError::MalformedPrefix(format!("{prefix} is not declared")));
            }
        }

        Ok(Self::from_descriptors(descriptors))
    }

    /// The built-in table for [`Opcode`]
    pub fn standard() -> Self {
        Self::from_descriptors(STANDARD_OPCODES)
    }

    fn from_descriptors(descriptors: &[OpcodeDescriptor]) -> Self {
        let entries = descriptors
            .iter()
            .map(|desc| {
                let sizes = OperandScale::all()
                    .map(|scale| desc.operands.iter().map(|ty| ty.size(scale)).collect::<Vec<_>>());
                let entry = OpcodeEntry {
                    accumulator_use: desc.accumulator_use,
                    operand_types: desc.operands,
                    sizes,
                };
                (desc.opcode, entry)
            })
            .collect();
        Self { entries }
    }

    fn entry(&self, opcode: Opcode) -> BytecodeResult<&OpcodeEntry> {
        self.entries
            .get(&opcode)
            .ok_or(BytecodeError::UnknownOpcode(opcode))
    }

    /// Whether the table describes `opcode`
    pub fn contains(&self, opcode: Opcode) -> bool {
        self.entries.contains_key(&opcode)
    }

    /// Declared operand types
    pub fn operand_types(&self, opcode: Opcode) -> BytecodeResult<&'static [OperandType]> {
        Ok(self.entry(opcode)?.operand_types)
    }

    /// Declared operand count
    pub fn operand_count(&self, opcode: Opcode) -> BytecodeResult<usize> {
        Ok(self.entry(opcode)?.operand_types.len())
    }

    /// Per-operand byte widths at `scale`
    pub fn operand_sizes(&self, opcode: Opcode, scale: OperandScale) -> BytecodeResult<&[OperandSize]> {
        Ok(&self.entry(opcode)?.sizes[scale_slot(scale)])
    }

    /// Accumulator behaviour
    pub fn accumulator_use(&self, opcode: Opcode) -> BytecodeResult<AccumulatorUse> {
        Ok(self.entry(opcode)?.accumulator_use)
    }

    /// Prefix bytecode announcing `scale`, if any
    pub const fn prefix_for(&self, scale: OperandScale) -> Option<Opcode> {
        match scale {
            OperandScale::Single => None,
            OperandScale::Double => Some(Opcode::Wide),
            OperandScale::Quad => Some(Opcode::ExtraWide),
        }
    }

    /// Total encoded size of an instruction, prefix included
    pub fn instruction_size(&self, opcode: Opcode, scale: OperandScale) -> BytecodeResult<usize> {
        let prefix = usize::from(self.prefix_for(scale).is_some());
        let operands: usize = self
            .operand_sizes(opcode, scale)?
            .iter()
            .map(|size| size.bytes())
            .sum();
        Ok(prefix + 1 + operands)
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

use AccumulatorUse::{None as AccNone, Read, ReadWrite, Write};
use OperandType::{Flag8, Idx, Imm, Reg, RegCount, RegList, RegOut, RuntimeId, UImm};

/// Declarations backing [`OpcodeTable::standard`]
pub const STANDARD_OPCODES: &[OpcodeDescriptor] = &[
    OpcodeDescriptor::new(Opcode::Wide, AccNone, &[]),
    OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
    OpcodeDescriptor::new(Opcode::Debugger, AccNone, &[]),
    OpcodeDescriptor::new(Opcode::Nop, AccNone, &[]),
    OpcodeDescriptor::new(Opcode::LdaZero, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaSmi, Write, &[Imm]),
    OpcodeDescriptor::new(Opcode::LdaUndefined, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaNull, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaTheHole, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaTrue, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaFalse, Write, &[]),
    OpcodeDescriptor::new(Opcode::LdaConstant, Write, &[Idx]),
    OpcodeDescriptor::new(Opcode::LdaCurrentContextSlot, Write, &[Idx]),
    OpcodeDescriptor::new(Opcode::Ldar, Write, &[Reg]),
    OpcodeDescriptor::new(Opcode::Star, Read, &[RegOut]),
    OpcodeDescriptor::new(Opcode::Mov, AccNone, &[Reg, RegOut]),
    OpcodeDescriptor::new(Opcode::LdaGlobal, Write, &[Idx, Idx]),
    OpcodeDescriptor::new(Opcode::StaGlobal, Read, &[Idx, Idx]),
    OpcodeDescriptor::new(Opcode::Add, ReadWrite, &[Reg, Idx]),
    OpcodeDescriptor::new(Opcode::Sub, ReadWrite, &[Reg, Idx]),
    OpcodeDescriptor::new(Opcode::Mul, ReadWrite, &[Reg, Idx]),
    OpcodeDescriptor::new(Opcode::TestEqual, ReadWrite, &[Reg, Idx]),
    OpcodeDescriptor::new(Opcode::TestLessThan, ReadWrite, &[Reg, Idx]),
    OpcodeDescriptor::new(Opcode::LogicalNot, ReadWrite, &[]),
    OpcodeDescriptor::new(Opcode::TypeOf, ReadWrite, &[]),
    OpcodeDescriptor::new(Opcode::CallProperty, Write, &[Reg, RegList, RegCount, Idx]),
    OpcodeDescriptor::new(Opcode::CallRuntime, Write, &[RuntimeId, RegList, RegCount]),
    OpcodeDescriptor::new(Opcode::Jump, AccNone, &[UImm]),
    OpcodeDescriptor::new(Opcode::JumpConstant, AccNone, &[Idx]),
    OpcodeDescriptor::new(Opcode::JumpIfTrue, Read, &[UImm]),
    OpcodeDescriptor::new(Opcode::JumpIfFalse, Read, &[UImm]),
    OpcodeDescriptor::new(Opcode::JumpLoop, AccNone, &[UImm, Imm]),
    OpcodeDescriptor::new(Opcode::Return, Read, &[]),
    OpcodeDescriptor::new(Opcode::Throw, Read, &[]),
    OpcodeDescriptor::new(Opcode::ReThrow, Read, &[]),
    OpcodeDescriptor::new(Opcode::Abort, AccNone, &[Flag8]),
    OpcodeDescriptor::new(Opcode::SuspendGenerator, Read, &[Reg, RegList, RegCount, UImm]),
    OpcodeDescriptor::new(Opcode::ResumeGenerator, Write, &[Reg, RegOut, RegCount]),
    OpcodeDescriptor::new(Opcode::Illegal, AccNone, &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_well_formed() {
        let table = OpcodeTable::new(STANDARD_OPCODES).expect("standard table validates");
        for op in Opcode::ALL {
            assert!(table.contains(op), "{op} missing from standard table");
        }
    }

    #[test]
    fn test_operand_sizes_follow_scale() {
        let table = OpcodeTable::standard();
        assert_eq!(
            table.operand_sizes(Opcode::CallRuntime, OperandScale::Single).unwrap(),
            &[OperandSize::Short, OperandSize::Byte, OperandSize::Byte]
        );
        assert_eq!(
            table.operand_sizes(Opcode::CallRuntime, OperandScale::Quad).unwrap(),
            &[OperandSize::Short, OperandSize::Quad, OperandSize::Quad]
        );
        assert_eq!(
            table.operand_sizes(Opcode::Abort, OperandScale::Double).unwrap(),
            &[OperandSize::Byte]
        );
    }

    #[test]
    fn test_prefix_mapping() {
        let table = OpcodeTable::standard();
        assert_eq!(table.prefix_for(OperandScale::Single), None);
        assert_eq!(table.prefix_for(OperandScale::Double), Some(Opcode::Wide));
        assert_eq!(table.prefix_for(OperandScale::Quad), Some(Opcode::ExtraWide));
    }

    #[test]
    fn test_instruction_size() {
        let table = OpcodeTable::standard();
        assert_eq!(table.instruction_size(Opcode::Return, OperandScale::Single), Ok(1));
        assert_eq!(table.instruction_size(Opcode::Mov, OperandScale::Single), Ok(3));
        assert_eq!(table.instruction_size(Opcode::Mov, OperandScale::Double), Ok(6));
        assert_eq!(table.instruction_size(Opcode::LdaSmi, OperandScale::Quad), Ok(6));
    }

    #[test]
    fn test_rejects_none_sized_operand() {
        let descriptors = [
            OpcodeDescriptor::new(Opcode::Wide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::Ldar, Write, &[Reg, OperandType::None]),
        ];
        assert_eq!(
            OpcodeTable::new(&descriptors).unwrap_err(),
            BytecodeError::NoneSizedOperand {
                opcode: Opcode::Ldar,
                index: 1
            }
        );
    }

    #[test]
    fn test_rejects_duplicates_and_bad_prefixes() {
        let duplicate = [
            OpcodeDescriptor::new(Opcode::Wide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::Return, Read, &[]),
            OpcodeDescriptor::new(Opcode::Return, Read, &[]),
        ];
        assert_eq!(
            OpcodeTable::new(&duplicate).unwrap_err(),
            BytecodeError::DuplicateOpcode(Opcode::Return)
        );

        let missing_prefix = [OpcodeDescriptor::new(Opcode::Wide, AccNone, &[])];
        assert!(matches!(
            OpcodeTable::new(&missing_prefix),
            Err(BytecodeError::MalformedPrefix(_))
        ));

        let prefix_with_operand = [
            OpcodeDescriptor::new(Opcode::Wide, AccNone, &[Idx]),
            OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
        ];
        assert!(matches!(
            OpcodeTable::new(&prefix_with_operand),
            Err(BytecodeError::MalformedPrefix(_))
        ));
    }

    #[test]
    fn test_rejects_too_many_operands() {
        let descriptors = [
            OpcodeDescriptor::new(Opcode::Wide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::CallProperty, Write, &[Reg, Reg, Reg, Reg, Reg, Reg]),
        ];
        assert!(matches!(
            OpcodeTable::new(&descriptors),
            Err(BytecodeError::TooManyOperands { count: 6, .. })
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let table = OpcodeTable::new(&[
            OpcodeDescriptor::new(Opcode::Wide, AccNone, &[]),
            OpcodeDescriptor::new(Opcode::ExtraWide, AccNone, &[]),
        ])
        .unwrap();
        assert_eq!(
            table.accumulator_use(Opcode::Ldar),
            Err(BytecodeError::UnknownOpcode(Opcode::Ldar))
        );
    }
}
