//! Bytecode array writer
//!
//! Serializes finalized [`BytecodeNode`]s in program order into a packed byte
//! stream and a parallel source position table. Two lossless reductions are
//! applied while writing:
//!
//! - **Dead block suppression**: once a block terminator (return, throw,
//!   jump, ...) is written, everything up to the next [`start_block`] is
//!   dropped.
//! - **Peephole elision**: an accumulator load without side effects is
//!   retracted when the very next instruction overwrites the accumulator
//!   without reading it.
//!
//! [`start_block`]: BytecodeArrayWriter::start_block

use ember_bytecode::{AccumulatorUse, BytecodeError, Opcode, OpcodeTable, OperandScale, OperandSize, OperandType};
use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, CodegenResult};
use crate::node::BytecodeNode;
use crate::source_position::{
    SourcePosition, SourcePositionEntry, SourcePositionMode, SourcePositionTable, SourcePositionTableBuilder,
};

/// Writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Retract accumulator loads whose result is overwritten right away
    pub elide_noneffectful_bytecodes: bool,
    /// Whether source positions are recorded
    pub source_positions: SourcePositionMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            elide_noneffectful_bytecodes: true,
            source_positions: SourcePositionMode::Record,
        }
    }
}

impl WriterConfig {
    /// Enable or disable peephole elision
    pub fn with_elision(mut self, enabled: bool) -> Self {
        self.elide_noneffectful_bytecodes = enabled;
        self
    }

    /// Set the source position recording mode
    pub fn with_source_positions(mut self, mode: SourcePositionMode) -> Self {
        self.source_positions = mode;
        self
    }
}

/// Jump target handle issued by [`BytecodeArrayWriter::new_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

impl Label {
    /// Index of the label within its writer
    pub fn index(self) -> usize {
        self.0
    }
}

/// Forward jump waiting for its label to be bound
#[derive(Debug, Clone, Copy)]
struct JumpSite {
    /// Offset of the jump's first byte (prefix included)
    jump_start: usize,
    /// Offset of the distance operand
    operand_offset: usize,
    size: OperandSize,
    scale: OperandScale,
}

#[derive(Debug, Clone)]
enum LabelState {
    Unbound(Vec<JumpSite>),
    Bound(usize),
}

/// Finished output of a [`BytecodeArrayWriter`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeArray {
    /// Packed instruction stream
    pub bytecodes: Vec<u8>,
    /// Byte offset to source position mapping
    pub source_positions: SourcePositionTable,
}

impl BytecodeArray {
    /// Length of the instruction stream in bytes
    pub fn len(&self) -> usize {
        self.bytecodes.len()
    }

    /// Whether no instruction was emitted
    pub fn is_empty(&self) -> bool {
        self.bytecodes.is_empty()
    }
}

/// Writes the bytecode of one function
#[derive(Debug)]
pub struct BytecodeArrayWriter<'t> {
    table: &'t OpcodeTable,
    config: WriterConfig,
    bytecodes: Vec<u8>,
    unbound_jumps: usize,
    source_positions: SourcePositionTableBuilder,
    last_bytecode: Opcode,
    last_bytecode_offset: usize,
    last_bytecode_had_source_info: bool,
    exit_seen_in_block: bool,
    labels: Vec<LabelState>,
    /// Encoded form of the instruction being written
    scratch: Vec<u8>,
}

impl<'t> BytecodeArrayWriter<'t> {
    /// Create a writer using `table` for operand layout
    pub fn new(table: &'t OpcodeTable, config: WriterConfig) -> Self {
        Self {
            table,
            config,
            bytecodes: Vec::with_capacity(512),
            unbound_jumps: 0,
            source_positions: SourcePositionTableBuilder::new(config.source_positions),
            last_bytecode: Opcode::Illegal,
            last_bytecode_offset: 0,
            last_bytecode_had_source_info: false,
            exit_seen_in_block: false,
            labels: Vec::new(),
            scratch: Vec::with_capacity(32),
        }
    }

    /// Active configuration
    pub fn config(&self) -> WriterConfig {
        self.config
    }

    /// Bytes written so far
    pub fn bytes(&self) -> &[u8] {
        &self.bytecodes
    }

    /// Offset the next instruction will start at
    pub fn current_offset(&self) -> usize {
        self.bytecodes.len()
    }

    /// Forward jumps still waiting for their label
    pub fn unbound_jumps(&self) -> usize {
        self.unbound_jumps
    }

    /// Whether the current block already ended
    pub fn exit_seen_in_block(&self) -> bool {
        self.exit_seen_in_block
    }

    /// Source positions recorded so far
    pub fn source_positions(&self) -> &[SourcePositionEntry] {
        self.source_positions.entries()
    }

    /// Write one instruction.
    ///
    /// Instructions following a block terminator are dropped until
    /// [`start_block`](Self::start_block). On error nothing is written.
    pub fn write(&mut self, node: &BytecodeNode) -> CodegenResult<()> {
        if self.exit_seen_in_block {
            tracing::trace!(opcode = %node.opcode(), "dropping unreachable bytecode");
            return Ok(());
        }
        self.encode(node)?;
        self.commit(node)?;
        Ok(())
    }

    /// Signal that a new basic block begins at the current offset.
    ///
    /// Reopens a closed block and forgets the last bytecode, so a load that
    /// may be a jump target is never elided.
    pub fn start_block(&mut self) {
        self.exit_seen_in_block = false;
        self.invalidate_last_bytecode();
    }

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::Unbound(Vec::new()));
        Label(self.labels.len() - 1)
    }

    /// Whether `label` has been bound
    pub fn is_bound(&self, label: Label) -> bool {
        matches!(self.labels.get(label.0), Some(LabelState::Bound(_)))
    }

    /// Bind `label` to the current offset, patch every forward jump to it and
    /// start a new basic block.
    pub fn bind_label(&mut self, label: Label) -> CodegenResult<()> {
        let target = self.bytecodes.len();
        let sites = match self.labels.get_mut(label.0) {
            None => return Err(CodegenError::UnknownLabel(label.0)),
            Some(LabelState::Bound(_)) => return Err(CodegenError::LabelAlreadyBound(label.0)),
            Some(LabelState::Unbound(sites)) => std::mem::take(sites),
        };
        self.labels[label.0] = LabelState::Bound(target);

        for site in &sites {
            self.patch_jump(site, target)?;
        }
        self.unbound_jumps -= sites.len();
        tracing::debug!(label = label.0, target, patched = sites.len(), "bound label");

        self.start_block();
        Ok(())
    }

    /// Write a forward jump to an unbound label.
    ///
    /// The node's first operand is replaced by a placeholder that is patched
    /// when the label is bound; its width is fixed by the node's scale.
    pub fn write_jump(&mut self, node: &BytecodeNode, label: Label) -> CodegenResult<()> {
        let opcode = node.opcode();
        if !opcode.is_forward_jump() {
            return Err(CodegenError::invalid_jump(format!("{opcode} is not a forward jump")));
        }
        match self.labels.get(label.0) {
            None => return Err(CodegenError::UnknownLabel(label.0)),
            Some(LabelState::Bound(_)) => {
                return Err(CodegenError::invalid_jump(format!(
                    "{opcode} targets label {} which is already bound",
                    label.0
                )));
            }
            Some(LabelState::Unbound(_)) => {}
        }
        if self.exit_seen_in_block {
            tracing::trace!(%opcode, "dropping unreachable jump");
            return Ok(());
        }

        let placeholder = node.with_operand(0, 0)?;
        self.encode(&placeholder)?;
        let encoded_len = self.scratch.len();
        self.commit(&placeholder)?;

        let scale = node.operand_scale();
        let jump_start = self.bytecodes.len() - encoded_len;
        let prefix_len = usize::from(self.table.prefix_for(scale).is_some());
        let size = self.table.operand_sizes(opcode, scale)?[0];
        let site = JumpSite {
            jump_start,
            operand_offset: jump_start + prefix_len + 1,
            size,
            scale,
        };
        if let Some(LabelState::Unbound(sites)) = self.labels.get_mut(label.0) {
            sites.push(site);
        }
        self.unbound_jumps += 1;
        Ok(())
    }

    /// Write a backward `JumpLoop` to an already bound loop header.
    ///
    /// The node's first operand is replaced by the distance back to the
    /// header.
    pub fn write_jump_loop(&mut self, node: &BytecodeNode, header: Label) -> CodegenResult<()> {
        let opcode = node.opcode();
        if opcode != Opcode::JumpLoop {
            return Err(CodegenError::invalid_jump(format!("{opcode} is not a loop jump")));
        }
        let target = match self.labels.get(header.0) {
            None => return Err(CodegenError::UnknownLabel(header.0)),
            Some(LabelState::Unbound(_)) => {
                return Err(CodegenError::invalid_jump(format!(
                    "loop header label {} is not bound",
                    header.0
                )));
            }
            Some(LabelState::Bound(target)) => *target,
        };
        if self.exit_seen_in_block {
            tracing::trace!(%opcode, "dropping unreachable loop jump");
            return Ok(());
        }

        let scale = node.operand_scale();
        let distance = self.bytecodes.len() - target;
        let size = self.table.operand_sizes(opcode, scale)?.first().copied();
        let fits = match (size, u32::try_from(distance)) {
            (Some(size), Ok(raw)) => OperandType::UImm.fits(raw, size),
            _ => false,
        };
        if !fits {
            return Err(CodegenError::JumpOutOfRange { distance, scale });
        }

        let resolved = node.with_operand(0, distance as u32)?;
        self.write(&resolved)
    }

    /// Finish writing and hand out the bytecode array
    pub fn finish(self) -> CodegenResult<BytecodeArray> {
        if self.unbound_jumps != 0 {
            return Err(CodegenError::UnboundJumps(self.unbound_jumps));
        }
        let source_positions = self.source_positions.build();
        tracing::debug!(
            bytes = self.bytecodes.len(),
            source_positions = source_positions.len(),
            "finished bytecode array"
        );
        Ok(BytecodeArray {
            bytecodes: self.bytecodes,
            source_positions,
        })
    }

    /// Encode `node` into the scratch buffer without touching any state
    fn encode(&mut self, node: &BytecodeNode) -> CodegenResult<()> {
        let table = self.table;
        let opcode = node.opcode();
        let scale = node.operand_scale();
        let types = table.operand_types(opcode)?;
        let sizes = table.operand_sizes(opcode, scale)?;
        let operands = node.operands();
        if operands.len() != sizes.len() {
            return Err(BytecodeError::OperandCountMismatch {
                opcode,
                expected: sizes.len(),
                actual: operands.len(),
            }
            .into());
        }

        self.scratch.clear();
        if let Some(prefix) = table.prefix_for(scale) {
            self.scratch.push(prefix.to_byte());
        }
        self.scratch.push(opcode.to_byte());

        for (index, ((&raw, &size), &ty)) in operands.iter().zip(sizes).zip(types).enumerate() {
            if size == OperandSize::None {
                return Err(BytecodeError::NoneSizedOperand { opcode, index }.into());
            }
            if !ty.fits(raw, size) {
                return Err(BytecodeError::OperandOutOfRange {
                    opcode,
                    index,
                    value: raw,
                    scale,
                }
                .into());
            }
            push_operand(&mut self.scratch, raw, size);
        }
        Ok(())
    }

    /// Apply block and elision bookkeeping, then append the scratch buffer
    fn commit(&mut self, node: &BytecodeNode) -> CodegenResult<()> {
        self.update_exit_seen_in_block(node.opcode());
        self.maybe_elide_last_bytecode(node.opcode(), node.source_info().is_valid())?;
        self.update_source_position_table(node)?;
        self.bytecodes.extend_from_slice(&self.scratch);
        Ok(())
    }

    fn update_exit_seen_in_block(&mut self, opcode: Opcode) {
        if opcode.is_block_terminator() {
            self.exit_seen_in_block = true;
        }
    }

    fn maybe_elide_last_bytecode(&mut self, next: Opcode, has_source_info: bool) -> CodegenResult<()> {
        if !self.config.elide_noneffectful_bytecodes {
            return Ok(());
        }

        let mut has_source_info = has_source_info;
        // A dead load may only go if that does not lose a source position:
        // either it had none, or the next bytecode has none and inherits it.
        if self.last_bytecode.is_accumulator_load_without_effects()
            && self.table.accumulator_use(next)? == AccumulatorUse::Write
            && (!self.last_bytecode_had_source_info || !has_source_info)
        {
            tracing::trace!(
                elided = %self.last_bytecode,
                offset = self.last_bytecode_offset,
                by = %next,
                "eliding dead accumulator load"
            );
            self.bytecodes.truncate(self.last_bytecode_offset);
            has_source_info |= self.last_bytecode_had_source_info;
        }
        self.last_bytecode = next;
        self.last_bytecode_had_source_info = has_source_info;
        self.last_bytecode_offset = self.bytecodes.len();
        Ok(())
    }

    fn invalidate_last_bytecode(&mut self) {
        self.last_bytecode = Opcode::Illegal;
    }

    fn update_source_position_table(&mut self, node: &BytecodeNode) -> CodegenResult<()> {
        let source_info = node.source_info();
        if let Some(position) = source_info.position() {
            let offset = self.bytecodes.len() as u32;
            self.source_positions
                .add_position(offset, SourcePosition::new(position, source_info.is_statement()))?;
        }
        Ok(())
    }

    fn patch_jump(&mut self, site: &JumpSite, target: usize) -> CodegenResult<()> {
        let distance = target - site.jump_start;
        let raw = match u32::try_from(distance) {
            Ok(raw) if OperandType::UImm.fits(raw, site.size) => raw,
            _ => {
                return Err(CodegenError::JumpOutOfRange {
                    distance,
                    scale: site.scale,
                });
            }
        };
        let mut encoded = Vec::with_capacity(4);
        push_operand(&mut encoded, raw, site.size);
        self.bytecodes[site.operand_offset..site.operand_offset + encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }
}

/// Append `raw` at `size` bytes, most significant byte first
fn push_operand(out: &mut Vec<u8>, raw: u32, size: OperandSize) {
    match size {
        OperandSize::None => {}
        OperandSize::Byte => out.push(raw as u8),
        OperandSize::Short => out.extend_from_slice(&(raw as u16).to_be_bytes()),
        OperandSize::Quad => out.extend_from_slice(&raw.to_be_bytes()),
    }
}
