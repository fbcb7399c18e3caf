//! Bytecode offset to source position mapping

use serde::{Deserialize, Serialize};

use crate::error::{CodegenError, CodegenResult};

/// A position in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Character offset in the source
    pub position: i32,
    /// Whether this marks a statement
    pub is_statement: bool,
}

impl SourcePosition {
    /// Create a source position
    pub const fn new(position: i32, is_statement: bool) -> Self {
        Self {
            position,
            is_statement,
        }
    }
}

/// Whether the builder keeps the positions it is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourcePositionMode {
    /// Record every position
    #[default]
    Record,
    /// Drop all positions
    Omit,
}

/// A single table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePositionEntry {
    /// Offset of the first byte of the attributed instruction
    pub bytecode_offset: u32,
    /// Source character offset
    pub source_position: i32,
    /// Whether this marks a statement
    pub is_statement: bool,
}

/// Finished source position table, ordered by bytecode offset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePositionTable {
    entries: Vec<SourcePositionEntry>,
}

impl SourcePositionTable {
    /// All entries in bytecode order
    pub fn entries(&self) -> &[SourcePositionEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry attributed to `bytecode_offset`: the last one at or before it
    pub fn find(&self, bytecode_offset: u32) -> Option<&SourcePositionEntry> {
        // Several entries may share an offset; take the last of them.
        let idx = self
            .entries
            .partition_point(|e| e.bytecode_offset <= bytecode_offset);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }
}

/// Append-only builder used by the bytecode writer
#[derive(Debug, Clone, Default)]
pub struct SourcePositionTableBuilder {
    mode: SourcePositionMode,
    entries: Vec<SourcePositionEntry>,
}

impl SourcePositionTableBuilder {
    /// Create a builder
    pub fn new(mode: SourcePositionMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    /// Recording mode
    pub fn mode(&self) -> SourcePositionMode {
        self.mode
    }

    /// Entries recorded so far
    pub fn entries(&self) -> &[SourcePositionEntry] {
        &self.entries
    }

    /// Attribute `bytecode_offset` to `position`.
    ///
    /// Offsets must never decrease.
    pub fn add_position(&mut self, bytecode_offset: u32, position: SourcePosition) -> CodegenResult<()> {
        if self.mode == SourcePositionMode::Omit {
            return Ok(());
        }
        if let Some(last) = self.entries.last() {
            if bytecode_offset < last.bytecode_offset {
                return Err(CodegenError::SourcePositionOrder {
                    offset: bytecode_offset,
                    last: last.bytecode_offset,
                });
            }
        }
        self.entries.push(SourcePositionEntry {
            bytecode_offset,
            source_position: position.position,
            is_statement: position.is_statement,
        });
        Ok(())
    }

    /// Finish the table
    pub fn build(self) -> SourcePositionTable {
        SourcePositionTable {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_position_table() {
        let mut builder = SourcePositionTableBuilder::new(SourcePositionMode::Record);
        builder.add_position(0, SourcePosition::new(1, true)).unwrap();
        builder.add_position(5, SourcePosition::new(20, false)).unwrap();
        builder.add_position(10, SourcePosition::new(50, true)).unwrap();
        let table = builder.build();

        assert_eq!(table.len(), 3);
        assert_eq!(table.find(0).unwrap().source_position, 1);
        assert_eq!(table.find(5).unwrap().source_position, 20);
        assert_eq!(table.find(7).unwrap().source_position, 20); // Between entries
        assert_eq!(table.find(10).unwrap().source_position, 50);
        assert!(table.find(10).unwrap().is_statement);
    }

    #[test]
    fn test_find_before_first_entry() {
        let mut builder = SourcePositionTableBuilder::default();
        builder.add_position(4, SourcePosition::new(8, false)).unwrap();
        let table = builder.build();
        assert!(table.find(3).is_none());
    }

    #[test]
    fn test_shared_offset_resolves_to_latest() {
        let mut builder = SourcePositionTableBuilder::default();
        builder.add_position(2, SourcePosition::new(8, true)).unwrap();
        builder.add_position(2, SourcePosition::new(9, false)).unwrap();
        let table = builder.build();
        assert_eq!(table.find(2).unwrap().source_position, 9);
    }

    #[test]
    fn test_rejects_decreasing_offset() {
        let mut builder = SourcePositionTableBuilder::default();
        builder.add_position(6, SourcePosition::new(1, true)).unwrap();
        assert_eq!(
            builder.add_position(2, SourcePosition::new(3, true)),
            Err(CodegenError::SourcePositionOrder { offset: 2, last: 6 })
        );
        assert_eq!(builder.entries().len(), 1);
    }

    #[test]
    fn test_omit_mode() {
        let mut builder = SourcePositionTableBuilder::new(SourcePositionMode::Omit);
        builder.add_position(0, SourcePosition::new(1, true)).unwrap();
        assert_eq!(builder.mode(), SourcePositionMode::Omit);
        assert!(builder.build().is_empty());
    }
}
