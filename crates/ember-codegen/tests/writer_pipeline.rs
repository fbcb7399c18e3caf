use ember_bytecode::{Opcode, OpcodeTable, OperandScale};
use ember_codegen::{BytecodeArray, BytecodeArrayWriter, BytecodeNode, SourceInfo, WriterConfig};
use proptest::prelude::*;

fn node(table: &OpcodeTable, opcode: Opcode, operands: &[u32]) -> BytecodeNode {
    BytecodeNode::create(table, opcode, operands).unwrap()
}

#[test]
fn if_else_function_is_laid_out_with_patched_branch() {
    // if (r0) { return 1; } else { return 2; }
    let table = OpcodeTable::standard();
    let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default());
    let else_branch = writer.new_label();

    writer
        .write(&node(&table, Opcode::Ldar, &[0]).with_source_info(SourceInfo::Statement(0)))
        .unwrap();
    writer
        .write_jump(&node(&table, Opcode::JumpIfFalse, &[0]), else_branch)
        .unwrap();
    writer
        .write(&node(&table, Opcode::LdaSmi, &[1]).with_source_info(SourceInfo::Statement(10)))
        .unwrap();
    writer.write(&node(&table, Opcode::Return, &[])).unwrap();
    // unreachable tail of the then-branch
    writer
        .write(&node(&table, Opcode::LdaUndefined, &[]).with_source_info(SourceInfo::Statement(15)))
        .unwrap();
    writer.write(&node(&table, Opcode::Return, &[])).unwrap();

    writer.bind_label(else_branch).unwrap();
    writer
        .write(&node(&table, Opcode::LdaSmi, &[2]).with_source_info(SourceInfo::Statement(20)))
        .unwrap();
    writer.write(&node(&table, Opcode::Return, &[])).unwrap();

    let array = writer.finish().unwrap();
    assert_eq!(
        array.bytecodes,
        vec![0x19, 0x00, 0x53, 0x05, 0x11, 0x01, 0x60, 0x11, 0x02, 0x60]
    );
    let entries: Vec<_> = array
        .source_positions
        .entries()
        .iter()
        .map(|e| (e.bytecode_offset, e.source_position, e.is_statement))
        .collect();
    assert_eq!(entries, vec![(0, 0, true), (4, 10, true), (7, 20, true)]);
    assert_eq!(array.source_positions.find(8).unwrap().source_position, 20);
}

#[test]
fn loop_with_exit_jump() {
    // while (r1 < r2) { r1 = r1 + 1 }
    let table = OpcodeTable::standard();
    let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default());
    let header = writer.new_label();
    let exit = writer.new_label();

    writer.bind_label(header).unwrap();
    writer.write(&node(&table, Opcode::Ldar, &[1])).unwrap();
    writer.write(&node(&table, Opcode::TestLessThan, &[2, 0])).unwrap();
    writer.write_jump(&node(&table, Opcode::JumpIfFalse, &[0]), exit).unwrap();
    writer.write(&node(&table, Opcode::LdaSmi, &[1])).unwrap();
    writer.write(&node(&table, Opcode::Add, &[1, 1])).unwrap();
    writer.write(&node(&table, Opcode::Star, &[1])).unwrap();
    writer
        .write_jump_loop(&node(&table, Opcode::JumpLoop, &[0, 0]), header)
        .unwrap();
    writer.bind_label(exit).unwrap();
    writer.write(&node(&table, Opcode::LdaUndefined, &[])).unwrap();
    writer.write(&node(&table, Opcode::Return, &[])).unwrap();

    let array = writer.finish().unwrap();
    assert_eq!(
        array.bytecodes,
        vec![
            0x19, 0x01, // Ldar r1
            0x39, 0x02, 0x00, // TestLessThan r2, [0]
            0x53, 0x0C, // JumpIfFalse +12
            0x11, 0x01, // LdaSmi 1
            0x30, 0x01, 0x01, // Add r1, [1]
            0x20, 0x01, // Star r1
            0x54, 0x0E, 0x00, // JumpLoop back 14
            0x12, // LdaUndefined
            0x60, // Return
        ]
    );
}

#[test]
fn bytecode_array_serializes() {
    let table = OpcodeTable::standard();
    let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default());
    writer
        .write(&node(&table, Opcode::LdaConstant, &[300]).with_source_info(SourceInfo::Expression(7)))
        .unwrap();
    writer.write(&node(&table, Opcode::Return, &[])).unwrap();
    let array = writer.finish().unwrap();

    let json = serde_json::to_string(&array).unwrap();
    let restored: BytecodeArray = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, array);
}

#[test]
fn writer_config_from_json() {
    let config: WriterConfig =
        serde_json::from_str(r#"{"elide_noneffectful_bytecodes":false,"source_positions":"Omit"}"#).unwrap();
    assert_eq!(
        config,
        WriterConfig::default()
            .with_elision(false)
            .with_source_positions(ember_codegen::SourcePositionMode::Omit)
    );
}

#[derive(Debug, Clone)]
enum Step {
    Write(BytecodeNode),
    StartBlock,
}

const STRAIGHT_LINE: &[Opcode] = &[
    Opcode::LdaZero,
    Opcode::LdaSmi,
    Opcode::LdaUndefined,
    Opcode::LdaNull,
    Opcode::LdaTrue,
    Opcode::LdaConstant,
    Opcode::Ldar,
    Opcode::Star,
    Opcode::Mov,
    Opcode::LdaGlobal,
    Opcode::StaGlobal,
    Opcode::Add,
    Opcode::TestEqual,
    Opcode::LogicalNot,
    Opcode::CallProperty,
    Opcode::Return,
    Opcode::Throw,
    Opcode::Jump,
];

fn source_info() -> impl Strategy<Value = SourceInfo> {
    prop_oneof![
        2 => Just(SourceInfo::Invalid),
        1 => (0i32..10_000).prop_map(SourceInfo::Expression),
        1 => (0i32..10_000).prop_map(SourceInfo::Statement),
    ]
}

fn bytecode_node() -> impl Strategy<Value = BytecodeNode> {
    (0..STRAIGHT_LINE.len(), 0u32..70_000, source_info()).prop_map(|(i, raw, info)| {
        let table = OpcodeTable::standard();
        let opcode = STRAIGHT_LINE[i];
        let operands = vec![raw; table.operand_count(opcode).unwrap()];
        BytecodeNode::create(&table, opcode, &operands)
            .unwrap()
            .with_source_info(info)
    })
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![
            6 => bytecode_node().prop_map(Step::Write),
            1 => Just(Step::StartBlock),
        ],
        0..64,
    )
}

proptest! {
    #[test]
    fn prop_source_offsets_mark_instruction_starts(steps in steps()) {
        let table = OpcodeTable::standard();
        let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default().with_elision(false));
        let mut expected = Vec::new();

        for step in &steps {
            match step {
                Step::StartBlock => writer.start_block(),
                Step::Write(node) => {
                    let before = writer.current_offset();
                    let closed = writer.exit_seen_in_block();
                    writer.write(node).unwrap();
                    if closed {
                        prop_assert_eq!(writer.current_offset(), before);
                    } else if node.source_info().is_valid() {
                        expected.push(before as u32);
                    }
                }
            }
        }

        let array = writer.finish().unwrap();
        let offsets: Vec<u32> = array
            .source_positions
            .entries()
            .iter()
            .map(|e| e.bytecode_offset)
            .collect();
        prop_assert_eq!(offsets, expected);
    }

    #[test]
    fn prop_source_offsets_are_monotonic_with_elision(steps in steps()) {
        let table = OpcodeTable::standard();
        let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default());
        for step in &steps {
            match step {
                Step::StartBlock => writer.start_block(),
                Step::Write(node) => writer.write(node).unwrap(),
            }
        }

        let array = writer.finish().unwrap();
        let entries = array.source_positions.entries();
        for pair in entries.windows(2) {
            prop_assert!(pair[0].bytecode_offset <= pair[1].bytecode_offset);
        }
        for entry in entries {
            prop_assert!((entry.bytecode_offset as usize) < array.len());
        }
    }

    #[test]
    fn prop_dead_load_leaves_only_the_overwrite(
        load in prop::sample::select(vec![
            Opcode::LdaZero,
            Opcode::LdaSmi,
            Opcode::LdaUndefined,
            Opcode::LdaTheHole,
            Opcode::LdaFalse,
            Opcode::LdaConstant,
            Opcode::LdaCurrentContextSlot,
            Opcode::Ldar,
        ]),
        overwrite in prop::sample::select(vec![
            Opcode::LdaNull,
            Opcode::LdaTrue,
            Opcode::LdaGlobal,
            Opcode::CallProperty,
            Opcode::CallRuntime,
        ]),
        raw in 0u32..300,
        position in prop::option::of(0i32..500),
    ) {
        let table = OpcodeTable::standard();
        let operands = |op: Opcode| vec![raw; table.operand_count(op).unwrap()];
        let second_info = position.map_or(SourceInfo::Invalid, SourceInfo::Expression);
        let second = BytecodeNode::create(&table, overwrite, &operands(overwrite))
            .unwrap()
            .with_source_info(second_info);

        let mut both = BytecodeArrayWriter::new(&table, WriterConfig::default());
        both.write(&BytecodeNode::create(&table, load, &operands(load)).unwrap()).unwrap();
        both.write(&second).unwrap();

        let mut only = BytecodeArrayWriter::new(&table, WriterConfig::default());
        only.write(&second).unwrap();

        let both = both.finish().unwrap();
        let only = only.finish().unwrap();
        prop_assert_eq!(&both.bytecodes, &only.bytecodes);
        prop_assert_eq!(both.source_positions, only.source_positions);
    }

    #[test]
    fn prop_operand_width_round_trip(raw in any::<u32>()) {
        let table = OpcodeTable::standard();
        let node = BytecodeNode::create(&table, Opcode::LdaConstant, &[raw]).unwrap();
        let mut writer = BytecodeArrayWriter::new(&table, WriterConfig::default());
        writer.write(&node).unwrap();
        let bytes = writer.bytes();

        let decoded = match node.operand_scale() {
            OperandScale::Single => {
                prop_assert_eq!(bytes.len(), 2);
                u32::from(bytes[1])
            }
            OperandScale::Double => {
                prop_assert_eq!(bytes[0], Opcode::Wide.to_byte());
                u32::from(u16::from_be_bytes([bytes[2], bytes[3]]))
            }
            OperandScale::Quad => {
                prop_assert_eq!(bytes[0], Opcode::ExtraWide.to_byte());
                u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]])
            }
        };
        prop_assert_eq!(decoded, raw);
    }
}
