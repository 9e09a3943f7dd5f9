extern crate classfile_decompiler;

use pretty_assertions::assert_eq;

use classfile_decompiler::code_attribute::opcodes::*;
use classfile_decompiler::code_attribute::{code_parser, instruction_parser, Instruction, InstructionGroup};

#[test]
fn test_simple() {
    let instruction = &[0x11, 0xff, 0xfe];
    assert_eq!(
        Ok((&[][..], Instruction::new(SIPUSH, vec![-2]).at(0))),
        instruction_parser(instruction, 0)
    );
}

#[test]
fn test_wide() {
    let (rest, instr) = instruction_parser(&[0xc4, 0x15, 0xaa, 0xbb], 0).unwrap();
    assert!(rest.is_empty());
    assert_eq!(instr.opcode, ILOAD);
    assert!(instr.wide);
    assert_eq!(instr.operands, vec![0xaabb]);
}

#[test]
fn test_alignment() {
    let instructions = vec![
        (3, vec![0xaa, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 21, 0, 0, 0, 30, 0, 0, 0, 31]),
        (0, vec![0xaa, 0, 0, 0, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 21, 0, 0, 0, 30, 0, 0, 0, 31]),
    ];
    for (address, bytes) in instructions {
        let (rest, instr) = instruction_parser(&bytes, address).unwrap();
        assert!(rest.is_empty());
        assert_eq!(instr.group(), InstructionGroup::Switch);
        let table = instr.switch.unwrap();
        assert_eq!(table.default, address + 10);
        assert_eq!(table.values, vec![20, 21]);
        assert_eq!(table.targets, vec![address + 30, address + 31]);
    }
}

#[test]
fn test_lookupswitch() {
    // lookupswitch at offset 0: three bytes of padding, two pairs
    let code = [
        0xab, 0, 0, 0, 0, 0, 0, 40, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 28, 0, 0, 0, 9, 0, 0, 0, 36,
    ];
    let (rest, instr) = instruction_parser(&code, 0).unwrap();
    assert!(rest.is_empty());
    let table = instr.switch.unwrap();
    assert_eq!(table.default, 40);
    assert_eq!(table.values, vec![1, 9]);
    assert_eq!(table.targets, vec![28, 36]);
}

#[test]
fn test_incomplete() {
    let code = &[0x59, 0x59, 0xc4, 0x15]; // dup, dup, <incomplete iload/wide>
    assert!(code_parser(code).is_err());
}

#[test]
fn short_forms_fold_into_indexed_forms() {
    // iload_0 istore_2 aload_3 astore_1 dload_2 fstore_0
    let seq = code_parser(&[0x1a, 0x3d, 0x2d, 0x4c, 0x28, 0x43]).unwrap();
    let folded: Vec<(u8, i32)> = seq.iter().map(|i| (i.opcode, i.operand(0))).collect();
    assert_eq!(
        folded,
        vec![(ILOAD, 0), (ISTORE, 2), (ALOAD, 3), (ASTORE, 1), (DLOAD, 2), (FSTORE, 0)]
    );
    assert_eq!(seq.offsets(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn wide_goto_becomes_goto() {
    let (_, instr) = instruction_parser(&[0xc8, 0xff, 0xff, 0xff, 0xf6], 20).unwrap();
    assert_eq!(instr.opcode, GOTO);
    assert_eq!(instr.jump_target(), Some(10));
    assert!(!instr.can_fall_through());
}

#[test]
fn sequence_offsets_follow_operand_widths() {
    // iconst_0; istore_1; iload_1; ifeq +9; iinc 1 1; goto -7; return
    let code = [0x03, 0x3c, 0x1b, 0x99, 0x00, 0x09, 0x84, 0x01, 0x01, 0xa7, 0xff, 0xf9, 0xb1];
    let seq = code_parser(&code).unwrap();
    assert_eq!(seq.offsets(), vec![0, 1, 2, 3, 6, 9, 12]);

    let branch = seq.get(3).unwrap();
    assert!(branch.is_conditional_jump());
    assert!(branch.can_fall_through());
    assert_eq!(branch.jump_target(), Some(12));

    let back = seq.get(5).unwrap();
    assert_eq!(back.jump_target(), Some(2));
    assert_eq!(seq.get(4).unwrap().operands, vec![1, 1]);
    assert_eq!(seq.last().unwrap().group(), InstructionGroup::Return);
}

#[test]
fn same_shape_ignores_jump_targets_and_offsets() {
    let a = instruction_parser(&[0xa7, 0x00, 0x05], 0).unwrap().1;
    let b = instruction_parser(&[0xa7, 0x00, 0x09], 40).unwrap().1;
    assert!(a.same_shape(&b));
    assert_ne!(a, b);

    let load0 = Instruction::new(ILOAD, vec![0]);
    let load1 = Instruction::new(ILOAD, vec![1]);
    assert!(!load0.same_shape(&load1));
}

#[test]
fn invokeinterface_keeps_index_and_count() {
    let (_, instr) = instruction_parser(&[0xb9, 0x00, 0x0c, 0x02, 0x00], 0).unwrap();
    assert_eq!(instr.opcode, INVOKEINTERFACE);
    assert_eq!(instr.operands, vec![12, 2]);
    assert_eq!(instr.group(), InstructionGroup::Invocation);
}
