use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    number::complete::{be_i16, be_i32, be_i8, be_u16, be_u8},
    Err as BaseErr, IResult,
};

use super::opcodes::*;
use super::types::*;

type Err<E> = BaseErr<Error<E>>;

fn fail(input: &[u8]) -> Err<&[u8]> {
    BaseErr::Error(Error::new(input, ErrorKind::Tag))
}

fn relative(address: u32, delta: i32) -> i32 {
    (address as i64 + delta as i64) as i32
}

fn local_index(input: &[u8], wide: bool) -> IResult<&[u8], i32> {
    if wide {
        let (input, index) = be_u16(input)?;
        Ok((input, index as i32))
    } else {
        let (input, index) = be_u8(input)?;
        Ok((input, index as i32))
    }
}

fn switch_padding(input: &[u8], address: u32) -> IResult<&[u8], &[u8]> {
    let padding = (4 - ((address + 1) % 4)) % 4;
    take(padding)(input)
}

fn table_switch(input: &[u8], address: u32) -> IResult<&[u8], SwitchTable> {
    let (input, _) = switch_padding(input, address)?;
    let (input, default) = be_i32(input)?;
    let (input, low) = be_i32(input)?;
    let (mut input, high) = be_i32(input)?;
    if high < low {
        return Err(fail(input));
    }
    let mut values = Vec::with_capacity((high - low + 1) as usize);
    let mut targets = Vec::with_capacity(values.capacity());
    for value in low..=high {
        let (rest, offset) = be_i32(input)?;
        input = rest;
        values.push(value);
        targets.push(relative(address, offset) as u32);
    }
    Ok((
        input,
        SwitchTable {
            default: relative(address, default) as u32,
            values,
            targets,
        },
    ))
}

fn lookup_switch(input: &[u8], address: u32) -> IResult<&[u8], SwitchTable> {
    let (input, _) = switch_padding(input, address)?;
    let (input, default) = be_i32(input)?;
    let (mut input, npairs) = be_i32(input)?;
    if npairs < 0 {
        return Err(fail(input));
    }
    let mut values = Vec::with_capacity(npairs as usize);
    let mut targets = Vec::with_capacity(npairs as usize);
    for _ in 0..npairs {
        let (rest, value) = be_i32(input)?;
        let (rest, offset) = be_i32(rest)?;
        input = rest;
        values.push(value);
        targets.push(relative(address, offset) as u32);
    }
    Ok((
        input,
        SwitchTable {
            default: relative(address, default) as u32,
            values,
            targets,
        },
    ))
}

/// Decode a single instruction located at `address` in the code array.
pub fn instruction_parser(input: &[u8], address: u32) -> IResult<&[u8], Instruction> {
    let (input, mut opcode) = be_u8(input)?;
    let (input, wide) = if opcode == WIDE {
        let (input, op) = be_u8(input)?;
        opcode = op;
        (input, true)
    } else {
        (input, false)
    };

    let mut switch = None;
    let (input, operands) = match opcode {
        BIPUSH => {
            let (input, v) = be_i8(input)?;
            (input, vec![v as i32])
        }
        SIPUSH => {
            let (input, v) = be_i16(input)?;
            (input, vec![v as i32])
        }
        LDC => {
            let (input, v) = be_u8(input)?;
            (input, vec![v as i32])
        }
        LDC_W | LDC2_W | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            let (input, v) = be_u16(input)?;
            (input, vec![v as i32])
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            let (input, index) = local_index(input, wide)?;
            (input, vec![index])
        }
        ILOAD_0..=ALOAD_3 => {
            let rel = (opcode - ILOAD_0) as i32;
            opcode = ILOAD + (rel / 4) as u8;
            (input, vec![rel % 4])
        }
        ISTORE_0..=ASTORE_3 => {
            let rel = (opcode - ISTORE_0) as i32;
            opcode = ISTORE + (rel / 4) as u8;
            (input, vec![rel % 4])
        }
        IINC => {
            let (input, index) = local_index(input, wide)?;
            if wide {
                let (input, delta) = be_i16(input)?;
                (input, vec![index, delta as i32])
            } else {
                let (input, delta) = be_i8(input)?;
                (input, vec![index, delta as i32])
            }
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let (input, off) = be_i16(input)?;
            (input, vec![relative(address, off as i32)])
        }
        GOTO_W | JSR_W => {
            let (input, off) = be_i32(input)?;
            opcode = if opcode == GOTO_W { GOTO } else { JSR };
            (input, vec![relative(address, off)])
        }
        TABLESWITCH => {
            let (input, table) = table_switch(input, address)?;
            switch = Some(Box::new(table));
            (input, vec![])
        }
        LOOKUPSWITCH => {
            let (input, table) = lookup_switch(input, address)?;
            switch = Some(Box::new(table));
            (input, vec![])
        }
        INVOKEINTERFACE => {
            let (input, index) = be_u16(input)?;
            let (input, count) = be_u8(input)?;
            let (input, _) = be_u8(input)?;
            (input, vec![index as i32, count as i32])
        }
        INVOKEDYNAMIC => {
            let (input, index) = be_u16(input)?;
            let (input, _) = be_u16(input)?;
            (input, vec![index as i32])
        }
        NEWARRAY => {
            let (input, atype) = be_u8(input)?;
            (input, vec![atype as i32])
        }
        MULTIANEWARRAY => {
            let (input, index) = be_u16(input)?;
            let (input, dims) = be_u8(input)?;
            (input, vec![index as i32, dims as i32])
        }
        WIDE => return Err(fail(input)),
        op if op > JSR_W => return Err(fail(input)),
        _ => (input, vec![]),
    };

    Ok((
        input,
        Instruction {
            opcode,
            operands,
            wide,
            switch,
            offset: Some(address),
        },
    ))
}

/// Decode a whole code array into an instruction sequence.
pub fn code_parser(code: &[u8]) -> Result<InstructionSequence, Err<&[u8]>> {
    let mut input = code;
    let mut instructions = Vec::new();
    while !input.is_empty() {
        let address = (code.len() - input.len()) as u32;
        let (rest, instr) = instruction_parser(input, address)?;
        instructions.push(instr);
        input = rest;
    }
    Ok(InstructionSequence::new(instructions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_forms_are_normalized() {
        let (_, instr) = instruction_parser(&[0x2b], 0).unwrap();
        assert_eq!(instr.opcode, ALOAD);
        assert_eq!(instr.operands, vec![1]);

        let (_, instr) = instruction_parser(&[0x3e], 0).unwrap();
        assert_eq!(instr.opcode, ISTORE);
        assert_eq!(instr.operands, vec![3]);
    }

    #[test]
    fn wide_iinc() {
        let (rest, instr) = instruction_parser(&[0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe], 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(instr.opcode, IINC);
        assert!(instr.wide);
        assert_eq!(instr.operands, vec![256, -2]);
    }

    #[test]
    fn jumps_are_absolute() {
        let (_, instr) = instruction_parser(&[0xa7, 0xff, 0xfd], 10).unwrap();
        assert_eq!(instr.opcode, GOTO);
        assert_eq!(instr.jump_target(), Some(7));
    }

    #[test]
    fn tableswitch_alignment() {
        // tableswitch at offset 1: two bytes of padding
        let code = [
            0x03, 0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x18, 0x00, 0x00, 0x00, 0x1c,
        ];
        let seq = code_parser(&code).unwrap();
        assert_eq!(seq.len(), 2);
        let table = seq.instructions[1].switch.as_ref().unwrap();
        assert_eq!(table.default, 0x21);
        assert_eq!(table.values, vec![0, 1]);
        assert_eq!(table.targets, vec![0x19, 0x1d]);
    }
}
