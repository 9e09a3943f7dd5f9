use nom::{
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u32},
    IResult,
};

use crate::constant_info::ConstantPool;

use super::types::*;

pub fn exception_entry_parser(input: &[u8]) -> IResult<&[u8], ExceptionEntry> {
    let (input, start_pc) = be_u16(input)?;
    let (input, end_pc) = be_u16(input)?;
    let (input, handler_pc) = be_u16(input)?;
    let (input, catch_type) = be_u16(input)?;
    Ok((
        input,
        ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    ))
}

fn local_variable_parser<'a>(
    input: &'a [u8],
    pool: &ConstantPool,
) -> IResult<&'a [u8], Option<LocalVariable>> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    let var = match (pool.utf8(name_index), pool.utf8(descriptor_index)) {
        (Some(name), Some(descriptor)) => Some(LocalVariable {
            start_pc,
            length,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            index,
        }),
        _ => None,
    };
    Ok((input, var))
}

/// Parse the body of a `Code` attribute (everything after the attribute
/// length). Nested attributes other than `LocalVariableTable` are skipped.
pub fn code_attribute_parser<'a>(
    input: &'a [u8],
    pool: &ConstantPool,
) -> IResult<&'a [u8], CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, code) = take(code_length)(input)?;
    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) =
        count(exception_entry_parser, exception_table_length as usize)(input)?;
    let (mut input, attributes_count) = be_u16(input)?;

    let mut local_variables = Vec::new();
    for _ in 0..attributes_count {
        let (rest, name_index) = be_u16(input)?;
        let (rest, length) = be_u32(rest)?;
        let (rest, body) = take(length)(rest)?;
        if pool.utf8(name_index) == Some("LocalVariableTable") {
            let (mut items, table_length) = be_u16(body)?;
            for _ in 0..table_length {
                let (next, var) = local_variable_parser(items, pool)?;
                local_variables.extend(var);
                items = next;
            }
        }
        input = rest;
    }

    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code: code.to_owned(),
            exception_table,
            local_variables,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_with_local_variable_table() {
        let mut pool = ConstantPool::default();
        let lvt = pool.add_utf8("LocalVariableTable");
        let name = pool.add_utf8("count");
        let desc = pool.add_utf8("I");

        let mut bytes = vec![0, 1, 0, 2, 0, 0, 0, 1, 0xb1, 0, 0, 0, 1];
        bytes.extend_from_slice(&lvt.to_be_bytes());
        bytes.extend_from_slice(&12u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 1, 0, 0, 0, 1]);
        bytes.extend_from_slice(&name.to_be_bytes());
        bytes.extend_from_slice(&desc.to_be_bytes());
        bytes.extend_from_slice(&[0, 1]);

        let (rest, code) = code_attribute_parser(&bytes, &pool).unwrap();
        assert!(rest.is_empty());
        assert_eq!(code.code, vec![0xb1]);
        assert_eq!(code.local_variables.len(), 1);
        assert_eq!(code.local_variables[0].name, "count");
        assert_eq!(code.local_variables[0].index, 1);
    }
}
