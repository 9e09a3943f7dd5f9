use nom::{
    bytes::complete::take,
    error::{Error, ErrorKind},
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u8},
    Err as BaseErr, IResult,
};

use super::types::*;

fn utf8_constant(input: &[u8]) -> IResult<&[u8], ConstantInfo> {
    let (input, length) = be_u16(input)?;
    let (input, bytes) = take(length)(input)?;
    // Modified UTF-8 only differs for NUL and supplementary characters.
    Ok((input, ConstantInfo::Utf8(String::from_utf8_lossy(bytes).into_owned())))
}

fn ref_pair(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, a) = be_u16(input)?;
    let (input, b) = be_u16(input)?;
    Ok((input, (a, b)))
}

/// Parse a single constant pool entry.
pub fn constant_parser(input: &[u8]) -> IResult<&[u8], ConstantInfo> {
    let (input, tag) = be_u8(input)?;
    match tag {
        1 => utf8_constant(input),
        3 => {
            let (input, v) = be_i32(input)?;
            Ok((input, ConstantInfo::Integer(v)))
        }
        4 => {
            let (input, v) = be_f32(input)?;
            Ok((input, ConstantInfo::Float(v)))
        }
        5 => {
            let (input, v) = be_i64(input)?;
            Ok((input, ConstantInfo::Long(v)))
        }
        6 => {
            let (input, v) = be_f64(input)?;
            Ok((input, ConstantInfo::Double(v)))
        }
        7 => {
            let (input, name_index) = be_u16(input)?;
            Ok((input, ConstantInfo::Class { name_index }))
        }
        8 => {
            let (input, string_index) = be_u16(input)?;
            Ok((input, ConstantInfo::String { string_index }))
        }
        9 | 10 | 11 => {
            let (input, (class_index, name_and_type_index)) = ref_pair(input)?;
            let info = match tag {
                9 => ConstantInfo::FieldRef { class_index, name_and_type_index },
                10 => ConstantInfo::MethodRef { class_index, name_and_type_index },
                _ => ConstantInfo::InterfaceMethodRef { class_index, name_and_type_index },
            };
            Ok((input, info))
        }
        12 => {
            let (input, (name_index, descriptor_index)) = ref_pair(input)?;
            Ok((input, ConstantInfo::NameAndType { name_index, descriptor_index }))
        }
        15 => {
            let (input, reference_kind) = be_u8(input)?;
            let (input, reference_index) = be_u16(input)?;
            Ok((input, ConstantInfo::MethodHandle { reference_kind, reference_index }))
        }
        16 => {
            let (input, descriptor_index) = be_u16(input)?;
            Ok((input, ConstantInfo::MethodType { descriptor_index }))
        }
        17 | 18 => {
            let (input, (bootstrap_method_attr_index, name_and_type_index)) = ref_pair(input)?;
            Ok((
                input,
                ConstantInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                },
            ))
        }
        _ => Err(BaseErr::Error(Error::new(input, ErrorKind::Tag))),
    }
}

/// Parse `constant_pool_count - 1` entries, honouring the two-slot rule for
/// `Long` and `Double`.
pub fn constant_pool_parser(input: &[u8], const_pool_size: u16) -> IResult<&[u8], ConstantPool> {
    let mut pool = ConstantPool::default();
    let mut input = input;
    while pool.len() + 1 < const_pool_size as usize {
        let (rest, info) = constant_parser(input)?;
        pool.push(info);
        input = rest;
    }
    Ok((input, pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_ref_resolves() {
        let bytes = [
            1, 0, 3, b'F', b'o', b'o', // #1 Utf8 Foo
            7, 0, 1, // #2 Class #1
            1, 0, 3, b'b', b'a', b'r', // #3 Utf8 bar
            1, 0, 3, b'(', b')', b'V', // #4 Utf8 ()V
            12, 0, 3, 0, 4, // #5 NameAndType
            10, 0, 2, 0, 5, // #6 MethodRef
        ];
        let (rest, pool) = constant_pool_parser(&bytes, 7).unwrap();
        assert!(rest.is_empty());
        let member = pool.member_ref(6).unwrap();
        assert_eq!(member.class_name, "Foo");
        assert_eq!(member.name, "bar");
        assert_eq!(member.descriptor, "()V");
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let bytes = [5, 0, 0, 0, 0, 0, 0, 0, 7, 3, 0, 0, 0, 1];
        let (_, pool) = constant_pool_parser(&bytes, 4).unwrap();
        assert_eq!(pool.get(1), Some(&ConstantInfo::Long(7)));
        assert_eq!(pool.get(2), Some(&ConstantInfo::Unusable));
        assert_eq!(pool.get(3), Some(&ConstantInfo::Integer(1)));
    }
}
