//! Type descriptors and the value types carried by expressions.

/// Type of a value, variable or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VarType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<VarType>),
    Null,
    Unknown,
}

/// Coarse type classes used when deciding whether two values may share a
/// variable or an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeFamily {
    Unknown,
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    Object,
}

pub const STRING: &str = "java/lang/String";
pub const OBJECT: &str = "java/lang/Object";

impl VarType {
    pub fn string() -> Self {
        VarType::Reference(STRING.to_string())
    }

    pub fn object() -> Self {
        VarType::Reference(OBJECT.to_string())
    }

    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, VarType::Long | VarType::Double)
    }

    pub fn stack_size(&self) -> u32 {
        match self {
            VarType::Void => 0,
            VarType::Long | VarType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, VarType::Reference(_) | VarType::Array(_) | VarType::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, VarType::Reference(name) if name == STRING)
    }

    pub fn array_dim(&self) -> usize {
        match self {
            VarType::Array(inner) => 1 + inner.array_dim(),
            _ => 0,
        }
    }

    pub fn element_type(&self) -> VarType {
        match self {
            VarType::Array(inner) => (**inner).clone(),
            _ => VarType::Unknown,
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            VarType::Boolean => TypeFamily::Boolean,
            VarType::Int | VarType::Byte | VarType::Char | VarType::Short => TypeFamily::Integer,
            VarType::Long => TypeFamily::Long,
            VarType::Float => TypeFamily::Float,
            VarType::Double => TypeFamily::Double,
            VarType::Reference(_) | VarType::Array(_) | VarType::Null => TypeFamily::Object,
            VarType::Void | VarType::Unknown => TypeFamily::Unknown,
        }
    }

    /// Least common type of two definitions of the same variable.
    pub fn join(&self, other: &VarType) -> VarType {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (VarType::Unknown, t) | (t, VarType::Unknown) => t.clone(),
            (VarType::Null, t) | (t, VarType::Null) if t.is_reference() => t.clone(),
            (a, b) if a.family() == TypeFamily::Integer && b.family() == TypeFamily::Integer => {
                VarType::Int
            }
            // boolean constants are int-typed until proven otherwise
            (VarType::Boolean, b) | (b, VarType::Boolean) if b.family() == TypeFamily::Integer => {
                VarType::Boolean
            }
            (a, b) if a.is_reference() && b.is_reference() => VarType::object(),
            _ => self.clone(),
        }
    }

    /// The JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            VarType::Int => "I".into(),
            VarType::Long => "J".into(),
            VarType::Float => "F".into(),
            VarType::Double => "D".into(),
            VarType::Byte => "B".into(),
            VarType::Char => "C".into(),
            VarType::Short => "S".into(),
            VarType::Boolean => "Z".into(),
            VarType::Void => "V".into(),
            VarType::Reference(name) => format!("L{};", name),
            VarType::Array(inner) => format!("[{}", inner.to_descriptor()),
            VarType::Null | VarType::Unknown => format!("L{};", OBJECT),
        }
    }

    /// Source spelling of the type.
    pub fn java_name(&self) -> String {
        match self {
            VarType::Int => "int".into(),
            VarType::Long => "long".into(),
            VarType::Float => "float".into(),
            VarType::Double => "double".into(),
            VarType::Byte => "byte".into(),
            VarType::Char => "char".into(),
            VarType::Short => "short".into(),
            VarType::Boolean => "boolean".into(),
            VarType::Void => "void".into(),
            VarType::Reference(name) => class_source_name(name),
            VarType::Array(inner) => format!("{}[]", inner.java_name()),
            VarType::Null | VarType::Unknown => "Object".into(),
        }
    }

    /// Type named by a `CONSTANT_Class` entry, which is either an internal
    /// class name or an array descriptor.
    pub fn from_class_name(name: &str) -> VarType {
        if name.starts_with('[') {
            parse_type_descriptor(name).unwrap_or(VarType::Unknown)
        } else {
            VarType::Reference(name.to_string())
        }
    }
}

/// Parsed method descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<VarType>,
    pub ret: VarType,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Option<MethodDescriptor> {
        let (params, ret) = parse_method_descriptor(desc)?;
        Some(MethodDescriptor { params, ret })
    }

    /// Local slots taken by the parameters, plus `this` when non-static.
    pub fn param_slots(&self, is_static: bool) -> u32 {
        let base = if is_static { 0 } else { 1 };
        base + self.params.iter().map(VarType::stack_size).sum::<u32>()
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (VarType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(VarType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((VarType::Byte, pos + 1)),
        b'C' => Some((VarType::Char, pos + 1)),
        b'D' => Some((VarType::Double, pos + 1)),
        b'F' => Some((VarType::Float, pos + 1)),
        b'I' => Some((VarType::Int, pos + 1)),
        b'J' => Some((VarType::Long, pos + 1)),
        b'S' => Some((VarType::Short, pos + 1)),
        b'Z' => Some((VarType::Boolean, pos + 1)),
        b'V' => Some((VarType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            Some((VarType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((VarType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Option<VarType> {
    let (ty, _) = parse_type_at(desc, 0)?;
    Some(ty)
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<VarType>, VarType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    let (ret, _) = parse_type_at(desc, close + 1)?;
    Some((params, ret))
}

/// Source name for an internal class name: `java.lang` classes lose their
/// package, nested classes use `.`.
pub fn class_source_name(name: &str) -> String {
    let name = name.strip_prefix("java/lang/").filter(|s| !s.contains('/')).unwrap_or(name);
    name.replace(['/', '$'], ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Convert a `newarray` type code to its element type.
pub fn newarray_type(atype: i32) -> VarType {
    match atype {
        4 => VarType::Boolean,
        5 => VarType::Char,
        6 => VarType::Float,
        7 => VarType::Double,
        8 => VarType::Byte,
        9 => VarType::Short,
        10 => VarType::Int,
        11 => VarType::Long,
        _ => VarType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_type_descriptor("I"), Some(VarType::Int));
        assert_eq!(parse_type_descriptor("J"), Some(VarType::Long));
        assert_eq!(parse_type_descriptor("V"), Some(VarType::Void));
        assert_eq!(parse_type_descriptor("Z"), Some(VarType::Boolean));
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse_type_descriptor("[[Ljava/lang/Object;"),
            Some(VarType::Array(Box::new(VarType::Array(Box::new(VarType::object())))))
        );
        assert_eq!(VarType::from_class_name("[I").array_dim(), 1);
    }

    #[test]
    fn test_method_descriptor_slots() {
        let md = MethodDescriptor::parse("(JLjava/lang/String;I)[B").unwrap();
        assert_eq!(md.params.len(), 3);
        assert_eq!(md.ret, VarType::Array(Box::new(VarType::Byte)));
        assert_eq!(md.param_slots(true), 4);
        assert_eq!(md.param_slots(false), 5);
    }

    #[test]
    fn test_source_names() {
        assert_eq!(class_source_name("java/lang/String"), "String");
        assert_eq!(class_source_name("java/util/Map$Entry"), "java.util.Map.Entry");
        assert_eq!(class_source_name("java/lang/invoke/MethodHandle"), "java.lang.invoke.MethodHandle");
    }

    #[test]
    fn test_join() {
        assert_eq!(VarType::Null.join(&VarType::string()), VarType::string());
        assert_eq!(VarType::Char.join(&VarType::Int), VarType::Int);
        assert_eq!(VarType::Int.join(&VarType::Boolean), VarType::Boolean);
    }
}
