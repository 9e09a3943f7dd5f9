#[derive(Clone, Debug, PartialEq)]
pub enum ConstantInfo {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    /// Second slot of a `Long`/`Double` entry.
    Unusable,
}

/// A resolved field or method reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// A constant as loaded by `ldc` or passed as a bootstrap argument.
#[derive(Clone, Debug, PartialEq)]
pub enum PooledConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    MethodType(String),
    MethodHandle { kind: u8, member: MemberRef },
}

/// The constant pool of a class, indexed from 1 like the class file.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantInfo>,
}

impl ConstantPool {
    pub fn new(entries: Vec<ConstantInfo>) -> Self {
        ConstantPool { entries }
    }

    /// Appends an entry and returns its 1-based index. Wide entries take two
    /// slots.
    pub fn push(&mut self, info: ConstantInfo) -> u16 {
        let wide = matches!(info, ConstantInfo::Long(_) | ConstantInfo::Double(_));
        self.entries.push(info);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(ConstantInfo::Unusable);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&ConstantInfo> {
        self.entries.get((index as usize).checked_sub(1)?)
    }

    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantInfo::Class { name_index } => self.utf8(*name_index),
            _ => None,
        }
    }

    pub fn name_and_type(&self, index: u16) -> Option<(&str, &str)> {
        match self.get(index)? {
            ConstantInfo::NameAndType {
                name_index,
                descriptor_index,
            } => Some((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => None,
        }
    }

    /// Resolve a FieldRef, MethodRef or InterfaceMethodRef.
    pub fn member_ref(&self, index: u16) -> Option<MemberRef> {
        let (class_index, nat_index, is_interface) = match self.get(index)? {
            ConstantInfo::FieldRef {
                class_index,
                name_and_type_index,
            }
            | ConstantInfo::MethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            ConstantInfo::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            _ => return None,
        };
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Some(MemberRef {
            class_name: self.class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }

    /// Resolve an InvokeDynamic entry to (bootstrap index, name, descriptor).
    pub fn invoke_dynamic(&self, index: u16) -> Option<(u16, &str, &str)> {
        match self.get(index)? {
            ConstantInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Some((*bootstrap_method_attr_index, name, descriptor))
            }
            _ => None,
        }
    }

    /// Resolve a loadable constant (`ldc` operand or bootstrap argument).
    pub fn pooled(&self, index: u16) -> Option<PooledConstant> {
        Some(match self.get(index)? {
            ConstantInfo::Integer(v) => PooledConstant::Integer(*v),
            ConstantInfo::Float(v) => PooledConstant::Float(*v),
            ConstantInfo::Long(v) => PooledConstant::Long(*v),
            ConstantInfo::Double(v) => PooledConstant::Double(*v),
            ConstantInfo::String { string_index } => {
                PooledConstant::String(self.utf8(*string_index)?.to_string())
            }
            ConstantInfo::Class { name_index } => {
                PooledConstant::Class(self.utf8(*name_index)?.to_string())
            }
            ConstantInfo::MethodType { descriptor_index } => {
                PooledConstant::MethodType(self.utf8(*descriptor_index)?.to_string())
            }
            ConstantInfo::MethodHandle {
                reference_kind,
                reference_index,
            } => PooledConstant::MethodHandle {
                kind: *reference_kind,
                member: self.member_ref(*reference_index)?,
            },
            _ => return None,
        })
    }

    // ---- builders used when assembling pools by hand ----

    pub fn add_utf8(&mut self, value: &str) -> u16 {
        let existing = self
            .entries
            .iter()
            .position(|e| matches!(e, ConstantInfo::Utf8(s) if s == value));
        match existing {
            Some(pos) => (pos + 1) as u16,
            None => self.push(ConstantInfo::Utf8(value.to_string())),
        }
    }

    pub fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.push(ConstantInfo::Class { name_index })
    }

    pub fn add_string(&mut self, value: &str) -> u16 {
        let string_index = self.add_utf8(value);
        self.push(ConstantInfo::String { string_index })
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push(ConstantInfo::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantInfo::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class);
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantInfo::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    pub fn add_invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let name_and_type_index = self.add_name_and_type(name, descriptor);
        self.push(ConstantInfo::InvokeDynamic {
            bootstrap_method_attr_index: bootstrap,
            name_and_type_index,
        })
    }
}
