use std::sync::Arc;

use crate::attribute_info::{BootstrapMethod, CodeAttribute};
use crate::constant_info::ConstantPool;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

/// Everything the decompiler needs to know about one method. The constant
/// pool and bootstrap table are shared by all methods of a class.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub access_flags: MethodAccessFlags,
    pub code: CodeAttribute,
    pub constant_pool: Arc<ConstantPool>,
    pub bootstrap_methods: Arc<Vec<BootstrapMethod>>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// `<init>` or `<clinit>`.
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// `class.name descriptor`, used in diagnostics and cache keys.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}
