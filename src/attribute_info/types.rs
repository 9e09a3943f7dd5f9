use crate::constant_info::PooledConstant;

/// One row of a method's exception table. `catch_type == 0` marks a
/// catch-all (`finally`/`synchronized`) handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

#[derive(Clone, Debug, Default)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub local_variables: Vec<LocalVariable>,
}

/// A bootstrap method with its static arguments already resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapMethod {
    pub method_handle: PooledConstant,
    pub arguments: Vec<PooledConstant>,
}
