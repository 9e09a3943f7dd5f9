//! The expression tree attached to statements.

use std::collections::BTreeSet;

use crate::constant_info::PooledConstant;
use crate::decompile::descriptor::{MethodDescriptor, TypeFamily, VarType};

/// `exprent_use` flag: the expression may be evaluated more than once.
pub const MULTIPLE_USES: u8 = 1;
/// `exprent_use` flag: evaluating the expression has no side effects.
pub const SIDE_EFFECTS_FREE: u8 = 2;
pub const BOTH_FLAGS: u8 = MULTIPLE_USES | SIDE_EFFECTS_FREE;

/// Stack variables are numbered from here upwards by stack depth.
pub const STACK_BASE: u32 = 10000;

/// An expression together with the bytecode offsets it was built from.
#[derive(Clone, Debug)]
pub struct Exprent {
    pub kind: ExprKind,
    pub bytecode: BTreeSet<u32>,
}

impl PartialEq for Exprent {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Annotation {
        class_name: String,
    },
    Array {
        array: Box<Exprent>,
        index: Box<Exprent>,
        /// Element type.
        ty: VarType,
    },
    Assert {
        params: Vec<Exprent>,
    },
    Assignment {
        left: Box<Exprent>,
        right: Box<Exprent>,
        /// Operator of a compound assignment (`+=` etc.).
        cond: Option<FunctionType>,
    },
    Const {
        ty: VarType,
        value: ConstValue,
    },
    Exit {
        kind: ExitKind,
        value: Option<Box<Exprent>>,
        ret_type: VarType,
    },
    Field {
        name: String,
        class_name: String,
        is_static: bool,
        instance: Option<Box<Exprent>>,
        ty: VarType,
        /// Pseudo variable assigned by the SSAU pass.
        stamp: FieldStamp,
    },
    Function {
        func: FunctionType,
        operands: Vec<Exprent>,
    },
    If {
        condition: Box<Exprent>,
    },
    Invocation(Box<InvocationExpr>),
    Lambda(Box<LambdaExpr>),
    Monitor {
        kind: MonitorKind,
        value: Box<Exprent>,
    },
    New(Box<NewExpr>),
    Switch {
        value: Box<Exprent>,
        case_values: Vec<Vec<Option<Exprent>>>,
    },
    Var(VarExpr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Return,
    Throw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorKind {
    Enter,
    Exit,
}

/// Field pseudo-variable index. Never part of structural equality.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldStamp(pub Option<i32>);

impl PartialEq for FieldStamp {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(VarType),
    Null,
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Long(a), ConstValue::Long(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::String(a), ConstValue::String(b)) => a == b,
            (ConstValue::Class(a), ConstValue::Class(b)) => a == b,
            (ConstValue::Null, ConstValue::Null) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VarExpr {
    pub index: u32,
    pub version: u32,
    pub var_type: VarType,
    pub stack: bool,
    /// Rendered as a declaration (`int x`).
    pub definition: bool,
}

impl PartialEq for VarExpr {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.version == other.version && self.var_type == other.var_type
    }
}

impl VarExpr {
    pub fn pair(&self) -> VarVersionPair {
        VarVersionPair::new(self.index as i32, self.version)
    }
}

/// A variable and one of its SSA versions. Field pseudo variables use
/// negative indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarVersionPair {
    pub var: i32,
    pub version: u32,
}

impl VarVersionPair {
    pub fn new(var: i32, version: u32) -> Self {
        VarVersionPair { var, version }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationKind {
    Virtual,
    Special,
    Static,
    Interface,
    Dynamic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapCall {
    pub handle: PooledConstant,
    pub arguments: Vec<PooledConstant>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvocationExpr {
    pub name: String,
    pub class_name: String,
    pub kind: InvocationKind,
    pub instance: Option<Exprent>,
    pub descriptor: MethodDescriptor,
    pub string_descriptor: String,
    pub params: Vec<Exprent>,
    pub bootstrap: Option<BootstrapCall>,
}

impl InvocationExpr {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static(&self) -> bool {
        self.kind == InvocationKind::Static || self.kind == InvocationKind::Dynamic
    }
}

/// `invokedynamic` through the lambda metafactory.
#[derive(Clone, Debug, PartialEq)]
pub struct LambdaExpr {
    /// Functional interface being implemented.
    pub interface: VarType,
    pub impl_class: String,
    pub impl_name: String,
    /// Values captured at the call site; a bound receiver comes first.
    pub captured: Vec<Exprent>,
    pub is_static_impl: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExpr {
    pub new_type: VarType,
    pub constructor: Option<InvocationExpr>,
    pub dims: Vec<Exprent>,
    pub elements: Vec<Exprent>,
    pub direct_array_init: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionType {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Rem,
    Shl,
    Shr,
    Ushr,
    BitNot,
    BoolNot,
    Neg,
    /// Primitive conversion (`i2l` and friends).
    Convert(ConvertTo),
    Cast,
    Instanceof,
    ArrayLength,
    /// `--x`
    Imm,
    /// `x--`
    Mmi,
    /// `++x`
    Ipp,
    /// `x++`
    Ppi,
    /// Ternary `?:`
    Iif,
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// `&&`
    Cadd,
    /// `||`
    Cor,
    StrConcat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConvertTo {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
}

impl ConvertTo {
    pub fn var_type(self) -> VarType {
        match self {
            ConvertTo::Int => VarType::Int,
            ConvertTo::Long => VarType::Long,
            ConvertTo::Float => VarType::Float,
            ConvertTo::Double => VarType::Double,
            ConvertTo::Byte => VarType::Byte,
            ConvertTo::Char => VarType::Char,
            ConvertTo::Short => VarType::Short,
        }
    }
}

impl FunctionType {
    /// Infix token of binary operators and comparisons.
    pub fn operator(self) -> Option<&'static str> {
        use FunctionType::*;
        Some(match self {
            Add | StrConcat => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            And => "&",
            Or => "|",
            Xor => "^",
            Rem => "%",
            Shl => "<<",
            Shr => ">>",
            Ushr => ">>>",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Ge => ">=",
            Gt => ">",
            Le => "<=",
            Cadd => "&&",
            Cor => "||",
            _ => return None,
        })
    }

    /// Java operator precedence, smaller binds tighter.
    pub fn precedence(self) -> i32 {
        use FunctionType::*;
        match self {
            ArrayLength | Mmi | Ppi => 0,
            BitNot | BoolNot | Neg | Convert(_) | Cast | Imm | Ipp => 1,
            Mul | Div | Rem => 2,
            Add | Sub | StrConcat => 3,
            Shl | Shr | Ushr => 4,
            Lt | Ge | Gt | Le => 5,
            Instanceof | Eq | Ne => 6,
            And => 7,
            Xor => 8,
            Or => 9,
            Cadd => 10,
            Cor => 11,
            Iif => 12,
            Lcmp | Fcmpl | Fcmpg | Dcmpl | Dcmpg => -1,
        }
    }

    pub fn is_associative(self) -> bool {
        use FunctionType::*;
        matches!(self, Add | Mul | And | Or | Xor | Cadd | Cor | StrConcat)
    }

    pub fn is_comparison(self) -> bool {
        use FunctionType::*;
        matches!(self, Eq | Ne | Lt | Ge | Gt | Le)
    }

    pub fn is_cmp(self) -> bool {
        use FunctionType::*;
        matches!(self, Lcmp | Fcmpl | Fcmpg | Dcmpl | Dcmpg)
    }

    pub fn is_inc_dec(self) -> bool {
        use FunctionType::*;
        matches!(self, Imm | Mmi | Ipp | Ppi)
    }

    /// Comparison with the opposite outcome.
    pub fn negated_comparison(self) -> Option<FunctionType> {
        use FunctionType::*;
        Some(match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Ge => Lt,
            Gt => Le,
            Le => Gt,
            _ => return None,
        })
    }
}

impl Exprent {
    pub fn new(kind: ExprKind) -> Self {
        Exprent {
            kind,
            bytecode: BTreeSet::new(),
        }
    }

    pub fn with_offsets(mut self, offsets: Option<&BTreeSet<u32>>) -> Self {
        if let Some(o) = offsets {
            self.bytecode.extend(o.iter().copied());
        }
        self
    }

    pub fn add_bytecode_offsets(&mut self, offsets: &BTreeSet<u32>) {
        self.bytecode.extend(offsets.iter().copied());
    }

    // ---- constructors ----

    pub fn var(index: u32, var_type: VarType) -> Self {
        Exprent::new(ExprKind::Var(VarExpr {
            index,
            version: 0,
            var_type,
            stack: false,
            definition: false,
        }))
    }

    pub fn stack_var(index: u32, var_type: VarType) -> Self {
        Exprent::new(ExprKind::Var(VarExpr {
            index,
            version: 0,
            var_type,
            stack: true,
            definition: false,
        }))
    }

    pub fn int_const(value: i32) -> Self {
        Exprent::new(ExprKind::Const {
            ty: guess_int_type(value),
            value: ConstValue::Int(value),
        })
    }

    pub fn bool_const(value: bool) -> Self {
        Exprent::new(ExprKind::Const {
            ty: VarType::Boolean,
            value: ConstValue::Int(value as i32),
        })
    }

    pub fn null_const() -> Self {
        Exprent::new(ExprKind::Const {
            ty: VarType::Null,
            value: ConstValue::Null,
        })
    }

    pub fn string_const(value: &str) -> Self {
        Exprent::new(ExprKind::Const {
            ty: VarType::string(),
            value: ConstValue::String(value.to_string()),
        })
    }

    pub fn assign(left: Exprent, right: Exprent) -> Self {
        Exprent::new(ExprKind::Assignment {
            left: Box::new(left),
            right: Box::new(right),
            cond: None,
        })
    }

    pub fn func(func: FunctionType, operands: Vec<Exprent>) -> Self {
        Exprent::new(ExprKind::Function { func, operands })
    }

    pub fn if_expr(condition: Exprent) -> Self {
        Exprent::new(ExprKind::If {
            condition: Box::new(condition),
        })
    }

    pub fn exit(kind: ExitKind, value: Option<Exprent>, ret_type: VarType) -> Self {
        Exprent::new(ExprKind::Exit {
            kind,
            value: value.map(Box::new),
            ret_type,
        })
    }

    // ---- queries ----

    pub fn as_var(&self) -> Option<&VarExpr> {
        match &self.kind {
            ExprKind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_var_mut(&mut self) -> Option<&mut VarExpr> {
        match &mut self.kind {
            ExprKind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self.kind, ExprKind::Var(_))
    }

    pub fn is_stack_var(&self) -> bool {
        matches!(&self.kind, ExprKind::Var(v) if v.stack)
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, ExprKind::Const { .. })
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self.kind, ExprKind::Assignment { .. })
    }

    pub fn function_type(&self) -> Option<FunctionType> {
        match &self.kind {
            ExprKind::Function { func, .. } => Some(*func),
            _ => None,
        }
    }

    pub fn as_invocation(&self) -> Option<&InvocationExpr> {
        match &self.kind {
            ExprKind::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    pub fn as_invocation_mut(&mut self) -> Option<&mut InvocationExpr> {
        match &mut self.kind {
            ExprKind::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    /// Left and right side of an assignment.
    pub fn assignment_parts(&self) -> Option<(&Exprent, &Exprent)> {
        match &self.kind {
            ExprKind::Assignment { left, right, .. } => Some((left, right)),
            _ => None,
        }
    }

    pub fn assignment_parts_mut(&mut self) -> Option<(&mut Exprent, &mut Exprent)> {
        match &mut self.kind {
            ExprKind::Assignment { left, right, .. } => Some((left, right)),
            _ => None,
        }
    }

    pub fn if_condition(&self) -> Option<&Exprent> {
        match &self.kind {
            ExprKind::If { condition } => Some(condition),
            _ => None,
        }
    }

    pub fn if_condition_mut(&mut self) -> Option<&mut Exprent> {
        match &mut self.kind {
            ExprKind::If { condition } => Some(condition),
            _ => None,
        }
    }

    /// Wrap the condition of an `If` exprent in a boolean negation.
    pub fn negate_if(&mut self) {
        if let ExprKind::If { condition } = &mut self.kind {
            let inner = std::mem::replace(condition.as_mut(), Exprent::null_const());
            **condition = Exprent::func(FunctionType::BoolNot, vec![inner]);
        }
    }

    /// Direct children in their fixed evaluation order.
    pub fn children(&self) -> Vec<&Exprent> {
        let mut out = Vec::new();
        match &self.kind {
            ExprKind::Array { array, index, .. } => {
                out.push(array.as_ref());
                out.push(index.as_ref());
            }
            ExprKind::Assert { params } => out.extend(params.iter()),
            ExprKind::Assignment { left, right, .. } => {
                out.push(left.as_ref());
                out.push(right.as_ref());
            }
            ExprKind::Exit { value, .. } => out.extend(value.as_deref()),
            ExprKind::Field { instance, .. } => out.extend(instance.as_deref()),
            ExprKind::Function { operands, .. } => out.extend(operands.iter()),
            ExprKind::If { condition } => out.push(condition.as_ref()),
            ExprKind::Invocation(inv) => {
                out.extend(inv.instance.as_ref());
                out.extend(inv.params.iter());
            }
            ExprKind::Lambda(l) => out.extend(l.captured.iter()),
            ExprKind::Monitor { value, .. } => out.push(value.as_ref()),
            ExprKind::New(n) => {
                if n.new_type.array_dim() == 0 {
                    if let Some(c) = &n.constructor {
                        out.extend(c.instance.as_ref());
                        out.extend(c.params.iter());
                    }
                } else {
                    out.extend(n.dims.iter());
                    out.extend(n.elements.iter());
                }
            }
            ExprKind::Switch { value, .. } => out.push(value.as_ref()),
            ExprKind::Annotation { .. } | ExprKind::Const { .. } | ExprKind::Var(_) => {}
        }
        out
    }

    /// Mutable direct children, same order as [`Exprent::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Exprent> {
        let mut out = Vec::new();
        match &mut self.kind {
            ExprKind::Array { array, index, .. } => {
                out.push(array.as_mut());
                out.push(index.as_mut());
            }
            ExprKind::Assert { params } => out.extend(params.iter_mut()),
            ExprKind::Assignment { left, right, .. } => {
                out.push(left.as_mut());
                out.push(right.as_mut());
            }
            ExprKind::Exit { value, .. } => out.extend(value.as_deref_mut()),
            ExprKind::Field { instance, .. } => out.extend(instance.as_deref_mut()),
            ExprKind::Function { operands, .. } => out.extend(operands.iter_mut()),
            ExprKind::If { condition } => out.push(condition.as_mut()),
            ExprKind::Invocation(inv) => {
                let inv = inv.as_mut();
                out.extend(inv.instance.as_mut());
                out.extend(inv.params.iter_mut());
            }
            ExprKind::Lambda(l) => out.extend(l.captured.iter_mut()),
            ExprKind::Monitor { value, .. } => out.push(value.as_mut()),
            ExprKind::New(n) => {
                let n = n.as_mut();
                if n.new_type.array_dim() == 0 {
                    if let Some(c) = &mut n.constructor {
                        out.extend(c.instance.as_mut());
                        out.extend(c.params.iter_mut());
                    }
                } else {
                    out.extend(n.dims.iter_mut());
                    out.extend(n.elements.iter_mut());
                }
            }
            ExprKind::Switch { value, .. } => out.push(value.as_mut()),
            ExprKind::Annotation { .. } | ExprKind::Const { .. } | ExprKind::Var(_) => {}
        }
        out
    }

    /// Every descendant in pre-order, the expression itself excluded.
    pub fn all_recursive(&self) -> Vec<&Exprent> {
        let mut out = Vec::new();
        let mut stack: Vec<&Exprent> = self.children().into_iter().rev().collect();
        while let Some(e) = stack.pop() {
            out.push(e);
            stack.extend(e.children().into_iter().rev());
        }
        out
    }

    /// Visit this expression and all descendants, children before parents.
    pub fn visit_mut_post(&mut self, f: &mut dyn FnMut(&mut Exprent)) {
        for c in self.children_mut() {
            c.visit_mut_post(f);
        }
        f(self);
    }

    /// Every variable reference in this tree, itself included.
    pub fn all_vars(&self) -> Vec<&VarExpr> {
        let mut out: Vec<&VarExpr> = self.as_var().into_iter().collect();
        out.extend(self.all_recursive().into_iter().filter_map(Exprent::as_var));
        out
    }

    pub fn contains_var(&self, index: u32) -> bool {
        self.all_vars().iter().any(|v| v.index == index)
    }

    /// Whether `other` occurs in this tree, compared structurally.
    pub fn contains_exprent(&self, other: &Exprent) -> bool {
        self == other || self.all_recursive().into_iter().any(|e| e == other)
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub fn at_path(&self, path: &[usize]) -> Option<&Exprent> {
        let mut current = self;
        for &i in path {
            current = current.children().into_iter().nth(i)?;
        }
        Some(current)
    }

    pub fn at_path_mut(&mut self, path: &[usize]) -> Option<&mut Exprent> {
        let mut current = self;
        for &i in path {
            current = current.children_mut().into_iter().nth(i)?;
        }
        Some(current)
    }

    /// Replace the direct child at `index`, returning the old one.
    pub fn replace_child(&mut self, index: usize, new: Exprent) -> Option<Exprent> {
        let slot = self.children_mut().into_iter().nth(index)?;
        Some(std::mem::replace(slot, new))
    }

    /// Replace every occurrence of `old` below this node with a copy of
    /// `new`. Returns the number of replacements.
    pub fn replace_exprent(&mut self, old: &Exprent, new: &Exprent) -> usize {
        let mut count = 0;
        for child in self.children_mut() {
            if *child == *old {
                *child = new.clone();
                count += 1;
            } else {
                count += child.replace_exprent(old, new);
            }
        }
        count
    }

    pub fn precedence(&self) -> i32 {
        match &self.kind {
            ExprKind::Assignment { .. } => 13,
            ExprKind::Function { func, .. } => func.precedence(),
            ExprKind::New(_) => 1,
            _ => 0,
        }
    }

    /// `MULTIPLE_USES` / `SIDE_EFFECTS_FREE` flags of this expression.
    pub fn exprent_use(&self) -> u8 {
        match &self.kind {
            ExprKind::Const { .. } | ExprKind::Var(_) => BOTH_FLAGS,
            ExprKind::Field {
                is_static, instance, ..
            } => {
                if *is_static {
                    MULTIPLE_USES
                } else {
                    instance.as_ref().map_or(MULTIPLE_USES, |i| i.exprent_use() & MULTIPLE_USES)
                }
            }
            ExprKind::Array { array, index, .. } => array.exprent_use() & index.exprent_use() & MULTIPLE_USES,
            ExprKind::Function { func, operands } => {
                if func.is_inc_dec() {
                    0
                } else {
                    operands.iter().fold(BOTH_FLAGS, |acc, o| acc & o.exprent_use())
                }
            }
            _ => 0,
        }
    }

    pub fn expr_type(&self) -> VarType {
        match &self.kind {
            ExprKind::Annotation { class_name } => VarType::Reference(class_name.clone()),
            ExprKind::Array { ty, .. } => ty.clone(),
            ExprKind::Assert { .. } => VarType::Void,
            ExprKind::Assignment { left, .. } => left.expr_type(),
            ExprKind::Const { ty, .. } => ty.clone(),
            ExprKind::Exit { .. } | ExprKind::Monitor { .. } | ExprKind::If { .. } | ExprKind::Switch { .. } => {
                VarType::Void
            }
            ExprKind::Field { ty, .. } => ty.clone(),
            ExprKind::Function { func, operands } => function_type_of(*func, operands),
            ExprKind::Invocation(inv) => inv.descriptor.ret.clone(),
            ExprKind::Lambda(l) => l.interface.clone(),
            ExprKind::New(n) => n.new_type.clone(),
            ExprKind::Var(v) => v.var_type.clone(),
        }
    }
}

fn function_type_of(func: FunctionType, operands: &[Exprent]) -> VarType {
    use FunctionType::*;
    let operand = |i: usize| operands.get(i).map_or(VarType::Unknown, Exprent::expr_type);
    match func {
        Eq | Ne | Lt | Ge | Gt | Le | Cadd | Cor | BoolNot | Instanceof => VarType::Boolean,
        Lcmp | Fcmpl | Fcmpg | Dcmpl | Dcmpg | ArrayLength => VarType::Int,
        StrConcat => VarType::string(),
        Convert(to) => to.var_type(),
        Cast => operand(1),
        Iif => operand(1).join(&operand(2)),
        Imm | Mmi | Ipp | Ppi | Neg | BitNot => operand(0),
        Shl | Shr | Ushr => widen(operand(0)),
        And | Or | Xor => {
            let (a, b) = (operand(0), operand(1));
            if a == VarType::Boolean && b == VarType::Boolean {
                VarType::Boolean
            } else {
                widen(a.join(&b))
            }
        }
        Add | Sub | Mul | Div | Rem => widen(operand(0).join(&operand(1))),
    }
}

/// Arithmetic promotion of sub-int integer types.
fn widen(ty: VarType) -> VarType {
    match ty {
        VarType::Byte | VarType::Char | VarType::Short | VarType::Boolean => VarType::Int,
        t if t.family() == TypeFamily::Integer => VarType::Int,
        t => t,
    }
}

/// The narrowest type an `int` constant can be read as before type
/// inference pins it down.
pub fn guess_int_type(value: i32) -> VarType {
    match value {
        0 | 1 => VarType::Int,
        v if (i8::MIN as i32..=i8::MAX as i32).contains(&v) => VarType::Byte,
        v if (i16::MIN as i32..=i16::MAX as i32).contains(&v) => VarType::Short,
        _ => VarType::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: Exprent, b: Exprent) -> Exprent {
        Exprent::func(FunctionType::Add, vec![a, b])
    }

    #[test]
    fn equality_ignores_offsets() {
        let mut a = Exprent::int_const(3);
        a.bytecode.insert(7);
        assert_eq!(a, Exprent::int_const(3));
    }

    #[test]
    fn var_equality_ignores_definition_flag() {
        let a = Exprent::var(2, VarType::Int);
        let mut b = a.clone();
        b.as_var_mut().unwrap().definition = true;
        assert_eq!(a, b);
        b.as_var_mut().unwrap().version = 3;
        assert_ne!(a, b);
    }

    #[test]
    fn use_flags() {
        let v = Exprent::var(1, VarType::Int);
        assert_eq!(v.exprent_use(), BOTH_FLAGS);
        let inc = Exprent::func(FunctionType::Ppi, vec![v.clone()]);
        assert_eq!(inc.exprent_use(), 0);
        let sum = add(v.clone(), Exprent::int_const(1));
        assert_eq!(sum.exprent_use(), BOTH_FLAGS);
        let field = Exprent::new(ExprKind::Field {
            name: "f".into(),
            class_name: "A".into(),
            is_static: false,
            instance: Some(Box::new(v)),
            ty: VarType::Int,
            stamp: FieldStamp::default(),
        });
        assert_eq!(field.exprent_use(), MULTIPLE_USES);
    }

    #[test]
    fn path_access_and_replacement() {
        let mut e = add(Exprent::var(1, VarType::Int), add(Exprent::var(2, VarType::Int), Exprent::int_const(5)));
        assert_eq!(e.at_path(&[1, 0]), Some(&Exprent::var(2, VarType::Int)));
        *e.at_path_mut(&[1, 1]).unwrap() = Exprent::int_const(6);
        assert_eq!(e.all_recursive().len(), 4);
        let n = e.replace_exprent(&Exprent::var(2, VarType::Int), &Exprent::int_const(0));
        assert_eq!(n, 1);
        assert!(!e.contains_var(2));
    }

    #[test]
    fn comparison_types() {
        let cmp = Exprent::func(FunctionType::Lt, vec![Exprent::var(1, VarType::Int), Exprent::int_const(4)]);
        assert_eq!(cmp.expr_type(), VarType::Boolean);
        assert_eq!(FunctionType::Lt.negated_comparison(), Some(FunctionType::Ge));
    }
}
