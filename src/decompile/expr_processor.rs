//! Turns the instructions of every basic block into expressions.
//!
//! The operand stack is simulated symbolically. Every value pushed is
//! first stored into a stack variable numbered by its depth, and the stack
//! itself only ever holds copies of those variables. Values that stay on
//! the stack across a block boundary therefore meet in the same stack
//! variable; the stack variable pass inlines everything else later.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::code_attribute::{opcodes::*, Instruction};
use crate::constant_info::PooledConstant;

use super::context::MethodContext;
use super::descriptor::{newarray_type, parse_type_descriptor, MethodDescriptor, VarType};
use super::error::{DecompileError, Result};
use super::exprs::{
    BootstrapCall, ConstValue, ConvertTo, ExitKind, ExprKind, Exprent, FieldStamp, FunctionType, InvocationExpr,
    InvocationKind, LambdaExpr, MonitorKind, NewExpr, STACK_BASE,
};
use super::sforms::direct_graph::{flatten, ExprSlot, NodeId};
use super::statement::{StatId, StatKind, StatType, StatementGraph};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const REF_INVOKE_STATIC: u8 = 6;
const REF_NEW_INVOKE_SPECIAL: u8 = 8;

/// Builds expression lists for every block below `root`, then lifts the
/// head expressions of ifs, switches and synchronized statements.
pub fn process_statement(ctx: &MethodContext, graph: &mut StatementGraph, root: StatId) -> Result<()> {
    let dg = flatten(graph, root)?;
    let handler_vars = handler_entry_vars(graph, root);
    let locals = LocalTypes::new(ctx);

    let mut order = dg.reverse_postorder();
    let reached: HashSet<NodeId> = order.iter().copied().collect();
    order.extend((0..dg.nodes.len()).filter(|n| !reached.contains(n)));

    let mut outs: HashMap<NodeId, Vec<VarType>> = HashMap::new();
    for n in order {
        let node = &dg.nodes[n];
        let entry = node
            .preds
            .iter()
            .find_map(|p| outs.get(p))
            .cloned()
            .unwrap_or_default();

        let out = match node.slot {
            Some(ExprSlot::Block(stat)) => {
                let instructions = match graph.block_of(stat) {
                    Some(bb) => bb.seq.instructions.clone(),
                    None => Vec::new(),
                };
                let mut interp = Interpreter::new(ctx, &locals);
                match handler_vars.get(&stat) {
                    Some(var) => interp.start_handler(var.clone()),
                    None => interp.start(&entry),
                }
                for instr in &instructions {
                    interp.step(instr)?;
                }
                trace!(stat, exprents = interp.list.len(), depth = interp.stack.len(), "block converted");
                let out = interp.stack.iter().map(Exprent::expr_type).collect();
                graph[stat].exprents = Some(interp.list);
                out
            }
            _ => entry,
        };
        outs.insert(n, out);
    }

    // children first, so nested heads are lifted before their parents look
    for stat in graph.subtree(root).into_iter().rev() {
        if matches!(
            graph.stat_type(stat),
            StatType::If | StatType::Switch | StatType::Synchronized
        ) {
            graph.init_exprents(stat)?;
        }
    }
    debug!(method = %ctx.method.name, "expressions built");
    Ok(())
}

/// Catch variable seen on the stack at the entry of each handler block.
fn handler_entry_vars(graph: &StatementGraph, root: StatId) -> HashMap<StatId, Exprent> {
    let mut out = HashMap::new();
    for stat in graph.subtree(root) {
        match &graph[stat].kind {
            StatKind::Trycatch(data) => {
                for (handler, var) in graph[stat].stats.iter().skip(1).zip(data.vars.iter()) {
                    out.insert(graph.basichead(*handler), plain_use(var));
                }
            }
            // a finally handler no longer stores the exception
            StatKind::CatchAll(data) if !data.is_finally => {
                if let (Some(handler), Some(var)) = (data.handler, data.vars.first()) {
                    out.insert(graph.basichead(handler), plain_use(var));
                }
            }
            _ => {}
        }
    }
    out
}

fn plain_use(var: &Exprent) -> Exprent {
    let mut var = var.clone();
    if let Some(v) = var.as_var_mut() {
        v.definition = false;
    }
    var
}

/// Types of the parameter slots.
struct LocalTypes {
    params: HashMap<u32, VarType>,
}

impl LocalTypes {
    fn new(ctx: &MethodContext) -> Self {
        let mut params = HashMap::new();
        let mut slot = 0;
        if !ctx.is_static() {
            params.insert(0, VarType::Reference(ctx.method.class_name.clone()));
            slot = 1;
        }
        for p in &ctx.descriptor.params {
            params.insert(slot, p.clone());
            slot += p.stack_size();
        }
        LocalTypes { params }
    }

    fn type_of(&self, index: u32, fallback: VarType) -> VarType {
        match self.params.get(&index) {
            Some(t) if t.family() == fallback.family() => t.clone(),
            _ => fallback,
        }
    }
}

struct Interpreter<'c, 'a> {
    ctx: &'c MethodContext<'a>,
    locals: &'c LocalTypes,
    stack: Vec<Exprent>,
    list: Vec<Exprent>,
    offsets: BTreeSet<u32>,
}

impl<'c, 'a> Interpreter<'c, 'a> {
    fn new(ctx: &'c MethodContext<'a>, locals: &'c LocalTypes) -> Self {
        Interpreter {
            ctx,
            locals,
            stack: Vec::new(),
            list: Vec::new(),
            offsets: BTreeSet::new(),
        }
    }

    fn start(&mut self, entry: &[VarType]) {
        self.stack = entry
            .iter()
            .enumerate()
            .map(|(i, t)| Exprent::stack_var(STACK_BASE + i as u32, t.clone()))
            .collect();
    }

    fn start_handler(&mut self, catch_var: Exprent) {
        self.push(catch_var);
    }

    fn ex(&self, kind: ExprKind) -> Exprent {
        Exprent::new(kind).with_offsets(Some(&self.offsets))
    }

    fn emit(&mut self, e: Exprent) {
        let e = e.with_offsets(Some(&self.offsets));
        self.list.push(e);
    }

    fn push(&mut self, value: Exprent) {
        let index = STACK_BASE + self.stack.len() as u32;
        let var = Exprent::stack_var(index, value.expr_type()).with_offsets(Some(&self.offsets));
        self.emit(Exprent::assign(var.clone(), value));
        self.stack.push(var);
    }

    fn pop(&mut self) -> Result<Exprent> {
        self.stack
            .pop()
            .ok_or_else(|| DecompileError::UnsupportedBytecode("operand stack underflow".into()))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Exprent>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.pop()?);
        }
        out.reverse();
        Ok(out)
    }

    fn peek(&self, from_top: usize) -> Result<&Exprent> {
        self.stack
            .len()
            .checked_sub(from_top + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| DecompileError::UnsupportedBytecode("operand stack underflow".into()))
    }

    fn wide_at(&self, from_top: usize) -> Result<bool> {
        Ok(self.peek(from_top)?.expr_type().is_wide())
    }

    /// Moves the top `count` entries up one slot and stores a copy of the
    /// entry `copy_from_end` places from the top into the freed slot.
    fn insert_by_offset(&mut self, count: usize, copy_from_end: usize) -> Result<()> {
        if self.stack.len() < count {
            return Err(DecompileError::UnsupportedBytecode("operand stack underflow".into()));
        }
        let base = STACK_BASE + self.stack.len() as u32;
        let mut moved = Vec::with_capacity(count + 1);
        for i in 0..count {
            let old = self.pop()?;
            let new = Exprent::stack_var(base - i as u32, old.expr_type());
            self.emit(Exprent::assign(new.clone(), old));
            moved.insert(0, new);
        }
        let source = moved[moved.len() - copy_from_end].clone();
        let var = Exprent::stack_var(base - count as u32, source.expr_type());
        self.emit(Exprent::assign(var.clone(), source));
        moved.insert(0, var);
        self.stack.extend(moved);
        Ok(())
    }

    fn step(&mut self, instr: &Instruction) -> Result<()> {
        self.offsets = instr.offset.into_iter().collect();
        let op = instr.opcode;
        match op {
            NOP | GOTO | GOTO_W => {}
            ACONST_NULL => self.push(Exprent::null_const()),
            ICONST_M1..=ICONST_5 => self.push(Exprent::int_const(op as i32 - ICONST_0 as i32)),
            LCONST_0 | LCONST_1 => self.push(self.constant(VarType::Long, ConstValue::Long((op - LCONST_0) as i64))),
            FCONST_0..=FCONST_2 => {
                self.push(self.constant(VarType::Float, ConstValue::Float((op - FCONST_0) as f32)))
            }
            DCONST_0 | DCONST_1 => {
                self.push(self.constant(VarType::Double, ConstValue::Double((op - DCONST_0) as f64)))
            }
            BIPUSH | SIPUSH => self.push(Exprent::int_const(instr.operand(0))),
            LDC | LDC_W | LDC2_W => {
                let value = self.ldc(instr.operand(0))?;
                self.push(value);
            }
            ILOAD..=ALOAD => {
                let index = instr.operand(0) as u32;
                let ty = self.locals.type_of(index, load_type(op));
                self.push(Exprent::var(index, ty));
            }
            IALOAD..=SALOAD => {
                let index = self.pop()?;
                let array = self.pop()?;
                let ty = array_element_type(op, &array.expr_type());
                self.push(self.ex(ExprKind::Array {
                    array: Box::new(array),
                    index: Box::new(index),
                    ty,
                }));
            }
            ISTORE..=ASTORE => {
                let value = self.pop()?;
                let index = instr.operand(0) as u32;
                let ty = if op == ASTORE { value.expr_type() } else { load_type(op - ISTORE + ILOAD) };
                let var = Exprent::var(index, ty).with_offsets(Some(&self.offsets));
                self.emit(Exprent::assign(var, value));
            }
            IASTORE..=SASTORE => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop()?;
                let ty = array_element_type(op - IASTORE + IALOAD, &array.expr_type());
                let target = self.ex(ExprKind::Array {
                    array: Box::new(array),
                    index: Box::new(index),
                    ty,
                });
                self.emit(Exprent::assign(target, value));
            }
            POP => {
                self.pop()?;
            }
            POP2 => {
                if !self.wide_at(0)? {
                    self.pop()?;
                }
                self.pop()?;
            }
            DUP => {
                let top = self.peek(0)?.clone();
                self.push(top);
            }
            DUP_X1 => self.insert_by_offset(2, 1)?,
            DUP_X2 => {
                if self.wide_at(1)? {
                    self.insert_by_offset(2, 1)?;
                } else {
                    self.insert_by_offset(3, 1)?;
                }
            }
            DUP2 => {
                if self.wide_at(0)? {
                    let top = self.peek(0)?.clone();
                    self.push(top);
                } else {
                    let a = self.peek(1)?.clone();
                    let b = self.peek(0)?.clone();
                    self.push(a);
                    self.push(b);
                }
            }
            DUP2_X1 => {
                if self.wide_at(0)? {
                    self.insert_by_offset(2, 1)?;
                } else {
                    self.insert_by_offset(3, 2)?;
                    self.insert_by_offset(3, 1)?;
                }
            }
            DUP2_X2 => match (self.wide_at(0)?, self.wide_at(1)?) {
                (true, true) => self.insert_by_offset(2, 1)?,
                (true, false) => self.insert_by_offset(3, 1)?,
                (false, _) => {
                    let depth = if self.wide_at(2)? { 3 } else { 4 };
                    self.insert_by_offset(depth, 2)?;
                    self.insert_by_offset(depth, 1)?;
                }
            },
            SWAP => {
                self.insert_by_offset(2, 1)?;
                self.pop()?;
            }
            IADD..=DREM => {
                let func = [
                    FunctionType::Add,
                    FunctionType::Sub,
                    FunctionType::Mul,
                    FunctionType::Div,
                    FunctionType::Rem,
                ][((op - IADD) / 4) as usize];
                self.binary(func)?;
            }
            INEG..=DNEG => {
                let a = self.pop()?;
                self.push(self.ex(ExprKind::Function {
                    func: FunctionType::Neg,
                    operands: vec![a],
                }));
            }
            ISHL..=LUSHR => {
                let func = [FunctionType::Shl, FunctionType::Shr, FunctionType::Ushr][((op - ISHL) / 2) as usize];
                self.binary(func)?;
            }
            IAND..=LXOR => {
                let func = [FunctionType::And, FunctionType::Or, FunctionType::Xor][((op - IAND) / 2) as usize];
                self.binary(func)?;
            }
            IINC => {
                let index = instr.operand(0) as u32;
                let delta = instr.operand(1);
                let ty = self.locals.type_of(index, VarType::Int);
                let var = Exprent::var(index, ty).with_offsets(Some(&self.offsets));
                let func = if delta < 0 { FunctionType::Sub } else { FunctionType::Add };
                let sum = self.ex(ExprKind::Function {
                    func,
                    operands: vec![var.clone(), Exprent::int_const(delta.wrapping_abs())],
                });
                self.emit(Exprent::assign(var, sum));
            }
            I2L..=I2S => {
                let a = self.pop()?;
                let to = conversion_target(op);
                self.push(self.ex(ExprKind::Function {
                    func: FunctionType::Convert(to),
                    operands: vec![a],
                }));
            }
            LCMP..=DCMPG => {
                let func = [
                    FunctionType::Lcmp,
                    FunctionType::Fcmpl,
                    FunctionType::Fcmpg,
                    FunctionType::Dcmpl,
                    FunctionType::Dcmpg,
                ][(op - LCMP) as usize];
                self.binary(func)?;
            }
            IFEQ..=IFLE => {
                let a = self.pop()?;
                let cond = self.ex(ExprKind::Function {
                    func: fall_through_comparison(op - IFEQ),
                    operands: vec![a, Exprent::int_const(0)],
                });
                self.emit(Exprent::if_expr(cond));
            }
            IF_ICMPEQ..=IF_ACMPNE => {
                let b = self.pop()?;
                let a = self.pop()?;
                let func = if op >= IF_ACMPEQ {
                    fall_through_comparison(op - IF_ACMPEQ)
                } else {
                    fall_through_comparison(op - IF_ICMPEQ)
                };
                let cond = self.ex(ExprKind::Function { func, operands: vec![a, b] });
                self.emit(Exprent::if_expr(cond));
            }
            IFNULL | IFNONNULL => {
                let a = self.pop()?;
                let func = if op == IFNULL { FunctionType::Ne } else { FunctionType::Eq };
                let cond = self.ex(ExprKind::Function {
                    func,
                    operands: vec![a, Exprent::null_const()],
                });
                self.emit(Exprent::if_expr(cond));
            }
            JSR | JSR_W | RET => {
                return Err(DecompileError::UnsupportedBytecode(format!(
                    "subroutine instruction {}",
                    instr.mnemonic()
                )));
            }
            TABLESWITCH | LOOKUPSWITCH => {
                let value = self.pop()?;
                let switch = self.ex(ExprKind::Switch {
                    value: Box::new(value),
                    case_values: Vec::new(),
                });
                self.emit(switch);
            }
            IRETURN..=ARETURN => {
                let value = self.pop()?;
                let ret = self.ex(ExprKind::Exit {
                    kind: ExitKind::Return,
                    value: Some(Box::new(value)),
                    ret_type: self.ctx.descriptor.ret.clone(),
                });
                self.emit(ret);
            }
            RETURN => {
                let ret = self.ex(ExprKind::Exit {
                    kind: ExitKind::Return,
                    value: None,
                    ret_type: VarType::Void,
                });
                self.emit(ret);
            }
            ATHROW => {
                let value = self.pop()?;
                let ty = value.expr_type();
                let throw = self.ex(ExprKind::Exit {
                    kind: ExitKind::Throw,
                    value: Some(Box::new(value)),
                    ret_type: ty,
                });
                self.emit(throw);
            }
            GETSTATIC..=PUTFIELD => self.field_access(op, instr.operand(0))?,
            INVOKEVIRTUAL..=INVOKEINTERFACE => self.invoke(op, instr.operand(0))?,
            INVOKEDYNAMIC => self.invoke_dynamic(instr.operand(0))?,
            NEW => {
                let name = self.class_at(instr.operand(0))?;
                self.push(self.ex(ExprKind::New(Box::new(NewExpr {
                    new_type: VarType::Reference(name),
                    constructor: None,
                    dims: Vec::new(),
                    elements: Vec::new(),
                    direct_array_init: false,
                }))));
            }
            NEWARRAY | ANEWARRAY => {
                let count = self.pop()?;
                let element = if op == NEWARRAY {
                    newarray_type(instr.operand(0))
                } else {
                    VarType::from_class_name(&self.class_at(instr.operand(0))?)
                };
                self.push(self.new_array(VarType::Array(Box::new(element)), vec![count]));
            }
            MULTIANEWARRAY => {
                let ty = VarType::from_class_name(&self.class_at(instr.operand(0))?);
                let dims = self.pop_n(instr.operand(1).max(0) as usize)?;
                self.push(self.new_array(ty, dims));
            }
            ARRAYLENGTH => {
                let a = self.pop()?;
                self.push(self.ex(ExprKind::Function {
                    func: FunctionType::ArrayLength,
                    operands: vec![a],
                }));
            }
            CHECKCAST | INSTANCEOF => {
                let value = self.pop()?;
                let target = VarType::from_class_name(&self.class_at(instr.operand(0))?);
                let func = if op == CHECKCAST { FunctionType::Cast } else { FunctionType::Instanceof };
                let type_operand = self.constant(target.clone(), ConstValue::Class(target));
                self.push(self.ex(ExprKind::Function {
                    func,
                    operands: vec![value, type_operand],
                }));
            }
            MONITORENTER | MONITOREXIT => {
                let value = self.pop()?;
                let kind = if op == MONITORENTER { MonitorKind::Enter } else { MonitorKind::Exit };
                let monitor = self.ex(ExprKind::Monitor {
                    kind,
                    value: Box::new(value),
                });
                self.emit(monitor);
            }
            _ => {
                return Err(DecompileError::UnsupportedBytecode(format!(
                    "opcode {:#04x} at {:?}",
                    op, instr.offset
                )));
            }
        }
        Ok(())
    }

    fn constant(&self, ty: VarType, value: ConstValue) -> Exprent {
        self.ex(ExprKind::Const { ty, value })
    }

    fn binary(&mut self, func: FunctionType) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(self.ex(ExprKind::Function {
            func,
            operands: vec![a, b],
        }));
        Ok(())
    }

    fn new_array(&self, new_type: VarType, dims: Vec<Exprent>) -> Exprent {
        self.ex(ExprKind::New(Box::new(NewExpr {
            new_type,
            constructor: None,
            dims,
            elements: Vec::new(),
            direct_array_init: false,
        })))
    }

    fn class_at(&self, index: i32) -> Result<String> {
        self.ctx
            .pool()
            .class_name(index as u16)
            .map(str::to_string)
            .ok_or_else(|| bad_pool(index))
    }

    fn ldc(&self, index: i32) -> Result<Exprent> {
        let constant = self.ctx.pool().pooled(index as u16).ok_or_else(|| bad_pool(index))?;
        Ok(match constant {
            PooledConstant::Integer(v) => self.constant(VarType::Int, ConstValue::Int(v)),
            PooledConstant::Float(v) => self.constant(VarType::Float, ConstValue::Float(v)),
            PooledConstant::Long(v) => self.constant(VarType::Long, ConstValue::Long(v)),
            PooledConstant::Double(v) => self.constant(VarType::Double, ConstValue::Double(v)),
            PooledConstant::String(s) => self.constant(VarType::string(), ConstValue::String(s)),
            PooledConstant::Class(name) => self.constant(
                VarType::Reference("java/lang/Class".into()),
                ConstValue::Class(VarType::from_class_name(&name)),
            ),
            PooledConstant::MethodType(_) | PooledConstant::MethodHandle { .. } => {
                return Err(DecompileError::UnsupportedBytecode(
                    "ldc of a method type or handle".into(),
                ))
            }
        })
    }

    fn field_access(&mut self, op: u8, index: i32) -> Result<()> {
        let member = self.ctx.pool().member_ref(index as u16).ok_or_else(|| bad_pool(index))?;
        let ty = parse_type_descriptor(&member.descriptor)
            .ok_or_else(|| DecompileError::UnsupportedBytecode(format!("field descriptor {}", member.descriptor)))?;
        let is_static = op == GETSTATIC || op == PUTSTATIC;
        let value = if op == PUTSTATIC || op == PUTFIELD { Some(self.pop()?) } else { None };
        let instance = if is_static { None } else { Some(Box::new(self.pop()?)) };
        let field = self.ex(ExprKind::Field {
            name: member.name,
            class_name: member.class_name,
            is_static,
            instance,
            ty,
            stamp: FieldStamp::default(),
        });
        match value {
            Some(v) => self.emit(Exprent::assign(field, v)),
            None => self.push(field),
        }
        Ok(())
    }

    fn invoke(&mut self, op: u8, index: i32) -> Result<()> {
        let member = self.ctx.pool().member_ref(index as u16).ok_or_else(|| bad_pool(index))?;
        let descriptor = self
            .ctx
            .classpath()
            .find_method(&member)
            .map(|d| (*d).clone())
            .ok_or_else(|| DecompileError::UnsupportedBytecode(format!("method descriptor {}", member.descriptor)))?;
        let params = self.pop_n(descriptor.params.len())?;
        let kind = match op {
            INVOKEVIRTUAL => InvocationKind::Virtual,
            INVOKESPECIAL => InvocationKind::Special,
            INVOKESTATIC => InvocationKind::Static,
            _ => InvocationKind::Interface,
        };
        let instance = if kind == InvocationKind::Static { None } else { Some(self.pop()?) };
        let call = InvocationExpr {
            name: member.name,
            class_name: member.class_name,
            kind,
            instance,
            string_descriptor: member.descriptor,
            descriptor,
            params,
            bootstrap: None,
        };
        self.finish_call(ExprKind::Invocation(Box::new(call)));
        Ok(())
    }

    fn invoke_dynamic(&mut self, index: i32) -> Result<()> {
        let (bsm, name, desc) = self
            .ctx
            .pool()
            .invoke_dynamic(index as u16)
            .map(|(b, n, d)| (b, n.to_string(), d.to_string()))
            .ok_or_else(|| bad_pool(index))?;
        let descriptor = MethodDescriptor::parse(&desc)
            .ok_or_else(|| DecompileError::UnsupportedBytecode(format!("call site descriptor {}", desc)))?;
        let bootstrap = self
            .ctx
            .bootstrap_methods()
            .get(bsm as usize)
            .cloned()
            .ok_or_else(|| DecompileError::UnsupportedBytecode(format!("missing bootstrap method {}", bsm)))?;
        let params = self.pop_n(descriptor.params.len())?;

        if let PooledConstant::MethodHandle { member, .. } = &bootstrap.method_handle {
            if member.class_name == LAMBDA_METAFACTORY {
                if let Some(PooledConstant::MethodHandle { kind, member: target }) = bootstrap.arguments.get(1) {
                    let lambda = LambdaExpr {
                        interface: descriptor.ret.clone(),
                        impl_class: target.class_name.clone(),
                        impl_name: target.name.clone(),
                        captured: params,
                        is_static_impl: *kind == REF_INVOKE_STATIC || *kind == REF_NEW_INVOKE_SPECIAL,
                    };
                    self.push(self.ex(ExprKind::Lambda(Box::new(lambda))));
                    return Ok(());
                }
            }
        }

        let call = InvocationExpr {
            name,
            class_name: String::new(),
            kind: InvocationKind::Dynamic,
            instance: None,
            string_descriptor: desc,
            descriptor,
            params,
            bootstrap: Some(BootstrapCall {
                handle: bootstrap.method_handle,
                arguments: bootstrap.arguments,
            }),
        };
        self.finish_call(ExprKind::Invocation(Box::new(call)));
        Ok(())
    }

    fn finish_call(&mut self, kind: ExprKind) {
        let call = self.ex(kind);
        if call.expr_type() == VarType::Void {
            self.emit(call);
        } else {
            self.push(call);
        }
    }
}

fn bad_pool(index: i32) -> DecompileError {
    DecompileError::UnsupportedBytecode(format!("bad constant pool index {}", index))
}

fn load_type(op: u8) -> VarType {
    match op {
        ILOAD => VarType::Int,
        LLOAD => VarType::Long,
        FLOAD => VarType::Float,
        DLOAD => VarType::Double,
        _ => VarType::object(),
    }
}

fn array_element_type(load_op: u8, array: &VarType) -> VarType {
    match load_op {
        IALOAD => VarType::Int,
        LALOAD => VarType::Long,
        FALOAD => VarType::Float,
        DALOAD => VarType::Double,
        BALOAD if array.element_type() == VarType::Boolean => VarType::Boolean,
        BALOAD => VarType::Byte,
        CALOAD => VarType::Char,
        SALOAD => VarType::Short,
        _ => match array.element_type() {
            VarType::Unknown => VarType::object(),
            t => t,
        },
    }
}

fn conversion_target(op: u8) -> ConvertTo {
    match op {
        L2I | F2I | D2I => ConvertTo::Int,
        I2L | F2L | D2L => ConvertTo::Long,
        I2F | L2F | D2F => ConvertTo::Float,
        I2D | L2D | F2D => ConvertTo::Double,
        I2B => ConvertTo::Byte,
        I2C => ConvertTo::Char,
        _ => ConvertTo::Short,
    }
}

/// Condition under which control falls through the jump at position `n`
/// of the `eq ne lt ge gt le` opcode runs. An if head holds this, not the
/// jump condition.
fn fall_through_comparison(n: u8) -> FunctionType {
    match n {
        0 => FunctionType::Ne,
        1 => FunctionType::Eq,
        2 => FunctionType::Ge,
        3 => FunctionType::Lt,
        4 => FunctionType::Le,
        _ => FunctionType::Gt,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::attribute_info::CodeAttribute;
    use crate::code_attribute::InstructionSequence;
    use crate::constant_info::ConstantPool;
    use crate::decompile::context::DecompileContext;
    use crate::decompile::options::DecompilerOptions;
    use crate::method_info::{MethodAccessFlags, MethodInfo};

    fn method(descriptor: &str, pool: ConstantPool) -> MethodInfo {
        MethodInfo {
            class_name: "Sample".into(),
            name: "run".into(),
            descriptor: descriptor.into(),
            access_flags: MethodAccessFlags::STATIC,
            code: CodeAttribute {
                max_locals: 4,
                ..CodeAttribute::default()
            },
            constant_pool: Arc::new(pool),
            bootstrap_methods: Arc::new(Vec::new()),
        }
    }

    fn single_block_graph(instructions: Vec<Instruction>) -> (StatementGraph, StatId, StatId) {
        let mut g = StatementGraph::new(4);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let block = g.add_basic_block(Some(0), InstructionSequence::new(instructions));
        g[root].stats = vec![block];
        g[root].first = Some(block);
        g.set_all_parent(root);
        (g, root, block)
    }

    #[test]
    fn every_push_lands_in_a_stack_variable() {
        let job = DecompileContext::new(DecompilerOptions::default());
        let m = method("(II)I", ConstantPool::new(Vec::new()));
        let ctx = MethodContext::new(&job, &m).unwrap();
        let (mut g, root, block) = single_block_graph(vec![
            Instruction::new(ILOAD, vec![0]).at(0),
            Instruction::new(ILOAD, vec![1]).at(1),
            Instruction::new(IADD, vec![]).at(2),
            Instruction::new(IRETURN, vec![]).at(3),
        ]);

        process_statement(&ctx, &mut g, root).unwrap();
        let list = g[block].exprents.as_ref().unwrap();
        // s0 = a; s1 = b; s0 = s0 + s1; return s0
        assert_eq!(list.len(), 4);
        let (left, right) = list[2].assignment_parts().unwrap();
        assert_eq!(left.as_var().unwrap().index, STACK_BASE);
        assert_eq!(right.function_type(), Some(FunctionType::Add));
        assert!(matches!(list[3].kind, ExprKind::Exit { kind: ExitKind::Return, .. }));
        assert!(list[2].bytecode.contains(&2));
    }

    #[test]
    fn swap_reorders_through_stack_slots() {
        let job = DecompileContext::new(DecompilerOptions::default());
        let m = method("(II)I", ConstantPool::new(Vec::new()));
        let ctx = MethodContext::new(&job, &m).unwrap();
        let (mut g, root, block) = single_block_graph(vec![
            Instruction::new(ILOAD, vec![0]),
            Instruction::new(ILOAD, vec![1]),
            Instruction::new(SWAP, vec![]),
            Instruction::new(ISUB, vec![]),
            Instruction::new(IRETURN, vec![]),
        ]);
        process_statement(&ctx, &mut g, root).unwrap();
        let list = g[block].exprents.as_ref().unwrap();
        // after the swap s0 holds the old s1 and s1 the old s0
        let moves: Vec<(u32, u32)> = list
            .iter()
            .filter_map(|e| {
                let (l, r) = e.assignment_parts()?;
                Some((l.as_var()?.index - STACK_BASE, r.as_var()?.index.checked_sub(STACK_BASE)?))
            })
            .collect();
        assert_eq!(moves, vec![(2, 1), (1, 0), (0, 2)]);
    }

    #[test]
    fn subroutines_are_rejected() {
        let job = DecompileContext::new(DecompilerOptions::default());
        let m = method("()V", ConstantPool::new(Vec::new()));
        let ctx = MethodContext::new(&job, &m).unwrap();
        let (mut g, root, _) = single_block_graph(vec![Instruction::new(JSR, vec![5])]);
        assert!(matches!(
            process_statement(&ctx, &mut g, root),
            Err(DecompileError::UnsupportedBytecode(_))
        ));
    }
}
