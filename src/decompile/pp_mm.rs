//! Increment, decrement and compound assignment recovery.

use tracing::trace;

use super::descriptor::VarType;
use super::exprs::{ConstValue, ExprKind, Exprent, FunctionType, MULTIPLE_USES};
use super::statement::{StatId, StatementGraph};

/// Rewrites `x = x + 1` as `++x` and `x = x op y` as `x op= y` everywhere
/// below `root`.
pub fn find_pp_and_mm(graph: &mut StatementGraph, root: StatId) -> bool {
    let mut changed = false;
    for stat in graph.subtree(root) {
        for e in graph.own_exprents_mut(stat) {
            e.visit_mut_post(&mut |x| changed |= rewrite(x));
        }
    }
    if changed {
        trace!(root, "recovered increments and compound assignments");
    }
    changed
}

const COMPOUND: [FunctionType; 11] = [
    FunctionType::Add,
    FunctionType::Sub,
    FunctionType::Mul,
    FunctionType::Div,
    FunctionType::And,
    FunctionType::Or,
    FunctionType::Xor,
    FunctionType::Rem,
    FunctionType::Shl,
    FunctionType::Shr,
    FunctionType::Ushr,
];

fn rewrite(e: &mut Exprent) -> bool {
    let ExprKind::Assignment { left, right, cond: None } = &mut e.kind else {
        return false;
    };
    if left.exprent_use() & MULTIPLE_USES == 0 || left.is_stack_var() {
        return false;
    }
    let target_type = left.expr_type();
    let value = strip_narrowing(right, &target_type);
    let ExprKind::Function { func, operands } = &value.kind else {
        return false;
    };
    let func = *func;
    if !COMPOUND.contains(&func) {
        return false;
    }
    let [first, second] = operands.as_slice() else {
        return false;
    };
    if !same_location(left, first) {
        return false;
    }

    if matches!(func, FunctionType::Add | FunctionType::Sub) && is_one(second) {
        let op = if func == FunctionType::Add { FunctionType::Ipp } else { FunctionType::Imm };
        let target = (**left).clone();
        let bytecode = std::mem::take(&mut e.bytecode);
        *e = Exprent::func(op, vec![target]);
        e.bytecode = bytecode;
        return true;
    }

    let operand = second.clone();
    *right = Box::new(operand);
    if let ExprKind::Assignment { cond, .. } = &mut e.kind {
        *cond = Some(func);
    }
    true
}

/// `(byte)(x + 1)` assigned back to a byte is still `x + 1`.
fn strip_narrowing<'e>(e: &'e Exprent, target: &VarType) -> &'e Exprent {
    match &e.kind {
        ExprKind::Function {
            func: FunctionType::Convert(to),
            operands,
        } if to.var_type() == *target && operands.len() == 1 => &operands[0],
        _ => e,
    }
}

fn same_location(a: &Exprent, b: &Exprent) -> bool {
    match (a.as_var(), b.as_var()) {
        (Some(x), Some(y)) => x.index == y.index && x.stack == y.stack && x.version == y.version,
        (None, None) => a == b,
        _ => false,
    }
}

fn is_one(e: &Exprent) -> bool {
    match &e.kind {
        ExprKind::Const { value, .. } => match value {
            ConstValue::Int(v) => *v == 1,
            ConstValue::Long(v) => *v == 1,
            ConstValue::Float(v) => *v == 1.0,
            ConstValue::Double(v) => *v == 1.0,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::statement::StatKind;

    fn run_on(list: Vec<Exprent>) -> Vec<Exprent> {
        let mut g = StatementGraph::new(3);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        let b = g.add_empty_block();
        g[b].exprents = Some(list);
        g[root].stats = vec![b];
        g[root].first = Some(b);
        g.set_all_parent(root);
        find_pp_and_mm(&mut g, root);
        g[b].exprents.clone().unwrap()
    }

    #[test]
    fn add_one_becomes_increment() {
        let x = Exprent::var(1, VarType::Int);
        let out = run_on(vec![Exprent::assign(
            x.clone(),
            Exprent::func(FunctionType::Add, vec![x.clone(), Exprent::int_const(1)]),
        )]);
        assert_eq!(out[0], Exprent::func(FunctionType::Ipp, vec![x]));
    }

    #[test]
    fn other_operands_become_compound_assignment() {
        let x = Exprent::var(1, VarType::Int);
        let y = Exprent::var(2, VarType::Int);
        let out = run_on(vec![Exprent::assign(
            x.clone(),
            Exprent::func(FunctionType::Mul, vec![x.clone(), y.clone()]),
        )]);
        let ExprKind::Assignment { left, right, cond } = &out[0].kind else { panic!() };
        assert_eq!(**left, x);
        assert_eq!(**right, y);
        assert_eq!(*cond, Some(FunctionType::Mul));
    }

    #[test]
    fn different_target_is_untouched() {
        let x = Exprent::var(1, VarType::Int);
        let y = Exprent::var(2, VarType::Int);
        let original = Exprent::assign(x, Exprent::func(FunctionType::Add, vec![y, Exprent::int_const(1)]));
        assert_eq!(run_on(vec![original.clone()]), vec![original]);
    }
}
