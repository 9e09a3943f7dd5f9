//! Condition cleanup: pushes negations into comparisons, drops comparisons
//! of booleans against constants and folds the `xcmp` idiom.

use super::descriptor::{TypeFamily, VarType};
use super::error::Result;
use super::exprs::{ConstValue, ExprKind, Exprent, FunctionType};
use super::statement::{StatId, StatementGraph};

pub fn identify_secondary_functions(graph: &mut StatementGraph, root: StatId) -> Result<bool> {
    let mut changed = false;
    for stat in graph.subtree(root) {
        for e in graph.own_exprents_mut(stat) {
            loop {
                let mut round = false;
                e.visit_mut_post(&mut |x| round |= simplify(x));
                if !round {
                    break;
                }
                changed = true;
            }
        }
    }
    Ok(changed)
}

fn simplify(e: &mut Exprent) -> bool {
    let ExprKind::Function { func, operands } = &e.kind else {
        return false;
    };
    let replacement = match (*func, operands.as_slice()) {
        (FunctionType::BoolNot, [inner]) => negate(inner),
        (f, [a, b]) if f == FunctionType::Eq || f == FunctionType::Ne => {
            bool_compare(f, a, b).or_else(|| cmp_against_zero(f, a, b))
        }
        (f, [a, b]) if f.is_comparison() => cmp_against_zero(f, a, b),
        _ => None,
    };
    match replacement {
        Some(r) => {
            let bytecode = std::mem::take(&mut e.bytecode);
            *e = r;
            e.bytecode.extend(bytecode);
            true
        }
        None => false,
    }
}

/// `!inner` without the outer negation, when one can be pushed inwards.
fn negate(inner: &Exprent) -> Option<Exprent> {
    let ExprKind::Function { func, operands } = &inner.kind else {
        return None;
    };
    match (*func, operands.as_slice()) {
        (FunctionType::BoolNot, [x]) => Some(x.clone()),
        (f, [a, b]) if f.is_comparison() => {
            // !(a < b) and a >= b differ when either side is NaN
            if is_floating(a) || is_floating(b) {
                return None;
            }
            let negated = f.negated_comparison()?;
            Some(Exprent::func(negated, vec![a.clone(), b.clone()]))
        }
        (FunctionType::Cadd | FunctionType::Cor, [a, b]) => {
            let flipped = if *func == FunctionType::Cadd { FunctionType::Cor } else { FunctionType::Cadd };
            Some(Exprent::func(flipped, vec![not(a.clone()), not(b.clone())]))
        }
        _ => None,
    }
}

fn not(e: Exprent) -> Exprent {
    Exprent::func(FunctionType::BoolNot, vec![e])
}

fn is_floating(e: &Exprent) -> bool {
    matches!(e.expr_type().family(), TypeFamily::Float | TypeFamily::Double)
}

/// `b == true`, `b != 0` and friends on booleans.
fn bool_compare(func: FunctionType, a: &Exprent, b: &Exprent) -> Option<Exprent> {
    let (value, constant) = if b.is_const() { (a, b) } else { (b, a) };
    if value.expr_type() != VarType::Boolean {
        return None;
    }
    let truth = match &constant.kind {
        ExprKind::Const {
            value: ConstValue::Int(v @ (0 | 1)),
            ..
        } => *v == 1,
        _ => return None,
    };
    let keep = (func == FunctionType::Eq) == truth;
    Some(if keep { value.clone() } else { not(value.clone()) })
}

/// `lcmp(a, b) < 0` is `a < b`. The float compares put NaN on one side,
/// so a comparison that NaN satisfies keeps its negation:
/// `fcmpl(a, b) < 0` is `!(a >= b)`.
fn cmp_against_zero(func: FunctionType, a: &Exprent, b: &Exprent) -> Option<Exprent> {
    let ExprKind::Function { func: cmp, operands } = &a.kind else {
        return None;
    };
    if !cmp.is_cmp() || operands.len() != 2 {
        return None;
    }
    if !matches!(
        b.kind,
        ExprKind::Const {
            value: ConstValue::Int(0),
            ..
        }
    ) {
        return None;
    }
    let nan = match cmp {
        FunctionType::Fcmpl | FunctionType::Dcmpl => -1,
        FunctionType::Fcmpg | FunctionType::Dcmpg => 1,
        _ => return Some(Exprent::func(func, operands.clone())),
    };
    let nan_holds = match func {
        FunctionType::Eq => nan == 0,
        FunctionType::Ne => nan != 0,
        FunctionType::Lt => nan < 0,
        FunctionType::Ge => nan >= 0,
        FunctionType::Gt => nan > 0,
        _ => nan <= 0,
    };
    // a direct float comparison holds on NaN only for `!=`
    if nan_holds == (func == FunctionType::Ne) {
        Some(Exprent::func(func, operands.clone()))
    } else {
        let flipped = func.negated_comparison()?;
        Some(not(Exprent::func(flipped, operands.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simplified(e: Exprent) -> Exprent {
        let mut g = StatementGraph::new(4);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![e]);
        identify_secondary_functions(&mut g, b).unwrap();
        g[b].exprents.take().unwrap().remove(0)
    }

    #[test]
    fn negated_int_comparison_flips() {
        let a = Exprent::var(1, VarType::Int);
        let e = not(Exprent::func(FunctionType::Lt, vec![a.clone(), Exprent::int_const(3)]));
        assert_eq!(simplified(e), Exprent::func(FunctionType::Ge, vec![a, Exprent::int_const(3)]));
    }

    #[test]
    fn negated_float_comparison_is_kept() {
        let a = Exprent::var(1, VarType::Float);
        let e = not(Exprent::func(FunctionType::Lt, vec![a.clone(), a.clone()]));
        assert_eq!(simplified(e.clone()), e);
    }

    #[test]
    fn boolean_against_zero() {
        let flag = Exprent::var(1, VarType::Boolean);
        let e = Exprent::func(FunctionType::Eq, vec![flag.clone(), Exprent::int_const(0)]);
        assert_eq!(simplified(e), not(flag.clone()));
        let e = Exprent::func(FunctionType::Ne, vec![flag.clone(), Exprent::int_const(0)]);
        assert_eq!(simplified(e), flag);
    }

    #[test]
    fn long_compare_folds() {
        let a = Exprent::var(1, VarType::Long);
        let b = Exprent::var(3, VarType::Long);
        let cmp = Exprent::func(FunctionType::Lcmp, vec![a.clone(), b.clone()]);
        let e = Exprent::func(FunctionType::Gt, vec![cmp, Exprent::int_const(0)]);
        assert_eq!(simplified(e), Exprent::func(FunctionType::Gt, vec![a, b]));
    }

    #[test]
    fn float_compare_folds_keep_nan_outcome() {
        let a = Exprent::var(1, VarType::Float);
        let b = Exprent::var(2, VarType::Float);
        let zero = Exprent::int_const(0);

        // fcmpg yields 1 on NaN, so `< 0` is false on NaN like `a < b`
        let cmpg = Exprent::func(FunctionType::Fcmpg, vec![a.clone(), b.clone()]);
        let e = Exprent::func(FunctionType::Lt, vec![cmpg, zero.clone()]);
        assert_eq!(simplified(e), Exprent::func(FunctionType::Lt, vec![a.clone(), b.clone()]));

        // fcmpl yields -1 on NaN, so `< 0` holds on NaN
        let cmpl = Exprent::func(FunctionType::Fcmpl, vec![a.clone(), b.clone()]);
        let e = Exprent::func(FunctionType::Lt, vec![cmpl.clone(), zero.clone()]);
        assert_eq!(
            simplified(e),
            not(Exprent::func(FunctionType::Ge, vec![a.clone(), b.clone()]))
        );

        let e = Exprent::func(FunctionType::Ne, vec![cmpl, zero]);
        assert_eq!(simplified(e), Exprent::func(FunctionType::Ne, vec![a, b]));
    }

    #[test]
    fn de_morgan() {
        let a = Exprent::var(1, VarType::Boolean);
        let b = Exprent::var(2, VarType::Boolean);
        let e = not(Exprent::func(FunctionType::Cadd, vec![a.clone(), b.clone()]));
        assert_eq!(simplified(e), Exprent::func(FunctionType::Cor, vec![not(a), not(b)]));
    }
}
