//! Local rewrites of expression lists that the stack variable pass relies
//! on: constructor folding, array initializers, post increments, string
//! concatenation and ternaries over a stack variable.

use tracing::{debug, trace};

use super::concatenation::contract_string_concat;
use super::error::Result;
use super::exprs::{ConstValue, ExprKind, Exprent, FunctionType};
use super::sforms::SsaResult;
use super::stat_edge::{EdgeType, StatEdge};
use super::statement::{StatId, StatKind, StatType, StatementGraph};
use super::stats::IfType;

/// One round of every rewrite below `root`. Returns whether anything
/// changed.
pub fn simplify_statement(graph: &mut StatementGraph, root: StatId, ssa: &SsaResult) -> Result<bool> {
    let mut changed = false;

    let ifs: Vec<StatId> = graph
        .subtree(root)
        .into_iter()
        .filter(|&s| graph.stat_type(s) == StatType::If)
        .collect();
    for stat in ifs {
        // an earlier rewrite may have detached it
        if graph[stat].parent.is_some() && build_iff(graph, stat, ssa)? {
            changed = true;
        }
    }

    for stat in graph.subtree(root) {
        if let Some(list) = graph[stat].exprents.as_mut() {
            changed |= simplify_list(list);
        }
        for e in graph.own_exprents_mut(stat) {
            e.visit_mut_post(&mut |x| {
                if let Some(folded) = contract_string_concat(x) {
                    *x = folded;
                    changed = true;
                }
            });
        }
    }
    Ok(changed)
}

/// Applies the list rewrites until none fires.
pub fn simplify_list(list: &mut Vec<Exprent>) -> bool {
    let mut changed = false;
    loop {
        let fired = remove_trivial_assignments(list)
            || fold_constructor(list)
            || fold_array_initializer(list)
            || fold_post_increment(list);
        if !fired {
            return changed;
        }
        changed = true;
    }
}

/// `s = s` on the same variable.
fn remove_trivial_assignments(list: &mut Vec<Exprent>) -> bool {
    let before = list.len();
    list.retain(|e| match e.assignment_parts() {
        Some((left, right)) => match (left.as_var(), right.as_var()) {
            (Some(l), Some(r)) => !(l.index == r.index && l.stack == r.stack && is_plain(e)),
            _ => true,
        },
        _ => true,
    });
    list.len() != before
}

fn is_plain(e: &Exprent) -> bool {
    matches!(e.kind, ExprKind::Assignment { cond: None, .. })
}

/// `s = new T; ...; s.<init>(args)` becomes `s = new T(args)`.
fn fold_constructor(list: &mut Vec<Exprent>) -> bool {
    for i in 0..list.len() {
        let Some(index) = uninitialized_new(&list[i]) else {
            continue;
        };
        let Some(j) = (i + 1..list.len()).find(|&j| is_init_on(&list[j], index)) else {
            continue;
        };
        let init = list.remove(j);
        let offsets = init.bytecode.clone();
        let ExprKind::Invocation(mut call) = init.kind else {
            continue;
        };
        call.instance = None;
        if let ExprKind::Assignment { right, .. } = &mut list[i].kind {
            if let ExprKind::New(n) = &mut right.kind {
                n.constructor = Some(*call);
            }
            right.add_bytecode_offsets(&offsets);
        }
        trace!(index, "folded constructor call");
        return true;
    }
    false
}

/// Stack slot of `s = new T` without constructor arguments yet.
fn uninitialized_new(e: &Exprent) -> Option<u32> {
    let (left, right) = e.assignment_parts()?;
    let var = left.as_var()?;
    match &right.kind {
        ExprKind::New(n) if n.constructor.is_none() && n.new_type.array_dim() == 0 => Some(var.index),
        _ => None,
    }
}

fn is_init_on(e: &Exprent, index: u32) -> bool {
    match e.as_invocation() {
        Some(call) if call.is_constructor() => {
            matches!(call.instance.as_ref().and_then(Exprent::as_var), Some(v) if v.index == index)
        }
        _ => false,
    }
}

/// `s = new T[n]; s[0] = a; ...; s[n-1] = z` becomes `s = new T[]{a, .., z}`.
fn fold_array_initializer(list: &mut Vec<Exprent>) -> bool {
    for i in 0..list.len() {
        let Some((index, size)) = sized_array(&list[i]) else {
            continue;
        };
        if size == 0 {
            continue;
        }
        let mut elements = Vec::with_capacity(size);
        for j in i + 1..list.len() {
            if elements.len() == size {
                break;
            }
            match element_store(&list[j], index) {
                Some((slot, value)) if slot == elements.len() && !value.contains_var(index) => {
                    elements.push(value.clone())
                }
                _ => break,
            }
        }
        if elements.len() != size {
            continue;
        }
        let stores: Vec<Exprent> = list.drain(i + 1..i + 1 + size).collect();
        if let ExprKind::Assignment { right, .. } = &mut list[i].kind {
            for s in &stores {
                right.add_bytecode_offsets(&s.bytecode);
            }
            if let ExprKind::New(n) = &mut right.kind {
                n.dims.clear();
                n.elements = elements;
            }
        }
        trace!(index, size, "folded array initializer");
        return true;
    }
    false
}

/// Variable and constant length of `s = new T[n]`.
fn sized_array(e: &Exprent) -> Option<(u32, usize)> {
    let (left, right) = e.assignment_parts()?;
    let var = left.as_var()?;
    let ExprKind::New(n) = &right.kind else {
        return None;
    };
    if n.new_type.array_dim() == 0 || n.dims.len() != 1 || !n.elements.is_empty() {
        return None;
    }
    match &n.dims[0].kind {
        ExprKind::Const {
            value: ConstValue::Int(len),
            ..
        } if *len >= 0 => Some((var.index, *len as usize)),
        _ => None,
    }
}

/// Index and value of `s[k] = value` for constant `k`.
fn element_store(e: &Exprent, index: u32) -> Option<(usize, &Exprent)> {
    if !is_plain(e) {
        return None;
    }
    let (left, right) = e.assignment_parts()?;
    let ExprKind::Array { array, index: slot, .. } = &left.kind else {
        return None;
    };
    if array.as_var()?.index != index {
        return None;
    }
    match &slot.kind {
        ExprKind::Const {
            value: ConstValue::Int(k),
            ..
        } if *k >= 0 => Some((*k as usize, right)),
        _ => None,
    }
}

/// `s = x; ++x` becomes `s = x++`.
fn fold_post_increment(list: &mut Vec<Exprent>) -> bool {
    for i in 0..list.len().saturating_sub(1) {
        let Some((left, right)) = list[i].assignment_parts() else {
            continue;
        };
        if !left.is_stack_var() || !is_plain(&list[i]) {
            continue;
        }
        let Some(source) = right.as_var().filter(|v| !v.stack) else {
            continue;
        };
        let post = match &list[i + 1].kind {
            ExprKind::Function { func, operands } if operands.len() == 1 => match (func, operands[0].as_var()) {
                (FunctionType::Ipp, Some(v)) if v.index == source.index && !v.stack => FunctionType::Ppi,
                (FunctionType::Imm, Some(v)) if v.index == source.index && !v.stack => FunctionType::Mmi,
                _ => continue,
            },
            _ => continue,
        };
        let inc = list.remove(i + 1);
        if let ExprKind::Assignment { right, .. } = &mut list[i].kind {
            let target = std::mem::replace(right.as_mut(), Exprent::null_const());
            **right = Exprent::func(post, vec![target]).with_offsets(Some(&inc.bytecode));
        }
        return true;
    }
    false
}

/// `if (c) { s = a; } else { s = b; }` over one stack variable becomes
/// `s = c ? a : b` appended to the head block.
fn build_iff(graph: &mut StatementGraph, stat: StatId, ssa: &SsaResult) -> Result<bool> {
    let Some(data) = graph.if_data(stat) else {
        return Ok(false);
    };
    if data.if_type != IfType::IfElse {
        return Ok(false);
    }
    let (Some(a), Some(b), Some(head)) = (data.if_stat, data.else_stat, data.head_exprent.as_ref()) else {
        return Ok(false);
    };
    let Some(condition) = head.if_condition().cloned() else {
        return Ok(false);
    };
    let head_offsets = head.bytecode.clone();
    let Some(first) = graph[stat].first else {
        return Ok(false);
    };
    if graph.stat_type(first) != StatType::BasicBlock || graph[first].exprents.is_none() {
        return Ok(false);
    }

    let (Some(left_a), Some(left_b)) = (single_assignment(graph, a), single_assignment(graph, b)) else {
        return Ok(false);
    };
    let (Some(va), Some(vb)) = (left_a.as_var(), left_b.as_var()) else {
        return Ok(false);
    };
    if !va.stack || !vb.stack || va.index != vb.index {
        return Ok(false);
    }
    let merged = ssa
        .phi
        .iter()
        .any(|(p, sources)| p.var == va.index as i32 && sources.contains(&va.version) && sources.contains(&vb.version));
    if !merged {
        return Ok(false);
    }

    let (ea, eb) = match (graph.all_successor_edges(a).as_slice(), graph.all_successor_edges(b).as_slice()) {
        (&[ea], &[eb]) => (ea, eb),
        _ => return Ok(false),
    };
    if graph.edge(ea).destination != graph.edge(eb).destination || graph.edge(ea).edge_type == EdgeType::EXCEPTION {
        return Ok(false);
    }
    let Some(parent) = graph[stat].parent else {
        return Ok(false);
    };

    let (dest, edge_type, closure) = {
        let e = graph.edge(ea);
        (e.destination, e.edge_type, e.closure)
    };
    let take_single = |graph: &mut StatementGraph, s: StatId| -> Option<Exprent> {
        graph[s].exprents.as_mut().and_then(|l| l.pop())
    };
    let (Some(assign_a), Some(assign_b)) = (take_single(graph, a), take_single(graph, b)) else {
        return Ok(false);
    };
    let (Some((target, value_a)), Some((_, value_b))) = (split_assignment(assign_a), split_assignment(assign_b))
    else {
        return Ok(false);
    };

    for e in graph.successor_edges(first, EdgeType::DIRECT_ALL) {
        graph.remove_successor(e);
    }
    for s in [a, b] {
        for e in graph.all_successor_edges(s) {
            graph.remove_successor(e);
        }
    }
    let ternary = Exprent::func(FunctionType::Iif, vec![condition, value_a, value_b]).with_offsets(Some(&head_offsets));
    if let Some(list) = graph[first].exprents.as_mut() {
        list.push(Exprent::assign(target, ternary));
    }
    graph.replace_statement(parent, stat, first);
    if graph.successor_edges(first, EdgeType::DIRECT_ALL).is_empty() {
        let closure = if closure == Some(stat) { Some(parent) } else { closure };
        graph.add_successor(StatEdge::new(edge_type, first, dest, closure));
    }
    debug!(stat, "if statement folded into a ternary");
    Ok(true)
}

fn single_assignment(graph: &StatementGraph, stat: StatId) -> Option<&Exprent> {
    if !matches!(graph[stat].kind, StatKind::BasicBlock(_)) {
        return None;
    }
    match graph[stat].exprents.as_deref() {
        Some([e]) if is_plain(e) => e.assignment_parts().map(|(l, _)| l),
        _ => None,
    }
}

fn split_assignment(e: Exprent) -> Option<(Exprent, Exprent)> {
    match e.kind {
        ExprKind::Assignment { left, right, cond: None } => Some((*left, *right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::{MethodDescriptor, VarType};
    use crate::decompile::exprs::{InvocationExpr, InvocationKind, NewExpr, STACK_BASE};

    fn stack(depth: u32) -> Exprent {
        Exprent::stack_var(STACK_BASE + depth, VarType::Reference("T".into()))
    }

    fn new_object() -> Exprent {
        Exprent::new(ExprKind::New(Box::new(NewExpr {
            new_type: VarType::Reference("T".into()),
            constructor: None,
            dims: vec![],
            elements: vec![],
            direct_array_init: false,
        })))
    }

    fn init_call(instance: Exprent, params: Vec<Exprent>) -> Exprent {
        Exprent::new(ExprKind::Invocation(Box::new(InvocationExpr {
            name: "<init>".into(),
            class_name: "T".into(),
            kind: InvocationKind::Special,
            instance: Some(instance),
            descriptor: MethodDescriptor::parse("(I)V").unwrap(),
            string_descriptor: "(I)V".into(),
            params,
            bootstrap: None,
        })))
    }

    #[test]
    fn constructor_call_folds_into_new() {
        let mut list = vec![
            Exprent::assign(stack(0), new_object()),
            init_call(stack(0), vec![Exprent::int_const(7)]),
            Exprent::assign(Exprent::var(1, VarType::Reference("T".into())), stack(0)),
        ];
        assert!(simplify_list(&mut list));
        assert_eq!(list.len(), 2);
        let (_, right) = list[0].assignment_parts().unwrap();
        let ExprKind::New(n) = &right.kind else { panic!() };
        let ctor = n.constructor.as_ref().unwrap();
        assert!(ctor.instance.is_none());
        assert_eq!(ctor.params, vec![Exprent::int_const(7)]);
    }

    #[test]
    fn array_stores_become_initializer() {
        let arr_type = VarType::Array(Box::new(VarType::Int));
        let s = Exprent::stack_var(STACK_BASE, arr_type.clone());
        let store = |k: i32, v: i32| {
            Exprent::assign(
                Exprent::new(ExprKind::Array {
                    array: Box::new(s.clone()),
                    index: Box::new(Exprent::int_const(k)),
                    ty: VarType::Int,
                }),
                Exprent::int_const(v),
            )
        };
        let new_array = Exprent::new(ExprKind::New(Box::new(NewExpr {
            new_type: arr_type,
            constructor: None,
            dims: vec![Exprent::int_const(2)],
            elements: vec![],
            direct_array_init: false,
        })));
        let mut list = vec![Exprent::assign(s.clone(), new_array), store(0, 4), store(1, 5)];
        assert!(simplify_list(&mut list));
        assert_eq!(list.len(), 1);
        let ExprKind::New(n) = &list[0].assignment_parts().unwrap().1.kind else { panic!() };
        assert!(n.dims.is_empty());
        assert_eq!(n.elements, vec![Exprent::int_const(4), Exprent::int_const(5)]);
    }

    #[test]
    fn partial_array_stores_are_kept() {
        let arr_type = VarType::Array(Box::new(VarType::Int));
        let s = Exprent::stack_var(STACK_BASE, arr_type.clone());
        let new_array = Exprent::new(ExprKind::New(Box::new(NewExpr {
            new_type: arr_type,
            constructor: None,
            dims: vec![Exprent::int_const(3)],
            elements: vec![],
            direct_array_init: false,
        })));
        let store = Exprent::assign(
            Exprent::new(ExprKind::Array {
                array: Box::new(s.clone()),
                index: Box::new(Exprent::int_const(0)),
                ty: VarType::Int,
            }),
            Exprent::int_const(1),
        );
        let mut list = vec![Exprent::assign(s, new_array), store];
        assert!(!simplify_list(&mut list));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn load_then_increment_is_post_increment() {
        let x = Exprent::var(1, VarType::Int);
        let s = Exprent::stack_var(STACK_BASE, VarType::Int);
        let mut list = vec![
            Exprent::assign(s.clone(), x.clone()),
            Exprent::func(FunctionType::Ipp, vec![x.clone()]),
        ];
        assert!(simplify_list(&mut list));
        assert_eq!(list, vec![Exprent::assign(s, Exprent::func(FunctionType::Ppi, vec![x]))]);
    }

    #[test]
    fn self_assignment_is_dropped() {
        let x = Exprent::var(1, VarType::Int);
        let mut list = vec![Exprent::assign(x.clone(), x.clone()), Exprent::func(FunctionType::Ipp, vec![x])];
        assert!(simplify_list(&mut list));
        assert_eq!(list.len(), 1);
    }
}
