//! Stack variable elimination.
//!
//! Every value the interpreter pushed lives in a stack variable. A
//! definition nobody reads is dropped or kept as a bare statement, a
//! definition read once is moved into its reader when SSAU says the reader
//! sees the same state, and pure values are copied into every reader.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::error::Result;
use super::exprs::{ExprKind, Exprent, VarVersionPair, BOTH_FLAGS};
use super::options::DecompilerOptions;
use super::sequence_helper;
use super::sforms::direct_graph::{put_slot, take_slot};
use super::sforms::{build_ssa, build_ssau, flatten, reset_versions, DirectGraph, ExprSlot, NodeId, SsaResult};
use super::simplify_exprents::simplify_statement;
use super::statement::{StatId, StatementGraph};

/// Runs SSA, the list simplifications and SSAU-driven inlining until the
/// tree stops changing.
pub fn simplify_stack_vars(graph: &mut StatementGraph, root: StatId, options: &DecompilerOptions) -> Result<()> {
    for round in 0..options.max_fixed_point_iterations {
        let ssa = build_ssa(graph, root)?;
        let mut changed = false;
        let mut passes = 0;
        while passes < options.max_fixed_point_iterations && simplify_statement(graph, root, &ssa)? {
            changed = true;
            passes += 1;
        }
        reset_versions(graph, root);
        sequence_helper::condense_sequences(graph, root)?;

        let ssau = build_ssau(graph, root)?;
        changed |= inline_stack_vars(graph, root, &ssau)?;
        reset_versions(graph, root);

        if !changed {
            debug!(rounds = round + 1, "stack variables simplified");
            return Ok(());
        }
    }
    warn!(root, "stack variable simplification did not converge");
    Ok(())
}

/// One sweep over every expression list. Versions must be those of the
/// SSAU run that produced `ssau`.
pub fn inline_stack_vars(graph: &mut StatementGraph, root: StatId, ssau: &SsaResult) -> Result<bool> {
    let dg = flatten(graph, root)?;
    let mut uses = count_uses(graph, root);
    let mut substitutions: HashMap<VarVersionPair, Exprent> = HashMap::new();
    let mut changed = false;

    for n in dg.reverse_postorder() {
        let Some(slot) = dg.nodes[n].slot else {
            continue;
        };
        let follower = unique_follower(&dg, n);
        let mut list = take_slot(graph, slot);
        let mut next = follower.map(|s| take_slot(graph, s)).unwrap_or_default();

        let mut pass = ListPass {
            uses: &mut uses,
            ssau,
            substitutions: &mut substitutions,
        };
        changed |= pass.run(&mut list, &mut next);

        put_slot(graph, slot, list)?;
        if let Some(s) = follower {
            put_slot(graph, s, next)?;
        }
    }

    if !substitutions.is_empty() {
        resolve_chains(&mut substitutions);
        for stat in graph.subtree(root) {
            for e in graph.own_exprents_mut(stat) {
                for (pair, value) in &substitutions {
                    substitute(e, *pair, value);
                }
            }
        }
        changed = true;
    }
    Ok(changed)
}

/// The expression list control falls into from `n` and from nowhere else.
fn unique_follower(dg: &DirectGraph, n: NodeId) -> Option<ExprSlot> {
    let node = &dg.nodes[n];
    let [succ] = node.succs.as_slice() else {
        return None;
    };
    let next = &dg.nodes[*succ];
    if *succ == n || next.preds.len() != 1 || next.slot == node.slot || next.handlers != node.handlers {
        return None;
    }
    next.slot
}

struct ListPass<'a> {
    uses: &'a mut HashMap<VarVersionPair, usize>,
    ssau: &'a SsaResult,
    substitutions: &'a mut HashMap<VarVersionPair, Exprent>,
}

impl ListPass<'_> {
    fn run(&mut self, list: &mut Vec<Exprent>, next: &mut [Exprent]) -> bool {
        let mut changed = false;
        let mut i = 0;
        while i < list.len() {
            match self.visit(list, i, next) {
                Action::Keep => i += 1,
                Action::Changed => changed = true,
            }
        }
        changed
    }

    fn visit(&mut self, list: &mut Vec<Exprent>, i: usize, next: &mut [Exprent]) -> Action {
        let Some(pair) = stack_definition(&list[i]) else {
            return Action::Keep;
        };
        if self.ssau.is_phi_source(pair) {
            return Action::Keep;
        }
        let count = self.uses.get(&pair).copied().unwrap_or(0);
        let value = match list[i].assignment_parts() {
            Some((_, right)) => right,
            None => return Action::Keep,
        };

        if count == 0 {
            return match unused_definition(value) {
                Unused::Unwrap => self.unwrap_definition(list, i),
                Unused::Drop => {
                    let removed = list.remove(i);
                    self.forget(&removed);
                    trace!(var = pair.var, "dropped unused stack value");
                    Action::Changed
                }
                Unused::Keep => Action::Keep,
            };
        }

        if !self.ssau.is_replaceable(pair) || is_uninitialized_new(value) {
            return Action::Keep;
        }

        if count == 1 {
            let target = (i + 1..list.len()).find(|&j| uses_pair(&list[j], pair));
            let moved = match target {
                Some(j) => {
                    let def = list.remove(i);
                    let value = definition_value(def);
                    substitute(&mut list[j - 1], pair, &value)
                }
                None => match next.first_mut() {
                    Some(first) if uses_pair(first, pair) => {
                        let def = list.remove(i);
                        let value = definition_value(def);
                        substitute(first, pair, &value)
                    }
                    _ => return Action::Keep,
                },
            };
            trace!(var = pair.var, version = pair.version, moved, "inlined stack variable");
            return Action::Changed;
        }

        if value.exprent_use() & BOTH_FLAGS == BOTH_FLAGS {
            let def = list.remove(i);
            self.substitutions.insert(pair, definition_value(def));
            return Action::Changed;
        }
        Action::Keep
    }

    /// Replaces `s = value` by `value` alone.
    fn unwrap_definition(&mut self, list: &mut [Exprent], i: usize) -> Action {
        let placeholder = Exprent::null_const();
        let def = std::mem::replace(&mut list[i], placeholder);
        list[i] = definition_value(def);
        Action::Changed
    }

    fn forget(&mut self, removed: &Exprent) {
        let mut counts = HashMap::new();
        collect_uses(removed, &mut counts);
        for (pair, n) in counts {
            if let Some(c) = self.uses.get_mut(&pair) {
                *c = c.saturating_sub(n);
            }
        }
    }
}

enum Action {
    Keep,
    Changed,
}

enum Unused {
    /// Keep the value as a statement of its own.
    Unwrap,
    Drop,
    Keep,
}

fn unused_definition(value: &Exprent) -> Unused {
    match &value.kind {
        ExprKind::Invocation(_) | ExprKind::Assignment { .. } => Unused::Unwrap,
        ExprKind::New(n) if n.constructor.is_some() || n.new_type.array_dim() > 0 => Unused::Unwrap,
        ExprKind::Function { func, .. } if func.is_inc_dec() => Unused::Unwrap,
        ExprKind::Var(_) | ExprKind::Const { .. } | ExprKind::Lambda(_) => Unused::Drop,
        _ => Unused::Keep,
    }
}

/// The version pair defined by a plain assignment to a stack variable.
fn stack_definition(e: &Exprent) -> Option<VarVersionPair> {
    match &e.kind {
        ExprKind::Assignment { left, cond: None, .. } => match left.as_var() {
            Some(v) if v.stack => Some(v.pair()),
            _ => None,
        },
        _ => None,
    }
}

fn is_uninitialized_new(e: &Exprent) -> bool {
    matches!(&e.kind, ExprKind::New(n) if n.constructor.is_none() && n.new_type.array_dim() == 0)
}

/// Right side of a definition, carrying the definition's offsets.
fn definition_value(def: Exprent) -> Exprent {
    let offsets = def.bytecode;
    match def.kind {
        ExprKind::Assignment { right, .. } => right.with_offsets(Some(&offsets)),
        other => Exprent { kind: other, bytecode: offsets },
    }
}

/// Reads of every stack variable version below `root`.
fn count_uses(graph: &StatementGraph, root: StatId) -> HashMap<VarVersionPair, usize> {
    let mut out = HashMap::new();
    for stat in graph.subtree(root) {
        for e in graph.own_exprents(stat) {
            collect_uses(e, &mut out);
        }
    }
    out
}

fn collect_uses(e: &Exprent, out: &mut HashMap<VarVersionPair, usize>) {
    match &e.kind {
        ExprKind::Var(v) if v.stack => *out.entry(v.pair()).or_default() += 1,
        ExprKind::Assignment { left, right, cond: None } if left.is_var() => collect_uses(right, out),
        _ => {
            for c in e.children() {
                collect_uses(c, out);
            }
        }
    }
}

fn uses_pair(e: &Exprent, pair: VarVersionPair) -> bool {
    let mut counts = HashMap::new();
    collect_uses(e, &mut counts);
    counts.contains_key(&pair)
}

/// Replaces the reads of `pair` below `e` with `value`.
fn substitute(e: &mut Exprent, pair: VarVersionPair, value: &Exprent) -> usize {
    match &mut e.kind {
        ExprKind::Var(v) if v.stack && v.pair() == pair => {
            *e = value.clone();
            1
        }
        ExprKind::Assignment { left, right, cond: None } if left.is_var() => substitute(right, pair, value),
        _ => e.children_mut().into_iter().map(|c| substitute(c, pair, value)).sum(),
    }
}

/// Substituted values may themselves read substituted variables.
fn resolve_chains(subs: &mut HashMap<VarVersionPair, Exprent>) {
    let keys: Vec<VarVersionPair> = subs.keys().copied().collect();
    for _ in 0..keys.len() {
        let mut changed = false;
        for k in &keys {
            let Some(mut value) = subs.get(k).cloned() else {
                continue;
            };
            let mut n = 0;
            for (pair, other) in subs.iter() {
                if pair != k {
                    n += substitute(&mut value, *pair, other);
                }
            }
            if n > 0 {
                subs.insert(*k, value);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::{MethodDescriptor, VarType};
    use crate::decompile::exprs::{FieldStamp, InvocationExpr, InvocationKind, STACK_BASE};
    use crate::decompile::statement::StatKind;

    fn single_block(list: Vec<Exprent>) -> (StatementGraph, StatId, StatId) {
        let mut g = StatementGraph::new(4);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let b = g.add_empty_block();
        g[b].exprents = Some(list);
        g[root].stats = vec![b];
        g[root].first = Some(b);
        g.set_all_parent(root);
        (g, root, b)
    }

    fn s(depth: u32) -> Exprent {
        Exprent::stack_var(STACK_BASE + depth, VarType::Int)
    }

    fn static_call(name: &str, params: Vec<Exprent>) -> Exprent {
        Exprent::new(ExprKind::Invocation(Box::new(InvocationExpr {
            name: name.into(),
            class_name: "A".into(),
            kind: InvocationKind::Static,
            instance: None,
            descriptor: MethodDescriptor::parse("(I)I").unwrap(),
            string_descriptor: "(I)I".into(),
            params,
            bootstrap: None,
        })))
    }

    #[test]
    fn single_use_chain_collapses() {
        let x = Exprent::var(1, VarType::Int);
        let (mut g, root, b) = single_block(vec![
            Exprent::assign(s(0), x.clone()),
            Exprent::assign(s(0), static_call("f", vec![s(0)])),
            Exprent::assign(Exprent::var(2, VarType::Int), s(0)),
        ]);
        simplify_stack_vars(&mut g, root, &DecompilerOptions::default()).unwrap();
        let list = g[b].exprents.as_ref().unwrap();
        assert_eq!(
            list,
            &vec![Exprent::assign(Exprent::var(2, VarType::Int), static_call("f", vec![x]))]
        );
    }

    #[test]
    fn unused_call_result_becomes_statement() {
        let (mut g, root, b) = single_block(vec![Exprent::assign(s(0), static_call("f", vec![]))]);
        simplify_stack_vars(&mut g, root, &DecompilerOptions::default()).unwrap();
        assert_eq!(g[b].exprents.as_ref().unwrap(), &vec![static_call("f", vec![])]);
    }

    #[test]
    fn field_read_is_not_moved_past_a_store() {
        let field = Exprent::new(ExprKind::Field {
            name: "f".into(),
            class_name: "A".into(),
            is_static: true,
            instance: None,
            ty: VarType::Int,
            stamp: FieldStamp::default(),
        });
        let original = vec![
            Exprent::assign(s(0), field.clone()),
            Exprent::assign(field, Exprent::int_const(3)),
            Exprent::assign(Exprent::var(1, VarType::Int), s(0)),
        ];
        let (mut g, root, b) = single_block(original.clone());
        simplify_stack_vars(&mut g, root, &DecompilerOptions::default()).unwrap();
        assert_eq!(g[b].exprents.as_ref().unwrap(), &original);
    }

    #[test]
    fn pure_value_is_copied_into_every_reader() {
        let (mut g, root, b) = single_block(vec![
            Exprent::assign(s(0), Exprent::int_const(5)),
            Exprent::assign(Exprent::var(1, VarType::Int), s(0)),
            Exprent::assign(Exprent::var(2, VarType::Int), s(0)),
        ]);
        simplify_stack_vars(&mut g, root, &DecompilerOptions::default()).unwrap();
        assert_eq!(
            g[b].exprents.as_ref().unwrap(),
            &vec![
                Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(5)),
                Exprent::assign(Exprent::var(2, VarType::Int), Exprent::int_const(5)),
            ]
        );
    }
}
