//! Versioning of variables over the direct graph.
//!
//! Every assignment gets a fresh version. A read reached by more than one
//! version gets a phi version of its own, and the phi records which
//! versions flow into it. Reads that nothing defines (parameters, catch
//! variables) see version 1.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use super::direct_graph::{flatten, put_slot, take_slot, NodeId};
use crate::decompile::error::Result;
use crate::decompile::exprs::{ExprKind, Exprent, FunctionType, VarVersionPair};
use crate::decompile::statement::{StatId, StatementGraph};

/// Reaching versions per variable. Pseudo variables use negative keys.
pub(crate) type State = BTreeMap<i32, BTreeSet<u32>>;

/// Version seen by reads that no assignment reaches.
pub const ENTRY_VERSION: u32 = 1;

/// Pseudo variable bumped by every call, constructor and monitor.
pub(crate) const HEAP: i32 = -1;
/// Pseudo variable for the elements of all arrays.
pub(crate) const ARRAYS: i32 = -2;
const FIRST_FIELD: i32 = -3;

#[derive(Clone, Debug, Default)]
pub struct SsaResult {
    /// Phi version to the versions merged into it.
    pub phi: HashMap<VarVersionPair, BTreeSet<u32>>,
    /// Stack variable definitions whose operands read the same state at
    /// every use. Only filled by [`super::build_ssau`].
    pub replaceable: HashMap<VarVersionPair, bool>,
}

impl SsaResult {
    pub fn is_phi(&self, pair: VarVersionPair) -> bool {
        self.phi.contains_key(&pair)
    }

    /// Whether `pair` flows into some phi.
    pub fn is_phi_source(&self, pair: VarVersionPair) -> bool {
        self.phi
            .iter()
            .any(|(p, sources)| p.var == pair.var && sources.contains(&pair.version))
    }

    pub fn is_replaceable(&self, pair: VarVersionPair) -> bool {
        self.replaceable.get(&pair).copied().unwrap_or(false)
    }
}

/// Assigns SSA versions to every variable below `root`.
pub fn build_ssa(graph: &mut StatementGraph, root: StatId) -> Result<SsaResult> {
    run(graph, root, false)
}

pub(crate) fn run(graph: &mut StatementGraph, root: StatId, heap: bool) -> Result<SsaResult> {
    let dg = flatten(graph, root)?;
    let order = dg.reverse_postorder();
    let mut engine = Engine::new(heap);
    let mut outs: HashMap<NodeId, State> = HashMap::new();
    let mut handler_ins: HashMap<NodeId, State> = HashMap::new();

    let mut passes = 0usize;
    loop {
        passes += 1;
        let mut changed = false;
        for &n in &order {
            let node = &dg.nodes[n];
            let mut st = State::new();
            for p in &node.preds {
                if let Some(out) = outs.get(p) {
                    merge_into(&mut st, out);
                }
            }
            if let Some(h) = handler_ins.get(&n) {
                merge_into(&mut st, h);
            }

            engine.node = n;
            engine.site = 0;
            engine.seen = st.clone();
            if let Some(slot) = node.slot {
                let mut list = take_slot(graph, slot);
                for e in list.iter_mut() {
                    engine.expr(e, &mut st);
                }
                put_slot(graph, slot, list)?;
            }

            for &h in &node.handlers {
                changed |= merge_into(handler_ins.entry(h).or_default(), &engine.seen);
            }
            if outs.get(&n) != Some(&st) {
                outs.insert(n, st);
                changed = true;
            }
        }
        if !changed {
            if engine.record {
                break;
            }
            // one more stable pass to collect per-use observations
            engine.record = true;
            engine.replaceable.clear();
        }
    }
    trace!(passes, phis = engine.phi.len(), heap, "ssa converged");
    Ok(SsaResult {
        phi: engine.phi,
        replaceable: engine.replaceable,
    })
}

/// Unions `from` into `into`, reporting growth.
pub(crate) fn merge_into(into: &mut State, from: &State) -> bool {
    let mut changed = false;
    for (k, versions) in from {
        let set = into.entry(*k).or_default();
        for v in versions {
            changed |= set.insert(*v);
        }
    }
    changed
}

pub(crate) struct Engine {
    heap: bool,
    record: bool,
    node: NodeId,
    site: usize,
    /// Version chosen at each read or write site, stable across passes.
    versions: HashMap<(NodeId, usize), u32>,
    counters: HashMap<i32, u32>,
    fields: HashMap<(String, String), i32>,
    phi: HashMap<VarVersionPair, BTreeSet<u32>>,
    /// Every version visible at some point of the current node.
    seen: State,
    snapshots: HashMap<VarVersionPair, Vec<(i32, BTreeSet<u32>)>>,
    replaceable: HashMap<VarVersionPair, bool>,
}

impl Engine {
    fn new(heap: bool) -> Self {
        Engine {
            heap,
            record: false,
            node: 0,
            site: 0,
            versions: HashMap::new(),
            counters: HashMap::new(),
            fields: HashMap::new(),
            phi: HashMap::new(),
            seen: State::new(),
            snapshots: HashMap::new(),
            replaceable: HashMap::new(),
        }
    }

    fn next_site(&mut self) -> (NodeId, usize) {
        self.site += 1;
        (self.node, self.site)
    }

    fn site_version(&mut self, key: i32) -> u32 {
        let site = self.next_site();
        if let Some(&v) = self.versions.get(&site) {
            return v;
        }
        let counter = self.counters.entry(key).or_insert(ENTRY_VERSION);
        *counter += 1;
        let v = *counter;
        self.versions.insert(site, v);
        v
    }

    fn note(&mut self, key: i32, version: u32) {
        self.seen.entry(key).or_default().insert(version);
    }

    /// Version read at the next site; the flag tells whether it is a phi.
    fn read(&mut self, key: i32, st: &mut State) -> (u32, bool) {
        let reaching = st.get(&key).cloned().unwrap_or_default();
        match reaching.len() {
            0 => {
                self.next_site();
                st.insert(key, BTreeSet::from([ENTRY_VERSION]));
                self.note(key, ENTRY_VERSION);
                (ENTRY_VERSION, false)
            }
            1 => {
                self.next_site();
                (reaching.iter().next().copied().unwrap_or(ENTRY_VERSION), false)
            }
            _ => {
                let v = self.site_version(key);
                self.phi.entry(VarVersionPair::new(key, v)).or_default().extend(reaching);
                st.insert(key, BTreeSet::from([v]));
                self.note(key, v);
                (v, true)
            }
        }
    }

    fn write(&mut self, key: i32, st: &mut State) -> u32 {
        let v = self.site_version(key);
        st.insert(key, BTreeSet::from([v]));
        self.note(key, v);
        v
    }

    fn field_key(&mut self, class_name: &str, name: &str) -> i32 {
        let next = FIRST_FIELD - self.fields.len() as i32;
        *self
            .fields
            .entry((class_name.to_string(), name.to_string()))
            .or_insert(next)
    }

    fn expr(&mut self, e: &mut Exprent, st: &mut State) {
        match &mut e.kind {
            ExprKind::Var(v) => {
                let (version, phi) = self.read(v.index as i32, st);
                v.version = version;
                if v.stack && !phi && self.heap && self.record {
                    let pair = v.pair();
                    self.check_use(pair, st);
                }
            }
            ExprKind::Assignment { left, right, cond } => {
                let compound = cond.is_some();
                if left.is_var() {
                    self.expr(right, st);
                    let snapshot = if self.heap && self.record { Some(self.read_keys(right)) } else { None };
                    if let Some(v) = left.as_var_mut() {
                        let key = v.index as i32;
                        v.version = if compound { self.read(key, st).0 } else { self.write(key, st) };
                        if let (Some(keys), true) = (snapshot, v.stack && !compound) {
                            let snap = keys
                                .into_iter()
                                .map(|k| (k, st.get(&k).cloned().unwrap_or_default()))
                                .collect();
                            self.snapshots.insert(v.pair(), snap);
                        }
                    }
                } else {
                    for c in left.children_mut() {
                        self.expr(c, st);
                    }
                    if compound {
                        self.heap_read(left, st);
                    }
                    self.expr(right, st);
                    self.heap_write(left, st);
                }
            }
            ExprKind::Function { func, operands } => match func {
                FunctionType::Cadd | FunctionType::Cor => {
                    let mut iter = operands.iter_mut();
                    if let Some(first) = iter.next() {
                        self.expr(first, st);
                    }
                    let skipped = st.clone();
                    for rest in iter {
                        self.expr(rest, st);
                    }
                    merge_into(st, &skipped);
                }
                FunctionType::Iif => {
                    if let [c, a, b] = operands.as_mut_slice() {
                        self.expr(c, st);
                        let mut other = st.clone();
                        self.expr(a, &mut other);
                        self.expr(b, st);
                        merge_into(st, &other);
                    }
                }
                f if f.is_inc_dec() => {
                    if let Some(target) = operands.first_mut() {
                        if let Some(v) = target.as_var_mut() {
                            v.version = self.read(v.index as i32, st).0;
                        } else {
                            for c in target.children_mut() {
                                self.expr(c, st);
                            }
                            self.heap_read(target, st);
                            self.heap_write(target, st);
                        }
                    }
                }
                _ => {
                    for op in operands.iter_mut() {
                        self.expr(op, st);
                    }
                }
            },
            ExprKind::Field { .. } | ExprKind::Array { .. } => {
                for c in e.children_mut() {
                    self.expr(c, st);
                }
                self.heap_read(e, st);
            }
            ExprKind::Invocation(_) | ExprKind::New(_) | ExprKind::Monitor { .. } => {
                for c in e.children_mut() {
                    self.expr(c, st);
                }
                let calls = match &e.kind {
                    ExprKind::New(n) => n.constructor.is_some(),
                    _ => true,
                };
                if self.heap && calls {
                    self.write(HEAP, st);
                }
            }
            _ => {
                for c in e.children_mut() {
                    self.expr(c, st);
                }
            }
        }
    }

    fn heap_read(&mut self, e: &mut Exprent, st: &mut State) {
        if !self.heap {
            return;
        }
        if let Some(key) = self.location_key(e) {
            self.read(key, st);
            self.read(HEAP, st);
        }
    }

    fn heap_write(&mut self, e: &mut Exprent, st: &mut State) {
        if !self.heap {
            return;
        }
        if let Some(key) = self.location_key(e) {
            self.write(key, st);
        }
    }

    /// Pseudo variable of a field or array element, stamping fields.
    fn location_key(&mut self, e: &mut Exprent) -> Option<i32> {
        match &mut e.kind {
            ExprKind::Field { name, class_name, stamp, .. } => {
                let key = self.field_key(class_name, name);
                stamp.0 = Some(key);
                Some(key)
            }
            ExprKind::Array { .. } => Some(ARRAYS),
            _ => None,
        }
    }

    /// Keys whose state the value of `e` depends on.
    fn read_keys(&mut self, e: &Exprent) -> Vec<i32> {
        let mut keys = BTreeSet::new();
        for x in std::iter::once(e).chain(e.all_recursive()) {
            match &x.kind {
                ExprKind::Var(v) => {
                    keys.insert(v.index as i32);
                }
                ExprKind::Field { name, class_name, .. } => {
                    keys.insert(self.field_key(class_name, name));
                    keys.insert(HEAP);
                }
                ExprKind::Array { .. } => {
                    keys.insert(ARRAYS);
                    keys.insert(HEAP);
                }
                ExprKind::Invocation(_) | ExprKind::New(_) => {
                    keys.insert(HEAP);
                }
                _ => {}
            }
        }
        keys.into_iter().collect()
    }

    fn check_use(&mut self, pair: VarVersionPair, st: &State) {
        let Some(snap) = self.snapshots.get(&pair) else {
            return;
        };
        let same = snap
            .iter()
            .all(|(k, set)| st.get(k).map_or(set.is_empty(), |now| now == set));
        self.replaceable
            .entry(pair)
            .and_modify(|r| *r &= same)
            .or_insert(same);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::VarType;
    use crate::decompile::stat_edge::{EdgeType, StatEdge};
    use crate::decompile::statement::StatKind;
    use crate::decompile::stats::IfStat;

    fn version_of(e: &Exprent) -> u32 {
        e.as_var().unwrap().version
    }

    #[test]
    fn straight_line_assignments_get_fresh_versions() {
        let mut g = StatementGraph::new(2);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::var(0, VarType::Int)),
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(4)),
            Exprent::exit(
                crate::decompile::exprs::ExitKind::Return,
                Some(Exprent::var(1, VarType::Int)),
                VarType::Int,
            ),
        ]);
        g[root].stats = vec![b];
        g[root].first = Some(b);
        g.set_all_parent(root);

        let res = build_ssa(&mut g, root).unwrap();
        assert!(res.phi.is_empty());
        let list = g[b].exprents.as_ref().unwrap();
        let (l0, r0) = list[0].assignment_parts().unwrap();
        let (l1, _) = list[1].assignment_parts().unwrap();
        assert_eq!(version_of(r0), ENTRY_VERSION);
        assert_ne!(version_of(l0), version_of(l1));
        let ExprKind::Exit { value: Some(v), .. } = &list[2].kind else { panic!() };
        assert_eq!(version_of(v), version_of(l1));
    }

    #[test]
    fn branches_meet_in_a_phi() {
        // if (c) { x = 1 } else { x = 2 } return x
        let mut g = StatementGraph::new(2);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let head = g.add_empty_block();
        let a = g.add_empty_block();
        let b = g.add_empty_block();
        let tail = g.add_empty_block();
        g[a].exprents = Some(vec![Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(1))]);
        g[b].exprents = Some(vec![Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(2))]);
        g[tail].exprents = Some(vec![Exprent::exit(
            crate::decompile::exprs::ExitKind::Return,
            Some(Exprent::var(1, VarType::Int)),
            VarType::Int,
        )]);
        let cond = g.add_statement(StatKind::If(IfStat {
            if_type: crate::decompile::stats::IfType::IfElse,
            head_exprent: Some(Exprent::if_expr(Exprent::var(0, VarType::Boolean))),
            ..IfStat::default()
        }));
        g[cond].first = Some(head);
        g[cond].stats = vec![head, a, b];
        let e1 = g.add_successor(StatEdge::new(EdgeType::REGULAR, head, a, None));
        let e2 = g.add_successor(StatEdge::new(EdgeType::REGULAR, head, b, None));
        {
            let d = g.expect_if_mut(cond).unwrap();
            d.if_stat = Some(a);
            d.else_stat = Some(b);
            d.if_edge = Some(e1);
            d.else_edge = Some(e2);
        }
        let seq = g.new_sequence(vec![cond, tail]);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, cond, tail, None));
        g[root].stats = vec![seq];
        g[root].first = Some(seq);
        g.set_all_parent(root);

        let res = build_ssa(&mut g, root).unwrap();
        let ExprKind::Exit { value: Some(v), .. } = &g[tail].exprents.as_ref().unwrap()[0].kind else {
            panic!()
        };
        let pair = v.as_var().unwrap().pair();
        let sources = res.phi.get(&pair).expect("phi at the join");
        let va = version_of(g[a].exprents.as_ref().unwrap()[0].assignment_parts().unwrap().0);
        let vb = version_of(g[b].exprents.as_ref().unwrap()[0].assignment_parts().unwrap().0);
        assert_eq!(sources, &BTreeSet::from([va, vb]));
        assert!(res.is_phi_source(VarVersionPair::new(1, va)));
    }
}
