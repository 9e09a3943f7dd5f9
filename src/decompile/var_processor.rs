//! Java variables from SSA versions: merging, renumbering, naming, type
//! inference and declarations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::attribute_info::LocalVariable;

use super::context::MethodContext;
use super::descriptor::{parse_type_descriptor, TypeFamily, VarType};
use super::error::Result;
use super::exprs::{ConstValue, ExprKind, Exprent, FunctionType, VarExpr, VarVersionPair};
use super::sforms::ssa::ENTRY_VERSION;
use super::sforms::{build_ssa, VarVersionsGraph};
use super::statement::{SeqObject, StatId, StatKind, StatType, StatementGraph};

/// Per-method variable table.
#[derive(Clone, Debug, Default)]
pub struct VarProcessor {
    names: HashMap<u32, String>,
    types: HashMap<u32, VarType>,
    /// Local slot each variable was split from.
    slots: HashMap<u32, u32>,
    /// Declared parameter types by slot, `this` included.
    param_types: HashMap<u32, VarType>,
    param_slots: u32,
    is_static: bool,
    local_variables: Vec<LocalVariable>,
}

impl VarProcessor {
    pub fn new(ctx: &MethodContext) -> Self {
        let mut param_types = HashMap::new();
        let mut slot = 0;
        if !ctx.is_static() {
            param_types.insert(0, VarType::from_class_name(&ctx.method.class_name));
            slot = 1;
        }
        for param in &ctx.descriptor.params {
            param_types.insert(slot, param.clone());
            slot += param.stack_size();
        }
        VarProcessor {
            names: HashMap::new(),
            types: HashMap::new(),
            slots: HashMap::new(),
            param_types,
            param_slots: ctx.descriptor.param_slots(ctx.is_static()),
            is_static: ctx.is_static(),
            local_variables: ctx.method.code.local_variables.clone(),
        }
    }

    pub fn names(&self) -> &HashMap<u32, String> {
        &self.names
    }

    pub fn var_name(&self, index: u32) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    pub fn var_type(&self, index: u32) -> Option<&VarType> {
        self.types.get(&index)
    }

    fn is_parameter(&self, index: u32) -> bool {
        index < self.param_slots
    }

    /// Merges SSA versions into Java variables. Versions joined by a phi
    /// share a variable, and so do versions of one slot whose types agree.
    /// Every other version group of a slot gets a fresh index.
    pub fn set_var_versions(&mut self, graph: &mut StatementGraph, root: StatId) -> Result<()> {
        let ssa = build_ssa(graph, root)?;
        let catch_vars = catch_variables(graph, root);

        let mut occurrences: HashMap<VarVersionPair, VarType> = HashMap::new();
        for_each_var(graph, root, &mut |v| {
            if !v.stack && !catch_vars.contains(&v.index) {
                let t = occurrences.entry(v.pair()).or_insert(VarType::Unknown);
                *t = t.join(&v.var_type);
            }
        });

        let mut versions = VarVersionsGraph::from_phi(&ssa.phi);
        for pair in occurrences.keys() {
            versions.add(*pair);
        }

        // one class per phi component, then same-slot classes of a
        // compatible type are merged
        let mut classes: BTreeMap<(i32, u8), (BTreeSet<u32>, VarType)> = BTreeMap::new();
        for (rep, members) in versions.components() {
            let ty = members
                .iter()
                .filter_map(|m| occurrences.get(m))
                .fold(VarType::Unknown, |acc, t| acc.join(t));
            let entry = classes
                .entry((rep.var, family_key(&ty)))
                .or_insert_with(|| (BTreeSet::new(), VarType::Unknown));
            entry.0.extend(members.iter().map(|m| m.version));
            entry.1 = entry.1.join(&ty);
        }

        let mut by_slot: BTreeMap<i32, Vec<(BTreeSet<u32>, VarType)>> = BTreeMap::new();
        for ((slot, _), class) in classes {
            by_slot.entry(slot).or_default().push(class);
        }

        let mut mapping: HashMap<VarVersionPair, (u32, VarType)> = HashMap::new();
        for (slot, mut group) in by_slot {
            if slot < 0 {
                continue;
            }
            // the class seen at method entry keeps the slot
            group.sort_by_key(|(versions, _)| (!versions.contains(&ENTRY_VERSION), versions.iter().next().copied()));
            let origin = self.slots.get(&(slot as u32)).copied().unwrap_or(slot as u32);
            for (n, (versions, ty)) in group.into_iter().enumerate() {
                let at_entry = versions.contains(&ENTRY_VERSION) && origin == slot as u32;
                let ty = self.declared_type(origin, at_entry, ty);
                let index = if n == 0 { slot as u32 } else { graph.next_var_index() };
                self.slots.insert(index, origin);
                self.types.insert(index, ty.clone());
                for v in versions {
                    mapping.insert(VarVersionPair::new(slot, v), (index, ty.clone()));
                }
            }
        }

        for_each_var_mut(graph, root, &mut |v| {
            if let Some((index, ty)) = mapping.get(&v.pair()) {
                v.index = *index;
                if *ty != VarType::Unknown {
                    v.var_type = ty.clone();
                }
            }
            v.version = 0;
        });
        fix_boolean_constants(graph, root);
        self.assign_names(graph, root);
        debug!(variables = self.types.len(), "variable versions merged");
        Ok(())
    }

    /// Sharpens the type seen at loads and stores with the parameter
    /// descriptor or the local variable table, within the same family:
    /// an `int` slot declared `Z` becomes `boolean`.
    fn declared_type(&self, slot: u32, at_entry: bool, inferred: VarType) -> VarType {
        let declared = at_entry
            .then(|| self.param_types.get(&slot).cloned())
            .flatten()
            .or_else(|| self.table_type(slot, &inferred));
        match declared {
            Some(t) if inferred == VarType::Unknown || family_key(&t) == family_key(&inferred) => t,
            _ => inferred,
        }
    }

    /// The table type of `slot` in the family of `inferred`, when every
    /// such entry agrees on it.
    fn table_type(&self, slot: u32, inferred: &VarType) -> Option<VarType> {
        let mut found: Option<VarType> = None;
        for lv in self.local_variables.iter().filter(|lv| lv.index as u32 == slot) {
            let Some(t) = parse_type_descriptor(&lv.descriptor) else {
                continue;
            };
            if family_key(&t) != family_key(inferred) {
                continue;
            }
            match &found {
                Some(f) if *f != t => return None,
                _ => found = Some(t),
            }
        }
        found
    }

    fn assign_names(&mut self, graph: &StatementGraph, root: StatId) {
        let mut indices: BTreeSet<u32> = BTreeSet::new();
        for stat in graph.subtree(root) {
            for e in graph.own_exprents(stat) {
                indices.extend(e.all_vars().iter().filter(|v| !v.stack).map(|v| v.index));
            }
        }
        self.names.clear();
        let mut used: HashSet<String> = HashSet::new();
        for index in indices {
            let slot = self.slots.get(&index).copied().unwrap_or(index);
            let name = if slot == 0 && !self.is_static && index == 0 {
                Some("this".to_string())
            } else {
                self.table_name(slot, self.types.get(&index))
            };
            if let Some(name) = name.filter(|n| !used.contains(n)) {
                used.insert(name.clone());
                self.names.insert(index, name);
            }
        }
    }

    /// Name from the local variable table, preferring an entry whose type
    /// matches.
    fn table_name(&self, slot: u32, ty: Option<&VarType>) -> Option<String> {
        let candidates: Vec<&LocalVariable> = self
            .local_variables
            .iter()
            .filter(|lv| lv.index as u32 == slot)
            .collect();
        let matching = candidates.iter().find(|lv| {
            match (parse_type_descriptor(&lv.descriptor), ty) {
                (Some(t), Some(ty)) => family_key(&t) == family_key(ty),
                _ => false,
            }
        });
        matching.or(candidates.first()).map(|lv| lv.name.clone())
    }

    /// Marks the assignment that introduces each variable as its
    /// declaration, or adds a separate declaration to the innermost
    /// statement enclosing every use.
    pub fn set_var_definitions(&mut self, graph: &mut StatementGraph, root: StatId) -> Result<()> {
        let catch_vars = catch_variables(graph, root);
        let mut owners: BTreeMap<u32, (VarType, Vec<StatId>)> = BTreeMap::new();
        for stat in graph.subtree(root) {
            if matches!(graph.stat_type(stat), StatType::Trycatch | StatType::CatchAll) {
                continue;
            }
            for e in graph.own_exprents(stat) {
                for v in e.all_vars() {
                    let entry = owners.entry(v.index).or_insert_with(|| (v.var_type.clone(), Vec::new()));
                    if !entry.1.contains(&stat) {
                        entry.1.push(stat);
                    }
                }
            }
        }

        let mut declared = 0usize;
        for (index, (ty, stats)) in owners {
            if self.is_parameter(index) || catch_vars.contains(&index) {
                continue;
            }
            let Some(common) = common_ancestor(graph, &stats) else {
                continue;
            };
            let defined_inline = match first_occurrence(graph, common, index) {
                Some(Occurrence::Assignment { block, position }) if sequence_chain(graph, block, common) => {
                    mark_definition(graph, block, position, index)
                }
                Some(Occurrence::LoopInit(stat)) if stat == common => mark_init_definition(graph, stat, index),
                _ => false,
            };
            if !defined_inline {
                let mut decl = Exprent::var(index, ty);
                if let Some(v) = decl.as_var_mut() {
                    v.definition = true;
                    v.stack = index >= super::exprs::STACK_BASE;
                }
                graph[common].var_definitions.push(decl);
            }
            declared += 1;
        }
        debug!(declared, "variable definitions placed");
        Ok(())
    }
}

/// Boolean and integer locals share JVM slots and constants, so they group
/// together.
fn family_key(ty: &VarType) -> u8 {
    match ty.family() {
        TypeFamily::Unknown => 0,
        TypeFamily::Boolean | TypeFamily::Integer => 1,
        TypeFamily::Long => 2,
        TypeFamily::Float => 3,
        TypeFamily::Double => 4,
        TypeFamily::Object => 5,
    }
}

fn catch_variables(graph: &StatementGraph, root: StatId) -> HashSet<u32> {
    let mut out = HashSet::new();
    for stat in graph.subtree(root) {
        let vars = match &graph[stat].kind {
            StatKind::Trycatch(c) => &c.vars,
            StatKind::CatchAll(c) => &c.vars,
            _ => continue,
        };
        out.extend(vars.iter().filter_map(Exprent::as_var).map(|v| v.index));
    }
    out
}

fn for_each_var(graph: &StatementGraph, root: StatId, f: &mut dyn FnMut(&VarExpr)) {
    for stat in graph.subtree(root) {
        for e in graph.own_exprents(stat) {
            for v in e.all_vars() {
                f(v);
            }
        }
    }
}

fn for_each_var_mut(graph: &mut StatementGraph, root: StatId, f: &mut dyn FnMut(&mut VarExpr)) {
    for stat in graph.subtree(root) {
        for e in graph.own_exprents_mut(stat) {
            e.visit_mut_post(&mut |x| {
                if let Some(v) = x.as_var_mut() {
                    f(v);
                }
            });
        }
    }
}

/// `flag = 1` and `flag == 0` on boolean variables use boolean constants.
fn fix_boolean_constants(graph: &mut StatementGraph, root: StatId) {
    for stat in graph.subtree(root) {
        for e in graph.own_exprents_mut(stat) {
            e.visit_mut_post(&mut |x| match &mut x.kind {
                ExprKind::Assignment { left, right, .. } if left.expr_type() == VarType::Boolean => {
                    make_boolean(right)
                }
                ExprKind::Function { func, operands } if matches!(func, FunctionType::Eq | FunctionType::Ne) => {
                    if let [a, b] = operands.as_mut_slice() {
                        if a.expr_type() == VarType::Boolean {
                            make_boolean(b);
                        } else if b.expr_type() == VarType::Boolean {
                            make_boolean(a);
                        }
                    }
                }
                ExprKind::Exit { value: Some(v), ret_type, .. } if *ret_type == VarType::Boolean => make_boolean(v),
                _ => {}
            });
        }
    }
}

fn make_boolean(e: &mut Exprent) {
    if let ExprKind::Const {
        ty,
        value: ConstValue::Int(0 | 1),
    } = &mut e.kind
    {
        *ty = VarType::Boolean;
    }
}

fn common_ancestor(graph: &StatementGraph, stats: &[StatId]) -> Option<StatId> {
    let (&first, rest) = stats.split_first()?;
    let mut candidate = Some(first);
    while let Some(c) = candidate {
        if rest.iter().all(|&s| graph.contains_statement(c, s)) {
            return Some(c);
        }
        candidate = graph[c].parent;
    }
    None
}

enum Occurrence {
    /// A plain assignment at `position` of a basic block.
    Assignment { block: StatId, position: usize },
    /// The init expression of a loop.
    LoopInit(StatId),
    Other,
}

/// First reference to `index` below `stat` in source order.
fn first_occurrence(graph: &StatementGraph, stat: StatId, index: u32) -> Option<Occurrence> {
    for obj in graph.sequential_objects(stat) {
        match obj {
            SeqObject::Stat(child) => {
                if let Some(found) = first_occurrence(graph, child, index) {
                    return Some(found);
                }
            }
            SeqObject::Body(block) => {
                for (position, e) in graph[block].exprents.iter().flatten().enumerate() {
                    if e.contains_var(index) {
                        return Some(if assigns_fresh(e, index) {
                            Occurrence::Assignment { block, position }
                        } else {
                            Occurrence::Other
                        });
                    }
                }
            }
            SeqObject::Init(s) => {
                if let Some(init) = graph.do_data(s).and_then(|d| d.init.as_ref()) {
                    if init.contains_var(index) {
                        return Some(if assigns_fresh(init, index) {
                            Occurrence::LoopInit(s)
                        } else {
                            Occurrence::Other
                        });
                    }
                }
            }
            SeqObject::Head(s) | SeqObject::Inc(s) => {
                let exprents = match (obj, &graph[s].kind) {
                    (SeqObject::Inc(_), StatKind::Do(d)) => d.inc.iter().collect::<Vec<_>>(),
                    (_, StatKind::Do(d)) => d.condition.iter().collect(),
                    _ => graph.own_exprents(s),
                };
                if exprents.iter().any(|e| e.contains_var(index)) {
                    return Some(Occurrence::Other);
                }
            }
        }
    }
    None
}

/// `index = value` where `value` does not read `index`.
fn assigns_fresh(e: &Exprent, index: u32) -> bool {
    match &e.kind {
        ExprKind::Assignment { left, right, cond: None } => {
            left.as_var().is_some_and(|v| v.index == index) && !right.contains_var(index)
        }
        _ => false,
    }
}

/// Whether only sequences separate `block` from `common`.
fn sequence_chain(graph: &StatementGraph, block: StatId, common: StatId) -> bool {
    let mut current = block;
    while current != common {
        let Some(parent) = graph[current].parent else {
            return false;
        };
        if parent != common && !matches!(graph.stat_type(parent), StatType::Sequence) {
            return false;
        }
        if parent == common && !matches!(graph.stat_type(parent), StatType::Sequence | StatType::Root) {
            return false;
        }
        current = parent;
    }
    true
}

fn mark_definition(graph: &mut StatementGraph, block: StatId, position: usize, index: u32) -> bool {
    let Some(e) = graph[block].exprents.as_mut().and_then(|l| l.get_mut(position)) else {
        return false;
    };
    mark_left(e, index)
}

fn mark_init_definition(graph: &mut StatementGraph, stat: StatId, index: u32) -> bool {
    match graph.do_data_mut(stat).and_then(|d| d.init.as_mut()) {
        Some(init) => mark_left(init, index),
        None => false,
    }
}

fn mark_left(e: &mut Exprent, index: u32) -> bool {
    match e.assignment_parts_mut().and_then(|(left, _)| left.as_var_mut()) {
        Some(v) if v.index == index => {
            v.definition = true;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::exprs::ExitKind;
    use crate::decompile::stat_edge::{EdgeType, StatEdge};
    use crate::decompile::stats::{IfStat, IfType};

    fn processor(param_slots: u32) -> VarProcessor {
        VarProcessor {
            param_slots,
            is_static: true,
            ..VarProcessor::default()
        }
    }

    fn root_with(g: &mut StatementGraph, body: StatId) -> StatId {
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        g[root].stats = vec![body];
        g[root].first = Some(body);
        g.set_all_parent(root);
        root
    }

    #[test]
    fn slot_reused_with_another_type_gets_a_new_variable() {
        let mut g = StatementGraph::new(3);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(4)),
            Exprent::assign(Exprent::var(1, VarType::string()), Exprent::string_const("s")),
            Exprent::exit(ExitKind::Return, Some(Exprent::var(1, VarType::string())), VarType::string()),
        ]);
        let root = root_with(&mut g, b);
        let mut vp = processor(1);
        vp.set_var_versions(&mut g, root).unwrap();

        let list = g[b].exprents.as_ref().unwrap();
        let first = list[0].assignment_parts().unwrap().0.as_var().unwrap().index;
        let second = list[1].assignment_parts().unwrap().0.as_var().unwrap().index;
        assert_ne!(first, second);
        let ExprKind::Exit { value: Some(ret), .. } = &list[2].kind else { panic!() };
        assert_eq!(ret.as_var().unwrap().index, second);
    }

    #[test]
    fn first_assignment_in_sequence_declares() {
        let mut g = StatementGraph::new(2);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(4)),
            Exprent::exit(ExitKind::Return, Some(Exprent::var(1, VarType::Int)), VarType::Int),
        ]);
        let root = root_with(&mut g, b);
        let mut vp = processor(0);
        vp.set_var_definitions(&mut g, root).unwrap();
        let left = g[b].exprents.as_ref().unwrap()[0].assignment_parts().unwrap().0;
        assert!(left.as_var().unwrap().definition);
        assert!(g[b].var_definitions.is_empty());
    }

    #[test]
    fn variable_assigned_in_both_branches_is_declared_before_the_if() {
        let mut g = StatementGraph::new(2);
        let head = g.add_empty_block();
        let a = g.add_empty_block();
        let b = g.add_empty_block();
        let tail = g.add_empty_block();
        g[a].exprents = Some(vec![Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(1))]);
        g[b].exprents = Some(vec![Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(2))]);
        g[tail].exprents = Some(vec![Exprent::exit(
            ExitKind::Return,
            Some(Exprent::var(1, VarType::Int)),
            VarType::Int,
        )]);
        let cond = g.add_statement(StatKind::If(IfStat {
            if_type: IfType::IfElse,
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
        g.set_all_parent(cond);
        let seq = g.new_sequence(vec![cond, tail]);
        g.set_all_parent(seq);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, cond, tail, None));
        let root = root_with(&mut g, seq);

        let mut vp = processor(1);
        vp.set_var_versions(&mut g, root).unwrap();
        vp.set_var_definitions(&mut g, root).unwrap();

        assert_eq!(g[seq].var_definitions.len(), 1);
        let decl = g[seq].var_definitions[0].as_var().unwrap();
        assert_eq!(decl.index, 1);
        assert!(decl.definition);
    }

    #[test]
    fn table_type_sharpens_int_slot_to_boolean() {
        let mut g = StatementGraph::new(2);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(0)),
            Exprent::exit(ExitKind::Return, Some(Exprent::var(1, VarType::Int)), VarType::Boolean),
        ]);
        let root = root_with(&mut g, b);
        let mut vp = processor(1);
        vp.param_types.insert(0, VarType::Boolean);
        vp.local_variables.push(LocalVariable {
            start_pc: 0,
            length: 4,
            name: "done".into(),
            descriptor: "Z".into(),
            index: 1,
        });
        vp.set_var_versions(&mut g, root).unwrap();

        let list = g[b].exprents.as_ref().unwrap();
        let (left, right) = list[0].assignment_parts().unwrap();
        assert_eq!(left.expr_type(), VarType::Boolean);
        assert_eq!(right, &Exprent::bool_const(false));
        assert_eq!(vp.var_type(1), Some(&VarType::Boolean));
        assert_eq!(vp.var_name(1), Some("done"));
    }

    #[test]
    fn parameter_descriptor_types_the_entry_value() {
        let mut g = StatementGraph::new(2);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![Exprent::exit(
            ExitKind::Return,
            Some(Exprent::var(0, VarType::Int)),
            VarType::Int,
        )]);
        let root = root_with(&mut g, b);
        let mut vp = processor(1);
        vp.param_types.insert(0, VarType::Char);
        vp.set_var_versions(&mut g, root).unwrap();

        let ExprKind::Exit { value: Some(ret), .. } = &g[b].exprents.as_ref().unwrap()[0].kind else {
            panic!()
        };
        assert_eq!(ret.expr_type(), VarType::Char);
    }

    #[test]
    fn boolean_variables_get_boolean_constants() {
        let mut g = StatementGraph::new(2);
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Boolean), Exprent::int_const(1)),
            Exprent::exit(ExitKind::Return, Some(Exprent::var(1, VarType::Boolean)), VarType::Boolean),
        ]);
        let root = root_with(&mut g, b);
        processor(1).set_var_versions(&mut g, root).unwrap();
        let right = g[b].exprents.as_ref().unwrap()[0].assignment_parts().unwrap().1;
        assert_eq!(right, &Exprent::bool_const(true));
    }
}
