//! Flattened control flow over the expression lists of a structured
//! statement tree.
//!
//! Every basic block becomes a [`NodeKind::Direct`] node. Compound
//! statements contribute the nodes that evaluate their head expressions:
//! the tail of an if, switch or synchronized head, and the init, condition
//! and increment of a loop. Edges follow the order in which the generated
//! Java code would run those expressions; exception handlers hang off every
//! node of the protected body.

use std::collections::{HashMap, HashSet};

use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::Exprent;
use crate::decompile::stat_edge::EdgeType;
use crate::decompile::statement::{StatId, StatKind, StatType, StatementGraph};
use crate::decompile::stats::{IfType, LoopType};

pub type NodeId = usize;

/// Where the expressions of a node are stored in the statement tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExprSlot {
    /// Expression list of a basic block.
    Block(StatId),
    /// Head expression of an if, switch or synchronized statement.
    Head(StatId),
    Init(StatId),
    Condition(StatId),
    Inc(StatId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Direct,
    Tail,
    Init,
    Condition,
    Increment,
    Exit,
}

#[derive(Clone, Debug)]
pub struct DirectNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub statement: StatId,
    pub slot: Option<ExprSlot>,
    pub succs: Vec<NodeId>,
    pub preds: Vec<NodeId>,
    /// Entry nodes of the handlers protecting this node.
    pub handlers: Vec<NodeId>,
    /// Head node that evaluates the expressions left in this block, when
    /// this block is the first child of an if, switch or synchronized.
    pub tail: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct DirectGraph {
    pub nodes: Vec<DirectNode>,
    pub first: NodeId,
    pub exit: NodeId,
}

impl DirectGraph {
    fn add_node(&mut self, kind: NodeKind, statement: StatId, slot: Option<ExprSlot>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DirectNode {
            id,
            kind,
            statement,
            slot,
            succs: Vec::new(),
            preds: Vec::new(),
            handlers: Vec::new(),
            tail: None,
        });
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if !self.nodes[from].succs.contains(&to) {
            self.nodes[from].succs.push(to);
            self.nodes[to].preds.push(from);
        }
    }

    fn add_handler(&mut self, from: NodeId, handler: NodeId) {
        if !self.nodes[from].handlers.contains(&handler) {
            self.nodes[from].handlers.push(handler);
        }
    }

    /// Nodes reachable from `first` through normal and handler edges, in
    /// reverse post order.
    pub fn reverse_postorder(&self) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut post = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, usize)> = vec![(self.first, 0)];
        visited.insert(self.first);
        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            let n = &self.nodes[node];
            let succ = n.succs.iter().chain(n.handlers.iter()).nth(*next).copied();
            *next += 1;
            match succ {
                Some(s) => {
                    if visited.insert(s) {
                        stack.push((s, 0));
                    }
                }
                None => {
                    post.push(node);
                    stack.pop();
                }
            }
        }
        post.reverse();
        post
    }

    /// Nodes that carry expressions, in reverse post order.
    pub fn expression_nodes(&self) -> Vec<NodeId> {
        self.reverse_postorder()
            .into_iter()
            .filter(|&n| self.nodes[n].slot.is_some())
            .collect()
    }
}

/// Builds the direct graph of the tree under `root`.
pub fn flatten(graph: &StatementGraph, root: StatId) -> Result<DirectGraph> {
    let mut builder = Flattener {
        graph,
        dg: DirectGraph {
            nodes: Vec::new(),
            first: 0,
            exit: 0,
        },
        entries: HashMap::new(),
        continue_targets: HashMap::new(),
        tails: HashMap::new(),
        loop_nodes: HashMap::new(),
        block_nodes: HashMap::new(),
    };
    let exit = builder.dg.add_node(NodeKind::Exit, root, None);
    builder.dg.exit = exit;
    if let Some(dummy) = graph.dummy_exit() {
        builder.entries.insert(dummy, exit);
    }

    let first = graph.first(root)?;
    builder.create(first)?;
    builder.dg.first = builder.entry(first)?;
    builder.connect(first, Some(exit))?;
    Ok(builder.dg)
}

#[derive(Clone, Copy, Default)]
struct LoopNodes {
    init: Option<NodeId>,
    condition: Option<NodeId>,
    inc: Option<NodeId>,
}

struct Flattener<'a> {
    graph: &'a StatementGraph,
    dg: DirectGraph,
    entries: HashMap<StatId, NodeId>,
    continue_targets: HashMap<StatId, NodeId>,
    tails: HashMap<StatId, NodeId>,
    loop_nodes: HashMap<StatId, LoopNodes>,
    block_nodes: HashMap<StatId, NodeId>,
}

impl<'a> Flattener<'a> {
    fn entry(&self, stat: StatId) -> Result<NodeId> {
        self.entries
            .get(&stat)
            .copied()
            .ok_or_else(|| DecompileError::invariant("statement outside the flattened tree", Some(stat), None))
    }

    /// Creates the nodes of `stat` and its subtree and records entries.
    fn create(&mut self, stat: StatId) -> Result<()> {
        let g = self.graph;
        let children = g[stat].stats.clone();
        if g.stat_type(stat) == StatType::BasicBlock {
            let node = self.dg.add_node(NodeKind::Direct, stat, Some(ExprSlot::Block(stat)));
            self.block_nodes.insert(stat, node);
            self.entries.insert(stat, node);
            return Ok(());
        }
        for &child in &children {
            self.create(child)?;
        }

        let entry = match &g[stat].kind {
            StatKind::If(_) | StatKind::Switch(_) | StatKind::Synchronized(_) => {
                let tail = self.dg.add_node(NodeKind::Tail, stat, Some(ExprSlot::Head(stat)));
                self.tails.insert(stat, tail);
                let head = g.first(stat)?;
                if let Some(&block) = self.block_nodes.get(&head) {
                    self.dg.nodes[block].tail = Some(tail);
                }
                self.entry(head)?
            }
            StatKind::Do(d) => {
                let body = self.entry(g.first(stat)?)?;
                let mut nodes = LoopNodes::default();
                match d.loop_type {
                    LoopType::Do => {
                        self.continue_targets.insert(stat, body);
                        body
                    }
                    LoopType::While => {
                        let c = self.dg.add_node(NodeKind::Condition, stat, Some(ExprSlot::Condition(stat)));
                        nodes.condition = Some(c);
                        self.continue_targets.insert(stat, c);
                        self.loop_nodes.insert(stat, nodes);
                        c
                    }
                    LoopType::DoWhile => {
                        let c = self.dg.add_node(NodeKind::Condition, stat, Some(ExprSlot::Condition(stat)));
                        nodes.condition = Some(c);
                        self.continue_targets.insert(stat, c);
                        self.loop_nodes.insert(stat, nodes);
                        body
                    }
                    LoopType::For => {
                        let c = self.dg.add_node(NodeKind::Condition, stat, Some(ExprSlot::Condition(stat)));
                        nodes.condition = Some(c);
                        if d.init.is_some() {
                            nodes.init = Some(self.dg.add_node(NodeKind::Init, stat, Some(ExprSlot::Init(stat))));
                        }
                        if d.inc.is_some() {
                            nodes.inc = Some(self.dg.add_node(NodeKind::Increment, stat, Some(ExprSlot::Inc(stat))));
                        }
                        self.continue_targets.insert(stat, nodes.inc.unwrap_or(c));
                        self.loop_nodes.insert(stat, nodes);
                        nodes.init.unwrap_or(c)
                    }
                }
            }
            _ => match children.first() {
                Some(&first) => self.entry(g[stat].first.unwrap_or(first))?,
                // an empty compound statement still needs a node to pass through
                None => self.dg.add_node(NodeKind::Direct, stat, None),
            },
        };
        self.entries.insert(stat, entry);
        Ok(())
    }

    /// Target node of a statement edge.
    fn resolve(&self, edge: usize) -> Result<NodeId> {
        let e = self.graph.edge(edge);
        if e.edge_type == EdgeType::CONTINUE {
            if let Some(&target) = self.continue_targets.get(&e.destination) {
                return Ok(target);
            }
        }
        self.entry(e.destination)
    }

    /// Where control goes when `stat` completes normally.
    fn after(&self, stat: StatId, inherited: Option<NodeId>) -> Result<Option<NodeId>> {
        match self.graph.first_successor(stat, EdgeType::DIRECT_ALL) {
            Some(e) => self.resolve(e).map(Some),
            None => Ok(inherited),
        }
    }

    fn link_jumps(&mut self, from: NodeId, stat: StatId) -> Result<bool> {
        let succs = self.graph.successor_edges(stat, EdgeType::DIRECT_ALL);
        for &e in &succs {
            let target = self.resolve(e)?;
            self.dg.add_edge(from, target);
        }
        Ok(!succs.is_empty())
    }

    fn connect(&mut self, stat: StatId, inherited: Option<NodeId>) -> Result<()> {
        let g = self.graph;
        if let Some(&node) = self.block_nodes.get(&stat) {
            if !self.link_jumps(node, stat)? {
                if let Some(next) = inherited {
                    self.dg.add_edge(node, next);
                }
            }
            return Ok(());
        }

        let after = self.after(stat, inherited)?;
        let children = g[stat].stats.clone();
        match &g[stat].kind {
            StatKind::If(data) => {
                let head = g.first(stat)?;
                let tail = self.tails[&stat];
                self.connect_head(head, tail)?;
                self.link_jumps(tail, head)?;
                if data.if_type == IfType::If {
                    if let Some(next) = after {
                        self.dg.add_edge(tail, next);
                    }
                }
                for &branch in data.if_stat.iter().chain(data.else_stat.iter()) {
                    self.connect(branch, after)?;
                }
            }
            StatKind::Switch(data) => {
                let head = g.first(stat)?;
                let tail = self.tails[&stat];
                self.connect_head(head, tail)?;
                self.link_jumps(tail, head)?;
                let cases = data.case_statements.clone();
                for (i, &case) in cases.iter().enumerate() {
                    let fall = match cases.get(i + 1) {
                        Some(&next) => Some(self.entry(next)?),
                        None => after,
                    };
                    self.connect(case, fall)?;
                }
            }
            StatKind::Synchronized(data) => {
                let head = g.first(stat)?;
                let tail = self.tails[&stat];
                self.connect_head(head, tail)?;
                if let Some(body) = data.body {
                    let entry = self.entry(body)?;
                    self.dg.add_edge(tail, entry);
                    self.connect(body, after)?;
                    if let Some(handler) = data.handler {
                        self.connect(handler, after)?;
                        self.protect(body, handler)?;
                    }
                } else if let Some(next) = after {
                    self.dg.add_edge(tail, next);
                }
            }
            StatKind::Do(d) => {
                let body = g.first(stat)?;
                let body_entry = self.entry(body)?;
                let nodes = self.loop_nodes.get(&stat).copied().unwrap_or_default();
                match d.loop_type {
                    LoopType::Do => self.connect(body, Some(body_entry))?,
                    LoopType::While | LoopType::DoWhile => {
                        let c = nodes
                            .condition
                            .ok_or_else(|| DecompileError::invariant("loop without condition node", Some(stat), None))?;
                        self.dg.add_edge(c, body_entry);
                        if let Some(next) = after {
                            self.dg.add_edge(c, next);
                        }
                        self.connect(body, Some(c))?;
                    }
                    LoopType::For => {
                        let c = nodes
                            .condition
                            .ok_or_else(|| DecompileError::invariant("loop without condition node", Some(stat), None))?;
                        if let Some(init) = nodes.init {
                            self.dg.add_edge(init, c);
                        }
                        self.dg.add_edge(c, body_entry);
                        if let Some(next) = after {
                            self.dg.add_edge(c, next);
                        }
                        match nodes.inc {
                            Some(inc) => {
                                self.dg.add_edge(inc, c);
                                self.connect(body, Some(inc))?;
                            }
                            None => self.connect(body, Some(c))?,
                        }
                    }
                }
            }
            StatKind::Trycatch(_) => {
                let body = g.first(stat)?;
                self.connect(body, after)?;
                for &handler in children.iter().skip(1) {
                    self.connect(handler, after)?;
                    self.protect(body, handler)?;
                }
            }
            StatKind::CatchAll(data) => {
                let body = g.first(stat)?;
                if let Some(handler) = data.handler {
                    if data.is_finally {
                        // normal completion of the body runs the finally block
                        let entry = self.entry(handler)?;
                        self.connect(body, Some(entry))?;
                    } else {
                        self.connect(body, after)?;
                    }
                    self.connect(handler, after)?;
                    self.protect(body, handler)?;
                } else {
                    self.connect(body, after)?;
                }
            }
            StatKind::Root { .. } => {
                let first = g.first(stat)?;
                self.connect(first, Some(self.dg.exit))?;
            }
            _ => {
                if children.is_empty() {
                    let node = self.entry(stat)?;
                    if let Some(next) = after {
                        self.dg.add_edge(node, next);
                    }
                }
                for (i, &child) in children.iter().enumerate() {
                    let fall = match (g.stat_type(stat), children.get(i + 1)) {
                        (StatType::Sequence, Some(&next)) => Some(self.entry(next)?),
                        _ => after,
                    };
                    self.connect(child, fall)?;
                }
            }
        }
        Ok(())
    }

    /// Routes the head block of an if, switch or synchronized into its tail
    /// node instead of along the head's jumps.
    fn connect_head(&mut self, head: StatId, tail: NodeId) -> Result<()> {
        match self.block_nodes.get(&head) {
            Some(&node) => {
                self.dg.add_edge(node, tail);
                Ok(())
            }
            None => Err(DecompileError::invariant("head of a compound statement is not a block", Some(head), None)),
        }
    }

    fn protect(&mut self, body: StatId, handler: StatId) -> Result<()> {
        let entry = self.entry(handler)?;
        let protected: Vec<NodeId> = self
            .graph
            .subtree(body)
            .into_iter()
            .flat_map(|s| self.nodes_of(s))
            .collect();
        for node in protected {
            self.dg.add_handler(node, entry);
        }
        Ok(())
    }

    fn nodes_of(&self, stat: StatId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.block_nodes.get(&stat).into_iter().copied().collect();
        out.extend(self.tails.get(&stat).copied());
        if let Some(nodes) = self.loop_nodes.get(&stat) {
            out.extend(nodes.init);
            out.extend(nodes.condition);
            out.extend(nodes.inc);
        }
        out
    }
}

/// Expressions stored in `slot`.
pub fn slot_exprents(graph: &StatementGraph, slot: ExprSlot) -> Vec<&Exprent> {
    match slot {
        ExprSlot::Block(stat) => graph[stat].exprents.iter().flatten().collect(),
        ExprSlot::Head(stat) => match &graph[stat].kind {
            StatKind::If(d) => d.head_exprent.iter().collect(),
            StatKind::Switch(d) => d.head_exprent.iter().collect(),
            StatKind::Synchronized(d) => d.head_exprent.iter().collect(),
            _ => Vec::new(),
        },
        ExprSlot::Init(stat) => graph.do_data(stat).into_iter().flat_map(|d| d.init.iter()).collect(),
        ExprSlot::Condition(stat) => graph.do_data(stat).into_iter().flat_map(|d| d.condition.iter()).collect(),
        ExprSlot::Inc(stat) => graph.do_data(stat).into_iter().flat_map(|d| d.inc.iter()).collect(),
    }
}

fn single_slot(graph: &mut StatementGraph, slot: ExprSlot) -> Option<&mut Option<Exprent>> {
    match slot {
        ExprSlot::Block(_) => None,
        ExprSlot::Head(stat) => match &mut graph[stat].kind {
            StatKind::If(d) => Some(&mut d.head_exprent),
            StatKind::Switch(d) => Some(&mut d.head_exprent),
            StatKind::Synchronized(d) => Some(&mut d.head_exprent),
            _ => None,
        },
        ExprSlot::Init(stat) => graph.do_data_mut(stat).map(|d| &mut d.init),
        ExprSlot::Condition(stat) => graph.do_data_mut(stat).map(|d| &mut d.condition),
        ExprSlot::Inc(stat) => graph.do_data_mut(stat).map(|d| &mut d.inc),
    }
}

/// Moves the expressions out of `slot`, leaving it empty.
pub fn take_slot(graph: &mut StatementGraph, slot: ExprSlot) -> Vec<Exprent> {
    match slot {
        ExprSlot::Block(stat) => graph[stat].exprents.as_mut().map(std::mem::take).unwrap_or_default(),
        _ => single_slot(graph, slot).and_then(Option::take).into_iter().collect(),
    }
}

/// Stores `list` back into `slot`. Head slots hold at most one expression.
pub fn put_slot(graph: &mut StatementGraph, slot: ExprSlot, mut list: Vec<Exprent>) -> Result<()> {
    match slot {
        ExprSlot::Block(stat) => {
            graph[stat].exprents = Some(list);
            Ok(())
        }
        _ => {
            if list.len() > 1 {
                return Err(DecompileError::invariant(
                    "more than one expression in a head slot",
                    Some(slot_statement(slot)),
                    None,
                ));
            }
            let target = single_slot(graph, slot)
                .ok_or_else(|| DecompileError::invariant("slot does not match statement", Some(slot_statement(slot)), None))?;
            *target = list.pop();
            Ok(())
        }
    }
}

pub fn slot_statement(slot: ExprSlot) -> StatId {
    match slot {
        ExprSlot::Block(s) | ExprSlot::Head(s) | ExprSlot::Init(s) | ExprSlot::Condition(s) | ExprSlot::Inc(s) => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::VarType;
    use crate::decompile::stat_edge::StatEdge;

    fn root_with(g: &mut StatementGraph, body: StatId) -> (StatId, StatId) {
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        g[root].stats = vec![body];
        g[root].first = Some(body);
        g.set_all_parent(root);
        (root, exit)
    }

    #[test]
    fn sequence_falls_through_to_exit() {
        let mut g = StatementGraph::new(0);
        let a = g.add_empty_block();
        let b = g.add_empty_block();
        g[a].exprents = Some(vec![Exprent::var(1, VarType::Int)]);
        let seq = g.new_sequence(vec![a, b]);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let (root, _) = root_with(&mut g, seq);

        let dg = flatten(&g, root).unwrap();
        let na = dg.nodes.iter().find(|n| n.slot == Some(ExprSlot::Block(a))).unwrap().id;
        let nb = dg.nodes.iter().find(|n| n.slot == Some(ExprSlot::Block(b))).unwrap().id;
        assert_eq!(dg.first, na);
        assert_eq!(dg.nodes[na].succs, vec![nb]);
        assert_eq!(dg.nodes[nb].succs, vec![dg.exit]);
        assert_eq!(dg.expression_nodes(), vec![na, nb]);
    }

    #[test]
    fn while_loop_evaluates_condition_first() {
        let mut g = StatementGraph::new(0);
        let body = g.add_empty_block();
        let lp = g.new_do(body);
        g.do_data_mut(lp).unwrap().loop_type = LoopType::While;
        g.do_data_mut(lp).unwrap().condition = Some(Exprent::var(1, VarType::Boolean));
        g.add_successor(StatEdge::new(EdgeType::CONTINUE, body, lp, Some(lp)));
        let (root, exit) = root_with(&mut g, lp);
        g.add_successor(StatEdge::new(EdgeType::BREAK, lp, exit, Some(root)));

        let dg = flatten(&g, root).unwrap();
        let c = dg.first;
        assert_eq!(dg.nodes[c].kind, NodeKind::Condition);
        let nb = dg.nodes[c].succs[0];
        assert_eq!(dg.nodes[nb].slot, Some(ExprSlot::Block(body)));
        assert!(dg.nodes[c].succs.contains(&dg.exit));
        assert_eq!(dg.nodes[nb].succs, vec![c]);
    }

    #[test]
    fn head_slots_hold_one_expression() {
        let mut g = StatementGraph::new(0);
        let body = g.add_empty_block();
        let lp = g.new_do(body);
        let slot = ExprSlot::Condition(lp);
        put_slot(&mut g, slot, vec![Exprent::bool_const(true)]).unwrap();
        assert_eq!(slot_exprents(&g, slot).len(), 1);
        assert_eq!(take_slot(&mut g, slot).len(), 1);
        assert!(put_slot(&mut g, slot, vec![Exprent::bool_const(true), Exprent::bool_const(false)]).is_err());
    }
}
