//! Statement tree and the edge graph that links its nodes.
//!
//! Statements live in an arena owned by [`StatementGraph`] and refer to each
//! other by [`StatId`]. Edges live in a second arena; every statement keeps
//! its incoming and outgoing edges bucketed by type so that queries like
//! "all direct successors" are a slice lookup.

use std::collections::{HashMap, HashSet};
use std::ops::{Index, IndexMut};

use crate::code_attribute::opcodes;

use super::descriptor::VarType;
use super::error::{DecompileError, Result};
use super::exprs::Exprent;
use super::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use super::stats::{
    BasicBlockStat, CatchAllStat, CatchStat, DoStat, IfStat, IfType, LoopType, SwitchStat, SyncStat,
};

/// Index of a statement in the arena.
pub type StatId = usize;

/// How control leaves the last instruction of a basic block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LastBasicType {
    If,
    Switch,
    #[default]
    General,
}

#[derive(Clone, Debug)]
pub enum StatKind {
    BasicBlock(BasicBlockStat),
    Sequence,
    If(IfStat),
    Do(DoStat),
    Switch(SwitchStat),
    Trycatch(CatchStat),
    CatchAll(CatchAllStat),
    Synchronized(SyncStat),
    /// Unstructured region still waiting for reduction.
    General,
    /// A general region that was reduced to a single child.
    Placeholder,
    Root { dummy_exit: StatId },
    DummyExit,
}

/// Discriminant of [`StatKind`] for cheap comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatType {
    BasicBlock,
    Sequence,
    If,
    Do,
    Switch,
    Trycatch,
    CatchAll,
    Synchronized,
    General,
    Placeholder,
    Root,
    DummyExit,
}

impl StatKind {
    pub fn stat_type(&self) -> StatType {
        match self {
            StatKind::BasicBlock(_) => StatType::BasicBlock,
            StatKind::Sequence => StatType::Sequence,
            StatKind::If(_) => StatType::If,
            StatKind::Do(_) => StatType::Do,
            StatKind::Switch(_) => StatType::Switch,
            StatKind::Trycatch(_) => StatType::Trycatch,
            StatKind::CatchAll(_) => StatType::CatchAll,
            StatKind::Synchronized(_) => StatType::Synchronized,
            StatKind::General => StatType::General,
            StatKind::Placeholder => StatType::Placeholder,
            StatKind::Root { .. } => StatType::Root,
            StatKind::DummyExit => StatType::DummyExit,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct EdgeIndex {
    buckets: [Vec<EdgeId>; 7],
}

impl EdgeIndex {
    fn add(&mut self, edge_type: EdgeType, edge: EdgeId) {
        for bucket in edge_type.buckets() {
            self.buckets[bucket.bucket_index()].push(edge);
        }
    }

    fn remove(&mut self, edge_type: EdgeType, edge: EdgeId) -> bool {
        let mut found = false;
        for bucket in edge_type.buckets() {
            let list = &mut self.buckets[bucket.bucket_index()];
            if let Some(pos) = list.iter().position(|&e| e == edge) {
                list.remove(pos);
                found = true;
            }
        }
        found
    }

    fn retype(&mut self, old: EdgeType, new: EdgeType, edge: EdgeId) {
        let list = &mut self.buckets[old.bucket_index()];
        if let Some(pos) = list.iter().position(|&e| e == edge) {
            list.remove(pos);
            self.buckets[new.bucket_index()].push(edge);
        }
    }

    fn get(&self, types: EdgeType) -> Vec<EdgeId> {
        if types.is_single() {
            return self.buckets[types.bucket_index()].clone();
        }
        let mut out = Vec::new();
        for t in EdgeType::TYPES {
            if types.contains(t) {
                out.extend_from_slice(&self.buckets[t.bucket_index()]);
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct Statement {
    pub id: StatId,
    pub kind: StatKind,
    pub parent: Option<StatId>,
    pub first: Option<StatId>,
    /// Children in source order.
    pub stats: Vec<StatId>,
    /// Statement control reaches after this one, while structuring.
    pub post: Option<StatId>,
    pub exprents: Option<Vec<Exprent>>,
    pub var_definitions: Vec<Exprent>,
    /// Edges whose closure is this statement.
    pub label_edges: Vec<EdgeId>,
    pub continue_set: HashSet<StatId>,
    pub last_basic_type: LastBasicType,
    pub is_monitor_enter: bool,
    pub contains_monitor_exit: bool,
    /// Created by node splitting.
    pub copied: bool,
    succs: EdgeIndex,
    preds: EdgeIndex,
}

impl Statement {
    fn new(id: StatId, kind: StatKind) -> Self {
        Statement {
            id,
            kind,
            parent: None,
            first: None,
            stats: Vec::new(),
            post: None,
            exprents: None,
            var_definitions: Vec::new(),
            label_edges: Vec::new(),
            continue_set: HashSet::new(),
            last_basic_type: LastBasicType::General,
            is_monitor_enter: false,
            contains_monitor_exit: false,
            copied: false,
            succs: EdgeIndex::default(),
            preds: EdgeIndex::default(),
        }
    }

    pub fn stat_type(&self) -> StatType {
        self.kind.stat_type()
    }
}

/// Arena of statements and edges for one method.
#[derive(Clone, Debug, Default)]
pub struct StatementGraph {
    stats: Vec<Statement>,
    edges: Vec<StatEdge>,
    /// Root statement once the tree has been built.
    pub root: Option<StatId>,
    var_counter: u32,
}

impl Index<StatId> for StatementGraph {
    type Output = Statement;

    fn index(&self, id: StatId) -> &Statement {
        &self.stats[id]
    }
}

impl IndexMut<StatId> for StatementGraph {
    fn index_mut(&mut self, id: StatId) -> &mut Statement {
        &mut self.stats[id]
    }
}

impl StatementGraph {
    /// Creates an empty arena. Synthetic variables are numbered from
    /// `first_free_var` upwards.
    pub fn new(first_free_var: u32) -> Self {
        StatementGraph {
            var_counter: first_free_var,
            ..StatementGraph::default()
        }
    }

    pub fn next_var_index(&mut self) -> u32 {
        let index = self.var_counter;
        self.var_counter += 1;
        index
    }

    pub fn var_counter(&self) -> u32 {
        self.var_counter
    }

    pub fn add_statement(&mut self, kind: StatKind) -> StatId {
        let id = self.stats.len();
        self.stats.push(Statement::new(id, kind));
        id
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn stat_type(&self, id: StatId) -> StatType {
        self.stats[id].stat_type()
    }

    pub fn root(&self) -> Result<StatId> {
        self.root
            .ok_or_else(|| DecompileError::invariant("statement tree has no root", None, None))
    }

    pub fn first(&self, id: StatId) -> Result<StatId> {
        self.stats[id]
            .first
            .ok_or_else(|| DecompileError::invariant("statement has no first child", Some(id), None))
    }

    pub fn dummy_exit(&self) -> Option<StatId> {
        let root = self.root?;
        match self.stats[root].kind {
            StatKind::Root { dummy_exit } => Some(dummy_exit),
            _ => None,
        }
    }

    pub fn edge(&self, id: EdgeId) -> &StatEdge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut StatEdge {
        &mut self.edges[id]
    }

    /// Every live edge id, for whole-graph checks.
    pub fn live_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).filter(move |&e| !self.edges[e].removed)
    }

    // ---- edge registration ----

    /// Stores a new edge and registers it with both endpoints and its
    /// closure.
    pub fn add_successor(&mut self, edge: StatEdge) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(edge);
        self.attach_successor(id);
        id
    }

    /// Registers an existing edge with its current endpoints.
    pub fn attach_successor(&mut self, id: EdgeId) {
        let (edge_type, source, destination, closure) = {
            let e = &mut self.edges[id];
            e.removed = false;
            (e.edge_type, e.source, e.destination, e.closure)
        };
        self.stats[source].succs.add(edge_type, id);
        if let Some(closure) = closure {
            if !self.stats[closure].label_edges.contains(&id) {
                self.stats[closure].label_edges.push(id);
            }
        }
        self.stats[destination].preds.add(edge_type, id);
    }

    /// Detaches an edge from its source, destination and closure.
    pub fn remove_successor(&mut self, id: EdgeId) {
        let (edge_type, source, destination, closure) = {
            let e = &self.edges[id];
            (e.edge_type, e.source, e.destination, e.closure)
        };
        self.stats[source].succs.remove(edge_type, id);
        if let Some(closure) = closure {
            self.stats[closure].label_edges.retain(|&e| e != id);
        }
        self.stats[destination].preds.remove(edge_type, id);
        self.edges[id].removed = true;
    }

    pub fn remove_all_successors(&mut self, stat: StatId, dest: StatId) {
        for e in self.stats[stat].succs.get(EdgeType::ALL) {
            if self.edges[e].destination == dest {
                self.remove_successor(e);
            }
        }
    }

    /// Adds `id` to `stat`'s predecessor buckets without touching the
    /// source side.
    pub fn add_predecessor(&mut self, stat: StatId, id: EdgeId) {
        let t = self.edges[id].edge_type;
        self.stats[stat].preds.add(t, id);
    }

    pub fn remove_predecessor(&mut self, stat: StatId, id: EdgeId) {
        let t = self.edges[id].edge_type;
        self.stats[stat].preds.remove(t, id);
    }

    /// Moves an edge endpoint. `Forward` replaces the destination,
    /// `Backward` the source. Bucket registration is left to the caller.
    pub fn change_edge_node(&mut self, direction: Direction, id: EdgeId, value: StatId) {
        match direction {
            Direction::Forward => self.edges[id].destination = value,
            Direction::Backward => self.edges[id].source = value,
        }
    }

    /// Retypes an edge on both endpoints. Exception edges cannot be
    /// retyped and cannot be created this way.
    pub fn change_edge_type(&mut self, id: EdgeId, new_type: EdgeType) -> Result<()> {
        let old = self.edges[id].edge_type;
        if old == new_type {
            return Ok(());
        }
        if old == EdgeType::EXCEPTION || new_type == EdgeType::EXCEPTION {
            return Err(DecompileError::invariant(
                "exception edges cannot change type",
                Some(self.edges[id].source),
                Some(id),
            ));
        }
        let (source, destination) = (self.edges[id].source, self.edges[id].destination);
        self.stats[source].succs.retype(old, new_type, id);
        self.stats[destination].preds.retype(old, new_type, id);
        self.edges[id].edge_type = new_type;
        Ok(())
    }

    pub fn remove_from_closure(&mut self, id: EdgeId) {
        if let Some(closure) = self.edges[id].closure.take() {
            self.stats[closure].label_edges.retain(|&e| e != id);
        }
    }

    /// Makes `closure` the label owner of `id`.
    pub fn add_labeled_edge(&mut self, closure: StatId, id: EdgeId) {
        self.remove_from_closure(id);
        self.edges[id].closure = Some(closure);
        if !self.stats[closure].label_edges.contains(&id) {
            self.stats[closure].label_edges.push(id);
        }
    }

    // ---- queries ----

    pub fn edges_of(&self, stat: StatId, types: EdgeType, direction: Direction) -> Vec<EdgeId> {
        match direction {
            Direction::Forward => self.stats[stat].succs.get(types),
            Direction::Backward => self.stats[stat].preds.get(types),
        }
    }

    pub fn successor_edges(&self, stat: StatId, types: EdgeType) -> Vec<EdgeId> {
        self.stats[stat].succs.get(types)
    }

    pub fn predecessor_edges(&self, stat: StatId, types: EdgeType) -> Vec<EdgeId> {
        self.stats[stat].preds.get(types)
    }

    pub fn all_successor_edges(&self, stat: StatId) -> Vec<EdgeId> {
        self.successor_edges(stat, EdgeType::ALL)
    }

    pub fn all_predecessor_edges(&self, stat: StatId) -> Vec<EdgeId> {
        self.predecessor_edges(stat, EdgeType::ALL)
    }

    /// First direct successor edge, the one most passes care about.
    pub fn first_successor(&self, stat: StatId, types: EdgeType) -> Option<EdgeId> {
        let bucket = &self.stats[stat].succs;
        if types.is_single() {
            bucket.buckets[types.bucket_index()].first().copied()
        } else {
            bucket.get(types).first().copied()
        }
    }

    pub fn neighbours(&self, stat: StatId, types: EdgeType, direction: Direction) -> Vec<StatId> {
        self.edges_of(stat, types, direction)
            .into_iter()
            .map(|e| match direction {
                Direction::Forward => self.edges[e].destination,
                Direction::Backward => self.edges[e].source,
            })
            .collect()
    }

    pub fn neighbours_set(&self, stat: StatId, types: EdgeType, direction: Direction) -> HashSet<StatId> {
        self.neighbours(stat, types, direction).into_iter().collect()
    }

    pub fn has_any_direct_successor(&self, stat: StatId) -> bool {
        !self.stats[stat].succs.buckets[EdgeType::DIRECT_ALL.bucket_index()].is_empty()
    }

    pub fn is_labeled(&self, stat: StatId) -> bool {
        self.stats[stat]
            .label_edges
            .iter()
            .any(|&e| self.edges[e].labeled && self.edges[e].explicit)
    }

    /// A statement whose fall-through has to be rendered as an explicit
    /// jump.
    pub fn has_basic_succ_edge(&self, stat: StatId) -> bool {
        match &self.stats[stat].kind {
            StatKind::BasicBlock(_) => true,
            StatKind::If(i) => i.if_type == IfType::If,
            StatKind::Do(d) => d.loop_type != LoopType::Do,
            _ => false,
        }
    }

    /// Innermost first basic block.
    pub fn basichead(&self, stat: StatId) -> StatId {
        let mut current = stat;
        while self.stats[current].stat_type() != StatType::BasicBlock {
            match self.stats[current].first {
                Some(first) => current = first,
                None => break,
            }
        }
        current
    }

    /// Whether `inner` is `stat` or nested anywhere below it.
    pub fn contains_statement(&self, stat: StatId, inner: StatId) -> bool {
        stat == inner || self.contains_statement_strict(stat, inner)
    }

    pub fn contains_statement_strict(&self, stat: StatId, inner: StatId) -> bool {
        let mut stack: Vec<StatId> = self.stats[stat].stats.clone();
        while let Some(s) = stack.pop() {
            if s == inner {
                return true;
            }
            stack.extend_from_slice(&self.stats[s].stats);
        }
        false
    }

    pub fn set_all_parent(&mut self, stat: StatId) {
        for child in self.stats[stat].stats.clone() {
            self.stats[child].parent = Some(stat);
        }
    }

    /// Nearest enclosing statement of the given type, starting at `stat`
    /// itself.
    pub fn enclosing(&self, stat: StatId, stat_type: StatType) -> Option<StatId> {
        let mut current = Some(stat);
        while let Some(s) = current {
            if self.stats[s].stat_type() == stat_type {
                return Some(s);
            }
            current = self.stats[s].parent;
        }
        None
    }

    /// Reverse post order of the nodes reachable from `start` over regular
    /// and exception edges.
    pub fn reverse_postorder(&self, start: StatId) -> Vec<StatId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(StatId, usize)> = vec![(start, 0)];
        visited.insert(start);
        while let Some(&mut (node, ref mut index)) = stack.last_mut() {
            let succs = self.stats[node].succs.get(EdgeType::ALL);
            let mut next = None;
            while *index < succs.len() {
                let e = &self.edges[succs[*index]];
                *index += 1;
                if (e.edge_type == EdgeType::REGULAR || e.edge_type == EdgeType::EXCEPTION)
                    && !visited.contains(&e.destination)
                {
                    next = Some(e.destination);
                    break;
                }
            }
            match next {
                Some(succ) => {
                    visited.insert(succ);
                    stack.push((succ, 0));
                }
                None => {
                    order.push(node);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }

    /// Reverse post order of the reversed graph, walked from `exits`.
    pub fn post_reverse_postorder(&self, exits: &[StatId]) -> Vec<StatId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        for &exit in exits {
            if visited.contains(&exit) {
                continue;
            }
            visited.insert(exit);
            let mut stack: Vec<(StatId, usize)> = vec![(exit, 0)];
            while let Some(&mut (node, ref mut index)) = stack.last_mut() {
                let preds = self.predecessor_edges(node, EdgeType::REGULAR | EdgeType::EXCEPTION);
                let mut next = None;
                while *index < preds.len() {
                    let pred = self.edges[preds[*index]].source;
                    *index += 1;
                    if !visited.contains(&pred) {
                        next = Some(pred);
                        break;
                    }
                }
                match next {
                    Some(pred) => {
                        visited.insert(pred);
                        stack.push((pred, 0));
                    }
                    None => {
                        order.push(node);
                        stack.pop();
                    }
                }
            }
        }
        order.reverse();
        order
    }

    // ---- structural surgery ----

    /// Puts `new` in place of `old` inside `parent`, moving every edge of
    /// `old` over.
    pub fn replace_statement(&mut self, parent: StatId, old: StatId, new: StatId) {
        for e in self.all_predecessor_edges(old) {
            self.remove_predecessor(old, e);
            self.change_edge_node(Direction::Forward, e, new);
            self.add_predecessor(new, e);
        }
        for e in self.all_successor_edges(old) {
            self.remove_successor(e);
            self.change_edge_node(Direction::Backward, e, new);
            self.attach_successor(e);
        }
        if let Some(pos) = self.stats[parent].stats.iter().position(|&s| s == old) {
            self.stats[parent].stats[pos] = new;
        }
        self.stats[new].parent = Some(parent);
        self.stats[new].post = self.stats[old].post;
        if self.stats[parent].first == Some(old) {
            self.stats[parent].first = Some(new);
        }

        let labels = std::mem::take(&mut self.stats[old].label_edges);
        for &e in labels.iter().rev() {
            self.edges[e].closure = None;
            let (source, dest) = (self.edges[e].source, self.edges[e].destination);
            if source != new {
                self.add_labeled_edge(new, e);
            } else if dest != parent && !self.contains_statement_strict(parent, dest) {
                self.add_labeled_edge(parent, e);
            }
        }
    }

    /// Folds the children of the freshly built `stat` out of `parent`.
    /// Internal edges into the head become continues, internal edges to
    /// the post become breaks, and common handlers move to `stat`.
    pub fn collapse_nodes_to_statement(&mut self, parent: StatId, stat: StatId) -> Result<()> {
        let head = self.first(stat)?;
        let post = self.stats[stat].post;
        let nodes: HashSet<StatId> = self.stats[stat].stats.iter().copied().collect();

        if let Some(post) = post {
            for e in self.predecessor_edges(post, EdgeType::DIRECT_ALL) {
                let source = self.edges[e].source;
                if self.contains_statement_strict(stat, source) {
                    self.change_edge_type(e, EdgeType::BREAK)?;
                    self.add_labeled_edge(stat, e);
                }
            }
        }

        for e in self.all_predecessor_edges(head) {
            let source = self.edges[e].source;
            if self.edges[e].edge_type != EdgeType::EXCEPTION
                && self.contains_statement_strict(stat, source)
            {
                self.change_edge_type(e, EdgeType::CONTINUE)?;
                self.add_labeled_edge(stat, e);
            }
            self.remove_predecessor(head, e);
            self.change_edge_node(Direction::Forward, e, stat);
            self.add_predecessor(stat, e);
        }

        if let Some(first) = self.stats[parent].first {
            if nodes.contains(&first) {
                self.stats[parent].first = Some(stat);
            }
        }

        let mut handlers: HashSet<StatId> =
            self.neighbours_set(head, EdgeType::EXCEPTION, Direction::Forward);
        for &node in &nodes {
            let own = self.neighbours_set(node, EdgeType::EXCEPTION, Direction::Forward);
            handlers.retain(|h| own.contains(h));
        }
        if !handlers.is_empty() {
            for e in self.successor_edges(head, EdgeType::EXCEPTION) {
                let handler = self.edges[e].destination;
                if handlers.contains(&handler) && !nodes.contains(&handler) {
                    let exceptions = self.edges[e].exceptions.clone();
                    self.add_successor(StatEdge::exception(stat, handler, exceptions));
                }
            }
            for &node in &nodes {
                for e in self.successor_edges(node, EdgeType::EXCEPTION) {
                    if handlers.contains(&self.edges[e].destination) {
                        self.remove_successor(e);
                    }
                }
            }
        }

        if let Some(post) = post {
            if !self
                .neighbours(stat, EdgeType::EXCEPTION, Direction::Forward)
                .contains(&post)
            {
                self.add_successor(StatEdge::new(EdgeType::REGULAR, stat, post, None));
            }
        }

        self.stats[parent].stats.retain(|s| !nodes.contains(s));
        self.stats[parent].stats.push(stat);
        self.set_all_parent(stat);
        self.stats[stat].parent = Some(parent);

        self.build_continue_set(stat);
        self.build_monitor_flags(stat);
        if self.stat_type(stat) == StatType::Switch {
            self.sort_switch_edges_and_nodes(stat)?;
        }
        Ok(())
    }

    /// Basic heads reached by continue edges from inside `stat`, excluding
    /// loops that absorb them.
    pub fn build_continue_set(&mut self, stat: StatId) -> HashSet<StatId> {
        let mut set = HashSet::new();
        let first = self.stats[stat].first;
        for child in self.stats[stat].stats.clone() {
            set.extend(self.build_continue_set(child));
            if Some(child) != first {
                set.remove(&self.basichead(child));
            }
        }
        for e in self.successor_edges(stat, EdgeType::CONTINUE) {
            set.insert(self.basichead(self.edges[e].destination));
        }
        if self.stat_type(stat) == StatType::Do {
            if let Some(first) = first {
                set.remove(&self.basichead(first));
            }
        }
        self.stats[stat].continue_set = set.clone();
        set
    }

    pub fn build_monitor_flags(&mut self, stat: StatId) {
        for child in self.stats[stat].stats.clone() {
            self.build_monitor_flags(child);
        }
        let children_exit = |g: &Self| g.stats[stat].stats.iter().any(|&c| g.stats[c].contains_monitor_exit);
        match &self.stats[stat].kind {
            StatKind::BasicBlock(bb) => {
                if let Some(last) = bb.seq.last() {
                    let exit = bb.seq.iter().any(|i| i.opcode == opcodes::MONITOREXIT);
                    let enter = last.opcode == opcodes::MONITORENTER;
                    let s = &mut self.stats[stat];
                    s.contains_monitor_exit |= exit;
                    s.is_monitor_enter = enter;
                }
            }
            StatKind::Synchronized(_) | StatKind::Root { .. } | StatKind::General => {}
            _ => {
                let exit = children_exit(self);
                self.stats[stat].contains_monitor_exit = exit;
            }
        }
    }

    /// Statements and expression lists of `stat` in source order, used by
    /// the passes that walk expressions structurally.
    pub fn sequential_objects(&self, stat: StatId) -> Vec<SeqObject> {
        let s = &self.stats[stat];
        let mut out = Vec::new();
        match &s.kind {
            StatKind::If(_) | StatKind::Switch(_) | StatKind::Synchronized(_) => {
                if let Some(&head) = s.stats.first() {
                    out.push(SeqObject::Stat(head));
                }
                out.push(SeqObject::Head(stat));
                out.extend(s.stats.iter().skip(1).map(|&c| SeqObject::Stat(c)));
            }
            StatKind::Do(d) => {
                if d.init.is_some() {
                    out.push(SeqObject::Init(stat));
                }
                if d.loop_type == LoopType::While
                    || d.loop_type == LoopType::For
                {
                    out.push(SeqObject::Head(stat));
                }
                out.extend(s.stats.iter().map(|&c| SeqObject::Stat(c)));
                if d.loop_type == LoopType::DoWhile {
                    out.push(SeqObject::Head(stat));
                }
                if d.inc.is_some() {
                    out.push(SeqObject::Inc(stat));
                }
            }
            _ => {
                if s.exprents.is_some() {
                    out.push(SeqObject::Body(stat));
                } else {
                    out.extend(s.stats.iter().map(|&c| SeqObject::Stat(c)));
                }
            }
        }
        out
    }

    /// Expressions held by `stat` outside its children: the body of a
    /// basic block, or the head expression of a compound statement.
    pub fn own_exprents(&self, stat: StatId) -> Vec<&Exprent> {
        let s = &self.stats[stat];
        if let Some(list) = &s.exprents {
            return list.iter().collect();
        }
        match &s.kind {
            StatKind::If(i) => i.head_exprent.iter().collect(),
            StatKind::Switch(sw) => sw.head_exprent.iter().collect(),
            StatKind::Synchronized(sy) => sy.head_exprent.iter().collect(),
            StatKind::Do(d) => d.init.iter().chain(d.condition.iter()).chain(d.inc.iter()).collect(),
            StatKind::Trycatch(c) => c.vars.iter().collect(),
            StatKind::CatchAll(c) => c.vars.iter().chain(c.monitor.iter()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn own_exprents_mut(&mut self, stat: StatId) -> Vec<&mut Exprent> {
        let s = &mut self.stats[stat];
        if let Some(list) = &mut s.exprents {
            return list.iter_mut().collect();
        }
        match &mut s.kind {
            StatKind::If(i) => i.head_exprent.iter_mut().collect(),
            StatKind::Switch(sw) => sw.head_exprent.iter_mut().collect(),
            StatKind::Synchronized(sy) => sy.head_exprent.iter_mut().collect(),
            StatKind::Do(d) => d
                .init
                .iter_mut()
                .chain(d.condition.iter_mut())
                .chain(d.inc.iter_mut())
                .collect(),
            StatKind::Trycatch(c) => c.vars.iter_mut().collect(),
            StatKind::CatchAll(c) => c.vars.iter_mut().chain(c.monitor.iter_mut()).collect(),
            _ => Vec::new(),
        }
    }

    /// Every statement of the subtree rooted at `stat`, parents first.
    pub fn subtree(&self, stat: StatId) -> Vec<StatId> {
        let mut out = Vec::new();
        let mut stack = vec![stat];
        while let Some(s) = stack.pop() {
            out.push(s);
            stack.extend(self.stats[s].stats.iter().rev());
        }
        out
    }

    /// Copies `stat` without children or edges, for node splitting.
    pub fn simple_copy(&mut self, stat: StatId) -> Result<StatId> {
        let kind = match &self.stats[stat].kind {
            StatKind::BasicBlock(bb) => StatKind::BasicBlock(BasicBlockStat {
                block_id: None,
                seq: bb.seq.clone(),
            }),
            StatKind::Sequence => StatKind::Sequence,
            StatKind::If(i) => StatKind::If(IfStat {
                if_type: i.if_type,
                negated: i.negated,
                ..IfStat::default()
            }),
            StatKind::Do(d) => StatKind::Do(DoStat {
                loop_type: d.loop_type,
                ..DoStat::default()
            }),
            StatKind::Switch(_) => StatKind::Switch(SwitchStat::default()),
            StatKind::Trycatch(c) => {
                let types = c.exception_types.clone();
                let var_types: Vec<_> = c.vars.iter().map(|v| v.expr_type()).collect();
                let mut vars = Vec::new();
                for ty in var_types {
                    vars.push(Exprent::var(self.next_var_index(), ty));
                }
                StatKind::Trycatch(CatchStat {
                    exception_types: types,
                    vars,
                })
            }
            StatKind::CatchAll(c) => {
                let is_finally = c.is_finally;
                let has_monitor = c.monitor.is_some();
                let var_types: Vec<_> = c.vars.iter().map(|v| v.expr_type()).collect();
                let mut vars = Vec::new();
                for ty in var_types {
                    vars.push(Exprent::var(self.next_var_index(), ty));
                }
                let monitor = if has_monitor {
                    Some(Exprent::var(self.next_var_index(), VarType::Int))
                } else {
                    None
                };
                StatKind::CatchAll(CatchAllStat {
                    is_finally,
                    monitor,
                    vars,
                    ..CatchAllStat::default()
                })
            }
            StatKind::Synchronized(_) => StatKind::Synchronized(SyncStat::default()),
            _ => {
                return Err(DecompileError::invariant(
                    "statement kind cannot be copied",
                    Some(stat),
                    None,
                ))
            }
        };
        let copy = self.add_statement(kind);
        self.stats[copy].last_basic_type = self.stats[stat].last_basic_type;
        Ok(copy)
    }

    /// Restores the child links of a copy once its children and edges are
    /// in place.
    pub fn init_simple_copy(&mut self, stat: StatId) -> Result<()> {
        let first = self.stats[stat].stats.first().copied();
        self.stats[stat].first = first;
        match self.stat_type(stat) {
            StatType::If => {
                let head = self.first(stat)?;
                let succs = self.successor_edges(head, EdgeType::DIRECT_ALL);
                let stats = self.stats[stat].stats.clone();
                if let StatKind::If(i) = &mut self.stats[stat].kind {
                    let pick = if i.if_type == IfType::If || i.negated { 0 } else { 1 };
                    i.if_edge = succs.get(pick).copied();
                    i.if_stat = stats.get(1).copied();
                    if i.if_type == IfType::IfElse {
                        i.else_edge = succs.get(if i.negated { 1 } else { 0 }).copied();
                        i.else_stat = stats.get(2).copied();
                    }
                }
            }
            StatType::Switch => {
                let head = self.first(stat)?;
                let default = self.first_successor(head, EdgeType::DIRECT_ALL);
                if let StatKind::Switch(sw) = &mut self.stats[stat].kind {
                    sw.default_edge = default;
                }
                self.sort_switch_edges_and_nodes(stat)?;
            }
            StatType::CatchAll => {
                let handler = self.stats[stat].stats.get(1).copied();
                if let StatKind::CatchAll(c) = &mut self.stats[stat].kind {
                    c.handler = handler;
                }
            }
            StatType::Synchronized => {
                let body = self.stats[stat].stats.get(1).copied();
                let handler = self.stats[stat].stats.get(2).copied();
                if let StatKind::Synchronized(s) = &mut self.stats[stat].kind {
                    s.body = body;
                    s.handler = handler;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Checks edge symmetry: every registered edge is listed by both of its
    /// endpoints, and every closure lists the edges that name it.
    pub fn verify_edges(&self) -> Result<()> {
        let mut listed: HashMap<EdgeId, (bool, bool)> = HashMap::new();
        for s in &self.stats {
            for e in s.succs.get(EdgeType::ALL) {
                if self.edges[e].source != s.id {
                    return Err(DecompileError::invariant("edge listed by wrong source", Some(s.id), Some(e)));
                }
                listed.entry(e).or_default().0 = true;
            }
            for e in s.preds.get(EdgeType::ALL) {
                if self.edges[e].destination != s.id {
                    return Err(DecompileError::invariant(
                        "edge listed by wrong destination",
                        Some(s.id),
                        Some(e),
                    ));
                }
                listed.entry(e).or_default().1 = true;
            }
            for &e in &s.label_edges {
                if self.edges[e].closure != Some(s.id) {
                    return Err(DecompileError::invariant("stale label edge", Some(s.id), Some(e)));
                }
            }
        }
        for (e, (out, inc)) in listed {
            if out != inc {
                return Err(DecompileError::invariant("edge registered on one side only", None, Some(e)));
            }
        }
        Ok(())
    }
}

/// One item of [`StatementGraph::sequential_objects`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqObject {
    Stat(StatId),
    /// Expression list of a basic block.
    Body(StatId),
    /// Head expression of an if, switch, synchronized or loop condition.
    Head(StatId),
    Init(StatId),
    Inc(StatId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::InstructionSequence;

    fn block(graph: &mut StatementGraph) -> StatId {
        graph.add_statement(StatKind::BasicBlock(BasicBlockStat::new(None, InstructionSequence::default())))
    }

    #[test]
    fn edges_are_bucketed_by_type() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g);
        let b = block(&mut g);
        let c = block(&mut g);
        let r = g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let x = g.add_successor(StatEdge::exception(a, c, None));

        assert_eq!(g.successor_edges(a, EdgeType::DIRECT_ALL), vec![r]);
        assert_eq!(g.successor_edges(a, EdgeType::ALL), vec![r, x]);
        assert_eq!(g.neighbours(c, EdgeType::EXCEPTION, Direction::Backward), vec![a]);
        g.verify_edges().unwrap();
    }

    #[test]
    fn retyping_exception_edges_fails() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g);
        let b = block(&mut g);
        let x = g.add_successor(StatEdge::exception(a, b, None));
        assert!(matches!(
            g.change_edge_type(x, EdgeType::BREAK),
            Err(DecompileError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn retyping_moves_buckets_on_both_sides() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g);
        let b = block(&mut g);
        let e = g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.change_edge_type(e, EdgeType::BREAK).unwrap();
        assert!(g.successor_edges(a, EdgeType::REGULAR).is_empty());
        assert_eq!(g.predecessor_edges(b, EdgeType::BREAK), vec![e]);
        assert_eq!(g.predecessor_edges(b, EdgeType::DIRECT_ALL), vec![e]);
    }

    #[test]
    fn removing_clears_closure() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g);
        let b = block(&mut g);
        let seq = g.add_statement(StatKind::Sequence);
        let e = g.add_successor(StatEdge::new(EdgeType::BREAK, a, b, Some(seq)));
        assert_eq!(g[seq].label_edges, vec![e]);
        g.remove_successor(e);
        assert!(g[seq].label_edges.is_empty());
        assert!(g.edge(e).removed);
        g.verify_edges().unwrap();
    }

    #[test]
    fn reverse_postorder_follows_regular_edges() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g);
        let b = block(&mut g);
        let c = block(&mut g);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, c, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, c, None));
        assert_eq!(g.reverse_postorder(a), vec![a, b, c]);
        assert_eq!(g.post_reverse_postorder(&[c]), vec![c, b, a]);
    }
}
