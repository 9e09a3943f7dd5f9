//! Dominance information over the children of a general region: plain
//! postdominators, an immediate-dominator engine, the exception-range
//! filter, and the extended postdominators the general-region search uses
//! to pick region boundaries.

use std::collections::{HashMap, HashSet, VecDeque};

use super::fast_set::{FastFixedSet, FastFixedSetFactory};
use super::stat_edge::{Direction, EdgeType};
use super::statement::{StatId, StatementGraph};
use super::strong_connectivity;

/// Extended postdominators, keyed by head.
pub type ExtPostdomMap = HashMap<StatId, HashSet<StatId>>;

/// Postdominator lists for every child of `container`, in post reverse
/// post order. Each list is sorted by the forward order of the region with
/// the node itself moved to the back.
pub fn calc_post_dominators(graph: &StatementGraph, container: StatId) -> Vec<(StatId, Vec<StatId>)> {
    let components = strong_connectivity::components(graph, container);
    let exits = strong_connectivity::exit_reps(graph, &components);
    let order = graph.post_reverse_postorder(&exits);

    let factory = FastFixedSetFactory::new(order.iter().copied());
    let mut flags = factory.spawn_full_set();
    let mut lists: HashMap<StatId, FastFixedSet<StatId>> = HashMap::new();
    for component in &components {
        let set = if strong_connectivity::is_exit_component(graph, component) {
            let mut set = factory.spawn_empty_set();
            set.add_all(component.iter().copied());
            set
        } else {
            factory.spawn_full_set()
        };
        for &stat in component {
            lists.insert(stat, set.clone());
        }
    }

    while !flags.is_empty() {
        for &stat in &order {
            if !flags.contains(&stat) {
                continue;
            }
            flags.remove(&stat);

            let mut doms_succs = factory.spawn_empty_set();
            let succs = graph.neighbours(stat, EdgeType::REGULAR, Direction::Forward);
            let mut first = true;
            for succ in succs {
                let Some(succ_set) = lists.get(&succ) else {
                    continue;
                };
                if first {
                    doms_succs.union(succ_set);
                    first = false;
                } else {
                    doms_succs.intersection(succ_set);
                }
            }
            doms_succs.add(stat);

            if lists.get(&stat) != Some(&doms_succs) {
                lists.insert(stat, doms_succs);
                for pred in graph.neighbours(stat, EdgeType::REGULAR, Direction::Backward) {
                    flags.add(pred);
                }
            }
        }
    }

    let first = graph[container].first;
    let sort_order: HashMap<StatId, usize> = first
        .map(|f| graph.reverse_postorder(f))
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, s)| (s, i))
        .collect();

    order
        .iter()
        .map(|&stat| {
            let mut posts = lists.get(&stat).map(|s| s.to_vec()).unwrap_or_default();
            posts.sort_by_key(|p| sort_order.get(p).copied().unwrap_or(usize::MAX));
            if posts.len() > 1 && posts[0] == stat {
                posts.remove(0);
                posts.push(stat);
            }
            (stat, posts)
        })
        .collect()
}

/// Immediate dominators of the children of one statement, computed with the
/// iterative intersect-by-order scheme.
#[derive(Debug)]
pub struct DominatorEngine {
    order: Vec<StatId>,
    index: HashMap<StatId, usize>,
    idoms: HashMap<StatId, StatId>,
}

impl DominatorEngine {
    pub fn new(graph: &StatementGraph, container: StatId) -> Self {
        let order = graph[container]
            .first
            .map(|f| graph.reverse_postorder(f))
            .unwrap_or_default();
        let index: HashMap<StatId, usize> = order.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        let mut engine = DominatorEngine {
            order,
            index,
            idoms: HashMap::new(),
        };
        engine.calc_idoms(graph);
        engine
    }

    fn calc_idoms(&mut self, graph: &StatementGraph) {
        let Some(&first) = self.order.first() else {
            return;
        };
        self.idoms.insert(first, first);

        loop {
            let mut changed = false;
            for &stat in &self.order[1..] {
                let mut idom: Option<StatId> = None;
                for pred in graph.neighbours(stat, EdgeType::ALL, Direction::Backward) {
                    if self.idoms.contains_key(&pred) {
                        idom = Some(match idom {
                            None => pred,
                            Some(current) => self.common_idom(current, pred),
                        });
                    }
                }
                if let Some(idom) = idom {
                    if self.idoms.insert(stat, idom) != Some(idom) {
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn common_idom(&self, mut a: StatId, mut b: StatId) -> StatId {
        while a != b {
            let (ia, ib) = (self.index[&a], self.index[&b]);
            if ia > ib {
                a = self.idoms[&a];
            } else {
                b = self.idoms[&b];
            }
        }
        a
    }

    /// Forward order the engine was built from.
    pub fn order(&self) -> &[StatId] {
        &self.order
    }

    pub fn idom(&self, stat: StatId) -> Option<StatId> {
        self.idoms.get(&stat).copied()
    }

    /// Whether `dom` dominates `node`. Unreachable nodes are dominated by
    /// nothing but themselves.
    pub fn is_dominator(&self, mut node: StatId, dom: StatId) -> bool {
        while node != dom {
            match self.idoms.get(&node) {
                Some(&next) if next != node => node = next,
                _ => return false,
            }
        }
        true
    }
}

/// Which statement a region headed at `head` must leave through so that no
/// exception range is cut in half.
#[derive(Debug)]
pub struct DominatorTreeExceptionFilter {
    engine: DominatorEngine,
    /// handler -> statement whose dominator subtree holds the whole range
    exception_doms: HashMap<StatId, StatId>,
    /// statement -> handler -> required exit, `None` when no exit works
    filter: HashMap<StatId, HashMap<StatId, Option<StatId>>>,
}

impl DominatorTreeExceptionFilter {
    pub fn new(graph: &mut StatementGraph, container: StatId) -> Self {
        graph.build_monitor_flags(container);
        let graph: &StatementGraph = graph;
        let engine = DominatorEngine::new(graph, container);

        let mut tree: HashMap<StatId, Vec<StatId>> = HashMap::new();
        for &stat in engine.order().iter().rev() {
            if let Some(idom) = engine.idom(stat) {
                if idom != stat {
                    tree.entry(idom).or_default().push(stat);
                }
            }
        }
        for children in tree.values_mut() {
            children.sort_by_key(|c| engine.index.get(c).copied().unwrap_or(usize::MAX));
        }

        let mut ranges: Vec<(StatId, HashSet<StatId>)> = Vec::new();
        for &stat in &graph[container].stats {
            let preds = graph.neighbours_set(stat, EdgeType::EXCEPTION, Direction::Backward);
            if !preds.is_empty() {
                ranges.push((stat, preds));
            }
        }

        // children before parents
        let mut bottom_up = Vec::new();
        if let Some(&first) = engine.order().first() {
            let mut stack = vec![first];
            while let Some(s) = stack.pop() {
                bottom_up.push(s);
                if let Some(children) = tree.get(&s) {
                    stack.extend(children.iter().rev());
                }
            }
        }
        bottom_up.reverse();

        let mut doms_per_node: HashMap<StatId, HashMap<StatId, StatId>> = HashMap::new();
        let mut filter: HashMap<StatId, HashMap<StatId, Option<StatId>>> = HashMap::new();
        for &id in &bottom_up {
            let mut doms: HashMap<StatId, StatId> = HashMap::new();
            let mut map: HashMap<StatId, Option<StatId>> = HashMap::new();
            for &child in tree.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(child_doms) = doms_per_node.remove(&child) {
                    for (handler, dom) in child_doms {
                        let value = if doms.contains_key(&handler) { id } else { dom };
                        doms.insert(handler, value);
                    }
                }
                let child_filter = filter.get(&child);
                for (handler, range) in &ranges {
                    if !range.contains(&id) {
                        continue;
                    }
                    let exit = if !range.contains(&child) {
                        Some(Some(child))
                    } else if map.contains_key(handler) {
                        Some(None)
                    } else {
                        child_filter.and_then(|f| f.get(handler)).copied()
                    };
                    if let Some(exit) = exit {
                        map.insert(*handler, exit);
                    }
                }
            }
            for (handler, range) in &ranges {
                if range.contains(&id) {
                    doms.insert(*handler, id);
                }
            }
            doms_per_node.insert(id, doms);
            filter.insert(id, map);
        }

        let exception_doms = engine
            .order()
            .first()
            .and_then(|f| doms_per_node.remove(f))
            .unwrap_or_default();

        DominatorTreeExceptionFilter {
            engine,
            exception_doms,
            filter,
        }
    }

    pub fn engine(&self) -> &DominatorEngine {
        &self.engine
    }

    /// Whether a region from `head` to `exit` keeps every range it
    /// touches either fully inside or fully outside.
    pub fn accept_statement_pair(&self, head: StatId, exit: StatId) -> bool {
        let Some(filter) = self.filter.get(&head) else {
            return true;
        };
        filter.iter().all(|(handler, fexit)| {
            self.exception_doms.get(handler) == Some(&head) || *fexit == Some(exit)
        })
    }
}

type Sets = HashMap<StatId, FastFixedSet<StatId>>;

struct ExtendedPostdominance<'a> {
    graph: &'a StatementGraph,
    container: StatId,
    factory: FastFixedSetFactory<StatId>,
    order: Vec<StatId>,
    support: Sets,
    ext: Sets,
}

/// Extended postdominators of the children of `container`: for each head
/// the nodes every path from it must cross before leaving the region,
/// filtered by exception ranges and dominance.
pub fn extended_postdominators(graph: &mut StatementGraph, container: StatId) -> ExtPostdomMap {
    let filter = DominatorTreeExceptionFilter::new(graph, container);
    let graph: &StatementGraph = graph;

    let factory = FastFixedSetFactory::new(graph[container].stats.iter().copied());
    let order = graph[container]
        .first
        .map(|f| graph.reverse_postorder(f))
        .unwrap_or_default();
    let mut helper = ExtendedPostdominance {
        graph,
        container,
        factory,
        order,
        support: HashMap::new(),
        ext: HashMap::new(),
    };
    helper.calc_default_reachable_sets();
    helper.remove_erroneous_nodes();
    helper.filter_on_exception_ranges(&filter);
    helper.filter_on_dominance(&filter);

    helper
        .ext
        .into_iter()
        .map(|(k, v)| (k, v.iter().collect()))
        .collect()
}

impl ExtendedPostdominance<'_> {
    fn calc_default_reachable_sets(&mut self) {
        let types = EdgeType::REGULAR | EdgeType::EXCEPTION;
        self.calc_reachability_support_points(types);
        for &stat in &self.graph[self.container].stats {
            self.ext.insert(stat, self.factory.spawn_empty_set());
        }
        let mut ext = std::mem::take(&mut self.ext);
        self.iterate_reachability(types, |_, node, sets| {
            if let Some(reach) = sets.get(&node) {
                for id in reach.iter() {
                    if let Some(set) = ext.get_mut(&id) {
                        set.add(node);
                    }
                }
            }
            false
        });
        self.ext = ext;
    }

    fn remove_erroneous_nodes(&mut self) {
        self.support.clear();
        self.calc_reachability_support_points(EdgeType::REGULAR);

        let graph = self.graph;
        let factory = self.factory.clone();
        let mut ext = std::mem::take(&mut self.ext);
        self.iterate_reachability(EdgeType::REGULAR, |support, node, sets| {
            let Some(reach) = sets.get(&node) else {
                return false;
            };
            let pred_sets: Vec<&FastFixedSet<StatId>> = graph
                .neighbours(node, EdgeType::REGULAR, Direction::Backward)
                .into_iter()
                .filter_map(|pred| sets.get(&pred).or_else(|| support.get(&pred)))
                .collect();

            for id in reach.iter() {
                let mut intersection = factory.spawn_empty_set();
                let mut initialized = false;
                for pred_set in &pred_sets {
                    if pred_set.contains(&id) {
                        if initialized {
                            intersection.intersection(pred_set);
                        } else {
                            intersection.union(pred_set);
                            initialized = true;
                        }
                    }
                }
                if node != id {
                    intersection.add(node);
                } else {
                    intersection.remove(&node);
                }
                let mut dropped = reach.clone();
                dropped.complement(&intersection);
                if let Some(set) = ext.get_mut(&id) {
                    set.complement(&dropped);
                }
            }
            false
        });
        self.ext = ext;

        // handlers never postdominate
        let mut handlers = self.factory.spawn_empty_set();
        for &stat in &self.graph[self.container].stats {
            if self.graph.predecessor_edges(stat, EdgeType::DIRECT_ALL).is_empty()
                && !self.graph.predecessor_edges(stat, EdgeType::EXCEPTION).is_empty()
            {
                handlers.add(stat);
            }
        }
        if !handlers.is_empty() {
            for set in self.ext.values_mut() {
                set.complement(&handlers);
            }
        }
    }

    fn filter_on_exception_ranges(&mut self, filter: &DominatorTreeExceptionFilter) {
        let mut heads: Vec<StatId> = self.ext.keys().copied().collect();
        heads.sort_unstable();
        for head in heads {
            let Some(set) = self.ext.get_mut(&head) else {
                continue;
            };
            for post in set.to_vec() {
                if !filter.accept_statement_pair(head, post) {
                    set.remove(&post);
                }
            }
            if set.is_empty() {
                self.ext.remove(&head);
            }
        }
    }

    fn filter_on_dominance(&mut self, filter: &DominatorTreeExceptionFilter) {
        let engine = filter.engine();
        let mut heads: Vec<StatId> = self.ext.keys().copied().collect();
        heads.sort_unstable();
        for head in heads {
            let Some(mut postdoms) = self.ext.remove(&head) else {
                continue;
            };
            let mut queue: VecDeque<(StatId, FastFixedSet<StatId>)> = VecDeque::new();
            queue.push_back((head, self.factory.spawn_empty_set()));
            let mut visited: HashSet<StatId> = HashSet::from([head]);

            while let Some((stat, mut path)) = queue.pop_front() {
                if postdoms.contains(&stat) {
                    path.add(stat);
                }
                if path.contains_all(&postdoms) {
                    continue;
                }
                if !engine.is_dominator(stat, head) {
                    postdoms.complement(&path);
                    continue;
                }
                for succ in self.graph.neighbours(stat, EdgeType::REGULAR, Direction::Forward) {
                    if visited.insert(succ) {
                        queue.push_back((succ, path.clone()));
                    }
                }
            }

            if !postdoms.is_empty() {
                self.ext.insert(head, postdoms);
            }
        }
    }

    fn calc_reachability_support_points(&mut self, types: EdgeType) {
        let graph = self.graph;
        let mut support = std::mem::take(&mut self.support);
        loop {
            let mut sets: Sets = HashMap::new();
            let mut changed = false;
            for &stat in &self.order {
                let reach = self.reach_of(stat, types, &sets, &support);
                sets.insert(stat, reach);
                let reaches_visited = graph
                    .neighbours(stat, types, Direction::Forward)
                    .iter()
                    .any(|succ| sets.contains_key(succ));
                if reaches_visited && support.get(&stat) != sets.get(&stat) {
                    if let Some(reach) = sets.get(&stat) {
                        support.insert(stat, reach.clone());
                    }
                    changed = true;
                    break;
                }
            }
            if !changed {
                break;
            }
        }
        self.support = support;
    }

    /// Walks the region in forward order building reachability sets from
    /// predecessors, restarting whenever `action` reports a change.
    fn iterate_reachability<F>(&self, types: EdgeType, mut action: F)
    where
        F: FnMut(&Sets, StatId, &Sets) -> bool,
    {
        loop {
            let mut sets: Sets = HashMap::new();
            let mut restart = false;
            for &stat in &self.order {
                let reach = self.reach_of(stat, types, &sets, &self.support);
                sets.insert(stat, reach);
                if action(&self.support, stat, &sets) {
                    restart = true;
                    break;
                }
            }
            if !restart {
                break;
            }
        }
    }

    fn reach_of(&self, stat: StatId, types: EdgeType, sets: &Sets, support: &Sets) -> FastFixedSet<StatId> {
        let mut reach = self.factory.spawn_empty_set();
        reach.add(stat);
        for pred in self.graph.neighbours(stat, types, Direction::Backward) {
            if let Some(pred_set) = sets.get(&pred).or_else(|| support.get(&pred)) {
                reach.union(pred_set);
            }
        }
        reach
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::InstructionSequence;
    use crate::decompile::stat_edge::StatEdge;

    fn diamond() -> (StatementGraph, StatId, [StatId; 4]) {
        let mut g = StatementGraph::new(0);
        let a = g.add_basic_block(None, InstructionSequence::default());
        let b = g.add_basic_block(None, InstructionSequence::default());
        let c = g.add_basic_block(None, InstructionSequence::default());
        let d = g.add_basic_block(None, InstructionSequence::default());
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, c, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, d, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, c, d, None));
        let general = g.new_general(a, vec![a, b, c, d], None);
        (g, general, [a, b, c, d])
    }

    #[test]
    fn diamond_postdominators() {
        let (g, general, [a, b, _c, d]) = diamond();
        let posts: HashMap<StatId, Vec<StatId>> = calc_post_dominators(&g, general).into_iter().collect();
        assert_eq!(posts[&a], vec![d, a]);
        assert_eq!(posts[&b], vec![d, b]);
        assert_eq!(posts[&d], vec![d]);
    }

    #[test]
    fn diamond_dominators() {
        let (g, general, [a, b, c, d]) = diamond();
        let engine = DominatorEngine::new(&g, general);
        assert_eq!(engine.idom(d), Some(a));
        assert!(engine.is_dominator(b, a));
        assert!(!engine.is_dominator(d, b));
        assert!(!engine.is_dominator(c, b));
    }

    #[test]
    fn diamond_join_is_extended_postdominator() {
        let (mut g, general, [a, _b, _c, d]) = diamond();
        let ext = extended_postdominators(&mut g, general);
        assert!(ext[&a].contains(&d));
    }
}
