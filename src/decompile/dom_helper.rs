//! Structuring driver: reduces the initial general region into a tree of
//! structured statements, splitting irreducible nodes when needed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use super::cfg_types::ControlFlowGraph;
use super::error::{DecompileError, Result};
use super::graph_to_statement::graph_to_statement;
use super::label_helper;
use super::options::DecompilerOptions;
use super::postdom::{calc_post_dominators, extended_postdominators, ExtPostdomMap};
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeType, StatEdge};
use super::statement::{StatId, StatKind, StatType, StatementGraph};
use super::stats::{catch_all, catch_stat, do_stat, if_stat, sequence, switch_stat, CatchAllStat};
use super::strong_connectivity;

/// Builds the statement tree for `cfg` and structures it completely.
pub fn parse_graph(cfg: &ControlFlowGraph, first_free_var: u32, options: &DecompilerOptions) -> Result<StatementGraph> {
    let mut graph = graph_to_statement(cfg, first_free_var)?;
    let root = graph.root()?;

    let mut driver = Driver { options };
    let mut map = ExtPostdomMap::new();
    if !driver.process_statement(&mut graph, root, &mut map)? {
        let region = graph.first(root).map(|f| graph[f].stats.len()).unwrap_or(0);
        warn!(region, "general region could not be reduced");
        return Err(DecompileError::structuring("dom_helper", region));
    }

    label_helper::low_continue_labels(&mut graph, root)?;
    sequence_helper::condense_sequences(&mut graph, root)?;
    graph.build_monitor_flags(root);
    build_synchronized(&mut graph, root)?;
    debug!(statements = graph.len(), "statement tree structured");
    Ok(graph)
}

struct Driver<'a> {
    options: &'a DecompilerOptions,
}

impl Driver<'_> {
    fn process_statement(&mut self, graph: &mut StatementGraph, general: StatId, map: &mut ExtPostdomMap) -> Result<bool> {
        if graph.stat_type(general) == StatType::Root {
            let stat = graph.first(general)?;
            if graph.stat_type(stat) != StatType::General {
                return Ok(true);
            }
            let complete = self.process_statement(graph, stat, map)?;
            if complete {
                let inner = graph.first(stat)?;
                graph.replace_statement(general, stat, inner);
            }
            return Ok(complete);
        }

        let mut map_refreshed = map.is_empty();
        let max_rounds = self.options.max_structuring_passes + graph[general].stats.len();
        let mut rounds = 0;
        for mapstage in 0..2 {
            let mut reducibility = 0;
            while reducibility < self.options.max_node_splits {
                if reducibility > 0 {
                    if is_statement_irreducible(graph, general) {
                        if !split_irreducible_node(graph, general)? {
                            warn!(statement = general, "irreducible statement cannot be decomposed");
                            break;
                        }
                        debug!(statement = general, "split irreducible node");
                    } else {
                        if mapstage == 1 || map_refreshed {
                            warn!(statement = general, "statement cannot be decomposed although reducible");
                        }
                        break;
                    }
                    map.clear();
                    map_refreshed = true;
                }

                for forceall in [false, true] {
                    loop {
                        rounds += 1;
                        if rounds > max_rounds {
                            return Err(DecompileError::structuring("general region search", graph[general].stats.len()));
                        }
                        if find_simple_statements(graph, general, map)? {
                            reducibility = 0;
                        }
                        if graph.stat_type(general) == StatType::Placeholder {
                            return Ok(true);
                        }

                        let Some(stat) = find_general_statement(graph, general, forceall, map)? else {
                            break;
                        };
                        let complete = if graph[general].first == Some(stat) {
                            self.process_statement(graph, stat, map)?
                        } else {
                            self.process_statement(graph, stat, &mut ExtPostdomMap::new())?
                        };
                        if !complete {
                            return Ok(false);
                        }
                        let inner = graph.first(stat)?;
                        graph.replace_statement(general, stat, inner);
                        map.clear();
                        map_refreshed = true;
                        reducibility = 0;
                    }
                }
                reducibility += 1;
            }

            if map_refreshed {
                break;
            }
            map.clear();
        }
        Ok(false)
    }
}

fn detect_statement(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    do_stat::is_head(graph, head)
        .or_else(|| switch_stat::is_head(graph, head))
        .or_else(|| if_stat::is_head(graph, head))
        .or_else(|| sequence::is_head2_block(graph, head))
        .or_else(|| catch_stat::is_head(graph, head))
        .or_else(|| catch_all::is_head(graph, head))
}

/// Collapses recognisable shapes inside `stat` until none is left,
/// keeping `map` in step with the collapsed ids.
fn find_simple_statements(graph: &mut StatementGraph, stat: StatId, map: &mut ExtPostdomMap) -> Result<bool> {
    let mut success = false;
    loop {
        let components = strong_connectivity::components(graph, stat);
        let exits = strong_connectivity::exit_reps(graph, &components);
        let order = graph.post_reverse_postorder(&exits);

        let mut found = false;
        for st in order {
            let Some(result) = detect_statement(graph, st) else {
                continue;
            };
            if graph.stat_type(stat) == StatType::General
                && graph[result].first == graph[stat].first
                && graph[stat].stats.len() == graph[result].stats.len()
            {
                graph[stat].kind = StatKind::Placeholder;
            }
            graph.collapse_nodes_to_statement(stat, result)?;

            if !map.is_empty() {
                let old: HashSet<StatId> = graph[result].stats.iter().copied().collect();
                let mut keys: Vec<StatId> = map.keys().copied().collect();
                keys.sort_unstable();
                for key in keys {
                    let Some(mut set) = map.remove(&key) else {
                        continue;
                    };
                    let old_size = set.len();
                    set.retain(|s| !old.contains(s));
                    if old.contains(&key) {
                        map.entry(result).or_default().extend(set);
                    } else {
                        if set.len() < old_size {
                            set.insert(result);
                        }
                        map.insert(key, set);
                    }
                }
            }
            found = true;
            break;
        }
        if !found {
            return Ok(success);
        }
        success = true;
    }
}

/// Finds a single-entry region inside `stat` bounded by a postdominator,
/// wraps it in a new general statement and returns it.
fn find_general_statement(
    graph: &mut StatementGraph,
    stat: StatId,
    forceall: bool,
    map: &mut ExtPostdomMap,
) -> Result<Option<StatId>> {
    if map.is_empty() {
        *map = extended_postdominators(graph, stat);
    }

    let candidates: Vec<(StatId, Vec<StatId>)> = if forceall {
        let components = strong_connectivity::components(graph, stat);
        let exits = strong_connectivity::exit_reps(graph, &components);
        vec![(graph.first(stat)?, graph.post_reverse_postorder(&exits))]
    } else {
        calc_post_dominators(graph, stat)
    };

    let children: HashSet<StatId> = graph[stat].stats.iter().copied().collect();
    for (head, posts) in candidates {
        if !map.contains_key(&head) && !(posts.len() == 1 && posts[0] == head) {
            continue;
        }
        for post in posts {
            if post != head && !map.get(&head).map_or(false, |set| set.contains(&post)) {
                continue;
            }
            if !children.contains(&post) {
                continue;
            }
            if let Some(nodes) = general_region(graph, stat, head, post) {
                let same = post == head;
                let general = graph.new_general(head, nodes, if same { None } else { Some(post) });
                graph.collapse_nodes_to_statement(stat, general)?;
                return Ok(Some(general));
            }
        }
    }
    Ok(None)
}

/// Members of the region entered at `head` and left through `post`, in
/// the parent's child order, if the region is well formed.
fn general_region(graph: &StatementGraph, parent: StatId, head: StatId, post: StatId) -> Option<Vec<StatId>> {
    let same = post == head;
    let mut nodes: HashSet<StatId> = HashSet::new();
    let mut preds: HashSet<StatId> = HashSet::new();
    let mut handlers: Vec<StatId> = vec![head];

    loop {
        let mut found = None;
        for (pos, &handler) in handlers.iter().enumerate() {
            if nodes.contains(&handler) {
                continue;
            }
            let add = nodes.is_empty() || {
                let support = graph.neighbours(handler, EdgeType::EXCEPTION, Direction::Backward);
                support.iter().all(|s| nodes.contains(s)) && (nodes.len() > support.len() || nodes.len() == 1)
            };
            if add {
                found = Some((pos, handler));
                break;
            }
        }
        let Some((pos, handler)) = found else {
            break;
        };
        handlers.remove(pos);

        let mut queue = VecDeque::from([handler]);
        while let Some(st) = queue.pop_front() {
            if nodes.contains(&st) || (!same && st == post) {
                continue;
            }
            nodes.insert(st);
            if st != head {
                preds.extend(graph.neighbours(st, EdgeType::REGULAR, Direction::Backward));
            }
            queue.extend(graph.neighbours(st, EdgeType::REGULAR, Direction::Forward));
            for h in graph.neighbours(st, EdgeType::EXCEPTION, Direction::Forward) {
                if !handlers.contains(&h) {
                    handlers.push(h);
                }
            }
        }
    }

    let mut outside: HashSet<StatId> = HashSet::new();
    for &st in &nodes {
        outside.extend(graph.neighbours(st, EdgeType::EXCEPTION, Direction::Forward));
    }
    outside.retain(|h| !nodes.contains(h));
    for handler in outside {
        let protected = graph.neighbours_set(handler, EdgeType::EXCEPTION, Direction::Backward);
        if !nodes.iter().all(|n| protected.contains(n)) {
            return None;
        }
    }

    preds.retain(|p| !nodes.contains(p));
    if !preds.is_empty() {
        return None;
    }
    let self_loop = graph
        .neighbours(head, EdgeType::REGULAR, Direction::Backward)
        .contains(&head);
    if !(nodes.len() > 1 || self_loop) || nodes.len() >= graph[parent].stats.len() {
        return None;
    }
    if !check_synchronized_completeness(graph, &nodes) {
        return None;
    }
    Some(graph[parent].stats.iter().copied().filter(|s| nodes.contains(s)).collect())
}

/// A `monitorenter` block must fall into its region, or the matching
/// synchronized statement could never be rebuilt.
fn check_synchronized_completeness(graph: &StatementGraph, nodes: &HashSet<StatId>) -> bool {
    nodes.iter().all(|&st| {
        if !graph[st].is_monitor_enter {
            return true;
        }
        match graph.successor_edges(st, EdgeType::DIRECT_ALL).as_slice() {
            [e] => {
                let edge = graph.edge(*e);
                edge.edge_type == EdgeType::REGULAR && nodes.contains(&edge.destination)
            }
            _ => false,
        }
    })
}

/// Whether the regular edges between the children of `stat` form an
/// irreducible graph, by T1/T2 reduction.
pub fn is_statement_irreducible(graph: &StatementGraph, stat: StatId) -> bool {
    #[derive(Default)]
    struct Node {
        preds: BTreeSet<StatId>,
        succs: BTreeSet<StatId>,
    }

    let mut nodes: BTreeMap<StatId, Node> = BTreeMap::new();
    for &child in &graph[stat].stats {
        if !graph.successor_edges(child, EdgeType::EXCEPTION).is_empty() {
            return false;
        }
        nodes.insert(child, Node::default());
    }
    for &child in &graph[stat].stats {
        for succ in graph.neighbours(child, EdgeType::REGULAR, Direction::Forward) {
            if !nodes.contains_key(&succ) {
                continue;
            }
            if let Some(n) = nodes.get_mut(&child) {
                n.succs.insert(succ);
            }
            if let Some(n) = nodes.get_mut(&succ) {
                n.preds.insert(child);
            }
        }
    }

    loop {
        let t1 = nodes.iter().find(|(id, n)| n.succs.contains(*id)).map(|(&id, _)| id);
        if let Some(id) = t1 {
            if let Some(n) = nodes.get_mut(&id) {
                n.succs.remove(&id);
                n.preds.remove(&id);
            }
            continue;
        }

        let t2 = nodes
            .iter()
            .find(|(_, n)| n.preds.len() == 1)
            .map(|(&id, n)| (id, n.preds.iter().next().copied()));
        let Some((id, Some(pred))) = t2 else {
            return nodes.len() > 1;
        };
        let Some(node) = nodes.remove(&id) else {
            return nodes.len() > 1;
        };
        if let Some(p) = nodes.get_mut(&pred) {
            p.succs.extend(node.succs.iter().copied());
            p.succs.remove(&id);
        }
        for succ in &node.succs {
            if let Some(s) = nodes.get_mut(succ) {
                s.preds.remove(&id);
                s.preds.insert(pred);
            }
        }
    }
}

/// Duplicates the cheapest multi-entry child of `stat` so that one of its
/// entries gets a private copy.
pub fn split_irreducible_node(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let Some(split) = candidate_for_splitting(graph, stat) else {
        return Ok(false);
    };
    let Some(&enter) = graph.predecessor_edges(split, EdgeType::REGULAR).first() else {
        return Ok(false);
    };
    let enter_source = graph.edge(enter).source;

    let mut copies: HashMap<StatId, StatId> = HashMap::new();
    let copy = copy_statement(graph, split, None, &mut copies)?;
    init_copied_statement(graph, copy)?;
    graph[copy].parent = Some(stat);
    graph[stat].stats.push(copy);

    for e in graph.predecessor_edges(split, EdgeType::DIRECT_ALL) {
        let edge = graph.edge(e);
        if edge.source == enter_source || edge.closure == Some(enter_source) {
            graph.remove_predecessor(split, e);
            graph.change_edge_node(Direction::Forward, e, copy);
            graph.add_predecessor(copy, e);
        }
    }
    for e in graph.successor_edges(split, EdgeType::DIRECT_ALL) {
        let edge = graph.edge(e);
        let (edge_type, dest, closure) = (edge.edge_type, edge.destination, edge.closure);
        graph.add_successor(StatEdge::new(edge_type, copy, dest, closure));
    }
    Ok(true)
}

fn candidate_for_splitting(graph: &StatementGraph, stat: StatId) -> Option<StatId> {
    let mut candidate = None;
    let mut best_size = usize::MAX;
    let mut best_succs = usize::MAX;
    for &child in &graph[stat].stats {
        let preds = graph.neighbours_set(child, EdgeType::REGULAR, Direction::Backward);
        if preds.len() <= 1 || preds.contains(&child) {
            continue;
        }
        let succs = graph.neighbours_set(child, EdgeType::REGULAR, Direction::Forward).len();
        if succs > best_succs {
            continue;
        }
        let size = statement_size(graph, child) * (preds.len() - 1);
        if succs < best_succs || size < best_size {
            candidate = Some(child);
            best_size = size;
            best_succs = succs;
        }
    }
    candidate
}

fn statement_size(graph: &StatementGraph, stat: StatId) -> usize {
    match graph.block_of(stat) {
        Some(block) => block.seq.len(),
        None => graph[stat].stats.iter().map(|&s| statement_size(graph, s)).sum(),
    }
}

fn copy_statement(
    graph: &mut StatementGraph,
    from: StatId,
    to: Option<StatId>,
    copies: &mut HashMap<StatId, StatId>,
) -> Result<StatId> {
    let to = match to {
        Some(to) => to,
        None => {
            let to = graph.simple_copy(from)?;
            copies.insert(from, to);
            to
        }
    };

    let children = graph[from].stats.clone();
    for &child in &children {
        let child_copy = graph.simple_copy(child)?;
        graph[to].stats.push(child_copy);
        copies.insert(child, child_copy);
    }

    let new_children = graph[to].stats.clone();
    for (&old, &new) in children.iter().zip(&new_children) {
        for e in graph.successor_edges(old, EdgeType::DIRECT_ALL) {
            let edge = graph.edge(e);
            let dest = copies.get(&edge.destination).copied().unwrap_or(edge.destination);
            let closure = edge.closure.map(|c| copies.get(&c).copied().unwrap_or(c));
            let edge_type = edge.edge_type;
            graph.add_successor(StatEdge::new(edge_type, new, dest, closure));
        }
    }

    for (&old, &new) in children.iter().zip(&new_children) {
        copy_statement(graph, old, Some(new), copies)?;
    }
    Ok(to)
}

fn init_copied_statement(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    graph.init_simple_copy(stat)?;
    graph[stat].copied = true;
    for child in graph[stat].stats.clone() {
        graph[child].parent = Some(stat);
        init_copied_statement(graph, child)?;
    }
    Ok(())
}

/// Turns `monitorenter; try { .. } catch-all { monitorexit; throw }` in a
/// sequence into a synchronized statement.
pub fn build_synchronized(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    for child in graph[stat].stats.clone() {
        build_synchronized(graph, child)?;
    }
    if graph.stat_type(stat) != StatType::Sequence {
        return Ok(());
    }

    'search: loop {
        let list = graph[stat].stats.clone();
        for window in list.windows(2) {
            let (current, next_direct) = (window[0], window[1]);
            if !graph[current].is_monitor_enter {
                continue;
            }
            let mut next = next_direct;
            while graph.stat_type(next) == StatType::Sequence {
                next = graph.first(next)?;
            }
            let Some(CatchAllStat { handler: Some(handler), .. }) = graph.catch_all_data(next).cloned() else {
                continue;
            };
            let body = graph.first(next)?;
            if !(graph[body].contains_monitor_exit && graph[handler].contains_monitor_exit) {
                continue;
            }

            if let Some(&e) = graph.successor_edges(current, EdgeType::DIRECT_ALL).first() {
                graph.remove_successor(e);
            }
            for e in graph.predecessor_edges(current, EdgeType::DIRECT_ALL) {
                graph.remove_predecessor(current, e);
                graph.change_edge_node(Direction::Forward, e, next_direct);
                graph.add_predecessor(next_direct, e);
            }
            graph[stat].stats.retain(|&s| s != current);
            graph[stat].first = graph[stat].stats.first().copied();

            let sync = graph.new_synchronized(current, body, handler);
            graph.set_all_parent(sync);
            if let Some(&e) = graph.successor_edges(body, EdgeType::DIRECT_ALL).first() {
                if graph.edge(e).edge_type == EdgeType::REGULAR {
                    graph[sync].post = Some(graph.edge(e).destination);
                }
            }
            for e in graph[next].label_edges.clone() {
                graph.add_labeled_edge(sync, e);
            }
            graph.add_successor(StatEdge::new(EdgeType::REGULAR, current, body, None));

            let parent = graph[next]
                .parent
                .ok_or_else(|| DecompileError::invariant("catch-all without parent", Some(next), None))?;
            graph.replace_statement(parent, next, sync);
            continue 'search;
        }
        return Ok(());
    }
}

/// Drops the compiler generated unlock-and-rethrow handler of every
/// synchronized statement below `stat`.
pub fn remove_synchronized_handler(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    for child in graph[stat].stats.clone() {
        remove_synchronized_handler(graph, child)?;
    }
    if graph.stat_type(stat) == StatType::Synchronized {
        if let Some(handler) = graph.sync_data(stat).and_then(|s| s.handler) {
            for e in graph.predecessor_edges(handler, EdgeType::EXCEPTION) {
                graph.remove_successor(e);
            }
            sequence_helper::destroy_statement_content(graph, handler, true);
        }
        graph.remove_sync_handler(stat)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{opcodes, Instruction, InstructionSequence};

    fn seq(ops: &[u8]) -> InstructionSequence {
        InstructionSequence::new(
            ops.iter()
                .enumerate()
                .map(|(i, &op)| Instruction::new(op, vec![]).at(i as u32))
                .collect(),
        )
    }

    fn irreducible_triangle() -> (StatementGraph, StatId, [StatId; 3]) {
        let mut g = StatementGraph::new(0);
        let a = g.add_basic_block(None, seq(&[opcodes::NOP]));
        let b = g.add_basic_block(None, seq(&[opcodes::NOP, opcodes::NOP]));
        let c = g.add_basic_block(None, seq(&[opcodes::NOP]));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, c, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, c, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, c, b, None));
        let general = g.new_general(a, vec![a, b, c], None);
        g.set_all_parent(general);
        (g, general, [a, b, c])
    }

    #[test]
    fn detects_irreducible_triangle() {
        let (g, general, _) = irreducible_triangle();
        assert!(is_statement_irreducible(&g, general));
    }

    #[test]
    fn straight_line_is_reducible() {
        let mut g = StatementGraph::new(0);
        let a = g.add_basic_block(None, seq(&[opcodes::NOP]));
        let b = g.add_basic_block(None, seq(&[opcodes::NOP]));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, b, None));
        let general = g.new_general(a, vec![a, b], None);
        assert!(!is_statement_irreducible(&g, general));
    }

    #[test]
    fn splitting_makes_triangle_reducible() {
        let (mut g, general, [_a, _b, c]) = irreducible_triangle();
        assert!(split_irreducible_node(&mut g, general).unwrap());
        assert_eq!(g[general].stats.len(), 4);
        let copy = g[general].stats[3];
        assert!(g[copy].copied);
        // the smaller node is the one duplicated
        assert_eq!(g.block_of(copy).map(|b| b.seq.len()), g.block_of(c).map(|b| b.seq.len()));
        assert!(!is_statement_irreducible(&g, general));
        g.verify_edges().unwrap();
    }
}
