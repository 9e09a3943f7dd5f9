//! Break and continue labelling.
//!
//! After structuring every jump edge has a closure, the statement whose
//! label it names. These passes move closures to the innermost statement
//! that still expresses the jump, decide which jumps must be written out
//! (`explicit`), and which of those need a label at all (`labeled`).

use std::collections::HashSet;

use super::error::Result;
use super::exprs::ExprKind;
use super::inline_single_block::is_break_edge_labeled;
use super::merge_helper::is_direct_path;
use super::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::LoopType;

/// Destination-keyed edge lists, kept in insertion order so repeated runs
/// pick the same representative edges.
type EdgeMap = Vec<(StatId, Vec<EdgeId>)>;

fn map_put(map: &mut EdgeMap, key: StatId, value: Vec<EdgeId>) {
    match map.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => map.push((key, value)),
    }
}

fn map_merge(map: &mut EdgeMap, other: EdgeMap) {
    for (key, value) in other {
        match map.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1.extend(value),
            None => map.push((key, value)),
        }
    }
}

/// Normalises closures once structuring is finished.
pub fn clean_up_edges(graph: &mut StatementGraph, root: StatId) -> Result<()> {
    reset_all_edges(graph, root);
    remove_non_immediate_edges(graph, root);
    lift_closures(graph, root);
    low_continue_labels(graph, root)?;
    low_closures(graph, root);
    Ok(())
}

/// Decides which jumps are implicit fall-throughs and which explicit jumps
/// need a label.
pub fn identify_labels(graph: &mut StatementGraph, root: StatId) -> Result<()> {
    set_explicit_edges(graph, root);
    hide_default_switch_edges(graph, root);
    process_statement_label(graph, root);
    set_ret_edges_unlabeled(graph);
    Ok(())
}

fn reset_all_edges(graph: &mut StatementGraph, stat: StatId) {
    for child in graph[stat].stats.clone() {
        reset_all_edges(graph, child);
    }
    for e in graph.all_successor_edges(stat) {
        let edge = graph.edge_mut(e);
        edge.explicit = true;
        edge.labeled = true;
    }
}

fn remove_non_immediate_edges(graph: &mut StatementGraph, stat: StatId) {
    for child in graph[stat].stats.clone() {
        remove_non_immediate_edges(graph, child);
    }
    if !graph.has_basic_succ_edge(stat) {
        for e in graph.successor_edges(stat, EdgeType::CONTINUE | EdgeType::BREAK) {
            graph.remove_successor(e);
        }
    }
}

fn lift_closures(graph: &mut StatementGraph, stat: StatId) {
    for e in graph.all_successor_edges(stat) {
        let (edge_type, dest, closure) = {
            let edge = graph.edge(e);
            (edge.edge_type, edge.destination, edge.closure)
        };
        if edge_type == EdgeType::CONTINUE {
            if closure != Some(dest) {
                graph.add_labeled_edge(dest, e);
            }
        } else if edge_type == EdgeType::BREAK && graph.stat_type(dest) != StatType::DummyExit {
            let Some(parent) = graph[dest].parent else {
                continue;
            };
            let siblings = match graph.stat_type(parent) {
                StatType::Sequence => graph[parent].stats.clone(),
                StatType::Switch => graph
                    .switch_data(parent)
                    .map(|sw| sw.case_statements.clone())
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            if let Some(pos) = siblings.iter().skip(1).position(|&s| s == dest) {
                graph.add_labeled_edge(siblings[pos], e);
            }
        }
    }
    for child in graph[stat].stats.clone() {
        lift_closures(graph, child);
    }
}

/// Moves continue edges onto the innermost loop that can express them
/// without a label.
pub fn low_continue_labels(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    low_continue_labels_rec(graph, stat, &mut Vec::new());
    Ok(())
}

fn low_continue_labels_rec(graph: &mut StatementGraph, stat: StatId, edges: &mut Vec<EdgeId>) {
    let ok = match graph.do_data(stat) {
        None => true,
        Some(d) => match d.loop_type {
            LoopType::Do | LoopType::While => true,
            LoopType::For => d.inc.is_none(),
            LoopType::DoWhile => false,
        },
    };

    if ok {
        for e in graph.predecessor_edges(stat, EdgeType::CONTINUE) {
            if !edges.contains(&e) {
                edges.push(e);
            }
        }
    }

    if ok && graph.stat_type(stat) == StatType::Do {
        for &e in edges.iter() {
            if graph.edge(e).removed {
                continue;
            }
            let (source, dest) = (graph.edge(e).source, graph.edge(e).destination);
            if graph.contains_statement_strict(stat, source) {
                graph.remove_predecessor(dest, e);
                graph.change_edge_node(Direction::Forward, e, stat);
                graph.add_predecessor(stat, e);
                graph.add_labeled_edge(stat, e);
            }
        }
    }

    let first = graph[stat].first;
    for child in graph[stat].stats.clone() {
        if Some(child) == first {
            low_continue_labels_rec(graph, child, edges);
        } else {
            low_continue_labels_rec(graph, child, &mut Vec::new());
        }
    }
}

pub(crate) fn low_closures(graph: &mut StatementGraph, stat: StatId) {
    for e in graph[stat].label_edges.clone() {
        if graph.edge(e).edge_type != EdgeType::BREAK {
            continue;
        }
        let (source, dest) = (graph.edge(e).source, graph.edge(e).destination);
        for child in graph[stat].stats.clone() {
            if graph.contains_statement_strict(child, source) {
                if is_direct_path(graph, child, dest) {
                    graph.add_labeled_edge(child, e);
                    break;
                }
            }
        }
    }
    for child in graph[stat].stats.clone() {
        low_closures(graph, child);
    }
}

fn set_explicit_edges(graph: &mut StatementGraph, stat: StatId) -> EdgeMap {
    let mut map = EdgeMap::new();
    if graph[stat].exprents.is_some() {
        return map;
    }

    match graph.stat_type(stat) {
        StatType::Trycatch | StatType::CatchAll => {
            let is_try = graph.stat_type(stat) == StatType::Trycatch;
            let first = graph[stat].first;
            for child in graph[stat].stats.clone() {
                let mut child_map = set_explicit_edges(graph, child);
                process_edges_with_next(graph, child, &mut child_map, None);
                // edges leaving a finally handler stay explicit
                if is_try || Some(child) == first {
                    map_merge(&mut map, child_map);
                }
            }
        }
        StatType::Do => {
            if let Some(first) = graph[stat].first {
                map = set_explicit_edges(graph, first);
                process_edges_with_next(graph, first, &mut map, Some(stat));
            }
        }
        StatType::If => {
            let (if_stat, else_stat) = match graph.if_data(stat) {
                Some(i) => (i.if_stat, i.else_stat),
                None => (None, None),
            };
            match if_stat {
                None => {
                    if let Some(first) = graph[stat].first {
                        process_edges_with_next(graph, first, &mut map, None);
                    }
                }
                Some(if_stat) => {
                    map = set_explicit_edges(graph, if_stat);
                    process_edges_with_next(graph, if_stat, &mut map, None);
                    if let Some(else_stat) = else_stat {
                        let mut else_map = set_explicit_edges(graph, else_stat);
                        process_edges_with_next(graph, else_stat, &mut else_map, None);
                        map_merge(&mut map, else_map);
                    }
                }
            }
        }
        StatType::Root => {
            if let Some(first) = graph[stat].first {
                map = set_explicit_edges(graph, first);
                let exit = graph.dummy_exit();
                process_edges_with_next(graph, first, &mut map, exit);
            }
        }
        StatType::Sequence => {
            let stats = graph[stat].stats.clone();
            if let Some((&last, init)) = stats.split_last() {
                for (index, &child) in init.iter().enumerate() {
                    let mut child_map = set_explicit_edges(graph, child);
                    process_edges_with_next(graph, child, &mut child_map, Some(stats[index + 1]));
                }
                map = set_explicit_edges(graph, last);
                process_edges_with_next(graph, last, &mut map, None);
            }
        }
        StatType::Switch => {
            let cases = graph
                .switch_data(stat)
                .map(|sw| sw.case_statements.clone())
                .unwrap_or_default();
            if let Some((&last, init)) = cases.split_last() {
                for (i, &case) in init.iter().enumerate() {
                    let next = skip_empty_case(graph, cases[i + 1]);
                    let mut case_map = set_explicit_edges(graph, case);
                    process_edges_with_next(graph, case, &mut case_map, Some(next));
                }
                if is_empty_block(graph, last) {
                    if let Some(e) = graph.all_successor_edges(last).first().copied() {
                        map_put(&mut map, graph.edge(e).destination, vec![e]);
                    }
                } else {
                    map = set_explicit_edges(graph, last);
                    process_edges_with_next(graph, last, &mut map, None);
                }
            }
        }
        StatType::Synchronized => {
            let body = graph.sync_data(stat).and_then(|s| s.body);
            if let (Some(first), Some(body)) = (graph[stat].first, body) {
                let mut head_map = set_explicit_edges(graph, first);
                process_edges_with_next(graph, first, &mut head_map, Some(body));
                map = set_explicit_edges(graph, body);
                process_edges_with_next(graph, body, &mut map, None);
            }
        }
        _ => {}
    }
    map
}

fn is_empty_block(graph: &StatementGraph, stat: StatId) -> bool {
    graph[stat].exprents.as_ref().map_or(false, Vec::is_empty)
}

/// An empty case falls straight through to its successor.
pub(crate) fn skip_empty_case(graph: &StatementGraph, case: StatId) -> StatId {
    if is_empty_block(graph, case) {
        if let Some(&e) = graph.all_successor_edges(case).first() {
            return graph.edge(e).destination;
        }
    }
    case
}

fn add_merged_edge(graph: &mut StatementGraph, stat: StatId, example: EdgeId) -> EdgeId {
    let (edge_type, dest, example_closure) = {
        let e = graph.edge(example);
        (e.edge_type, e.destination, e.closure)
    };
    let mut closure = graph[stat].parent;
    let inside = match (closure, example_closure) {
        (Some(p), Some(c)) => graph.contains_statement_strict(p, c),
        _ => false,
    };
    if !inside {
        closure = example_closure;
    }
    graph.add_successor(StatEdge::new(edge_type, stat, dest, closure))
}

fn process_edges_with_next(graph: &mut StatementGraph, stat: StatId, map: &mut EdgeMap, next: Option<StatId>) {
    let mut next = next;
    let mut stat_edge = None;
    if let Some(&e) = graph.all_successor_edges(stat).first() {
        let dest = graph.edge(e).destination;
        if Some(dest) == next {
            graph.edge_mut(e).explicit = false;
        } else {
            stat_edge = Some(e);
            next = Some(dest);
        }
    }

    // a plain do loop has no fall-through
    if graph.do_data(stat).map_or(false, |d| d.loop_type == LoopType::Do) {
        next = None;
    }

    match next {
        None => {
            if map.len() == 1 {
                let (key, list) = map[0].clone();
                if list.len() > 1 && graph.stat_type(key) != StatType::DummyExit {
                    let new_edge = add_merged_edge(graph, stat, list[0]);
                    for e in list {
                        graph.edge_mut(e).explicit = false;
                    }
                    let dest = graph.edge(new_edge).destination;
                    map_put(map, dest, vec![new_edge]);
                }
            }
        }
        Some(next) => {
            let mut implicit_found = false;
            if let Some((_, list)) = map.iter().find(|(k, _)| *k == next) {
                for &e in list {
                    graph.edge_mut(e).explicit = false;
                }
                implicit_found = true;
            }

            if graph.all_successor_edges(stat).is_empty() && !implicit_found {
                let mut best: Option<&Vec<EdgeId>> = None;
                for (key, list) in map.iter() {
                    if graph.stat_type(*key) != StatType::DummyExit
                        && best.map_or(true, |b| list.len() > b.len())
                    {
                        best = Some(list);
                    }
                }
                if let Some(list) = best.filter(|l| l.len() > 1).cloned() {
                    add_merged_edge(graph, stat, list[0]);
                    for e in list {
                        graph.edge_mut(e).explicit = false;
                    }
                }
            }
            map.clear();
        }
    }

    if let Some(e) = stat_edge {
        let dest = graph.edge(e).destination;
        map_put(map, dest, vec![e]);
    }
}

fn hide_default_switch_edges(graph: &mut StatementGraph, stat: StatId) {
    if graph.stat_type(stat) == StatType::Switch {
        let (last_case, default_edge) = match graph.switch_data(stat) {
            Some(sw) => (sw.case_statements.last().copied(), sw.default_edge),
            None => (None, None),
        };
        if let Some(last_case) = last_case {
            let implicit_exit = is_empty_block(graph, last_case)
                && graph
                    .all_successor_edges(last_case)
                    .first()
                    .map_or(false, |&e| !graph.edge(e).explicit);
            if implicit_exit {
                if let Some(sw) = graph.switch_data_mut(stat) {
                    let last = sw.case_statements.len() - 1;
                    if let Some(edges) = sw.case_edges.get_mut(last) {
                        edges.retain(|&e| Some(e) != default_edge);
                        if edges.is_empty() {
                            sw.case_statements.remove(last);
                            sw.case_edges.remove(last);
                            if last < sw.case_values.len() {
                                sw.case_values.remove(last);
                            }
                        }
                    }
                }
            }
        }
    }
    for child in graph[stat].stats.clone() {
        hide_default_switch_edges(graph, child);
    }
}

/// Returns the statements from which a plain `break` / `continue` still
/// reaches `stat`, unlabelling the jumps that need no label.
fn process_statement_label(graph: &mut StatementGraph, stat: StatId) -> (HashSet<StatId>, HashSet<StatId>) {
    let mut breaks = HashSet::new();
    let mut continues = HashSet::new();

    if graph[stat].exprents.is_none() {
        for child in graph[stat].stats.clone() {
            let (b, c) = process_statement_label(graph, child);
            breaks.extend(b);
            continues.extend(c);
        }

        let stat_type = graph.stat_type(stat);
        if stat_type == StatType::Do || stat_type == StatType::Switch {
            for e in graph[stat].label_edges.clone() {
                let edge = graph.edge(e);
                let shielded = (edge.edge_type == EdgeType::BREAK && breaks.contains(&edge.source))
                    || (edge.edge_type == EdgeType::CONTINUE && continues.contains(&edge.source));
                if edge.explicit && shielded {
                    graph.edge_mut(e).labeled = false;
                }
            }
        }

        match stat_type {
            StatType::Do => {
                continues.clear();
                breaks.clear();
            }
            StatType::Switch => breaks.clear(),
            _ => {}
        }
    }

    breaks.insert(stat);
    continues.insert(stat);
    (breaks, continues)
}

fn set_ret_edges_unlabeled(graph: &mut StatementGraph) {
    let Some(exit) = graph.dummy_exit() else {
        return;
    };
    for e in graph.all_predecessor_edges(exit) {
        let edge = graph.edge(e);
        let returns = graph[edge.source]
            .exprents
            .as_ref()
            .and_then(|l| l.last())
            .map_or(false, |last| matches!(last.kind, ExprKind::Exit { .. }));
        if edge.edge_type == EdgeType::FINALLY_EXIT || returns {
            graph.edge_mut(e).labeled = false;
        }
    }
}

/// Rewrites explicit continues that can be expressed as an unlabelled
/// break out of a tighter statement.
pub fn replace_continue_with_break(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    if graph.stat_type(stat) == StatType::Do {
        for e in graph.predecessor_edges(stat, EdgeType::CONTINUE) {
            if !graph.edge(e).explicit {
                continue;
            }
            let Some(min_closure) = min_continue_closure(graph, e) else {
                continue;
            };
            let source = graph.edge(e).source;
            if Some(min_closure) != graph.edge(e).closure && !is_break_edge_labeled(graph, source, min_closure) {
                graph.change_edge_type(e, EdgeType::BREAK)?;
                graph.edge_mut(e).labeled = false;
                graph.add_labeled_edge(min_closure, e);
            }
        }
    }
    for child in graph[stat].stats.clone() {
        replace_continue_with_break(graph, child)?;
    }
    Ok(())
}

fn min_continue_closure(graph: &StatementGraph, edge: EdgeId) -> Option<StatId> {
    let (source, dest) = (graph.edge(edge).source, graph.edge(edge).destination);
    let mut closure = graph.edge(edge).closure?;
    loop {
        let inner = graph[closure]
            .stats
            .iter()
            .copied()
            .find(|&child| graph.contains_statement_strict(child, source) && is_direct_path(graph, child, dest));
        match inner {
            Some(child) => closure = child,
            None => return Some(closure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::exprs::{ExitKind, Exprent};
    use crate::decompile::descriptor::VarType;
    use crate::decompile::statement::StatKind;

    fn rooted(g: &mut StatementGraph, first: StatId) -> (StatId, StatId) {
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g[root].first = Some(first);
        g[root].stats = vec![first];
        g[first].parent = Some(root);
        g.root = Some(root);
        (root, exit)
    }

    #[test]
    fn fall_through_in_sequence_is_implicit() {
        let mut g = StatementGraph::new(0);
        let a = g.add_empty_block();
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![Exprent::exit(ExitKind::Return, None, VarType::Void)]);
        let ab = g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let seq = g.new_sequence(vec![a, b]);
        g.set_all_parent(seq);
        let (root, exit) = rooted(&mut g, seq);
        let ret = g.add_successor(StatEdge::new(EdgeType::BREAK, b, exit, Some(root)));

        identify_labels(&mut g, root).unwrap();
        assert!(!g.edge(ab).explicit);
        assert!(!g.edge(ret).labeled);
    }

    #[test]
    fn continue_moves_to_loop() {
        let mut g = StatementGraph::new(0);
        let body = g.add_empty_block();
        let lp = g.new_do(body);
        g.set_all_parent(lp);
        let (root, _) = rooted(&mut g, lp);
        let cont = g.add_successor(StatEdge::new(EdgeType::CONTINUE, body, lp, Some(root)));

        clean_up_edges(&mut g, root).unwrap();
        assert_eq!(g.edge(cont).closure, Some(lp));
        g.verify_edges().unwrap();
    }
}
