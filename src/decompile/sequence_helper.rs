//! Sequence normalisation: nested sequences are flattened, empty blocks
//! dropped and single-child sequences dissolved.

use super::error::{DecompileError, Result};
use super::stat_edge::{Direction, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};

pub fn condense_sequences(graph: &mut StatementGraph, root: StatId) -> Result<()> {
    condense_sequences_rec(graph, root)
}

fn parent_of(graph: &StatementGraph, stat: StatId) -> Result<StatId> {
    graph[stat]
        .parent
        .ok_or_else(|| DecompileError::invariant("statement has no parent", Some(stat), None))
}

fn condense_sequences_rec(graph: &mut StatementGraph, mut stat: StatId) -> Result<()> {
    if graph.stat_type(stat) == StatType::Sequence {
        let mut list = graph[stat].stats.clone();
        let mut unfolded = false;

        let mut i = 0;
        while i < list.len() {
            let st = list[i];
            if graph.stat_type(st) != StatType::Sequence {
                i += 1;
                continue;
            }
            remove_empty_statements(graph, st)?;
            let is_last = i == list.len() - 1;
            if !is_last && !is_sequence_disbandable(graph, st, list[i + 1]) {
                i += 1;
                continue;
            }

            let first = graph.first(st)?;
            for e in graph.all_predecessor_edges(st) {
                graph.remove_predecessor(st, e);
                graph.change_edge_node(Direction::Forward, e, first);
                graph.add_predecessor(first, e);
            }

            let last = *graph[st]
                .stats
                .last()
                .ok_or_else(|| DecompileError::invariant("empty sequence", Some(st), None))?;
            let last_succs = graph.all_successor_edges(last);
            if last_succs.is_empty() && !is_last {
                graph.add_successor(StatEdge::new(EdgeType::REGULAR, last, list[i + 1], None));
            } else {
                for e in last_succs {
                    if is_last {
                        if graph.edge(e).closure == Some(st) {
                            graph.add_labeled_edge(stat, e);
                        }
                    } else if graph.edge(e).edge_type != EdgeType::EXCEPTION {
                        graph.change_edge_type(e, EdgeType::REGULAR)?;
                        graph.remove_from_closure(e);
                    }
                }
            }

            for e in graph.all_successor_edges(st) {
                graph.remove_successor(e);
            }
            for e in graph[st].label_edges.clone() {
                if graph.edge(e).source != last {
                    graph.add_labeled_edge(last, e);
                }
            }

            let children = graph[st].stats.clone();
            list.splice(i..=i, children);
            unfolded = true;
        }

        if unfolded {
            let sequence = graph.new_sequence(list);
            graph.set_all_parent(sequence);
            let parent = parent_of(graph, stat)?;
            graph.replace_statement(parent, stat, sequence);
            stat = sequence;
        }
    }

    // sequence of one statement
    if graph.stat_type(stat) == StatType::Sequence {
        remove_empty_statements(graph, stat)?;
        if graph[stat].stats.len() == 1 {
            let st = graph.first(stat)?;
            let mut ok = true;
            if let Some(&edge) = graph.all_successor_edges(st).first() {
                ok = match graph.all_successor_edges(stat).first() {
                    None => true,
                    Some(&outer) => {
                        let same = graph.edge(edge).destination == graph.edge(outer).destination;
                        if same {
                            graph.remove_successor(edge);
                        }
                        same
                    }
                };
            }
            if ok {
                let parent = parent_of(graph, stat)?;
                graph.replace_statement(parent, stat, st);
                stat = st;
            }
        }
    }

    'flat: loop {
        for st in graph[stat].stats.clone() {
            if (graph[st].stats.is_empty() || graph[st].exprents.is_some())
                && graph.stat_type(st) != StatType::BasicBlock
            {
                destroy_and_flatten_statement(graph, st)?;
                continue 'flat;
            }
        }
        break;
    }

    let mut i = 0;
    while i < graph[stat].stats.len() {
        let child = graph[stat].stats[i];
        condense_sequences_rec(graph, child)?;
        i += 1;
    }
    Ok(())
}

fn is_sequence_disbandable(graph: &StatementGraph, block: StatId, next: StatId) -> bool {
    let Some(&last) = graph[block].stats.last() else {
        return false;
    };
    if let Some(&e) = graph.all_successor_edges(last).first() {
        if graph.edge(e).destination != next {
            return false;
        }
    }
    graph.predecessor_edges(next, EdgeType::BREAK).into_iter().all(|e| {
        let source = graph.edge(e).source;
        source == last || graph.contains_statement_strict(last, source)
    })
}

/// Removes empty expression blocks from `sequence`, rerouting their
/// incoming edges to wherever they led.
pub fn remove_empty_statements(graph: &mut StatementGraph, sequence: StatId) -> Result<()> {
    if graph[sequence].stats.len() <= 1 {
        return Ok(());
    }
    merge_flat_statements(graph, sequence);

    loop {
        let mut found = false;
        for st in graph[sequence].stats.clone() {
            if !graph[st].exprents.as_ref().map_or(false, Vec::is_empty) {
                continue;
            }
            let succs = graph.all_successor_edges(st);
            match succs.first() {
                None => {
                    if graph.predecessor_edges(st, EdgeType::BREAK).is_empty() {
                        for e in graph.all_predecessor_edges(st) {
                            graph.remove_successor(e);
                        }
                        found = true;
                    }
                }
                Some(&succ) => {
                    let (succ_type, succ_dest, succ_closure) = {
                        let e = graph.edge(succ);
                        (e.edge_type, e.destination, e.closure)
                    };
                    if succ_type != EdgeType::FINALLY_EXIT {
                        graph.remove_successor(succ);
                        for e in graph.all_predecessor_edges(st) {
                            if succ_type != EdgeType::REGULAR && graph.edge(e).edge_type != EdgeType::EXCEPTION {
                                graph.change_edge_type(e, succ_type)?;
                            }
                            graph.remove_predecessor(st, e);
                            graph.change_edge_node(Direction::Forward, e, succ_dest);
                            graph.add_predecessor(succ_dest, e);
                            if let Some(closure) = succ_closure {
                                graph.add_labeled_edge(closure, e);
                            }
                        }
                        found = true;
                    }
                }
            }
            if found {
                graph[sequence].stats.retain(|&s| s != st);
                break;
            }
        }
        if !found {
            break;
        }
    }
    graph[sequence].first = graph[sequence].stats.first().copied();
    Ok(())
}

/// Pushes expression lists forward into the next statement's first
/// expression list.
fn merge_flat_statements(graph: &mut StatementGraph, sequence: StatId) {
    loop {
        let mut found = false;
        let stats = graph[sequence].stats.clone();
        let mut next: Option<StatId> = None;
        for &current in stats.iter().rev() {
            if let Some(next) = next {
                let has_exprents = graph[current].exprents.as_ref().map_or(false, |l| !l.is_empty());
                if has_exprents {
                    if let Some(target) = first_exprent_list(graph, next) {
                        let moved = graph[current].exprents.replace(Vec::new()).unwrap_or_default();
                        let list = graph[target].exprents.get_or_insert_with(Vec::new);
                        list.splice(0..0, moved);
                        found = true;
                    }
                }
            }
            next = Some(current);
        }
        if !found {
            break;
        }
    }
}

fn first_exprent_list(graph: &StatementGraph, stat: StatId) -> Option<StatId> {
    if graph[stat].exprents.is_some() {
        return Some(stat);
    }
    match graph.stat_type(stat) {
        StatType::If | StatType::Sequence | StatType::Switch | StatType::Synchronized => {
            first_exprent_list(graph, graph[stat].first?)
        }
        _ => None,
    }
}

/// Replaces `stat` with a synthetic basic block holding its expressions.
pub fn destroy_and_flatten_statement(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    destroy_statement_content(graph, stat, false);
    let block = graph.add_empty_block();
    graph[block].exprents = Some(graph[stat].exprents.clone().unwrap_or_default());
    let parent = parent_of(graph, stat)?;
    graph.replace_statement(parent, stat, block);
    Ok(())
}

/// Detaches the subtree below `stat` (and `stat`'s own successor edges
/// when `include_self` is set).
pub fn destroy_statement_content(graph: &mut StatementGraph, stat: StatId, include_self: bool) {
    if include_self {
        for e in graph.all_successor_edges(stat) {
            graph.remove_successor(e);
        }
    }
    for child in graph[stat].stats.clone() {
        destroy_statement_content(graph, child, true);
    }
    graph[stat].stats.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::exprs::Exprent;
    use crate::decompile::statement::StatKind;

    fn block(g: &mut StatementGraph, value: i32) -> StatId {
        let b = g.add_empty_block();
        g[b].exprents = Some(vec![Exprent::int_const(value)]);
        b
    }

    fn rooted(g: &mut StatementGraph, first: StatId) -> StatId {
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g[root].first = Some(first);
        g[root].stats = vec![first];
        g[first].parent = Some(root);
        g.root = Some(root);
        root
    }

    #[test]
    fn nested_sequence_is_flattened() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g, 1);
        let b = block(&mut g, 2);
        let body = block(&mut g, 3);
        let lp = g.new_do(body);
        g.set_all_parent(lp);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let inner = g.new_sequence(vec![a, b]);
        g.set_all_parent(inner);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, inner, lp, None));
        let outer = g.new_sequence(vec![inner, lp]);
        g.set_all_parent(outer);
        let root = rooted(&mut g, outer);

        condense_sequences(&mut g, root).unwrap();
        let top = g.first(root).unwrap();
        assert_eq!(g.stat_type(top), StatType::Sequence);
        // `a` is pushed into `b`; a loop takes no leading expressions
        assert_eq!(g[top].stats, vec![b, lp]);
        assert_eq!(g[b].exprents, Some(vec![Exprent::int_const(1), Exprent::int_const(2)]));
        assert_eq!(g.neighbours(b, EdgeType::REGULAR, Direction::Forward), vec![lp]);
        assert_eq!(g[lp].parent, Some(top));
        g.verify_edges().unwrap();
    }

    #[test]
    fn nested_flat_sequence_collapses_into_its_last_block() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g, 1);
        let b = block(&mut g, 2);
        let c = block(&mut g, 3);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let inner = g.new_sequence(vec![a, b]);
        g.set_all_parent(inner);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, inner, c, None));
        let outer = g.new_sequence(vec![inner, c]);
        g.set_all_parent(outer);
        let root = rooted(&mut g, outer);

        condense_sequences(&mut g, root).unwrap();
        assert_eq!(g.first(root).unwrap(), c);
        assert_eq!(
            g[c].exprents,
            Some(vec![Exprent::int_const(1), Exprent::int_const(2), Exprent::int_const(3)])
        );
    }

    #[test]
    fn empty_block_is_removed() {
        let mut g = StatementGraph::new(0);
        let a = block(&mut g, 1);
        let empty = g.add_empty_block();
        let c = block(&mut g, 3);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, empty, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, empty, c, None));
        let seq = g.new_sequence(vec![a, empty, c]);
        g.set_all_parent(seq);

        remove_empty_statements(&mut g, seq).unwrap();
        // flat lists are merged forward first, leaving both leading blocks empty
        assert_eq!(g[seq].stats, vec![c]);
        assert_eq!(g[c].exprents, Some(vec![Exprent::int_const(1), Exprent::int_const(3)]));
        assert!(g.all_predecessor_edges(c).is_empty());
        g.verify_edges().unwrap();
    }
}
