//! Inlines the tail of a sequence into the statement that breaks to it,
//! when that break is the tail's only entry.

use tracing::debug;

use super::error::{DecompileError, Result};
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::IfType;

pub fn inline_single_blocks(graph: &mut StatementGraph, root: StatId) -> Result<bool> {
    let changed = inline_single_blocks_rec(graph, root)?;
    if changed {
        sequence_helper::condense_sequences(graph, root)?;
    }
    Ok(changed)
}

fn inline_single_blocks_rec(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let mut changed = false;
    for child in graph[stat].stats.clone() {
        changed |= inline_single_blocks_rec(graph, child)?;
    }
    if graph.stat_type(stat) == StatType::Sequence {
        for i in 1..graph[stat].stats.len() {
            if is_inlineable(graph, stat, i) {
                inline_block(graph, stat, i)?;
                return Ok(true);
            }
        }
    }
    Ok(changed)
}

fn inline_block(graph: &mut StatementGraph, seq: StatId, index: usize) -> Result<()> {
    let first = graph[seq].stats[index];
    let pre = graph[seq].stats[index - 1];
    if let Some(e) = graph.all_successor_edges(pre).first().copied() {
        graph.remove_successor(e);
    }

    let edge = graph
        .predecessor_edges(first, EdgeType::BREAK)
        .first()
        .copied()
        .ok_or_else(|| DecompileError::invariant("inlined block has no break entry", Some(first), None))?;
    let source = graph.edge(edge).source;
    let parent = graph[source]
        .parent
        .ok_or_else(|| DecompileError::invariant("break source has no parent", Some(source), None))?;
    graph.remove_successor(edge);
    debug!(block = first, source, "inlining block into break source");

    let mut tail: Vec<StatId> = graph[seq].stats.split_off(index);

    let plain_if = graph
        .if_data(parent)
        .map_or(false, |d| d.if_type == IfType::If)
        && graph[parent].first == Some(source);

    if plain_if {
        let block = graph.new_sequence(tail);
        graph.set_all_parent(block);
        let new_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, source, block, None));
        graph.expect_if_mut(parent)?.if_edge = Some(new_edge);
        graph.set_if_stat(parent, Some(block))?;
    } else {
        tail.insert(0, source);
        let block = graph.new_sequence(tail);
        graph.set_all_parent(block);
        graph.replace_statement(parent, source, block);

        // continues into the new block belong to its head
        for e in graph.predecessor_edges(block, EdgeType::CONTINUE) {
            graph.remove_predecessor(block, e);
            graph.change_edge_node(Direction::Forward, e, source);
            graph.add_predecessor(source, e);
            graph.add_labeled_edge(source, e);
        }

        if graph.stat_type(parent) == StatType::Switch {
            graph.sort_switch_edges_and_nodes(parent)?;
        }
        graph.add_successor(StatEdge::new(EdgeType::REGULAR, source, first, None));
    }
    Ok(())
}

fn is_inlineable(graph: &StatementGraph, seq: StatId, index: usize) -> bool {
    let first = graph[seq].stats[index];
    let pre = graph[seq].stats[index - 1];
    if graph.has_basic_succ_edge(pre) {
        return false;
    }

    let breaks = graph.predecessor_edges(first, EdgeType::BREAK);
    let [edge] = breaks.as_slice() else {
        return false;
    };
    if !same_catch_ranges(graph, *edge) || !graph.edge(*edge).can_inline {
        return false;
    }
    if graph.edge(*edge).explicit {
        return true;
    }
    graph[seq].stats[index..]
        .iter()
        .all(|&st| no_exit_labels(graph, st, seq))
}

/// Whether `edge` leaves no try body or synchronized body on its way out.
fn same_catch_ranges(graph: &StatementGraph, edge: EdgeId) -> bool {
    let to = graph.edge(edge).destination;
    let mut from = graph.edge(edge).source;
    while let Some(parent) = graph[from].parent {
        if graph.contains_statement_strict(parent, to) {
            break;
        }
        match graph.stat_type(parent) {
            StatType::Trycatch | StatType::CatchAll => {
                if graph[parent].first == Some(from) {
                    return false;
                }
            }
            StatType::Synchronized => {
                if graph[parent].stats.get(1) == Some(&from) {
                    return false;
                }
            }
            _ => {}
        }
        from = parent;
    }
    true
}

fn no_exit_labels(graph: &StatementGraph, block: StatId, sequence: StatId) -> bool {
    let leaves = graph.all_successor_edges(block).into_iter().any(|e| {
        let edge = graph.edge(e);
        edge.edge_type != EdgeType::REGULAR
            && graph.stat_type(edge.destination) != StatType::DummyExit
            && !graph.contains_statement_strict(sequence, edge.destination)
    });
    !leaves && graph[block].stats.iter().all(|&st| no_exit_labels(graph, st, sequence))
}

/// Whether a break from `source` to the end of `closure` would need a
/// label to get past an intervening loop or switch.
pub fn is_break_edge_labeled(graph: &StatementGraph, source: StatId, closure: StatId) -> bool {
    match graph.stat_type(closure) {
        StatType::Do | StatType::Switch => {
            let Some(parent) = graph[source].parent else {
                return false;
            };
            parent != closure
                && (matches!(graph.stat_type(parent), StatType::Do | StatType::Switch)
                    || is_break_edge_labeled(graph, parent, closure))
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_through_inner_loop_needs_label() {
        let mut g = StatementGraph::new(0);
        let body = g.add_empty_block();
        let inner = g.new_do(body);
        g.set_all_parent(inner);
        let outer = g.new_do(inner);
        g.set_all_parent(outer);

        assert!(is_break_edge_labeled(&g, body, outer));
        assert!(!is_break_edge_labeled(&g, body, inner));
        // anything but a loop or switch always renders its label
        let seq = g.new_sequence(vec![]);
        assert!(is_break_edge_labeled(&g, body, seq));
    }
}
