//! Return and throw placement: copies single-exit blocks to the jumps that
//! reach them, and drops `return;` where falling off the method is enough.

use tracing::debug;

use super::error::{DecompileError, Result};
use super::exprs::{ExitKind, ExprKind};
use super::merge_helper::is_direct_path;
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::{IfType, LoopType};

pub fn condense_exits(graph: &mut StatementGraph, root: StatId) -> Result<bool> {
    let changed = integrate_exits(graph, root)?;
    if changed {
        clean_up_unreachable_blocks(graph, root);
        sequence_helper::condense_sequences(graph, root)?;
    }
    Ok(changed)
}

fn integrate_exits(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let mut ret = false;

    if graph[stat].exprents.is_none() {
        'restart: loop {
            for child in graph[stat].stats.clone() {
                if integrate_exits(graph, child)? {
                    ret = true;
                    continue 'restart;
                }
            }
            break;
        }

        if let Some(data) = graph.if_data(stat) {
            if data.if_stat.is_none() {
                if let Some(if_edge) = data.if_edge {
                    if let Some(dest) = exit_destination(graph, if_edge) {
                        let head = graph.first(stat)?;
                        let block = copy_exit_block(graph, dest)?;
                        graph.remove_successor(if_edge);
                        let new_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, head, block, None));
                        graph.expect_if_mut(stat)?.if_edge = Some(new_edge);
                        graph.set_if_stat(stat, Some(block))?;
                        debug!(stat, exit = dest, "copied exit into if branch");
                        ret = true;
                    }
                }
            }
        }
    }

    let succs = graph.all_successor_edges(stat);
    let [edge] = succs.as_slice() else {
        return Ok(ret);
    };
    let edge = *edge;
    if graph.edge(edge).edge_type != EdgeType::BREAK || !graph[stat].label_edges.is_empty() {
        return Ok(ret);
    }
    let Some(parent) = graph[stat].parent else {
        return Ok(ret);
    };
    let parent_type = graph.stat_type(parent);
    if graph[parent].first == Some(stat) && matches!(parent_type, StatType::If | StatType::Switch) {
        return Ok(ret);
    }
    let Some(dest) = exit_destination(graph, edge) else {
        return Ok(ret);
    };

    graph.remove_successor(edge);
    let block = copy_exit_block(graph, dest)?;
    let seq = graph.new_sequence(vec![stat, block]);
    graph.set_all_parent(seq);
    graph.replace_statement(parent, stat, seq);

    // continues into the new sequence belong to its head
    for e in graph.predecessor_edges(seq, EdgeType::CONTINUE) {
        graph.remove_predecessor(seq, e);
        graph.change_edge_node(Direction::Forward, e, stat);
        graph.add_predecessor(stat, e);
        graph.add_labeled_edge(stat, e);
    }
    graph.add_successor(StatEdge::new(EdgeType::REGULAR, stat, block, None));

    for e in graph.all_predecessor_edges(dest) {
        let (explicit, source, closure) = {
            let edge = graph.edge(e);
            (edge.explicit, edge.source, edge.closure)
        };
        let Some(source_parent) = graph[source].parent else {
            continue;
        };
        if !explicit && graph.contains_statement_strict(stat, source) && is_direct_path(graph, source_parent, block) {
            graph.remove_predecessor(dest, e);
            graph.change_edge_node(Direction::Forward, e, block);
            graph.add_predecessor(block, e);
            if !closure.map_or(false, |c| graph.contains_statement_strict(stat, c)) {
                graph.add_labeled_edge(stat, e);
            }
        }
    }
    debug!(stat, exit = dest, "copied exit behind statement");
    Ok(true)
}

/// New block holding a copy of the exit in `dest`, jumping where `dest`
/// jumps.
fn copy_exit_block(graph: &mut StatementGraph, dest: StatId) -> Result<StatId> {
    let exprents = graph[dest].exprents.clone().unwrap_or_default();
    let block = graph.add_empty_block();
    graph[block].exprents = Some(exprents);

    let old_exit = graph
        .all_successor_edges(dest)
        .first()
        .copied()
        .ok_or_else(|| DecompileError::invariant("exit block without successor", Some(dest), None))?;
    let (target, closure) = (graph.edge(old_exit).destination, graph.edge(old_exit).closure);
    graph.add_successor(StatEdge::new(EdgeType::BREAK, block, target, closure));
    Ok(block)
}

/// The single-exprent return/throw block an explicit break leads to.
fn exit_destination(graph: &StatementGraph, edge: EdgeId) -> Option<StatId> {
    let e = graph.edge(edge);
    let dest = e.destination;
    if e.edge_type != EdgeType::BREAK
        || graph.stat_type(dest) != StatType::BasicBlock
        || !e.explicit
        || !(e.labeled || is_only_edge(graph, edge))
    {
        return None;
    }
    match graph[dest].exprents.as_deref() {
        Some([single]) if matches!(single.kind, ExprKind::Exit { .. }) => Some(dest),
        _ => None,
    }
}

fn is_only_edge(graph: &StatementGraph, edge: EdgeId) -> bool {
    let dest = graph.edge(edge).destination;
    graph.all_predecessor_edges(dest).into_iter().all(|e| {
        if e == edge {
            return true;
        }
        if graph.edge(e).edge_type != EdgeType::REGULAR {
            return false;
        }
        let source = graph.edge(e).source;
        match graph.stat_type(source) {
            StatType::BasicBlock => false,
            StatType::If => graph.if_data(source).map_or(true, |d| d.if_type != IfType::If),
            StatType::Do => graph.do_data(source).map_or(true, |d| d.loop_type == LoopType::Do),
            _ => true,
        }
    })
}

/// Empties a sequence tail that lost every entry after its exit was
/// copied away.
fn clean_up_unreachable_blocks(graph: &mut StatementGraph, stat: StatId) {
    'restart: loop {
        for child in graph[stat].stats.clone() {
            clean_up_unreachable_blocks(graph, child);
            if graph.stat_type(child) != StatType::Sequence || graph[child].stats.len() < 2 {
                continue;
            }
            let stats = &graph[child].stats;
            let last = stats[stats.len() - 1];
            let second_last = stats[stats.len() - 2];
            let has_content = graph[last].exprents.as_ref().map_or(true, |l| !l.is_empty());
            if !has_content || graph.has_basic_succ_edge(second_last) {
                continue;
            }
            let mut preds = graph.neighbours_set(last, EdgeType::DIRECT_ALL, Direction::Backward);
            preds.remove(&second_last);
            if preds.is_empty() {
                graph[last].exprents = Some(Vec::new());
                continue 'restart;
            }
        }
        return;
    }
}

/// Removes `return;` at the end of blocks that fall through to the method
/// exit anyway.
pub fn remove_redundant_returns(graph: &mut StatementGraph) -> Result<bool> {
    let Some(exit) = graph.dummy_exit() else {
        return Ok(false);
    };
    let mut changed = false;
    for e in graph.all_predecessor_edges(exit) {
        if graph.edge(e).explicit {
            continue;
        }
        let source = graph.edge(e).source;
        let Some(list) = graph[source].exprents.as_mut() else {
            continue;
        };
        let redundant = matches!(
            list.last().map(|x| &x.kind),
            Some(ExprKind::Exit { kind: ExitKind::Return, value: None, .. })
        );
        if redundant {
            list.pop();
            changed = true;
        }
    }
    if changed {
        debug!("removed redundant returns");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::VarType;
    use crate::decompile::exprs::Exprent;
    use crate::decompile::statement::StatKind;

    #[test]
    fn implicit_void_return_is_dropped() {
        let mut g = StatementGraph::new(0);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let body = g.add_empty_block();
        g[body].exprents = Some(vec![
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(3)),
            Exprent::exit(ExitKind::Return, None, VarType::Void),
        ]);
        let e = g.add_successor(StatEdge::new(EdgeType::BREAK, body, exit, Some(root)));
        g.edge_mut(e).explicit = false;

        assert!(remove_redundant_returns(&mut g).unwrap());
        assert_eq!(g[body].exprents.as_ref().unwrap().len(), 1);
        assert!(!remove_redundant_returns(&mut g).unwrap());
    }

    #[test]
    fn value_return_is_kept() {
        let mut g = StatementGraph::new(0);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let body = g.add_empty_block();
        g[body].exprents = Some(vec![Exprent::exit(
            ExitKind::Return,
            Some(Exprent::int_const(1)),
            VarType::Int,
        )]);
        let e = g.add_successor(StatEdge::new(EdgeType::BREAK, body, exit, Some(root)));
        g.edge_mut(e).explicit = false;
        assert!(!remove_redundant_returns(&mut g).unwrap());
    }
}
