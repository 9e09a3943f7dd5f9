//! Loop shape upgrades: `while(true)` loops become `while`, `do-while` or
//! `for` loops when their guard and increment can be lifted into the
//! header.

use tracing::debug;

use super::error::{DecompileError, Result};
use super::exprs::{ExprKind, Exprent};
use super::label_helper;
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::{IfType, LoopType};

pub fn enhance_loops(graph: &mut StatementGraph, root: StatId) -> Result<()> {
    while enhance_loops_rec(graph, root)? {}
    sequence_helper::condense_sequences(graph, root)
}

fn enhance_loops_rec(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let mut changed = false;
    let mut i = 0;
    while i < graph[stat].stats.len() {
        let child = graph[stat].stats[i];
        if graph[child].exprents.is_none() {
            changed |= enhance_loops_rec(graph, child)?;
        }
        i += 1;
    }
    if graph.stat_type(stat) == StatType::Do {
        changed |= enhance_loop(graph, stat)?;
    }
    Ok(changed)
}

fn loop_type(graph: &StatementGraph, stat: StatId) -> Result<LoopType> {
    graph
        .do_data(stat)
        .map(|d| d.loop_type)
        .ok_or_else(|| DecompileError::invariant("expected a loop", Some(stat), None))
}

fn set_loop_type(graph: &mut StatementGraph, stat: StatId, loop_type: LoopType) {
    if let Some(d) = graph.do_data_mut(stat) {
        d.loop_type = loop_type;
    }
}

fn enhance_loop(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let old = loop_type(graph, stat)?;
    match old {
        LoopType::Do => {
            if match_while(graph, stat)? {
                match_for(graph, stat)?;
            } else {
                match_do_while(graph, stat)?;
            }
        }
        LoopType::While => match_for(graph, stat)?,
        _ => {}
    }
    let new = loop_type(graph, stat)?;
    if new != old {
        debug!(stat, ?old, ?new, "loop upgraded");
    }
    Ok(new != old)
}

/// Installs the condition of `if_exprent` as the loop condition, keeping
/// the offsets of both the if and any previous condition.
fn set_loop_condition(graph: &mut StatementGraph, stat: StatId, if_exprent: Exprent, negate: bool) -> Result<()> {
    let mut if_exprent = if_exprent;
    if negate {
        if_exprent.negate_if();
    }
    let offsets = if_exprent.bytecode.clone();
    let ExprKind::If { condition } = if_exprent.kind else {
        return Err(DecompileError::invariant("if head is not a condition", Some(stat), None));
    };
    let mut condition = *condition;
    condition.add_bytecode_offsets(&offsets);
    if let Some(d) = graph.do_data_mut(stat) {
        if let Some(old) = &d.condition {
            condition.add_bytecode_offsets(&old.bytecode);
        }
        d.condition = Some(condition);
    }
    Ok(())
}

fn head_exprent(graph: &StatementGraph, if_stat: StatId) -> Result<Exprent> {
    graph
        .expect_if(if_stat)?
        .head_exprent
        .clone()
        .ok_or_else(|| DecompileError::invariant("if without condition", Some(if_stat), None))
}

/// Re-homes an exit edge of a consumed if onto the loop itself.
fn move_exit_to_loop(graph: &mut StatementGraph, stat: StatId, edge: EdgeId) {
    graph.change_edge_node(Direction::Backward, edge, stat);
    if graph.edge(edge).closure == Some(stat) {
        graph.edge_mut(edge).closure = graph[stat].parent;
    }
    graph.attach_successor(edge);
}

fn is_empty_list(graph: &StatementGraph, stat: StatId) -> bool {
    graph[stat].exprents.as_ref().map_or(false, Vec::is_empty)
}

fn match_do_while(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    let mut last = graph.first(stat)?;
    while graph.stat_type(last) == StatType::Sequence {
        last = *graph[last]
            .stats
            .last()
            .ok_or_else(|| DecompileError::invariant("empty sequence", Some(last), None))?;
    }
    let Some(data) = graph.if_data(last) else {
        return Ok(());
    };
    if data.if_type != IfType::If || data.if_stat.is_some() {
        return Ok(());
    }
    let Some(if_edge) = data.if_edge else {
        return Ok(());
    };
    let Some(else_edge) = graph.all_successor_edges(last).first().copied() else {
        return Ok(());
    };

    let (if_type, if_dest, if_closure) = {
        let e = graph.edge(if_edge);
        (e.edge_type, e.destination, e.closure)
    };
    let (else_type, else_dest, else_closure) = {
        let e = graph.edge(else_edge);
        (e.edge_type, e.destination, e.closure)
    };
    let matches = (if_type == EdgeType::BREAK
        && else_type == EdgeType::CONTINUE
        && else_closure == Some(stat)
        && is_direct_path(graph, stat, if_dest))
        || (if_type == EdgeType::CONTINUE
            && else_type == EdgeType::BREAK
            && if_closure == Some(stat)
            && is_direct_path(graph, stat, else_dest));
    if !matches {
        return Ok(());
    }

    let mut continues = graph.neighbours_set(stat, EdgeType::CONTINUE, Direction::Backward);
    continues.remove(&last);
    if !continues.is_empty() {
        return Ok(());
    }

    set_loop_type(graph, stat, LoopType::DoWhile);
    let head = head_exprent(graph, last)?;
    set_loop_condition(graph, stat, head, if_type == EdgeType::BREAK)?;

    graph.remove_successor(if_edge);
    graph.remove_successor(else_edge);

    let if_head = graph.first(last)?;
    if is_empty_list(graph, if_head) {
        remove_last_empty_statement(graph, stat, last)?;
    } else {
        graph[last].exprents = graph[if_head].exprents.clone();
        graph.add_successor(StatEdge::new(EdgeType::CONTINUE, last, stat, Some(stat)));
    }

    if graph.all_successor_edges(stat).is_empty() {
        let exit = if else_type == EdgeType::CONTINUE { if_edge } else { else_edge };
        move_exit_to_loop(graph, stat, exit);
    }
    Ok(())
}

fn match_while(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    let mut first = graph.first(stat)?;
    while graph.stat_type(first) == StatType::Sequence {
        first = graph.first(first)?;
    }
    let Some(data) = graph.if_data(first) else {
        return Ok(false);
    };
    if data.if_type != IfType::If {
        return Ok(false);
    }
    let (branch, if_edge) = (data.if_stat, data.if_edge);
    let Some(if_edge) = if_edge else {
        return Ok(false);
    };
    let if_head = graph.first(first)?;
    if !is_empty_list(graph, if_head) {
        return Ok(false);
    }

    match branch {
        None => {
            let dest = graph.edge(if_edge).destination;
            if !is_direct_path(graph, stat, dest) {
                return Ok(false);
            }
            set_loop_type(graph, stat, LoopType::While);
            let head = head_exprent(graph, first)?;
            set_loop_condition(graph, stat, head, true)?;

            graph.remove_successor(if_edge);
            if let Some(e) = graph.all_successor_edges(first).first().copied() {
                graph.remove_successor(e);
            }
            if graph.all_successor_edges(stat).is_empty() {
                move_exit_to_loop(graph, stat, if_edge);
            }

            if Some(first) == graph[stat].first {
                let block = graph.add_empty_block();
                graph.replace_statement(stat, first, block);
            } else {
                let sequence = graph[first]
                    .parent
                    .ok_or_else(|| DecompileError::invariant("if has no parent", Some(first), None))?;
                graph[sequence].stats.retain(|&s| s != first);
                graph[sequence].first = graph[sequence].stats.first().copied();
            }
            Ok(true)
        }
        Some(branch) => {
            let Some(else_edge) = graph.all_successor_edges(first).first().copied() else {
                return Ok(false);
            };
            let else_dest = graph.edge(else_edge).destination;
            if !is_direct_path(graph, stat, else_dest) {
                return Ok(false);
            }
            set_loop_type(graph, stat, LoopType::While);
            let head = head_exprent(graph, first)?;
            set_loop_condition(graph, stat, head, false)?;

            graph.remove_successor(if_edge);
            graph.remove_successor(else_edge);
            if graph.all_successor_edges(stat).is_empty() {
                move_exit_to_loop(graph, stat, else_edge);
            }

            let parent = graph[first]
                .parent
                .ok_or_else(|| DecompileError::invariant("if has no parent", Some(first), None))?;
            graph.replace_statement(parent, first, branch);

            for e in graph.predecessor_edges(else_dest, EdgeType::BREAK) {
                if let Some(closure) = graph.edge(e).closure {
                    if graph.contains_statement_strict(stat, closure) {
                        graph.add_labeled_edge(stat, e);
                    }
                }
            }
            label_helper::low_closures(graph, stat);
            Ok(true)
        }
    }
}

fn match_for(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    let body = graph.first(stat)?;
    let Some(last_data) = last_direct_data(graph, body) else {
        return Ok(());
    };
    let (count, last_kind_ok) = match graph[last_data].exprents.as_ref().and_then(|l| l.last().map(|e| (l.len(), e))) {
        None => return Ok(()),
        Some((len, e)) => (len, matches!(e.kind, ExprKind::Assignment { .. } | ExprKind::Function { .. })),
    };

    // a lone expression reached by several edges is the continue target
    let single = count == 1 && graph.all_predecessor_edges(last_data).len() > 1;
    if !single && !last_kind_ok {
        return Ok(());
    }

    let mut pre_data = None;
    let mut current = stat;
    while let Some(parent) = graph[current].parent {
        if graph.stat_type(parent) != StatType::Sequence {
            break;
        }
        if Some(current) == graph[parent].first {
            current = parent;
            continue;
        }
        let pred = graph.neighbours(current, EdgeType::REGULAR, Direction::Backward).first().copied();
        if let Some(pre) = pred.and_then(|p| last_direct_data(graph, p)) {
            let init_ok = graph[pre]
                .exprents
                .as_ref()
                .and_then(|l| l.last())
                .map_or(false, Exprent::is_assignment);
            if init_ok {
                pre_data = Some(pre);
            }
        }
        break;
    }

    if pre_data.is_none() && !single {
        return Ok(());
    }

    let mut continues = graph.neighbours_set(stat, EdgeType::CONTINUE, Direction::Backward);
    continues.remove(&last_data);
    if !continues.is_empty() {
        return Ok(());
    }

    set_loop_type(graph, stat, LoopType::For);
    if let Some(pre) = pre_data {
        if let Some(mut init) = graph[pre].exprents.as_mut().and_then(Vec::pop) {
            if let Some(d) = graph.do_data_mut(stat) {
                if let Some(old) = &d.init {
                    init.add_bytecode_offsets(&old.bytecode);
                }
                d.init = Some(init);
            }
        }
    }
    if let Some(mut inc) = graph[last_data].exprents.as_mut().and_then(Vec::pop) {
        if let Some(d) = graph.do_data_mut(stat) {
            if let Some(old) = &d.inc {
                inc.add_bytecode_offsets(&old.bytecode);
            }
            d.inc = Some(inc);
        }
    }

    if is_empty_list(graph, last_data) {
        if let Some(e) = graph.all_successor_edges(last_data).first().copied() {
            graph.remove_successor(e);
        }
        remove_last_empty_statement(graph, stat, last_data)?;
    }
    Ok(())
}

fn remove_last_empty_statement(graph: &mut StatementGraph, do_stat: StatId, stat: StatId) -> Result<()> {
    if Some(stat) == graph[do_stat].first {
        let block = graph.add_empty_block();
        graph.replace_statement(do_stat, stat, block);
        return Ok(());
    }
    for e in graph.all_predecessor_edges(stat) {
        if graph.edge(e).edge_type != EdgeType::EXCEPTION {
            graph.change_edge_type(e, EdgeType::CONTINUE)?;
        }
        graph.remove_predecessor(stat, e);
        graph.change_edge_node(Direction::Forward, e, do_stat);
        graph.add_predecessor(do_stat, e);
        graph.add_labeled_edge(do_stat, e);
    }
    let parent = graph[stat]
        .parent
        .ok_or_else(|| DecompileError::invariant("statement has no parent", Some(stat), None))?;
    graph[parent].stats.retain(|&s| s != stat);
    graph[parent].first = graph[parent].stats.first().copied();
    Ok(())
}

/// The basic block whose expressions run last in `stat`, skipping empty
/// trailing blocks of a sequence.
fn last_direct_data(graph: &StatementGraph, stat: StatId) -> Option<StatId> {
    if graph[stat].exprents.is_some() {
        return Some(stat);
    }
    if graph.stat_type(stat) == StatType::Sequence {
        for &child in graph[stat].stats.iter().rev() {
            let found = last_direct_data(graph, child)?;
            if !is_empty_list(graph, found) {
                return Some(found);
            }
        }
    }
    None
}

/// Whether control falling off the end of `stat` arrives at `end`.
pub fn is_direct_path(graph: &StatementGraph, stat: StatId, end: StatId) -> bool {
    let succs = graph.neighbours(stat, EdgeType::DIRECT_ALL, Direction::Forward);
    if !succs.is_empty() {
        return succs.contains(&end);
    }
    let Some(parent) = graph[stat].parent else {
        return false;
    };
    match graph.stat_type(parent) {
        StatType::Root => graph.stat_type(end) == StatType::DummyExit,
        StatType::Do => end == parent,
        StatType::Switch => {
            let cases = graph
                .switch_data(parent)
                .map(|sw| sw.case_statements.clone())
                .unwrap_or_default();
            match cases.iter().position(|&c| c == stat) {
                Some(i) if i + 1 < cases.len() => end == label_helper::skip_empty_case(graph, cases[i + 1]),
                _ => is_direct_path(graph, parent, end),
            }
        }
        _ => is_direct_path(graph, parent, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::statement::StatKind;

    #[test]
    fn direct_path_through_parents() {
        let mut g = StatementGraph::new(0);
        let a = g.add_empty_block();
        let b = g.add_empty_block();
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        let seq = g.new_sequence(vec![a, b]);
        g.set_all_parent(seq);
        let lp = g.new_do(seq);
        g.set_all_parent(lp);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g[root].stats = vec![lp];
        g[root].first = Some(lp);
        g.set_all_parent(root);

        assert!(is_direct_path(&g, a, b));
        assert!(!is_direct_path(&g, a, lp));
        // falling off the loop body continues the loop
        assert!(is_direct_path(&g, b, lp));
        assert!(is_direct_path(&g, lp, exit));
    }
}
