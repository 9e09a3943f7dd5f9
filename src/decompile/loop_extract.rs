//! Moves the exiting branch of an endless loop behind the loop, turning
//! `while (true) { ..; if (c) { tail; return; } }` into a loop that breaks
//! out to `tail`.

use tracing::debug;

use super::error::Result;
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::{IfType, LoopType};

pub fn extract_loops(graph: &mut StatementGraph, root: StatId) -> Result<bool> {
    let changed = extract_loops_rec(graph, root)? != Extracted::None;
    if changed {
        sequence_helper::condense_sequences(graph, root)?;
    }
    Ok(changed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Extracted {
    None,
    Below,
    /// `stat` itself was restructured; its parent must rescan.
    Here,
}

fn extract_loops_rec(graph: &mut StatementGraph, stat: StatId) -> Result<Extracted> {
    let mut res = false;
    'restart: loop {
        for child in graph[stat].stats.clone() {
            let extracted = extract_loops_rec(graph, child)?;
            res |= extracted != Extracted::None;
            if extracted == Extracted::Here {
                continue 'restart;
            }
        }
        break;
    }

    if graph.stat_type(stat) == StatType::Do && extract_loop(graph, stat)? {
        return Ok(Extracted::Here);
    }
    Ok(if res { Extracted::Below } else { Extracted::None })
}

fn extract_loop(graph: &mut StatementGraph, stat: StatId) -> Result<bool> {
    if graph.do_data(stat).map(|d| d.loop_type) != Some(LoopType::Do) {
        return Ok(false);
    }
    let only_continues = graph[stat].label_edges.iter().all(|&e| {
        let edge = graph.edge(e);
        edge.edge_type == EdgeType::CONTINUE || graph.stat_type(edge.destination) == StatType::DummyExit
    });
    if !only_continues {
        return Ok(false);
    }
    if let Some(found) = last_if(graph, stat)? {
        extract_if_block(graph, stat, found)?;
        return Ok(true);
    }
    if let Some(found) = first_if(graph, stat)? {
        extract_if_block(graph, stat, found)?;
        return Ok(true);
    }
    Ok(false)
}

/// An if ending the loop body whose fall-through continues the loop.
fn last_if(graph: &StatementGraph, stat: StatId) -> Result<Option<StatId>> {
    let mut last = graph.first(stat)?;
    while graph.stat_type(last) == StatType::Sequence {
        match graph[last].stats.last() {
            Some(&l) => last = l,
            None => return Ok(None),
        }
    }
    let Some(data) = graph.if_data(last) else {
        return Ok(None);
    };
    let Some(branch) = data.if_stat else {
        return Ok(None);
    };
    if data.if_type != IfType::If {
        return Ok(None);
    }
    let Some(&else_edge) = graph.all_successor_edges(last).first() else {
        return Ok(None);
    };
    let edge = graph.edge(else_edge);
    if edge.edge_type != EdgeType::CONTINUE || edge.closure != Some(stat) {
        return Ok(None);
    }
    let mut continues = graph.neighbours_set(stat, EdgeType::CONTINUE, Direction::Backward);
    continues.remove(&last);
    if !continues.is_empty() {
        return Ok(None);
    }
    Ok(is_extern_statement(graph, stat, branch, branch).then_some(last))
}

/// An if opening the loop body with nothing evaluated before it.
fn first_if(graph: &StatementGraph, stat: StatId) -> Result<Option<StatId>> {
    let mut first = graph.first(stat)?;
    while graph.stat_type(first) == StatType::Sequence {
        first = graph.first(first)?;
    }
    let Some(data) = graph.if_data(first) else {
        return Ok(None);
    };
    let head = graph.first(first)?;
    if !graph[head].exprents.as_ref().map_or(false, Vec::is_empty) {
        return Ok(None);
    }
    match data.if_stat {
        Some(branch) if data.if_type == IfType::If => {
            Ok(is_extern_statement(graph, stat, branch, branch).then_some(first))
        }
        _ => Ok(None),
    }
}

/// Whether no jump inside `stat` leads back into the loop outside `block`.
fn is_extern_statement(graph: &StatementGraph, lp: StatId, block: StatId, stat: StatId) -> bool {
    let leaves_ok = graph.all_successor_edges(stat).into_iter().all(|e| {
        let dest = graph.edge(e).destination;
        !graph.contains_statement(lp, dest) || graph.contains_statement(block, dest)
    });
    leaves_ok
        && graph[stat]
            .stats
            .iter()
            .all(|&child| is_extern_statement(graph, lp, block, child))
}

fn extract_if_block(graph: &mut StatementGraph, lp: StatId, ifstat: StatId) -> Result<()> {
    let data = graph.expect_if(ifstat)?;
    let (Some(target), Some(if_edge)) = (data.if_stat, data.if_edge) else {
        return Ok(());
    };
    let parent = match graph[lp].parent {
        Some(p) => p,
        None => return Ok(()),
    };

    graph.set_if_stat(ifstat, None)?;
    graph.change_edge_type(if_edge, EdgeType::BREAK)?;
    graph.add_labeled_edge(lp, if_edge);

    let block = graph.new_sequence(vec![lp, target]);
    graph.replace_statement(parent, lp, block);
    graph.set_all_parent(block);
    graph.add_successor(StatEdge::new(EdgeType::REGULAR, lp, target, None));

    for e in graph[block].label_edges.clone() {
        if graph.edge(e).edge_type == EdgeType::CONTINUE || e == if_edge {
            graph.add_labeled_edge(lp, e);
        }
    }
    for e in graph.predecessor_edges(block, EdgeType::CONTINUE) {
        if graph.contains_statement_strict(lp, graph.edge(e).source) {
            graph.remove_predecessor(block, e);
            graph.change_edge_node(Direction::Forward, e, lp);
            graph.add_predecessor(lp, e);
        }
    }
    debug!(lp, ifstat, "extracted loop exit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::exprs::Exprent;
    use crate::decompile::descriptor::VarType;
    use crate::decompile::statement::StatKind;
    use crate::decompile::stats::IfStat;

    #[test]
    fn leading_exit_if_moves_behind_loop() {
        let mut g = StatementGraph::new(0);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);

        let head = g.add_empty_block();
        let tail = g.add_empty_block();
        g[tail].exprents = Some(vec![Exprent::int_const(1)]);
        let body = g.add_empty_block();
        g[body].exprents = Some(vec![Exprent::int_const(2)]);
        let cond = g.add_statement(StatKind::If(IfStat {
            head_exprent: Some(Exprent::if_expr(Exprent::var(0, VarType::Boolean))),
            ..IfStat::default()
        }));
        g[cond].first = Some(head);
        g[cond].stats.push(head);
        let if_edge = g.add_successor(StatEdge::new(EdgeType::REGULAR, head, tail, None));
        g.expect_if_mut(cond).unwrap().if_edge = Some(if_edge);
        g.set_if_stat(cond, Some(tail)).unwrap();
        g.set_all_parent(cond);
        g.add_successor(StatEdge::new(EdgeType::BREAK, tail, exit, Some(root)));

        let seq = g.new_sequence(vec![cond, body]);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, cond, body, None));
        g.set_all_parent(seq);
        let lp = g.new_do(seq);
        g.set_all_parent(lp);
        g.add_successor(StatEdge::new(EdgeType::CONTINUE, body, lp, Some(lp)));
        g[root].stats = vec![lp];
        g[root].first = Some(lp);
        g.set_all_parent(root);

        assert!(extract_loops(&mut g, root).unwrap());
        let outer = g.first(root).unwrap();
        assert_eq!(g.stat_type(outer), StatType::Sequence);
        assert_eq!(g[outer].stats, vec![lp, tail]);
        assert_eq!(g.expect_if(cond).unwrap().if_stat, None);
        assert_eq!(g.edge(if_edge).edge_type, EdgeType::BREAK);
        assert_eq!(g.edge(if_edge).closure, Some(lp));
        assert_eq!(g.neighbours(lp, EdgeType::REGULAR, Direction::Forward), vec![tail]);
        g.verify_edges().unwrap();
    }
}
