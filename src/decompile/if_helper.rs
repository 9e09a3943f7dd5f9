//! Merging of nested and chained ifs into compound conditions, and
//! reordering of if/else branches so fall-through tails become structured.

use std::collections::HashSet;

use tracing::debug;

use super::error::{DecompileError, Result};
use super::exprs::{Exprent, FunctionType};
use super::merge_helper::is_direct_path;
use super::sequence_helper;
use super::stat_edge::{Direction, EdgeType, StatEdge};
use super::statement::{StatId, StatType, StatementGraph};
use super::stats::IfType;

/// How an [`IfNode`] child is reached: as a nested statement or only as an
/// edge target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Branch {
    Statement,
    Edge,
}

/// Two-level view of an if and its branches, used to match merge shapes.
#[derive(Debug)]
struct IfNode {
    value: StatId,
    succs: Vec<IfNode>,
    branches: Vec<Branch>,
}

impl IfNode {
    fn new(value: StatId) -> Self {
        IfNode {
            value,
            succs: Vec::new(),
            branches: Vec::new(),
        }
    }

    fn add_child(&mut self, child: IfNode, branch: Branch) {
        self.succs.push(child);
        self.branches.push(branch);
    }
}

pub fn merge_all_ifs(graph: &mut StatementGraph, root: StatId) -> Result<bool> {
    let changed = merge_all_ifs_rec(graph, root, &mut HashSet::new())?;
    if changed {
        sequence_helper::condense_sequences(graph, root)?;
    }
    Ok(changed)
}

fn merge_all_ifs_rec(graph: &mut StatementGraph, stat: StatId, reordered: &mut HashSet<StatId>) -> Result<bool> {
    let mut res = false;
    if graph[stat].exprents.is_some() {
        return Ok(res);
    }
    loop {
        let mut changed = false;
        for child in graph[stat].stats.clone() {
            res |= merge_all_ifs_rec(graph, child, reordered)?;
            changed = merge_ifs(graph, child, reordered)?;
            if changed {
                break;
            }
        }
        res |= changed;
        if !changed {
            return Ok(res);
        }
    }
}

pub fn merge_ifs(graph: &mut StatementGraph, statement: StatId, reordered: &mut HashSet<StatId>) -> Result<bool> {
    let stat_type = graph.stat_type(statement);
    if stat_type != StatType::If && stat_type != StatType::Sequence {
        return Ok(false);
    }

    let mut res = false;
    loop {
        let mut updated = false;
        let list = if stat_type == StatType::If {
            vec![statement]
        } else {
            graph[statement].stats.clone()
        };
        let single = list.len() == 1;

        for stat in list {
            if graph.stat_type(stat) != StatType::If {
                continue;
            }
            let Some(rtnode) = build_graph(graph, stat, single) else {
                continue;
            };
            if collapse_if_if(graph, &rtnode)? {
                debug!(stat, "merged nested ifs");
                updated = true;
                break;
            }
            if !reordered.contains(&stat) {
                if collapse_if_else(graph, &rtnode)? {
                    debug!(stat, "merged if into else exit");
                    updated = true;
                    break;
                }
                if collapse_else(graph, &rtnode)? {
                    debug!(stat, "merged else chain");
                    updated = true;
                    break;
                }
            }
            if reorder_if(graph, stat)? {
                debug!(stat, "reordered if branches");
                reordered.insert(stat);
                updated = true;
                break;
            }
        }
        if !updated {
            return Ok(res);
        }
        res = true;
    }
}

fn add_inner_branch(graph: &StatementGraph, node: &mut IfNode, child: StatId) {
    let Some(inner) = graph.if_data(child) else {
        return;
    };
    if inner.if_type != IfType::If {
        return;
    }
    match inner.if_stat {
        None => {
            if let Some(e) = inner.if_edge {
                node.add_child(IfNode::new(graph.edge(e).destination), Branch::Edge);
            }
        }
        Some(branch) => node.add_child(IfNode::new(branch), Branch::Statement),
    }
}

fn add_exit_branch(graph: &StatementGraph, node: &mut IfNode, child: StatId) {
    if let Some(&e) = graph.all_successor_edges(child).first() {
        node.add_child(IfNode::new(graph.edge(e).destination), Branch::Edge);
    }
}

fn build_graph(graph: &StatementGraph, stat: StatId, single: bool) -> Option<IfNode> {
    let data = graph.if_data(stat)?;
    if data.if_type == IfType::IfElse {
        return None;
    }
    let else_edge = *graph.all_successor_edges(stat).first()?;

    let mut res = IfNode::new(stat);
    match data.if_stat {
        None => {
            let e = data.if_edge?;
            res.add_child(IfNode::new(graph.edge(e).destination), Branch::Edge);
        }
        Some(if_child) => {
            let mut node = IfNode::new(if_child);
            add_inner_branch(graph, &mut node, if_child);
            add_exit_branch(graph, &mut node, if_child);
            res.add_child(node, Branch::Statement);
        }
    }

    let else_child = graph.edge(else_edge).destination;
    let mut else_node = IfNode::new(else_child);
    if single || graph.edge(else_edge).edge_type != EdgeType::REGULAR {
        res.add_child(else_node, Branch::Edge);
    } else {
        add_inner_branch(graph, &mut else_node, else_child);
        add_exit_branch(graph, &mut else_node, else_child);
        res.add_child(else_node, Branch::Statement);
    }
    Some(res)
}

fn is_empty_list(graph: &StatementGraph, stat: StatId) -> bool {
    graph[stat].exprents.as_ref().map_or(false, Vec::is_empty)
}

fn take_condition(graph: &mut StatementGraph, stat: StatId) -> Result<Exprent> {
    graph
        .expect_if_mut(stat)?
        .head_exprent
        .as_mut()
        .and_then(Exprent::if_condition_mut)
        .map(|c| std::mem::replace(c, Exprent::null_const()))
        .ok_or_else(|| DecompileError::invariant("if without condition", Some(stat), None))
}

fn put_condition(graph: &mut StatementGraph, stat: StatId, condition: Exprent) -> Result<()> {
    let slot = graph
        .expect_if_mut(stat)?
        .head_exprent
        .as_mut()
        .and_then(Exprent::if_condition_mut)
        .ok_or_else(|| DecompileError::invariant("if without condition", Some(stat), None))?;
    *slot = condition;
    Ok(())
}

fn head_offsets(graph: &StatementGraph, stat: StatId) -> Option<std::collections::BTreeSet<u32>> {
    graph.if_data(stat)?.head_exprent.as_ref().map(|h| h.bytecode.clone())
}

fn add_head_offsets(graph: &mut StatementGraph, stat: StatId, offsets: Option<std::collections::BTreeSet<u32>>) -> Result<()> {
    if let (Some(offsets), Some(head)) = (offsets, graph.expect_if_mut(stat)?.head_exprent.as_mut()) {
        head.add_bytecode_offsets(&offsets);
    }
    Ok(())
}

fn negate(condition: Exprent) -> Exprent {
    Exprent::func(FunctionType::BoolNot, vec![condition])
}

/// `if (a) { if (b) X } else-exit Y` with the inner if also exiting to `Y`
/// becomes `if (a && b) X`.
fn collapse_if_if(graph: &mut StatementGraph, rtnode: &IfNode) -> Result<bool> {
    if rtnode.branches[0] != Branch::Statement {
        return Ok(false);
    }
    let if_branch = &rtnode.succs[0];
    if if_branch.succs.len() != 2 || if_branch.succs[1].value != rtnode.succs[1].value {
        return Ok(false);
    }
    let parent = rtnode.value;
    let child = if_branch.value;
    let inner = if_branch.succs[0].value;
    if !is_empty_list(graph, graph.first(child)?) {
        return Ok(false);
    }

    let parent_head = graph.first(parent)?;
    if let Some(e) = graph.expect_if(parent)?.if_edge {
        graph.remove_successor(e);
    }
    if let Some(e) = graph.all_successor_edges(child).first().copied() {
        graph.remove_successor(e);
    }

    let child_if_edge = graph
        .expect_if(child)?
        .if_edge
        .ok_or_else(|| DecompileError::invariant("if without jump edge", Some(child), None))?;
    if if_branch.branches[0] == Branch::Edge {
        graph.set_if_stat(parent, None)?;
        graph.remove_successor(child_if_edge);
        graph.change_edge_node(Direction::Backward, child_if_edge, parent_head);
        if graph.edge(child_if_edge).closure == Some(child) {
            graph.edge_mut(child_if_edge).closure = None;
        }
        graph.attach_successor(child_if_edge);
        graph.expect_if_mut(parent)?.if_edge = Some(child_if_edge);
    } else {
        graph.remove_successor(child_if_edge);
        let new_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, parent_head, inner, None));
        graph.expect_if_mut(parent)?.if_edge = Some(new_edge);
        graph.set_if_stat(parent, Some(inner))?;
        if let Some(e) = graph.all_successor_edges(inner).first().copied() {
            if graph.edge(e).closure == Some(child) {
                graph.remove_from_closure(e);
            }
        }
    }

    let child_condition = take_condition(graph, child)?;
    let parent_condition = take_condition(graph, parent)?;
    put_condition(
        graph,
        parent,
        Exprent::func(FunctionType::Cadd, vec![parent_condition, child_condition]),
    )?;
    add_head_offsets(graph, parent, head_offsets(graph, child))?;
    Ok(true)
}

/// `if (a) { if (b) exit Y; exit X } exit Y` becomes `if (a && !b) exit X`.
fn collapse_if_else(graph: &mut StatementGraph, rtnode: &IfNode) -> Result<bool> {
    if rtnode.branches[0] != Branch::Statement {
        return Ok(false);
    }
    let if_branch = &rtnode.succs[0];
    if if_branch.succs.len() != 2 || if_branch.succs[0].value != rtnode.succs[1].value {
        return Ok(false);
    }
    let parent = rtnode.value;
    let child = if_branch.value;
    if !is_empty_list(graph, graph.first(child)?) {
        return Ok(false);
    }
    if if_branch.branches != [Branch::Edge, Branch::Edge] {
        return Err(DecompileError::invariant("inconsistent if structure", Some(parent), None));
    }

    let parent_head = graph.first(parent)?;
    if let Some(e) = graph.expect_if(parent)?.if_edge {
        graph.remove_successor(e);
    }
    if let Some(e) = graph.expect_if(child)?.if_edge {
        graph.remove_successor(e);
    }
    graph.set_if_stat(parent, None)?;

    let exit = graph
        .all_successor_edges(child)
        .first()
        .copied()
        .ok_or_else(|| DecompileError::invariant("if branch has no exit", Some(child), None))?;
    graph.remove_successor(exit);
    graph.change_edge_node(Direction::Backward, exit, parent_head);
    graph.attach_successor(exit);
    graph.expect_if_mut(parent)?.if_edge = Some(exit);

    let child_condition = take_condition(graph, child)?;
    let parent_condition = take_condition(graph, parent)?;
    put_condition(
        graph,
        parent,
        Exprent::func(FunctionType::Cadd, vec![parent_condition, negate(child_condition)]),
    )?;
    add_head_offsets(graph, parent, head_offsets(graph, child))?;
    Ok(true)
}

/// Folds an if that falls through into a second if sharing a target into a
/// single `||` / `&&` condition, or pulls a single-exit else block under
/// the if.
fn collapse_else(graph: &mut StatementGraph, rtnode: &IfNode) -> Result<bool> {
    if rtnode.branches[1] != Branch::Statement {
        return Ok(false);
    }
    let else_branch = &rtnode.succs[1];
    let if_target = rtnode.succs[0].value;

    if else_branch.succs.len() == 2 {
        let path = if else_branch.succs[1].value == if_target {
            2
        } else if else_branch.succs[0].value == if_target {
            1
        } else {
            return Ok(false);
        };
        let first_if = rtnode.value;
        let second_if = else_branch.value;
        let parent = graph[first_if]
            .parent
            .ok_or_else(|| DecompileError::invariant("if has no parent", Some(first_if), None))?;
        let second_head = graph.first(second_if)?;
        if !is_empty_list(graph, second_head) {
            return Ok(false);
        }
        let first_head = graph.first(first_if)?;

        if let Some(e) = graph.expect_if(first_if)?.if_edge {
            graph.remove_successor(e);
        }
        graph.remove_all_successors(first_if, second_if);
        for e in graph.all_predecessor_edges(first_if) {
            let source = graph.edge(e).source;
            if !graph.contains_statement_strict(first_if, source) {
                graph.remove_predecessor(first_if, e);
                graph.change_edge_node(Direction::Forward, e, second_if);
                graph.add_predecessor(second_if, e);
            }
        }
        graph[parent].stats.retain(|&s| s != first_if);
        if graph[parent].first == Some(first_if) {
            graph[parent].first = Some(second_if);
        }

        let mut first_condition = take_condition(graph, first_if)?;
        if path == 2 {
            first_condition = negate(first_condition);
        }
        let second_condition = take_condition(graph, second_if)?;
        let func = if path == 1 { FunctionType::Cor } else { FunctionType::Cadd };
        put_condition(graph, second_if, Exprent::func(func, vec![first_condition, second_condition]))?;

        if !is_empty_list(graph, first_head) {
            graph.replace_statement(second_if, second_head, first_head);
        }
        return Ok(true);
    }

    if else_branch.succs.len() == 1 && else_branch.succs[0].value == if_target {
        let first_if = rtnode.value;
        let second = else_branch.value;
        let first_head = graph.first(first_if)?;

        graph.remove_all_successors(first_if, second);
        for e in graph.all_successor_edges(second) {
            graph.remove_successor(e);
            graph.change_edge_node(Direction::Backward, e, first_if);
            graph.attach_successor(e);
        }

        let if_edge = graph
            .expect_if(first_if)?
            .if_edge
            .ok_or_else(|| DecompileError::invariant("if without jump edge", Some(first_if), None))?;
        let (if_type, if_dest, if_closure) = {
            let e = graph.edge(if_edge);
            (e.edge_type, e.destination, e.closure)
        };
        graph.remove_successor(if_edge);
        graph.add_successor(StatEdge::new(if_type, second, if_dest, if_closure));
        let new_if_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, first_head, second, None));

        if let Some(seq) = graph[first_if].parent {
            graph[seq].stats.retain(|&s| s != second);
        }
        graph.expect_if_mut(first_if)?.if_edge = Some(new_if_edge);
        graph.set_if_stat(first_if, Some(second))?;

        let condition = take_condition(graph, first_if)?;
        put_condition(graph, first_if, negate(condition))?;
        return Ok(true);
    }
    Ok(false)
}

/// Everything after `ifstat` in its sequence, as a single statement.
fn cut_sequence_tail(graph: &mut StatementGraph, sequence: StatId, ifstat: StatId) -> Option<StatId> {
    let pos = graph[sequence].stats.iter().position(|&s| s == ifstat)?;
    let tail = graph[sequence].stats.split_off(pos + 1);
    match tail.as_slice() {
        [] => None,
        [single] => Some(*single),
        _ => {
            let seq = graph.new_sequence(tail);
            graph.set_all_parent(seq);
            Some(seq)
        }
    }
}

fn reorder_if(graph: &mut StatementGraph, ifstat: StatId) -> Result<bool> {
    let data = graph.expect_if(ifstat)?;
    if data.if_type == IfType::IfElse {
        return Ok(false);
    }
    let (if_branch, if_edge) = (data.if_stat, data.if_edge);
    let Some(if_edge) = if_edge else {
        return Ok(false);
    };
    let Some(parent) = graph[ifstat].parent else {
        return Ok(false);
    };
    let in_sequence = graph.stat_type(parent) == StatType::Sequence;
    let from = if in_sequence { parent } else { ifstat };
    let next = next_statement(graph, from);

    let no_if_stat = if_branch.is_none();
    let if_direct = match if_branch {
        None => {
            graph.edge(if_edge).edge_type == EdgeType::FINALLY_EXIT
                || is_direct_path(graph, from, graph.edge(if_edge).destination)
        }
        Some(branch) => first_exit_is_finally(graph, branch) || has_direct_end_edge(graph, branch, from),
    };

    let last = if in_sequence {
        *graph[parent].stats.last().unwrap_or(&ifstat)
    } else {
        ifstat
    };
    let no_else_stat = last == ifstat;
    let else_direct = first_exit_is_finally(graph, last) || has_direct_end_edge(graph, last, from);

    if !no_else_stat {
        if let Some(&e) = graph.all_successor_edges(ifstat).first() {
            if exists_path(graph, ifstat, Some(graph.edge(e).destination)) {
                return Ok(false);
            }
        }
    }

    let mut if_direct_path = false;
    if !if_direct && !no_if_stat {
        if_direct_path = exists_path(graph, ifstat, next);
    }
    let mut else_direct_path = false;
    if !else_direct && !no_else_stat {
        for &st in graph[parent].stats.iter().rev() {
            if st == ifstat {
                break;
            }
            if exists_path(graph, st, next) {
                else_direct_path = true;
                break;
            }
        }
    }

    if (if_direct || if_direct_path) && (else_direct || else_direct_path) && !no_if_stat && !no_else_stat {
        // if - then - else
        let Some(else_stat) = cut_sequence_tail(graph, parent, ifstat) else {
            return Ok(false);
        };
        if let Some(e) = graph.all_successor_edges(ifstat).first().copied() {
            graph.remove_successor(e);
        }
        let head = graph.first(ifstat)?;
        let else_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, head, else_stat, None));
        graph.set_else_stat(ifstat, Some(else_stat))?;
        let data = graph.expect_if_mut(ifstat)?;
        data.else_edge = Some(else_edge);
        data.if_type = IfType::IfElse;
        return Ok(true);
    }

    if !(if_direct && (!else_direct || (no_if_stat && !no_else_stat))) {
        return Ok(false);
    }

    // if - then, with the condition negated
    let condition = take_condition(graph, ifstat)?;
    put_condition(graph, ifstat, negate(condition))?;
    let head = graph.first(ifstat)?;

    if no_else_stat {
        let else_edge = graph
            .all_successor_edges(ifstat)
            .first()
            .copied()
            .ok_or_else(|| DecompileError::invariant("if has no exit", Some(ifstat), None))?;
        match if_branch {
            None => {
                graph.remove_successor(if_edge);
                graph.remove_successor(else_edge);
                graph.change_edge_node(Direction::Backward, if_edge, ifstat);
                graph.change_edge_node(Direction::Backward, else_edge, head);
                graph.attach_successor(if_edge);
                graph.attach_successor(else_edge);
                graph.expect_if_mut(ifstat)?.if_edge = Some(else_edge);
            }
            Some(branch) => {
                graph.remove_successor(if_edge);
                graph.set_if_stat(ifstat, None)?;
                graph.remove_successor(else_edge);
                graph.change_edge_node(Direction::Backward, else_edge, head);
                graph.attach_successor(else_edge);
                graph.expect_if_mut(ifstat)?.if_edge = Some(else_edge);

                let new_seq = graph.new_sequence(vec![ifstat, branch]);
                graph.replace_statement(parent, ifstat, new_seq);
                graph.set_all_parent(new_seq);
                graph.add_successor(StatEdge::new(EdgeType::REGULAR, ifstat, branch, None));
            }
        }
        return Ok(true);
    }

    let Some(else_stat) = cut_sequence_tail(graph, parent, ifstat) else {
        return Ok(false);
    };
    if let Some(e) = graph.all_successor_edges(ifstat).first().copied() {
        graph.remove_successor(e);
    }
    match if_branch {
        None => {
            graph.remove_successor(if_edge);
            graph.change_edge_node(Direction::Backward, if_edge, ifstat);
            graph.attach_successor(if_edge);
        }
        Some(branch) => {
            graph.remove_successor(if_edge);
            graph.set_if_stat(ifstat, None)?;
            graph.add_successor(StatEdge::new(EdgeType::REGULAR, ifstat, branch, None));
            graph[parent].stats.push(branch);
            graph[branch].parent = Some(parent);
        }
    }
    let new_if_edge = graph.add_successor(StatEdge::new(EdgeType::REGULAR, head, else_stat, None));
    graph.expect_if_mut(ifstat)?.if_edge = Some(new_if_edge);
    graph.set_if_stat(ifstat, Some(else_stat))?;
    Ok(true)
}

fn first_exit_is_finally(graph: &StatementGraph, stat: StatId) -> bool {
    graph
        .all_successor_edges(stat)
        .first()
        .map_or(false, |&e| graph.edge(e).edge_type == EdgeType::FINALLY_EXIT)
}

fn has_direct_end_edge(graph: &StatementGraph, stat: StatId, from: StatId) -> bool {
    if graph
        .all_successor_edges(stat)
        .into_iter()
        .any(|e| is_direct_path(graph, from, graph.edge(e).destination))
    {
        return true;
    }
    if graph[stat].exprents.is_some() {
        return false;
    }
    match graph.stat_type(stat) {
        StatType::Sequence => graph[stat]
            .stats
            .last()
            .map_or(false, |&last| has_direct_end_edge(graph, last, from)),
        StatType::CatchAll | StatType::Trycatch | StatType::Switch => graph[stat]
            .stats
            .iter()
            .any(|&st| has_direct_end_edge(graph, st, from)),
        StatType::If => match graph.if_data(stat) {
            Some(d) if d.if_type == IfType::IfElse => {
                d.if_stat.map_or(false, |s| has_direct_end_edge(graph, s, from))
                    || d.else_stat.map_or(false, |s| has_direct_end_edge(graph, s, from))
            }
            _ => false,
        },
        StatType::Synchronized => graph[stat]
            .stats
            .get(1)
            .map_or(false, |&body| has_direct_end_edge(graph, body, from)),
        _ => false,
    }
}

fn next_statement(graph: &StatementGraph, stat: StatId) -> Option<StatId> {
    let parent = graph[stat].parent?;
    match graph.stat_type(parent) {
        StatType::Root => return graph.dummy_exit(),
        StatType::Do => return Some(parent),
        StatType::Sequence => {
            let stats = &graph[parent].stats;
            if let Some(pos) = stats.iter().position(|&s| s == stat) {
                if pos + 1 < stats.len() {
                    return Some(stats[pos + 1]);
                }
            }
        }
        _ => {}
    }
    next_statement(graph, parent)
}

/// Whether some edge into `to` starts inside `from`.
fn exists_path(graph: &StatementGraph, from: StatId, to: Option<StatId>) -> bool {
    let Some(to) = to else {
        return false;
    };
    graph
        .all_predecessor_edges(to)
        .into_iter()
        .any(|e| graph.contains_statement_strict(from, graph.edge(e).source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::exprs::ExprKind;
    use crate::decompile::descriptor::VarType;
    use crate::decompile::statement::StatKind;
    use crate::decompile::stats::IfStat;

    fn if_stat(g: &mut StatementGraph, head: StatId, var: u32) -> StatId {
        let stat = g.add_statement(StatKind::If(IfStat {
            head_exprent: Some(Exprent::if_expr(Exprent::var(var, VarType::Boolean))),
            ..IfStat::default()
        }));
        g[stat].first = Some(head);
        g[stat].stats.push(head);
        g[head].parent = Some(stat);
        stat
    }

    #[test]
    fn nested_ifs_with_shared_exit_become_conjunction() {
        let mut g = StatementGraph::new(0);
        let x = g.add_empty_block();
        let y = g.add_empty_block();

        let c_head = g.add_empty_block();
        let child = if_stat(&mut g, c_head, 1);
        let c_jump = g.add_successor(StatEdge::new(EdgeType::BREAK, c_head, x, None));
        g.expect_if_mut(child).unwrap().if_edge = Some(c_jump);
        g.add_successor(StatEdge::new(EdgeType::BREAK, child, y, None));

        let p_head = g.add_empty_block();
        let parent = if_stat(&mut g, p_head, 0);
        let p_jump = g.add_successor(StatEdge::new(EdgeType::REGULAR, p_head, child, None));
        g.expect_if_mut(parent).unwrap().if_edge = Some(p_jump);
        g.set_if_stat(parent, Some(child)).unwrap();
        g.add_successor(StatEdge::new(EdgeType::BREAK, parent, y, None));

        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g[root].stats = vec![parent];
        g[root].first = Some(parent);
        g.set_all_parent(root);
        g.root = Some(root);

        assert!(merge_ifs(&mut g, parent, &mut HashSet::new()).unwrap());
        let data = g.expect_if(parent).unwrap();
        assert_eq!(data.if_stat, None);
        assert_eq!(data.if_edge, Some(c_jump));
        assert_eq!(g.edge(c_jump).source, p_head);
        assert_eq!(g[parent].stats, vec![p_head]);
        let cond = data.head_exprent.as_ref().and_then(Exprent::if_condition).unwrap();
        assert!(matches!(&cond.kind, ExprKind::Function { func: FunctionType::Cadd, operands } if operands.len() == 2));
        g.verify_edges().unwrap();
    }
}
