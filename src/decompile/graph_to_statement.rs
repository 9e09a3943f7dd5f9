//! Initial statement tree: one basic-block statement per CFG block, all of
//! them inside a single general region.

use std::collections::HashMap;

use tracing::debug;

use super::cfg_types::{BlockId, ControlFlowGraph};
use super::error::{DecompileError, Result};
use super::stat_edge::{EdgeType, StatEdge};
use super::statement::{StatId, StatKind, StatementGraph};

/// Builds the statement graph for `cfg`. Synthetic variables are numbered
/// from `first_free_var`.
pub fn graph_to_statement(cfg: &ControlFlowGraph, first_free_var: u32) -> Result<StatementGraph> {
    let mut graph = StatementGraph::new(first_free_var);
    let block_ids = cfg.block_ids();
    if block_ids.is_empty() {
        return Err(DecompileError::UnsupportedBytecode("method has no reachable code".into()));
    }

    let mut stats: HashMap<BlockId, StatId> = HashMap::with_capacity(block_ids.len());
    let mut ordered = Vec::with_capacity(block_ids.len());
    for &id in &block_ids {
        let stat = graph.add_basic_block(Some(id), cfg.block(id).seq.clone());
        stats.insert(id, stat);
        ordered.push(stat);
    }
    let dummy_exit = graph.add_statement(StatKind::DummyExit);

    let first_block = cfg.first;
    let first = *stats
        .get(&first_block)
        .ok_or_else(|| DecompileError::invariant("first block is not part of the graph", None, None))?;

    let self_loop = cfg.block(first_block).succs.contains(&first_block);
    if block_ids.len() == 1 && !self_loop {
        let root = graph.add_statement(StatKind::Root { dummy_exit });
        graph[root].first = Some(first);
        graph[root].stats = vec![first];
        graph[first].parent = Some(root);
        graph[dummy_exit].parent = Some(root);
        graph.root = Some(root);
        graph.add_successor(StatEdge::new(EdgeType::BREAK, first, dummy_exit, Some(root)));
        debug!(blocks = 1, "statement graph built");
        return Ok(graph);
    }

    let general = graph.new_general(first, ordered, None);
    graph.set_all_parent(general);

    for &id in &block_ids {
        let block = cfg.block(id);
        let stat = stats[&id];
        for &succ in &block.succs {
            let (edge_type, dest) = if stats.get(&succ) == Some(&first) {
                (EdgeType::CONTINUE, general)
            } else if cfg.finally_exits.contains(&id) {
                (EdgeType::FINALLY_EXIT, dummy_exit)
            } else if succ == cfg.last {
                (EdgeType::BREAK, dummy_exit)
            } else {
                let dest = *stats.get(&succ).ok_or_else(|| {
                    DecompileError::invariant(format!("successor block {} is missing", succ), Some(stat), None)
                })?;
                (EdgeType::REGULAR, dest)
            };
            let closure = if edge_type == EdgeType::REGULAR { None } else { Some(general) };
            graph.add_successor(StatEdge::new(edge_type, stat, dest, closure));
        }

        for &handler in &block.succ_exceptions {
            let Some(range) = cfg.exception_range(handler, id) else {
                continue;
            };
            let range = &cfg.exceptions[range];
            if range.is_circular() {
                continue;
            }
            if let Some(&dest) = stats.get(&handler) {
                graph.add_successor(StatEdge::exception(stat, dest, range.exception_types.clone()));
            }
        }
    }

    graph.build_continue_set(general);
    graph.build_monitor_flags(general);

    let root = graph.add_statement(StatKind::Root { dummy_exit });
    graph[root].first = Some(general);
    graph[root].stats = vec![general];
    graph[general].parent = Some(root);
    graph[dummy_exit].parent = Some(root);
    graph.root = Some(root);
    debug!(blocks = block_ids.len(), "statement graph built");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{opcodes, Instruction, InstructionSequence};
    use crate::decompile::cfg_types::ExceptionRange;
    use crate::decompile::stat_edge::Direction;
    use crate::decompile::statement::StatType;

    fn seq(op: u8) -> InstructionSequence {
        InstructionSequence::new(vec![Instruction::new(op, vec![]).at(0)])
    }

    #[test]
    fn single_block_becomes_root_child() {
        let mut cfg = ControlFlowGraph::new();
        let b = cfg.create_block(seq(opcodes::RETURN));
        let exit = cfg.create_exit_block();
        cfg.first = b;
        cfg.add_successor(b, exit);

        let g = graph_to_statement(&cfg, 1).unwrap();
        let root = g.root().unwrap();
        let first = g.first(root).unwrap();
        assert_eq!(g.stat_type(first), StatType::BasicBlock);
        let edges = g.successor_edges(first, EdgeType::BREAK);
        assert_eq!(edges.len(), 1);
        assert_eq!(Some(g.edge(edges[0]).destination), g.dummy_exit());
        g.verify_edges().unwrap();
    }

    #[test]
    fn edges_are_classified() {
        let mut cfg = ControlFlowGraph::new();
        let head = cfg.create_block(seq(opcodes::NOP));
        let body = cfg.create_block(seq(opcodes::NOP));
        let handler = cfg.create_block(seq(opcodes::ATHROW));
        let exit = cfg.create_exit_block();
        cfg.first = head;
        cfg.add_successor(head, body);
        cfg.add_successor(body, head);
        cfg.add_successor(handler, exit);
        cfg.add_successor_exception(body, handler);
        cfg.exceptions.push(ExceptionRange {
            protected: vec![body],
            handler,
            exception_types: Some(vec!["java/lang/Exception".into()]),
        });

        let g = graph_to_statement(&cfg, 0).unwrap();
        let general = g.first(g.root().unwrap()).unwrap();
        assert_eq!(g.stat_type(general), StatType::General);
        assert_eq!(g[general].stats.len(), 3);

        let body_stat = g[general].stats[1];
        let cont = g.successor_edges(body_stat, EdgeType::CONTINUE);
        assert_eq!(cont.len(), 1);
        assert_eq!(g.edge(cont[0]).destination, general);
        assert_eq!(g.neighbours(body_stat, EdgeType::EXCEPTION, Direction::Forward).len(), 1);
        assert!(g[general].continue_set.contains(&g[general].stats[0]));
        g.verify_edges().unwrap();
    }
}
