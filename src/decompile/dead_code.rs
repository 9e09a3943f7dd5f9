//! CFG clean-up passes run before structuring.

use std::collections::{HashSet, VecDeque};

use crate::code_attribute::opcodes::GOTO;
use crate::code_attribute::InstructionGroup;

use super::cfg_types::{BlockId, ControlFlowGraph};
use super::error::{DecompileError, Result};

/// Drop every block not reachable from the entry block.
pub fn remove_dead_blocks(graph: &mut ControlFlowGraph) {
    let mut queue = VecDeque::from([graph.first]);
    let mut reached: HashSet<BlockId> = HashSet::from([graph.first]);
    while let Some(id) = queue.pop_front() {
        let block = graph.block(id);
        for &succ in block.succs.iter().chain(block.succ_exceptions.iter()) {
            if reached.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    for id in graph.block_ids() {
        if !reached.contains(&id) {
            tracing::trace!(block = id, "removing dead block");
            graph.remove_block(id);
        }
    }
}

/// Turn the recorded exit predecessors into real successor edges.
pub fn connect_dummy_exit_block(graph: &mut ControlFlowGraph) {
    let exit = graph.last;
    let preds: Vec<BlockId> = {
        let mut seen = HashSet::new();
        graph
            .block(exit)
            .preds
            .iter()
            .copied()
            .filter(|p| seen.insert(*p))
            .collect()
    };
    graph.block_mut(exit).preds.clear();
    for p in preds {
        graph.add_successor(p, exit);
    }
}

/// Strip unconditional `goto`s, which are implied by the block edges, then
/// remove the blocks left empty.
pub fn remove_gotos(graph: &mut ControlFlowGraph, remove_empty_ranges: bool) -> Result<()> {
    for id in graph.block_ids() {
        let block = graph.block_mut(id);
        if block.last_instruction().map(|i| i.opcode) == Some(GOTO) {
            block.seq.remove_last();
        }
    }
    remove_empty_blocks(graph, remove_empty_ranges)
}

pub fn remove_empty_blocks(graph: &mut ControlFlowGraph, remove_empty_ranges: bool) -> Result<()> {
    loop {
        let mut restart = false;
        for id in graph.block_ids().into_iter().rev() {
            if !graph.contains(id) {
                continue;
            }
            if remove_empty_block(graph, id, false, remove_empty_ranges)? {
                restart = true;
                break;
            }
        }
        if !restart {
            return Ok(());
        }
    }
}

/// Splice out an empty block. Returns `true` when exception ranges were
/// deleted on the way, which invalidates any iteration in progress.
fn remove_empty_block(
    graph: &mut ControlFlowGraph,
    id: BlockId,
    merging: bool,
    remove_empty_ranges: bool,
) -> Result<bool> {
    let block = graph.block(id).clone();
    if !block.seq.is_empty() {
        return Ok(false);
    }

    if block.succs.len() > 1 {
        if block.preds.len() > 1 {
            return Err(DecompileError::invariant(
                format!("empty block {} with several predecessors and successors", id),
                None,
                None,
            ));
        } else if !merging {
            return Err(DecompileError::invariant(
                format!("empty block {} with several successors", id),
                None,
                None,
            ));
        }
    }

    let is_exit = block.succs.contains(&graph.last);
    if !block.pred_exceptions.is_empty() || (is_exit && block.preds.len() != 1) {
        return Ok(false);
    }
    if is_exit {
        let pred = graph.block(block.preds[0]);
        let ends_in_switch = pred
            .last_instruction()
            .map_or(false, |i| i.group() == InstructionGroup::Switch);
        if pred.succs.len() != 1 || ends_in_switch {
            return Ok(false);
        }
    }

    let preds: Vec<BlockId> = dedup(&block.preds);
    let succs: Vec<BlockId> = dedup(&block.succs);

    // the handlers shared by all neighbours must cover the block as well
    let mut common: Option<HashSet<BlockId>> = None;
    for n in preds.iter().chain(succs.iter()) {
        let handlers: HashSet<BlockId> = graph.block(*n).succ_exceptions.iter().copied().collect();
        common = Some(match common {
            None => handlers,
            Some(c) => c.intersection(&handlers).copied().collect(),
        });
    }
    if let Some(common) = common {
        if common.iter().any(|h| !block.succ_exceptions.contains(h)) {
            return Ok(false);
        }
    }

    let mut deleted_ranges = false;
    let mut i = graph.exceptions.len();
    while i > 0 {
        i -= 1;
        let range = &graph.exceptions[i];
        if range.protected.len() == 1 && range.protected[0] == id {
            if remove_empty_ranges {
                let handler = range.handler;
                graph.remove_successor_exception(id, handler);
                graph.exceptions.remove(i);
                deleted_ranges = true;
            } else {
                return Ok(false);
            }
        }
    }

    if merging {
        let pred = block.preds[0];
        graph.remove_successor(pred, id);
        for succ in block.succs.iter().copied() {
            graph.remove_successor(id, succ);
            graph.add_successor(pred, succ);
        }
    } else {
        for &pred in &preds {
            for &succ in &succs {
                graph.replace_successor(pred, id, succ);
            }
        }
    }

    if graph.finally_exits.remove(&id) {
        if let Some(&pred) = preds.first() {
            graph.finally_exits.insert(pred);
        }
    }

    if graph.first == id {
        if succs.len() != 1 {
            return Err(DecompileError::invariant("empty entry block without a unique successor", None, None));
        }
        graph.first = succs[0];
    }

    graph.remove_block(id);
    if deleted_ranges {
        remove_dead_blocks(graph);
    }
    Ok(deleted_ranges)
}

/// Concatenate blocks joined by a single edge when both lie in the same
/// exception ranges.
pub fn merge_basic_blocks(graph: &mut ControlFlowGraph, remove_empty_ranges: bool) -> Result<()> {
    loop {
        let mut merged = false;
        for id in graph.block_ids() {
            let block = graph.block(id);
            if block.succs.len() != 1 {
                continue;
            }
            let next = block.succs[0];
            let ends_in_switch = block
                .last_instruction()
                .map_or(false, |i| i.group() == InstructionGroup::Switch);
            if next == graph.last || ends_in_switch {
                continue;
            }
            let next_block = graph.block(next);
            if next_block.preds.len() != 1 || !next_block.pred_exceptions.is_empty() || next == graph.first {
                continue;
            }
            let same_ranges = graph
                .exceptions
                .iter()
                .all(|r| r.protected.contains(&id) == r.protected.contains(&next));
            if !same_ranges {
                continue;
            }

            let moved = std::mem::take(&mut graph.block_mut(next).seq.instructions);
            graph.block_mut(id).seq.instructions.extend(moved);
            remove_empty_block(graph, next, true, remove_empty_ranges)?;
            merged = true;
            break;
        }
        if !merged {
            return Ok(());
        }
    }
}

fn dedup(ids: &[BlockId]) -> Vec<BlockId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|i| seen.insert(*i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::CodeAttribute;
    use crate::constant_info::ConstantPool;
    use crate::decompile::cfg::build_cfg;

    fn graph_of(bytes: &[u8]) -> ControlFlowGraph {
        let attr = CodeAttribute {
            max_stack: 2,
            max_locals: 2,
            code: bytes.to_vec(),
            ..Default::default()
        };
        build_cfg(&attr, &ConstantPool::default()).unwrap()
    }

    #[test]
    fn unreachable_code_is_dropped() {
        // 0: return; 1: nop; 2: return
        let mut graph = graph_of(&[0xb1, 0x00, 0xb1]);
        assert_eq!(graph.len(), 2);
        remove_dead_blocks(&mut graph);
        assert_eq!(graph.len(), 1);
        assert!(graph.block(graph.last).preds.contains(&graph.first));
    }

    #[test]
    fn goto_chain_collapses() {
        // 0: goto +3 (-> 3); 3: nop; 4: return
        let mut graph = graph_of(&[0xa7, 0x00, 0x03, 0x00, 0xb1]);
        remove_dead_blocks(&mut graph);
        connect_dummy_exit_block(&mut graph);
        remove_gotos(&mut graph, true).unwrap();
        merge_basic_blocks(&mut graph, true).unwrap();
        assert_eq!(graph.len(), 1);
        let only = graph.block(graph.first);
        assert_eq!(only.seq.len(), 2);
        assert_eq!(only.succs, vec![graph.last]);
    }
}
