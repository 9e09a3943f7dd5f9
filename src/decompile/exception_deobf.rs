//! Normalisation of exception ranges emitted by javac.

use std::collections::HashSet;

use crate::code_attribute::opcodes::{ASTORE, POP};
use crate::code_attribute::InstructionSequence;

use super::cfg::{block_dominators, is_dominator};
use super::cfg_types::{BlockId, ControlFlowGraph};

/// Shrink ranges that protect their own handler: the part of the range
/// dominated by the handler belongs to the handler, not to the try body.
pub fn remove_circular_ranges(graph: &mut ControlFlowGraph) {
    let doms = block_dominators(graph);

    let mut i = graph.exceptions.len();
    while i > 0 {
        i -= 1;
        if !graph.exceptions[i].is_circular() {
            continue;
        }
        let handler = graph.exceptions[i].handler;
        let owned = reachable_restricted(graph, i, &doms);
        let range_len = graph.exceptions[i].protected.len();
        if owned.len() < range_len || range_len == 1 {
            for b in &owned {
                graph.remove_successor_exception(*b, handler);
                graph.exceptions[i].protected.retain(|x| x != b);
            }
        }
        if graph.exceptions[i].protected.is_empty() {
            graph.exceptions.remove(i);
        }
    }
}

fn reachable_restricted(
    graph: &ControlFlowGraph,
    range: usize,
    doms: &std::collections::HashMap<BlockId, BlockId>,
) -> Vec<BlockId> {
    let range = &graph.exceptions[range];
    let start = range.handler;
    let mut result = Vec::new();
    let mut stack = vec![start];
    let mut visited = HashSet::new();
    while let Some(block) = stack.pop() {
        if !visited.insert(block) {
            continue;
        }
        if range.protected.contains(&block) && is_dominator(doms, block, start) {
            result.push(block);
            let b = graph.block(block);
            for &s in b.succs.iter().chain(b.succ_exceptions.iter()) {
                if !visited.contains(&s) {
                    stack.push(s);
                }
            }
        }
    }
    result
}

struct AggregatedRange {
    handler: BlockId,
    unique: Option<String>,
    protected: HashSet<BlockId>,
    /// Index of one of the underlying ranges.
    range: usize,
}

/// javac leaves the `pop`/`astore` that opens a catch handler outside of
/// enclosing `finally` ranges. Split that instruction into its own block
/// and put it back under the enclosing ranges.
pub fn restore_pop_ranges(graph: &mut ControlFlowGraph) {
    let mut aggregated: Vec<AggregatedRange> = Vec::new();
    for (index, range) in graph.exceptions.iter().enumerate() {
        let unique = range.unique_exceptions_string();
        match aggregated
            .iter_mut()
            .find(|a| a.handler == range.handler && a.unique == unique)
        {
            Some(a) => a.protected.extend(range.protected.iter().copied()),
            None => aggregated.push(AggregatedRange {
                handler: range.handler,
                unique,
                protected: range.protected.iter().copied().collect(),
                range: index,
            }),
        }
    }

    for n in 0..aggregated.len() {
        if aggregated[n].unique.is_none() {
            continue;
        }
        let mut handler = aggregated[n].handler;
        let opens_with_store = graph
            .block(handler)
            .first_instruction()
            .map_or(false, |i| i.opcode == POP || i.opcode == ASTORE);
        if !opens_with_store {
            continue;
        }
        let range_set = aggregated[n].protected.clone();

        for m in 0..aggregated.len() {
            if m == n {
                continue;
            }
            let sup = &aggregated[m];
            let mut sup_set = sup.protected.clone();
            if range_set.contains(&sup.handler) || sup_set.contains(&handler) {
                continue;
            }
            if sup.unique.is_some() && !range_set.is_subset(&sup_set) {
                continue;
            }
            if sup.unique.is_none() {
                sup_set.retain(|b| range_set.contains(b));
            } else {
                sup_set.retain(|b| !range_set.contains(b));
            }
            if sup_set.is_empty() {
                continue;
            }

            let mut new_block = handler;
            if graph.block(handler).seq.len() > 1 {
                let store = graph.block(handler).seq.instructions[0].clone();
                new_block = graph.create_block(InstructionSequence::new(vec![store]));

                let block = graph.block(handler);
                let preds: Vec<BlockId> = block
                    .preds
                    .iter()
                    .chain(block.pred_exceptions.iter())
                    .copied()
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                for p in preds {
                    graph.replace_successor(p, handler, new_block);
                }

                let mut outer_handlers = Vec::new();
                for r in graph.exceptions.iter_mut() {
                    if r.handler == handler {
                        r.handler = new_block;
                    } else if r.protected.contains(&handler) {
                        r.protected.push(new_block);
                        outer_handlers.push(r.handler);
                    }
                }
                for h in outer_handlers {
                    graph.add_successor_exception(new_block, h);
                }

                graph.add_successor(new_block, handler);
                if graph.first == handler {
                    graph.first = new_block;
                }
                graph.block_mut(handler).seq.remove(0);
            }

            let sup_handler = aggregated[m].handler;
            let sup_range = aggregated[m].range;
            graph.add_successor_exception(new_block, sup_handler);
            graph.exceptions[sup_range].protected.push(new_block);
            handler = graph.exceptions[aggregated[n].range].handler;
        }
    }
}

/// A range whose protected blocks can be entered from outside the range at
/// more than one point. javac never produces these.
pub fn has_obfuscated_exceptions(graph: &ControlFlowGraph) -> bool {
    graph.exceptions.iter().any(|range| {
        let set: HashSet<BlockId> = range.protected.iter().copied().collect();
        let entries = range
            .protected
            .iter()
            .filter(|&&b| {
                b == graph.first
                    || graph
                        .block(b)
                        .preds
                        .iter()
                        .chain(graph.block(b).pred_exceptions.iter())
                        .any(|p| !set.contains(p))
            })
            .count();
        entries > 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::opcodes::*;
    use crate::code_attribute::Instruction;
    use crate::decompile::cfg_types::ExceptionRange;

    fn seq(ops: &[u8]) -> InstructionSequence {
        InstructionSequence::new(ops.iter().map(|&o| Instruction::new(o, vec![])).collect())
    }

    #[test]
    fn circular_range_is_trimmed_to_try_body() {
        let mut graph = ControlFlowGraph::new();
        let body = graph.create_block(seq(&[NOP]));
        let handler = graph.create_block(seq(&[POP, RETURN]));
        let exit = graph.create_exit_block();
        graph.first = body;
        graph.add_successor(body, exit);
        graph.add_successor(handler, exit);
        graph.add_successor_exception(body, handler);
        graph.add_successor_exception(handler, handler);
        graph.exceptions.push(ExceptionRange {
            protected: vec![body, handler],
            handler,
            exception_types: None,
        });

        remove_circular_ranges(&mut graph);
        assert_eq!(graph.exceptions[0].protected, vec![body]);
        assert!(graph.block(handler).succ_exceptions.is_empty());
    }

    #[test]
    fn catch_store_joins_enclosing_finally() {
        let mut graph = ControlFlowGraph::new();
        let body = graph.create_block(seq(&[NOP]));
        let catch = graph.create_block(seq(&[ASTORE, NOP]));
        let fin = graph.create_block(seq(&[ASTORE, ATHROW]));
        let exit = graph.create_exit_block();
        graph.first = body;
        graph.add_successor(body, exit);
        graph.add_successor(catch, exit);
        graph.add_successor(fin, exit);
        graph.add_successor_exception(body, catch);
        graph.add_successor_exception(body, fin);
        graph.add_successor_exception(catch, fin);
        graph.exceptions.push(ExceptionRange {
            protected: vec![body],
            handler: catch,
            exception_types: Some(vec!["java/lang/Exception".into()]),
        });
        graph.exceptions.push(ExceptionRange {
            protected: vec![body],
            handler: fin,
            exception_types: None,
        });

        restore_pop_ranges(&mut graph);
        let new_handler = graph.exceptions[0].handler;
        assert_ne!(new_handler, catch);
        assert_eq!(graph.block(new_handler).seq.len(), 1);
        assert!(graph.exceptions[1].protected.contains(&new_handler));
        assert_eq!(graph.block(new_handler).succs, vec![catch]);
        assert!(!has_obfuscated_exceptions(&graph));
    }
}
