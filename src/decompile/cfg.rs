use std::collections::{BTreeSet, HashMap};

use crate::attribute_info::CodeAttribute;
use crate::code_attribute::opcodes::{JSR, RET};
use crate::code_attribute::{code_parser, InstructionGroup, InstructionSequence};
use crate::constant_info::ConstantPool;

use super::cfg_types::*;
use super::error::{DecompileError, Result};

/// Build the control flow graph of a method body.
///
/// Blocks are created in bytecode order. The dummy exit block gets the next
/// id and receives every block without successors as a predecessor; the
/// matching successor edges are added by
/// [`super::dead_code::connect_dummy_exit_block`].
pub fn build_cfg(code_attr: &CodeAttribute, pool: &ConstantPool) -> Result<ControlFlowGraph> {
    let seq = code_parser(&code_attr.code)
        .map_err(|e| DecompileError::Decode(format!("{:?}", e)))?;
    if seq.is_empty() {
        return Err(DecompileError::UnsupportedBytecode("empty code array".into()));
    }
    if seq.iter().any(|i| i.opcode == JSR || i.opcode == RET) {
        return Err(DecompileError::UnsupportedBytecode(
            "jsr/ret subroutines are not supported".into(),
        ));
    }

    let code_len = code_attr.code.len() as u32;
    let index_of = |offset: u32| -> Result<usize> {
        if offset == code_len {
            return Ok(seq.len());
        }
        seq.index_of_offset(offset).ok_or_else(|| {
            DecompileError::UnsupportedBytecode(format!("no instruction at offset {}", offset))
        })
    };

    // Step 1: block leaders, as instruction indices
    let mut leaders = BTreeSet::new();
    leaders.insert(0usize);
    for entry in &code_attr.exception_table {
        leaders.insert(index_of(entry.start_pc as u32)?);
        leaders.insert(index_of(entry.end_pc as u32)?);
        leaders.insert(index_of(entry.handler_pc as u32)?);
    }
    for (i, instr) in seq.iter().enumerate() {
        match instr.group() {
            InstructionGroup::Jump => {
                if let Some(target) = instr.jump_target() {
                    leaders.insert(index_of(target)?);
                }
                leaders.insert(i + 1);
            }
            InstructionGroup::Return => {
                leaders.insert(i + 1);
            }
            InstructionGroup::Switch => {
                if let Some(table) = &instr.switch {
                    leaders.insert(index_of(table.default)?);
                    for &t in &table.targets {
                        leaders.insert(index_of(t)?);
                    }
                }
                leaders.insert(i + 1);
            }
            _ => {}
        }
    }
    leaders.retain(|&l| l < seq.len());

    // Step 2: blocks
    let mut graph = ControlFlowGraph::new();
    let starts: Vec<usize> = leaders.iter().copied().collect();
    let mut block_at: HashMap<usize, BlockId> = HashMap::new();
    let mut order = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(seq.len());
        let body = InstructionSequence::new(seq.instructions[start..end].to_vec());
        let id = graph.create_block(body);
        block_at.insert(start, id);
        order.push(id);
    }
    let block_of = |offset: u32| -> Result<BlockId> {
        let index = index_of(offset)?;
        block_at.get(&index).copied().ok_or_else(|| {
            DecompileError::UnsupportedBytecode(format!("offset {} does not start a block", offset))
        })
    };

    // Step 3: regular edges. Jump target first, fall-through last.
    for (n, &id) in order.iter().enumerate() {
        let last = match graph.block(id).last_instruction() {
            Some(i) => i.clone(),
            None => continue,
        };
        match last.group() {
            InstructionGroup::Jump => {
                if let Some(target) = last.jump_target() {
                    let to = block_of(target)?;
                    graph.add_successor(id, to);
                }
            }
            InstructionGroup::Switch => {
                if let Some(table) = &last.switch {
                    let default = block_of(table.default)?;
                    graph.add_successor(id, default);
                    for &t in &table.targets {
                        let to = block_of(t)?;
                        graph.add_successor(id, to);
                    }
                }
            }
            _ => {}
        }
        if last.can_fall_through() {
            if let Some(&next) = order.get(n + 1) {
                graph.add_successor(id, next);
            }
        }
    }

    // Step 4: exception ranges, merged by (start, end, handler)
    let end_block = graph.block_ids().len() as BlockId;
    let mut ranges: HashMap<(BlockId, BlockId, BlockId), usize> = HashMap::new();
    for entry in &code_attr.exception_table {
        let from = block_of(entry.start_pc as u32)?;
        let to = if entry.end_pc as u32 == code_len {
            end_block
        } else {
            block_of(entry.end_pc as u32)?
        };
        let handler = block_of(entry.handler_pc as u32)?;
        let exception_type = if entry.catch_type == 0 {
            None
        } else {
            Some(pool.class_name(entry.catch_type).ok_or_else(|| {
                DecompileError::UnsupportedBytecode(format!("bad catch type #{}", entry.catch_type))
            })?)
        };

        if let Some(&index) = ranges.get(&(from, to, handler)) {
            graph.exceptions[index].add_exception_type(exception_type);
            continue;
        }
        let protected: Vec<BlockId> = (from..to).collect();
        for &b in &protected {
            graph.add_successor_exception(b, handler);
        }
        ranges.insert((from, to, handler), graph.exceptions.len());
        graph.exceptions.push(ExceptionRange {
            protected,
            handler,
            exception_types: exception_type.map(|t| vec![t.to_string()]),
        });
    }

    // Step 5: entry and dummy exit
    graph.first = order[0];
    let exit = graph.create_exit_block();
    for id in order {
        if graph.block(id).succs.is_empty() {
            graph.block_mut(exit).preds.push(id);
        }
    }

    tracing::trace!(blocks = graph.len(), ranges = graph.exceptions.len(), "built CFG");
    Ok(graph)
}

/// Immediate dominators of every block reachable from `first`, following
/// both regular and exception edges.
pub fn block_dominators(graph: &ControlFlowGraph) -> HashMap<BlockId, BlockId> {
    let rpo = graph.reverse_postorder();
    let rpo_index: HashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let mut doms: HashMap<BlockId, BlockId> = HashMap::new();
    doms.insert(graph.first, graph.first);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == graph.first {
                continue;
            }
            let block = graph.block(b);
            let mut new_idom: Option<BlockId> = None;
            for p in block.preds.iter().chain(block.pred_exceptions.iter()) {
                if !doms.contains_key(p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => *p,
                    Some(current) => intersect(&doms, &rpo_index, current, *p),
                });
            }
            if let Some(idom) = new_idom {
                if doms.get(&b) != Some(&idom) {
                    doms.insert(b, idom);
                    changed = true;
                }
            }
        }
    }
    doms
}

fn intersect(
    doms: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
    mut b1: BlockId,
    mut b2: BlockId,
) -> BlockId {
    while b1 != b2 {
        let idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
        let idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);
        if idx1 > idx2 {
            b1 = *doms.get(&b1).unwrap_or(&b1);
        } else {
            b2 = *doms.get(&b2).unwrap_or(&b2);
        }
    }
    b1
}

/// Whether `dom` dominates `node` in the tree produced by [`block_dominators`].
pub fn is_dominator(doms: &HashMap<BlockId, BlockId>, node: BlockId, dom: BlockId) -> bool {
    let mut current = node;
    loop {
        if current == dom {
            return true;
        }
        match doms.get(&current) {
            Some(&idom) if idom != current => current = idom,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_info::ExceptionEntry;

    fn code(bytes: &[u8]) -> CodeAttribute {
        CodeAttribute {
            max_stack: 4,
            max_locals: 4,
            code: bytes.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn conditional_jump_lists_target_before_fall_through() {
        // 0: iload_0; 1: ifeq +7 (-> 8); 4: iconst_1; 5: ireturn; 6: nop; 7: nop; 8: iconst_0; 9: ireturn
        let attr = code(&[0x1a, 0x99, 0x00, 0x07, 0x04, 0xac, 0x00, 0x00, 0x03, 0xac]);
        let graph = build_cfg(&attr, &ConstantPool::default()).unwrap();
        let first = graph.block(graph.first);
        assert_eq!(first.succs.len(), 2);
        let target = graph.block(first.succs[0]);
        assert_eq!(target.first_instruction().and_then(|i| i.offset), Some(8));
        let fall = graph.block(first.succs[1]);
        assert_eq!(fall.first_instruction().and_then(|i| i.offset), Some(4));
        // returning blocks are recorded on the exit block
        assert_eq!(graph.block(graph.last).preds.len(), 2);
    }

    #[test]
    fn exception_ranges_cover_blocks() {
        // 0: nop; 1: return; 2: astore_1; 3: return
        let mut attr = code(&[0x00, 0xb1, 0x4c, 0xb1]);
        attr.exception_table.push(ExceptionEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 2,
            catch_type: 0,
        });
        let graph = build_cfg(&attr, &ConstantPool::default()).unwrap();
        assert_eq!(graph.exceptions.len(), 1);
        let range = &graph.exceptions[0];
        assert_eq!(range.protected, vec![graph.first]);
        assert!(range.exception_types.is_none());
        assert_eq!(graph.block(graph.first).succ_exceptions, vec![range.handler]);
    }

    #[test]
    fn jsr_is_rejected() {
        let attr = code(&[0xa8, 0x00, 0x03, 0xb1]);
        let err = build_cfg(&attr, &ConstantPool::default()).unwrap_err();
        assert!(matches!(err, DecompileError::UnsupportedBytecode(_)));
    }

    #[test]
    fn dominators_of_diamond() {
        // 0: iload_0; 1: ifeq -> 7; 4: goto -> 8 ; 7: nop; 8: return
        let attr = code(&[0x1a, 0x99, 0x00, 0x06, 0xa7, 0x00, 0x04, 0x00, 0xb1]);
        let graph = build_cfg(&attr, &ConstantPool::default()).unwrap();
        let doms = block_dominators(&graph);
        for id in graph.block_ids() {
            assert!(is_dominator(&doms, id, graph.first));
        }
    }
}
