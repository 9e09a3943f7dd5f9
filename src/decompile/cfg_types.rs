use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::code_attribute::{Instruction, InstructionSequence};

/// Block ids are allocated in creation order, so the initial blocks are
/// numbered in bytecode order and blocks split off later sort last.
pub type BlockId = u32;

/// A basic block in the CFG.
///
/// Successor lists keep duplicates: a switch with two case values jumping to
/// the same place has two entries, one per case. The first successor of a
/// conditional jump is its target, the second the fall-through block.
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub id: BlockId,
    pub seq: InstructionSequence,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    pub pred_exceptions: Vec<BlockId>,
    pub succ_exceptions: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            ..Default::default()
        }
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.seq.last()
    }

    pub fn first_instruction(&self) -> Option<&Instruction> {
        self.seq.get(0)
    }

    /// Copy of the block body under a new id, without any edges.
    pub fn detached_copy(&self, id: BlockId) -> BasicBlock {
        BasicBlock {
            id,
            seq: self.seq.clone(),
            ..Default::default()
        }
    }

    pub fn offsets(&self) -> Vec<u32> {
        self.seq.offsets()
    }
}

/// A protected range together with its handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionRange {
    pub protected: Vec<BlockId>,
    pub handler: BlockId,
    /// `None` catches everything (`finally`, `synchronized`).
    pub exception_types: Option<Vec<String>>,
}

impl ExceptionRange {
    /// A range protecting its own handler.
    pub fn is_circular(&self) -> bool {
        self.protected.contains(&self.handler)
    }

    pub fn add_exception_type(&mut self, exception_type: Option<&str>) {
        match (&mut self.exception_types, exception_type) {
            (Some(types), Some(t)) => {
                if !types.iter().any(|x| x == t) {
                    types.push(t.to_string());
                }
            }
            (types, None) => *types = None,
            (None, Some(_)) => {}
        }
    }

    /// Sorted, de-duplicated exception names, `None` for catch-all.
    pub fn unique_exceptions_string(&self) -> Option<String> {
        self.exception_types.as_ref().map(|types| {
            let set: BTreeSet<&str> = types.iter().map(String::as_str).collect();
            set.into_iter().collect::<Vec<_>>().join(":")
        })
    }
}

/// The mutable block graph of one method.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    blocks: BTreeMap<BlockId, BasicBlock>,
    pub first: BlockId,
    /// Dummy exit block. It is stored with the other blocks but never
    /// returned by [`ControlFlowGraph::block_ids`].
    pub last: BlockId,
    pub exceptions: Vec<ExceptionRange>,
    /// Blocks ending a de-inlined finally body.
    pub finally_exits: HashSet<BlockId>,
    next_id: BlockId,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_block(&mut self, seq: InstructionSequence) -> BlockId {
        let id = self.next_id;
        self.next_id += 1;
        let mut block = BasicBlock::new(id);
        block.seq = seq;
        self.blocks.insert(id, block);
        id
    }

    pub fn create_exit_block(&mut self) -> BlockId {
        let id = self.create_block(InstructionSequence::default());
        self.last = id;
        id
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Panics when `id` is not in the graph; use [`Self::get`] otherwise.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[&id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("block {} is not part of the graph", id))
    }

    pub fn get(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    /// Ids of all real blocks (the dummy exit excluded) in creation order.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks
            .keys()
            .copied()
            .filter(|&id| id != self.last)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- edges ----

    pub fn add_successor(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    /// Removes every edge `from -> to`.
    pub fn remove_successor(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.retain(|&s| s != to);
        self.block_mut(to).preds.retain(|&p| p != from);
    }

    pub fn add_successor_exception(&mut self, from: BlockId, handler: BlockId) {
        if !self.block(from).succ_exceptions.contains(&handler) {
            self.block_mut(from).succ_exceptions.push(handler);
            self.block_mut(handler).pred_exceptions.push(from);
        }
    }

    pub fn remove_successor_exception(&mut self, from: BlockId, handler: BlockId) {
        self.block_mut(from).succ_exceptions.retain(|&s| s != handler);
        self.block_mut(handler).pred_exceptions.retain(|&p| p != from);
    }

    /// Repoint every edge `from -> old` (regular or exceptional) to `new`,
    /// keeping positions in `from`'s successor lists.
    pub fn replace_successor(&mut self, from: BlockId, old: BlockId, new: BlockId) {
        let mut regular = 0;
        for s in self.block_mut(from).succs.iter_mut() {
            if *s == old {
                *s = new;
                regular += 1;
            }
        }
        if regular > 0 {
            self.block_mut(old).preds.retain(|&p| p != from);
            for _ in 0..regular {
                self.block_mut(new).preds.push(from);
            }
        }

        if self.block(from).succ_exceptions.contains(&old) {
            self.remove_successor_exception(from, old);
            self.add_successor_exception(from, new);
        }
    }

    /// Detach a block from everything and drop it, including from exception
    /// ranges and the finally exit set.
    pub fn remove_block(&mut self, id: BlockId) {
        let block = match self.blocks.get(&id) {
            Some(b) => b.clone(),
            None => return,
        };
        for s in block.succs.iter().copied().collect::<HashSet<_>>() {
            self.remove_successor(id, s);
        }
        for h in block.succ_exceptions {
            self.remove_successor_exception(id, h);
        }
        for p in block.preds.iter().copied().collect::<HashSet<_>>() {
            self.remove_successor(p, id);
        }
        for p in block.pred_exceptions {
            self.remove_successor_exception(p, id);
        }
        self.blocks.remove(&id);
        let last = self.last;
        if let Some(exit) = self.blocks.get_mut(&last) {
            exit.preds.retain(|&p| p != id);
        }

        self.exceptions.retain_mut(|range| {
            if range.handler == id {
                return false;
            }
            range.protected.retain(|&b| b != id);
            !range.protected.is_empty()
        });
        self.finally_exits.remove(&id);
    }

    /// The range whose handler is `handler` and which protects `block`.
    pub fn exception_range(&self, handler: BlockId, block: BlockId) -> Option<usize> {
        self.exceptions
            .iter()
            .position(|r| r.handler == handler && r.protected.contains(&block))
    }

    /// All blocks reachable from `first` through regular and exception
    /// edges, in reverse postorder.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        // explicit stack of (block, next successor index)
        let mut stack: Vec<(BlockId, usize)> = vec![(self.first, 0)];
        visited.insert(self.first);
        while let Some((id, index)) = stack.pop() {
            let block = self.block(id);
            let succs: Vec<BlockId> = block
                .succs
                .iter()
                .chain(block.succ_exceptions.iter())
                .copied()
                .collect();
            if index < succs.len() {
                stack.push((id, index + 1));
                let next = succs[index];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                postorder.push(id);
            }
        }
        postorder.reverse();
        postorder
    }

    /// Export to DOT format for debugging.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph CFG {\n");
        for (id, block) in &self.blocks {
            let label = block
                .seq
                .iter()
                .map(|i| format!("{}: {}", i.offset.map_or(-1, |o| o as i64), i.mnemonic()))
                .collect::<Vec<_>>()
                .join("\\l");
            out.push_str(&format!("  b{} [shape=box, label=\"#{}\\l{}\\l\"];\n", id, id, label));
            for s in &block.succs {
                out.push_str(&format!("  b{} -> b{};\n", id, s));
            }
            for h in &block.succ_exceptions {
                out.push_str(&format!("  b{} -> b{} [style=dotted];\n", id, h));
            }
        }
        out.push_str("}\n");
        out
    }
}
