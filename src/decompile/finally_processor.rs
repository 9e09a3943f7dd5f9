//! `finally` recovery on the block graph.
//!
//! Compilers copy a finally body onto every normal exit of the protected
//! region and once more into a catch-everything handler that rethrows. For
//! each such handler the processor either deletes the inlined copies and
//! keeps the handler as the single finally body, or, when the copies cannot
//! be matched, guards the handler with a boolean semaphore that is set on
//! entry to the region and cleared on every normal exit.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::code_attribute::opcodes::{ALOAD, ASTORE, ATHROW, ICONST_0, ICONST_1, IINC, ILOAD, ISTORE, POP};
use crate::code_attribute::{Instruction, InstructionSequence};

use super::cfg_types::{BlockId, ControlFlowGraph};
use super::descriptor::VarType;
use super::error::{DecompileError, Result};
use super::exprs::Exprent;
use super::options::DecompilerOptions;
use super::statement::{StatId, StatType, StatementGraph};

/// What happened to a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinallyOutcome {
    /// Copies removed, the handler is the finally body.
    Deinlined,
    /// Copies kept, the handler runs only while the semaphore is set.
    Semaphore(u32),
    /// Kept as a plain catch-all.
    CatchAll,
}

/// How the handler treats the caught exception on entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandlerEntry {
    /// `astore n`
    Stored(i32),
    /// `pop`
    Discarded,
    /// Left on the stack.
    Bare,
}

/// The handler side of one finally.
#[derive(Debug)]
struct FinallyInfo {
    handler: BlockId,
    protected: BTreeSet<BlockId>,
    /// Handler blocks reachable before the rethrow.
    body: BTreeSet<BlockId>,
    /// The block ending in `aload n; athrow`.
    exit: BlockId,
}

/// A matched inlined copy of the finally body.
#[derive(Debug)]
struct CopyArea {
    entry: BlockId,
    blocks: BTreeSet<BlockId>,
    /// Block holding the end of the copy and the index right after it.
    end: (BlockId, usize),
}

#[derive(Debug)]
pub struct FinallyProcessor {
    outcomes: HashMap<BlockId, FinallyOutcome>,
    next_var: u32,
}

impl FinallyProcessor {
    pub fn new(first_free_var: u32) -> Self {
        FinallyProcessor {
            outcomes: HashMap::new(),
            next_var: first_free_var,
        }
    }

    /// First variable index not taken by a semaphore.
    pub fn first_free_var(&self) -> u32 {
        self.next_var
    }

    pub fn outcome(&self, handler: BlockId) -> Option<FinallyOutcome> {
        self.outcomes.get(&handler).copied()
    }

    /// Handles the innermost unprocessed catch-all of `graph`. Returns
    /// whether the block graph changed, in which case the statement graph
    /// has to be rebuilt.
    pub fn process(
        &mut self,
        cfg: &mut ControlFlowGraph,
        graph: &StatementGraph,
        options: &DecompilerOptions,
    ) -> Result<bool> {
        let root = graph.root()?;
        for stat in graph.subtree(root).into_iter().rev() {
            if graph.stat_type(stat) != StatType::CatchAll {
                continue;
            }
            let Some(handler) = handler_block(graph, stat) else {
                continue;
            };
            if self.outcomes.contains_key(&handler) {
                continue;
            }

            let info = match finally_info(cfg, handler) {
                Ok(info) => info,
                Err(err) => {
                    warn!(%err, "keeping handler as catch-all");
                    self.outcomes.insert(handler, FinallyOutcome::CatchAll);
                    continue;
                }
            };

            if options.finally_deinline {
                if let Some(areas) = match_copies(cfg, &info) {
                    delete_copies(cfg, &info, areas)?;
                    strip_handler(cfg, &info);
                    self.outcomes.insert(handler, FinallyOutcome::Deinlined);
                    debug!(handler, "finally de-inlined");
                    return Ok(true);
                }
            }

            let var = self.next_var;
            if insert_semaphore(cfg, &info, var) {
                self.next_var += 1;
                strip_handler(cfg, &info);
                self.outcomes.insert(handler, FinallyOutcome::Semaphore(var));
                debug!(handler, var, "finally guarded by semaphore");
                return Ok(true);
            }
            warn!(handler, "no single entry into the protected region, keeping handler as catch-all");
            self.outcomes.insert(handler, FinallyOutcome::CatchAll);
        }
        Ok(false)
    }

    /// Flags the catch-alls whose handlers were turned into finally bodies.
    pub fn mark_finally(&self, graph: &mut StatementGraph) -> Result<()> {
        let root = graph.root()?;
        for stat in graph.subtree(root) {
            if graph.stat_type(stat) != StatType::CatchAll {
                continue;
            }
            let Some(outcome) = handler_block(graph, stat).and_then(|h| self.outcome(h)) else {
                continue;
            };
            let Some(data) = graph.catch_all_data_mut(stat) else {
                continue;
            };
            match outcome {
                FinallyOutcome::Deinlined => data.is_finally = true,
                FinallyOutcome::Semaphore(var) => {
                    data.is_finally = true;
                    data.monitor = Some(Exprent::var(var, VarType::Boolean));
                }
                FinallyOutcome::CatchAll => {}
            }
        }
        Ok(())
    }
}

fn handler_block(graph: &StatementGraph, stat: StatId) -> Option<BlockId> {
    let handler = graph.catch_all_data(stat)?.handler?;
    graph.block_of(graph.basichead(handler))?.block_id
}

fn handler_entry(cfg: &ControlFlowGraph, handler: BlockId) -> HandlerEntry {
    match cfg.block(handler).first_instruction() {
        Some(i) if i.opcode == ASTORE => HandlerEntry::Stored(i.operand(0)),
        Some(i) if i.opcode == POP => HandlerEntry::Discarded,
        _ => HandlerEntry::Bare,
    }
}

/// Collects the handler body and checks it ends in a single rethrow of
/// the stored exception.
fn finally_info(cfg: &ControlFlowGraph, handler: BlockId) -> Result<FinallyInfo> {
    let inconsistent = || DecompileError::InconsistentFinally { handler };
    let HandlerEntry::Stored(var) = handler_entry(cfg, handler) else {
        return Err(inconsistent());
    };
    let range = cfg
        .exceptions
        .iter()
        .find(|r| r.handler == handler && r.exception_types.is_none())
        .ok_or_else(inconsistent)?;
    let protected: BTreeSet<BlockId> = range.protected.iter().copied().collect();

    let mut body = BTreeSet::from([handler]);
    let mut stack = vec![handler];
    let mut exits = Vec::new();
    while let Some(id) = stack.pop() {
        let block = cfg.block(id);
        if !block.succ_exceptions.is_empty() && id != handler {
            return Err(inconsistent());
        }
        if is_rethrow(&block.seq, var) {
            exits.push(id);
            continue;
        }
        for &succ in &block.succs {
            if succ == cfg.last {
                // returns from inside the finally body
                return Err(inconsistent());
            }
            if body.insert(succ) {
                stack.push(succ);
            }
        }
    }
    let [exit] = exits.as_slice() else {
        return Err(inconsistent());
    };

    for &id in &body {
        if id == handler {
            continue;
        }
        if cfg.block(id).preds.iter().any(|p| !body.contains(p)) || protected.contains(&id) {
            return Err(inconsistent());
        }
    }

    Ok(FinallyInfo {
        handler,
        protected,
        body,
        exit: *exit,
    })
}

fn is_rethrow(seq: &InstructionSequence, var: i32) -> bool {
    let n = seq.len();
    n >= 2
        && seq.get(n - 1).is_some_and(|i| i.opcode == ATHROW)
        && seq.get(n - 2).is_some_and(|i| i.opcode == ALOAD && i.operand(0) == var)
}

/// Handler instructions without the exception store and the rethrow.
fn body_instructions<'a>(cfg: &'a ControlFlowGraph, info: &FinallyInfo, id: BlockId) -> &'a [Instruction] {
    let all = &cfg.block(id).seq.instructions[..];
    let start = usize::from(id == info.handler).min(all.len());
    let end = if id == info.exit { all.len().saturating_sub(2) } else { all.len() };
    &all[start..end.max(start)]
}

/// Exit edges of the protected region, keyed by their target.
fn region_exits(cfg: &ControlFlowGraph, info: &FinallyInfo) -> BTreeSet<BlockId> {
    let mut out = BTreeSet::new();
    for &id in &info.protected {
        for &succ in &cfg.block(id).succs {
            if !info.protected.contains(&succ) && succ != info.handler {
                out.insert(succ);
            }
        }
    }
    out
}

/// Matches an inlined copy for every exit of the protected region.
fn match_copies(cfg: &ControlFlowGraph, info: &FinallyInfo) -> Option<Vec<CopyArea>> {
    let total: usize = info.body.iter().map(|&b| body_instructions(cfg, info, b).len()).sum();
    let exits = region_exits(cfg, info);
    if total == 0 {
        return Some(Vec::new());
    }

    let mut areas: Vec<CopyArea> = Vec::new();
    let mut claimed: HashSet<BlockId> = HashSet::new();
    for entry in exits {
        if entry == cfg.last {
            return None;
        }
        let area = match_copy(cfg, info, entry)?;
        for &b in &area.blocks {
            if !claimed.insert(b) {
                return None;
            }
        }
        areas.push(area);
    }
    Some(areas)
}

fn match_copy(cfg: &ControlFlowGraph, info: &FinallyInfo, entry: BlockId) -> Option<CopyArea> {
    let mut mapping: HashMap<BlockId, BlockId> = HashMap::new();
    let mut vars = VarMapping::default();
    let mut blocks = BTreeSet::new();
    let mut end = None;
    let mut work = vec![(info.handler, entry)];

    while let Some((h, c)) = work.pop() {
        if let Some(&seen) = mapping.get(&h) {
            if seen != c {
                return None;
            }
            continue;
        }
        if info.protected.contains(&c) || info.body.contains(&c) || c == cfg.last {
            return None;
        }
        mapping.insert(h, c);
        blocks.insert(c);

        let expected = body_instructions(cfg, info, h);
        let copy = &cfg.block(c).seq.instructions[..];
        if copy.len() < expected.len() {
            return None;
        }
        if !expected
            .iter()
            .zip(copy.iter())
            .all(|(a, b)| vars.equal(a, b))
        {
            return None;
        }

        if h == info.exit {
            end = Some((c, expected.len()));
            continue;
        }
        if copy.len() != expected.len() {
            return None;
        }
        let hs = &cfg.block(h).succs;
        let cs = &cfg.block(c).succs;
        if hs.len() != cs.len() {
            return None;
        }
        work.extend(hs.iter().copied().zip(cs.iter().copied()));
    }

    let end = end?;
    // only the region exits and the copy itself may enter the copy
    for &b in &blocks {
        let outside = cfg.block(b).preds.iter().any(|p| {
            if b == entry {
                !info.protected.contains(p) && !blocks.contains(p)
            } else {
                !blocks.contains(p)
            }
        });
        if outside {
            return None;
        }
    }
    Some(CopyArea { entry, blocks, end })
}

/// Local variable renaming allowed between the handler and a copy.
#[derive(Default)]
struct VarMapping {
    forward: HashMap<i32, i32>,
    backward: HashMap<i32, i32>,
}

impl VarMapping {
    fn equal(&mut self, handler: &Instruction, copy: &Instruction) -> bool {
        if !is_local_access(handler.opcode) {
            return handler.same_shape(copy);
        }
        if handler.opcode != copy.opcode || handler.operands.get(1) != copy.operands.get(1) {
            return false;
        }
        let (a, b) = (handler.operand(0), copy.operand(0));
        let fwd = *self.forward.entry(a).or_insert(b);
        let bwd = *self.backward.entry(b).or_insert(a);
        fwd == b && bwd == a
    }
}

fn is_local_access(opcode: u8) -> bool {
    matches!(opcode, ILOAD..=ALOAD | ISTORE..=ASTORE | IINC)
}

/// Cuts every matched copy out of the graph and points the region exits
/// at whatever followed it.
fn delete_copies(cfg: &mut ControlFlowGraph, info: &FinallyInfo, areas: Vec<CopyArea>) -> Result<()> {
    for area in areas {
        let (last, index) = area.end;
        let continuation = if index < cfg.block(last).seq.len() {
            split_block(cfg, last, index)
        } else {
            let succs: BTreeSet<BlockId> = cfg.block(last).succs.iter().copied().collect();
            match succs.into_iter().collect::<Vec<_>>().as_slice() {
                [next] if *next != cfg.last => *next,
                _ => {
                    return Err(DecompileError::InconsistentFinally { handler: info.handler });
                }
            }
        };

        let sources: Vec<BlockId> = cfg
            .block(area.entry)
            .preds
            .iter()
            .copied()
            .filter(|p| info.protected.contains(p))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for source in sources {
            cfg.replace_successor(source, area.entry, continuation);
        }
        for b in area.blocks {
            if b != continuation {
                cfg.remove_block(b);
            }
        }
    }
    Ok(())
}

/// Moves the instructions from `index` on into a new block that takes over
/// the successors and ranges of `id`.
fn split_block(cfg: &mut ControlFlowGraph, id: BlockId, index: usize) -> BlockId {
    let tail: Vec<Instruction> = cfg.block_mut(id).seq.instructions.split_off(index);
    let next = cfg.create_block(InstructionSequence::new(tail));
    let block = cfg.block(id).clone();
    for succ in block.succs {
        cfg.remove_successor(id, succ);
        cfg.add_successor(next, succ);
    }
    for handler in block.succ_exceptions {
        cfg.add_successor_exception(next, handler);
    }
    for range in cfg.exceptions.iter_mut() {
        if range.protected.contains(&id) {
            range.protected.push(next);
        }
    }
    cfg.add_successor(id, next);
    next
}

/// Drops the exception store and the rethrow; the handler now ends in a
/// finally exit.
fn strip_handler(cfg: &mut ControlFlowGraph, info: &FinallyInfo) {
    let exit = cfg.block_mut(info.exit);
    exit.seq.remove_last();
    exit.seq.remove_last();
    let handler = cfg.block_mut(info.handler);
    if !handler.seq.is_empty() {
        handler.seq.remove(0);
    }
    cfg.finally_exits.insert(info.exit);
}

/// Sets `var` before the only entry into the region and clears it on each
/// normal exit.
fn insert_semaphore(cfg: &mut ControlFlowGraph, info: &FinallyInfo, var: u32) -> bool {
    let entries: BTreeSet<BlockId> = info
        .protected
        .iter()
        .copied()
        .filter(|&b| b == cfg.first || cfg.block(b).preds.iter().any(|p| !info.protected.contains(p)))
        .collect();
    let entries: Vec<BlockId> = entries.into_iter().collect();
    let [entry] = entries.as_slice() else {
        return false;
    };
    let entry = *entry;

    let set = cfg.create_block(store_constant(ICONST_1, var));
    let outside: BTreeSet<BlockId> = cfg
        .block(entry)
        .preds
        .iter()
        .copied()
        .filter(|p| !info.protected.contains(p))
        .collect();
    for pred in outside {
        cfg.replace_successor(pred, entry, set);
    }
    cfg.add_successor(set, entry);
    if cfg.first == entry {
        cfg.first = set;
    }
    for range in cfg.exceptions.iter_mut() {
        if range.handler != info.handler && range.protected.contains(&entry) {
            range.protected.push(set);
        }
    }
    for handler in cfg.block(entry).succ_exceptions.clone() {
        if handler != info.handler {
            cfg.add_successor_exception(set, handler);
        }
    }

    let mut exits: Vec<(BlockId, BlockId)> = Vec::new();
    for &id in &info.protected {
        for &succ in &cfg.block(id).succs {
            if !info.protected.contains(&succ) && succ != info.handler && succ != cfg.last && !exits.contains(&(id, succ)) {
                exits.push((id, succ));
            }
        }
    }
    for (from, to) in exits {
        let clear = cfg.create_block(store_constant(ICONST_0, var));
        cfg.replace_successor(from, to, clear);
        cfg.add_successor(clear, to);
    }
    true
}

fn store_constant(constant: u8, var: u32) -> InstructionSequence {
    InstructionSequence::new(vec![
        Instruction::new(constant, vec![]),
        Instruction::new(ISTORE, vec![var as i32]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::opcodes::{IFEQ, INVOKESTATIC, RETURN};
    use crate::decompile::cfg_types::ExceptionRange;

    fn seq(instrs: &[(u8, i32)]) -> InstructionSequence {
        InstructionSequence::new(
            instrs
                .iter()
                .map(|&(op, arg)| {
                    let operands = if arg < 0 { vec![] } else { vec![arg] };
                    Instruction::new(op, operands)
                })
                .collect(),
        )
    }

    const F: (u8, i32) = (INVOKESTATIC, 7);

    /// `try { if (c) { a(); return; } b(); } finally { f(); int x = 5; }`
    /// with the two inlined copies storing `x` in different slots.
    fn two_exit_finally() -> (ControlFlowGraph, [BlockId; 6]) {
        let mut cfg = ControlFlowGraph::new();
        let head = cfg.create_block(seq(&[(ILOAD, 0), (IFEQ, 0)]));
        let a = cfg.create_block(seq(&[(INVOKESTATIC, 3)]));
        let copy_a = cfg.create_block(seq(&[F, (ICONST_0 + 5, -1), (ISTORE, 2), (RETURN, -1)]));
        let b = cfg.create_block(seq(&[(INVOKESTATIC, 4)]));
        let copy_b = cfg.create_block(seq(&[F, (ICONST_0 + 5, -1), (ISTORE, 3), (RETURN, -1)]));
        let handler = cfg.create_block(seq(&[
            (ASTORE, 1),
            F,
            (ICONST_0 + 5, -1),
            (ISTORE, 2),
            (ALOAD, 1),
            (ATHROW, -1),
        ]));
        let exit = cfg.create_exit_block();
        cfg.first = head;
        cfg.add_successor(head, b);
        cfg.add_successor(head, a);
        cfg.add_successor(a, copy_a);
        cfg.add_successor(b, copy_b);
        cfg.add_successor(copy_a, exit);
        cfg.add_successor(copy_b, exit);
        cfg.add_successor(handler, exit);
        for p in [head, a, b] {
            cfg.add_successor_exception(p, handler);
        }
        cfg.exceptions.push(ExceptionRange {
            protected: vec![head, a, b],
            handler,
            exception_types: None,
        });
        (cfg, [head, a, copy_a, b, copy_b, handler])
    }

    #[test]
    fn matching_copies_are_removed() {
        let (mut cfg, [head, a, copy_a, b, copy_b, handler]) = two_exit_finally();
        let info = finally_info(&cfg, handler).unwrap();
        let areas = match_copies(&cfg, &info).unwrap();
        assert_eq!(areas.len(), 2);
        delete_copies(&mut cfg, &info, areas).unwrap();
        strip_handler(&mut cfg, &info);

        assert!(!cfg.contains(copy_a));
        assert!(!cfg.contains(copy_b));
        for from in [a, b] {
            let next = cfg.block(from).succs[0];
            let rest: Vec<u8> = cfg.block(next).seq.iter().map(|i| i.opcode).collect();
            assert_eq!(rest, vec![RETURN]);
        }
        let body: Vec<u8> = cfg.block(handler).seq.iter().map(|i| i.opcode).collect();
        assert_eq!(body, vec![INVOKESTATIC, ICONST_0 + 5, ISTORE]);
        assert!(cfg.finally_exits.contains(&handler));
        assert_eq!(cfg.exceptions[0].protected, vec![head, a, b]);
    }

    #[test]
    fn diverging_copy_is_rejected() {
        let (mut cfg, [.., copy_b, handler]) = two_exit_finally();
        cfg.block_mut(copy_b).seq.instructions[0] = Instruction::new(INVOKESTATIC, vec![9]);
        let info = finally_info(&cfg, handler).unwrap();
        assert!(match_copies(&cfg, &info).is_none());
    }

    #[test]
    fn slot_renaming_must_be_consistent() {
        let mut vars = VarMapping::default();
        assert!(vars.equal(&Instruction::new(ISTORE, vec![2]), &Instruction::new(ISTORE, vec![1])));
        assert!(vars.equal(&Instruction::new(ILOAD, vec![2]), &Instruction::new(ILOAD, vec![1])));
        assert!(!vars.equal(&Instruction::new(ISTORE, vec![2]), &Instruction::new(ISTORE, vec![3])));
        assert!(!vars.equal(&Instruction::new(ISTORE, vec![4]), &Instruction::new(ISTORE, vec![1])));
    }

    #[test]
    fn semaphore_guards_unmatched_copies() {
        let (mut cfg, [head, a, copy_a, b, copy_b, handler]) = two_exit_finally();
        cfg.block_mut(copy_b).seq.instructions[0] = Instruction::new(INVOKESTATIC, vec![9]);
        let info = finally_info(&cfg, handler).unwrap();
        assert!(insert_semaphore(&mut cfg, &info, 8));

        let set = cfg.first;
        assert_ne!(set, head);
        assert_eq!(cfg.block(set).succs, vec![head]);
        for (from, copy) in [(a, copy_a), (b, copy_b)] {
            let clear = cfg.block(from).succs[0];
            assert_eq!(cfg.block(clear).seq.get(0).map(|i| i.opcode), Some(ICONST_0));
            assert_eq!(cfg.block(clear).succs, vec![copy]);
        }
    }

    #[test]
    fn handler_without_rethrow_is_not_a_finally() {
        let mut cfg = ControlFlowGraph::new();
        let body = cfg.create_block(seq(&[(INVOKESTATIC, 3)]));
        let after = cfg.create_block(seq(&[(RETURN, -1)]));
        let handler = cfg.create_block(seq(&[(POP, -1), (RETURN, -1)]));
        let exit = cfg.create_exit_block();
        cfg.first = body;
        cfg.add_successor(body, after);
        cfg.add_successor(after, exit);
        cfg.add_successor(handler, exit);
        cfg.add_successor_exception(body, handler);
        cfg.exceptions.push(ExceptionRange {
            protected: vec![body],
            handler,
            exception_types: None,
        });
        assert_eq!(handler_entry(&cfg, handler), HandlerEntry::Discarded);
        assert!(matches!(
            finally_info(&cfg, handler),
            Err(DecompileError::InconsistentFinally { .. })
        ));
    }
}
