use crate::code_attribute::{opcodes, InstructionGroup, InstructionSequence};
use crate::decompile::cfg_types::BlockId;
use crate::decompile::exprs::{list_to_java, RenderContext};
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

/// Leaf statement wrapping one basic block of the control-flow graph.
#[derive(Clone, Debug, Default)]
pub struct BasicBlockStat {
    /// Block this statement was built from; `None` for synthetic blocks.
    pub block_id: Option<BlockId>,
    pub seq: InstructionSequence,
}

impl BasicBlockStat {
    pub fn new(block_id: Option<BlockId>, seq: InstructionSequence) -> Self {
        BasicBlockStat { block_id, seq }
    }

    fn last_basic_type(&self) -> LastBasicType {
        match self.seq.last() {
            Some(instr) if instr.group() == InstructionGroup::Jump && instr.opcode != opcodes::GOTO => {
                LastBasicType::If
            }
            Some(instr) if instr.group() == InstructionGroup::Switch => LastBasicType::Switch,
            _ => LastBasicType::General,
        }
    }
}

impl StatementGraph {
    pub fn add_basic_block(&mut self, block_id: Option<BlockId>, seq: InstructionSequence) -> StatId {
        let bb = BasicBlockStat::new(block_id, seq);
        let last = bb.last_basic_type();
        let id = self.add_statement(StatKind::BasicBlock(bb));
        self[id].last_basic_type = last;
        self.build_monitor_flags(id);
        id
    }

    /// Empty block with an empty expression list, used as a placeholder.
    pub fn add_empty_block(&mut self) -> StatId {
        let id = self.add_basic_block(None, InstructionSequence::default());
        self[id].exprents = Some(Vec::new());
        id
    }

    pub fn block_of(&self, stat: StatId) -> Option<&BasicBlockStat> {
        match &self[stat].kind {
            StatKind::BasicBlock(bb) => Some(bb),
            _ => None,
        }
    }
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> TextBuffer {
    match &graph[stat].exprents {
        Some(list) => list_to_java(list, indent, ctx, tracer),
        None => TextBuffer::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::Instruction;

    #[test]
    fn classifies_block_ends() {
        let mut g = StatementGraph::new(0);
        let cond = g.add_basic_block(
            Some(0),
            InstructionSequence::new(vec![Instruction::new(opcodes::IFEQ, vec![8]).at(0)]),
        );
        let jump = g.add_basic_block(
            Some(1),
            InstructionSequence::new(vec![Instruction::new(opcodes::GOTO, vec![0]).at(3)]),
        );
        let enter = g.add_basic_block(
            Some(2),
            InstructionSequence::new(vec![Instruction::new(opcodes::MONITORENTER, vec![]).at(6)]),
        );
        assert_eq!(g[cond].last_basic_type, LastBasicType::If);
        assert_eq!(g[jump].last_basic_type, LastBasicType::General);
        assert!(g[enter].is_monitor_enter);
    }
}
