//! Statement variants: recognizers, constructors and rendering.

pub mod basic_block;
pub mod catch_all;
pub mod catch_stat;
pub mod do_stat;
pub mod general;
pub mod if_stat;
pub mod sequence;
pub mod switch_stat;
pub mod synchronized;

pub use basic_block::BasicBlockStat;
pub use catch_all::CatchAllStat;
pub use catch_stat::CatchStat;
pub use do_stat::{DoStat, LoopType};
pub use if_stat::{IfStat, IfType};
pub use switch_stat::SwitchStat;
pub use synchronized::SyncStat;

use super::error::Result;
use super::exprs::{list_to_java, RenderContext};
use super::stat_edge::EdgeType;
use super::statement::{StatId, StatKind, StatementGraph};
use super::tracer::{BytecodeMappingTracer, TextBuffer};

impl StatementGraph {
    /// Renders `stat` and its subtree as Java source.
    pub fn to_java(
        &self,
        stat: StatId,
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> Result<TextBuffer> {
        let mut buf = list_to_java(&self[stat].var_definitions, indent, ctx, tracer);
        let body = match &self[stat].kind {
            StatKind::BasicBlock(_) => basic_block::to_java(self, stat, indent, ctx, tracer),
            StatKind::Sequence => sequence::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::If(_) => if_stat::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::Do(_) => do_stat::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::Switch(_) => switch_stat::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::Trycatch(_) => catch_stat::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::CatchAll(_) => catch_all::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::Synchronized(_) => synchronized::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::General | StatKind::Placeholder => general::to_java(self, stat, indent, ctx, tracer)?,
            StatKind::Root { .. } => {
                let first = self.first(stat)?;
                self.to_java(first, indent, ctx, tracer)?
            }
            StatKind::DummyExit => TextBuffer::new(),
        };
        buf.append_buffer(&body);
        Ok(buf)
    }

    /// Renders `stat` followed by the jump its single direct successor
    /// edge stands for, if that edge is explicit.
    pub fn jmp_wrapper(
        &self,
        stat: StatId,
        indent: usize,
        semicolon: bool,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> Result<TextBuffer> {
        let mut buf = self.to_java(stat, indent, ctx, tracer)?;
        let succs = self.successor_edges(stat, EdgeType::DIRECT_ALL);
        if let [edge] = succs.as_slice() {
            let edge = self.edge(*edge);
            if edge.edge_type != EdgeType::REGULAR
                && edge.explicit
                && Some(edge.destination) != self.dummy_exit()
            {
                let keyword = if edge.edge_type == EdgeType::CONTINUE { "continue" } else { "break" };
                buf.append_indent(indent, ctx.indent).append(keyword);
                if edge.labeled {
                    if let Some(closure) = edge.closure {
                        buf.append(&format!(" label{}", closure));
                    }
                }
                buf.append(";").append_line_separator();
                tracer.increment_current_line();
            }
        }
        if buf.is_empty() && semicolon {
            buf.append_indent(indent, ctx.indent).append(";").append_line_separator();
            tracer.increment_current_line();
        }
        Ok(buf)
    }

    pub fn stats_to_java(
        &self,
        stats: &[StatId],
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> Result<TextBuffer> {
        let mut buf = TextBuffer::new();
        for &stat in stats {
            buf.append_buffer(&self.jmp_wrapper(stat, indent, false, ctx, tracer)?);
        }
        Ok(buf)
    }

    /// Moves the head expressions of compound statements out of their
    /// first basic block, once expressions exist.
    pub fn init_exprents(&mut self, stat: StatId) -> Result<()> {
        match self.stat_type(stat) {
            super::statement::StatType::If => if_stat::init_exprents(self, stat),
            super::statement::StatType::Switch => switch_stat::init_exprents(self, stat),
            super::statement::StatType::Synchronized => synchronized::init_exprents(self, stat),
            _ => Ok(()),
        }
    }
}

/// `label<id>:` line for labeled loops, ifs and switches.
pub(crate) fn label_line(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
    buf: &mut TextBuffer,
) {
    if graph.is_labeled(stat) {
        buf.append_indent(indent, ctx.indent)
            .append(&format!("label{}:", stat))
            .append_line_separator();
        tracer.increment_current_line();
    }
}
