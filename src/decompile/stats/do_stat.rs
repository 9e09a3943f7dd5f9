use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{Exprent, RenderContext};
use crate::decompile::stat_edge::EdgeType;
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatType, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoopType {
    /// `while (true)`
    #[default]
    Do,
    DoWhile,
    While,
    For,
}

#[derive(Clone, Debug, Default)]
pub struct DoStat {
    pub loop_type: LoopType,
    pub init: Option<Exprent>,
    pub condition: Option<Exprent>,
    pub inc: Option<Exprent>,
}

impl StatementGraph {
    pub fn do_data(&self, stat: StatId) -> Option<&DoStat> {
        match &self[stat].kind {
            StatKind::Do(d) => Some(d),
            _ => None,
        }
    }

    pub fn do_data_mut(&mut self, stat: StatId) -> Option<&mut DoStat> {
        match &mut self[stat].kind {
            StatKind::Do(d) => Some(d),
            _ => None,
        }
    }

    pub fn new_do(&mut self, head: StatId) -> StatId {
        let stat = self.add_statement(StatKind::Do(DoStat::default()));
        self[stat].first = Some(head);
        self[stat].stats.push(head);
        stat
    }
}

/// A self loop, or a statement whose continues target its own head.
pub fn is_head(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph[head].last_basic_type != LastBasicType::General || graph[head].is_monitor_enter {
        return None;
    }
    let edge = graph.first_successor(head, EdgeType::DIRECT_ALL);
    let regular = edge.map_or(false, |e| graph.edge(e).edge_type == EdgeType::REGULAR);

    if let Some(e) = edge {
        if regular && graph.edge(e).destination == head {
            return Some(graph.new_do(head));
        }
    }
    if graph.stat_type(head) != StatType::Do
        && !regular
        && graph[head].continue_set.contains(&graph.basichead(head))
    {
        return Some(graph.new_do(head));
    }
    None
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let data = graph
        .do_data(stat)
        .ok_or_else(|| DecompileError::invariant("expected a loop", Some(stat), None))?;
    let mut buf = TextBuffer::new();
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);
    let first = graph.first(stat)?;
    let cond = |tracer: &mut BytecodeMappingTracer| -> Result<TextBuffer> {
        data.condition
            .as_ref()
            .map(|c| c.to_java(indent, ctx, tracer))
            .ok_or_else(|| DecompileError::invariant("loop without condition", Some(stat), None))
    };

    match data.loop_type {
        LoopType::Do => {
            buf.append_indent(indent, ctx.indent).append("while (true) {").append_line_separator();
            tracer.increment_current_line();
            buf.append_buffer(&graph.jmp_wrapper(first, indent + 1, false, ctx, tracer)?);
            buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
            tracer.increment_current_line();
        }
        LoopType::DoWhile => {
            buf.append_indent(indent, ctx.indent).append("do {").append_line_separator();
            tracer.increment_current_line();
            buf.append_buffer(&graph.jmp_wrapper(first, indent + 1, false, ctx, tracer)?);
            let c = cond(tracer)?;
            buf.append_indent(indent, ctx.indent)
                .append("} while (")
                .append_buffer(&c)
                .append(");")
                .append_line_separator();
            tracer.increment_current_line();
        }
        LoopType::While => {
            let c = cond(tracer)?;
            buf.append_indent(indent, ctx.indent)
                .append("while (")
                .append_buffer(&c)
                .append(") {")
                .append_line_separator();
            tracer.increment_current_line();
            buf.append_buffer(&graph.jmp_wrapper(first, indent + 1, false, ctx, tracer)?);
            buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
            tracer.increment_current_line();
        }
        LoopType::For => {
            buf.append_indent(indent, ctx.indent).append("for (");
            if let Some(init) = &data.init {
                buf.append_buffer(&init.to_java(indent, ctx, tracer));
            }
            let c = cond(tracer)?;
            buf.append("; ").append_buffer(&c).append("; ");
            if let Some(inc) = &data.inc {
                buf.append_buffer(&inc.to_java(indent, ctx, tracer));
            }
            buf.append(") {").append_line_separator();
            tracer.increment_current_line();
            buf.append_buffer(&graph.jmp_wrapper(first, indent + 1, false, ctx, tracer)?);
            buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
            tracer.increment_current_line();
        }
    }
    Ok(buf)
}
