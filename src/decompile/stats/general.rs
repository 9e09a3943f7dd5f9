use crate::decompile::error::Result;
use crate::decompile::exprs::RenderContext;
use crate::decompile::statement::{StatId, StatKind, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

impl StatementGraph {
    /// Unstructured region over `nodes`, entered through `head`.
    pub fn new_general(&mut self, head: StatId, nodes: Vec<StatId>, post: Option<StatId>) -> StatId {
        let stat = self.add_statement(StatKind::General);
        self[stat].first = Some(head);
        self[stat].stats = nodes;
        self[stat].post = post;
        stat
    }
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let mut buf = TextBuffer::new();
    if graph.is_labeled(stat) {
        buf.append_indent(indent, ctx.indent)
            .append(&format!("label{}:", stat))
            .append_line_separator();
        tracer.increment_current_line();
    }
    buf.append_indent(indent, ctx.indent).append("abstract statement {").append_line_separator();
    tracer.increment_current_line();
    for &child in &graph[stat].stats {
        buf.append_buffer(&graph.to_java(child, indent + 1, ctx, tracer)?);
    }
    buf.append_indent(indent, ctx.indent).append("}");
    buf.append_line_separator();
    tracer.increment_current_line();
    Ok(buf)
}
