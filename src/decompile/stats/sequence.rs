use crate::decompile::dec_helper::check_statement_exceptions;
use crate::decompile::error::Result;
use crate::decompile::exprs::RenderContext;
use crate::decompile::stat_edge::EdgeType;
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

impl StatementGraph {
    /// Builds a sequence over `stats` (not yet collapsed into it).
    pub fn new_sequence(&mut self, stats: Vec<StatId>) -> StatId {
        let last = stats.last().map_or(LastBasicType::General, |&s| self[s].last_basic_type);
        let seq = self.add_statement(StatKind::Sequence);
        self[seq].first = stats.first().copied();
        self[seq].stats = stats;
        self[seq].last_basic_type = last;
        seq
    }
}

/// `head` falling through into a single-entry successor.
pub fn is_head2_block(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph[head].last_basic_type != LastBasicType::General {
        return None;
    }
    let edge = graph.first_successor(head, EdgeType::DIRECT_ALL)?;
    if graph.edge(edge).edge_type != EdgeType::REGULAR {
        return None;
    }
    let stat = graph.edge(edge).destination;
    if stat == head
        || graph.predecessor_edges(stat, EdgeType::REGULAR).len() != 1
        || graph[stat].is_monitor_enter
        || graph[stat].last_basic_type != LastBasicType::General
        || !check_statement_exceptions(graph, &[head, stat])
    {
        return None;
    }

    let seq = graph.new_sequence(vec![head, stat]);
    if let Some(edge) = graph.first_successor(stat, EdgeType::DIRECT_ALL) {
        let e = graph.edge(edge);
        if e.edge_type == EdgeType::REGULAR && e.destination != head {
            graph[seq].post = Some(e.destination);
        }
    }
    Some(seq)
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let mut buf = TextBuffer::new();
    let labeled = graph.is_labeled(stat);
    let mut inner = indent;
    if labeled {
        buf.append_indent(indent, ctx.indent)
            .append(&format!("label{}: {{", stat))
            .append_line_separator();
        tracer.increment_current_line();
        inner += 1;
    }

    let mut not_empty = false;
    for (i, &child) in graph[stat].stats.iter().enumerate() {
        if i > 0 && not_empty {
            buf.append_line_separator();
            tracer.increment_current_line();
        }
        let text = graph.jmp_wrapper(child, inner, false, ctx, tracer)?;
        not_empty = !text.contains_only_whitespace();
        buf.append_buffer(&text);
    }

    if labeled {
        buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
        tracer.increment_current_line();
    }
    Ok(buf)
}
