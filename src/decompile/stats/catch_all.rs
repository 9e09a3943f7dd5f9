use crate::decompile::dec_helper::{check_statement_exceptions, unique_pred_exceptions};
use crate::decompile::descriptor::VarType;
use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{Exprent, RenderContext};
use crate::decompile::stat_edge::EdgeType;
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatType, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

/// A body protected by a single catch-all handler. After finally
/// processing the handler is the `finally` block.
#[derive(Clone, Debug, Default)]
pub struct CatchAllStat {
    pub handler: Option<StatId>,
    pub is_finally: bool,
    /// Semaphore guarding the finally body when its copies could not all
    /// be removed.
    pub monitor: Option<Exprent>,
    pub vars: Vec<Exprent>,
}

impl StatementGraph {
    pub fn catch_all_data(&self, stat: StatId) -> Option<&CatchAllStat> {
        match &self[stat].kind {
            StatKind::CatchAll(c) => Some(c),
            _ => None,
        }
    }

    pub fn catch_all_data_mut(&mut self, stat: StatId) -> Option<&mut CatchAllStat> {
        match &mut self[stat].kind {
            StatKind::CatchAll(c) => Some(c),
            _ => None,
        }
    }
}

pub fn is_head(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph[head].last_basic_type != LastBasicType::General {
        return None;
    }
    let handlers = unique_pred_exceptions(graph, head);
    let [handler] = handlers.as_slice() else {
        return None;
    };
    let handler = *handler;

    let catches_all = graph
        .successor_edges(head, EdgeType::EXCEPTION)
        .into_iter()
        .any(|e| graph.edge(e).destination == handler && graph.edge(e).exceptions.is_none());
    if !catches_all {
        return None;
    }
    if graph[handler].last_basic_type != LastBasicType::General {
        return None;
    }
    if let Some(e) = graph.first_successor(handler, EdgeType::DIRECT_ALL) {
        if graph.edge(e).edge_type == EdgeType::REGULAR {
            return None;
        }
    }
    if graph[head].is_monitor_enter
        || graph[handler].is_monitor_enter
        || !check_statement_exceptions(graph, &[head, handler])
    {
        return None;
    }

    let post = graph
        .first_successor(head, EdgeType::DIRECT_ALL)
        .filter(|&e| graph.edge(e).edge_type == EdgeType::REGULAR)
        .map(|e| graph.edge(e).destination);

    let mut var = Exprent::var(graph.next_var_index(), VarType::from_class_name("java/lang/Throwable"));
    if let Some(v) = var.as_var_mut() {
        v.definition = true;
    }
    let stat = graph.add_statement(StatKind::CatchAll(CatchAllStat {
        handler: Some(handler),
        vars: vec![var],
        ..CatchAllStat::default()
    }));
    graph[stat].first = Some(head);
    graph[stat].stats = vec![head, handler];
    graph[stat].post = post;
    Some(stat)
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let data = graph
        .catch_all_data(stat)
        .ok_or_else(|| DecompileError::invariant("expected a catch-all statement", Some(stat), None))?;
    let first = graph.first(stat)?;
    let handler = data
        .handler
        .ok_or_else(|| DecompileError::invariant("catch-all without handler", Some(stat), None))?;

    let mut buf = TextBuffer::new();
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);

    // try-catch-finally prints as one construct
    let inline_try = data.is_finally
        && graph.stat_type(first) == StatType::Trycatch
        && graph[first].var_definitions.is_empty()
        && !graph.is_labeled(first)
        && graph
            .first_successor(first, EdgeType::DIRECT_ALL)
            .map_or(true, |e| !graph.edge(e).explicit);

    if inline_try {
        let mut content = graph.jmp_wrapper(first, indent, true, ctx, tracer)?;
        content.trim_line_separator();
        tracer.decrement_current_line();
        buf.append_buffer(&content);
    } else {
        buf.append_indent(indent, ctx.indent).append("try {").append_line_separator();
        tracer.increment_current_line();
        buf.append_buffer(&graph.jmp_wrapper(first, indent + 1, true, ctx, tracer)?);
        buf.append_indent(indent, ctx.indent).append("}");
    }

    if data.is_finally {
        buf.append(" finally {");
    } else {
        buf.append(" catch (");
        if let Some(var) = data.vars.first() {
            buf.append_buffer(&var.to_java(indent, ctx, tracer));
        }
        buf.append(") {");
    }
    buf.append_line_separator();
    tracer.increment_current_line();

    match &data.monitor {
        Some(monitor) => {
            buf.append_indent(indent + 1, ctx.indent)
                .append("if (")
                .append_buffer(&monitor.to_java(indent, ctx, tracer))
                .append(") {")
                .append_line_separator();
            tracer.increment_current_line();
            buf.append_buffer(&graph.jmp_wrapper(handler, indent + 2, false, ctx, tracer)?);
            buf.append_indent(indent + 1, ctx.indent).append("}").append_line_separator();
            tracer.increment_current_line();
        }
        None => {
            buf.append_buffer(&graph.jmp_wrapper(handler, indent + 1, false, ctx, tracer)?);
        }
    }
    buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
    tracer.increment_current_line();
    Ok(buf)
}
