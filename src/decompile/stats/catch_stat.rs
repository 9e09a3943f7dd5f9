use crate::code_attribute::opcodes;
use crate::decompile::dec_helper::{check_statement_exceptions, unique_pred_exceptions};
use crate::decompile::descriptor::{class_source_name, VarType};
use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{Exprent, RenderContext};
use crate::decompile::stat_edge::EdgeType;
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

/// `try { .. } catch (A | B e) { .. }` with one entry per handler.
#[derive(Clone, Debug, Default)]
pub struct CatchStat {
    /// Caught types per handler, in exception table order.
    pub exception_types: Vec<Vec<String>>,
    /// Catch variable per handler.
    pub vars: Vec<Exprent>,
}

pub fn is_head(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph[head].last_basic_type != LastBasicType::General {
        return None;
    }
    let mut handlers = unique_pred_exceptions(graph, head);
    if handlers.is_empty() {
        return None;
    }

    // a join shared by everything, or none at all
    let mut next_count = 0;
    let mut next = None;
    if let Some(e) = graph.first_successor(head, EdgeType::DIRECT_ALL) {
        if graph.edge(e).edge_type == EdgeType::REGULAR {
            next = Some(graph.edge(e).destination);
            next_count = 2;
        }
    }

    for e in graph.successor_edges(head, EdgeType::EXCEPTION) {
        let handler = graph.edge(e).destination;
        let mut ok = graph.edge(e).exceptions.is_some() && handlers.contains(&handler);
        if ok {
            if graph[handler].last_basic_type != LastBasicType::General {
                ok = false;
            } else if let Some(succ) = graph.first_successor(handler, EdgeType::DIRECT_ALL) {
                if graph.edge(succ).edge_type == EdgeType::REGULAR {
                    let target = graph.edge(succ).destination;
                    match next {
                        None => next = Some(target),
                        Some(n) if n != target => ok = false,
                        _ => {}
                    }
                    if ok {
                        next_count += 1;
                    }
                }
            }
        }
        if !ok {
            handlers.retain(|&h| h != handler);
        }
    }

    if next_count == 1 || handlers.is_empty() {
        return None;
    }
    let mut members = vec![head];
    members.extend(handlers.iter().copied());
    if members.iter().any(|&s| graph[s].is_monitor_enter) || !check_statement_exceptions(graph, &members) {
        return None;
    }

    let mut data = CatchStat::default();
    let mut stats = vec![head];
    for e in graph.successor_edges(head, EdgeType::EXCEPTION) {
        let handler = graph.edge(e).destination;
        if handlers.contains(&handler) && !stats.contains(&handler) {
            let types = graph.edge(e).exceptions.clone().unwrap_or_default();
            let first_type = types
                .first()
                .map(|t| VarType::from_class_name(t))
                .unwrap_or_else(|| VarType::from_class_name("java/lang/Throwable"));
            let mut var = Exprent::var(graph.next_var_index(), first_type);
            if let Some(v) = var.as_var_mut() {
                v.definition = true;
            }
            stats.push(handler);
            data.exception_types.push(types);
            data.vars.push(var);
        }
    }

    let stat = graph.add_statement(StatKind::Trycatch(data));
    graph[stat].first = Some(head);
    graph[stat].stats = stats;
    graph[stat].post = next;
    Some(stat)
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let data = match &graph[stat].kind {
        StatKind::Trycatch(c) => c,
        _ => return Err(DecompileError::invariant("expected a try statement", Some(stat), None)),
    };
    let mut buf = TextBuffer::new();
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);
    buf.append_indent(indent, ctx.indent).append("try {").append_line_separator();
    tracer.increment_current_line();
    buf.append_buffer(&graph.jmp_wrapper(graph.first(stat)?, indent + 1, true, ctx, tracer)?);
    buf.append_indent(indent, ctx.indent).append("}");

    for (i, &handler) in graph[stat].stats.iter().enumerate().skip(1) {
        // the exception store maps to the catch line
        if let Some(bb) = graph.block_of(graph.basichead(handler)) {
            if let Some(first) = bb.seq.get(0) {
                if first.opcode == opcodes::ASTORE {
                    if let Some(offset) = first.offset {
                        tracer.add_mapping(offset);
                    }
                }
            }
        }

        let types = data.exception_types.get(i - 1).ok_or_else(|| {
            DecompileError::invariant("catch handler without exception types", Some(stat), None)
        })?;
        let var = data
            .vars
            .get(i - 1)
            .ok_or_else(|| DecompileError::invariant("catch handler without variable", Some(stat), None))?;
        buf.append(" catch (");
        if types.len() > 1 {
            for ty in &types[1..] {
                buf.append(&class_source_name(ty)).append(" | ");
            }
        }
        buf.append_buffer(&var.to_java(indent, ctx, tracer));
        buf.append(") {").append_line_separator();
        tracer.increment_current_line();
        buf.append_buffer(&graph.jmp_wrapper(handler, indent + 1, false, ctx, tracer)?);
        buf.append_indent(indent, ctx.indent).append("}");
    }
    buf.append_line_separator();
    tracer.increment_current_line();
    Ok(buf)
}
