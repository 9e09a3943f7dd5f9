use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{Exprent, RenderContext};
use crate::decompile::statement::{StatId, StatKind, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

/// `synchronized (x) { .. }`. The first child is the block ending in
/// `monitorenter`, the handler holds the compiler generated
/// unlock-and-rethrow path until it is removed.
#[derive(Clone, Debug, Default)]
pub struct SyncStat {
    pub body: Option<StatId>,
    pub handler: Option<StatId>,
    pub head_exprent: Option<Exprent>,
}

impl StatementGraph {
    pub fn sync_data(&self, stat: StatId) -> Option<&SyncStat> {
        match &self[stat].kind {
            StatKind::Synchronized(s) => Some(s),
            _ => None,
        }
    }

    pub fn sync_data_mut(&mut self, stat: StatId) -> Option<&mut SyncStat> {
        match &mut self[stat].kind {
            StatKind::Synchronized(s) => Some(s),
            _ => None,
        }
    }

    pub fn new_synchronized(&mut self, head: StatId, body: StatId, handler: StatId) -> StatId {
        let stat = self.add_statement(StatKind::Synchronized(SyncStat {
            body: Some(body),
            handler: Some(handler),
            head_exprent: None,
        }));
        self[stat].first = Some(head);
        self[stat].stats = vec![head, body, handler];
        stat
    }

    /// Drops the handler once the `monitorexit` path has been recognised.
    pub fn remove_sync_handler(&mut self, stat: StatId) -> Result<()> {
        let handler = self
            .sync_data(stat)
            .ok_or_else(|| DecompileError::invariant("expected a synchronized statement", Some(stat), None))?
            .handler;
        if let Some(handler) = handler {
            self[stat].stats.retain(|&s| s != handler);
            if let Some(data) = self.sync_data_mut(stat) {
                data.handler = None;
            }
        }
        Ok(())
    }
}

pub(super) fn init_exprents(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    let head = graph.first(stat)?;
    let expr = graph[head]
        .exprents
        .as_mut()
        .and_then(|list| list.pop())
        .ok_or_else(|| DecompileError::invariant("synchronized head has no monitor", Some(stat), None))?;
    let data = graph
        .sync_data_mut(stat)
        .ok_or_else(|| DecompileError::invariant("expected a synchronized statement", Some(stat), None))?;
    data.head_exprent = Some(expr);
    Ok(())
}

pub(super) fn to_java(
    graph: &StatementGraph,
    stat: StatId,
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> Result<TextBuffer> {
    let data = graph
        .sync_data(stat)
        .ok_or_else(|| DecompileError::invariant("expected a synchronized statement", Some(stat), None))?;
    let head = data
        .head_exprent
        .as_ref()
        .ok_or_else(|| DecompileError::invariant("synchronized without monitor", Some(stat), None))?;
    let body = data
        .body
        .ok_or_else(|| DecompileError::invariant("synchronized without body", Some(stat), None))?;

    let mut buf = TextBuffer::new();
    buf.append_buffer(&graph.to_java(graph.first(stat)?, indent, ctx, tracer)?);
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);
    buf.append_indent(indent, ctx.indent)
        .append_buffer(&head.to_java(indent, ctx, tracer))
        .append(" {")
        .append_line_separator();
    tracer.increment_current_line();
    buf.append_buffer(&graph.jmp_wrapper(body, indent + 1, true, ctx, tracer)?);
    buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
    tracer.increment_current_line();
    Ok(buf)
}
