use crate::decompile::dec_helper::{check_statement_exceptions, choice_statement};
use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{Exprent, RenderContext};
use crate::decompile::stat_edge::{Direction, EdgeId, EdgeType};
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatType, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IfType {
    #[default]
    If,
    IfElse,
}

#[derive(Clone, Debug, Default)]
pub struct IfStat {
    pub if_type: IfType,
    pub if_stat: Option<StatId>,
    pub else_stat: Option<StatId>,
    /// Head edge taken when the condition holds.
    pub if_edge: Option<EdgeId>,
    pub else_edge: Option<EdgeId>,
    /// The condition was built for the jump edge and must be negated.
    pub negated: bool,
    pub head_exprent: Option<Exprent>,
}

impl StatementGraph {
    pub fn if_data(&self, stat: StatId) -> Option<&IfStat> {
        match &self[stat].kind {
            StatKind::If(i) => Some(i),
            _ => None,
        }
    }

    pub fn if_data_mut(&mut self, stat: StatId) -> Option<&mut IfStat> {
        match &mut self[stat].kind {
            StatKind::If(i) => Some(i),
            _ => None,
        }
    }

    pub(crate) fn expect_if(&self, stat: StatId) -> Result<&IfStat> {
        self.if_data(stat)
            .ok_or_else(|| DecompileError::invariant("expected an if statement", Some(stat), None))
    }

    pub(crate) fn expect_if_mut(&mut self, stat: StatId) -> Result<&mut IfStat> {
        match &mut self[stat].kind {
            StatKind::If(i) => Ok(i),
            _ => Err(DecompileError::invariant("expected an if statement", Some(stat), None)),
        }
    }

    /// Sets the then-branch, keeping the child list in sync.
    pub fn set_if_stat(&mut self, stat: StatId, branch: Option<StatId>) -> Result<()> {
        let old = self.expect_if(stat)?.if_stat;
        self.expect_if_mut(stat)?.if_stat = branch;
        if let Some(old) = old {
            self[stat].stats.retain(|&s| s != old);
        }
        if let Some(branch) = branch {
            if !self[stat].stats.contains(&branch) {
                let pos = 1.min(self[stat].stats.len());
                self[stat].stats.insert(pos, branch);
            }
            self[branch].parent = Some(stat);
        }
        Ok(())
    }

    pub fn set_else_stat(&mut self, stat: StatId, branch: Option<StatId>) -> Result<()> {
        let old = self.expect_if(stat)?.else_stat;
        self.expect_if_mut(stat)?.else_stat = branch;
        if let Some(old) = old {
            self[stat].stats.retain(|&s| s != old);
        }
        if let Some(branch) = branch {
            if !self[stat].stats.contains(&branch) {
                self[stat].stats.push(branch);
            }
            self[branch].parent = Some(stat);
        }
        Ok(())
    }
}

/// Conditional jump at the end of `head`, possibly with both branches
/// and a join.
pub fn is_head(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph.stat_type(head) != StatType::BasicBlock || graph[head].last_basic_type != LastBasicType::If {
        return None;
    }
    if graph.successor_edges(head, EdgeType::DIRECT_ALL).len() < 2 {
        return None;
    }
    let regular = graph.successor_edges(head, EdgeType::REGULAR).len();
    let mut post = None;
    if regular >= 2 {
        let (p, members) = choice_statement(graph, head)?;
        if members.iter().skip(1).any(|&s| graph[s].is_monitor_enter) {
            return None;
        }
        if !check_statement_exceptions(graph, &members) {
            return None;
        }
        post = p;
    }
    Some(build(graph, head, regular, post))
}

fn build(graph: &mut StatementGraph, head: StatId, mut regular: usize, choice_post: Option<StatId>) -> StatId {
    let succs = graph.successor_edges(head, EdgeType::DIRECT_ALL);
    let mut data = IfStat::default();
    let mut post = None;

    match regular {
        0 => {}
        1 => {
            let fall = succs[1];
            if graph.edge(fall).edge_type != EdgeType::REGULAR {
                post = Some(graph.edge(succs[0]).destination);
            } else {
                post = Some(graph.edge(fall).destination);
                data.negated = true;
            }
        }
        _ => {
            let mut else_stat = Some(graph.edge(succs[0]).destination);
            let mut if_stat = Some(graph.edge(succs[1]).destination);
            let (i, e) = (graph.edge(succs[1]).destination, graph.edge(succs[0]).destination);
            let if_succs = graph.neighbours(i, EdgeType::REGULAR, Direction::Forward);
            let else_succs = graph.neighbours(e, EdgeType::REGULAR, Direction::Forward);

            if graph.predecessor_edges(i, EdgeType::REGULAR).len() > 1 || if_succs.len() > 1 {
                post = Some(i);
            } else if graph.predecessor_edges(e, EdgeType::REGULAR).len() > 1 || else_succs.len() > 1 {
                post = Some(e);
            } else if if_succs.is_empty() {
                post = Some(e);
            } else if else_succs.is_empty() {
                post = Some(i);
            }

            if if_stat == post {
                if else_stat != post {
                    if_stat = else_stat;
                    data.negated = true;
                } else {
                    if_stat = None;
                }
                else_stat = None;
            } else if else_stat == post {
                else_stat = None;
            } else {
                post = choice_post;
            }
            if else_stat.is_none() {
                regular = 1;
            }
            data.if_stat = if_stat;
            data.else_stat = else_stat;
        }
    }

    data.if_edge = succs.get(if data.negated { 0 } else { 1 }).copied();
    data.else_edge = if regular == 2 {
        succs.get(if data.negated { 1 } else { 0 }).copied()
    } else {
        None
    };
    data.if_type = if regular == 2 { IfType::IfElse } else { IfType::If };

    let if_stat = data.if_stat;
    let else_stat = data.else_stat;
    let negated = data.negated;
    let stat = graph.add_statement(StatKind::If(data));
    graph[stat].first = Some(head);
    graph[stat].stats.push(head);

    if regular == 0 {
        let edge = succs[0];
        graph.remove_successor(edge);
        graph.change_edge_node(Direction::Backward, edge, stat);
        graph.attach_successor(edge);
    } else if regular == 1 {
        let edge = succs[if negated { 1 } else { 0 }];
        graph.remove_successor(edge);
    }

    if let Some(s) = if_stat {
        graph[stat].stats.push(s);
    }
    if let Some(s) = else_stat {
        graph[stat].stats.push(s);
    }
    graph[stat].post = if post == Some(head) { Some(stat) } else { post };
    stat
}

pub(super) fn init_exprents(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    let head = graph.first(stat)?;
    let expr = graph[head]
        .exprents
        .as_mut()
        .and_then(|list| list.pop())
        .ok_or_else(|| DecompileError::invariant("if head has no condition", Some(stat), None))?;
    let data = graph.expect_if_mut(stat)?;
    let mut expr = expr;
    if data.negated {
        expr.negate_if();
    }
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
    let data = graph.expect_if(stat)?;
    let mut buf = TextBuffer::new();
    let first = graph.first(stat)?;
    buf.append_buffer(&graph.to_java(first, indent, ctx, tracer)?);
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);

    let head = data
        .head_exprent
        .as_ref()
        .ok_or_else(|| DecompileError::invariant("if without condition", Some(stat), None))?;
    buf.append_indent(indent, ctx.indent)
        .append_buffer(&head.to_java(indent, ctx, tracer))
        .append(" {")
        .append_line_separator();
    tracer.increment_current_line();

    match data.if_stat {
        None => {
            if let Some(edge) = data.if_edge {
                let edge = graph.edge(edge);
                if edge.explicit {
                    let keyword = if edge.edge_type == EdgeType::BREAK { "break" } else { "continue" };
                    buf.append_indent(indent + 1, ctx.indent).append(keyword);
                    if edge.labeled {
                        if let Some(closure) = edge.closure {
                            buf.append(&format!(" label{}", closure));
                        }
                    }
                    buf.append(";").append_line_separator();
                    tracer.increment_current_line();
                }
            }
        }
        Some(if_stat) => {
            buf.append_buffer(&graph.jmp_wrapper(if_stat, indent + 1, true, ctx, tracer)?);
        }
    }

    let mut else_if = false;
    if let Some(else_stat) = data.else_stat {
        let chained = graph.stat_type(else_stat) == StatType::If
            && graph[else_stat].var_definitions.is_empty()
            && graph[else_stat]
                .first
                .and_then(|f| graph[f].exprents.as_ref())
                .map_or(false, |e| e.is_empty())
            && !graph.is_labeled(else_stat)
            && graph
                .first_successor(else_stat, EdgeType::DIRECT_ALL)
                .map_or(true, |e| !graph.edge(e).explicit);
        if chained {
            buf.append_indent(indent, ctx.indent).append("} else ");
            let mut content = graph.jmp_wrapper(else_stat, indent, false, ctx, tracer)?;
            content.skip_start(ctx.indent.len() * indent);
            buf.append_buffer(&content);
            else_if = true;
        } else {
            let mut else_tracer = BytecodeMappingTracer::new(tracer.current_line() + 1);
            let content = graph.jmp_wrapper(else_stat, indent + 1, false, ctx, &mut else_tracer)?;
            if !content.is_empty() {
                buf.append_indent(indent, ctx.indent).append("} else {").append_line_separator();
                tracer.set_current_line(else_tracer.current_line());
                tracer.merge(&else_tracer);
                buf.append_buffer(&content);
            }
        }
    }

    if !else_if {
        buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
        tracer.increment_current_line();
    }
    Ok(buf)
}
