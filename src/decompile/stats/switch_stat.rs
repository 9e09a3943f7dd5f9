use crate::decompile::dec_helper::{check_statement_exceptions, choice_statement};
use crate::decompile::error::{DecompileError, Result};
use crate::decompile::exprs::{ExprKind, Exprent, RenderContext};
use crate::decompile::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use crate::decompile::statement::{LastBasicType, StatId, StatKind, StatType, StatementGraph};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

#[derive(Clone, Debug, Default)]
pub struct SwitchStat {
    /// Case bodies in source order.
    pub case_statements: Vec<StatId>,
    /// Head edges entering each case body.
    pub case_edges: Vec<Vec<EdgeId>>,
    /// Case label per edge; `None` marks `default`.
    pub case_values: Vec<Vec<Option<Exprent>>>,
    pub default_edge: Option<EdgeId>,
    pub head_exprent: Option<Exprent>,
}

impl StatementGraph {
    pub fn switch_data(&self, stat: StatId) -> Option<&SwitchStat> {
        match &self[stat].kind {
            StatKind::Switch(s) => Some(s),
            _ => None,
        }
    }

    pub fn switch_data_mut(&mut self, stat: StatId) -> Option<&mut SwitchStat> {
        match &mut self[stat].kind {
            StatKind::Switch(s) => Some(s),
            _ => None,
        }
    }

    /// Orders the case bodies by their first case index, keeps
    /// fall-through chains adjacent, and gives every head edge that
    /// leaves the switch directly an empty case body of its own.
    pub fn sort_switch_edges_and_nodes(&mut self, stat: StatId) -> Result<()> {
        let first = self.first(stat)?;
        let head_succs = self.successor_edges(first, EdgeType::DIRECT_ALL);
        let succ_count = head_succs.len();
        // default sorts last
        let edge_index = |e: EdgeId| -> usize {
            let i = head_succs.iter().position(|&x| x == e).unwrap_or(0);
            if i == 0 {
                succ_count
            } else {
                i
            }
        };

        let values: Vec<i32> = self
            .block_of(first)
            .and_then(|bb| bb.seq.last())
            .and_then(|instr| instr.switch.as_ref())
            .map(|table| table.values.clone())
            .ok_or_else(|| DecompileError::invariant("switch head has no switch table", Some(stat), None))?;

        let mut nodes: Vec<Option<StatId>> = Vec::new();
        let mut edges: Vec<Vec<usize>> = Vec::new();
        for &child in self[stat].stats.iter().skip(1) {
            let mut list: Vec<usize> = self
                .predecessor_edges(child, EdgeType::REGULAR)
                .into_iter()
                .filter(|&e| self.edge(e).source == first)
                .map(edge_index)
                .collect();
            list.sort_unstable();
            nodes.push(Some(child));
            edges.push(list);
        }

        let mut exits = self.successor_edges(first, EdgeType::BREAK | EdgeType::CONTINUE);
        while let Some(&sample) = exits.first() {
            let (dest, ty) = (self.edge(sample).destination, self.edge(sample).edge_type);
            let mut list = Vec::new();
            exits.retain(|&e| {
                let same = self.edge(e).destination == dest && self.edge(e).edge_type == ty;
                if same {
                    list.push(edge_index(e));
                }
                !same
            });
            list.sort_unstable();
            nodes.push(None);
            edges.push(list);
        }

        // stable sort by first case index
        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by_key(|&i| edges[i].first().copied().unwrap_or(usize::MAX));
        let mut nodes: Vec<Option<StatId>> = order.iter().map(|&i| nodes[i]).collect();
        let mut edges: Vec<Vec<usize>> = order.iter().map(|&i| edges[i].clone()).collect();

        // a body entered by fall-through goes right after its predecessor
        let mut index = 0;
        while index < nodes.len() {
            if let Some(node) = nodes[index] {
                let mut preds = self.neighbours_set(node, EdgeType::REGULAR, Direction::Backward);
                preds.remove(&first);
                if let Some(&pred) = preds.iter().next() {
                    if let Some(j) = nodes[..index].iter().position(|&n| n == Some(pred)) {
                        if j + 1 < index {
                            let n = nodes.remove(index);
                            let e = edges.remove(index);
                            nodes.insert(j + 1, n);
                            edges.insert(j + 1, e);
                        }
                    }
                }
            }
            index += 1;
        }

        let mut case_edges = Vec::with_capacity(edges.len());
        let mut case_values = Vec::with_capacity(edges.len());
        for list in &edges {
            let mut lste = Vec::with_capacity(list.len());
            let mut lstv = Vec::with_capacity(list.len());
            for &i in list {
                let i = if i == succ_count { 0 } else { i };
                lste.push(head_succs[i]);
                lstv.push(if i == 0 {
                    None
                } else {
                    values.get(i - 1).map(|&v| Exprent::int_const(v))
                });
            }
            case_edges.push(lste);
            case_values.push(lstv);
        }

        let mut case_statements = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.into_iter().enumerate() {
            let node = match node {
                Some(n) => n,
                None => {
                    let block = self.add_basic_block(None, Default::default());
                    let sample = *case_edges[i].first().ok_or_else(|| {
                        DecompileError::invariant("switch exit without edges", Some(stat), None)
                    })?;
                    let (ty, dest, closure) = {
                        let e = self.edge(sample);
                        (e.edge_type, e.destination, e.closure)
                    };
                    self.add_successor(StatEdge::new(ty, block, dest, closure));
                    for &edge in &case_edges[i] {
                        self.change_edge_type(edge, EdgeType::REGULAR)?;
                        self.remove_from_closure(edge);
                        let old = self.edge(edge).destination;
                        self.remove_predecessor(old, edge);
                        self.change_edge_node(Direction::Forward, edge, block);
                        self.add_predecessor(block, edge);
                    }
                    self[stat].stats.push(block);
                    self[block].parent = Some(stat);
                    block
                }
            };
            case_statements.push(node);
        }

        let data = self
            .switch_data_mut(stat)
            .ok_or_else(|| DecompileError::invariant("expected a switch", Some(stat), None))?;
        data.case_statements = case_statements;
        data.case_edges = case_edges;
        data.case_values = case_values;
        Ok(())
    }
}

pub fn is_head(graph: &mut StatementGraph, head: StatId) -> Option<StatId> {
    if graph.stat_type(head) != StatType::BasicBlock || graph[head].last_basic_type != LastBasicType::Switch {
        return None;
    }
    let (post, members) = choice_statement(graph, head)?;
    if members.iter().skip(1).any(|&s| graph[s].is_monitor_enter) {
        return None;
    }
    if !check_statement_exceptions(graph, &members) {
        return None;
    }

    let default_edge = graph.first_successor(head, EdgeType::DIRECT_ALL);
    let stat = graph.add_statement(StatKind::Switch(SwitchStat {
        default_edge,
        ..SwitchStat::default()
    }));
    graph[stat].first = Some(head);
    graph[stat].stats.push(head);
    graph[stat].post = post;
    let mut seen = Vec::new();
    for node in graph.neighbours(head, EdgeType::REGULAR, Direction::Forward) {
        if Some(node) != post && !seen.contains(&node) {
            seen.push(node);
        }
    }
    graph[stat].stats.extend(seen);
    Some(stat)
}

pub(super) fn init_exprents(graph: &mut StatementGraph, stat: StatId) -> Result<()> {
    let head = graph.first(stat)?;
    let mut expr = graph[head]
        .exprents
        .as_mut()
        .and_then(|list| list.pop())
        .ok_or_else(|| DecompileError::invariant("switch head has no selector", Some(stat), None))?;
    let data = graph
        .switch_data_mut(stat)
        .ok_or_else(|| DecompileError::invariant("expected a switch", Some(stat), None))?;
    if let ExprKind::Switch { case_values, .. } = &mut expr.kind {
        *case_values = data.case_values.clone();
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
    let data = graph
        .switch_data(stat)
        .ok_or_else(|| DecompileError::invariant("expected a switch", Some(stat), None))?;
    let head = data
        .head_exprent
        .as_ref()
        .ok_or_else(|| DecompileError::invariant("switch without selector", Some(stat), None))?;
    let mut buf = TextBuffer::new();
    buf.append_buffer(&graph.to_java(graph.first(stat)?, indent, ctx, tracer)?);
    super::label_line(graph, stat, indent, ctx, tracer, &mut buf);
    buf.append_indent(indent, ctx.indent)
        .append_buffer(&head.to_java(indent, ctx, tracer))
        .append(" {")
        .append_line_separator();
    tracer.increment_current_line();

    let switch_type = match &head.kind {
        ExprKind::Switch { value, .. } => value.expr_type(),
        _ => head.expr_type(),
    };

    for (i, &case) in data.case_statements.iter().enumerate() {
        let edges = &data.case_edges[i];
        let values = &data.case_values[i];
        for (j, &edge) in edges.iter().enumerate() {
            if Some(edge) == data.default_edge {
                buf.append_indent(indent, ctx.indent).append("default:").append_line_separator();
            } else {
                buf.append_indent(indent, ctx.indent).append("case ");
                let value = values.get(j).and_then(|v| v.as_ref()).ok_or_else(|| {
                    DecompileError::invariant("case edge without a value", Some(stat), Some(edge))
                })?;
                let text = match &value.kind {
                    // enum constant
                    ExprKind::Field { name, is_static: true, .. } => TextBuffer::from(name.as_str()),
                    ExprKind::Const { .. } => {
                        let mut typed = value.clone();
                        if let ExprKind::Const { ty, .. } = &mut typed.kind {
                            *ty = switch_type.clone();
                        }
                        typed.to_java(indent, ctx, tracer)
                    }
                    _ => value.to_java(indent, ctx, tracer),
                };
                buf.append_buffer(&text);
                buf.append(":").append_line_separator();
            }
            tracer.increment_current_line();
        }
        buf.append_buffer(&graph.jmp_wrapper(case, indent + 1, false, ctx, tracer)?);
    }

    buf.append_indent(indent, ctx.indent).append("}").append_line_separator();
    tracer.increment_current_line();
    Ok(buf)
}
