//! Shape checks shared by the statement recognizers.

use std::collections::HashSet;

use super::stat_edge::{Direction, EdgeType};
use super::statement::{LastBasicType, StatId, StatementGraph};

/// Whether the candidate region `stats` (head first) can be carved out
/// without splitting an exception range: handlers that only part of the
/// region is protected by must lie inside the region and be entered only
/// from it, and no other member may be a handler.
pub fn check_statement_exceptions(graph: &StatementGraph, stats: &[StatId]) -> bool {
    let all: HashSet<StatId> = stats.iter().copied().collect();
    let mut handlers: HashSet<StatId> = HashSet::new();
    let mut intersection: Option<HashSet<StatId>> = None;

    for &stat in stats {
        let mut own = graph.neighbours_set(stat, EdgeType::EXCEPTION, Direction::Forward);
        match &mut intersection {
            None => intersection = Some(own),
            Some(common) => {
                let dropped: Vec<StatId> = common.difference(&own).copied().collect();
                common.retain(|h| own.contains(h));
                own.retain(|h| !common.contains(h));
                handlers.extend(dropped);
                handlers.extend(own);
            }
        }
    }

    for &handler in &handlers {
        if !all.contains(&handler) {
            return false;
        }
        let preds = graph.neighbours(handler, EdgeType::EXCEPTION, Direction::Backward);
        if !preds.iter().all(|p| all.contains(p)) {
            return false;
        }
    }

    stats.iter().skip(1).all(|&stat| {
        graph.predecessor_edges(stat, EdgeType::EXCEPTION).is_empty() || handlers.contains(&stat)
    })
}

/// Handlers of `head` that protect nothing else.
pub fn unique_pred_exceptions(graph: &StatementGraph, head: StatId) -> Vec<StatId> {
    let mut out = Vec::new();
    for h in graph.neighbours(head, EdgeType::EXCEPTION, Direction::Forward) {
        if !out.contains(&h) && graph.predecessor_edges(h, EdgeType::EXCEPTION).len() <= 1 {
            out.push(h);
        }
    }
    out
}

/// Region shape of an if/else or switch rooted at `head`: every regular
/// successor of `head` is a branch entered only from `head` (or from the
/// branch before it, for switch fall-through), and all branches leave to
/// at most one common join. Returns the join and the member list, head
/// first.
pub fn choice_statement(graph: &StatementGraph, head: StatId) -> Option<(Option<StatId>, Vec<StatId>)> {
    let mut dest: Vec<StatId> = Vec::new();
    for s in graph.neighbours(head, EdgeType::REGULAR, Direction::Forward) {
        if !dest.contains(&s) {
            dest.push(s);
        }
    }
    if dest.contains(&head) {
        return None;
    }

    let mut post: Option<StatId> = None;
    let mut members: Vec<StatId>;
    loop {
        members = Vec::new();
        let mut repeat = false;
        if let Some(p) = post {
            dest.retain(|&s| s != p);
        }

        for &stat in &dest {
            if graph[stat].last_basic_type != LastBasicType::General {
                if post.is_none() {
                    post = Some(stat);
                    repeat = true;
                    break;
                }
                return None;
            }

            let mut preds = graph.neighbours_set(stat, EdgeType::REGULAR, Direction::Backward);
            preds.remove(&head);
            if preds.contains(&stat) {
                return None;
            }
            if !preds.iter().all(|p| dest.contains(p)) || preds.len() > 1 {
                if post.is_none() {
                    post = Some(stat);
                    repeat = true;
                    break;
                }
                return None;
            } else if let Some(&only) = preds.iter().next() {
                // fall-through chain must not loop back to this branch
                let mut pred = only;
                while members.contains(&pred) {
                    let mut up = graph.neighbours_set(pred, EdgeType::REGULAR, Direction::Backward);
                    up.remove(&head);
                    match up.into_iter().next() {
                        Some(p) => {
                            pred = p;
                            if pred == stat {
                                return None;
                            }
                        }
                        None => break,
                    }
                }
            }

            let succs = graph.successor_edges(stat, EdgeType::DIRECT_ALL);
            if succs.len() > 1 {
                let inner = graph
                    .neighbours(stat, EdgeType::DIRECT_ALL, Direction::Forward)
                    .into_iter()
                    .any(|s| dest.contains(&s));
                if inner || post.is_some() {
                    return None;
                }
                post = Some(stat);
                repeat = true;
                break;
            } else if let [edge] = succs.as_slice() {
                let edge = graph.edge(*edge);
                if edge.edge_type == EdgeType::REGULAR {
                    let target = edge.destination;
                    if target == head {
                        return None;
                    }
                    if post != Some(target) && !dest.contains(&target) {
                        if post.is_some() {
                            return None;
                        }
                        let joins = graph.neighbours_set(target, EdgeType::REGULAR, Direction::Backward);
                        if joins.len() > 1 {
                            post = Some(target);
                            repeat = true;
                            break;
                        }
                        return None;
                    }
                }
            }
            members.push(stat);
        }
        if !repeat {
            break;
        }
    }

    members.retain(|&s| Some(s) != post);
    members.insert(0, head);
    Some((post, members))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{opcodes, Instruction, InstructionSequence};
    use crate::decompile::stat_edge::StatEdge;

    fn general(g: &mut StatementGraph) -> StatId {
        g.add_basic_block(None, InstructionSequence::default())
    }

    fn cond(g: &mut StatementGraph) -> StatId {
        g.add_basic_block(
            None,
            InstructionSequence::new(vec![Instruction::new(opcodes::IFEQ, vec![0])]),
        )
    }

    #[test]
    fn diamond_is_a_choice() {
        let mut g = StatementGraph::new(0);
        let head = cond(&mut g);
        let a = general(&mut g);
        let b = general(&mut g);
        let join = general(&mut g);
        g.add_successor(StatEdge::new(EdgeType::REGULAR, head, a, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, head, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, join, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, join, None));

        let (post, members) = choice_statement(&g, head).unwrap();
        assert_eq!(post, Some(join));
        assert_eq!(members, vec![head, a, b]);
        assert!(check_statement_exceptions(&g, &members));
    }

    #[test]
    fn shared_handler_must_be_inside() {
        let mut g = StatementGraph::new(0);
        let a = general(&mut g);
        let b = general(&mut g);
        let handler = general(&mut g);
        g.add_successor(StatEdge::exception(a, handler, None));
        assert!(!check_statement_exceptions(&g, &[a, b]));
        assert!(check_statement_exceptions(&g, &[a, b, handler]));
        g.add_successor(StatEdge::exception(b, handler, None));
        assert!(check_statement_exceptions(&g, &[a, b]));
    }
}
