//! Strongly connected components of the children of one statement.

use std::collections::{HashMap, HashSet};

use super::stat_edge::{Direction, EdgeType};
use super::statement::{StatId, StatementGraph};

/// Components in Tarjan emission order, so successor components come
/// before their predecessors.
pub fn components(graph: &StatementGraph, stat: StatId) -> Vec<Vec<StatId>> {
    let members: HashSet<StatId> = graph[stat].stats.iter().copied().collect();
    let mut tarjan = Tarjan {
        graph,
        members: &members,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        counter: 0,
        components: Vec::new(),
    };

    if let Some(first) = graph[stat].first {
        tarjan.visit(first);
    }
    // roots without predecessors, then whatever is left
    for &child in &graph[stat].stats {
        if !tarjan.index.contains_key(&child) && graph.predecessor_edges(child, EdgeType::DIRECT_ALL).is_empty() {
            tarjan.visit(child);
        }
    }
    for &child in &graph[stat].stats {
        if !tarjan.index.contains_key(&child) {
            tarjan.visit(child);
        }
    }
    tarjan.components
}

/// A component no regular edge leaves.
pub fn is_exit_component(graph: &StatementGraph, component: &[StatId]) -> bool {
    component.iter().all(|&s| {
        graph
            .neighbours(s, EdgeType::REGULAR, Direction::Forward)
            .iter()
            .all(|succ| component.contains(succ))
    })
}

/// First node of every exit component.
pub fn exit_reps(graph: &StatementGraph, components: &[Vec<StatId>]) -> Vec<StatId> {
    components
        .iter()
        .filter(|c| is_exit_component(graph, c))
        .filter_map(|c| c.first().copied())
        .collect()
}

struct Tarjan<'a> {
    graph: &'a StatementGraph,
    members: &'a HashSet<StatId>,
    index: HashMap<StatId, usize>,
    lowlink: HashMap<StatId, usize>,
    stack: Vec<StatId>,
    on_stack: HashSet<StatId>,
    counter: usize,
    components: Vec<Vec<StatId>>,
}

impl Tarjan<'_> {
    fn successors(&self, node: StatId) -> Vec<StatId> {
        self.graph
            .neighbours(node, EdgeType::REGULAR | EdgeType::EXCEPTION, Direction::Forward)
            .into_iter()
            .filter(|s| self.members.contains(s))
            .collect()
    }

    fn open(&mut self, node: StatId) {
        self.index.insert(node, self.counter);
        self.lowlink.insert(node, self.counter);
        self.counter += 1;
        self.stack.push(node);
        self.on_stack.insert(node);
    }

    fn visit(&mut self, start: StatId) {
        self.open(start);
        let mut work: Vec<(StatId, Vec<StatId>, usize)> = vec![(start, self.successors(start), 0)];

        while let Some((node, succs, pos)) = work.last_mut() {
            let node = *node;
            if *pos < succs.len() {
                let succ = succs[*pos];
                *pos += 1;
                if !self.index.contains_key(&succ) {
                    self.open(succ);
                    let next = self.successors(succ);
                    work.push((succ, next, 0));
                } else if self.on_stack.contains(&succ) {
                    let low = self.lowlink[&node].min(self.index[&succ]);
                    self.lowlink.insert(node, low);
                }
                continue;
            }

            work.pop();
            if let Some((parent, _, _)) = work.last() {
                let low = self.lowlink[parent].min(self.lowlink[&node]);
                self.lowlink.insert(*parent, low);
            }
            if self.lowlink[&node] == self.index[&node] {
                let mut component = Vec::new();
                while let Some(top) = self.stack.pop() {
                    self.on_stack.remove(&top);
                    component.push(top);
                    if top == node {
                        break;
                    }
                }
                component.reverse();
                self.components.push(component);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::InstructionSequence;
    use crate::decompile::stat_edge::StatEdge;

    #[test]
    fn loop_and_exit_components() {
        let mut g = StatementGraph::new(0);
        let a = g.add_basic_block(None, InstructionSequence::default());
        let b = g.add_basic_block(None, InstructionSequence::default());
        let c = g.add_basic_block(None, InstructionSequence::default());
        let d = g.add_basic_block(None, InstructionSequence::default());
        g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, b, c, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, c, b, None));
        g.add_successor(StatEdge::new(EdgeType::REGULAR, c, d, None));
        let general = g.new_general(a, vec![a, b, c, d], None);

        let comps = components(&g, general);
        assert_eq!(comps.len(), 3);
        assert_eq!(comps[0], vec![d]);
        assert_eq!(comps[1], vec![b, c]);
        assert_eq!(comps[2], vec![a]);
        assert_eq!(exit_reps(&g, &comps), vec![d]);
    }
}
