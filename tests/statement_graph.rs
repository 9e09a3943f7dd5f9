#![cfg(feature = "decompile")]

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use classfile_decompiler::decompile::postdom::calc_post_dominators;
use classfile_decompiler::decompile::stat_edge::{Direction, EdgeId, EdgeType, StatEdge};
use classfile_decompiler::decompile::statement::{StatId, StatementGraph};

const TYPES: [EdgeType; 5] = [
    EdgeType::REGULAR,
    EdgeType::EXCEPTION,
    EdgeType::BREAK,
    EdgeType::CONTINUE,
    EdgeType::FINALLY_EXIT,
];

#[derive(Clone, Debug)]
enum Op {
    Add { from: usize, to: usize, ty: usize, closure: Option<usize> },
    Remove(usize),
    Retype(usize, usize),
    Move { edge: usize, forward: bool, node: usize },
    Redirect { edge: usize, node: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..6usize, 0..6usize, 0..5usize, proptest::option::of(0..6usize))
            .prop_map(|(from, to, ty, closure)| Op::Add { from, to, ty, closure }),
        (0..32usize).prop_map(Op::Remove),
        (0..32usize, 0..5usize).prop_map(|(e, t)| Op::Retype(e, t)),
        (0..32usize, any::<bool>(), 0..6usize).prop_map(|(edge, forward, node)| Op::Move { edge, forward, node }),
        (0..32usize, 0..6usize).prop_map(|(edge, node)| Op::Redirect { edge, node }),
    ]
}

fn assert_registered(g: &StatementGraph, live: &[EdgeId]) {
    g.verify_edges().unwrap();
    for &e in live {
        let edge = g.edge(e);
        for types in [edge.edge_type, EdgeType::ALL] {
            assert!(g.successor_edges(edge.source, types).contains(&e));
            assert!(g.predecessor_edges(edge.destination, types).contains(&e));
        }
        if edge.edge_type != EdgeType::EXCEPTION {
            assert!(g.successor_edges(edge.source, EdgeType::DIRECT_ALL).contains(&e));
        }
        for other in TYPES.iter().filter(|&&t| t != edge.edge_type) {
            assert!(!g.successor_edges(edge.source, *other).contains(&e));
        }
    }
}

proptest! {
    #[test]
    fn edge_indices_stay_symmetric(ops in proptest::collection::vec(op(), 1..40)) {
        let mut g = StatementGraph::new(0);
        let nodes: Vec<StatId> = (0..6).map(|_| g.add_empty_block()).collect();
        let mut live: Vec<EdgeId> = Vec::new();

        for op in ops {
            match op {
                Op::Add { from, to, ty, closure } => {
                    let edge = StatEdge::new(TYPES[ty], nodes[from], nodes[to], closure.map(|c| nodes[c]));
                    live.push(g.add_successor(edge));
                }
                Op::Remove(k) if !live.is_empty() => {
                    let e = live.remove(k % live.len());
                    g.remove_successor(e);
                }
                Op::Retype(k, ty) if !live.is_empty() => {
                    let e = live[k % live.len()];
                    let old = g.edge(e).edge_type;
                    let result = g.change_edge_type(e, TYPES[ty]);
                    let involves_exception = old != TYPES[ty]
                        && (old == EdgeType::EXCEPTION || TYPES[ty] == EdgeType::EXCEPTION);
                    prop_assert_eq!(result.is_err(), involves_exception);
                    if result.is_err() {
                        prop_assert_eq!(g.edge(e).edge_type, old);
                    }
                }
                Op::Move { edge, forward, node } if !live.is_empty() => {
                    let e = live[edge % live.len()];
                    g.remove_successor(e);
                    let direction = if forward { Direction::Forward } else { Direction::Backward };
                    g.change_edge_node(direction, e, nodes[node]);
                    g.attach_successor(e);
                }
                Op::Redirect { edge, node } if !live.is_empty() => {
                    // destination moves while the source keeps its registration
                    let e = live[edge % live.len()];
                    let (source, old) = (g.edge(e).source, g.edge(e).destination);
                    let before = g.successor_edges(source, EdgeType::ALL);
                    g.remove_predecessor(old, e);
                    g.change_edge_node(Direction::Forward, e, nodes[node]);
                    g.add_predecessor(nodes[node], e);
                    prop_assert_eq!(g.successor_edges(source, EdgeType::ALL), before);
                    prop_assert_eq!(g.edge(e).destination, nodes[node]);
                }
                _ => {}
            }
            assert_registered(&g, &live);
        }
    }
}

/// Single-sink DAG over `n` blocks inside a general statement.
fn dag(n: usize, wanted: &[(usize, usize)]) -> (StatementGraph, StatId, Vec<StatId>, Vec<BTreeSet<usize>>) {
    let mut g = StatementGraph::new(0);
    let nodes: Vec<StatId> = (0..n).map(|_| g.add_empty_block()).collect();
    let mut succs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for &(a, b) in wanted {
        let (a, b) = (a % n, b % n);
        if a < b {
            succs[a].insert(b);
        }
    }
    for s in succs.iter_mut().take(n - 1) {
        if s.is_empty() {
            s.insert(n - 1);
        }
    }
    for (i, s) in succs.iter().enumerate() {
        for &j in s {
            g.add_successor(StatEdge::new(EdgeType::REGULAR, nodes[i], nodes[j], None));
        }
    }
    let general = g.new_general(nodes[0], nodes.clone(), None);
    g.set_all_parent(general);
    (g, general, nodes, succs)
}

/// Whether every path from `from` to the sink passes `through`.
fn all_paths_pass(succs: &[BTreeSet<usize>], from: usize, through: usize) -> bool {
    if from == through {
        return true;
    }
    let sink = succs.len() - 1;
    let mut seen = HashSet::from([from]);
    let mut stack = vec![from];
    while let Some(n) = stack.pop() {
        if n == sink {
            return false;
        }
        for &s in &succs[n] {
            if s != through && seen.insert(s) {
                stack.push(s);
            }
        }
    }
    true
}

proptest! {
    #[test]
    fn postdominators_match_all_paths(
        n in 2..=8usize,
        wanted in proptest::collection::vec((0..8usize, 0..8usize), 0..20),
    ) {
        let (g, general, nodes, succs) = dag(n, &wanted);
        let index_of = |s: StatId| nodes.iter().position(|&x| x == s).unwrap();
        let computed = calc_post_dominators(&g, general);
        prop_assert_eq!(computed.len(), n);

        for (stat, posts) in computed {
            let a = index_of(stat);
            let got: BTreeSet<usize> = posts.into_iter().map(index_of).collect();
            let expected: BTreeSet<usize> = (0..n).filter(|&b| all_paths_pass(&succs, a, b)).collect();
            prop_assert_eq!(got, expected, "postdominators of node {}", a);
        }
    }
}

#[test]
fn redirected_destination_keeps_successor_order() {
    let mut g = StatementGraph::new(0);
    let head = g.add_empty_block();
    let jump = g.add_empty_block();
    let fall = g.add_empty_block();
    let moved = g.add_empty_block();
    let first = g.add_successor(StatEdge::new(EdgeType::REGULAR, head, jump, None));
    let second = g.add_successor(StatEdge::new(EdgeType::REGULAR, head, fall, None));

    g.remove_predecessor(jump, first);
    g.change_edge_node(Direction::Forward, first, moved);
    g.add_predecessor(moved, first);

    assert_eq!(g.successor_edges(head, EdgeType::DIRECT_ALL), vec![first, second]);
    assert_eq!(g.neighbours(head, EdgeType::REGULAR, Direction::Forward), vec![moved, fall]);
    assert!(g.predecessor_edges(jump, EdgeType::ALL).is_empty());
    assert_eq!(g.predecessor_edges(moved, EdgeType::REGULAR), vec![first]);
    g.verify_edges().unwrap();
}

#[test]
fn label_edges_survive_statement_replacement() {
    let mut g = StatementGraph::new(0);
    let a = g.add_empty_block();
    let b = g.add_empty_block();
    let c = g.add_empty_block();
    let seq = g.new_sequence(vec![a, b]);
    g.add_successor(StatEdge::new(EdgeType::REGULAR, a, b, None));
    g.add_successor(StatEdge::new(EdgeType::BREAK, b, c, Some(seq)));
    g.set_all_parent(seq);

    let replacement = g.add_empty_block();
    g.replace_statement(seq, b, replacement);

    g.verify_edges().unwrap();
    for &e in &g[seq].label_edges {
        assert_eq!(g.edge(e).closure, Some(seq));
    }
    assert_eq!(g.successor_edges(replacement, EdgeType::BREAK).len(), 1);
    assert!(g.successor_edges(b, EdgeType::ALL).is_empty());
}
