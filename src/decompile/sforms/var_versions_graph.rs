//! Variable versions joined through phi merges.
//!
//! Versions connected by a phi must end up as the same source variable.
//! The graph keeps a union-find over them.

use std::collections::{BTreeSet, HashMap};

use crate::decompile::exprs::VarVersionPair;

#[derive(Clone, Debug, Default)]
pub struct VarVersionsGraph {
    parent: HashMap<VarVersionPair, VarVersionPair>,
}

impl VarVersionsGraph {
    pub fn from_phi(phi: &HashMap<VarVersionPair, BTreeSet<u32>>) -> Self {
        let mut graph = VarVersionsGraph::default();
        for (pair, sources) in phi {
            for &v in sources {
                graph.union(*pair, VarVersionPair::new(pair.var, v));
            }
        }
        graph
    }

    pub fn add(&mut self, pair: VarVersionPair) {
        self.parent.entry(pair).or_insert(pair);
    }

    pub fn find(&mut self, pair: VarVersionPair) -> VarVersionPair {
        self.add(pair);
        let mut root = pair;
        while let Some(&p) = self.parent.get(&root) {
            if p == root {
                break;
            }
            root = p;
        }
        // path compression
        let mut node = pair;
        while node != root {
            let next = self.parent[&node];
            self.parent.insert(node, root);
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: VarVersionPair, b: VarVersionPair) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller representative keeps output deterministic
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(drop, keep);
        }
    }

    pub fn same_component(&mut self, a: VarVersionPair, b: VarVersionPair) -> bool {
        self.find(a) == self.find(b)
    }

    /// Components keyed by representative, members sorted.
    pub fn components(&mut self) -> HashMap<VarVersionPair, BTreeSet<VarVersionPair>> {
        let members: Vec<VarVersionPair> = self.parent.keys().copied().collect();
        let mut out: HashMap<VarVersionPair, BTreeSet<VarVersionPair>> = HashMap::new();
        for m in members {
            let root = self.find(m);
            out.entry(root).or_default().insert(m);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phi_sources_share_a_component() {
        let mut phi = HashMap::new();
        phi.insert(VarVersionPair::new(3, 5), BTreeSet::from([2, 4]));
        let mut g = VarVersionsGraph::from_phi(&phi);
        g.add(VarVersionPair::new(3, 7));

        assert!(g.same_component(VarVersionPair::new(3, 2), VarVersionPair::new(3, 4)));
        assert!(!g.same_component(VarVersionPair::new(3, 2), VarVersionPair::new(3, 7)));
        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert_eq!(g.find(VarVersionPair::new(3, 5)), VarVersionPair::new(3, 2));
    }
}
