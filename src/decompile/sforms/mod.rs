//! Static single assignment forms over the structured statement tree.
//!
//! [`ssa`] versions local and stack variables so that phi merges become
//! visible. [`ssau`] extends that with pseudo variables for fields and
//! arrays and records which stack variable definitions may be moved to
//! their use without observing a different state.

pub mod direct_graph;
pub mod ssa;
pub mod ssau;
pub mod var_versions_graph;

pub use direct_graph::{flatten, DirectGraph, ExprSlot, NodeId, NodeKind};
pub use ssa::{build_ssa, SsaResult};
pub use ssau::build_ssau;
pub use var_versions_graph::VarVersionsGraph;

use crate::decompile::statement::{StatId, StatementGraph};

/// Clears every variable version below `root`.
pub fn reset_versions(graph: &mut StatementGraph, root: StatId) {
    for stat in graph.subtree(root) {
        for e in graph.own_exprents_mut(stat) {
            e.visit_mut_post(&mut |x| {
                if let Some(v) = x.as_var_mut() {
                    v.version = 0;
                }
            });
        }
        for e in graph[stat].var_definitions.iter_mut() {
            if let Some(v) = e.as_var_mut() {
                v.version = 0;
            }
        }
    }
}
