//! SSA with pseudo variables for memory.
//!
//! Fields get one pseudo variable each, array elements share one, and a
//! heap pseudo variable is bumped by every call. A stack variable
//! definition is replaceable when every read of it sees the same versions
//! of the variables, fields and arrays its value was computed from.

use super::ssa::{run, SsaResult};
use crate::decompile::error::Result;
use crate::decompile::statement::{StatId, StatementGraph};

pub fn build_ssau(graph: &mut StatementGraph, root: StatId) -> Result<SsaResult> {
    run(graph, root, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::descriptor::{MethodDescriptor, VarType};
    use crate::decompile::exprs::{
        ExprKind, Exprent, FieldStamp, InvocationExpr, InvocationKind, STACK_BASE,
    };
    use crate::decompile::statement::StatKind;

    fn field(name: &str) -> Exprent {
        Exprent::new(ExprKind::Field {
            name: name.into(),
            class_name: "A".into(),
            is_static: true,
            instance: None,
            ty: VarType::Int,
            stamp: FieldStamp::default(),
        })
    }

    fn call() -> Exprent {
        Exprent::new(ExprKind::Invocation(Box::new(InvocationExpr {
            name: "touch".into(),
            class_name: "A".into(),
            kind: InvocationKind::Static,
            instance: None,
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            string_descriptor: "()V".into(),
            params: vec![],
            bootstrap: None,
        })))
    }

    fn single_block(list: Vec<Exprent>) -> (StatementGraph, StatId, StatId) {
        let mut g = StatementGraph::new(2);
        let exit = g.add_statement(StatKind::DummyExit);
        let root = g.add_statement(StatKind::Root { dummy_exit: exit });
        g.root = Some(root);
        let b = g.add_empty_block();
        g[b].exprents = Some(list);
        g[root].stats = vec![b];
        g[root].first = Some(b);
        g.set_all_parent(root);
        (g, root, b)
    }

    fn stack_def_pair(g: &StatementGraph, b: StatId) -> crate::decompile::exprs::VarVersionPair {
        g[b].exprents.as_ref().unwrap()[0]
            .assignment_parts()
            .unwrap()
            .0
            .as_var()
            .unwrap()
            .pair()
    }

    #[test]
    fn untouched_field_read_is_replaceable() {
        let s = Exprent::stack_var(STACK_BASE, VarType::Int);
        let (mut g, root, b) = single_block(vec![
            Exprent::assign(s.clone(), field("f")),
            Exprent::assign(Exprent::var(1, VarType::Int), s),
        ]);
        let res = build_ssau(&mut g, root).unwrap();
        assert!(res.is_replaceable(stack_def_pair(&g, b)));
    }

    #[test]
    fn call_between_def_and_use_blocks_replacement() {
        let s = Exprent::stack_var(STACK_BASE, VarType::Int);
        let (mut g, root, b) = single_block(vec![
            Exprent::assign(s.clone(), field("f")),
            call(),
            Exprent::assign(Exprent::var(1, VarType::Int), s),
        ]);
        let res = build_ssau(&mut g, root).unwrap();
        assert!(!res.is_replaceable(stack_def_pair(&g, b)));
    }

    #[test]
    fn reassigned_local_blocks_replacement() {
        let s = Exprent::stack_var(STACK_BASE, VarType::Int);
        let (mut g, root, b) = single_block(vec![
            Exprent::assign(s.clone(), Exprent::var(1, VarType::Int)),
            Exprent::assign(Exprent::var(1, VarType::Int), Exprent::int_const(7)),
            Exprent::assign(Exprent::var(2, VarType::Int), s),
        ]);
        let res = build_ssau(&mut g, root).unwrap();
        assert!(!res.is_replaceable(stack_def_pair(&g, b)));
    }
}
