//! String concatenation recovery.
//!
//! javac compiles `a + b` on strings either to a `StringBuilder` append
//! chain or, since Java 9, to an `invokedynamic` against
//! `StringConcatFactory`. Both are folded back into a `+` chain.

use tracing::trace;

use crate::constant_info::PooledConstant;

use super::descriptor::VarType;
use super::exprs::{ConstValue, ExprKind, Exprent, FunctionType, InvocationExpr, InvocationKind};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
const STRING_BUFFER: &str = "java/lang/StringBuffer";
const CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

/// Marks a dynamic argument in a `makeConcatWithConstants` recipe.
const TAG_ARG: char = '\u{1}';
/// Marks a bootstrap constant in a recipe.
const TAG_CONST: char = '\u{2}';

/// The `+` chain equivalent to `expr`, if it is a concatenation.
pub fn contract_string_concat(expr: &Exprent) -> Option<Exprent> {
    let inv = expr.as_invocation()?;
    let operands = match inv.kind {
        InvocationKind::Dynamic => dynamic_operands(inv)?,
        _ => builder_operands(inv)?,
    };
    let folded = build_chain(operands)?;
    trace!(operands = folded.child_count(), "contracted string concatenation");
    Some(folded.with_offsets(Some(&expr.bytecode)))
}

/// `new StringBuilder(..).append(..)...toString()`
fn builder_operands(inv: &InvocationExpr) -> Option<Vec<Exprent>> {
    if inv.name != "toString" || !inv.params.is_empty() || !is_builder(&inv.class_name) {
        return None;
    }
    let mut operands = Vec::new();
    let mut current = inv.instance.as_ref()?;
    loop {
        match &current.kind {
            ExprKind::Invocation(append) if append.name == "append" && is_builder(&append.class_name) => {
                let [param] = append.params.as_slice() else {
                    return None;
                };
                operands.push(param.clone());
                current = append.instance.as_ref()?;
            }
            ExprKind::New(n) => {
                let ctor = n.constructor.as_ref()?;
                if !matches!(&n.new_type, VarType::Reference(name) if is_builder(name)) {
                    return None;
                }
                match ctor.params.as_slice() {
                    [] => {}
                    [first] if first.expr_type().is_string() => operands.push(unwrap_value_of(first)),
                    [first] => match &first.kind {
                        ExprKind::Invocation(v) if is_value_of(v) => operands.push(unwrap_value_of(first)),
                        // StringBuilder(int capacity)
                        _ => return None,
                    },
                    _ => return None,
                }
                break;
            }
            _ => return None,
        }
    }
    operands.reverse();
    Some(operands)
}

fn is_builder(class_name: &str) -> bool {
    class_name == STRING_BUILDER || class_name == STRING_BUFFER
}

fn is_value_of(inv: &InvocationExpr) -> bool {
    inv.name == "valueOf" && inv.class_name == super::descriptor::STRING && inv.params.len() == 1
}

fn unwrap_value_of(e: &Exprent) -> Exprent {
    match &e.kind {
        ExprKind::Invocation(v) if is_value_of(v) => v.params[0].clone(),
        _ => e.clone(),
    }
}

/// Operands of a `StringConcatFactory` call site, recipe literals included.
fn dynamic_operands(inv: &InvocationExpr) -> Option<Vec<Exprent>> {
    let bootstrap = inv.bootstrap.as_ref()?;
    let PooledConstant::MethodHandle { member, .. } = &bootstrap.handle else {
        return None;
    };
    if member.class_name != CONCAT_FACTORY {
        return None;
    }
    match inv.name.as_str() {
        "makeConcat" => Some(inv.params.clone()),
        "makeConcatWithConstants" => {
            let Some(PooledConstant::String(recipe)) = bootstrap.arguments.first() else {
                return None;
            };
            let mut params = inv.params.iter();
            let mut constants = bootstrap.arguments.iter().skip(1);
            let mut operands = Vec::new();
            let mut literal = String::new();
            for c in recipe.chars() {
                match c {
                    TAG_ARG | TAG_CONST => {
                        if !literal.is_empty() {
                            operands.push(Exprent::string_const(&literal));
                            literal.clear();
                        }
                        let next = if c == TAG_ARG {
                            params.next().cloned()
                        } else {
                            constants.next().and_then(pooled_to_exprent)
                        };
                        operands.push(next?);
                    }
                    _ => literal.push(c),
                }
            }
            if !literal.is_empty() {
                operands.push(Exprent::string_const(&literal));
            }
            Some(operands)
        }
        _ => None,
    }
}

fn pooled_to_exprent(c: &PooledConstant) -> Option<Exprent> {
    let (ty, value) = match c {
        PooledConstant::Integer(v) => (VarType::Int, ConstValue::Int(*v)),
        PooledConstant::Float(v) => (VarType::Float, ConstValue::Float(*v)),
        PooledConstant::Long(v) => (VarType::Long, ConstValue::Long(*v)),
        PooledConstant::Double(v) => (VarType::Double, ConstValue::Double(*v)),
        PooledConstant::String(s) => (VarType::string(), ConstValue::String(s.clone())),
        PooledConstant::Class(name) => (
            VarType::Reference("java/lang/Class".into()),
            ConstValue::Class(VarType::from_class_name(name)),
        ),
        _ => return None,
    };
    Some(Exprent::new(ExprKind::Const { ty, value }))
}

/// Left-associated `+` over `operands`. An empty string leads the chain
/// when neither of the first two operands is a string, so the result still
/// concatenates.
fn build_chain(mut operands: Vec<Exprent>) -> Option<Exprent> {
    let needs_prefix = !operands.iter().take(2).any(|o| o.expr_type().is_string());
    if needs_prefix || operands.len() < 2 {
        operands.insert(0, Exprent::string_const(""));
    }
    let mut iter = operands.into_iter();
    let mut chain = iter.next()?;
    for next in iter {
        chain = Exprent::func(FunctionType::StrConcat, vec![chain, next]);
    }
    Some(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::MemberRef;
    use crate::decompile::descriptor::MethodDescriptor;
    use crate::decompile::exprs::{BootstrapCall, NewExpr};

    fn string_var(index: u32) -> Exprent {
        Exprent::var(index, VarType::string())
    }

    fn call(name: &str, class: &str, desc: &str, instance: Option<Exprent>, params: Vec<Exprent>) -> Exprent {
        Exprent::new(ExprKind::Invocation(Box::new(InvocationExpr {
            name: name.into(),
            class_name: class.into(),
            kind: InvocationKind::Virtual,
            instance,
            descriptor: MethodDescriptor::parse(desc).unwrap(),
            string_descriptor: desc.into(),
            params,
            bootstrap: None,
        })))
    }

    fn indy(recipe: &str, params: Vec<Exprent>) -> Exprent {
        let member = MemberRef {
            class_name: CONCAT_FACTORY.into(),
            name: "makeConcatWithConstants".into(),
            descriptor: "()V".into(),
            is_interface: false,
        };
        Exprent::new(ExprKind::Invocation(Box::new(InvocationExpr {
            name: "makeConcatWithConstants".into(),
            class_name: String::new(),
            kind: InvocationKind::Dynamic,
            instance: None,
            descriptor: MethodDescriptor::parse("(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;").unwrap(),
            string_descriptor: String::new(),
            params,
            bootstrap: Some(BootstrapCall {
                handle: PooledConstant::MethodHandle { kind: 6, member },
                arguments: vec![PooledConstant::String(recipe.into())],
            }),
        })))
    }

    #[test]
    fn recipe_with_two_arguments() {
        let folded = contract_string_concat(&indy("\u{1}\u{1}", vec![string_var(1), string_var(2)])).unwrap();
        assert_eq!(folded, Exprent::func(FunctionType::StrConcat, vec![string_var(1), string_var(2)]));
    }

    #[test]
    fn recipe_literals_become_constants() {
        let folded = contract_string_concat(&indy("\u{1}+\u{1}", vec![string_var(1), string_var(2)])).unwrap();
        let expected = Exprent::func(
            FunctionType::StrConcat,
            vec![
                Exprent::func(FunctionType::StrConcat, vec![string_var(1), Exprent::string_const("+")]),
                string_var(2),
            ],
        );
        assert_eq!(folded, expected);
    }

    #[test]
    fn builder_chain_with_int_operands_gets_empty_prefix() {
        let sb = Exprent::new(ExprKind::New(Box::new(NewExpr {
            new_type: VarType::Reference(STRING_BUILDER.into()),
            constructor: Some(InvocationExpr {
                name: "<init>".into(),
                class_name: STRING_BUILDER.into(),
                kind: InvocationKind::Special,
                instance: None,
                descriptor: MethodDescriptor::parse("()V").unwrap(),
                string_descriptor: "()V".into(),
                params: vec![],
                bootstrap: None,
            }),
            dims: vec![],
            elements: vec![],
            direct_array_init: false,
        })));
        let a = Exprent::var(1, VarType::Int);
        let b = Exprent::var(2, VarType::Int);
        let desc = "(I)Ljava/lang/StringBuilder;";
        let chain = call("append", STRING_BUILDER, desc, Some(sb), vec![a.clone()]);
        let chain = call("append", STRING_BUILDER, desc, Some(chain), vec![b.clone()]);
        let chain = call("toString", STRING_BUILDER, "()Ljava/lang/String;", Some(chain), vec![]);

        let folded = contract_string_concat(&chain).unwrap();
        let expected = Exprent::func(
            FunctionType::StrConcat,
            vec![Exprent::func(FunctionType::StrConcat, vec![Exprent::string_const(""), a]), b],
        );
        assert_eq!(folded, expected);
    }

    #[test]
    fn unrelated_calls_are_left_alone() {
        let plain = call("toString", "java/lang/Object", "()Ljava/lang/String;", Some(string_var(1)), vec![]);
        assert!(contract_string_concat(&plain).is_none());
    }
}
