#![cfg(feature = "decompile")]

use std::sync::Arc;

use pretty_assertions::assert_eq;

use classfile_decompiler::attribute_info::{BootstrapMethod, CodeAttribute, ExceptionEntry, LocalVariable};
use classfile_decompiler::constant_info::{ConstantPool, MemberRef, PooledConstant};
use classfile_decompiler::decompile::exprs::{ConstValue, ExitKind, ExprKind};
use classfile_decompiler::decompile::merge_helper::enhance_loops;
use classfile_decompiler::decompile::method_processor::method_source;
use classfile_decompiler::decompile::statement::{StatId, StatKind, StatType};
use classfile_decompiler::decompile::stats::{IfType, LoopType};
use classfile_decompiler::decompile::{decompile_method, decompile_methods, DecompileContext, DecompiledMethod};
use classfile_decompiler::{MethodAccessFlags, MethodInfo};

const CLASS: &str = "Demo";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local(index: u16, name: &str, descriptor: &str, length: u16) -> LocalVariable {
    LocalVariable {
        start_pc: 0,
        length,
        name: name.into(),
        descriptor: descriptor.into(),
        index,
    }
}

/// Static method of `Demo` over a hand-assembled pool.
struct MethodBuilder {
    name: &'static str,
    descriptor: &'static str,
    pool: ConstantPool,
    bootstrap: Vec<BootstrapMethod>,
    code: CodeAttribute,
}

impl MethodBuilder {
    fn new(name: &'static str, descriptor: &'static str) -> Self {
        MethodBuilder {
            name,
            descriptor,
            pool: ConstantPool::default(),
            bootstrap: Vec::new(),
            code: CodeAttribute {
                max_stack: 4,
                max_locals: 4,
                ..Default::default()
            },
        }
    }

    fn method_ref(&mut self, name: &str, descriptor: &str) -> [u8; 2] {
        self.pool.add_method_ref(CLASS, name, descriptor).to_be_bytes()
    }

    fn build(self, code: Vec<u8>) -> MethodInfo {
        MethodInfo {
            class_name: CLASS.into(),
            name: self.name.into(),
            descriptor: self.descriptor.into(),
            access_flags: MethodAccessFlags::STATIC,
            code: CodeAttribute { code, ..self.code },
            constant_pool: Arc::new(self.pool),
            bootstrap_methods: Arc::new(self.bootstrap),
        }
    }
}

fn decompile(method: &MethodInfo) -> DecompiledMethod {
    init_tracing();
    let job = DecompileContext::default();
    match decompile_method(&job, method) {
        Ok(m) => m,
        Err(err) => panic!("{} failed: {}", method.name, err),
    }
}

/// Constant returned at the end of a basic block.
fn returned_constant(m: &DecompiledMethod, stat: StatId) -> Option<i32> {
    let last = m.graph[stat].exprents.as_ref()?.last()?;
    let ExprKind::Exit {
        kind: ExitKind::Return,
        value: Some(value),
        ..
    } = &last.kind
    else {
        return None;
    };
    match value.kind {
        ExprKind::Const {
            value: ConstValue::Int(n),
            ..
        } => Some(n),
        _ => None,
    }
}

#[test]
fn two_returns_become_an_if_else() {
    let mut b = MethodBuilder::new("pick", "(Z)I");
    b.code.local_variables.push(local(0, "flag", "Z", 8));
    let method = b.build(vec![
        0x1a, // iload_0
        0x99, 0x00, 0x05, // ifeq 6
        0x04, // iconst_1
        0xac, // ireturn
        0x05, // iconst_2
        0xac, // ireturn
    ]);
    let result = decompile(&method);

    let ifs: Vec<_> = result
        .graph
        .subtree(result.graph.root().unwrap())
        .into_iter()
        .filter(|&s| result.graph.stat_type(s) == StatType::If)
        .collect();
    assert_eq!(ifs.len(), 1);
    let data = result.graph.if_data(ifs[0]).unwrap();
    assert_eq!(data.if_type, IfType::IfElse);
    assert_eq!(returned_constant(&result, data.if_stat.unwrap()), Some(1));
    assert_eq!(returned_constant(&result, data.else_stat.unwrap()), Some(2));

    assert_eq!(result.text, "if (flag) {\n    return 1;\n} else {\n    return 2;\n}\n");
}

#[test]
fn boolean_parameter_without_table_is_typed_from_the_descriptor() {
    let method = MethodBuilder::new("invert", "(Z)I").build(vec![
        0x1a, // iload_0
        0x9a, 0x00, 0x05, // ifne 6
        0x04, // iconst_1
        0xac, // ireturn
        0x03, // iconst_0
        0xac, // ireturn
    ]);
    let result = decompile(&method);

    assert_eq!(result.text, "if (!var0) {\n    return 1;\n} else {\n    return 0;\n}\n");
}

#[test]
fn guarded_call_runs_when_the_branch_falls_through() {
    let mut b = MethodBuilder::new("guard", "(I)V");
    let [uh, ul] = b.method_ref("use", "(I)V");
    b.code.local_variables.push(local(0, "x", "I", 9));
    let method = b.build(vec![
        0x1a, // iload_0
        0x9e, 0x00, 0x07, // ifle 8
        0x04, // iconst_1
        0xb8, uh, ul, // invokestatic use
        0xb1, // return
    ]);

    let result = decompile(&method);
    assert_eq!(result.text, "if (x > 0) {\n    use(1);\n}\n");
}

#[test]
fn while_condition_is_the_fall_through_of_the_exit_jump() {
    let mut b = MethodBuilder::new("drain", "(I)V");
    b.code.local_variables.push(local(0, "x", "I", 11));
    let method = b.build(vec![
        0x1a, // iload_0
        0x9e, 0x00, 0x09, // ifle 10
        0x84, 0x00, 0xff, // iinc 0 -1
        0xa7, 0xff, 0xf9, // goto 0
        0xb1, // return
    ]);

    let result = decompile(&method);
    assert!(result.text.contains("while (x > 0) {"), "{}", result.text);
    assert!(result.text.contains("--x;"), "{}", result.text);
    assert!(!result.text.contains("x <= 0"), "{}", result.text);
}

#[test]
fn string_concat_call_site_renders_as_plus_chain() {
    let mut b = MethodBuilder::new("join", "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;");
    b.bootstrap.push(BootstrapMethod {
        method_handle: PooledConstant::MethodHandle {
            kind: 6,
            member: MemberRef {
                class_name: "java/lang/invoke/StringConcatFactory".into(),
                name: "makeConcatWithConstants".into(),
                descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;".into(),
                is_interface: false,
            },
        },
        arguments: vec![PooledConstant::String("\u{1}+\u{1}".into())],
    });
    let [hi, lo] = b
        .pool
        .add_invoke_dynamic(0, "makeConcatWithConstants", "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;")
        .to_be_bytes();
    b.code.local_variables.push(local(0, "a", "Ljava/lang/String;", 8));
    b.code.local_variables.push(local(1, "b", "Ljava/lang/String;", 8));
    let method = b.build(vec![
        0x2a, // aload_0
        0x2b, // aload_1
        0xba, hi, lo, 0x00, 0x00, // invokedynamic
        0xb0, // areturn
    ]);

    let result = decompile(&method);
    assert!(result.text.contains("return a + \"+\" + b;"), "{}", result.text);
}

#[test]
fn duplicated_finally_body_is_folded() {
    let mut b = MethodBuilder::new("run", "()V");
    let [ah, al] = b.method_ref("a", "()V");
    let [fh, fl] = b.method_ref("f", "()V");
    b.code.max_locals = 1;
    b.code.exception_table.push(ExceptionEntry {
        start_pc: 0,
        end_pc: 3,
        handler_pc: 7,
        catch_type: 0,
    });
    let method = b.build(vec![
        0xb8, ah, al, // invokestatic a
        0xb8, fh, fl, // invokestatic f
        0xb1, // return
        0x4b, // astore_0
        0xb8, fh, fl, // invokestatic f
        0x2a, // aload_0
        0xbf, // athrow
    ]);

    let result = decompile(&method);
    assert!(result.text.contains("try {"), "{}", result.text);
    assert!(result.text.contains("finally {"), "{}", result.text);
    assert_eq!(result.text.matches("f();").count(), 1, "{}", result.text);
    assert!(!result.text.contains("throw"), "{}", result.text);
}

#[test]
fn counting_loop_is_stable_under_another_enhancement_pass() {
    let mut b = MethodBuilder::new("sum", "(I)I");
    b.code.max_locals = 3;
    b.code.local_variables.push(local(0, "n", "I", 21));
    b.code.local_variables.push(local(1, "total", "I", 21));
    b.code.local_variables.push(local(2, "i", "I", 21));
    let method = b.build(vec![
        0x03, // iconst_0
        0x3c, // istore_1
        0x03, // iconst_0
        0x3d, // istore_2
        0x1c, // iload_2
        0x1a, // iload_0
        0xa2, 0x00, 0x0d, // if_icmpge 19
        0x1b, // iload_1
        0x1c, // iload_2
        0x60, // iadd
        0x3c, // istore_1
        0x84, 0x02, 0x01, // iinc 2 1
        0xa7, 0xff, 0xf4, // goto 4
        0x1b, // iload_1
        0xac, // ireturn
    ]);

    let mut result = decompile(&method);
    assert!(result.text.contains("for (int i = 0; i < n; ++i) {"), "{}", result.text);
    assert!(result.text.contains("return total;"), "{}", result.text);

    let root = result.graph.root().unwrap();
    let loop_types = |m: &DecompiledMethod| -> Vec<LoopType> {
        m.graph
            .subtree(root)
            .into_iter()
            .filter_map(|s| match &m.graph[s].kind {
                StatKind::Do(data) => Some(data.loop_type),
                _ => None,
            })
            .collect()
    };
    let before = loop_types(&result);
    assert_eq!(before, vec![LoopType::For]);

    enhance_loops(&mut result.graph, root).unwrap();
    assert_eq!(loop_types(&result), before);
}

#[test]
fn single_use_stack_values_are_inlined() {
    let mut b = MethodBuilder::new("call", "()V");
    let [fh, fl] = b.method_ref("f", "()LDemo;");
    let g = b.pool.add_method_ref(CLASS, "g", "()LDemo;").to_be_bytes();
    let [uh, ul] = b.method_ref("use", "(LDemo;)V");
    let method = b.build(vec![
        0xb8, fh, fl, // invokestatic f
        0xb6, g[0], g[1], // invokevirtual g
        0xb8, uh, ul, // invokestatic use
        0xb1, // return
    ]);

    let result = decompile(&method);
    assert!(result.text.contains("use(f().g());"), "{}", result.text);
}

#[test]
fn stack_value_is_not_moved_past_a_store_to_its_source() {
    let mut b = MethodBuilder::new("keep", "(I)V");
    let [uh, ul] = b.method_ref("use", "(I)V");
    b.code.local_variables.push(local(0, "x", "I", 7));
    let method = b.build(vec![
        0x1a, // iload_0
        0x08, // iconst_5
        0x3b, // istore_0
        0xb8, uh, ul, // invokestatic use
        0xb1, // return
    ]);

    let result = decompile(&method);
    assert!(result.text.contains("x = 5;"), "{}", result.text);
    assert!(!result.text.contains("use(x);"), "{}", result.text);
}

#[test]
fn failed_method_leaves_a_comment_and_others_still_decompile() {
    init_tracing();
    let empty = MethodBuilder::new("empty", "()V").build(Vec::new());
    let ok = MethodBuilder::new("ok", "()V").build(vec![0xb1]);
    let job = DecompileContext::default();

    let results = decompile_methods(&job, &[empty, ok]);
    assert_eq!(results.len(), 2);
    assert!(results[1].is_ok());

    let comment = method_source(&results[0], &job.options).unwrap();
    assert!(comment.starts_with("// Couldn't be decompiled:"), "{}", comment);
    assert!(comment.contains("empty"), "{}", comment);

    let mut quiet = job.options.clone();
    quiet.emit_failure_comments = false;
    assert_eq!(method_source(&results[0], &quiet), None);
}
