//! Java source rendering of expressions.

use std::collections::HashMap;
use std::fmt::Write;

use crate::decompile::descriptor::{class_source_name, simple_class_name, VarType};
use crate::decompile::tracer::{BytecodeMappingTracer, TextBuffer};

use super::exprent::*;

/// Naming and class context needed to print expressions.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext<'a> {
    /// Internal name of the class declaring the method.
    pub class_name: &'a str,
    /// Variable names by variable index.
    pub names: &'a HashMap<u32, String>,
    /// One indentation unit.
    pub indent: &'a str,
}

impl<'a> RenderContext<'a> {
    pub fn var_name(&self, var: &VarExpr) -> String {
        match self.names.get(&var.index) {
            Some(name) => name.clone(),
            None if var.version == 0 => format!("var{}", var.index),
            None => format!("var{}_{}", var.index, var.version),
        }
    }
}

impl Exprent {
    pub fn to_java(&self, indent: usize, ctx: &RenderContext, tracer: &mut BytecodeMappingTracer) -> TextBuffer {
        tracer.add_mappings(&self.bytecode);
        let mut buf = TextBuffer::new();
        match &self.kind {
            ExprKind::Annotation { class_name } => {
                buf.append("@").append(&class_source_name(simple_class_name(class_name)));
            }
            ExprKind::Array { array, index, .. } => {
                let arr = self.wrap_instance(array, indent, ctx, tracer);
                buf.append_buffer(&arr)
                    .append("[")
                    .append_buffer(&index.to_java(indent, ctx, tracer))
                    .append("]");
            }
            ExprKind::Assert { params } => {
                buf.append("assert ");
                if let Some(cond) = params.first() {
                    buf.append_buffer(&cond.to_java(indent, ctx, tracer));
                }
                if let Some(msg) = params.get(1) {
                    buf.append(" : ").append_buffer(&msg.to_java(indent, ctx, tracer));
                }
            }
            ExprKind::Assignment { left, right, cond } => {
                buf.append_buffer(&left.to_java(indent, ctx, tracer));
                match cond.and_then(FunctionType::operator) {
                    Some(op) => buf.append(" ").append(op).append("= "),
                    None => buf.append(" = "),
                };
                buf.append_buffer(&right.to_java(indent, ctx, tracer));
            }
            ExprKind::Const { ty, value } => {
                buf.append(&const_to_java(ty, value));
            }
            ExprKind::Exit { kind, value, ret_type } => match kind {
                ExitKind::Return => {
                    buf.append("return");
                    if let Some(v) = value {
                        if *ret_type != VarType::Void {
                            buf.append(" ").append_buffer(&v.to_java(indent, ctx, tracer));
                        }
                    }
                }
                ExitKind::Throw => {
                    buf.append("throw");
                    if let Some(v) = value {
                        buf.append(" ").append_buffer(&v.to_java(indent, ctx, tracer));
                    }
                }
            },
            ExprKind::Field {
                name,
                class_name,
                is_static,
                instance,
                ..
            } => {
                if *is_static {
                    if class_name != ctx.class_name {
                        buf.append(&class_source_name(simple_class_name(class_name))).append(".");
                    }
                } else if let Some(inst) = instance {
                    let text = self.wrap_instance(inst, indent, ctx, tracer);
                    buf.append_buffer(&text).append(".");
                }
                buf.append(name);
            }
            ExprKind::Function { func, operands } => {
                buf = self.function_to_java(*func, operands, indent, ctx, tracer);
            }
            ExprKind::If { condition } => {
                buf.append("if (")
                    .append_buffer(&condition.to_java(indent, ctx, tracer))
                    .append(")");
            }
            ExprKind::Invocation(inv) => {
                buf = self.invocation_to_java(inv, indent, ctx, tracer);
            }
            ExprKind::Lambda(l) => {
                match (l.is_static_impl, l.captured.first()) {
                    (false, Some(receiver)) => {
                        let text = self.wrap_instance(receiver, indent, ctx, tracer);
                        buf.append_buffer(&text);
                    }
                    _ => {
                        buf.append(&class_source_name(simple_class_name(&l.impl_class)));
                    }
                }
                let name = if l.impl_name == "<init>" { "new" } else { &l.impl_name };
                buf.append("::").append(name);
            }
            ExprKind::Monitor { kind, value } => {
                if *kind == MonitorKind::Enter {
                    buf.append("synchronized (")
                        .append_buffer(&value.to_java(indent, ctx, tracer))
                        .append(")");
                }
            }
            ExprKind::New(n) => {
                buf = new_to_java(n, indent, ctx, tracer);
            }
            ExprKind::Switch { value, .. } => {
                buf.append("switch (")
                    .append_buffer(&value.to_java(indent, ctx, tracer))
                    .append(")");
            }
            ExprKind::Var(v) => {
                if v.definition {
                    buf.append(&v.var_type.java_name()).append(" ");
                }
                buf.append(&ctx.var_name(v));
            }
        }
        buf
    }

    /// Receiver of a member access, parenthesised unless it is primary.
    fn wrap_instance(
        &self,
        inst: &Exprent,
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> TextBuffer {
        let mut text = inst.to_java(indent, ctx, tracer);
        if inst.precedence() > self.precedence() {
            text.enclose("(", ")");
        }
        text
    }

    /// Operand of a function, parenthesised by precedence. `eq` is set for
    /// right-hand operands, which also need parentheses at equal
    /// precedence unless the operator is associative.
    fn wrap_operand(
        &self,
        func: FunctionType,
        operand: &Exprent,
        eq: bool,
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> TextBuffer {
        let my = func.precedence();
        let theirs = operand.precedence();
        let mut parens = theirs > my;
        if !parens && eq && theirs == my {
            parens = operand.function_type() != Some(func) || !func.is_associative();
        }
        let mut text = operand.to_java(indent, ctx, tracer);
        if parens {
            text.enclose("(", ")");
        }
        text
    }

    fn function_to_java(
        &self,
        func: FunctionType,
        operands: &[Exprent],
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> TextBuffer {
        use FunctionType::*;
        let mut buf = TextBuffer::new();
        let op = |i: usize, eq: bool, tracer: &mut BytecodeMappingTracer| match operands.get(i) {
            Some(o) => self.wrap_operand(func, o, eq, indent, ctx, tracer),
            None => TextBuffer::from("<missing>"),
        };

        if let (Some(token), 2) = (func.operator(), operands.len()) {
            let left = op(0, false, tracer);
            let right = op(1, true, tracer);
            buf.append_buffer(&left).append(" ").append(token).append(" ").append_buffer(&right);
            return buf;
        }

        match func {
            BitNot => {
                let t = op(0, true, tracer);
                buf.append("~").append_buffer(&t);
            }
            BoolNot => {
                let t = op(0, true, tracer);
                buf.append("!").append_buffer(&t);
            }
            Neg => {
                let t = op(0, true, tracer);
                buf.append("-").append_buffer(&t);
            }
            Convert(to) => {
                let t = op(0, true, tracer);
                buf.append("(").append(&to.var_type().java_name()).append(")").append_buffer(&t);
            }
            Cast => {
                let target = operands.get(1).map_or(VarType::Unknown, Exprent::expr_type);
                let t = op(0, true, tracer);
                buf.append("(").append(&target.java_name()).append(")").append_buffer(&t);
            }
            Instanceof => {
                let target = operands.get(1).map_or(VarType::Unknown, Exprent::expr_type);
                let t = op(0, true, tracer);
                buf.append_buffer(&t).append(" instanceof ").append(&target.java_name());
            }
            ArrayLength => {
                let t = op(0, false, tracer);
                buf.append_buffer(&t).append(".length");
            }
            Imm => {
                let t = op(0, true, tracer);
                buf.append("--").append_buffer(&t);
            }
            Ipp => {
                let t = op(0, true, tracer);
                buf.append("++").append_buffer(&t);
            }
            Mmi => {
                let t = op(0, true, tracer);
                buf.append_buffer(&t).append("--");
            }
            Ppi => {
                let t = op(0, true, tracer);
                buf.append_buffer(&t).append("++");
            }
            Iif => {
                let c = op(0, true, tracer);
                let a = op(1, true, tracer);
                let b = op(2, true, tracer);
                buf.append_buffer(&c).append(" ? ").append_buffer(&a).append(" : ").append_buffer(&b);
            }
            Lcmp | Fcmpl | Fcmpg | Dcmpl | Dcmpg => {
                let name = format!("{:?}", func).to_lowercase();
                let a = op(0, false, tracer);
                let b = op(1, false, tracer);
                buf.append("__")
                    .append(&name)
                    .append("__(")
                    .append_buffer(&a)
                    .append(", ")
                    .append_buffer(&b)
                    .append(")");
            }
            _ => {
                // binary operators with a malformed operand list
                for (i, _) in operands.iter().enumerate() {
                    if i > 0 {
                        buf.append(" ").append(func.operator().unwrap_or("?")).append(" ");
                    }
                    let t = op(i, i > 0, tracer);
                    buf.append_buffer(&t);
                }
            }
        }
        buf
    }

    fn invocation_to_java(
        &self,
        inv: &InvocationExpr,
        indent: usize,
        ctx: &RenderContext,
        tracer: &mut BytecodeMappingTracer,
    ) -> TextBuffer {
        let mut buf = TextBuffer::new();
        let is_this = |e: &Exprent| matches!(&e.kind, ExprKind::Var(v) if v.index == 0 && !v.stack);

        match inv.kind {
            InvocationKind::Static => {
                if inv.class_name != ctx.class_name {
                    buf.append(&class_source_name(simple_class_name(&inv.class_name))).append(".");
                }
                buf.append(&inv.name);
            }
            InvocationKind::Dynamic => {
                buf.append(&inv.name);
            }
            _ if inv.is_constructor() => match &inv.instance {
                Some(inst) if is_this(inst) => {
                    buf.append(if inv.class_name == ctx.class_name { "this" } else { "super" });
                }
                Some(inst) => {
                    let text = self.wrap_instance(inst, indent, ctx, tracer);
                    buf.append_buffer(&text).append(".<init>");
                }
                None => {
                    buf.append("<init>");
                }
            },
            InvocationKind::Special
                if inv.class_name != ctx.class_name && inv.instance.as_ref().map_or(false, is_this) =>
            {
                buf.append("super.").append(&inv.name);
            }
            _ => {
                if let Some(inst) = &inv.instance {
                    let text = self.wrap_instance(inst, indent, ctx, tracer);
                    buf.append_buffer(&text).append(".");
                }
                buf.append(&inv.name);
            }
        }

        buf.append("(");
        for (i, p) in inv.params.iter().enumerate() {
            if i > 0 {
                buf.append(", ");
            }
            buf.append_buffer(&p.to_java(indent, ctx, tracer));
        }
        buf.append(")");
        buf
    }
}

fn new_to_java(n: &NewExpr, indent: usize, ctx: &RenderContext, tracer: &mut BytecodeMappingTracer) -> TextBuffer {
    let mut buf = TextBuffer::new();
    if n.new_type.array_dim() == 0 {
        buf.append("new ").append(&n.new_type.java_name()).append("(");
        if let Some(c) = &n.constructor {
            for (i, p) in c.params.iter().enumerate() {
                if i > 0 {
                    buf.append(", ");
                }
                buf.append_buffer(&p.to_java(indent, ctx, tracer));
            }
        }
        buf.append(")");
        return buf;
    }

    if !n.elements.is_empty() || n.dims.is_empty() {
        if !n.direct_array_init {
            buf.append("new ").append(&n.new_type.java_name());
        }
        buf.append("{");
        for (i, e) in n.elements.iter().enumerate() {
            if i > 0 {
                buf.append(", ");
            }
            buf.append_buffer(&e.to_java(indent, ctx, tracer));
        }
        buf.append("}");
        return buf;
    }

    let mut base = n.new_type.clone();
    while let VarType::Array(inner) = base {
        base = *inner;
    }
    buf.append("new ").append(&base.java_name());
    for d in &n.dims {
        buf.append("[").append_buffer(&d.to_java(indent, ctx, tracer)).append("]");
    }
    for _ in n.dims.len()..n.new_type.array_dim() {
        buf.append("[]");
    }
    buf
}

pub fn const_to_java(ty: &VarType, value: &ConstValue) -> String {
    match value {
        ConstValue::Int(v) => match ty {
            VarType::Boolean => (if *v != 0 { "true" } else { "false" }).to_string(),
            VarType::Char => char_literal(*v),
            _ => format!("{}", v),
        },
        ConstValue::Long(v) => format!("{}L", v),
        ConstValue::Float(v) => {
            if v.is_nan() {
                "Float.NaN".into()
            } else if v.is_infinite() {
                if *v > 0.0 {
                    "Float.POSITIVE_INFINITY".into()
                } else {
                    "Float.NEGATIVE_INFINITY".into()
                }
            } else {
                format!("{}f", v)
            }
        }
        ConstValue::Double(v) => {
            if v.is_nan() {
                "Double.NaN".into()
            } else if v.is_infinite() {
                if *v > 0.0 {
                    "Double.POSITIVE_INFINITY".into()
                } else {
                    "Double.NEGATIVE_INFINITY".into()
                }
            } else {
                format!("{}d", v)
            }
        }
        ConstValue::String(s) => format!("\"{}\"", escape_java_string(s)),
        ConstValue::Class(t) => format!("{}.class", t.java_name()),
        ConstValue::Null => "null".into(),
    }
}

fn char_literal(v: i32) -> String {
    let c = char::from_u32(v as u32).unwrap_or('\u{fffd}');
    match c {
        '\'' => "'\\''".into(),
        '\\' => "'\\\\'".into(),
        '\n' => "'\\n'".into(),
        '\r' => "'\\r'".into(),
        '\t' => "'\\t'".into(),
        '\u{8}' => "'\\b'".into(),
        '\u{c}' => "'\\f'".into(),
        c if (' '..='~').contains(&c) => format!("'{}'", c),
        _ => format!("'\\u{:04x}'", v as u32),
    }
}

pub fn escape_java_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Render a list of expressions as statements, one per line.
pub fn list_to_java(
    list: &[Exprent],
    indent: usize,
    ctx: &RenderContext,
    tracer: &mut BytecodeMappingTracer,
) -> TextBuffer {
    let mut buf = TextBuffer::new();
    for expr in list {
        let content = expr.to_java(indent, ctx, tracer);
        if content.is_empty() {
            continue;
        }
        buf.append_indent(indent, ctx.indent).append_buffer(&content);
        if matches!(&expr.kind, ExprKind::Monitor { kind: MonitorKind::Enter, .. }) {
            buf.append("{}");
        }
        if ends_with_semicolon(expr) {
            buf.append(";");
        }
        buf.append_line_separator();
        tracer.increment_current_line();
    }
    buf
}

pub fn ends_with_semicolon(expr: &Exprent) -> bool {
    !matches!(expr.kind, ExprKind::Switch { .. } | ExprKind::Monitor { .. } | ExprKind::If { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(e: &Exprent) -> String {
        let names = HashMap::new();
        let ctx = RenderContext {
            class_name: "pkg/Main",
            names: &names,
            indent: "    ",
        };
        let mut tracer = BytecodeMappingTracer::new(0);
        e.to_java(0, &ctx, &mut tracer).into_string()
    }

    fn v(i: u32) -> Exprent {
        Exprent::var(i, VarType::Int)
    }

    #[test]
    fn parenthesises_by_precedence() {
        let sum = Exprent::func(FunctionType::Add, vec![v(1), v(2)]);
        let product = Exprent::func(FunctionType::Mul, vec![sum.clone(), v(3)]);
        assert_eq!(render(&product), "(var1 + var2) * var3");

        let right_sub = Exprent::func(
            FunctionType::Sub,
            vec![v(1), Exprent::func(FunctionType::Sub, vec![v(2), v(3)])],
        );
        assert_eq!(render(&right_sub), "var1 - (var2 - var3)");

        let chain = Exprent::func(FunctionType::Add, vec![v(1), sum]);
        assert_eq!(render(&chain), "var1 + var1 + var2");
    }

    #[test]
    fn literals() {
        assert_eq!(render(&Exprent::string_const("a\"b\n")), "\"a\\\"b\\n\"");
        assert_eq!(render(&Exprent::bool_const(true)), "true");
        let c = Exprent::new(ExprKind::Const {
            ty: VarType::Char,
            value: ConstValue::Int('x' as i32),
        });
        assert_eq!(render(&c), "'x'");
        let l = Exprent::new(ExprKind::Const {
            ty: VarType::Long,
            value: ConstValue::Long(5),
        });
        assert_eq!(render(&l), "5L");
    }

    #[test]
    fn exits_and_assignments() {
        let ret = Exprent::exit(ExitKind::Return, Some(Exprent::int_const(1)), VarType::Int);
        assert_eq!(render(&ret), "return 1");
        let mut def = v(4);
        def.as_var_mut().unwrap().definition = true;
        let assign = Exprent::assign(def, Exprent::int_const(7));
        assert_eq!(render(&assign), "int var4 = 7");
    }

    #[test]
    fn tracer_collects_offsets() {
        let mut e = Exprent::int_const(2);
        e.bytecode.insert(12);
        let names = HashMap::new();
        let ctx = RenderContext {
            class_name: "A",
            names: &names,
            indent: "  ",
        };
        let mut tracer = BytecodeMappingTracer::new(3);
        e.to_java(0, &ctx, &mut tracer);
        assert_eq!(tracer.mapping().get(&12), Some(&3));
    }
}
