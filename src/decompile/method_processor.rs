//! The per-method pipeline: block graph, structuring, expressions,
//! simplification and rendering.

use tracing::{debug, warn};

use crate::method_info::MethodInfo;

use super::cfg::build_cfg;
use super::cfg_types::ControlFlowGraph;
use super::context::{DecompileContext, MethodContext};
use super::dom_helper::{parse_graph, remove_synchronized_handler};
use super::error::{DecompileError, Result};
use super::exprs::RenderContext;
use super::finally_processor::FinallyProcessor;
use super::options::DecompilerOptions;
use super::pp_mm::find_pp_and_mm;
use super::secondary_functions::identify_secondary_functions;
use super::sequence_helper::condense_sequences;
use super::stack_vars::simplify_stack_vars;
use super::statement::{StatId, StatementGraph};
use super::tracer::BytecodeMappingTracer;
use super::var_processor::VarProcessor;
use super::{dead_code, exception_deobf, exit_helper, expr_processor, if_helper, inline_single_block, label_helper};
use super::{loop_extract, merge_helper};

/// One successfully decompiled method.
#[derive(Debug)]
pub struct DecompiledMethod {
    pub name: String,
    pub descriptor: String,
    pub graph: StatementGraph,
    pub variables: VarProcessor,
    /// Method body as Java source.
    pub text: String,
    pub tracer: BytecodeMappingTracer,
}

/// Decompiles every method on its own. A failing method yields an `Err`
/// in its place and never stops the others.
pub fn decompile_methods(job: &DecompileContext, methods: &[MethodInfo]) -> Vec<Result<DecompiledMethod>> {
    methods
        .iter()
        .map(|method| {
            decompile_method(job, method).map_err(|err| {
                let err = err.in_method(&method.name);
                warn!(method = %method.name, %err, "method could not be decompiled");
                err
            })
        })
        .collect()
}

/// Body text for a method result: the source, or a comment standing in for
/// a failed method when the options ask for one.
pub fn method_source(result: &Result<DecompiledMethod>, options: &DecompilerOptions) -> Option<String> {
    match result {
        Ok(method) => Some(method.text.clone()),
        Err(err) if options.emit_failure_comments => Some(format!("// Couldn't be decompiled: {}\n", err)),
        Err(_) => None,
    }
}

pub fn decompile_method(job: &DecompileContext, method: &MethodInfo) -> Result<DecompiledMethod> {
    let ctx = MethodContext::new(job, method)?;
    let options = ctx.options();
    if method.code.code.is_empty() {
        return Err(DecompileError::UnsupportedBytecode(format!("{} has no code", method.name)));
    }
    debug!(method = %method.name, descriptor = %method.descriptor, "decompiling");

    let mut cfg = build_cfg(&method.code, ctx.pool())?;
    prepare_cfg(&mut cfg, options)?;

    let mut finally = FinallyProcessor::new(ctx.first_free_var());
    let mut graph = parse_graph(&cfg, finally.first_free_var(), options)?;
    let mut rounds = 0;
    while finally.process(&mut cfg, &graph, options)? {
        dead_code::remove_dead_blocks(&mut cfg);
        dead_code::remove_empty_blocks(&mut cfg, options.remove_empty_ranges)?;
        dead_code::merge_basic_blocks(&mut cfg, options.remove_empty_ranges)?;
        graph = parse_graph(&cfg, finally.first_free_var(), options)?;
        rounds += 1;
        if rounds >= options.max_fixed_point_iterations {
            warn!(method = %method.name, rounds, "finally processing did not settle");
            break;
        }
    }
    finally.mark_finally(&mut graph)?;

    let root = graph.root()?;
    remove_synchronized_handler(&mut graph, root)?;
    condense_sequences(&mut graph, root)?;

    expr_processor::process_statement(&ctx, &mut graph, root)?;
    condense_sequences(&mut graph, root)?;

    let mut variables = VarProcessor::new(&ctx);
    simplify_stack_vars(&mut graph, root, options)?;
    variables.set_var_versions(&mut graph, root)?;
    for _ in 0..options.max_fixed_point_iterations {
        if !find_pp_and_mm(&mut graph, root) {
            break;
        }
        simplify_stack_vars(&mut graph, root, options)?;
        variables.set_var_versions(&mut graph, root)?;
    }

    let is_initializer = method.name == "<init>" || method.name == "<clinit>";
    enhance(&mut graph, root, is_initializer, options)?;

    exit_helper::remove_redundant_returns(&mut graph)?;
    identify_secondary_functions(&mut graph, root)?;
    variables.set_var_definitions(&mut graph, root)?;
    label_helper::replace_continue_with_break(&mut graph, root)?;

    let render = RenderContext {
        class_name: &method.class_name,
        names: variables.names(),
        indent: &options.indent,
    };
    let mut tracer = BytecodeMappingTracer::new(0);
    let text = graph.to_java(root, 0, &render, &mut tracer)?.into_string();
    debug!(method = %method.name, lines = tracer.current_line(), "decompiled");

    Ok(DecompiledMethod {
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        graph,
        variables,
        text,
        tracer,
    })
}

/// Dead code, goto and exception range clean-up ahead of structuring.
fn prepare_cfg(cfg: &mut ControlFlowGraph, options: &DecompilerOptions) -> Result<()> {
    dead_code::remove_dead_blocks(cfg);
    dead_code::connect_dummy_exit_block(cfg);
    dead_code::remove_gotos(cfg, options.remove_empty_ranges)?;
    exception_deobf::remove_circular_ranges(cfg);
    exception_deobf::restore_pop_ranges(cfg);
    if exception_deobf::has_obfuscated_exceptions(cfg) {
        warn!("exception ranges look obfuscated");
    }
    dead_code::merge_basic_blocks(cfg, options.remove_empty_ranges)?;
    Ok(())
}

/// Loop shapes, if merging, labels and exit sharing until nothing moves.
fn enhance(graph: &mut StatementGraph, root: StatId, is_initializer: bool, options: &DecompilerOptions) -> Result<()> {
    for _ in 0..options.max_fixed_point_iterations {
        label_helper::clean_up_edges(graph, root)?;
        for _ in 0..options.max_fixed_point_iterations {
            merge_helper::enhance_loops(graph, root)?;
            if loop_extract::extract_loops(graph, root)? {
                continue;
            }
            if !if_helper::merge_all_ifs(graph, root)? {
                break;
            }
        }
        label_helper::identify_labels(graph, root)?;
        if inline_single_block::inline_single_blocks(graph, root)? {
            continue;
        }
        // an initializer keeps its single return point
        if is_initializer || !exit_helper::condense_exits(graph, root)? {
            return Ok(());
        }
    }
    warn!("statement enhancement did not settle");
    Ok(())
}
