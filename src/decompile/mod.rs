//! Method decompilation: control-flow structuring over a statement graph,
//! expression reconstruction from the operand stack, SSA based stack
//! variable elimination and Java rendering.
//!
//! [`method_processor::decompile_method`] is the entry point for one method,
//! [`method_processor::decompile_methods`] for a batch.

pub mod cfg;
pub mod cfg_types;
pub mod classpath;
pub mod context;
pub mod dead_code;
pub mod dec_helper;
pub mod descriptor;
pub mod dom_helper;
pub mod error;
pub mod exception_deobf;
pub mod exprs;
pub mod fast_set;
pub mod graph_to_statement;
pub mod options;
pub mod postdom;
pub mod stat_edge;
pub mod statement;
pub mod stats;
pub mod strong_connectivity;
pub mod tracer;

pub mod exit_helper;
pub mod if_helper;
pub mod inline_single_block;
pub mod label_helper;
pub mod loop_extract;
pub mod merge_helper;
pub mod sequence_helper;

pub mod concatenation;
pub mod expr_processor;
pub mod finally_processor;
pub mod pp_mm;
pub mod secondary_functions;
pub mod sforms;
pub mod simplify_exprents;
pub mod stack_vars;
pub mod var_processor;

pub mod method_processor;

pub use context::{DecompileContext, MethodContext};
pub use error::{DecompileError, Result};
pub use method_processor::{decompile_method, decompile_methods, DecompiledMethod};
pub use options::DecompilerOptions;
