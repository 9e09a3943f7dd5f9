/// Knobs for a decompilation job.
#[derive(Clone, Debug)]
pub struct DecompilerOptions {
    /// Try to fold duplicated finally bodies back into one handler.
    pub finally_deinline: bool,
    /// Drop exception ranges that protect no instructions.
    pub remove_empty_ranges: bool,
    /// Irreducible-region node splits allowed per method.
    pub max_node_splits: usize,
    /// Rounds of the general-region search before giving up on a region.
    pub max_structuring_passes: usize,
    /// Upper bound for every fixed-point loop in the pipeline.
    pub max_fixed_point_iterations: usize,
    pub indent: String,
    /// Render a comment with the failure in place of an undecompilable body.
    pub emit_failure_comments: bool,
}

impl Default for DecompilerOptions {
    fn default() -> Self {
        Self {
            finally_deinline: true,
            remove_empty_ranges: true,
            max_node_splits: 5,
            max_structuring_passes: 64,
            max_fixed_point_iterations: 1000,
            indent: "    ".into(),
            emit_failure_comments: true,
        }
    }
}
