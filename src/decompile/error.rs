use thiserror::Error;

use super::stat_edge::EdgeId;
use super::statement::StatId;

/// Failures raised while decompiling one method. All of them are caught at
/// the method boundary by [`super::method_processor::decompile_methods`].
#[derive(Debug, Error)]
pub enum DecompileError {
    /// The structuring driver ran out of strategies for a region.
    #[error("{method}: structuring failed in {pass} for a region of {region} statements")]
    StructuringFailure {
        method: String,
        region: usize,
        pass: &'static str,
    },

    /// A finally handler whose copies could not be matched up. The finally
    /// processor recovers from this by keeping the handler as a catch-all.
    #[error("inconsistent finally handler at block {handler}")]
    InconsistentFinally { handler: u32 },

    /// A structuring pass broke one of the graph invariants.
    #[error("invariant violated: {message} (statement {statement:?}, edge {edge:?})")]
    InvariantViolation {
        message: String,
        statement: Option<StatId>,
        edge: Option<EdgeId>,
    },

    #[error("unsupported or malformed bytecode: {0}")]
    UnsupportedBytecode(String),

    #[error("cannot decode code array: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, DecompileError>;

impl DecompileError {
    pub fn invariant(message: impl Into<String>, statement: Option<StatId>, edge: Option<EdgeId>) -> Self {
        let message = message.into();
        tracing::error!(statement = ?statement, edge = ?edge, "{}", message);
        DecompileError::InvariantViolation {
            message,
            statement,
            edge,
        }
    }

    pub fn structuring(pass: &'static str, region: usize) -> Self {
        DecompileError::StructuringFailure {
            method: String::new(),
            region,
            pass,
        }
    }

    /// Attach the method name to failures raised deep inside a pass.
    pub fn in_method(self, name: &str) -> Self {
        match self {
            DecompileError::StructuringFailure { region, pass, .. } => {
                DecompileError::StructuringFailure {
                    method: name.to_string(),
                    region,
                    pass,
                }
            }
            other => other,
        }
    }
}
