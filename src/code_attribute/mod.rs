//! Bytecode instruction model and the `nom` decoder that produces it.

mod parser;
mod types;

pub use self::parser::*;
pub use self::types::*;
