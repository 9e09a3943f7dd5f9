pub mod exprent;
pub mod render;

pub use exprent::*;
pub use render::{list_to_java, RenderContext};
