//! Control-flow structuring and expression reconstruction for
//! [JVM method bytecode](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html).
//!
//! The classfile-level modules hold the inputs (decoded instructions, the
//! constant pool, exception tables); [`decompile`] turns one method at a
//! time into a tree of structured statements that renders as Java source.

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod code_attribute;
pub mod constant_info;
pub mod method_info;

#[cfg(feature = "decompile")]
pub mod decompile;

pub use method_info::{MethodAccessFlags, MethodInfo};
