use std::sync::Arc;

use crate::attribute_info::BootstrapMethod;
use crate::constant_info::ConstantPool;
use crate::method_info::MethodInfo;

use super::classpath::ClasspathHelper;
use super::descriptor::MethodDescriptor;
use super::error::{DecompileError, Result};
use super::options::DecompilerOptions;

/// State shared by every method of one decompilation job.
#[derive(Clone, Debug, Default)]
pub struct DecompileContext {
    pub options: DecompilerOptions,
    pub classpath: Arc<ClasspathHelper>,
}

impl DecompileContext {
    pub fn new(options: DecompilerOptions) -> Self {
        DecompileContext {
            options,
            classpath: Arc::new(ClasspathHelper::new()),
        }
    }
}

/// Per-method state threaded through the pipeline.
#[derive(Debug)]
pub struct MethodContext<'a> {
    pub job: &'a DecompileContext,
    pub method: &'a MethodInfo,
    pub descriptor: MethodDescriptor,
}

impl<'a> MethodContext<'a> {
    pub fn new(job: &'a DecompileContext, method: &'a MethodInfo) -> Result<Self> {
        let descriptor = MethodDescriptor::parse(&method.descriptor).ok_or_else(|| {
            DecompileError::UnsupportedBytecode(format!("bad method descriptor {}", method.descriptor))
        })?;
        Ok(MethodContext {
            job,
            method,
            descriptor,
        })
    }

    pub fn options(&self) -> &DecompilerOptions {
        &self.job.options
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.method.constant_pool
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.method.bootstrap_methods
    }

    pub fn classpath(&self) -> &ClasspathHelper {
        &self.job.classpath
    }

    pub fn is_static(&self) -> bool {
        self.method.is_static()
    }

    /// First variable index not used by parameters or locals. Synthetic
    /// variables (catch variables, semaphores) are numbered from here.
    pub fn first_free_var(&self) -> u32 {
        let slots = self.descriptor.param_slots(self.is_static());
        slots.max(self.method.code.max_locals as u32)
    }
}
