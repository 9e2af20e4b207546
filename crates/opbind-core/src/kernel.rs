use std::sync::Arc;

use anyhow::Result;

use crate::error::AttributeError;
use crate::graph::Attributes;
use crate::tensor::Tensor;

/// Backend-specific implementation of one operator, bound to one node.
///
/// A kernel is constructed without attributes, then `initialize`d exactly once
/// with the node's attribute mapping before any `invoke`. Kernels are owned by
/// a single session and are not required to be `Sync`.
pub trait Kernel: Send {
    /// Implementation type name, e.g. `cpu.Softmax`. Stable for a given factory.
    fn kind(&self) -> &'static str;

    /// Validates and freezes the node's attributes.
    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError>;

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>>;
}

/// Builds a fresh, uninitialized kernel. Shared read-only across sessions.
pub type KernelFactory = Arc<dyn Fn() -> Box<dyn Kernel> + Send + Sync>;

pub fn kernel_factory<F, K>(make: F) -> KernelFactory
where
    F: Fn() -> K + Send + Sync + 'static,
    K: Kernel + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn Kernel>)
}
