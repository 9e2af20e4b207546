use anyhow::Result;

use crate::catalog::{CatalogSet, OperatorCatalog};
use crate::kernel::Kernel;
use crate::Tensor;

/// A compute target owning frozen operator catalogs.
///
/// Backends are built once during bootstrap and then shared read-only, usually
/// as `Arc<dyn Backend>`, by any number of sessions.
pub trait Backend: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn catalogs(&self) -> &CatalogSet;

    fn catalog_for(&self, domain: &str) -> Option<&OperatorCatalog> {
        self.catalogs().get(domain)
    }

    fn supports(&self, op_type: &str, domain: &str, version: u32) -> bool {
        self.catalog_for(domain)
            .is_some_and(|catalog| catalog.contains(op_type, domain, version))
    }

    /// Per-session execution context for running this backend's kernels.
    fn create_inference_handler(&self) -> Result<Box<dyn InferenceHandler>>;
}

/// Opaque per-session execution context provided by a backend.
pub trait InferenceHandler: Send {
    fn backend(&self) -> &str;

    /// Inputs are already resident in host memory.
    fn run(&mut self, kernel: &mut dyn Kernel, inputs: &[Tensor]) -> Result<Vec<Tensor>>;
}
