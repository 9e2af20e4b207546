//! Data-parallel CPU backend.
//!
//! Kernels split their work across a rayon pool owned by the backend. Coverage
//! is partial; graphs using anything else need a fallback.

mod kernels;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use opbind_core::{
    kernel_factory, Backend, CatalogBuilder, CatalogError, CatalogSet, InferenceHandler, Kernel,
    OperatorCatalog, Tensor, VersionRange, DEFAULT_DOMAIN,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, trace};

pub use kernels::{ParBinary, ParBinaryKind, ParMatMul, ParSoftmax, ParSum, ParUnary, ParUnaryKind};

pub struct ParBackend {
    catalogs: CatalogSet,
    pool: Arc<ThreadPool>,
}

impl ParBackend {
    /// Uses rayon's default thread count.
    pub fn new() -> Result<Self> {
        Self::with_threads(0)
    }

    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("opbind-par-{i}"))
            .build()
            .map_err(|err| anyhow!("failed to build par thread pool: {}", err))?;
        debug!(threads = pool.current_num_threads(), "par backend pool ready");
        let catalogs = CatalogSet::new(vec![onnx_catalog()?])?;
        Ok(Self {
            catalogs,
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn onnx_catalog() -> Result<OperatorCatalog, CatalogError> {
    let mut builder = CatalogBuilder::new(DEFAULT_DOMAIN);
    for (op, kind) in [
        ("Add", ParBinaryKind::Add),
        ("Sub", ParBinaryKind::Sub),
        ("Mul", ParBinaryKind::Mul),
        ("Div", ParBinaryKind::Div),
    ] {
        builder = builder.register(
            op,
            VersionRange::since(7),
            kernel_factory(move || ParBinary::new(kind)),
        );
    }
    for (op, kind) in [("Relu", ParUnaryKind::Relu), ("Sigmoid", ParUnaryKind::Sigmoid)] {
        builder = builder.register(
            op,
            VersionRange::since(6),
            kernel_factory(move || ParUnary::new(kind)),
        );
    }
    builder
        .register("Softmax", VersionRange::since(13), kernel_factory(ParSoftmax::default))
        .register("MatMul", VersionRange::since(9), kernel_factory(ParMatMul::default))
        .register("Sum", VersionRange::since(8), kernel_factory(ParSum::default))
        .build()
}

impl Backend for ParBackend {
    fn name(&self) -> &str {
        "par"
    }

    fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    fn create_inference_handler(&self) -> Result<Box<dyn InferenceHandler>> {
        Ok(Box::new(ParInferenceHandler {
            pool: Arc::clone(&self.pool),
        }))
    }
}

/// Runs each kernel inside the backend's pool so nested parallel iterators
/// stay on its threads.
pub struct ParInferenceHandler {
    pool: Arc<ThreadPool>,
}

impl InferenceHandler for ParInferenceHandler {
    fn backend(&self) -> &str {
        "par"
    }

    fn run(&mut self, kernel: &mut dyn Kernel, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        trace!(kind = kernel.kind(), inputs = inputs.len(), "par invoke");
        self.pool.install(|| kernel.invoke(inputs))
    }
}
