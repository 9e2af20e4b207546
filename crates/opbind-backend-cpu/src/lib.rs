//! Reference CPU backend.
//!
//! Broad, straightforward operator coverage on the calling thread. Sessions
//! typically configure it as the fallback behind a faster, partial backend.

pub mod kernels;

use anyhow::Result;
use opbind_core::{
    kernel_factory, Backend, CatalogBuilder, CatalogError, CatalogSet, InferenceHandler, Kernel,
    OperatorCatalog, Tensor, VersionRange, DEFAULT_DOMAIN,
};
use tracing::trace;

use kernels::{BinaryKind, BinaryOp, Flatten, Gemm, MatMul, Softmax, Sum, Unary, UnaryKind};

pub const CONTRIB_DOMAIN: &str = "com.microsoft";

pub struct CpuBackend {
    catalogs: CatalogSet,
}

impl CpuBackend {
    pub fn new() -> Result<Self, CatalogError> {
        let catalogs = CatalogSet::new(vec![onnx_catalog()?, contrib_catalog()?])?;
        Ok(Self { catalogs })
    }
}

fn binary(builder: CatalogBuilder, op: &str, kind: BinaryKind) -> CatalogBuilder {
    builder.register(
        op,
        VersionRange::since(7),
        kernel_factory(move || BinaryOp::new(kind)),
    )
}

fn unary(builder: CatalogBuilder, op: &str, since: u32, kind: UnaryKind) -> CatalogBuilder {
    builder.register(
        op,
        VersionRange::since(since),
        kernel_factory(move || Unary::new(kind)),
    )
}

fn onnx_catalog() -> Result<OperatorCatalog, CatalogError> {
    let mut builder = CatalogBuilder::new(DEFAULT_DOMAIN);
    for (op, kind) in [
        ("Add", BinaryKind::Add),
        ("Sub", BinaryKind::Sub),
        ("Mul", BinaryKind::Mul),
        ("Div", BinaryKind::Div),
        ("PRelu", BinaryKind::PRelu),
        ("And", BinaryKind::And),
        ("Or", BinaryKind::Or),
        ("Xor", BinaryKind::Xor),
    ] {
        builder = binary(builder, op, kind);
    }
    for (op, since, kind) in [
        ("Relu", 6, UnaryKind::Relu),
        ("LeakyRelu", 6, UnaryKind::LeakyRelu),
        ("Sigmoid", 6, UnaryKind::Sigmoid),
        ("Tanh", 6, UnaryKind::Tanh),
        ("Exp", 6, UnaryKind::Exp),
        ("Neg", 6, UnaryKind::Neg),
        ("Abs", 6, UnaryKind::Abs),
        ("Erf", 9, UnaryKind::Erf),
        ("Identity", 1, UnaryKind::Identity),
    ] {
        builder = unary(builder, op, since, kind);
    }

    builder
        .register("Softmax", VersionRange::new(1, 12), kernel_factory(Softmax::legacy))
        .register("Softmax", VersionRange::since(13), kernel_factory(Softmax::v13))
        .register("Sum", VersionRange::since(8), kernel_factory(Sum::default))
        .register("MatMul", VersionRange::since(9), kernel_factory(MatMul::default))
        .register("Gemm", VersionRange::since(7), kernel_factory(Gemm::default))
        .register("Flatten", VersionRange::since(1), kernel_factory(Flatten::default))
        .build()
}

fn contrib_catalog() -> Result<OperatorCatalog, CatalogError> {
    unary(CatalogBuilder::new(CONTRIB_DOMAIN), "Gelu", 1, UnaryKind::Gelu).build()
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    fn create_inference_handler(&self) -> Result<Box<dyn InferenceHandler>> {
        Ok(Box::new(CpuInferenceHandler::default()))
    }
}

/// Runs kernels inline on the caller's thread.
#[derive(Default)]
pub struct CpuInferenceHandler {
    invocations: u64,
}

impl CpuInferenceHandler {
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl InferenceHandler for CpuInferenceHandler {
    fn backend(&self) -> &str {
        "cpu"
    }

    fn run(&mut self, kernel: &mut dyn Kernel, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        self.invocations += 1;
        trace!(
            kind = kernel.kind(),
            inputs = inputs.len(),
            invocation = self.invocations,
            "cpu invoke"
        );
        kernel.invoke(inputs)
    }
}
