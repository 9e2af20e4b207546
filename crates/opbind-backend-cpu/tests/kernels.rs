use anyhow::{Context, Result};
use opbind_backend_cpu::kernels::erf;
use opbind_backend_cpu::{CpuBackend, CpuInferenceHandler, CONTRIB_DOMAIN};
use opbind_core::{
    AttrValue, AttributeError, Attributes, Backend, InferenceHandler, Kernel, Shape, Tensor,
    DEFAULT_DOMAIN,
};

fn build(
    backend: &CpuBackend,
    op: &str,
    domain: &str,
    version: u32,
    attrs: &Attributes,
) -> Result<Box<dyn Kernel>> {
    let factory = backend
        .catalog_for(domain)
        .and_then(|c| c.lookup(op, domain, version))
        .with_context(|| format!("{op} not registered"))?;
    let mut kernel = factory();
    kernel.initialize(attrs)?;
    Ok(kernel)
}

fn f32s(shape: &[usize], values: &[f32]) -> Result<Tensor> {
    Tensor::from_f32(Shape::from_slice(shape), values)
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
    }
}

#[test]
fn supports_reflects_version_ranges_and_domains() -> Result<()> {
    let cpu = CpuBackend::new()?;
    assert!(cpu.supports("Add", "", 7));
    assert!(!cpu.supports("Add", "", 6));
    assert!(cpu.supports("Softmax", DEFAULT_DOMAIN, 11));
    assert!(cpu.supports("Softmax", DEFAULT_DOMAIN, 13));
    assert!(cpu.supports("Gelu", CONTRIB_DOMAIN, 1));
    assert!(!cpu.supports("Gelu", DEFAULT_DOMAIN, 13));
    assert!(!cpu.supports("Conv", DEFAULT_DOMAIN, 13));
    assert!(cpu.catalog_for("com.example").is_none());
    Ok(())
}

#[test]
fn add_broadcasts_scalar_operand() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut add = build(&cpu, "Add", "", 13, &Attributes::new())?;
    assert_eq!(add.kind(), "cpu.BinaryOp");

    let out = add.invoke(&[f32s(&[2, 2], &[1.0, 2.0, 3.0, 4.0])?, f32s(&[1], &[10.0])?])?;
    assert_eq!(out[0].shape().dims(), &[2, 2]);
    assert_close(&out[0].to_f32_vec()?, &[11.0, 12.0, 13.0, 14.0]);
    Ok(())
}

#[test]
fn legacy_broadcast_attribute_is_rejected() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let factory = cpu
        .catalog_for("")
        .and_then(|c| c.lookup("Mul", "", 7))
        .context("Mul")?;
    let mut kernel = factory();
    let mut attrs = Attributes::new();
    attrs.insert("broadcast", AttrValue::Int(1));
    let err = kernel.initialize(&attrs).unwrap_err();
    assert!(matches!(err, AttributeError::Invalid { ref name, .. } if name == "broadcast"));
    Ok(())
}

#[test]
fn logical_ops_work_on_bool_tensors() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut xor = build(&cpu, "Xor", "", 7, &Attributes::new())?;
    let a = Tensor::from_bool(Shape::from_slice(&[3]), &[true, false, true])?;
    let b = Tensor::from_bool(Shape::from_slice(&[3]), &[true, true, false])?;
    let out = xor.invoke(&[a, b])?;
    assert_eq!(out[0].to_bool_vec()?, vec![false, true, true]);
    Ok(())
}

#[test]
fn softmax_axis_semantics_change_at_opset_13() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let input = f32s(&[1, 2, 2], &[0.0, 0.0, 0.0, 0.0])?;

    // Opset 11, axis=1: one row of four elements.
    let mut legacy = build(&cpu, "Softmax", "", 11, &Attributes::new())?;
    assert_close(&legacy.invoke(&[input.clone()])?[0].to_f32_vec()?, &[0.25; 4]);

    // Opset 13, axis=-1: rows of two elements.
    let mut modern = build(&cpu, "Softmax", "", 13, &Attributes::new())?;
    assert_close(&modern.invoke(&[input.clone()])?[0].to_f32_vec()?, &[0.5; 4]);

    // Opset 13, axis=1 over a strided dimension.
    let mut attrs = Attributes::new();
    attrs.insert("axis", AttrValue::Int(1));
    let mut strided = build(&cpu, "Softmax", "", 13, &attrs)?;
    let input = f32s(&[1, 2, 2], &[0.0, 1.0, 0.0, 1.0])?;
    assert_close(&strided.invoke(&[input])?[0].to_f32_vec()?, &[0.5; 4]);
    Ok(())
}

#[test]
fn softmax_rejects_non_integer_axis() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut attrs = Attributes::new();
    attrs.insert("axis", AttrValue::String("last".to_string()));
    let err = build(&cpu, "Softmax", "", 13, &attrs)
        .err()
        .context("axis of the wrong type must fail")?;
    let err = err.downcast::<AttributeError>()?;
    assert!(matches!(err, AttributeError::WrongType { expected: "int", .. }));
    Ok(())
}

#[test]
fn gemm_applies_transpose_alpha_and_bias() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut attrs = Attributes::new();
    attrs.insert("transB", AttrValue::Int(1));
    attrs.insert("alpha", AttrValue::Float(2.0));
    let mut gemm = build(&cpu, "Gemm", "", 11, &attrs)?;

    let a = f32s(&[1, 2], &[1.0, 2.0])?;
    // B stored as [n, k] because of transB.
    let b = f32s(&[2, 2], &[1.0, 0.0, 0.0, 1.0])?;
    let c = f32s(&[2], &[0.5, -0.5])?;
    let out = gemm.invoke(&[a, b, c])?;
    assert_eq!(out[0].shape().dims(), &[1, 2]);
    assert_close(&out[0].to_f32_vec()?, &[2.5, 3.5]);
    Ok(())
}

#[test]
fn gemm_rejects_non_boolean_transpose_flag() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut attrs = Attributes::new();
    attrs.insert("transA", AttrValue::Int(2));
    let err = build(&cpu, "Gemm", "", 11, &attrs)
        .err()
        .context("transA=2 must fail")?;
    assert!(matches!(
        err.downcast::<AttributeError>()?,
        AttributeError::Invalid { .. }
    ));
    Ok(())
}

#[test]
fn matmul_batches_over_shared_rhs() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut matmul = build(&cpu, "MatMul", "", 13, &Attributes::new())?;
    let a = f32s(&[2, 1, 2], &[1.0, 2.0, 3.0, 4.0])?;
    let b = f32s(&[2, 1], &[1.0, 1.0])?;
    let out = matmul.invoke(&[a, b])?;
    assert_eq!(out[0].shape().dims(), &[2, 1, 1]);
    assert_close(&out[0].to_f32_vec()?, &[3.0, 7.0]);
    Ok(())
}

#[test]
fn flatten_and_sum() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut flatten = build(&cpu, "Flatten", "", 13, &Attributes::new())?;
    let out = flatten.invoke(&[f32s(&[2, 3, 4], &[0.0; 24])?])?;
    assert_eq!(out[0].shape().dims(), &[2, 12]);

    let mut sum = build(&cpu, "Sum", "", 13, &Attributes::new())?;
    let out = sum.invoke(&[
        f32s(&[2], &[1.0, 2.0])?,
        f32s(&[2], &[3.0, 4.0])?,
        f32s(&[1], &[0.5])?,
    ])?;
    assert_close(&out[0].to_f32_vec()?, &[4.5, 6.5]);
    Ok(())
}

#[test]
fn erf_and_gelu_match_reference_values() -> Result<()> {
    assert!((erf(0.0)).abs() < 1e-6);
    assert!((erf(1.0) - 0.842_700_8).abs() < 1e-5);
    assert!((erf(-1.0) + 0.842_700_8).abs() < 1e-5);

    let cpu = CpuBackend::new()?;
    let mut gelu = build(&cpu, "Gelu", CONTRIB_DOMAIN, 1, &Attributes::new())?;
    let out = gelu.invoke(&[f32s(&[2], &[0.0, 1.0])?])?;
    assert_close(&out[0].to_f32_vec()?, &[0.0, 0.841_344_7]);
    Ok(())
}

#[test]
fn invoking_before_initialize_fails() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let factory = cpu
        .catalog_for("")
        .and_then(|c| c.lookup("Relu", "", 13))
        .context("Relu")?;
    let mut relu = factory();
    assert!(relu.invoke(&[f32s(&[1], &[1.0])?]).is_err());
    Ok(())
}

#[test]
fn softmax_over_zero_sized_axis_is_empty() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let empty = f32s(&[2, 0], &[])?;
    assert!(f32s(&[2, 0], &[0.0]).is_err());

    for version in [11, 13] {
        let mut softmax = build(&cpu, "Softmax", "", version, &Attributes::new())?;
        let out = softmax.invoke(&[empty.clone()])?;
        assert_eq!(out[0].shape().dims(), &[2, 0]);
        assert!(out[0].to_f32_vec()?.is_empty());
    }

    let mut attrs = Attributes::new();
    attrs.insert("axis", AttrValue::Int(0));
    let mut softmax = build(&cpu, "Softmax", "", 13, &attrs)?;
    let out = softmax.invoke(&[f32s(&[0, 3], &[])?])?;
    assert_eq!(out[0].numel(), 0);
    Ok(())
}

#[test]
fn elementwise_ops_accept_empty_operands() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut add = build(&cpu, "Add", "", 13, &Attributes::new())?;
    let out = add.invoke(&[f32s(&[0, 3], &[])?, f32s(&[], &[1.0])?])?;
    assert_eq!(out[0].shape().dims(), &[0, 3]);
    assert_eq!(out[0].numel(), 0);

    assert!(add
        .invoke(&[f32s(&[0], &[])?, f32s(&[2], &[1.0, 2.0])?])
        .is_err());

    let mut sum = build(&cpu, "Sum", "", 13, &Attributes::new())?;
    let out = sum.invoke(&[f32s(&[1], &[4.0])?, f32s(&[0], &[])?])?;
    assert_eq!(out[0].shape().dims(), &[0]);
    Ok(())
}

#[test]
fn inference_handler_counts_invocations() -> Result<()> {
    let cpu = CpuBackend::new()?;
    let mut handler = CpuInferenceHandler::default();
    assert_eq!(handler.backend(), "cpu");

    let mut neg = build(&cpu, "Neg", "", 13, &Attributes::new())?;
    for _ in 0..3 {
        let out = handler.run(neg.as_mut(), &[f32s(&[2], &[1.0, -2.0])?])?;
        assert_close(&out[0].to_f32_vec()?, &[-1.0, 2.0]);
    }
    assert_eq!(handler.invocations(), 3);
    Ok(())
}
