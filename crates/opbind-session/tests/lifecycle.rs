use std::sync::Arc;

use anyhow::Result;
use opbind_backend_cpu::CpuBackend;
use opbind_backend_par::ParBackend;
use opbind_core::{AttrValue, Backend, GraphNode, Opset, Shape, Tensor};
use opbind_session::{
    BackendRegistry, Origin, RegistryError, ResolveError, SessionConfig, SessionError,
    SessionHandler, SessionState,
};

fn registry() -> Result<BackendRegistry> {
    Ok(BackendRegistry::builder()
        .register(Arc::new(ParBackend::with_threads(2)?))?
        .register(Arc::new(CpuBackend::new()?))?
        .build())
}

#[test]
fn registry_rejects_duplicate_names() -> Result<()> {
    let err = BackendRegistry::builder()
        .register(Arc::new(CpuBackend::new()?))?
        .register(Arc::new(CpuBackend::new()?))
        .err()
        .expect("duplicate");
    assert_eq!(
        err,
        RegistryError::DuplicateBackend {
            name: "cpu".to_string()
        }
    );

    let registry = registry()?;
    assert_eq!(registry.names(), vec!["cpu", "par"]);
    assert!(registry.contains("par"));
    assert!(registry.get("cuda").is_none());
    Ok(())
}

#[test]
fn unknown_backend_names_are_reported() -> Result<()> {
    let registry = registry()?;
    let err = SessionHandler::from_registry(
        &registry,
        "par",
        Some("cuda"),
        SessionConfig::new(Opset::onnx(13)),
    )
    .err()
    .expect("unknown fallback");
    assert!(matches!(err, SessionError::UnknownBackend { ref name } if name == "cuda"));
    Ok(())
}

#[test]
fn fallback_must_differ_from_primary() -> Result<()> {
    let cpu: Arc<dyn Backend> = Arc::new(CpuBackend::new()?);
    let err = SessionHandler::new(
        cpu.clone(),
        Some(cpu),
        SessionConfig::new(Opset::onnx(13)),
    )
    .err()
    .expect("same instance");
    assert!(matches!(err, SessionError::FallbackIsPrimary { .. }));

    // Two instances of the same backend type are fine.
    let other: Arc<dyn Backend> = Arc::new(CpuBackend::new()?);
    let cpu: Arc<dyn Backend> = Arc::new(CpuBackend::new()?);
    assert!(SessionHandler::new(cpu, Some(other), SessionConfig::new(Opset::onnx(13))).is_ok());
    Ok(())
}

#[test]
fn par_primary_falls_back_to_cpu_for_uncovered_ops() -> Result<()> {
    let registry = registry()?;
    let config = SessionConfig::new(Opset::onnx(11)).with_opset(Opset::new("com.microsoft", 1));
    let mut session = SessionHandler::from_registry(&registry, "par", Some("cpu"), config)?;

    let nodes = vec![
        GraphNode::new("MatMul").named("proj"),
        GraphNode::new("Softmax").named("attn"),
        GraphNode::new("Gelu").named("act").with_domain("com.microsoft"),
        GraphNode::new("Softmax").named("head").with_version(13),
    ];
    let ids = session.resolve_graph(&nodes)?;

    let summary = ids
        .iter()
        .map(|id| {
            let bound = session.kernel(*id).expect("bound");
            (bound.node().to_string(), bound.kind(), bound.origin())
        })
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            ("proj".to_string(), "par.MatMul", Origin::Primary),
            ("attn".to_string(), "cpu.Softmax", Origin::Fallback),
            ("act".to_string(), "cpu.Unary", Origin::Fallback),
            ("head".to_string(), "par.Softmax", Origin::Primary),
        ]
    );
    Ok(())
}

#[test]
fn primary_rejection_is_not_retried_on_fallback() -> Result<()> {
    let registry = registry()?;
    let mut session = SessionHandler::from_registry(
        &registry,
        "par",
        Some("cpu"),
        SessionConfig::new(Opset::onnx(13)),
    )?;
    // par registers Softmax-13 but only for the last axis; cpu would accept it.
    let node = GraphNode::new("Softmax").with_attr("axis", AttrValue::Int(0));
    let err = session.resolve(&node).unwrap_err();
    assert!(matches!(
        err,
        ResolveError::InvalidOperatorConfiguration { ref backend, .. } if backend == "par"
    ));
    Ok(())
}

#[test]
fn invoke_routes_through_the_serving_backend() -> Result<()> {
    let registry = registry()?;
    let mut session = SessionHandler::from_registry(
        &registry,
        "par",
        Some("cpu"),
        SessionConfig::new(Opset::onnx(13)),
    )?;

    let add = session.resolve(&GraphNode::new("Add"))?;
    let erf = session.resolve(&GraphNode::new("Erf"))?;

    let x = Tensor::from_f32(Shape::from_slice(&[2]), &[1.0, -2.0])?;
    let y = Tensor::from_f32(Shape::from_slice(&[2]), &[0.5, 0.5])?;
    let sum = session.invoke(add, &[x, y])?;
    assert_eq!(sum[0].to_f32_vec()?, vec![1.5, -1.5]);

    let out = session.invoke(erf, &[Tensor::from_f32(Shape::scalar(), &[0.0])?])?;
    assert!(out[0].to_f32_vec()?[0].abs() < 1e-6);

    let handler = session.create_inference_handler()?;
    assert_eq!(handler.backend(), "par");
    Ok(())
}

#[test]
fn dispose_releases_kernels_and_is_terminal() -> Result<()> {
    let registry = registry()?;
    let mut session = SessionHandler::from_registry(
        &registry,
        "cpu",
        None,
        SessionConfig::new(Opset::onnx(13)).with_fallback(false),
    )?;
    let id = session.resolve(&GraphNode::new("Relu"))?;
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.len(), 1);

    session.dispose();
    assert_eq!(session.state(), SessionState::Disposed);
    assert!(session.is_empty());
    assert!(session.kernel(id).is_none());

    // Idempotent.
    session.dispose();
    assert_eq!(session.state(), SessionState::Disposed);

    assert_eq!(
        session.resolve(&GraphNode::new("Relu")).unwrap_err(),
        ResolveError::SessionDisposed
    );
    assert!(matches!(
        session.invoke(id, &[]).unwrap_err(),
        SessionError::Disposed
    ));
    assert!(matches!(
        session.create_inference_handler().err(),
        Some(SessionError::Disposed)
    ));
    Ok(())
}

#[test]
fn invoke_with_unknown_id_fails() -> Result<()> {
    let registry = registry()?;
    let mut other = SessionHandler::from_registry(
        &registry,
        "cpu",
        None,
        SessionConfig::new(Opset::onnx(13)),
    )?;
    let id = other.resolve(&GraphNode::new("Relu"))?;

    let mut session = SessionHandler::from_registry(
        &registry,
        "cpu",
        None,
        SessionConfig::new(Opset::onnx(13)),
    )?;
    assert!(matches!(
        session.invoke(id, &[]).unwrap_err(),
        SessionError::UnknownKernel(0)
    ));
    Ok(())
}
