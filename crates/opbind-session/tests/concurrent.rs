use std::sync::Arc;

use anyhow::Result;
use opbind_backend_cpu::CpuBackend;
use opbind_backend_par::ParBackend;
use opbind_core::{Backend, GraphNode, Opset};
use opbind_session::{SessionConfig, SessionHandler};

#[tokio::test(flavor = "multi_thread")]
async fn sessions_share_backends_across_threads() -> Result<()> {
    let par: Arc<dyn Backend> = Arc::new(ParBackend::with_threads(2)?);
    let cpu: Arc<dyn Backend> = Arc::new(CpuBackend::new()?);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let (par, cpu) = (par.clone(), cpu.clone());
        tasks.push(tokio::task::spawn_blocking(move || -> Result<Vec<&'static str>> {
            let opset = if i % 2 == 0 { 11 } else { 13 };
            let mut session =
                SessionHandler::new(par, Some(cpu), SessionConfig::new(Opset::onnx(opset)))?;
            let nodes = ["Add", "Softmax", "MatMul", "Erf"].map(|op| GraphNode::new(op));
            let ids = session.resolve_graph(&nodes)?;
            Ok(ids
                .into_iter()
                .filter_map(|id| session.kernel(id).map(|k| k.kind()))
                .collect())
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let kinds = task.await??;
        let softmax = if i % 2 == 0 { "cpu.Softmax" } else { "par.Softmax" };
        assert_eq!(kinds, vec!["par.Binary", softmax, "par.MatMul", "cpu.Unary"]);
    }
    Ok(())
}
