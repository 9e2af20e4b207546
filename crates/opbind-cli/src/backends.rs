use std::sync::Arc;

use anyhow::{Context, Result};
use opbind_backend_cpu::CpuBackend;
use opbind_backend_par::ParBackend;
use opbind_session::BackendRegistry;
use tracing::debug;

/// Builds every backend this binary ships with. Catalog conflicts surface
/// here, before any session exists.
pub fn bootstrap(par_threads: usize) -> Result<BackendRegistry> {
    let cpu = CpuBackend::new().context("failed to build cpu backend")?;
    let par = ParBackend::with_threads(par_threads).context("failed to build par backend")?;
    debug!(par_threads = par.threads(), "backends constructed");

    let registry = BackendRegistry::builder()
        .register(Arc::new(par))?
        .register(Arc::new(cpu))?
        .build();
    Ok(registry)
}
