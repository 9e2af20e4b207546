//! Dispatch policy: binds graph nodes to initialized kernels.
//!
//! The primary backend is always consulted first. The fallback backend is
//! consulted only when the primary has no catalog entry for the node's exact
//! identity and the session has fallback enabled. Kernel initialization
//! failures are never retried on another backend.

use std::fmt;
use std::sync::Arc;

use opbind_core::{
    normalize_domain, Backend, GraphNode, InferenceHandler, Kernel, KernelFactory,
    OperatorIdentity, Tensor, DEFAULT_DOMAIN,
};
use tracing::{debug, info, warn};

use crate::{BackendRegistry, ResolveError, SessionConfig, SessionContext, SessionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Primary,
    Fallback,
}

impl Origin {
    fn slot(self) -> usize {
        match self {
            Origin::Primary => 0,
            Origin::Fallback => 1,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Primary => f.write_str("primary"),
            Origin::Fallback => f.write_str("fallback"),
        }
    }
}

/// Index of a kernel owned by a [`SessionHandler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelId(usize);

impl KernelId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An initialized kernel and where it came from.
pub struct BoundKernel {
    node: String,
    identity: OperatorIdentity,
    backend: String,
    origin: Origin,
    kernel: Box<dyn Kernel>,
}

impl BoundKernel {
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn identity(&self) -> &OperatorIdentity {
        &self.identity
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn kind(&self) -> &'static str {
        self.kernel.kind()
    }

    pub fn kernel_mut(&mut self) -> &mut dyn Kernel {
        self.kernel.as_mut()
    }
}

impl fmt::Debug for BoundKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundKernel")
            .field("node", &self.node)
            .field("identity", &self.identity)
            .field("backend", &self.backend)
            .field("origin", &self.origin)
            .field("kind", &self.kind())
            .finish()
    }
}

fn lookup<'b>(backend: &'b Arc<dyn Backend>, id: &OperatorIdentity) -> Option<&'b KernelFactory> {
    backend
        .catalog_for(&id.domain)?
        .lookup(&id.op_type, &id.domain, id.version)
}

pub struct SessionHandler {
    context: SessionContext,
    state: SessionState,
    kernels: Vec<BoundKernel>,
    // Lazily created per origin, indexed by `Origin::slot`.
    handlers: [Option<Box<dyn InferenceHandler>>; 2],
}

impl SessionHandler {
    pub fn new(
        primary: Arc<dyn Backend>,
        fallback: Option<Arc<dyn Backend>>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        Ok(Self::with_context(SessionContext::new(
            primary, fallback, config,
        )?))
    }

    pub fn from_registry(
        registry: &BackendRegistry,
        primary: &str,
        fallback: Option<&str>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let find = |name: &str| {
            registry
                .get(name)
                .cloned()
                .ok_or_else(|| SessionError::UnknownBackend {
                    name: name.to_string(),
                })
        };
        let primary = find(primary)?;
        let fallback = fallback.map(find).transpose()?;
        Self::new(primary, fallback, config)
    }

    pub fn with_context(context: SessionContext) -> Self {
        if context.config().fallback_enabled && context.fallback().is_none() {
            warn!(
                primary = context.primary().name(),
                "fallback enabled but no fallback backend configured"
            );
        }
        info!(
            primary = context.primary().name(),
            fallback = context.active_fallback().map(|b| b.name()),
            "session created"
        );
        Self {
            context,
            state: SessionState::Active,
            kernels: Vec::new(),
            handlers: [None, None],
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// The identity a node resolves under: its own domain (standard domain by
    /// default) and either its version override or the session's import for
    /// that domain.
    pub fn identity_of(&self, node: &GraphNode) -> Result<OperatorIdentity, ResolveError> {
        let domain = node.domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
        let version = match node.version {
            Some(version) => version,
            None => self
                .context
                .config()
                .opsets
                .version_for(domain)
                .ok_or_else(|| ResolveError::MissingOpsetImport {
                    op_type: node.op_type.clone(),
                    domain: normalize_domain(domain).to_string(),
                })?,
        };
        Ok(OperatorIdentity::new(node.op_type.clone(), domain, version))
    }

    pub fn resolve(&mut self, node: &GraphNode) -> Result<KernelId, ResolveError> {
        if self.state == SessionState::Disposed {
            return Err(ResolveError::SessionDisposed);
        }
        let identity = self.identity_of(node)?;

        let primary = self.context.primary();
        let (mut kernel, backend, origin) = if let Some(factory) = lookup(primary, &identity) {
            (factory(), primary.name().to_string(), Origin::Primary)
        } else if let Some((factory, fallback)) = self
            .context
            .active_fallback()
            .and_then(|b| lookup(b, &identity).map(|f| (f, b)))
        {
            warn!(
                node = %node.name,
                op = %identity,
                backend = fallback.name(),
                "operator served by fallback backend"
            );
            (factory(), fallback.name().to_string(), Origin::Fallback)
        } else {
            return Err(ResolveError::UnsupportedOperator {
                op_type: identity.op_type,
                domain: identity.domain,
                version: identity.version,
            });
        };

        kernel
            .initialize(&node.attributes)
            .map_err(|source| ResolveError::InvalidOperatorConfiguration {
                op_type: identity.op_type.clone(),
                backend: backend.clone(),
                source,
            })?;

        debug!(
            node = %node.name,
            op = %identity,
            backend = %backend,
            %origin,
            kind = kernel.kind(),
            "resolved"
        );

        let id = KernelId(self.kernels.len());
        self.kernels.push(BoundKernel {
            node: node.name.clone(),
            identity,
            backend,
            origin,
            kernel,
        });
        Ok(id)
    }

    /// Resolves nodes in order, stopping at the first failure.
    pub fn resolve_graph<'a, I>(&mut self, nodes: I) -> Result<Vec<KernelId>, ResolveError>
    where
        I: IntoIterator<Item = &'a GraphNode>,
    {
        nodes.into_iter().map(|node| self.resolve(node)).collect()
    }

    pub fn kernel(&self, id: KernelId) -> Option<&BoundKernel> {
        self.kernels.get(id.0)
    }

    pub fn kernel_mut(&mut self, id: KernelId) -> Option<&mut BoundKernel> {
        self.kernels.get_mut(id.0)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (KernelId, &BoundKernel)> {
        self.kernels
            .iter()
            .enumerate()
            .map(|(i, bound)| (KernelId(i), bound))
    }

    /// Delegates to the primary backend.
    pub fn create_inference_handler(&self) -> Result<Box<dyn InferenceHandler>, SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        Ok(self.context.primary().create_inference_handler()?)
    }

    /// Runs a bound kernel through the inference handler of the backend that
    /// produced it.
    pub fn invoke(&mut self, id: KernelId, inputs: &[Tensor]) -> Result<Vec<Tensor>, SessionError> {
        if self.state == SessionState::Disposed {
            return Err(SessionError::Disposed);
        }
        let bound = self
            .kernels
            .get_mut(id.0)
            .ok_or(SessionError::UnknownKernel(id.0))?;

        let slot = &mut self.handlers[bound.origin.slot()];
        let handler = match slot {
            Some(handler) => handler,
            None => {
                let backend = match bound.origin {
                    Origin::Primary => self.context.primary(),
                    Origin::Fallback => self.context.fallback().ok_or_else(|| {
                        SessionError::UnknownBackend {
                            name: bound.backend.clone(),
                        }
                    })?,
                };
                slot.insert(backend.create_inference_handler()?)
            }
        };
        Ok(handler.run(bound.kernel.as_mut(), inputs)?)
    }

    /// Releases every kernel. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        let released = self.kernels.len();
        self.kernels.clear();
        self.handlers = [None, None];
        self.state = SessionState::Disposed;
        info!(released, "session disposed");
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        self.dispose();
    }
}
