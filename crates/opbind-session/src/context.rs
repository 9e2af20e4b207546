use std::sync::Arc;

use opbind_core::{Backend, Opset, OpsetImports};

use crate::SessionError;

/// Externally supplied session configuration.
///
/// The opset for the standard domain is required; graphs using other domains
/// add imports with [`SessionConfig::with_opset`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub opsets: OpsetImports,
    pub fallback_enabled: bool,
}

impl SessionConfig {
    pub fn new(opset: Opset) -> Self {
        let mut opsets = OpsetImports::new();
        opsets.insert(opset);
        Self {
            opsets,
            fallback_enabled: true,
        }
    }

    pub fn with_opset(mut self, opset: Opset) -> Self {
        self.opsets.insert(opset);
        self
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }
}

/// Backends and configuration bound to one session.
pub struct SessionContext {
    primary: Arc<dyn Backend>,
    fallback: Option<Arc<dyn Backend>>,
    config: SessionConfig,
}

impl SessionContext {
    pub fn new(
        primary: Arc<dyn Backend>,
        fallback: Option<Arc<dyn Backend>>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if let Some(fallback) = &fallback {
            if Arc::ptr_eq(&primary, fallback) {
                return Err(SessionError::FallbackIsPrimary {
                    name: fallback.name().to_string(),
                });
            }
        }
        Ok(Self {
            primary,
            fallback,
            config,
        })
    }

    pub fn primary(&self) -> &Arc<dyn Backend> {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&Arc<dyn Backend>> {
        self.fallback.as_ref()
    }

    /// The fallback backend if one is configured and enabled.
    pub fn active_fallback(&self) -> Option<&Arc<dyn Backend>> {
        if self.config.fallback_enabled {
            self.fallback.as_ref()
        } else {
            None
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
