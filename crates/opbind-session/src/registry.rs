use std::collections::HashMap;
use std::sync::Arc;

use opbind_core::Backend;

use crate::RegistryError;

/// Process-wide, name-addressed backends. Populated once during bootstrap and
/// frozen by [`BackendRegistryBuilder::build`].
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.backends.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistryBuilder {
    pub fn register(mut self, backend: Arc<dyn Backend>) -> Result<Self, RegistryError> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(RegistryError::DuplicateBackend { name });
        }
        self.backends.insert(name, backend);
        Ok(self)
    }

    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}
