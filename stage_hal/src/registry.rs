//! Backend registry.
//!
//! Constructed at startup, populated via `register()`, and handed to the
//! binary by value. Carries no global state, so it is testable in isolation.

use std::collections::HashMap;

use crate::driver::{ControllerBackend, DeviceError};

/// Factory function type for creating backend instances.
pub type BackendFactory = fn() -> Box<dyn ControllerBackend>;

/// Registry of available controller backends.
pub struct BackendRegistry {
    factories: HashMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        if self.factories.contains_key(name) {
            panic!("backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a backend instance by name.
    ///
    /// # Errors
    /// Returns `DeviceError::Unreachable` if no backend with the given name
    /// is registered.
    pub fn create(&self, name: &str) -> Result<Box<dyn ControllerBackend>, DeviceError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| DeviceError::Unreachable(format!("unknown backend '{name}'")))?;
        Ok(factory())
    }

    /// List all registered backend names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
