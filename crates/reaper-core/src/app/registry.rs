use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ReaperError;
use crate::ports::DeletionDriver;

/// Registry of deletion drivers (scheme -> driver).
///
/// Design:
/// - Built during initialization (mutable).
/// - Shared read-only by every worker afterwards, so no lock.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DeletionDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver under its own scheme. A second driver for the same
    /// scheme is a configuration error.
    pub fn register(&mut self, driver: Arc<dyn DeletionDriver>) -> Result<(), ReaperError> {
        let scheme = driver.scheme().to_ascii_lowercase();
        if self.drivers.contains_key(&scheme) {
            return Err(ReaperError::configuration(format!(
                "a driver for scheme '{scheme}' is already registered"
            )));
        }
        self.drivers.insert(scheme, driver);
        Ok(())
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn DeletionDriver>> {
        self.drivers.get(&scheme.to_ascii_lowercase())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.get(scheme).is_some()
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.drivers.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::impls::{InMemoryDriver, PosixDriver};

    #[test]
    fn drivers_are_found_by_scheme() {
        let mut reg = DriverRegistry::new();
        reg.register(Arc::new(PosixDriver::new())).unwrap();
        reg.register(Arc::new(InMemoryDriver::new("mem"))).unwrap();

        assert!(reg.contains("file"));
        assert!(reg.contains("MEM"));
        assert!(!reg.contains("davs"));
        assert_eq!(reg.schemes(), vec!["file".to_string(), "mem".to_string()]);
    }

    #[test]
    fn duplicate_scheme_is_rejected() {
        let mut reg = DriverRegistry::new();
        reg.register(Arc::new(InMemoryDriver::new("mem"))).unwrap();

        let err = reg
            .register(Arc::new(InMemoryDriver::new("mem")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("mem"));
        assert_eq!(reg.len(), 1);
    }
}
