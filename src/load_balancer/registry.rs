//! Backend registry.
//!
//! # Responsibilities
//! - Hold the ordered, immutable list of backend descriptors
//! - Guarantee position `i` holds the descriptor with `index == i`, which is
//!   what ties worker `i` to `descriptors[i]`

use thiserror::Error;

use crate::load_balancer::backend::BackendDescriptor;

/// Error type for registry construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("backend list is empty")]
    Empty,

    #[error("backend at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: usize },
}

/// Read-only set of backends, shared via `Arc` after startup.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    /// Build the registry. Fails on an empty list.
    pub fn new(backends: Vec<BackendDescriptor>) -> Result<Self, RegistryError> {
        if backends.is_empty() {
            return Err(RegistryError::Empty);
        }
        for (position, backend) in backends.iter().enumerate() {
            if backend.index != position {
                return Err(RegistryError::IndexMismatch {
                    position,
                    index: backend.index,
                });
            }
        }
        Ok(Self { backends })
    }

    /// All backends in config order.
    pub fn list(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    pub fn count(&self) -> usize {
        self.backends.len()
    }

    pub fn get(&self, index: usize) -> Option<&BackendDescriptor> {
        self.backends.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::test_descriptor;

    #[test]
    fn rejects_empty_list() {
        assert_eq!(BackendRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn preserves_order() {
        let registry = BackendRegistry::new(vec![
            test_descriptor(0, 10801),
            test_descriptor(1, 10802),
            test_descriptor(2, 10803),
        ])
        .unwrap();

        assert_eq!(registry.count(), 3);
        let ports: Vec<u16> = registry.list().iter().map(|b| b.local_port).collect();
        assert_eq!(ports, vec![10801, 10802, 10803]);
        assert_eq!(registry.get(1).map(|b| b.local_port), Some(10802));
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn rejects_out_of_order_indices() {
        let err = BackendRegistry::new(vec![test_descriptor(1, 10801)]).unwrap_err();
        assert_eq!(err, RegistryError::IndexMismatch { position: 0, index: 1 });
    }
}
