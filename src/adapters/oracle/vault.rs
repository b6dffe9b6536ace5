//! In-process store of sealed values for the local oracle and backend.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CiphertextHandle;

/// Shared handle -> plaintext table.
#[derive(Debug, Clone, Default)]
pub struct CiphertextVault {
    values: Arc<RwLock<HashMap<CiphertextHandle, u32>>>,
}

impl CiphertextVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under a fresh random handle.
    pub fn seal(&self, value: u32) -> CiphertextHandle {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        let handle = CiphertextHandle(bytes);

        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, value);
        handle
    }

    /// Plaintext behind `handle`, if it was sealed here.
    pub fn reveal(&self, handle: &CiphertextHandle) -> Option<u32> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .copied()
    }

    /// Reveal every handle in order, failing on the first unknown one.
    pub fn reveal_all(&self, handles: &[CiphertextHandle]) -> DomainResult<Vec<u32>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        handles
            .iter()
            .map(|handle| {
                values
                    .get(handle)
                    .copied()
                    .ok_or_else(|| DomainError::Oracle(format!("unknown ciphertext handle {handle}")))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
