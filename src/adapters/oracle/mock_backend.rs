//! Ciphertext backend over the local vault.

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CiphertextHandle;
use crate::domain::ports::CiphertextBackend;

use super::vault::CiphertextVault;

/// Plaintext-backed ciphertext arithmetic for local runs and tests.
#[derive(Debug, Clone)]
pub struct MockCiphertextBackend {
    vault: CiphertextVault,
}

impl MockCiphertextBackend {
    pub fn new(vault: CiphertextVault) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &CiphertextVault {
        &self.vault
    }

    fn value_of(&self, handle: &CiphertextHandle) -> DomainResult<u32> {
        self.vault
            .reveal(handle)
            .ok_or_else(|| DomainError::Backend(format!("unknown ciphertext handle {handle}")))
    }
}

impl CiphertextBackend for MockCiphertextBackend {
    fn add(&self, lhs: &CiphertextHandle, rhs: &CiphertextHandle) -> DomainResult<CiphertextHandle> {
        let sum = self.value_of(lhs)?.wrapping_add(self.value_of(rhs)?);
        Ok(self.vault.seal(sum))
    }

    fn encrypt_u32(&self, value: u32) -> DomainResult<CiphertextHandle> {
        Ok(self.vault.seal(value))
    }
}
