//! Port for arithmetic on ciphertext handles.

use crate::domain::errors::DomainResult;
use crate::domain::models::CiphertextHandle;

/// Encrypted arithmetic provided by an external library.
///
/// Implementations never expose plaintext through this interface.
pub trait CiphertextBackend: Send + Sync {
    /// Homomorphic addition of two ciphertexts.
    fn add(&self, lhs: &CiphertextHandle, rhs: &CiphertextHandle) -> DomainResult<CiphertextHandle>;

    /// Encrypt a 32-bit value.
    fn encrypt_u32(&self, value: u32) -> DomainResult<CiphertextHandle>;
}
