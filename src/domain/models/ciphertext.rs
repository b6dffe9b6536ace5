//! Opaque ciphertext handles.
//!
//! The core never sees plaintext through these types. Arithmetic on the
//! underlying ciphertexts is delegated to a [`CiphertextBackend`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::CiphertextBackend;

/// Reference to an encrypted value held by an external encrypted-computation
/// library.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex characters.
    pub fn from_hex(s: &str) -> DomainResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| DomainError::SerializationError(format!("ciphertext handle: {e}")))?;
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            DomainError::SerializationError(format!(
                "ciphertext handle must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex digits are enough to tell handles apart in logs.
        write!(f, "CiphertextHandle({}…)", &self.to_hex()[..8])
    }
}

/// An encrypted value that may not have been set yet.
///
/// Supports only `add` and `is_initialized`; nothing else about the
/// ciphertext is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptedValue(Option<CiphertextHandle>);

impl EncryptedValue {
    pub const fn uninitialized() -> Self {
        Self(None)
    }

    pub const fn from_handle(handle: CiphertextHandle) -> Self {
        Self(Some(handle))
    }

    pub const fn is_initialized(&self) -> bool {
        self.0.is_some()
    }

    /// Handle of an initialized value.
    pub const fn handle(&self) -> Option<CiphertextHandle> {
        self.0
    }

    /// Returns the handle or fails with [`DomainError::UninitializedCiphertext`].
    pub fn require_handle(&self) -> DomainResult<CiphertextHandle> {
        self.0.ok_or(DomainError::UninitializedCiphertext)
    }

    /// Homomorphic addition through the configured backend.
    pub fn add(&self, other: &Self, backend: &dyn CiphertextBackend) -> DomainResult<Self> {
        let lhs = self.require_handle()?;
        let rhs = other.require_handle()?;
        backend.add(&lhs, &rhs).map(Self::from_handle)
    }
}

impl From<CiphertextHandle> for EncryptedValue {
    fn from(handle: CiphertextHandle) -> Self {
        Self::from_handle(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_hex_round_trip() {
        let handle = CiphertextHandle([0xab; 32]);
        let parsed = CiphertextHandle::from_hex(&handle.to_hex()).unwrap();
        assert_eq!(parsed, handle);
        assert!(handle.to_string().starts_with("0xabab"));
    }

    #[test]
    fn test_handle_rejects_wrong_length() {
        let result = CiphertextHandle::from_hex("abcd");
        assert!(matches!(result, Err(DomainError::SerializationError(_))));
    }

    #[test]
    fn test_uninitialized_value() {
        let value = EncryptedValue::uninitialized();
        assert!(!value.is_initialized());
        assert!(value.handle().is_none());
        assert!(matches!(
            value.require_handle(),
            Err(DomainError::UninitializedCiphertext)
        ));

        let set = EncryptedValue::from_handle(CiphertextHandle([1; 32]));
        assert!(set.is_initialized());
    }
}
