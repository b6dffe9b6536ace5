//! Oracle decryption proofs and the digest they authenticate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::request::RequestToken;

/// Domain separation tag for decryption-response digests.
pub const DECRYPTION_DIGEST_DOMAIN: &[u8] = b"sealed-review/decryption-response/v1";

/// Opaque proof bytes delivered with a decryption response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecryptionProof(pub Vec<u8>);

impl DecryptionProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 over the domain tag, token, cleartext count and each cleartext as
/// big-endian u32. Position is part of the digest, so reordered cleartexts
/// do not verify.
pub fn decryption_digest(token: &RequestToken, cleartexts: &[u32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DECRYPTION_DIGEST_DOMAIN);
    hasher.update(token.as_bytes());
    hasher.update((cleartexts.len() as u64).to_be_bytes());
    for value in cleartexts {
        hasher.update(value.to_be_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_digest_binds_order_and_token() {
        let token = RequestToken(Uuid::new_v4());
        let other = RequestToken(Uuid::new_v4());

        let a = decryption_digest(&token, &[80, 1]);
        assert_eq!(a, decryption_digest(&token, &[80, 1]));
        assert_ne!(a, decryption_digest(&token, &[1, 80]));
        assert_ne!(a, decryption_digest(&other, &[80, 1]));
        assert_ne!(a, decryption_digest(&token, &[80, 1, 0]));
    }
}
