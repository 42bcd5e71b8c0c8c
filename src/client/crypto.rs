//! Boundary to the key-agreement and authenticated-encryption primitives
//!
//! The relay never sees plaintext. Endpoints plug in a concrete primitive
//! set (X25519 session keys plus an AEAD, for instance) through this trait.

use std::fmt;

use crate::error::Result;

pub struct KeyPair {
    pub public: Vec<u8>,
    pub secret: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Output of a single encryption: ciphertext plus the nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

pub trait KeyAgreement {
    fn generate_key_pair(&self) -> Result<KeyPair>;

    /// Both sides obtain the same key only when their `is_initiator` flags differ
    fn derive_shared_key(
        &self,
        own: &KeyPair,
        their_public: &[u8],
        is_initiator: bool,
    ) -> Result<Vec<u8>>;

    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<Sealed>;

    /// Fails with `DecryptionFailure` on tampering or a mismatched key
    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8], key: &[u8]) -> Result<Vec<u8>>;
}
