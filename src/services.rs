//! Trait seams the CORE depends on but does not implement (spec §6, §Non-goals:
//! "ID generation", "password hashing", "encryption at rest" are all owned by
//! the service embedding this crate). Callers inject an implementation as
//! `Arc<dyn Trait + Send + Sync>`; the CORE never constructs one itself.

use std::fmt;

use async_trait::async_trait;

/// Produces the opaque identifiers assigned to new aggregates.
///
/// The CORE treats ids as opaque strings end to end — it never parses,
/// sorts, or derives anything from one.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Hashes and verifies credential material. Never called by the CORE
/// itself; exists so aggregates that accept a pre-hashed secret (spec §6)
/// can be exercised in tests without a real implementation on hand.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<Vec<u8>, PasswordHasherError>;
    async fn verify(&self, plaintext: &str, hash: &[u8]) -> Result<bool, PasswordHasherError>;
}

#[derive(Debug)]
pub struct PasswordHasherError(pub String);

impl fmt::Display for PasswordHasherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PasswordHasherError {}

/// Encrypts values at rest before they reach an event payload (spec §6,
/// e.g. MFA seeds). The CORE stores only the returned ciphertext.
#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptorError>;
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptorError>;
}

#[derive(Debug)]
pub struct EncryptorError(pub String);

impl fmt::Display for EncryptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EncryptorError {}
