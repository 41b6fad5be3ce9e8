use thiserror::Error;

/// Errors from the EBICS cryptographic primitives (C1).
///
/// Every variant is fatal to the operation that raised it — none of these
/// are retried, per `spec.md` §7.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("key/data encoding error: {0}")]
    Encoding(String),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("signature verification failed")]
    Verify,

    #[error("decryption failed: {0}")]
    Decrypt(String),
}
