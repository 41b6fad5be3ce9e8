//! EBICS cryptographic primitives (C1): RSA key lifecycle, A006 signing,
//! E002 hybrid encryption, and the config-stored password hashing scheme.
//! EBICS pins these exactly (see `spec.md` §4.1) — this module intentionally
//! exposes only the specific primitives the protocol calls for, not a
//! general-purpose crypto API.

pub mod cipher;
pub mod digest;
pub mod error;
pub mod keys;
pub mod password;
pub mod sign;

pub use cipher::{e002_unwrap, e002_wrap, E002Envelope};
pub use digest::{ebics_order_digest, ebics_pubkey_digest, ebics_pubkey_digest_hex, sha256};
pub use error::CryptoError;
pub use keys::{gen_rsa, load_rsa_private, load_rsa_public, RsaKeyPair};
pub use password::{pw_hash, pw_verify};
pub use sign::{sign_a006, verify_a006};
