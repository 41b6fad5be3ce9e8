use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::error::CryptoError;

const SALT_LEN: usize = 8;

/// Hashes a passphrase as `"sha256-salted$<base64 salt>$<base64 sha256(salt|pw)>"`.
pub fn pw_hash(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let digest = salted_digest(&salt, password);
    format!("sha256-salted${}${}", B64.encode(salt), B64.encode(digest))
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Verifies `password` against a stored hash produced by [`pw_hash`]. The
/// legacy unsalted `"sha256$<hash>"` form is accepted here for backward
/// compatibility with configs migrated from older deployments — whether
/// new deployments should still accept it is a config flag
/// (`nexus-httpd.accept_legacy_password_hash`), defaulting to accept.
pub fn pw_verify(password: &str, stored: &str, accept_legacy: bool) -> Result<bool, CryptoError> {
    if let Some(rest) = stored.strip_prefix("sha256-salted$") {
        let (salt_b64, hash_b64) = rest
            .split_once('$')
            .ok_or_else(|| CryptoError::Encoding("malformed salted password hash".to_string()))?;

        let salt = B64.decode(salt_b64)
            .map_err(|e| CryptoError::Encoding(format!("bad salt encoding: {e}")))?;
        let expected = B64.decode(hash_b64)
            .map_err(|e| CryptoError::Encoding(format!("bad hash encoding: {e}")))?;

        let actual = salted_digest(&salt, password);
        return Ok(constant_time_eq(&actual, &expected));
    }

    if accept_legacy {
        if let Some(hash_hex) = stored.strip_prefix("sha256$") {
            let mut hasher = Sha256::new();
            hasher.update(password.as_bytes());
            let actual: [u8; 32] = hasher.finalize().into();
            let actual_hex = data_encoding::HEXLOWER.encode(&actual);
            return Ok(constant_time_eq(actual_hex.as_bytes(), hash_hex.as_bytes()));
        }
    }

    Err(CryptoError::Encoding(format!(
        "unrecognised password storage form (legacy accepted: {accept_legacy})"
    )))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let stored = pw_hash("hunter2");
        assert!(pw_verify("hunter2", &stored, true).unwrap());
        assert!(!pw_verify("wrong", &stored, true).unwrap());
    }

    #[test]
    fn accepts_legacy_form_when_enabled() {
        let hash_hex = data_encoding::HEXLOWER.encode(&Sha256::digest(b"hunter2"));
        let stored = format!("sha256${hash_hex}");
        assert!(pw_verify("hunter2", &stored, true).unwrap());
    }

    #[test]
    fn rejects_legacy_form_when_disabled() {
        let hash_hex = data_encoding::HEXLOWER.encode(&Sha256::digest(b"hunter2"));
        let stored = format!("sha256${hash_hex}");
        assert!(pw_verify("hunter2", &stored, false).is_err());
    }
}
