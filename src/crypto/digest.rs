use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

/// Hex-encodes `bytes` in lowercase and strips leading zero *nibbles* (not
/// just zero bytes) — EBICS 2.5 §4.4.1.2.3 requires no leading zero nibble
/// in either the exponent or modulus hex string.
fn hex_trimmed(bytes: &[u8]) -> String {
    let hex = data_encoding::HEXLOWER.encode(bytes);
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
}

/// The EBICS subscriber-visible public key fingerprint: SHA-256 over
/// `hex(exponent) || ' ' || hex(modulus)`, both lowercase with leading zero
/// nibbles trimmed. Used for the INI/HIA key letter and HPB acceptance.
pub fn ebics_pubkey_digest(pub_key: &RsaPublicKey) -> [u8; 32] {
    let exponent_hex = hex_trimmed(&pub_key.e().to_bytes_be());
    let modulus_hex = hex_trimmed(&pub_key.n().to_bytes_be());
    let joined = format!("{exponent_hex} {modulus_hex}");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.finalize().into()
}

pub fn ebics_pubkey_digest_hex(pub_key: &RsaPublicKey) -> String {
    data_encoding::HEXLOWER.encode(&ebics_pubkey_digest(pub_key))
}

/// SHA-256 of `order_bytes` with every `0x0A`, `0x0D`, `0x1A` byte removed.
/// This is the input to `sign_a006` for uploads (§4.1) and is stable under
/// interspersed line-ending/EOF-marker noise (P8).
pub fn ebics_order_digest(order_bytes: &[u8]) -> [u8; 32] {
    let filtered: Vec<u8> = order_bytes
        .iter()
        .copied()
        .filter(|b| !matches!(b, 0x0A | 0x0D | 0x1A))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(&filtered);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::gen_rsa;

    #[test]
    fn order_digest_is_stable_under_interspersed_control_bytes() {
        let a = b"hello world this is order data";
        let mut b = Vec::new();
        for (i, byte) in a.iter().enumerate() {
            b.push(*byte);
            if i % 3 == 0 {
                b.push(0x0D);
                b.push(0x0A);
            }
        }
        b.push(0x1A);

        assert_eq!(ebics_order_digest(a), ebics_order_digest(&b));
    }

    #[test]
    fn order_digest_changes_on_real_content_change() {
        let a = ebics_order_digest(b"abc");
        let b = ebics_order_digest(b"abd");
        assert_ne!(a, b);
    }

    #[test]
    fn pubkey_digest_is_deterministic() {
        let pair = gen_rsa(2048).unwrap();
        let d1 = ebics_pubkey_digest(&pair.public);
        let d2 = ebics_pubkey_digest(&pair.public);
        assert_eq!(d1, d2);
    }

    #[test]
    fn hex_trimmed_strips_leading_zero_nibble_not_just_byte() {
        // 0x0A01 -> "0a01" -> trimmed -> "a01"
        assert_eq!(hex_trimmed(&[0x0A, 0x01]), "a01");
    }
}
