use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::cipher::block_padding::NoPadding;
use rand::RngCore;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use super::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const AES_KEY_LEN: usize = 16;
const ZERO_IV: [u8; 16] = [0u8; 16];

/// Pads `data` to a multiple of 16 bytes using ANSI X9.23: zero-filled,
/// with the final byte holding the pad length (1..=16; a full extra block
/// of padding is added when `data` is already block-aligned).
fn x923_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - (data.len() % 16);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(padded.len() + pad_len - 1, 0);
    padded.push(pad_len as u8);
    padded
}

fn x923_unpad(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let pad_len = *data
        .last()
        .ok_or_else(|| CryptoError::Decrypt("empty plaintext".to_string()))? as usize;

    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return Err(CryptoError::Decrypt("invalid X9.23 padding length".to_string()));
    }

    let body_len = data.len() - pad_len;
    let filler = &data[body_len..data.len() - 1];
    if filler.iter().any(|b| *b != 0) {
        return Err(CryptoError::Decrypt("invalid X9.23 padding bytes".to_string()));
    }

    Ok(data[..body_len].to_vec())
}

pub struct E002Envelope {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

/// EBICS E002: encrypts `plaintext` under a freshly generated AES-128 key in
/// CBC mode with a zero IV (acceptable here only because the key is fresh
/// per order, as EBICS requires) and wraps that key under `bank_enc_pub`
/// with RSA PKCS#1 v1.5.
pub fn e002_wrap(plaintext: &[u8], bank_enc_pub: &RsaPublicKey) -> Result<E002Envelope, CryptoError> {
    let mut key = [0u8; AES_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);

    let mut buf = x923_pad(plaintext);
    let buf_len = buf.len();
    let ciphertext = Aes128CbcEnc::new(&key.into(), &ZERO_IV.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, buf_len)
        .map_err(|e| CryptoError::Encoding(format!("AES encrypt failed: {e}")))?
        .to_vec();

    let mut rng = rand::rngs::OsRng;
    let wrapped_key = bank_enc_pub
        .encrypt(&mut rng, Pkcs1v15Encrypt, &key)
        .map_err(|e| CryptoError::Encoding(format!("RSA key wrap failed: {e}")))?;

    Ok(E002Envelope { ciphertext, wrapped_key })
}

/// Inverse of [`e002_wrap`].
pub fn e002_unwrap(
    ciphertext: &[u8],
    wrapped_key: &[u8],
    client_enc_priv: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let key_vec = client_enc_priv
        .decrypt(Pkcs1v15Encrypt, wrapped_key)
        .map_err(|e| CryptoError::Decrypt(format!("RSA key unwrap failed: {e}")))?;

    if key_vec.len() != AES_KEY_LEN {
        return Err(CryptoError::Decrypt("unwrapped key has wrong length".to_string()));
    }
    let mut key = [0u8; AES_KEY_LEN];
    key.copy_from_slice(&key_vec);

    if ciphertext.len() % 16 != 0 || ciphertext.is_empty() {
        return Err(CryptoError::Decrypt("ciphertext is not block-aligned".to_string()));
    }

    let mut buf = ciphertext.to_vec();
    let decrypted = Aes128CbcDec::new(&key.into(), &ZERO_IV.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| CryptoError::Decrypt(format!("AES decrypt failed: {e}")))?;

    x923_unpad(decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::gen_rsa;

    #[test]
    fn round_trips_arbitrary_length_payloads() {
        let pair = gen_rsa(2048).unwrap();
        for len in [0usize, 1, 15, 16, 17, 100, 1337] {
            let plain = vec![0xAB; len];
            let envelope = e002_wrap(&plain, &pair.public).unwrap();
            let decrypted = e002_unwrap(&envelope.ciphertext, &envelope.wrapped_key, &pair.private).unwrap();
            assert_eq!(decrypted, plain, "length {len} failed to round-trip");
        }
    }

    #[test]
    fn wrong_key_fails_to_unwrap() {
        let pair_a = gen_rsa(2048).unwrap();
        let pair_b = gen_rsa(2048).unwrap();
        let envelope = e002_wrap(b"secret order data", &pair_a.public).unwrap();
        assert!(e002_unwrap(&envelope.ciphertext, &envelope.wrapped_key, &pair_b.private).is_err());
    }

    #[test]
    fn x923_pad_unpad_round_trip() {
        for len in 0..40 {
            let data = vec![0x42; len];
            let padded = x923_pad(&data);
            assert_eq!(padded.len() % 16, 0);
            assert_eq!(x923_unpad(&padded).unwrap(), data);
        }
    }
}
