use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::error::CryptoError;

/// EBICS A006: RSA-PSS, SHA-256, MGF1-SHA256, salt length 32 (the SHA-256
/// digest length — `SigningKey::<Sha256>::new` defaults to this), trailer
/// byte `0xBC` (trailer field 1, implicit in the PSS encoding).
pub fn sign_a006(data: &[u8], priv_key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    if priv_key.size() * 8 < 2048 {
        return Err(CryptoError::Sign("key smaller than 2048 bits".to_string()));
    }

    let signing_key = SigningKey::<Sha256>::new(priv_key.clone());
    let mut rng = rand::rngs::OsRng;
    let signature = signing_key.try_sign_with_rng(&mut rng, data)
        .map_err(|e| CryptoError::Sign(e.to_string()))?;

    Ok(signature.to_vec())
}

pub fn verify_a006(sig: &[u8], data: &[u8], pub_key: &RsaPublicKey) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(pub_key.clone());
    let signature = match Signature::try_from(sig) {
        Ok(s) => s,
        Err(_) => return false,
    };
    verifying_key.verify(data, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::gen_rsa;

    #[test]
    fn round_trips() {
        let pair = gen_rsa(2048).unwrap();
        let data = b"order data to be signed";
        let sig = sign_a006(data, &pair.private).unwrap();
        assert!(verify_a006(&sig, data, &pair.public));
    }

    #[test]
    fn single_bit_flip_in_data_fails_verification() {
        let pair = gen_rsa(2048).unwrap();
        let data = b"order data to be signed".to_vec();
        let sig = sign_a006(&data, &pair.private).unwrap();

        let mut flipped = data.clone();
        flipped[0] ^= 0x01;
        assert!(!verify_a006(&sig, &flipped, &pair.public));
    }

    #[test]
    fn single_bit_flip_in_signature_fails_verification() {
        let pair = gen_rsa(2048).unwrap();
        let data = b"order data to be signed";
        let mut sig = sign_a006(data, &pair.private).unwrap();
        sig[0] ^= 0x01;
        assert!(!verify_a006(&sig, data, &pair.public));
    }

    #[test]
    fn verification_fails_against_wrong_key() {
        let pair_a = gen_rsa(2048).unwrap();
        let pair_b = gen_rsa(2048).unwrap();
        let data = b"order data to be signed";
        let sig = sign_a006(data, &pair_a.private).unwrap();
        assert!(!verify_a006(&sig, data, &pair_b.public));
    }
}
