use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

use super::error::CryptoError;

pub struct RsaKeyPair {
    pub private: RsaPrivateKey,
    pub public: RsaPublicKey,
}

/// Generates a fresh RSA key pair. EBICS mandates a minimum of 2048 bits;
/// callers must not request less.
pub fn gen_rsa(bits: usize) -> Result<RsaKeyPair, CryptoError> {
    if bits < 2048 {
        return Err(CryptoError::KeyGen(format!(
            "refusing to generate a {bits}-bit EBICS key, minimum is 2048"
        )));
    }

    let mut rng = rand::rngs::OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| CryptoError::KeyGen(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    Ok(RsaKeyPair { private, public })
}

/// Strict PKCS#8 DER parse of an RSA private key.
pub fn load_rsa_private(pkcs8_der: &[u8]) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs8_der(pkcs8_der)
        .map_err(|e| CryptoError::Encoding(format!("invalid PKCS#8 private key: {e}")))
}

/// Strict X.509 SubjectPublicKeyInfo DER parse of an RSA public key.
pub fn load_rsa_public(x509_spki_der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(x509_spki_der)
        .map_err(|e| CryptoError::Encoding(format!("invalid SPKI public key: {e}")))
}

pub fn private_to_pkcs8_der(key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    key.to_pkcs8_der()
        .map(|d| d.as_bytes().to_vec())
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

pub fn public_to_spki_der(key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    key.to_public_key_der()
        .map(|d| d.as_bytes().to_vec())
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

/// Legacy PKCS#1 parse, accepted because some bank HPB responses still ship
/// bare `RSAPublicKey` DER rather than full SPKI.
pub fn load_rsa_public_pkcs1(pkcs1_der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_der(pkcs1_der)
        .map_err(|e| CryptoError::Encoding(format!("invalid PKCS#1 public key: {e}")))
}

pub fn load_rsa_private_pkcs1(pkcs1_der: &[u8]) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_der(pkcs1_der)
        .map_err(|e| CryptoError::Encoding(format!("invalid PKCS#1 private key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_round_trips_through_der() {
        let pair = gen_rsa(2048).unwrap();
        let der = private_to_pkcs8_der(&pair.private).unwrap();
        let reloaded = load_rsa_private(&der).unwrap();
        assert_eq!(pair.private.to_pkcs8_der().unwrap().as_bytes(), reloaded.to_pkcs8_der().unwrap().as_bytes());
    }

    #[test]
    fn rejects_undersized_keys() {
        assert!(gen_rsa(1024).is_err());
    }
}
