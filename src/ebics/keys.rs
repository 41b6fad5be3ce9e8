//! On-disk persistence for the subscriber's own key set and the bank's
//! public key set (`spec.md` §3). Both files are JSON containing
//! base32-encoded DER, written mode 600, created with `O_CREAT|O_EXCL` then
//! renamed into place so a concurrent `ebics-setup` can't half-write them.

use std::fs;
use std::io;
use std::path::Path;

use data_encoding::BASE32;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::crypto::digest::ebics_pubkey_digest_hex;
use crate::crypto::keys::{
    load_rsa_private, load_rsa_public, private_to_pkcs8_der, public_to_spki_der, RsaKeyPair,
};
use crate::crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("key file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("key encoding error: {0}")]
    Encoding(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Serialize, Deserialize)]
struct RsaKeyPairFile {
    private_pkcs8_der_b32: String,
}

impl RsaKeyPairFile {
    fn from_pair(pair: &RsaKeyPair) -> Result<Self, KeyStoreError> {
        let der = private_to_pkcs8_der(&pair.private)?;
        Ok(Self { private_pkcs8_der_b32: BASE32.encode(&der) })
    }

    fn to_pair(&self) -> Result<RsaKeyPair, KeyStoreError> {
        let der = BASE32
            .decode(self.private_pkcs8_der_b32.as_bytes())
            .map_err(|e| KeyStoreError::Encoding(format!("bad base32: {e}")))?;
        let private = load_rsa_private(&der)?;
        let public = RsaPublicKey::from(&private);
        Ok(RsaKeyPair { private, public })
    }
}

#[derive(Serialize, Deserialize)]
struct SubscriberKeySetFile {
    signature: RsaKeyPairFile,
    authentication: RsaKeyPairFile,
    encryption: RsaKeyPairFile,
    submitted_ini: bool,
    submitted_hia: bool,
}

pub struct SubscriberKeySet {
    pub signature: RsaKeyPair,
    pub authentication: RsaKeyPair,
    pub encryption: RsaKeyPair,
    pub submitted_ini: bool,
    pub submitted_hia: bool,
}

impl SubscriberKeySet {
    /// Generates a fresh key set, as `ebics-setup` does on first run.
    pub fn generate(bits: usize) -> Result<SubscriberKeySet, KeyStoreError> {
        Ok(SubscriberKeySet {
            signature: crate::crypto::gen_rsa(bits)?,
            authentication: crate::crypto::gen_rsa(bits)?,
            encryption: crate::crypto::gen_rsa(bits)?,
            submitted_ini: false,
            submitted_hia: false,
        })
    }

    pub fn load(path: &Path) -> Result<SubscriberKeySet, KeyStoreError> {
        let raw = fs::read_to_string(path)?;
        let file: SubscriberKeySetFile =
            serde_json::from_str(&raw).map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        Ok(SubscriberKeySet {
            signature: file.signature.to_pair()?,
            authentication: file.authentication.to_pair()?,
            encryption: file.encryption.to_pair()?,
            submitted_ini: file.submitted_ini,
            submitted_hia: file.submitted_hia,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), KeyStoreError> {
        let file = SubscriberKeySetFile {
            signature: RsaKeyPairFile::from_pair(&self.signature)?,
            authentication: RsaKeyPairFile::from_pair(&self.authentication)?,
            encryption: RsaKeyPairFile::from_pair(&self.encryption)?,
            submitted_ini: self.submitted_ini,
            submitted_hia: self.submitted_hia,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        write_restricted(path, json.as_bytes())
    }
}

#[derive(Serialize, Deserialize)]
struct BankKeySetFile {
    authentication_spki_der_b32: String,
    encryption_spki_der_b32: String,
    accepted: bool,
}

pub struct BankKeySet {
    pub authentication: RsaPublicKey,
    pub encryption: RsaPublicKey,
    pub accepted: bool,
}

impl BankKeySet {
    pub fn new(authentication: RsaPublicKey, encryption: RsaPublicKey) -> BankKeySet {
        BankKeySet { authentication, encryption, accepted: false }
    }

    pub fn load(path: &Path) -> Result<BankKeySet, KeyStoreError> {
        let raw = fs::read_to_string(path)?;
        let file: BankKeySetFile =
            serde_json::from_str(&raw).map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        let auth_der = BASE32
            .decode(file.authentication_spki_der_b32.as_bytes())
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        let enc_der = BASE32
            .decode(file.encryption_spki_der_b32.as_bytes())
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        Ok(BankKeySet {
            authentication: load_rsa_public(&auth_der)?,
            encryption: load_rsa_public(&enc_der)?,
            accepted: file.accepted,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), KeyStoreError> {
        let file = BankKeySetFile {
            authentication_spki_der_b32: BASE32.encode(&public_to_spki_der(&self.authentication)?),
            encryption_spki_der_b32: BASE32.encode(&public_to_spki_der(&self.encryption)?),
            accepted: self.accepted,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        write_restricted(path, json.as_bytes())
    }

    /// The operator-facing fingerprints printed at the end of `ebics-setup`
    /// (spec.md S5): the operator compares these against the bank's key
    /// letter out of band before flipping `accepted` to true.
    pub fn fingerprints(&self) -> (String, String) {
        (ebics_pubkey_digest_hex(&self.authentication), ebics_pubkey_digest_hex(&self.encryption))
    }
}

#[cfg(unix)]
fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), KeyStoreError> {
    use std::os::unix::fs::OpenOptionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp_path)?;
    io::Write::write_all(&mut f, contents)?;
    f.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_restricted(path: &Path, contents: &[u8]) -> Result<(), KeyStoreError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn subscriber_key_set_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client_keys.json");

        let mut original = SubscriberKeySet::generate(2048).unwrap();
        original.submitted_ini = true;
        original.save(&path).unwrap();

        let loaded = SubscriberKeySet::load(&path).unwrap();
        assert!(loaded.submitted_ini);
        assert!(!loaded.submitted_hia);
        assert_eq!(
            crate::crypto::ebics_pubkey_digest_hex(&loaded.signature.public),
            crate::crypto::ebics_pubkey_digest_hex(&original.signature.public),
        );
    }

    #[test]
    fn bank_key_set_round_trips_and_starts_unaccepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank_keys.json");

        let auth = crate::crypto::gen_rsa(2048).unwrap();
        let enc = crate::crypto::gen_rsa(2048).unwrap();
        let bank_keys = BankKeySet::new(auth.public, enc.public);
        assert!(!bank_keys.accepted);
        bank_keys.save(&path).unwrap();

        let loaded = BankKeySet::load(&path).unwrap();
        assert!(!loaded.accepted);
    }
}
