//! EBICS client (C4): the high-level `setup`/`fetch`/`upload_cct`
//! operations `spec.md` §4.4 describes, each leaving persistent state
//! consistent on every exit path — durable writes only happen after the
//! bank acknowledges.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use reqwest::Client;

use super::error::EbicsError;
use super::keys::{BankKeySet, KeyStoreError, SubscriberKeySet};
use super::orders::{ini_hia_hpb, HostIdentity};
use super::session::EbicsSession;

#[derive(Debug, Clone)]
pub struct EbicsClientConfig {
    pub host_base_url: String,
    pub identity: HostIdentity,
    pub client_private_keys_file: PathBuf,
    pub bank_public_keys_file: PathBuf,
    pub rsa_bits: usize,
}

pub struct EbicsClient {
    http: Client,
    config: EbicsClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Ebics(#[from] EbicsError),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error("bank keys are not yet accepted by the operator; run ebics-setup and confirm the fingerprint")]
    BankKeysNotAccepted,
}

impl EbicsClient {
    pub fn new(config: EbicsClientConfig) -> Result<EbicsClient, ClientError> {
        let http = Client::builder()
            .timeout(super::session::DEFAULT_TOTAL_TIMEOUT)
            .user_agent(format!("libeufin-nexus/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client builder with only well-formed options never fails");
        Ok(EbicsClient { http, config })
    }

    fn load_or_generate_subscriber_keys(&self) -> Result<SubscriberKeySet, ClientError> {
        if self.config.client_private_keys_file.exists() {
            Ok(SubscriberKeySet::load(&self.config.client_private_keys_file)?)
        } else {
            let keys = SubscriberKeySet::generate(self.config.rsa_bits)?;
            keys.save(&self.config.client_private_keys_file)?;
            Ok(keys)
        }
    }

    /// Writes client keys if absent, submits INI/HIA if not yet submitted,
    /// fetches the bank's keys via HPB, and persists them `accepted: false`
    /// pending operator confirmation (`spec.md` S5).
    pub async fn setup(&self) -> Result<(String, String), ClientError> {
        let mut keys = self.load_or_generate_subscriber_keys()?;

        if !keys.submitted_ini {
            self.submit_ini(&keys).await?;
            keys.submitted_ini = true;
            keys.save(&self.config.client_private_keys_file)?;
        }

        if !keys.submitted_hia {
            self.submit_hia(&keys).await?;
            keys.submitted_hia = true;
            keys.save(&self.config.client_private_keys_file)?;
        }

        let (auth_pub, enc_pub) = self.fetch_hpb(&keys).await?;
        let bank_keys = BankKeySet::new(auth_pub, enc_pub);
        let fingerprints = bank_keys.fingerprints();
        bank_keys.save(&self.config.bank_public_keys_file)?;

        Ok(fingerprints)
    }

    async fn submit_ini(&self, keys: &SubscriberKeySet) -> Result<(), ClientError> {
        let order_data = ini_hia_hpb::build_ini_order_data(&self.config.identity, &keys.signature.public);
        self.submit_key_management_order("INI", order_data.as_bytes(), keys).await
    }

    async fn submit_hia(&self, keys: &SubscriberKeySet) -> Result<(), ClientError> {
        let order_data = ini_hia_hpb::build_hia_order_data(&self.config.identity, &keys.authentication.public, &keys.encryption.public);
        self.submit_key_management_order("HIA", order_data.as_bytes(), keys).await
    }

    /// INI/HIA are unencrypted, unsigned key-management uploads (the
    /// subscriber has no accepted bank key yet to encrypt under, and no
    /// electronic signature key the bank has accepted yet either) — they
    /// carry the order data directly in a single-segment request.
    async fn submit_key_management_order(&self, order_type: &str, order_data: &[u8], _keys: &SubscriberKeySet) -> Result<(), ClientError> {
        let compressed = super::segment::deflate(order_data);
        let segment = super::segment::chunk_base64(&compressed, super::segment::MAX_SEGMENT_BYTES)
            .into_iter()
            .next()
            .unwrap_or_default();

        let request = build_key_management_request(&self.config.identity, order_type, &segment);

        let response = self
            .http
            .post(&self.config.host_base_url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .body(request)
            .send()
            .await
            .map_err(|e| EbicsError::Transport(e.to_string()))?
            .text()
            .await
            .map_err(|e| EbicsError::Transport(e.to_string()))?;

        let root = crate::xml::Element::parse(&response).map_err(|e| EbicsError::Protocol(e.to_string()))?;
        super::orders::upload::check_return_code(&root)?;
        Ok(())
    }

    async fn fetch_hpb(&self, keys: &SubscriberKeySet) -> Result<(rsa::RsaPublicKey, rsa::RsaPublicKey), ClientError> {
        let request = build_key_management_request(&self.config.identity, "HPB", "");
        let signed = super::orders::upload::sign_request(&request, &keys.authentication.private)?;

        let response = self
            .http
            .post(&self.config.host_base_url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .body(signed)
            .send()
            .await
            .map_err(|e| EbicsError::Transport(e.to_string()))?
            .text()
            .await
            .map_err(|e| EbicsError::Transport(e.to_string()))?;

        let root = crate::xml::Element::parse(&response).map_err(|e| EbicsError::Protocol(e.to_string()))?;
        super::orders::upload::check_return_code(&root)?;

        let order_data_b64 = root
            .require_child("body")
            .and_then(|b| b.require_child("DataTransfer"))
            .and_then(|d| d.require_child("OrderData"))
            .map_err(|e| EbicsError::Protocol(e.to_string()))?
            .text();

        let compressed = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, order_data_b64)
            .map_err(|e| EbicsError::Protocol(format!("invalid HPB order data encoding: {e}")))?;
        let order_data = super::segment::inflate(&compressed)?;

        ini_hia_hpb::parse_hpb_order_data(&order_data).map_err(Into::into)
    }

    pub async fn load_bank_keys(&self) -> Result<BankKeySet, ClientError> {
        let keys = BankKeySet::load(&self.config.bank_public_keys_file)?;
        if !keys.accepted {
            return Err(ClientError::BankKeysNotAccepted);
        }
        Ok(keys)
    }

    /// Uploads a pain.001 document as a CCT order, returning the
    /// bank-assigned transaction id for audit.
    pub async fn upload_cct(&self, pain001_bytes: &[u8]) -> Result<String, ClientError> {
        let subscriber_keys = SubscriberKeySet::load(&self.config.client_private_keys_file)?;
        let bank_keys = self.load_bank_keys().await?;

        let mut session = EbicsSession::new(&self.http, &self.config.host_base_url, &self.config.identity, &subscriber_keys, &bank_keys);
        session.upload_cct(pain001_bytes).await.map_err(Into::into)
    }

    /// Downloads the documents for one order type over `[from, to]`.
    /// Returns `None` when the bank reports no data for the range.
    pub async fn fetch(&self, order_type: &str, from: NaiveDate, to: NaiveDate) -> Result<Option<Vec<u8>>, ClientError> {
        let subscriber_keys = SubscriberKeySet::load(&self.config.client_private_keys_file)?;
        let bank_keys = self.load_bank_keys().await?;

        let mut session = EbicsSession::new(&self.http, &self.config.host_base_url, &self.config.identity, &subscriber_keys, &bank_keys);
        let bytes = session.fetch_order(order_type, from, to).await?;
        Ok(if bytes.is_empty() { None } else { Some(bytes) })
    }
}

fn build_key_management_request(identity: &HostIdentity, order_type: &str, order_data_segment: &str) -> String {
    use crate::xml::{el, to_xml_string};

    let static_h = el("static")
        .child(el("HostID").text(identity.host_id.clone()))
        .child(el("PartnerID").text(identity.partner_id.clone()))
        .child(el("UserID").text(identity.user_id.clone()))
        .child(
            el("OrderDetails")
                .child(el("OrderType").text(order_type.to_string()))
                .child(el("OrderAttribute").text("DZNNN")),
        )
        .child(el("SecurityMedium").text("0000"));

    let header = el("header")
        .attr("authenticate", "true")
        .child(static_h)
        .child(el("mutable").child(el("TransactionPhase").text("Initialisation")));

    let body = if order_data_segment.is_empty() {
        el("body")
    } else {
        el("body").child(el("DataTransfer").child(el("OrderData").text(order_data_segment.to_string())))
    };

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(body);

    to_xml_string(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> HostIdentity {
        HostIdentity { host_id: "HOST01".to_string(), user_id: "USER01".to_string(), partner_id: "PARTNER01".to_string(), system_id: None }
    }

    #[test]
    fn builds_key_management_request_without_order_data() {
        let xml = build_key_management_request(&identity(), "HPB", "");
        assert!(xml.contains("<OrderType>HPB</OrderType>"));
        assert!(!xml.contains("<DataTransfer>"));
    }

    #[test]
    fn builds_key_management_request_with_order_data() {
        let xml = build_key_management_request(&identity(), "INI", "c2VnbWVudA==");
        assert!(xml.contains("<OrderData>c2VnbWVudA==</OrderData>"));
    }
}
