//! The EBICS transaction state machine (`spec.md` §4.3): `INIT -> TRANSFER*
//! -> RECEIPT -> DONE`, with a `FAILED` sink reachable from any state. One
//! `EbicsSession` exists for the lifetime of a single upload or download.

use std::time::Duration;

use rand::RngCore;
use reqwest::Client;

use super::error::EbicsError;
use super::keys::{BankKeySet, SubscriberKeySet};
use super::orders::{download, upload, HostIdentity};
use super::segment::{inflate, join_base64};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Transfer,
    Receipt,
    Done,
    Failed,
}

pub struct EbicsSession<'a> {
    http: &'a Client,
    host_base_url: &'a str,
    identity: &'a HostIdentity,
    subscriber_keys: &'a SubscriberKeySet,
    bank_keys: &'a BankKeySet,
    state: SessionState,
}

/// Default total deadline for one EBICS HTTP round-trip, per `spec.md` §5.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

impl<'a> EbicsSession<'a> {
    pub fn new(
        http: &'a Client,
        host_base_url: &'a str,
        identity: &'a HostIdentity,
        subscriber_keys: &'a SubscriberKeySet,
        bank_keys: &'a BankKeySet,
    ) -> Self {
        EbicsSession { http, host_base_url, identity, subscriber_keys, bank_keys, state: SessionState::Init }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn random_nonce_hex() -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        data_encoding::HEXLOWER.encode(&bytes)
    }

    fn now_timestamp() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    async fn post(&self, request_xml: String) -> Result<String, EbicsError> {
        let response = tokio::time::timeout(DEFAULT_ATTEMPT_TIMEOUT, self.http.post(self.host_base_url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .body(request_xml)
            .send())
            .await
            .map_err(|_| EbicsError::Transport("request timed out".to_string()))?
            .map_err(|e| EbicsError::Transport(e.to_string()))?;

        response.text().await.map_err(|e| EbicsError::Transport(format!("failed to read response body: {e}")))
    }

    /// Drives the full CCT upload dialog: `INIT -> TRANSFER segments ->
    /// DONE`. Returns the bank-assigned order id (its `TransactionID`,
    /// which doubles as the audit key since no separate `OrderID` is always
    /// present in H004 responses).
    pub async fn upload_cct(&mut self, pain001_bytes: &[u8]) -> Result<String, EbicsError> {
        let envelope = upload::prepare_upload(pain001_bytes, &self.subscriber_keys.signature.private, &self.bank_keys.encryption)?;

        let init_request = upload::build_upload_init_request(
            self.identity,
            "CCT",
            &Self::random_nonce_hex(),
            &Self::now_timestamp(),
            &self.bank_keys.encryption,
            &envelope,
        );
        let signed = upload::sign_request(&init_request, &self.subscriber_keys.authentication.private)?;

        let response_xml = self.post(signed).await.inspect_err(|_| self.state = SessionState::Failed)?;
        let init_response = upload::parse_upload_init_response(&response_xml).inspect_err(|_| self.state = SessionState::Failed)?;
        self.state = SessionState::Transfer;

        for (index, segment) in envelope.segments.iter().enumerate().skip(1) {
            let is_last = index + 1 == envelope.segments.len();
            let transfer_request = upload::build_upload_transfer_request(
                self.identity,
                &Self::random_nonce_hex(),
                &Self::now_timestamp(),
                &init_response.transaction_id,
                index as u32 + 1,
                segment,
                is_last,
            );
            let signed = upload::sign_request(&transfer_request, &self.subscriber_keys.authentication.private)?;
            let response_xml = self.post(signed).await.inspect_err(|_| self.state = SessionState::Failed)?;
            upload::parse_upload_transfer_response(&response_xml).inspect_err(|_| self.state = SessionState::Failed)?;
        }

        self.state = SessionState::Done;
        Ok(init_response.transaction_id)
    }

    /// Drives the full download dialog for one order type over `[from, to]`,
    /// returning the decompressed order-data bytes.
    pub async fn fetch_order(
        &mut self,
        order_type: &str,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<u8>, EbicsError> {
        let init_request = download::build_download_init_request(self.identity, order_type, from, to, &Self::random_nonce_hex(), &Self::now_timestamp());
        let signed = upload::sign_request(&init_request, &self.subscriber_keys.authentication.private)?;

        let response_xml = self.post(signed).await.inspect_err(|_| self.state = SessionState::Failed)?;

        let init_response = match download::parse_download_init_response(&response_xml) {
            Ok(r) => r,
            // No data for the range is a normal, empty outcome for the fetch
            // loop, not a failure: the bank answered, it just has nothing.
            Err(EbicsError::Bank { is_fatal: false, .. }) => {
                self.state = SessionState::Done;
                return Ok(Vec::new());
            }
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };
        self.state = SessionState::Transfer;

        let mut segments = vec![init_response.first_segment.clone()];
        for segment_number in 2..=init_response.num_segments {
            let transfer_request = download::build_download_transfer_request(
                self.identity,
                &Self::random_nonce_hex(),
                &Self::now_timestamp(),
                &init_response.transaction_id,
                segment_number,
            );
            let signed = upload::sign_request(&transfer_request, &self.subscriber_keys.authentication.private)?;
            let response_xml = self.post(signed).await.inspect_err(|_| self.state = SessionState::Failed)?;
            let segment = download::parse_download_transfer_response(&response_xml).inspect_err(|_| self.state = SessionState::Failed)?;
            segments.push(segment);
        }

        self.state = SessionState::Receipt;
        let receipt_request = download::build_receipt_request(
            self.identity,
            &Self::random_nonce_hex(),
            &Self::now_timestamp(),
            &init_response.transaction_id,
            true,
        );
        let signed = upload::sign_request(&receipt_request, &self.subscriber_keys.authentication.private)?;
        let receipt_response = self.post(signed).await.inspect_err(|_| self.state = SessionState::Failed)?;
        download::parse_receipt_response(&receipt_response).inspect_err(|_| self.state = SessionState::Failed)?;

        self.state = SessionState::Done;

        let ciphertext = join_base64(&segments)?;
        let compressed = crate::crypto::e002_unwrap(&ciphertext, &init_response.transaction_key, &self.subscriber_keys.encryption.private)
            .map_err(|e| EbicsError::Protocol(format!("failed to decrypt order data: {e}")))?;
        inflate(&compressed)
    }
}
