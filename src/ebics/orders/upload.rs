//! CCT (credit-transfer) upload order composition (`spec.md` §4.3/§4.7):
//! `INIT` carries the encrypted order data (or its first segment), `TRANSFER`
//! carries the rest.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::crypto::{e002_wrap, ebics_order_digest, ebics_pubkey_digest, sign_a006};
use crate::ebics::error::EbicsError;
use crate::ebics::segment::{chunk_base64, deflate, MAX_SEGMENT_BYTES};
use crate::xml::{blank_auth_signature_value, el, to_xml_string, Element, ElementBuilder};

use super::{mutable_header, static_header, HostIdentity};

pub struct UploadEnvelope {
    pub segments: Vec<String>,
    pub transaction_key_b64: String,
    pub order_digest_signature_b64: String,
}

/// Encrypts and frames `pain001_bytes` for an upload, and produces the
/// electronic signature (ES) over the order digest, ready to embed in the
/// INIT request. Does not touch the network.
pub fn prepare_upload(
    pain001_bytes: &[u8],
    signature_priv: &RsaPrivateKey,
    bank_enc_pub: &RsaPublicKey,
) -> Result<UploadEnvelope, EbicsError> {
    let digest = ebics_order_digest(pain001_bytes);
    let signature = sign_a006(&digest, signature_priv)
        .map_err(|e| EbicsError::Protocol(format!("failed to sign order data: {e}")))?;

    let compressed = deflate(pain001_bytes);
    let envelope = e002_wrap(&compressed, bank_enc_pub)
        .map_err(|e| EbicsError::Protocol(format!("failed to encrypt order data: {e}")))?;

    Ok(UploadEnvelope {
        segments: chunk_base64(&envelope.ciphertext, MAX_SEGMENT_BYTES),
        transaction_key_b64: B64.encode(envelope.wrapped_key),
        order_digest_signature_b64: B64.encode(signature),
    })
}

fn order_details(order_type: &str) -> ElementBuilder {
    el("OrderDetails")
        .child(el("OrderType").text(order_type.to_string()))
        .child(el("OrderAttribute").text("DZHNN"))
}

/// Builds the unsigned INIT request; the caller must run
/// [`crate::xml::blank_auth_signature_value`] (a no-op here, it's already
/// blank) and then sign the serialised bytes to fill in `AuthSignature`.
pub fn build_upload_init_request(
    identity: &HostIdentity,
    order_type: &str,
    nonce_hex: &str,
    timestamp: &str,
    bank_enc_pub: &RsaPublicKey,
    envelope: &UploadEnvelope,
) -> String {
    let first_segment = envelope.segments.first().cloned().unwrap_or_default();
    let total_segments = envelope.segments.len() as u32;

    let static_h = static_header(identity, nonce_hex, timestamp)
        .child(order_details(order_type))
        .child(el("BankPubKeyDigests").child(
            el("Encryption")
                .attr("Version", "E002")
                .text(data_encoding::HEXLOWER.encode(&ebics_pubkey_digest(bank_enc_pub))),
        ))
        .child(el("NumSegments").text(total_segments.to_string()))
        .child(el("SecurityMedium").text("0000"));

    let header = el("header")
        .attr("authenticate", "true")
        .child(static_h)
        .child(mutable_header("Initialisation"));

    let body = el("body").child(
        el("DataTransfer")
            .child(
                el("DataEncryptionInfo")
                    .attr("authenticate", "true")
                    .child(
                        el("EncryptionPubKeyDigest")
                            .attr("Version", "E002")
                            .text(data_encoding::HEXLOWER.encode(&ebics_pubkey_digest(bank_enc_pub))),
                    )
                    .child(el("TransactionKey").text(envelope.transaction_key_b64.clone())),
            )
            .child(
                el("OrderData").text(first_segment),
            ),
    );

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(body);

    to_xml_string(doc)
}

pub fn build_upload_transfer_request(
    identity: &HostIdentity,
    nonce_hex: &str,
    timestamp: &str,
    transaction_id: &str,
    segment_number: u32,
    segment_data: &str,
    is_last_segment: bool,
) -> String {
    let static_h = static_header(identity, nonce_hex, timestamp)
        .child(el("TransactionID").text(transaction_id.to_string()));

    let header = el("header")
        .attr("authenticate", "true")
        .child(static_h)
        .child(
            mutable_header("Transfer")
                .child(el("SegmentNumber").attr("lastSegment", is_last_segment.to_string()).text(segment_number.to_string())),
        );

    let body = el("body").child(
        el("DataTransfer").child(el("OrderData").text(segment_data.to_string())),
    );

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(body);

    to_xml_string(doc)
}

/// Signs `request_xml` in place: blanks `AuthSignature/SignatureValue`
/// (already blank for freshly built requests, but idempotent), signs the
/// result, and splices the signature back in.
pub fn sign_request(request_xml: &str, authentication_priv: &RsaPrivateKey) -> Result<String, EbicsError> {
    let blanked = blank_auth_signature_value(request_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let signature = sign_a006(blanked.as_bytes(), authentication_priv)
        .map_err(|e| EbicsError::Protocol(format!("failed to sign request: {e}")))?;
    let signature_b64 = B64.encode(signature);

    let start = blanked
        .find("<SignatureValue>")
        .ok_or_else(|| EbicsError::Protocol("signed document missing SignatureValue".to_string()))?;
    let open_end = start + "<SignatureValue>".len();
    Ok(format!("{}{}{}", &blanked[..open_end], signature_b64, &blanked[open_end..]))
}

#[derive(Debug)]
pub struct InitResponse {
    pub transaction_id: String,
    pub num_segments: u32,
}

pub fn parse_upload_init_response(response_xml: &str) -> Result<InitResponse, EbicsError> {
    let root = Element::parse(response_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    check_return_code(&root)?;

    let header = root.require_child("header").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let static_h = header.require_child("static").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let transaction_id = static_h
        .require_text_child("TransactionID")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?;

    let num_segments = static_h
        .optional_text_child("NumSegments")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    Ok(InitResponse { transaction_id, num_segments })
}

pub fn parse_upload_transfer_response(response_xml: &str) -> Result<(), EbicsError> {
    let root = Element::parse(response_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    check_return_code(&root)
}

pub(crate) fn check_return_code(root: &Element) -> Result<(), EbicsError> {
    let body = root.require_child("body").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let rc = body
        .require_child("ReturnCode")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .text();

    if rc == "000000" {
        return Ok(());
    }
    Err(EbicsError::from_bank_code(rc.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::gen_rsa;

    fn identity() -> HostIdentity {
        HostIdentity {
            host_id: "HOST01".to_string(),
            user_id: "USER01".to_string(),
            partner_id: "PARTNER01".to_string(),
            system_id: None,
        }
    }

    #[test]
    fn prepares_and_signs_init_request() {
        let sig_key = gen_rsa(2048).unwrap();
        let auth_key = gen_rsa(2048).unwrap();
        let bank_enc = gen_rsa(2048).unwrap();

        let envelope = prepare_upload(b"<Document>pain.001</Document>", &sig_key.private, &bank_enc.public).unwrap();
        let request = build_upload_init_request(&identity(), "CCT", "abc123", "2024-01-15T10:00:00Z", &bank_enc.public, &envelope);

        let signed = sign_request(&request, &auth_key.private).unwrap();
        assert!(signed.contains("<SignatureValue>"));
        assert!(!signed.contains("<SignatureValue></SignatureValue>"));
    }

    #[test]
    fn parses_successful_init_response() {
        let xml = r#"<ebicsResponse><header><static><TransactionID>DEADBEEF</TransactionID><NumSegments>3</NumSegments></static></header><body><ReturnCode>000000</ReturnCode></body></ebicsResponse>"#;
        let resp = parse_upload_init_response(xml).unwrap();
        assert_eq!(resp.transaction_id, "DEADBEEF");
        assert_eq!(resp.num_segments, 3);
    }

    #[test]
    fn fatal_return_code_is_surfaced() {
        let xml = r#"<ebicsResponse><header><static><TransactionID>X</TransactionID></static></header><body><ReturnCode>090003</ReturnCode></body></ebicsResponse>"#;
        let err = parse_upload_init_response(xml).unwrap_err();
        assert!(err.is_fatal());
    }
}
