//! C52/C53/C54 (and the PostFinance Z01/Z53/Z54, BTF for EBICS 3.0) download
//! order composition (`spec.md` §4.3/§4.8). Download is the mirror image of
//! upload: `INIT` returns the transaction key and first segment, `TRANSFER`
//! fetches the rest, and a final `Receipt` phase acknowledges delivery.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::NaiveDate;

use crate::ebics::error::EbicsError;
use crate::xml::{el, to_xml_string, Element, ElementBuilder};

use super::upload::check_return_code;
use super::{mutable_header, static_header, HostIdentity};

fn order_details(order_type: &str, from: NaiveDate, to: NaiveDate) -> ElementBuilder {
    el("OrderDetails")
        .child(el("OrderType").text(order_type.to_string()))
        .child(el("OrderAttribute").text("DZHNN"))
        .child(
            el("OrderParams").child(
                el("DateRange")
                    .child(el("Start").text(from.format("%Y-%m-%d").to_string()))
                    .child(el("End").text(to.format("%Y-%m-%d").to_string())),
            ),
        )
}

pub fn build_download_init_request(
    identity: &HostIdentity,
    order_type: &str,
    from: NaiveDate,
    to: NaiveDate,
    nonce_hex: &str,
    timestamp: &str,
) -> String {
    let static_h = static_header(identity, nonce_hex, timestamp)
        .child(order_details(order_type, from, to))
        .child(el("SecurityMedium").text("0000"));

    let header = el("header").attr("authenticate", "true").child(static_h).child(mutable_header("Initialisation"));

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(el("body"));

    to_xml_string(doc)
}

pub fn build_download_transfer_request(
    identity: &HostIdentity,
    nonce_hex: &str,
    timestamp: &str,
    transaction_id: &str,
    segment_number: u32,
) -> String {
    let static_h = static_header(identity, nonce_hex, timestamp).child(el("TransactionID").text(transaction_id.to_string()));

    let header = el("header").attr("authenticate", "true").child(static_h).child(
        mutable_header("Transfer").child(el("SegmentNumber").text(segment_number.to_string())),
    );

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(el("body"));

    to_xml_string(doc)
}

pub fn build_receipt_request(
    identity: &HostIdentity,
    nonce_hex: &str,
    timestamp: &str,
    transaction_id: &str,
    receipt_code_positive: bool,
) -> String {
    let static_h = static_header(identity, nonce_hex, timestamp).child(el("TransactionID").text(transaction_id.to_string()));

    let receipt_code = if receipt_code_positive { "0" } else { "1" };
    let header = el("header")
        .attr("authenticate", "true")
        .child(static_h)
        .child(mutable_header("Receipt"));

    let body = el("body").child(el("TransferReceipt").attr("authenticate", "true").child(el("ReceiptCode").text(receipt_code.to_string())));

    let doc = el("ebicsRequest")
        .attr("Version", "H004")
        .attr("Revision", "1")
        .child(header)
        .child(el("AuthSignature").child(el("SignatureValue")))
        .child(body);

    to_xml_string(doc)
}

#[derive(Debug)]
pub struct DownloadInitResponse {
    pub transaction_id: String,
    pub num_segments: u32,
    pub transaction_key: Vec<u8>,
    pub first_segment: String,
}

pub fn parse_download_init_response(response_xml: &str) -> Result<DownloadInitResponse, EbicsError> {
    let root = Element::parse(response_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    check_return_code(&root)?;

    let header = root.require_child("header").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let static_h = header.require_child("static").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let transaction_id = static_h.require_text_child("TransactionID").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let num_segments = static_h
        .optional_text_child("NumSegments")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let body = root.require_child("body").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let data_transfer = body.require_child("DataTransfer").map_err(|e| EbicsError::Protocol(e.to_string()))?;

    let transaction_key_b64 = data_transfer
        .require_child("DataEncryptionInfo")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .require_text_child("TransactionKey")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let transaction_key = B64
        .decode(transaction_key_b64.as_bytes())
        .map_err(|e| EbicsError::Protocol(format!("invalid transaction key encoding: {e}")))?;

    let first_segment = data_transfer
        .require_child("OrderData")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .text()
        .to_string();

    Ok(DownloadInitResponse { transaction_id, num_segments, transaction_key, first_segment })
}

pub fn parse_download_transfer_response(response_xml: &str) -> Result<String, EbicsError> {
    let root = Element::parse(response_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    check_return_code(&root)?;

    let body = root.require_child("body").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let segment = body
        .require_child("DataTransfer")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .require_child("OrderData")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .text()
        .to_string();
    Ok(segment)
}

pub fn parse_receipt_response(response_xml: &str) -> Result<(), EbicsError> {
    let root = Element::parse(response_xml).map_err(|e| EbicsError::Protocol(e.to_string()))?;
    check_return_code(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn identity() -> HostIdentity {
        HostIdentity { host_id: "HOST01".to_string(), user_id: "USER01".to_string(), partner_id: "PARTNER01".to_string(), system_id: None }
    }

    #[test]
    fn builds_init_request_with_date_range() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let xml = build_download_init_request(&identity(), "C53", from, to, "nonce", "2024-01-31T00:00:00Z");
        assert!(xml.contains("<Start>2024-01-01</Start>"));
        assert!(xml.contains("<End>2024-01-31</End>"));
        assert!(xml.contains("<OrderType>C53</OrderType>"));
    }

    #[test]
    fn parses_init_response_with_transaction_key() {
        let key_b64 = B64.encode([0x42u8; 16]);
        let xml = format!(
            r#"<ebicsResponse><header><static><TransactionID>ABC</TransactionID><NumSegments>2</NumSegments></static></header>
               <body><ReturnCode>000000</ReturnCode><DataTransfer><DataEncryptionInfo><TransactionKey>{key_b64}</TransactionKey></DataEncryptionInfo><OrderData>Zmlyc3Q=</OrderData></DataTransfer></body></ebicsResponse>"#
        );
        let resp = parse_download_init_response(&xml).unwrap();
        assert_eq!(resp.transaction_id, "ABC");
        assert_eq!(resp.num_segments, 2);
        assert_eq!(resp.first_segment, "Zmlyc3Q=");
    }
}
