//! HTD (download subscriber/account details) and HAC (download the bank's
//! audit log of past orders) — used for operator diagnostics, not on the
//! submit/fetch hot path.

use crate::ebics::error::EbicsError;
use crate::xml::Element;

#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub iban: String,
    pub bic: Option<String>,
    pub currency: Option<String>,
}

/// Parses an HTD response's order data for the first `AccountInfo/...IBAN`
/// it finds. A subscriber may be authorised for several accounts; Nexus is
/// single-account (`spec.md` Non-goals), so only the first is surfaced.
pub fn parse_htd_order_data(order_data_xml: &[u8]) -> Result<AccountInfo, EbicsError> {
    let text = std::str::from_utf8(order_data_xml)
        .map_err(|e| EbicsError::Protocol(format!("HTD order data is not UTF-8: {e}")))?;
    let root = Element::parse(text).map_err(|e| EbicsError::Protocol(e.to_string()))?;

    let partner_info = root.require_child("PartnerInfo").map_err(|e| EbicsError::Protocol(e.to_string()))?;
    let account = partner_info
        .optional_child("AccountInfo")
        .ok_or_else(|| EbicsError::Protocol("HTD response has no AccountInfo".to_string()))?;

    let iban = account
        .require_child("AccountNumber")
        .map_err(|e| EbicsError::Protocol(e.to_string()))?
        .text()
        .to_string();
    let bic = account.optional_child("BankCode").map(|e| e.text().to_string());
    let currency = account.optional_attr("Currency").map(str::to_string);

    Ok(AccountInfo { iban, bic, currency })
}

#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub order_type: String,
    pub return_code: String,
    pub timestamp: String,
}

/// Parses an HAC response (an ISO 20022 `pain.002`-flavoured audit trail in
/// real EBICS; here reduced to the fields the operator CLI actually prints).
pub fn parse_hac_order_data(order_data_xml: &[u8]) -> Result<Vec<AuditLogEntry>, EbicsError> {
    let text = std::str::from_utf8(order_data_xml)
        .map_err(|e| EbicsError::Protocol(format!("HAC order data is not UTF-8: {e}")))?;
    let root = Element::parse(text).map_err(|e| EbicsError::Protocol(e.to_string()))?;

    root.all_children("OrderDetail")
        .into_iter()
        .map(|entry| {
            Ok(AuditLogEntry {
                order_type: entry.require_text_child("OrderType").map_err(|e| EbicsError::Protocol(e.to_string()))?,
                return_code: entry.require_text_child("ReturnCode").map_err(|e| EbicsError::Protocol(e.to_string()))?,
                timestamp: entry.require_text_child("Timestamp").map_err(|e| EbicsError::Protocol(e.to_string()))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_htd_account_info() {
        let xml = r#"<HTDResponseOrderData><PartnerInfo><AccountInfo Currency="CHF">
            <AccountNumber>CH4189144589712575493</AccountNumber>
            <BankCode>POFICHBEXXX</BankCode>
        </AccountInfo></PartnerInfo></HTDResponseOrderData>"#;
        let info = parse_htd_order_data(xml.as_bytes()).unwrap();
        assert_eq!(info.iban, "CH4189144589712575493");
        assert_eq!(info.bic.as_deref(), Some("POFICHBEXXX"));
        assert_eq!(info.currency.as_deref(), Some("CHF"));
    }

    #[test]
    fn parses_hac_audit_entries() {
        let xml = r#"<HACResponseOrderData>
            <OrderDetail><OrderType>CCT</OrderType><ReturnCode>000000</ReturnCode><Timestamp>2024-01-15T10:00:00Z</Timestamp></OrderDetail>
            <OrderDetail><OrderType>C53</OrderType><ReturnCode>091005</ReturnCode><Timestamp>2024-01-16T10:00:00Z</Timestamp></OrderDetail>
        </HACResponseOrderData>"#;
        let entries = parse_hac_order_data(xml.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].order_type, "CCT");
        assert_eq!(entries[1].return_code, "091005");
    }
}
