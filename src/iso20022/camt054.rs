//! camt.054 (debit/credit notification) ingestion — the primary channel
//! for near-real-time incoming-payment detection (`spec.md` S3).

use super::dialect::Dialect;
use super::extractor::{parse_camt, TxNotification};
use crate::xml::XmlError;

const CONTAINERS: &[&str] = &["BkToCstmrDbtCdtNtfctn"];

pub fn parse(xml_bytes: &[u8], currency: &str, dialect: Dialect) -> Result<Vec<TxNotification>, XmlError> {
    parse_camt(xml_bytes, currency, dialect, CONTAINERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notification_with_synthesized_bank_id() {
        let xml = br#"<Document><BkToCstmrDbtCdtNtfctn><GrpHdr><MsgId>M1</MsgId></GrpHdr><Ntfctn>
            <Ntry><Amt Ccy="CHF">10.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><Sts><Cd>BOOK</Cd></Sts>
            <BookgDt><Dt>2024-02-01</Dt></BookgDt>
            <NtryDtls><TxDtls><RmtInf><Ustrd>subject line</Ustrd></RmtInf></TxDtls></NtryDtls></Ntry>
        </Ntfctn></BkToCstmrDbtCdtNtfctn></Document>"#;
        let result = parse(xml, "CHF", Dialect::Postfinance).unwrap();
        assert_eq!(result.len(), 1);
        match &result[0] {
            TxNotification::Incoming { bank_id, .. } => assert!(bank_id.starts_with("nexus-synth-")),
            other => panic!("expected Incoming, got {other:?}"),
        }
    }
}
