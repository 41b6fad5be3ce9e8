//! camt.052 (intraday account report) ingestion. Used by fetch loops that
//! poll more frequently than the end-of-day camt.053 statement lands.

use super::dialect::Dialect;
use super::extractor::{parse_camt, TxNotification};
use crate::xml::XmlError;

const CONTAINERS: &[&str] = &["BkToCstmrAcctRpt"];

pub fn parse(xml_bytes: &[u8], currency: &str, dialect: Dialect) -> Result<Vec<TxNotification>, XmlError> {
    parse_camt(xml_bytes, currency, dialect, CONTAINERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_report_entry() {
        let xml = br#"<Document><BkToCstmrAcctRpt><GrpHdr><MsgId>M1</MsgId></GrpHdr><Rpt>
            <Ntry><Amt Ccy="CHF">42.00</Amt><CdtDbtInd>CRDT</CdtDbtInd><Sts><Cd>BOOK</Cd></Sts>
            <BookgDt><Dt>2024-02-01</Dt></BookgDt><AcctSvcrRef>R42</AcctSvcrRef></Ntry>
        </Rpt></BkToCstmrAcctRpt></Document>"#;
        let result = parse(xml, "CHF", Dialect::Generic).unwrap();
        assert_eq!(result.len(), 1);
    }
}
