//! camt.053 (end-of-day account statement) ingestion. The source of truth
//! for a day's bookings and for reversal detection once a statement
//! supersedes the intraday camt.054 notifications that preceded it.

use super::dialect::Dialect;
use super::extractor::{parse_camt, TxNotification};
use crate::xml::XmlError;

const CONTAINERS: &[&str] = &["BkToCstmrStmt"];

pub fn parse(xml_bytes: &[u8], currency: &str, dialect: Dialect) -> Result<Vec<TxNotification>, XmlError> {
    parse_camt(xml_bytes, currency, dialect, CONTAINERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_statement_reversal() {
        let xml = br#"<Document><BkToCstmrStmt><GrpHdr><MsgId>M1</MsgId></GrpHdr><Stmt>
            <Ntry><Amt Ccy="CHF">3.00</Amt><CdtDbtInd>DBIT</CdtDbtInd><RvslInd>true</RvslInd><Sts><Cd>BOOK</Cd></Sts>
            <BookgDt><Dt>2024-01-15</Dt></BookgDt>
            <NtryDtls><TxDtls><Refs><EndToEndId>ZS1PGNTSV0ZNDFAJBBWWB8015G</EndToEndId></Refs></TxDtls></NtryDtls></Ntry>
        </Stmt></BkToCstmrStmt></Document>"#;
        let result = parse(xml, "CHF", Dialect::Postfinance).unwrap();
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0], TxNotification::Reversal { .. }));
    }
}
