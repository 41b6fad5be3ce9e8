//! Fixture-driven scenarios over literal camt.053/camt.054 bytes, covering
//! near-real-time notification ingestion (S3) and end-of-day reversal
//! detection (S4).

use libeufin_nexus::iso20022::{camt053, camt054, Dialect, TxNotification};

const NOTIFICATION: &[u8] = include_bytes!("fixtures/camt054_notification.xml");
const REVERSAL_STATEMENT: &[u8] = include_bytes!("fixtures/camt053_reversal_statement.xml");

#[test]
fn camt054_notification_yields_one_incoming_and_one_outgoing() {
    let notifications = camt054::parse(NOTIFICATION, "CHF", Dialect::Postfinance).unwrap();
    assert_eq!(notifications.len(), 2);

    match &notifications[0] {
        TxNotification::Incoming { bank_id, amount, subject, debit_payto, .. } => {
            assert_eq!(bank_id, "PFREF-0001");
            assert_eq!(amount.to_taler_string(), "CHF:50");
            assert_eq!(subject.as_deref(), Some("G1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG"));
            assert!(debit_payto.as_deref().unwrap().contains("CH7389144832588726658"));
        }
        other => panic!("expected Incoming, got {other:?}"),
    }

    match &notifications[1] {
        TxNotification::Outgoing { message_id, amount, subject, credit_payto, .. } => {
            assert_eq!(message_id, "nexus-e2e-42");
            assert_eq!(amount.to_taler_string(), "CHF:25");
            assert_eq!(subject.as_deref(), Some("H1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG http://exchange.example/"));
            assert!(credit_payto.as_deref().unwrap().contains("CH4189144589712575493"));
        }
        other => panic!("expected Outgoing, got {other:?}"),
    }
}

#[test]
fn camt054_outgoing_subject_recovers_wtid_and_exchange_url() {
    let notifications = camt054::parse(NOTIFICATION, "CHF", Dialect::Postfinance).unwrap();
    let TxNotification::Outgoing { subject, .. } = &notifications[1] else {
        panic!("expected Outgoing");
    };
    let (wtid, url) = libeufin_nexus::amount::parse_talerable_outgoing_subject(subject.as_deref().unwrap()).unwrap();
    assert_eq!(wtid, "H1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG");
    assert_eq!(url, "http://exchange.example/");
}

#[test]
fn camt053_statement_carries_both_reversal_and_fresh_incoming() {
    let notifications = camt053::parse(REVERSAL_STATEMENT, "CHF", Dialect::Postfinance).unwrap();
    assert_eq!(notifications.len(), 2);

    match &notifications[0] {
        TxNotification::Reversal { msg_id, reason, .. } => {
            assert_eq!(msg_id, "ZS1PGNTSV0ZNDFAJBBWWB8015G");
            assert_eq!(reason.as_deref(), Some("payment recalled by creditor bank"));
        }
        other => panic!("expected Reversal, got {other:?}"),
    }

    match &notifications[1] {
        TxNotification::Incoming { bank_id, subject, .. } => {
            assert_eq!(bank_id, "PFREF-0099");
            // The PostFinance `?REJECT?` control marker is stripped even
            // though the rest of the subject happens to be a valid reserve
            // public key.
            assert_eq!(subject.as_deref(), Some("G1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG"));
        }
        other => panic!("expected Incoming, got {other:?}"),
    }
}

#[test]
fn camt053_reversed_outgoing_subject_is_still_a_recognisable_reserve_pub() {
    let notifications = camt053::parse(REVERSAL_STATEMENT, "CHF", Dialect::Postfinance).unwrap();
    let TxNotification::Incoming { subject, .. } = &notifications[1] else {
        panic!("expected Incoming");
    };
    assert!(libeufin_nexus::amount::looks_like_reserve_pub(subject.as_deref().unwrap()));
}
