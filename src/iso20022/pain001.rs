//! pain.001 (CustomerCreditTransferInitiation) builder — the outgoing half
//! of C5, consumed by C7's submit loop. One document batches every
//! payment taken off the unsubmitted queue in a single submit tick.

use chrono::{DateTime, Utc};

use crate::amount::PaytoUri;
use crate::store::models::InitiatedPayment;
use crate::xml::{el, to_xml_string};

#[derive(Debug, Clone)]
pub struct DebtorAccount {
    pub iban: String,
    pub bic: String,
    pub name: String,
}

/// Builds a single pain.001 document batching `payments` into one
/// `PmtInf` block. Each transaction's `EndToEndId` is
/// [`InitiatedPayment::end_to_end_id`], which C8 uses to reconcile the
/// matching `outgoing_payments` row once the bank reports it executed.
pub fn build_cct_document(payments: &[InitiatedPayment], debtor: &DebtorAccount, msg_id: &str, created_at: DateTime<Utc>, currency: &str) -> Result<String, BuildError> {
    if payments.is_empty() {
        return Err(BuildError::Empty);
    }

    let ctrl_sum = sum_major_units(payments)?;
    let created_at_str = created_at.to_rfc3339();

    let grp_hdr = el("GrpHdr")
        .child(el("MsgId").text(msg_id.to_string()))
        .child(el("CreDtTm").text(created_at_str.clone()))
        .child(el("NbOfTxs").text(payments.len().to_string()))
        .child(el("CtrlSum").text(ctrl_sum))
        .child(
            el("InitgPty").child(el("Nm").text(debtor.name.clone())),
        );

    let mut pmt_inf = el("PmtInf")
        .child(el("PmtInfId").text(msg_id.to_string()))
        .child(el("PmtMtd").text("TRF"))
        .child(el("BtchBookg").text("true"))
        .child(el("NbOfTxs").text(payments.len().to_string()))
        .child(el("CtrlSum").text(sum_major_units(payments)?))
        .child(el("PmtTpInf").child(el("SvcLvl").child(el("Cd").text("SEPA"))))
        .child(el("ReqdExctnDt").text(created_at.date_naive().to_string()))
        .child(el("Dbtr").child(el("Nm").text(debtor.name.clone())))
        .child(
            el("DbtrAcct").child(el("Id").child(el("IBAN").text(debtor.iban.clone()))),
        )
        .child(
            el("DbtrAgt").child(el("FinInstnId").child(el("BIC").text(debtor.bic.clone()))),
        );

    for payment in payments {
        let payto = PaytoUri::parse(&payment.credit_payto_uri).map_err(BuildError::Payto)?;
        if payment.amount.currency != currency {
            return Err(BuildError::CurrencyMismatch(payment.amount.currency.clone()));
        }

        let mut cdtr = el("Cdtr");
        if let Some(name) = &payto.receiver_name {
            cdtr = cdtr.child(el("Nm").text(name.clone()));
        }

        let mut cdtr_agt_fin_instn = el("FinInstnId");
        if let Some(bic) = &payto.bic {
            cdtr_agt_fin_instn = cdtr_agt_fin_instn.child(el("BIC").text(bic.clone()));
        }

        let tx = el("CdtTrfTxInf")
            .child(el("PmtId").child(el("EndToEndId").text(payment.end_to_end_id.clone())))
            .child(el("Amt").child(el("InstdAmt").attr("Ccy", currency.to_string()).text(payment.amount.to_decimal_string())))
            .child(el("CdtrAgt").child(cdtr_agt_fin_instn))
            .child(cdtr)
            .child(el("CdtrAcct").child(el("Id").child(el("IBAN").text(payto.iban.clone()))))
            .child(el("RmtInf").child(el("Ustrd").text(payment.subject.clone())));

        pmt_inf = pmt_inf.child(tx);
    }

    let doc = el("Document")
        .attr("xmlns", "urn:iso:std:iso:20022:tech:xsd:pain.001.001.09")
        .child(
            el("CstmrCdtTrfInitn").child(grp_hdr).child(pmt_inf),
        );

    Ok(to_xml_string(doc))
}

fn sum_major_units(payments: &[InitiatedPayment]) -> Result<String, BuildError> {
    let currency = payments[0].amount.currency.clone();
    let mut total_minor: u128 = 0;
    for payment in payments {
        if payment.amount.currency != currency {
            return Err(BuildError::CurrencyMismatch(payment.amount.currency.clone()));
        }
        total_minor += payment.amount.value as u128 * 100_000_000 + payment.amount.fraction as u128;
    }
    let whole = total_minor / 100_000_000;
    let frac = total_minor % 100_000_000;
    Ok(format!("{whole}.{:08}", frac).trim_end_matches('0').trim_end_matches('.').to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot build a pain.001 document with no payments")]
    Empty,
    #[error("payment has an invalid payto URI: {0}")]
    Payto(#[from] crate::amount::PaytoError),
    #[error("payment currency {0} does not match the configured account currency")]
    CurrencyMismatch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::SubmissionState;

    fn payment(value: u64) -> InitiatedPayment {
        InitiatedPayment {
            id: 1,
            amount: crate::amount::Amount::new("CHF".to_string(), value, 0),
            credit_payto_uri: "payto://iban/CH7389144832588726658?receiver-name=Test".to_string(),
            subject: "invoice 42".to_string(),
            request_uid: "req-1".to_string(),
            created_at: Utc::now(),
            submitted: SubmissionState::Unsubmitted,
            failure_message: None,
            submitted_at: None,
            end_to_end_id: "nexus-e2e-1".to_string(),
        }
    }

    fn debtor() -> DebtorAccount {
        DebtorAccount { iban: "CH9300762011623852957".to_string(), bic: "POFICHBEXXX".to_string(), name: "Example Exchange".to_string() }
    }

    #[test]
    fn builds_document_with_one_transaction() {
        let xml = build_cct_document(&[payment(10)], &debtor(), "MSG1", Utc::now(), "CHF").unwrap();
        assert!(xml.contains("<EndToEndId>nexus-e2e-1</EndToEndId>"));
        assert!(xml.contains("<IBAN>CH7389144832588726658</IBAN>"));
        assert!(xml.contains("<NbOfTxs>1</NbOfTxs>"));
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(matches!(build_cct_document(&[], &debtor(), "MSG1", Utc::now(), "CHF"), Err(BuildError::Empty)));
    }

    #[test]
    fn rejects_currency_mismatch() {
        let mut p = payment(5);
        p.amount = crate::amount::Amount::new("EUR".to_string(), 5, 0);
        assert!(matches!(build_cct_document(&[p], &debtor(), "MSG1", Utc::now(), "CHF"), Err(BuildError::CurrencyMismatch(_))));
    }
}
