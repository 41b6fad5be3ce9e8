//! EBICS order composition and parsing (C3): one module per order family.
//! All request bodies share the same envelope shape, built here once and
//! specialised per order type.

pub mod download;
pub mod htd_hac;
pub mod ini_hia_hpb;
pub mod upload;

use crate::xml::{el, ElementBuilder};

/// Subscriber/bank identification shared by every EBICS request
/// (`spec.md` §3 `nexus-ebics` config block).
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub host_id: String,
    pub user_id: String,
    pub partner_id: String,
    pub system_id: Option<String>,
}

pub(crate) fn static_header(identity: &HostIdentity, nonce_hex: &str, timestamp: &str) -> ElementBuilder {
    el("static")
        .child(el("HostID").text(identity.host_id.clone()))
        .child(el("Nonce").text(nonce_hex.to_string()))
        .child(el("Timestamp").text(timestamp.to_string()))
        .child(el("PartnerID").text(identity.partner_id.clone()))
        .child(el("UserID").text(identity.user_id.clone()))
        .maybe_child(identity.system_id.clone().map(|s| el("SystemID").text(s)))
}

pub(crate) fn mutable_header(transaction_phase: &str) -> ElementBuilder {
    el("mutable").child(el("TransactionPhase").text(transaction_phase.to_string()))
}
