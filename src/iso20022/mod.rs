//! ISO 20022 payment extractor and builder (C5): normalises incoming
//! camt.052/053/054 entries into [`extractor::TxNotification`] and builds
//! outgoing pain.001 documents from queued [`crate::store::models::InitiatedPayment`] rows.

pub mod camt052;
pub mod camt053;
pub mod camt054;
pub mod dialect;
pub mod extractor;
pub mod pain001;

pub use dialect::Dialect;
pub use extractor::TxNotification;
pub use pain001::{build_cct_document, BuildError, DebtorAccount};
