use thiserror::Error;

/// EBICS return codes split into `Bank` (the bank answered, with a business
/// return code), `Protocol` (the bank's answer doesn't parse as valid
/// EBICS), and `Transport` (never got an answer at all). `spec.md` §4.3:
/// the submit loop retries `Transport` and non-fatal `Bank`; it gives up
/// immediately on `Protocol` and fatal `Bank`.
#[derive(Debug, Error)]
pub enum EbicsError {
    #[error("transport error talking to the bank: {0}")]
    Transport(String),

    #[error("malformed EBICS response from the bank: {0}")]
    Protocol(String),

    #[error("bank rejected the order: {code} ({})", if *.is_fatal { "fatal" } else { "recoverable" })]
    Bank { code: String, is_fatal: bool },
}

impl EbicsError {
    pub fn is_fatal(&self) -> bool {
        match self {
            EbicsError::Transport(_) => false,
            EbicsError::Protocol(_) => true,
            EbicsError::Bank { is_fatal, .. } => *is_fatal,
        }
    }

    /// Classifies a raw EBICS technical/business return code. Codes outside
    /// this table are treated conservatively as fatal: an unrecognised code
    /// from the bank is not something the loop should spin retrying forever.
    pub fn from_bank_code(code: impl Into<String>) -> EbicsError {
        let code = code.into();
        let is_fatal = !matches!(
            code.as_str(),
            "091005" // EBICS_NO_DOWNLOAD_DATA_AVAILABLE
                | "091116" // EBICS_PROCESSING_ERROR, usually transient on the bank side
                | "061002" // EBICS_DOWNLOAD_POSTPROCESS_DONE, pending variants
        );

        EbicsError::Bank { code, is_fatal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_recoverable() {
        assert!(!EbicsError::Transport("timed out".into()).is_fatal());
    }

    #[test]
    fn protocol_is_fatal() {
        assert!(EbicsError::Protocol("bad xml".into()).is_fatal());
    }

    #[test]
    fn no_download_data_is_recoverable() {
        assert!(!EbicsError::from_bank_code("091005").is_fatal());
    }

    #[test]
    fn authentication_failed_is_fatal() {
        assert!(EbicsError::from_bank_code("090003").is_fatal());
    }
}
