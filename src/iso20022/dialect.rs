//! Bank dialect recognition hooks (`spec.md` §3/§4.5). The normalisation
//! core in [`super::extractor`] is shared; a dialect only changes which
//! subject-cleanup markers are stripped and how a missing `AcctSvcrRef` is
//! handled.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Swiss PostFinance camt.052/053/054 flavour: strips `?REJECT?`/
    /// `?ERROR?` control markers from `Ustrd`, synthesises `bank_id` when
    /// `AcctSvcrRef` is absent.
    Postfinance,
    /// German GLS Bank flavour: prefers `RmtInf/Strd/CdtrRefInf/Ref` over
    /// `Ustrd` for the subject when present.
    Gls,
    /// Any other bank that emits plain ISO 20022 camt with no
    /// bank-specific quirks. Not excluded by any Non-goal: the extractor's
    /// normalisation core works for it unmodified.
    Generic,
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised bank dialect '{0}', expected one of: postfinance, gls, generic")]
pub struct UnknownDialect(String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postfinance" => Ok(Dialect::Postfinance),
            "gls" => Ok(Dialect::Gls),
            "generic" => Ok(Dialect::Generic),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}

impl Dialect {
    /// Control markers PostFinance appends to `Ustrd` remittance lines that
    /// are not part of the human-readable subject.
    pub fn subject_control_markers(self) -> &'static [&'static str] {
        match self {
            Dialect::Postfinance => &["?REJECT?", "?ERROR?"],
            Dialect::Gls | Dialect::Generic => &[],
        }
    }

    /// Whether `bank_id` should be synthesised from `(msg_id, nb_of_txs,
    /// index)` when the bank omits `AcctSvcrRef` (spec.md §4.5, §9 Open
    /// Questions).
    pub fn synthesises_missing_bank_id(self) -> bool {
        matches!(self, Dialect::Postfinance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_dialects_case_insensitively() {
        assert_eq!("PostFinance".parse::<Dialect>().unwrap(), Dialect::Postfinance);
        assert_eq!("gls".parse::<Dialect>().unwrap(), Dialect::Gls);
        assert_eq!("GENERIC".parse::<Dialect>().unwrap(), Dialect::Generic);
    }

    #[test]
    fn rejects_unknown_dialect() {
        assert!("barclays".parse::<Dialect>().is_err());
    }
}
