//! Amounts, currencies, and `payto://` URIs.
//!
//! Amounts are stored as an exact integer `value` plus an eight-digit
//! `fraction` (10^-8 units) as mandated by `spec.md` §3, not as a float or
//! `rust_decimal::Decimal` — EBICS/ISO 20022 round-trips only need two
//! fractional digits on the wire, but internal bookkeeping (netting against
//! camt echoes) must never drift from what the bank sent.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FRACTION_BASE: u32 = 100_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount '{0}' is not of the form CUR:value[.frac]")]
    Malformed(String),
    #[error("fraction in '{0}' has more than 8 digits")]
    FractionTooPrecise(String),
    #[error("currency token '{0}' is empty or not ASCII alphanumeric")]
    BadCurrency(String),
}

/// `(currency, value, fraction)` — `fraction` is in `0..FRACTION_BASE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub value: u64,
    pub fraction: u32,
}

impl Amount {
    pub fn new(currency: impl Into<String>, value: u64, fraction: u32) -> Self {
        Self { currency: currency.into(), value, fraction }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self { currency: currency.into(), value: 0, fraction: 0 }
    }

    /// Decimal serialisation with at most two fractional digits, as required
    /// when emitting amounts outward (pain.001 `InstdAmt`, Taler JSON).
    pub fn to_decimal_string(&self) -> String {
        let cents = (self.fraction as u64 * 100).div_ceil(FRACTION_BASE as u64);
        if cents == 0 {
            format!("{}", self.value)
        } else {
            format!("{}.{:02}", self.value, cents)
        }
    }

    pub fn to_taler_string(&self) -> String {
        format!("{}:{}", self.currency, self.to_decimal_string())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_taler_string())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `CUR:int[.frac]` where `frac` has at most 8 digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (currency, rest) = s
            .split_once(':')
            .ok_or_else(|| AmountError::Malformed(s.to_string()))?;

        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AmountError::BadCurrency(currency.to_string()));
        }

        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };

        let value: u64 = int_part
            .parse()
            .map_err(|_| AmountError::Malformed(s.to_string()))?;

        if frac_part.len() > 8 {
            return Err(AmountError::FractionTooPrecise(s.to_string()));
        }
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let fraction = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<8}", frac_part);
            padded.parse().map_err(|_| AmountError::Malformed(s.to_string()))?
        };

        Ok(Amount { currency: currency.to_uppercase(), value, fraction })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaytoError {
    #[error("payto URI '{0}' does not start with payto://")]
    NotPayto(String),
    #[error("payto target type '{0}' is not supported (only 'iban')")]
    UnsupportedTarget(String),
    #[error("payto URI '{0}' is missing the IBAN path segment")]
    MissingIban(String),
}

/// A parsed `payto://iban/<IBAN>?receiver-name=...` URI (RFC 8905).
/// Only the `iban` target type is accepted; any other authority is an error,
/// per `spec.md` §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaytoUri {
    pub iban: String,
    pub bic: Option<String>,
    pub receiver_name: Option<String>,
}

impl PaytoUri {
    pub fn parse(uri: &str) -> Result<Self, PaytoError> {
        let rest = uri
            .strip_prefix("payto://")
            .ok_or_else(|| PaytoError::NotPayto(uri.to_string()))?;

        let (target, path_and_query) = rest
            .split_once('/')
            .ok_or_else(|| PaytoError::MissingIban(uri.to_string()))?;

        if target != "iban" {
            return Err(PaytoError::UnsupportedTarget(target.to_string()));
        }

        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path_and_query, None),
        };

        // A bank-provided BIC may prefix the IBAN as `BIC/IBAN`; we keep only
        // the IBAN since that's all the store keys on.
        let iban = path.rsplit('/').next().unwrap_or(path);
        if iban.is_empty() {
            return Err(PaytoError::MissingIban(uri.to_string()));
        }

        let mut bic = None;
        let mut receiver_name = None;
        if let Some(q) = query {
            for pair in q.split('&') {
                let (k, v) = match pair.split_once('=') {
                    Some(kv) => kv,
                    None => continue,
                };
                let decoded = percent_decode_str(v).decode_utf8_lossy().to_string();
                match k {
                    "receiver-name" => receiver_name = Some(decoded),
                    "bic" => bic = Some(decoded),
                    _ => {}
                }
            }
        }

        Ok(PaytoUri { iban: iban.to_uppercase(), bic, receiver_name })
    }

    pub fn to_uri_string(&self) -> String {
        let mut s = format!("payto://iban/{}", self.iban);
        let mut params = Vec::new();
        if let Some(name) = &self.receiver_name {
            params.push(format!(
                "receiver-name={}",
                percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC)
            ));
        }
        if let Some(bic) = &self.bic {
            params.push(format!("bic={bic}"));
        }
        if !params.is_empty() {
            s.push('?');
            s.push_str(&params.join("&"));
        }
        s
    }
}

/// A 32-byte Crockford-base32 token, used both for Taler reserve public keys
/// (incoming) and as the leading component of an outgoing WTID subject.
pub const CROCKFORD_TOKEN_RE: &str = "^[0-9A-HJKMNP-TV-Z]{52}$";

pub fn looks_like_reserve_pub(subject: &str) -> bool {
    static RE: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(CROCKFORD_TOKEN_RE).unwrap());
    RE.is_match(subject.trim())
}

/// A talerable-outgoing subject is a WTID followed by whitespace and an
/// exchange URL; per `spec.md` §9 Open Questions, any run of ASCII
/// whitespace between them is accepted, not just a single space.
pub fn parse_talerable_outgoing_subject(subject: &str) -> Option<(String, String)> {
    static RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"^([0-9A-HJKMNP-TV-Z]{52})\s+(\S+)$").unwrap()
    });
    let caps = RE.captures(subject.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_amount() {
        let a: Amount = "CHF:55".parse().unwrap();
        assert_eq!(a, Amount::new("CHF", 55, 0));
        assert_eq!(a.to_taler_string(), "CHF:55");
    }

    #[test]
    fn parses_fractional_amount() {
        let a: Amount = "CHF:3.00".parse().unwrap();
        assert_eq!(a, Amount::new("CHF", 3, 0));
        assert_eq!(a.to_taler_string(), "CHF:3");
    }

    #[test]
    fn parses_eight_digit_fraction() {
        let a: Amount = "CHF:1.5".parse().unwrap();
        assert_eq!(a.fraction, 50_000_000);
        assert_eq!(a.to_decimal_string(), "1.50");
    }

    #[test]
    fn rejects_overlong_fraction() {
        let err = "CHF:1.123456789".parse::<Amount>().unwrap_err();
        assert_eq!(err, AmountError::FractionTooPrecise("CHF:1.123456789".to_string()));
    }

    #[test]
    fn rejects_missing_colon() {
        assert!("CHF55".parse::<Amount>().is_err());
    }

    #[test]
    fn parses_payto_iban_uri() {
        let p = PaytoUri::parse(
            "payto://iban/CH4189144589712575493?receiver-name=Grothoff%20Hans",
        )
        .unwrap();
        assert_eq!(p.iban, "CH4189144589712575493");
        assert_eq!(p.receiver_name.as_deref(), Some("Grothoff Hans"));
    }

    #[test]
    fn rejects_non_iban_target() {
        let err = PaytoUri::parse("payto://ach/123456/1234").unwrap_err();
        assert_eq!(err, PaytoError::UnsupportedTarget("ach".to_string()));
    }

    #[test]
    fn reserve_pub_regex_accepts_52_char_crockford() {
        let subject = "G1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG";
        assert_eq!(subject.len(), 52);
        assert!(looks_like_reserve_pub(subject));
    }

    #[test]
    fn reserve_pub_regex_rejects_wrong_length() {
        assert!(!looks_like_reserve_pub("TOOSHORT"));
    }

    #[test]
    fn talerable_outgoing_accepts_any_whitespace_run() {
        let wtid = "G1XTY6HGWGMVRM7E6XQ4JHJK561ETFDFTJZ7JVGV543XZCB27YBG";
        let subject = format!("{wtid}\t\t http://ex.example/");
        let (w, url) = parse_talerable_outgoing_subject(&subject).unwrap();
        assert_eq!(w, wtid);
        assert_eq!(url, "http://ex.example/");
    }
}
