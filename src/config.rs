//! Configuration loader (C11): TOML file plus environment overrides.
//! Mirrors the teacher's `config::Config` usage (one file, no remote
//! providers) but without a general-purpose layered-config crate — this
//! process has exactly one config file and a handful of env overrides, so
//! a thin hand-rolled loader stays closer to what the teacher actually
//! does than pulling in unused layers.

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_CONFIG_ENV: &str = "LIBEUFIN_NEXUS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./nexus.conf";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("missing required section [{0}]")]
    MissingSection(&'static str),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct NexusConfig {
    pub currency: String,
    pub database_url: String,
    pub ebics: EbicsConfig,
    pub fetch: FetchConfig,
    pub submit: SubmitConfig,
    pub httpd: HttpdConfig,
}

#[derive(Debug, Clone)]
pub struct EbicsConfig {
    pub host_base_url: String,
    pub host_id: String,
    pub user_id: String,
    pub partner_id: String,
    pub system_id: Option<String>,
    pub iban: String,
    pub bic: String,
    pub account_holder: String,
    pub bank_public_keys_file: PathBuf,
    pub client_private_keys_file: PathBuf,
    pub bank_dialect: String,
    pub rsa_bits: usize,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub frequency_secs: u64,
    pub ignore_transactions_before: Option<chrono::NaiveDate>,
    /// e.g. `["notification", "statement"]` — camt.054/camt.053 levels
    /// polled each tick, in order (`spec.md` §4.8).
    pub levels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub frequency_secs: u64,
    pub batch_size: i64,
}

#[derive(Debug, Clone)]
pub enum ServeMode {
    Tcp { port: u16 },
    Unix { path: PathBuf },
}

#[derive(Debug, Clone)]
pub enum AuthMethod {
    None,
    BearerToken(String),
}

#[derive(Debug, Clone)]
pub struct HttpdConfig {
    pub serve: ServeMode,
    pub auth_method: AuthMethod,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    currency: Option<String>,
    database_url: Option<String>,
    #[serde(rename = "nexus-ebics")]
    nexus_ebics: Option<RawEbics>,
    #[serde(rename = "nexus-fetch")]
    nexus_fetch: Option<RawFetch>,
    #[serde(rename = "nexus-submit")]
    nexus_submit: Option<RawSubmit>,
    #[serde(rename = "nexus-httpd")]
    nexus_httpd: Option<RawHttpd>,
}

#[derive(Debug, Deserialize)]
struct RawEbics {
    host_base_url: String,
    host_id: String,
    user_id: String,
    partner_id: String,
    system_id: Option<String>,
    iban: String,
    bic: String,
    account_holder: String,
    bank_public_keys_file: String,
    client_private_keys_file: String,
    #[serde(default = "default_dialect")]
    bank_dialect: String,
    #[serde(default = "default_rsa_bits")]
    rsa_bits: usize,
}

fn default_dialect() -> String {
    "generic".to_string()
}

fn default_rsa_bits() -> usize {
    2048
}

#[derive(Debug, Deserialize)]
struct RawFetch {
    #[serde(default = "default_fetch_frequency")]
    frequency_secs: u64,
    ignore_transactions_before: Option<String>,
    #[serde(default = "default_levels")]
    levels: Vec<String>,
}

fn default_fetch_frequency() -> u64 {
    300
}

fn default_levels() -> Vec<String> {
    vec!["notification".to_string(), "statement".to_string()]
}

#[derive(Debug, Deserialize)]
struct RawSubmit {
    #[serde(default = "default_submit_frequency")]
    frequency_secs: u64,
    #[serde(default = "default_batch_size")]
    batch_size: i64,
}

fn default_submit_frequency() -> u64 {
    60
}

fn default_batch_size() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct RawHttpd {
    #[serde(default = "default_serve")]
    serve: String,
    port: Option<u16>,
    unixpath: Option<String>,
    #[serde(default = "default_auth_method")]
    auth_method: String,
}

fn default_serve() -> String {
    "tcp".to_string()
}

fn default_auth_method() -> String {
    "none".to_string()
}

/// Loads `NexusConfig` from `path`, falling back to `$LIBEUFIN_NEXUS_CONFIG`
/// then [`DEFAULT_CONFIG_PATH`] when `path` is `None`. Unknown top-level
/// keys and sections are logged at `warn` and otherwise ignored, per
/// `spec.md` §9's forward-compatibility note.
pub fn load(path: Option<&std::path::Path>) -> Result<NexusConfig, ConfigError> {
    let resolved = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var(DEFAULT_CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };

    let raw_text = std::fs::read_to_string(&resolved).map_err(|e| ConfigError::Read { path: resolved.display().to_string(), source: e })?;
    parse(&raw_text, &resolved.display().to_string())
}

fn parse(raw_text: &str, path_label: &str) -> Result<NexusConfig, ConfigError> {
    warn_unknown_keys(raw_text);

    let doc: RawDocument = toml::from_str(raw_text).map_err(|e| ConfigError::Parse { path: path_label.to_string(), source: e })?;

    let currency = doc.currency.unwrap_or_else(|| "CHF".to_string());
    let database_url = doc
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or(ConfigError::Invalid { field: "database_url", reason: "not set in config or DATABASE_URL env".to_string() })?;

    let raw_ebics = doc.nexus_ebics.ok_or(ConfigError::MissingSection("nexus-ebics"))?;
    let raw_fetch = doc.nexus_fetch.unwrap_or(RawFetch { frequency_secs: default_fetch_frequency(), ignore_transactions_before: None, levels: default_levels() });
    let raw_submit = doc.nexus_submit.unwrap_or(RawSubmit { frequency_secs: default_submit_frequency(), batch_size: default_batch_size() });
    let raw_httpd = doc.nexus_httpd.unwrap_or(RawHttpd { serve: default_serve(), port: None, unixpath: None, auth_method: default_auth_method() });

    let ignore_transactions_before = raw_fetch
        .ignore_transactions_before
        .map(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| ConfigError::Invalid { field: "nexus-fetch.ignore_transactions_before", reason: e.to_string() })?;

    let serve = match raw_httpd.serve.as_str() {
        "tcp" => ServeMode::Tcp { port: raw_httpd.port.unwrap_or(8080) },
        "unix" => {
            let path = raw_httpd.unixpath.ok_or(ConfigError::Invalid { field: "nexus-httpd.unixpath", reason: "required when serve = \"unix\"".to_string() })?;
            ServeMode::Unix { path: PathBuf::from(path) }
        }
        other => return Err(ConfigError::Invalid { field: "nexus-httpd.serve", reason: format!("expected tcp or unix, got {other}") }),
    };

    let auth_method = if raw_httpd.auth_method == "none" {
        AuthMethod::None
    } else if let Some(token) = raw_httpd.auth_method.strip_prefix("bearer-token+") {
        AuthMethod::BearerToken(token.to_string())
    } else {
        return Err(ConfigError::Invalid { field: "nexus-httpd.auth_method", reason: "expected none or bearer-token+<token>".to_string() });
    };

    Ok(NexusConfig {
        currency,
        database_url,
        ebics: EbicsConfig {
            host_base_url: raw_ebics.host_base_url,
            host_id: raw_ebics.host_id,
            user_id: raw_ebics.user_id,
            partner_id: raw_ebics.partner_id,
            system_id: raw_ebics.system_id,
            iban: raw_ebics.iban,
            bic: raw_ebics.bic,
            account_holder: raw_ebics.account_holder,
            bank_public_keys_file: PathBuf::from(raw_ebics.bank_public_keys_file),
            client_private_keys_file: PathBuf::from(raw_ebics.client_private_keys_file),
            bank_dialect: raw_ebics.bank_dialect,
            rsa_bits: raw_ebics.rsa_bits,
        },
        fetch: FetchConfig { frequency_secs: raw_fetch.frequency_secs, ignore_transactions_before, levels: raw_fetch.levels },
        submit: SubmitConfig { frequency_secs: raw_submit.frequency_secs, batch_size: raw_submit.batch_size },
        httpd: HttpdConfig { serve, auth_method },
    })
}

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["currency", "database_url", "nexus-ebics", "nexus-fetch", "nexus-submit", "nexus-httpd"];

fn warn_unknown_keys(raw_text: &str) {
    let Ok(value) = raw_text.parse::<toml::Value>() else { return };
    let Some(table) = value.as_table() else { return };
    for key in table.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "ignoring unknown top-level config key");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
currency = "CHF"
database_url = "postgresql://localhost/nexus"

[nexus-ebics]
host_base_url = "https://bank.example/ebics"
host_id = "HOST01"
user_id = "USER01"
partner_id = "PARTNER01"
iban = "CH9300762011623852957"
bic = "POFICHBEXXX"
account_holder = "Example Exchange"
bank_public_keys_file = "/var/lib/nexus/bank.json"
client_private_keys_file = "/var/lib/nexus/client.json"
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = parse(MINIMAL, "test").unwrap();
        assert_eq!(config.currency, "CHF");
        assert_eq!(config.ebics.bank_dialect, "generic");
        assert_eq!(config.submit.batch_size, 50);
        assert_eq!(config.fetch.levels, vec!["notification", "statement"]);
        assert!(matches!(config.httpd.serve, ServeMode::Tcp { port: 8080 }));
        assert!(matches!(config.httpd.auth_method, AuthMethod::None));
    }

    #[test]
    fn parses_bearer_token_auth() {
        let text = format!("{MINIMAL}\n[nexus-httpd]\nauth_method = \"bearer-token+s3cr3t\"\n");
        let config = parse(&text, "test").unwrap();
        assert!(matches!(config.httpd.auth_method, AuthMethod::BearerToken(t) if t == "s3cr3t"));
    }

    #[test]
    fn missing_ebics_section_is_an_error() {
        let text = "currency = \"CHF\"\ndatabase_url = \"postgresql://x\"\n";
        assert!(matches!(parse(text, "test"), Err(ConfigError::MissingSection("nexus-ebics"))));
    }

    #[test]
    fn rejects_unix_serve_without_path() {
        let text = format!("{MINIMAL}\n[nexus-httpd]\nserve = \"unix\"\n");
        assert!(parse(&text, "test").is_err());
    }
}
