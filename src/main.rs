//! CLI entry point (C13, `spec.md` §5): `ebics-setup`, `ebics-submit`,
//! `ebics-fetch`, and `serve`, each a thin wrapper over the library crate's
//! loops. Exit codes: `0` success, `1` usage error, `2` configuration
//! error, `3` runtime error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use libeufin_nexus::config::{self, NexusConfig};
use libeufin_nexus::ebics::{EbicsClient, EbicsClientConfig, HostIdentity};
use libeufin_nexus::fetch::{self, FetchLoopConfig};
use libeufin_nexus::http::{self, AppState};
use libeufin_nexus::iso20022::{DebtorAccount, Dialect};
use libeufin_nexus::metrics::Metrics;
use libeufin_nexus::scheduler::{spawn_supervised, SchedulerKernel, ShutdownToken};
use libeufin_nexus::store::Store;
use libeufin_nexus::submit::{self, SubmitLoopConfig};

#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(about = "EBICS/ISO 20022 payment gateway bridging a Taler-style exchange to a bank account")]
struct Cli {
    /// Path to the TOML config file. Falls back to $LIBEUFIN_NEXUS_CONFIG, then ./nexus.conf.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the EBICS INI/HIA/HPB key exchange once and print the bank key fingerprints.
    EbicsSetup,
    /// Upload queued initiated payments as pain.001 documents.
    EbicsSubmit {
        /// Keep running on nexus-submit.frequency_secs instead of a single tick.
        #[arg(long)]
        r#loop: bool,
    },
    /// Download and ingest camt documents.
    EbicsFetch {
        /// Keep running on nexus-fetch.frequency_secs instead of a single tick.
        #[arg(long)]
        r#loop: bool,
    },
    /// Run the submit loop, fetch loop, and Taler-facing HTTP façade together.
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).with_level(true).with_line_number(true).init();

    let cli = Cli::parse();

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    match run(cli.command, cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal runtime error");
            ExitCode::from(3)
        }
    }
}

async fn run(command: Command, cfg: NexusConfig) -> anyhow::Result<()> {
    let pool = PgPoolOptions::new().max_connections(20).connect(&cfg.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store = Store::new(pool);

    let identity = HostIdentity {
        host_id: cfg.ebics.host_id.clone(),
        user_id: cfg.ebics.user_id.clone(),
        partner_id: cfg.ebics.partner_id.clone(),
        system_id: cfg.ebics.system_id.clone(),
    };

    let ebics = Arc::new(EbicsClient::new(EbicsClientConfig {
        host_base_url: cfg.ebics.host_base_url.clone(),
        identity,
        client_private_keys_file: cfg.ebics.client_private_keys_file.clone(),
        bank_public_keys_file: cfg.ebics.bank_public_keys_file.clone(),
        rsa_bits: cfg.ebics.rsa_bits,
    })?);

    match command {
        Command::EbicsSetup => {
            let (auth_fp, enc_fp) = ebics.setup().await?;
            tracing::info!(authentication_fingerprint = %auth_fp, encryption_fingerprint = %enc_fp, "EBICS key exchange complete");
            println!("authentication key fingerprint: {auth_fp}");
            println!("encryption key fingerprint:     {enc_fp}");
            println!("Confirm these match the bank's published fingerprints, then mark the key file 'accepted: true'.");
            Ok(())
        }
        Command::EbicsSubmit { r#loop } => {
            let submit_cfg = submit_loop_config(&cfg);
            if r#loop {
                let shutdown = install_shutdown_handler();
                submit::run(store, ebics, submit_cfg, shutdown).await;
            } else {
                submit::run_once(&store, &ebics, &submit_cfg).await?;
            }
            Ok(())
        }
        Command::EbicsFetch { r#loop } => {
            let fetch_cfg = fetch_loop_config(&cfg)?;
            if r#loop {
                let shutdown = install_shutdown_handler();
                fetch::run(store, ebics, fetch_cfg, shutdown).await;
            } else {
                fetch::run_once(&store, &ebics, &fetch_cfg).await?;
            }
            Ok(())
        }
        Command::Serve => serve(store, ebics, cfg).await,
    }
}

fn submit_loop_config(cfg: &NexusConfig) -> SubmitLoopConfig {
    SubmitLoopConfig {
        currency: cfg.currency.clone(),
        debtor: DebtorAccount { iban: cfg.ebics.iban.clone(), bic: cfg.ebics.bic.clone(), name: cfg.ebics.account_holder.clone() },
        batch_size: cfg.submit.batch_size,
        frequency: Duration::from_secs(cfg.submit.frequency_secs),
    }
}

fn fetch_loop_config(cfg: &NexusConfig) -> anyhow::Result<FetchLoopConfig> {
    let dialect: Dialect = cfg.ebics.bank_dialect.parse()?;
    let levels = cfg.fetch.levels.iter().map(|l| l.parse()).collect::<Result<Vec<_>, _>>()?;
    let ignore_transactions_before = cfg.fetch.ignore_transactions_before.unwrap_or_else(|| chrono::Utc::now().date_naive());

    Ok(FetchLoopConfig {
        currency: cfg.currency.clone(),
        dialect,
        levels,
        frequency: Duration::from_secs(cfg.fetch.frequency_secs),
        ignore_transactions_before,
    })
}

/// `serve` runs the submit and fetch loops under the scheduler kernel
/// alongside the HTTP façade, and shuts all three down together on Ctrl-C
/// (`spec.md` §5).
async fn serve(store: Store, ebics: Arc<EbicsClient>, cfg: NexusConfig) -> anyhow::Result<()> {
    let shutdown = ShutdownToken::new();

    let submit_handle = {
        let store = store.clone();
        let ebics = ebics.clone();
        let submit_cfg = submit_loop_config(&cfg);
        let shutdown = shutdown.clone();
        spawn_supervised("submit-loop", Duration::from_secs(5), shutdown.clone(), move || {
            submit::run(store.clone(), ebics.clone(), submit_cfg.clone(), shutdown.clone())
        })
    };

    let fetch_cfg = fetch_loop_config(&cfg)?;
    let fetch_handle = {
        let store = store.clone();
        let ebics = ebics.clone();
        let shutdown = shutdown.clone();
        spawn_supervised("fetch-loop", Duration::from_secs(5), shutdown.clone(), move || {
            fetch::run(store.clone(), ebics.clone(), fetch_cfg.clone(), shutdown.clone())
        })
    };

    let kernel = SchedulerKernel::new(shutdown.clone(), submit_handle, fetch_handle);

    let state = AppState {
        store,
        currency: cfg.currency.clone(),
        auth: cfg.httpd.auth_method.clone(),
        credit_iban: cfg.ebics.iban.clone(),
        metrics: Arc::new(Metrics::new()?),
    };
    let app = http::build_router(state);

    let serve_result = match cfg.httpd.serve {
        config::ServeMode::Tcp { port } => {
            let addr = format!("0.0.0.0:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(addr = %addr, "serving Taler wire gateway façade");
            axum::serve(listener, app).with_graceful_shutdown(ctrl_c_signal()).await
        }
        config::ServeMode::Unix { path } => {
            let _ = std::fs::remove_file(&path);
            let listener = tokio::net::UnixListener::bind(&path)?;
            tracing::info!(path = %path.display(), "serving Taler wire gateway façade");
            axum::serve(listener, app.into_make_service()).with_graceful_shutdown(ctrl_c_signal()).await
        }
    };
    serve_result?;

    kernel.shutdown().await;
    Ok(())
}

async fn ctrl_c_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn install_shutdown_handler() -> ShutdownToken {
    let token = ShutdownToken::new();
    let watched = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        watched.shutdown();
    });
    token
}
