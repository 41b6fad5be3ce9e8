//! Taler Wire Gateway / Revenue HTTP façade (C9, `spec.md` §4.9): a thin
//! axum surface over the payment [`crate::store::Store`], with no
//! EBICS/ISO 20022 logic of its own.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AuthMethod;
use crate::metrics::Metrics;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub currency: String,
    pub auth: AuthMethod,
    pub credit_iban: String,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn credit_account_payto(&self) -> String {
        format!("payto://iban/{}", self.credit_iban)
    }
}

/// Builds the full router: health/metrics are unauthenticated (matching the
/// teacher's `gateway-rust` layout), every `/taler-*` route enforces
/// [`auth::check`] inside its handler per `spec.md` §4.9.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "libeufin-nexus" }))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/taler-wire-gateway/config", get(handlers::wire_gateway_config))
        .route("/taler-wire-gateway/transfer", post(handlers::transfer))
        .route("/taler-wire-gateway/admin/add-incoming", post(handlers::add_incoming))
        .route("/taler-wire-gateway/history/incoming", get(handlers::history_incoming))
        .route("/taler-wire-gateway/history/outgoing", get(handlers::history_outgoing))
        .route("/taler-revenue/config", get(handlers::revenue_config))
        .route("/taler-revenue/history", get(handlers::revenue_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_account_payto_is_iban_uri() {
        let state = AppState {
            store: Store::new(sqlx::PgPool::connect_lazy("postgres://localhost/ignored").unwrap()),
            currency: "CHF".to_string(),
            auth: AuthMethod::None,
            credit_iban: "CH9300762011623852957".to_string(),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        assert_eq!(state.credit_account_payto(), "payto://iban/CH9300762011623852957");
    }
}
