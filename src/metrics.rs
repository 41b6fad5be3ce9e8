//! Logging & metrics (C12): a small Prometheus registry tracking EBICS
//! dialog outcomes, submit/fetch loop ticks, HTTP requests, and store
//! operations. Ambient observability — not a named `spec.md` component,
//! but carried regardless per the transformation rules (a spec silent on
//! metrics still gets them, the way the teacher's services do).

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::sync::Arc;

pub struct Metrics {
    registry: Registry,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    pub ebics_dialogs_total: IntCounterVec,
    pub ebics_dialog_duration_seconds: HistogramVec,

    pub submit_loop_ticks_total: IntCounter,
    pub submit_loop_rows_total: IntCounter,
    pub fetch_loop_ticks_total: IntCounter,
    pub fetch_loop_notifications_total: IntCounter,

    pub store_operations_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Metrics> {
        let registry = Registry::new();

        let http_requests_total = register_int_counter_vec_with_registry!(
            "nexus_http_requests_total",
            "Total HTTP requests handled by the Taler-facing façade, by route and status",
            &["route", "status"],
            registry
        )?;

        let http_request_duration_seconds = register_histogram_vec_with_registry!(
            "nexus_http_request_duration_seconds",
            "HTTP request duration in seconds, by route",
            &["route"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            registry
        )?;

        let ebics_dialogs_total = register_int_counter_vec_with_registry!(
            "nexus_ebics_dialogs_total",
            "Total EBICS dialogs with the bank, by order type and outcome",
            &["order_type", "outcome"],
            registry
        )?;

        let ebics_dialog_duration_seconds = register_histogram_vec_with_registry!(
            "nexus_ebics_dialog_duration_seconds",
            "EBICS dialog duration in seconds, by order type",
            &["order_type"],
            vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            registry
        )?;

        let submit_loop_ticks_total = register_int_counter_with_registry!(
            "nexus_submit_loop_ticks_total",
            "Total submit loop iterations",
            registry
        )?;

        let submit_loop_rows_total = register_int_counter_with_registry!(
            "nexus_submit_loop_rows_total",
            "Total initiated payment rows processed by the submit loop",
            registry
        )?;

        let fetch_loop_ticks_total = register_int_counter_with_registry!(
            "nexus_fetch_loop_ticks_total",
            "Total fetch loop iterations",
            registry
        )?;

        let fetch_loop_notifications_total = register_int_counter_with_registry!(
            "nexus_fetch_loop_notifications_total",
            "Total ISO 20022 notifications ingested by the fetch loop",
            registry
        )?;

        let store_operations_total = register_int_counter_vec_with_registry!(
            "nexus_store_operations_total",
            "Total payment store operations, by operation and outcome",
            &["operation", "outcome"],
            registry
        )?;

        Ok(Metrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            ebics_dialogs_total,
            ebics_dialog_duration_seconds,
            submit_loop_ticks_total,
            submit_loop_rows_total,
            fetch_loop_ticks_total,
            fetch_loop_notifications_total,
            store_operations_total,
        })
    }

    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("metric descriptors are well-formed and register exactly once")));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_produces_prometheus_text_format() {
        METRICS.submit_loop_ticks_total.inc();
        let text = METRICS.export().unwrap();
        assert!(text.contains("nexus_submit_loop_ticks_total"));
    }
}
