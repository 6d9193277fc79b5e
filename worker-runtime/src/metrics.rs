//! Prometheus metrics for the worker runtime.
//!
//! Counters/histograms recorded by [`crate::consumer::run`] during normal
//! operation; this module only owns description registration and the HTTP
//! exposition server, not the recording calls themselves (those live next
//! to the code paths they measure, per the teacher's convention).
//!
//! # Example
//!
//! ```rust,no_run
//! use platform_worker_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

// Re-export metrics macros for use in other modules.
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter.
    #[error("failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter.
    #[error("failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping. One
/// instance per process; the gateway mounts the render output under its own
/// router instead of running a second server (see `platform-gateway`).
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or another
    /// recorder is already installed for a reason other than test re-entry.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "metrics exporter installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Render current metrics in Prometheus text exposition format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "worker_events_processed_total",
        "Total events successfully processed and committed by a consumer"
    );
    describe_counter!(
        "worker_events_retried_total",
        "Total transient-failure retries attempted across all consumers"
    );
    describe_counter!(
        "worker_events_dead_lettered_total",
        "Total events routed to the dead-letter sink"
    );
    describe_counter!(
        "worker_events_deduplicated_total",
        "Total deliveries skipped because the idempotency ledger already had a record"
    );
    describe_histogram!(
        "worker_handler_duration_seconds",
        "Time taken by a single handler invocation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_server_creation_has_no_handle_until_started() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.render().is_none());
    }

    #[test]
    fn metrics_server_start_installs_a_handle_or_tolerates_reentry() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        assert!(server.start().is_ok());
    }
}
