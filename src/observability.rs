use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts. Labels: outcome (`confirmed` or a rejection label).
pub const BOOKINGS_TOTAL: &str = "tablebook_bookings_total";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "tablebook_cancellations_total";

/// Histogram: end-to-end `book` latency in seconds, retries included.
pub const BOOK_DURATION_SECONDS: &str = "tablebook_book_duration_seconds";

/// Counter: admissions re-run after a transient store failure.
pub const ADMISSION_RETRIES_TOTAL: &str = "tablebook_admission_retries_total";

/// Counter: admissions rejected because the slot was already full.
pub const CAPACITY_REJECTIONS_TOTAL: &str = "tablebook_capacity_rejections_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a slot's write lock, in seconds.
pub const SLOT_LOCK_WAIT_SECONDS: &str = "tablebook_slot_lock_wait_seconds";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "tablebook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), ConfigError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ConfigError::Metrics(e.to_string()))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
