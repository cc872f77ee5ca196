//! Capacity-bounded table reservations.
//!
//! [`BookingService`] is the entry point. Admission for one
//! (resource, date, slot) is serialized by that key's ledger lock in the
//! [`Engine`]; unrelated keys never wait on each other. State is durable
//! through a group-committed write-ahead log.

pub mod availability;
pub mod booking;
pub mod catalog;
pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod retry;
pub mod store;
pub mod wal;

use std::sync::Arc;

use tracing::info;

pub use booking::{BookingRequest, BookingService};
pub use catalog::SlotCatalog;
pub use config::{Config, ConfigError};
pub use engine::Engine;
pub use error::BookingError;
pub use model::{Reservation, ReservationId, ReservationStatus, ResourceId, Slot, SlotAvailability, UserId};
pub use store::{ReservationStore, StoreError};

/// Open the WAL-backed service described by `config` and start background
/// compaction. Must be called inside a Tokio runtime.
pub fn open(config: &Config) -> Result<Arc<BookingService<Engine>>, ConfigError> {
    let catalog_path = config
        .catalog_path
        .as_deref()
        .ok_or(ConfigError::Missing("TABLEBOOK_CATALOG"))?;
    let catalog = SlotCatalog::load(catalog_path)?;

    std::fs::create_dir_all(&config.data_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
    observability::init(config.metrics_port)?;

    let notify = Arc::new(notify::NotifyHub::new());
    let engine = Engine::new(config.wal_path(), notify)
        .map_err(|e| ConfigError::Io(e.to_string()))?
        .with_lock_timeout(config.lock_timeout);
    let engine = Arc::new(engine);

    if config.compact_threshold > 0 {
        tokio::spawn(compactor::run_compactor(
            Arc::downgrade(&engine),
            config.compact_threshold,
        ));
    }

    info!(
        data_dir = %config.data_dir.display(),
        resources = catalog.len(),
        compact_threshold = config.compact_threshold,
        "tablebook open"
    );

    let service = BookingService::new(engine, Arc::new(catalog))
        .with_retry(config.retry.clone())
        .with_max_party_size(config.max_party_size);
    Ok(Arc::new(service))
}
