use std::sync::Arc;

use tracing::debug;

use crate::error::BookingError;
use crate::model::Reservation;
use crate::observability;
use crate::store::{InsertOutcome, ReservationStore, StoreError};

/// Result of one admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(Reservation),
    /// Always `BookingError::SlotFull`. Nothing was written.
    Rejected(BookingError),
}

/// The authoritative capacity check. Occupancy is recounted by the store
/// inside the same per-key critical section that writes the row, so two
/// requests seeing `capacity - 1` can never both be admitted.
pub struct CapacityGuard<S> {
    store: Arc<S>,
}

impl<S: ReservationStore> CapacityGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn admit(&self, candidate: Reservation, capacity: u32) -> Result<Admission, StoreError> {
        let slot = candidate.slot;
        match self.store.insert_within_capacity(candidate, capacity).await? {
            InsertOutcome::Inserted(reservation) => Ok(Admission::Admitted(reservation)),
            InsertOutcome::AtCapacity { occupied } => {
                metrics::counter!(observability::CAPACITY_REJECTIONS_TOTAL).increment(1);
                debug!(%slot, occupied, capacity, "admission rejected");
                Ok(Admission::Rejected(BookingError::SlotFull { slot, capacity }))
            }
        }
    }
}
