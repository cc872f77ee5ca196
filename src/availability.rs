use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::catalog::SlotCatalog;
use crate::error::BookingError;
use crate::model::*;
use crate::store::{ReservationStore, StoreError};

/// Confirmed count per catalog slot for one (resource, date).
/// Every catalog slot is present; never-booked slots hold 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Occupancy {
    counts: BTreeMap<Slot, u32>,
}

impl Occupancy {
    pub fn get(&self, slot: Slot) -> Option<u32> {
        self.counts.get(&slot).copied()
    }

    /// `occupied < capacity`. False for a slot outside the catalog.
    pub fn is_available(&self, slot: Slot, capacity: u32) -> bool {
        self.get(slot).is_some_and(|occupied| occupied < capacity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, u32)> + '_ {
        self.counts.iter().map(|(s, n)| (*s, *n))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Tally confirmed reservations onto `slots`. Rows for other slots and
/// cancelled rows are ignored.
pub fn tally<'a>(slots: &[Slot], reservations: impl IntoIterator<Item = &'a Reservation>) -> Occupancy {
    let mut counts: BTreeMap<Slot, u32> = slots.iter().map(|s| (*s, 0)).collect();
    for r in reservations {
        if !r.is_confirmed() {
            continue;
        }
        if let Some(n) = counts.get_mut(&r.slot) {
            *n += 1;
        }
    }
    Occupancy { counts }
}

/// Read-side occupancy. Advisory only: admission recounts under the slot lock.
pub struct AvailabilityIndex<S> {
    store: Arc<S>,
    catalog: Arc<SlotCatalog>,
}

impl<S: ReservationStore> AvailabilityIndex<S> {
    pub fn new(store: Arc<S>, catalog: Arc<SlotCatalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn occupancy(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Occupancy, BookingError> {
        let slots = self.catalog.slots_for(resource_id)?;
        let confirmed = self
            .store
            .confirmed_for(resource_id, date)
            .await
            .map_err(read_error)?;
        Ok(tally(slots, &confirmed))
    }

    pub async fn is_available(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
        slot: Slot,
        capacity: u32,
    ) -> Result<bool, BookingError> {
        Ok(self.occupancy(resource_id, date).await?.is_available(slot, capacity))
    }
}

fn read_error(e: StoreError) -> BookingError {
    match e {
        StoreError::LimitExceeded(msg) => BookingError::LimitExceeded(msg),
        other => BookingError::Unavailable {
            attempts: 1,
            reason: other.to_string(),
        },
    }
}
