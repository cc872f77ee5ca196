#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::availability::AvailabilityIndex;
use crate::catalog::SlotCatalog;
use crate::clock::{Clock, SystemClock};
use crate::error::BookingError;
use crate::guard::{Admission, CapacityGuard};
use crate::limits::{DEFAULT_MAX_PARTY_SIZE, MAX_ID_LEN};
use crate::model::*;
use crate::observability;
use crate::retry::RetryPolicy;
use crate::store::{CancelOutcome, ReservationStore, StoreError};

/// One `book` call, as handed over by the host service. `user_id` is
/// already authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub slot: Slot,
    pub party_size: u32,
}

/// The only entry point for callers: validates, admits, cancels and lists.
pub struct BookingService<S> {
    store: Arc<S>,
    catalog: Arc<SlotCatalog>,
    index: AvailabilityIndex<S>,
    guard: CapacityGuard<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    max_party_size: u32,
}

impl<S: ReservationStore> BookingService<S> {
    pub fn new(store: Arc<S>, catalog: Arc<SlotCatalog>) -> Self {
        Self {
            index: AvailabilityIndex::new(store.clone(), catalog.clone()),
            guard: CapacityGuard::new(store.clone()),
            store,
            catalog,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            max_party_size: DEFAULT_MAX_PARTY_SIZE,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_party_size(mut self, max_party_size: u32) -> Self {
        self.max_party_size = max_party_size;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<SlotCatalog> {
        &self.catalog
    }

    // ── Booking ──────────────────────────────────────────────

    pub async fn book(&self, request: BookingRequest) -> Result<Reservation, BookingError> {
        let start = Instant::now();
        let result = self.try_book(&request).await;
        metrics::histogram!(observability::BOOK_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(reservation) => {
                info!(
                    id = %reservation.id,
                    resource = %reservation.resource_id,
                    user = %reservation.user_id,
                    date = %reservation.date,
                    slot = %reservation.slot,
                    party = reservation.party_size,
                    "reservation confirmed"
                );
                "confirmed"
            }
            Err(e @ BookingError::Unavailable { .. }) => {
                error!(resource = %request.resource_id, slot = %request.slot, "booking failed: {e}");
                e.label()
            }
            Err(e) => {
                debug!(resource = %request.resource_id, slot = %request.slot, "booking rejected: {e}");
                e.label()
            }
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_book(&self, request: &BookingRequest) -> Result<Reservation, BookingError> {
        let today = self.clock.today();
        if request.date < today {
            return Err(BookingError::PastDate {
                date: request.date,
                today,
            });
        }
        let entry = self.catalog.entry(&request.resource_id)?;
        if !entry.offers(request.slot) {
            return Err(BookingError::InvalidSlot {
                resource_id: request.resource_id.clone(),
                slot: request.slot,
            });
        }
        if request.party_size == 0 || request.party_size > self.max_party_size {
            return Err(BookingError::InvalidPartySize {
                party_size: request.party_size,
                max: self.max_party_size,
            });
        }

        if request.user_id.as_str().len() > MAX_ID_LEN {
            return Err(BookingError::LimitExceeded("user id too long"));
        }

        let capacity = entry.capacity;
        // Each attempt is a fresh candidate and a fresh recount.
        let admission = self
            .retrying("book", || {
                let candidate = Reservation::confirmed(
                    request.resource_id.clone(),
                    request.user_id.clone(),
                    request.date,
                    request.slot,
                    request.party_size,
                    self.clock.now_ms(),
                );
                self.guard.admit(candidate, capacity)
            })
            .await?;
        match admission {
            Admission::Admitted(reservation) => Ok(reservation),
            Admission::Rejected(rejection) => Err(rejection),
        }
    }

    // ── Cancellation ─────────────────────────────────────────

    /// Cancel a confirmed reservation owned by `user_id`.
    pub async fn cancel(&self, id: ReservationId, user_id: &UserId) -> Result<Reservation, BookingError> {
        let result = self.try_cancel(id, user_id).await;
        let outcome = match &result {
            Ok(reservation) => {
                info!(
                    %id,
                    resource = %reservation.resource_id,
                    date = %reservation.date,
                    slot = %reservation.slot,
                    "reservation cancelled"
                );
                "cancelled"
            }
            Err(e) => {
                debug!(%id, user = %user_id, "cancellation rejected: {e}");
                e.label()
            }
        };
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_cancel(&self, id: ReservationId, user_id: &UserId) -> Result<Reservation, BookingError> {
        // Owner never changes, so checking it on a snapshot is sound.
        let existing = self
            .retrying("get", || self.store.get(id))
            .await?
            .ok_or(BookingError::NotFound(id))?;
        if existing.user_id != *user_id {
            return Err(BookingError::NotOwner(id));
        }
        if !existing.is_confirmed() {
            return Err(BookingError::AlreadyCancelled(id));
        }

        let outcome = self
            .retrying("cancel", || self.store.mark_cancelled(id, self.clock.now_ms()))
            .await?;
        match outcome {
            CancelOutcome::Cancelled(reservation) => Ok(reservation),
            CancelOutcome::AlreadyCancelled(_) => Err(BookingError::AlreadyCancelled(id)),
            CancelOutcome::NotFound => Err(BookingError::NotFound(id)),
        }
    }

    // ── Reads ────────────────────────────────────────────────

    /// Display view of every catalog slot. Advisory; never used for admission.
    pub async fn availability(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<SlotAvailability>, BookingError> {
        let capacity = self.catalog.capacity_for(resource_id)?;
        let occupancy = self.index.occupancy(resource_id, date).await?;
        Ok(occupancy
            .iter()
            .map(|(slot, occupied)| SlotAvailability {
                slot,
                occupied,
                capacity,
                is_open: occupied < capacity,
            })
            .collect())
    }

    pub async fn is_available(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
        slot: Slot,
    ) -> Result<bool, BookingError> {
        let capacity = self.catalog.capacity_for(resource_id)?;
        self.index.is_available(resource_id, date, slot, capacity).await
    }

    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        self.retrying("get", || self.store.get(id))
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    /// A user's reservations, newest first, optionally for one resource.
    pub async fn reservations_for(
        &self,
        user_id: &UserId,
        resource_id: Option<&ResourceId>,
    ) -> Result<Vec<Reservation>, BookingError> {
        let mut reservations = self.retrying("for_user", || self.store.for_user(user_id)).await?;
        if let Some(resource_id) = resource_id {
            reservations.retain(|r| &r.resource_id == resource_id);
        }
        Ok(reservations)
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget
    /// runs out. `op` is re-invoked from scratch on every attempt.
    async fn retrying<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    metrics::counter!(observability::ADMISSION_RETRIES_TOTAL, "op" => what).increment(1);
                    warn!(op = what, attempt, ?delay, "transient store failure, retrying: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(StoreError::LimitExceeded(msg)) => return Err(BookingError::LimitExceeded(msg)),
                Err(e) => {
                    return Err(BookingError::Unavailable {
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
