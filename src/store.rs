use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{Ms, Reservation, ReservationId, ResourceId, UserId};

/// Result of the conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Reservation),
    /// Nothing was written; `occupied` confirmed reservations already hold the slot.
    AtCapacity { occupied: u32 },
}

/// Result of the status compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Reservation),
    AlreadyCancelled(Reservation),
    NotFound,
}

/// Durable reservation records: the persistence collaborator.
///
/// Implementations must make `insert_within_capacity` atomic per
/// (resource, date, slot): the confirmed count is read and the row written
/// under one serialization point scoped to that key alone.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert `reservation` only if fewer than `capacity` confirmed
    /// reservations exist for its key at the moment of writing.
    async fn insert_within_capacity(
        &self,
        reservation: Reservation,
        capacity: u32,
    ) -> Result<InsertOutcome, StoreError>;

    /// Confirmed reservations of one resource on one day, any slot.
    async fn confirmed_for(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Flip `confirmed → cancelled`. Never touches an already-cancelled row.
    async fn mark_cancelled(&self, id: ReservationId, at: Ms) -> Result<CancelOutcome, StoreError>;

    /// All reservations made by `user_id`, newest first.
    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The log could not be written. The failed entries were cut back out of
    /// the file and nothing was applied, so the operation may be retried.
    Wal(String),
    /// A failed write could not be rolled back. The log may hold an entry its
    /// caller was told failed; the writer refuses every later append.
    WalPoisoned(String),
    /// The slot's lock was not acquired in time.
    Contention(String),
    LimitExceeded(&'static str),
    /// A commit task died before reporting back.
    Internal(String),
}

impl StoreError {
    /// Worth another full admission attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Wal(_) | StoreError::Contention(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::WalPoisoned(e) => write!(f, "WAL writer poisoned: {e}"),
            StoreError::Contention(key) => write!(f, "lock contention on {key}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Internal(e) => write!(f, "internal store error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
