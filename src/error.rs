use chrono::NaiveDate;

use crate::model::{ReservationId, ResourceId, Slot};

/// Every outcome of the booking core that is not a success. All of these are
/// recoverable and reported to the caller; none is fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    InvalidSlot { resource_id: ResourceId, slot: Slot },
    InvalidPartySize { party_size: u32, max: u32 },
    PastDate { date: NaiveDate, today: NaiveDate },
    SlotFull { slot: Slot, capacity: u32 },
    NotFound(ReservationId),
    NotOwner(ReservationId),
    AlreadyCancelled(ReservationId),
    UnknownResource(ResourceId),
    /// Transient storage failures outlasted the retry budget.
    Unavailable { attempts: usize, reason: String },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidSlot { resource_id, slot } => {
                write!(f, "slot {slot} is not offered by resource {resource_id}")
            }
            BookingError::InvalidPartySize { party_size, max } => {
                write!(f, "party size {party_size} outside 1..={max}")
            }
            BookingError::PastDate { date, today } => {
                write!(f, "date {date} is before today ({today})")
            }
            BookingError::SlotFull { slot, capacity } => {
                write!(f, "slot {slot} is full: all {capacity} tables taken")
            }
            BookingError::NotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::NotOwner(id) => {
                write!(f, "reservation {id} belongs to another user")
            }
            BookingError::AlreadyCancelled(id) => {
                write!(f, "reservation {id} is already cancelled")
            }
            BookingError::UnknownResource(id) => {
                write!(f, "no slot catalog for resource: {id}")
            }
            BookingError::Unavailable { attempts, reason } => {
                write!(f, "storage unavailable after {attempts} attempts: {reason}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl BookingError {
    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            BookingError::InvalidSlot { .. } => "invalid_slot",
            BookingError::InvalidPartySize { .. } => "invalid_party_size",
            BookingError::PastDate { .. } => "past_date",
            BookingError::SlotFull { .. } => "slot_full",
            BookingError::NotFound(_) => "not_found",
            BookingError::NotOwner(_) => "not_owner",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::UnknownResource(_) => "unknown_resource",
            BookingError::Unavailable { .. } => "unavailable",
            BookingError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}
