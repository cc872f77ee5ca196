use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for creation and cancellation stamps.
pub type Ms = i64;

/// Assigned by the engine when a booking is admitted.
pub type ReservationId = Ulid;

/// Opaque restaurant id handed in by the resource collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Authenticated user id handed in by the identity collaborator. Trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Slots ────────────────────────────────────────────────────────

/// A bookable time of day, stored as minutes since midnight and labelled `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot {
    minutes: u16,
}

impl Slot {
    /// `None` unless `hour < 24` and `minute < 60`.
    pub const fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minutes: hour * 60 + minute,
            })
        } else {
            None
        }
    }

    /// For constant tables such as the standard grid.
    ///
    /// # Panics
    ///
    /// On an out-of-range time; a `const` use fails to compile instead.
    /// Use [`Slot::new`] for values that are not known in advance.
    pub const fn at(hour: u16, minute: u16) -> Self {
        match Self::new(hour, minute) {
            Some(slot) => slot,
            None => panic!("slot out of range"),
        }
    }

    pub fn hour(&self) -> u16 {
        self.minutes / 60
    }

    pub fn minute(&self) -> u16 {
        self.minutes % 60
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for Slot {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SlotParseError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(bad)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(bad());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let hour: u16 = h.parse().map_err(|_| bad())?;
        let minute: u16 = m.parse().map_err(|_| bad())?;
        Self::new(hour, minute).ok_or_else(bad)
    }
}

impl TryFrom<String> for Slot {
    type Error = SlotParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotParseError(pub String);

impl fmt::Display for SlotParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid slot label {:?} (expected HH:MM)", self.0)
    }
}

impl std::error::Error for SlotParseError {}

/// The unit of admission: one slot of one resource on one day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub slot: Slot,
}

impl SlotKey {
    pub fn new(resource_id: ResourceId, date: NaiveDate, slot: Slot) -> Self {
        Self {
            resource_id,
            date,
            slot,
        }
    }

    pub fn day(&self) -> DayKey {
        (self.resource_id.clone(), self.date)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.resource_id, self.date, self.slot)
    }
}

pub type DayKey = (ResourceId, NaiveDate);

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub slot: Slot,
    pub party_size: u32,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub cancelled_at: Option<Ms>,
}

impl Reservation {
    /// A fresh booking. Reservations are born confirmed; there is no pending state.
    pub fn confirmed(
        resource_id: ResourceId,
        user_id: UserId,
        date: NaiveDate,
        slot: Slot,
        party_size: u32,
        created_at: Ms,
    ) -> Self {
        Self {
            id: Ulid::new(),
            resource_id,
            user_id,
            date,
            slot,
            party_size,
            status: ReservationStatus::Confirmed,
            created_at,
            cancelled_at: None,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.resource_id.clone(), self.date, self.slot)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    /// The only status transition. Returns false (and changes nothing) when
    /// the reservation is already cancelled.
    pub fn cancel(&mut self, at: Ms) -> bool {
        if !self.is_confirmed() {
            return false;
        }
        self.status = ReservationStatus::Cancelled;
        self.cancelled_at = Some(at);
        true
    }
}

/// WAL record format. Reservations are never deleted, so there is no removal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A reservation in the given state. Admission writes it confirmed;
    /// compaction rewrites every reservation in its current state.
    ReservationRecorded { reservation: Reservation },
    ReservationCancelled {
        id: ReservationId,
        key: SlotKey,
        cancelled_at: Ms,
    },
}

impl Event {
    pub fn key(&self) -> SlotKey {
        match self {
            Event::ReservationRecorded { reservation } => reservation.key(),
            Event::ReservationCancelled { key, .. } => key.clone(),
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Event::ReservationRecorded { reservation } => &reservation.resource_id,
            Event::ReservationCancelled { key, .. } => &key.resource_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Display row for one slot of a (resource, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotAvailability {
    pub slot: Slot,
    pub occupied: u32,
    pub capacity: u32,
    pub is_open: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn slot_parse_and_display() {
        let s: Slot = "18:30".parse().unwrap();
        assert_eq!(s, Slot::at(18, 30));
        assert_eq!(s.to_string(), "18:30");
        assert_eq!(s.minutes_since_midnight(), 18 * 60 + 30);

        // single-digit hour is accepted, printed zero-padded
        let early: Slot = "9:05".parse().unwrap();
        assert_eq!(early.to_string(), "09:05");
    }

    #[test]
    fn slot_new_checks_range() {
        assert_eq!(Slot::new(18, 30), Some(Slot::at(18, 30)));
        assert_eq!(Slot::new(0, 0).map(|s| s.minutes_since_midnight()), Some(0));
        assert_eq!(Slot::new(23, 59).map(|s| s.to_string()).as_deref(), Some("23:59"));
        assert_eq!(Slot::new(24, 0), None);
        assert_eq!(Slot::new(12, 60), None);
        assert_eq!(Slot::new(u16::MAX, u16::MAX), None);
    }

    #[test]
    fn slot_parse_rejects_garbage() {
        for bad in ["", "18", "18:3", "18:3O", "24:00", "12:60", "-1:00", "18:300", " 18:00", "1800"] {
            assert!(bad.parse::<Slot>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn slots_order_by_time_of_day() {
        let mut slots: Vec<Slot> = ["20:00", "11:30", "18:00"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        slots.sort();
        assert_eq!(slots, vec![Slot::at(11, 30), Slot::at(18, 0), Slot::at(20, 0)]);
    }

    #[test]
    fn reservation_cancel_is_one_way() {
        let mut r = Reservation::confirmed("R1".into(), "alice".into(), day(), Slot::at(18, 0), 2, 1_000);
        assert!(r.is_confirmed());
        assert!(r.cancel(2_000));
        assert_eq!(r.status, ReservationStatus::Cancelled);
        assert_eq!(r.cancelled_at, Some(2_000));

        // second cancel changes nothing, stamp is preserved
        assert!(!r.cancel(3_000));
        assert_eq!(r.cancelled_at, Some(2_000));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let reservation = Reservation::confirmed("R1".into(), "bob".into(), day(), Slot::at(18, 30), 4, 42);
        let event = Event::ReservationRecorded { reservation };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn slot_serializes_as_label() {
        let json = serde_json::to_string(&Slot::at(7, 0)).unwrap();
        assert_eq!(json, "\"07:00\"");
        let back: Slot = serde_json::from_str("\"21:00\"").unwrap();
        assert_eq!(back, Slot::at(21, 0));
        assert!(serde_json::from_str::<Slot>("\"25:00\"").is_err());
    }
}
