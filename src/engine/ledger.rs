use std::collections::HashMap;

use crate::model::*;

/// Every reservation ever made for one (resource, date, slot), in arrival order.
/// Rows are never removed; cancellation flips status in place.
#[derive(Debug, Clone)]
pub struct SlotLedger {
    pub key: SlotKey,
    reservations: Vec<Reservation>,
    /// id → position in `reservations`.
    positions: HashMap<ReservationId, usize>,
}

impl SlotLedger {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            reservations: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Confirmed rows. Derived on every call; there is no stored counter.
    pub fn occupied(&self) -> u32 {
        self.reservations.iter().filter(|r| r.is_confirmed()).count() as u32
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_confirmed())
    }

    pub fn all(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.positions.get(&id).map(|&pos| &self.reservations[pos])
    }

    /// Add a row. Returns false (and keeps the existing row) for a known id.
    pub(super) fn record(&mut self, reservation: Reservation) -> bool {
        if self.positions.contains_key(&reservation.id) {
            return false;
        }
        self.positions.insert(reservation.id, self.reservations.len());
        self.reservations.push(reservation);
        true
    }

    /// Flip a confirmed row to cancelled. False if absent or already cancelled.
    pub(super) fn cancel(&mut self, id: ReservationId, at: Ms) -> bool {
        match self.positions.get(&id) {
            Some(&pos) => self.reservations[pos].cancel(at),
            None => false,
        }
    }
}
