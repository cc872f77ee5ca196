use chrono::NaiveDate;

use crate::model::*;

use super::Engine;

impl Engine {
    /// Every reservation of one resource on one day, confirmed or not,
    /// ordered by slot then arrival.
    pub async fn reservations_on(&self, resource_id: &ResourceId, date: NaiveDate) -> Vec<Reservation> {
        let day = (resource_id.clone(), date);
        let Some(slots) = self.shared.days.get(&day).map(|e| e.value().clone()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for slot in slots {
            let key = SlotKey::new(resource_id.clone(), date, slot);
            let Some(ledger) = self.shared.ledgers.get(&key).map(|e| e.value().clone()) else {
                continue;
            };
            let guard = ledger.read().await;
            out.extend(guard.all().iter().cloned());
        }
        out
    }

    /// Confirmed rows only, in the same order as [`Engine::reservations_on`].
    pub async fn confirmed_on(&self, resource_id: &ResourceId, date: NaiveDate) -> Vec<Reservation> {
        let mut all = self.reservations_on(resource_id, date).await;
        all.retain(Reservation::is_confirmed);
        all
    }

    pub async fn find(&self, id: ReservationId) -> Option<Reservation> {
        let key = self.shared.by_id.get(&id).map(|e| e.value().clone())?;
        let ledger = self.shared.ledgers.get(&key).map(|e| e.value().clone())?;
        let guard = ledger.read().await;
        guard.get(id).cloned()
    }

    /// A user's reservations, newest first.
    pub async fn reservations_of(&self, user_id: &UserId) -> Vec<Reservation> {
        let ids = self
            .shared
            .by_user
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.find(id).await {
                out.push(r);
            }
        }
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }
}
