use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;
use crate::store::{CancelOutcome, InsertOutcome, ReservationStore, StoreError};

use super::Engine;

#[async_trait]
impl ReservationStore for Engine {
    async fn insert_within_capacity(
        &self,
        reservation: Reservation,
        capacity: u32,
    ) -> Result<InsertOutcome, StoreError> {
        self.admit(reservation, capacity).await
    }

    async fn confirmed_for(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.confirmed_on(resource_id, date).await)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.find(id).await)
    }

    async fn mark_cancelled(&self, id: ReservationId, at: Ms) -> Result<CancelOutcome, StoreError> {
        self.cancel(id, at).await
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations_of(user_id).await)
    }
}
