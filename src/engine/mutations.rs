use std::future::Future;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::limits::MAX_RESERVATIONS_PER_SLOT;
use crate::model::*;
use crate::observability;
use crate::store::{CancelOutcome, InsertOutcome, StoreError};

use super::{lock_slot, persist_and_apply, Engine, WalCommand};

impl Engine {
    /// Count-then-insert under the slot's write lock.
    pub async fn admit(
        &self,
        reservation: Reservation,
        capacity: u32,
    ) -> Result<InsertOutcome, StoreError> {
        let shared = self.shared.clone();
        let wal_tx = self.wal_tx.clone();
        let timeout = self.lock_timeout;

        self.detached(async move {
            let key = reservation.key();
            let ledger = shared.ledger_for(&key);
            let mut guard = lock_slot(ledger, &key, timeout).await?;

            let occupied = guard.occupied();
            if occupied >= capacity {
                debug!(%key, occupied, capacity, "slot full");
                return Ok(InsertOutcome::AtCapacity { occupied });
            }
            if guard.len() >= MAX_RESERVATIONS_PER_SLOT {
                return Err(StoreError::LimitExceeded("too many reservations in one slot"));
            }

            let event = Event::ReservationRecorded {
                reservation: reservation.clone(),
            };
            persist_and_apply(&shared, &wal_tx, &mut guard, &event).await?;
            Ok(InsertOutcome::Inserted(reservation))
        })
        .await
    }

    /// `confirmed → cancelled` under the slot's write lock.
    pub async fn cancel(&self, id: ReservationId, at: Ms) -> Result<CancelOutcome, StoreError> {
        let Some(key) = self.shared.by_id.get(&id).map(|e| e.value().clone()) else {
            return Ok(CancelOutcome::NotFound);
        };
        let shared = self.shared.clone();
        let wal_tx = self.wal_tx.clone();
        let timeout = self.lock_timeout;

        self.detached(async move {
            let ledger = shared.ledger_for(&key);
            let mut guard = lock_slot(ledger, &key, timeout).await?;

            let Some(current) = guard.get(id).cloned() else {
                return Ok(CancelOutcome::NotFound);
            };
            if !current.is_confirmed() {
                return Ok(CancelOutcome::AlreadyCancelled(current));
            }

            let event = Event::ReservationCancelled {
                id,
                key: key.clone(),
                cancelled_at: at,
            };
            persist_and_apply(&shared, &wal_tx, &mut guard, &event).await?;
            match guard.get(id) {
                Some(updated) => Ok(CancelOutcome::Cancelled(updated.clone())),
                None => Ok(CancelOutcome::NotFound),
            }
        })
        .await
    }

    /// Rewrite the WAL as one `ReservationRecorded` per reservation, in its
    /// current state. Appends racing with the snapshot are carried over by
    /// the writer; replay ignores the duplicates.
    pub async fn compact_wal(&self) -> Result<usize, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::BeginCompact { response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?;

        let ledgers: Vec<_> = self
            .shared
            .ledgers
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut snapshot = Vec::new();
        for ledger in ledgers {
            let guard = ledger.read().await;
            snapshot.extend(guard.all().iter().cloned());
        }
        snapshot.sort_by_key(|r| (r.created_at, r.id));
        let snapshot = snapshot
            .into_iter()
            .map(|reservation| Event::ReservationRecorded { reservation })
            .collect();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                snapshot,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        let written = rx
            .await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = written, "WAL compacted");
        Ok(written)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Run a commit on its own task. A caller that stops polling cannot
    /// separate the WAL write from the in-memory apply.
    async fn detached<T>(
        &self,
        commit: impl Future<Output = Result<T, StoreError>> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        tokio::spawn(commit)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?
    }
}
