use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Barrier;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use super::*;
use crate::clock::FixedClock;
use crate::engine::Engine;
use crate::notify::NotifyHub;
use crate::store::InsertOutcome;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("tablebook_test_booking");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn catalog() -> Arc<SlotCatalog> {
    Arc::new(
        SlotCatalog::default()
            .with_resource("R1", &["18:00", "18:30"], Some(3))
            .unwrap()
            .with_resource("R2", &["12:00"], Some(1))
            .unwrap(),
    )
}

fn service_on<S: ReservationStore>(store: S) -> BookingService<S> {
    BookingService::new(Arc::new(store), catalog())
        .with_clock(Arc::new(FixedClock::on(today())))
        .with_retry(
            RetryPolicy::builder()
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(4))
                .build(),
        )
}

fn service(name: &str) -> BookingService<Engine> {
    service_on(Engine::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap())
}

fn req(resource: &str, user: &str, slot: &str, party_size: u32) -> BookingRequest {
    BookingRequest {
        resource_id: resource.into(),
        user_id: user.into(),
        date: today(),
        slot: slot.parse().unwrap(),
        party_size,
    }
}

#[tokio::test]
async fn restaurant_evening_scenario() {
    let svc = service("scenario.wal");

    let first = assert_ok!(svc.book(req("R1", "alice", "18:00", 2)).await);
    for user in ["bob", "carol"] {
        let r = assert_ok!(svc.book(req("R1", user, "18:00", 2)).await);
        assert_eq!(r.status, ReservationStatus::Confirmed);
    }
    assert_eq!(
        svc.book(req("R1", "dave", "18:00", 2)).await,
        Err(BookingError::SlotFull {
            slot: Slot::at(18, 0),
            capacity: 3
        })
    );

    assert_ok!(svc.cancel(first.id, &"alice".into()).await);
    assert_ok!(svc.book(req("R1", "erin", "18:00", 2)).await);

    let view = svc.availability(&"R1".into(), today()).await.unwrap();
    assert_eq!(
        view,
        vec![
            SlotAvailability { slot: Slot::at(18, 0), occupied: 3, capacity: 3, is_open: false },
            SlotAvailability { slot: Slot::at(18, 30), occupied: 0, capacity: 3, is_open: true },
        ]
    );
}

#[tokio::test]
async fn cancellation_frees_exactly_one_seat() {
    let svc = service("frees_one.wal");
    let mut booked = Vec::new();
    for i in 0..3 {
        booked.push(assert_ok!(svc.book(req("R1", &format!("u{i}"), "18:30", 1)).await));
    }
    let fourth = req("R1", "u3", "18:30", 1);
    assert!(matches!(svc.book(fourth.clone()).await, Err(BookingError::SlotFull { .. })));

    assert_ok!(svc.cancel(booked[1].id, &"u1".into()).await);
    assert_ok!(svc.book(fourth.clone()).await);
    assert!(matches!(svc.book(fourth).await, Err(BookingError::SlotFull { .. })));
    assert!(!svc.is_available(&"R1".into(), today(), Slot::at(18, 30)).await.unwrap());
}

#[tokio::test]
async fn validation_precedes_capacity() {
    let svc = service("validation.wal");
    assert_ok!(svc.book(req("R2", "a", "12:00", 2)).await);

    // R2 is full, yet an invalid slot is still reported as such.
    assert_eq!(
        svc.book(req("R2", "b", "12:30", 2)).await,
        Err(BookingError::InvalidSlot {
            resource_id: "R2".into(),
            slot: Slot::at(12, 30)
        })
    );
    assert_eq!(
        svc.book(req("R2", "b", "12:00", 0)).await,
        Err(BookingError::InvalidPartySize { party_size: 0, max: 8 })
    );
    assert_eq!(
        svc.book(req("R2", "b", "12:00", 9)).await,
        Err(BookingError::InvalidPartySize { party_size: 9, max: 8 })
    );
    assert_eq!(
        svc.book(req("Nope", "b", "12:00", 2)).await,
        Err(BookingError::UnknownResource("Nope".into()))
    );
}

#[tokio::test]
async fn validation_order_between_rules() {
    let svc = service("validation_order.wal");
    let yesterday = today().pred_opt().unwrap();

    // Past date wins over everything else.
    let mut past = req("Nope", "a", "03:00", 0);
    past.date = yesterday;
    assert_eq!(
        svc.book(past).await,
        Err(BookingError::PastDate { date: yesterday, today: today() })
    );
    // Unknown resource beats a bad slot; a bad slot beats a bad party size.
    assert!(matches!(
        svc.book(req("Nope", "a", "03:00", 0)).await,
        Err(BookingError::UnknownResource(_))
    ));
    assert!(matches!(
        svc.book(req("R1", "a", "03:00", 0)).await,
        Err(BookingError::InvalidSlot { .. })
    ));
    // No rejection wrote anything.
    assert_eq!(svc.store().reservation_count(), 0);
}

#[tokio::test]
async fn same_day_booking_is_allowed() {
    let svc = service("same_day.wal");
    let r = assert_ok!(svc.book(req("R1", "a", "18:00", 2)).await);
    assert_eq!(r.date, today());
}

#[tokio::test]
async fn cancellation_ownership_and_state() {
    let svc = service("ownership.wal");
    let r = assert_ok!(svc.book(req("R1", "alice", "18:00", 2)).await);

    assert_eq!(svc.cancel(r.id, &"mallory".into()).await, Err(BookingError::NotOwner(r.id)));
    assert_eq!(svc.reservation(r.id).await.unwrap().status, ReservationStatus::Confirmed);

    let cancelled = assert_ok!(svc.cancel(r.id, &"alice".into()).await);
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(
        svc.cancel(r.id, &"alice".into()).await,
        Err(BookingError::AlreadyCancelled(r.id))
    );

    let missing = Ulid::new();
    assert_eq!(svc.cancel(missing, &"alice".into()).await, Err(BookingError::NotFound(missing)));
    assert_eq!(svc.reservation(missing).await, Err(BookingError::NotFound(missing)));
}

#[tokio::test]
async fn reservations_for_user() {
    let svc = service("for_user.wal");
    let a = assert_ok!(svc.book(req("R1", "alice", "18:00", 2)).await);
    let b = assert_ok!(svc.book(req("R2", "alice", "12:00", 4)).await);
    assert_ok!(svc.book(req("R1", "bob", "18:00", 2)).await);

    let all = svc.reservations_for(&"alice".into(), None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|r| r.id == a.id) && all.iter().any(|r| r.id == b.id));

    let r1 = svc.reservations_for(&"alice".into(), Some(&"R1".into())).await.unwrap();
    assert_eq!(r1, vec![a]);
}

#[tokio::test]
async fn availability_unknown_resource() {
    let svc = service("avail_unknown.wal");
    assert_err!(svc.availability(&"Nope".into(), today()).await);
}

// ── Races ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_seat_goes_to_exactly_one() {
    let svc = Arc::new(service("last_seat.wal"));
    assert_ok!(svc.book(req("R1", "u0", "18:00", 2)).await);
    assert_ok!(svc.book(req("R1", "u1", "18:00", 2)).await);

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for user in ["left", "right"] {
        let svc = svc.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            svc.book(req("R1", user, "18:00", 2)).await
        }));
    }
    let mut wins = 0;
    let mut full = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(BookingError::SlotFull { .. }) => full += 1,
            Err(e) => panic!("unexpected rejection: {e}"),
        }
    }
    assert_eq!((wins, full), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_bookings_never_exceed_capacity() {
    let svc = Arc::new(service("many_concurrent.wal"));
    let k = 40;
    let barrier = Arc::new(Barrier::new(k));

    let mut handles = Vec::new();
    for i in 0..k {
        let svc = svc.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            svc.book(req("R1", &format!("u{i}"), "18:30", 2)).await
        }));
    }
    let mut admitted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => assert!(matches!(e, BookingError::SlotFull { .. }), "{e}"),
        }
    }
    assert_eq!(admitted, 3);
    let view = svc.availability(&"R1".into(), today()).await.unwrap();
    assert_eq!(view[1].occupied, 3);
}

// ── Transient failures ───────────────────────────────────────

/// Wraps an engine and fails the first `failures` inserts with `failure`
/// (contention unless set). When `interloper` is set, it is admitted just
/// before the first failure.
struct FlakyStore {
    inner: Engine,
    failures: AtomicUsize,
    failure: StoreError,
    inserts: AtomicUsize,
    interloper: Mutex<Option<Reservation>>,
}

impl FlakyStore {
    fn new(name: &str, failures: usize) -> Self {
        Self {
            inner: Engine::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap(),
            failures: AtomicUsize::new(failures),
            failure: StoreError::Contention("R1/2026-10-16/18:00".into()),
            inserts: AtomicUsize::new(0),
            interloper: Mutex::new(None),
        }
    }

    fn failing_with(mut self, failure: StoreError) -> Self {
        self.failure = failure;
        self
    }
}

#[async_trait]
impl ReservationStore for FlakyStore {
    async fn insert_within_capacity(
        &self,
        reservation: Reservation,
        capacity: u32,
    ) -> Result<InsertOutcome, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let interloper = self.interloper.lock().unwrap().take();
        if let Some(other) = interloper {
            self.inner.insert_within_capacity(other, capacity).await?;
        }
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(self.failure.clone());
        }
        self.inner.insert_within_capacity(reservation, capacity).await
    }

    async fn confirmed_for(
        &self,
        resource_id: &ResourceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.inner.confirmed_for(resource_id, date).await
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.inner.get(id).await
    }

    async fn mark_cancelled(&self, id: ReservationId, at: Ms) -> Result<CancelOutcome, StoreError> {
        self.inner.mark_cancelled(id, at).await
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Reservation>, StoreError> {
        self.inner.for_user(user_id).await
    }
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let svc = service_on(FlakyStore::new("flaky_retry.wal", 2));
    let r = assert_ok!(svc.book(req("R1", "alice", "18:00", 2)).await);
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 3);
    assert_eq!(svc.reservation(r.id).await.unwrap(), r);
}

#[tokio::test]
async fn retries_exhausted_is_unavailable() {
    let svc = service_on(FlakyStore::new("flaky_exhausted.wal", 100));
    let err = assert_err!(svc.book(req("R1", "alice", "18:00", 2)).await);
    assert!(matches!(err, BookingError::Unavailable { attempts: 4, .. }), "{err}");
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 4);
    assert!(svc.reservations_for(&"alice".into(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn no_retry_policy_fails_fast() {
    let svc = service_on(FlakyStore::new("flaky_none.wal", 1)).with_retry(RetryPolicy::none());
    let err = assert_err!(svc.book(req("R1", "alice", "18:00", 2)).await);
    assert!(matches!(err, BookingError::Unavailable { attempts: 1, .. }));
}

#[tokio::test]
async fn retry_recounts_after_competing_commit() {
    let store = FlakyStore::new("flaky_recount.wal", 1);
    // The last seat is taken while our first attempt fails.
    *store.interloper.lock().unwrap() = Some(Reservation::confirmed(
        "R2".into(),
        "sneaky".into(),
        today(),
        Slot::at(12, 0),
        2,
        0,
    ));
    let svc = service_on(store);

    assert_eq!(
        svc.book(req("R2", "alice", "12:00", 2)).await,
        Err(BookingError::SlotFull {
            slot: Slot::at(12, 0),
            capacity: 1
        })
    );
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 2);
    assert!(svc.reservations_for(&"alice".into(), None).await.unwrap().is_empty());
}

// ── Non-transient failures ───────────────────────────────────

#[tokio::test]
async fn oversized_user_id_never_reaches_the_store() {
    let svc = service_on(FlakyStore::new("long_user.wal", 0));
    let long = "u".repeat(MAX_ID_LEN + 1);

    assert_eq!(
        svc.book(req("R1", &long, "18:00", 2)).await,
        Err(BookingError::LimitExceeded("user id too long"))
    );
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 0);
    assert_eq!(svc.store().inner.reservation_count(), 0);
    assert_eq!(svc.store().inner.wal_appends_since_compact().await, 0);

    let at_limit = "u".repeat(MAX_ID_LEN);
    assert_ok!(svc.book(req("R1", &at_limit, "18:00", 2)).await);
}

#[tokio::test]
async fn store_limit_is_not_retried() {
    let store = FlakyStore::new("store_limit.wal", 100)
        .failing_with(StoreError::LimitExceeded("too many reservations in one slot"));
    let svc = service_on(store);

    assert_eq!(
        svc.book(req("R1", "alice", "18:00", 2)).await,
        Err(BookingError::LimitExceeded("too many reservations in one slot"))
    );
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 1);
    assert_eq!(svc.store().inner.reservation_count(), 0);
}

#[tokio::test]
async fn poisoned_log_is_not_retried() {
    let store = FlakyStore::new("poisoned_log.wal", 100)
        .failing_with(StoreError::WalPoisoned("fsync failed; rollback failed".into()));
    let svc = service_on(store);

    let err = assert_err!(svc.book(req("R1", "alice", "18:00", 2)).await);
    assert!(matches!(err, BookingError::Unavailable { attempts: 1, .. }), "{err}");
    assert_eq!(svc.store().inserts.load(Ordering::SeqCst), 1);
}
