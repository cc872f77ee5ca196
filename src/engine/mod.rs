mod ledger;
mod mutations;
mod queries;
mod store;

pub use ledger::SlotLedger;

use std::collections::HashMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::{error, info, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::store::StoreError;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<SlotLedger>>;

type AppendResponse = oneshot::Sender<Result<(), StoreError>>;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: AppendResponse,
    },
    /// Start recording every flushed event until the matching `Compact`.
    BeginCompact {
        response: oneshot::Sender<()>,
    },
    /// Rewrite the log as `snapshot` plus everything flushed since `BeginCompact`.
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<usize>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL file. Runs as a single background task and exits once every
/// sender is gone.
struct WalWriter {
    wal: Wal,
    /// Events flushed since the current compaction began.
    tail: Option<Vec<Event>>,
    /// Set when a failed batch could not be cut back out of the file.
    poisoned: Option<String>,
}

impl WalWriter {
    fn new(wal: Wal) -> Self {
        Self {
            wal,
            tail: None,
            poisoned: None,
        }
    }
}

/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued (the batch window).
/// 3. One flush_sync for the whole batch, then answer every sender.
/// A control command found while draining runs right after the batch.
async fn wal_writer_loop(mut writer: WalWriter, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                writer.commit_batch(batch);
                if let Some(cmd) = deferred {
                    writer.handle_control(cmd);
                }
            }
            other => writer.handle_control(other),
        }
    }
}

impl WalWriter {
    fn commit_batch(&mut self, batch: Vec<(Event, AppendResponse)>) {
        if let Some(reason) = &self.poisoned {
            for (_, tx) in batch {
                let _ = tx.send(Err(StoreError::WalPoisoned(reason.clone())));
            }
            return;
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = match self.flush_batch(&batch) {
            Ok(()) => {
                if let Some(tail) = self.tail.as_mut() {
                    tail.extend(batch.iter().map(|(event, _)| event.clone()));
                }
                Ok(())
            }
            Err(e) => Err(self.roll_back(e)),
        };
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for (_, tx) in batch {
            let _ = tx.send(result.clone());
        }
    }

    fn flush_batch(&mut self, batch: &[(Event, AppendResponse)]) -> io::Result<()> {
        for (event, _) in batch {
            self.wal.append_buffered(event)?;
        }
        self.wal.flush_sync()
    }

    /// Cut a failed batch back out of the log. Only a batch that is known to
    /// be gone from disk is reported as retryable.
    fn roll_back(&mut self, cause: io::Error) -> StoreError {
        match self.wal.rollback() {
            Ok(()) => {
                warn!("WAL batch failed and was rolled back: {cause}");
                StoreError::Wal(cause.to_string())
            }
            Err(e) => {
                let reason = format!("{cause}; rollback failed: {e}");
                error!("WAL writer poisoned: {reason}");
                self.poisoned = Some(reason.clone());
                StoreError::WalPoisoned(reason)
            }
        }
    }

    fn handle_control(&mut self, cmd: WalCommand) {
        match cmd {
            WalCommand::BeginCompact { response } => {
                self.tail = Some(Vec::new());
                let _ = response.send(());
            }
            WalCommand::Compact { mut snapshot, response } => {
                let tail = self.tail.take().unwrap_or_default();
                if let Some(reason) = &self.poisoned {
                    let _ = response.send(Err(io::Error::other(format!("WAL writer poisoned: {reason}"))));
                    return;
                }
                snapshot.extend(tail);
                let written = snapshot.len();
                let result = Wal::write_compact_file(self.wal.path(), &snapshot)
                    .and_then(|()| self.wal.swap_compact_file())
                    .map(|()| written);
                let _ = response.send(result);
            }
            WalCommand::AppendsSinceCompact { response } => {
                let _ = response.send(self.wal.appends_since_compact());
            }
            WalCommand::Append { event, response } => self.commit_batch(vec![(event, response)]),
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// In-memory ledgers and indexes. Shared with detached commit tasks.
pub(super) struct Shared {
    /// One ledger per (resource, date, slot). The ledger's lock is the
    /// serialization point for admissions on that key and nothing else.
    pub(super) ledgers: DashMap<SlotKey, SharedLedger>,
    /// (resource, date) → slots that have a ledger, sorted.
    pub(super) days: DashMap<DayKey, Vec<Slot>>,
    pub(super) by_id: DashMap<ReservationId, SlotKey>,
    pub(super) by_user: DashMap<UserId, Vec<ReservationId>>,
    pub(super) notify: Arc<NotifyHub>,
    /// Exclusive lock beside the log, released when the last commit task and
    /// the engine are gone.
    _wal_lock: File,
}

impl Shared {
    fn ledger_for(&self, key: &SlotKey) -> SharedLedger {
        if let Some(existing) = self.ledgers.get(key) {
            return existing.value().clone();
        }
        let ledger = self
            .ledgers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SlotLedger::new(key.clone()))))
            .value()
            .clone();
        let mut slots = self.days.entry(key.day()).or_default();
        if let Err(pos) = slots.binary_search(&key.slot) {
            slots.insert(pos, key.slot);
        }
        ledger
    }

    /// Apply an event to its (write-locked) ledger and the indexes.
    /// Idempotent: replaying an event that is already reflected changes nothing.
    fn apply(&self, ledger: &mut SlotLedger, event: &Event) {
        match event {
            Event::ReservationRecorded { reservation } => {
                if ledger.record(reservation.clone()) {
                    self.by_id.insert(reservation.id, reservation.key());
                    self.by_user
                        .entry(reservation.user_id.clone())
                        .or_default()
                        .push(reservation.id);
                }
            }
            Event::ReservationCancelled { id, cancelled_at, .. } => {
                ledger.cancel(*id, *cancelled_at);
            }
        }
    }
}

/// WAL-backed reservation store.
pub struct Engine {
    pub(super) shared: Arc<Shared>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) lock_timeout: Duration,
}

impl Engine {
    /// Replay the log at `wal_path` and start the group-commit writer.
    /// Must be called inside a Tokio runtime.
    /// Fails with `WouldBlock` while another engine holds the same log.
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let wal_lock = lock_wal(&wal_path)?;
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_tail {
            warn!(
                path = %wal_path.display(),
                valid_bytes = replay.valid_len,
                "WAL ends in a torn or corrupt record; truncating"
            );
            Wal::truncate(&wal_path, replay.valid_len)?;
        }

        let shared = Shared {
            ledgers: DashMap::new(),
            days: DashMap::new(),
            by_id: DashMap::new(),
            by_user: DashMap::new(),
            notify,
            _wal_lock: wal_lock,
        };

        // Rebuild without locks: ledgers are owned here until published.
        let mut rebuilt: HashMap<SlotKey, SlotLedger> = HashMap::new();
        for event in &replay.events {
            let key = event.key();
            let ledger = rebuilt
                .entry(key.clone())
                .or_insert_with(|| SlotLedger::new(key));
            shared.apply(ledger, event);
        }
        let replayed = replay.events.len();
        for (key, ledger) in rebuilt {
            shared
                .days
                .entry(key.day())
                .or_default()
                .push(key.slot);
            shared.ledgers.insert(key, Arc::new(RwLock::new(ledger)));
        }
        for mut slots in shared.days.iter_mut() {
            slots.sort();
        }

        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(WalWriter::new(wal), wal_rx));

        info!(
            path = %wal_path.display(),
            events = replayed,
            reservations = shared.by_id.len(),
            "reservation engine ready"
        );

        Ok(Self {
            shared: Arc::new(shared),
            wal_tx,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Bound how long an admission or cancellation waits for its slot's lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.shared.notify
    }

    pub fn reservation_count(&self) -> usize {
        self.shared.by_id.len()
    }

    pub fn ledger_count(&self) -> usize {
        self.shared.ledgers.len()
    }
}

/// Take the lock file next to `wal_path`. Two engines on one log would each
/// compact over the other's appends.
fn lock_wal(wal_path: &Path) -> io::Result<File> {
    let lock_path = wal_path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("{} is held by another engine", lock_path.display()),
        )),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// Write `event` through the group-commit writer.
pub(super) async fn wal_append(
    wal_tx: &mpsc::Sender<WalCommand>,
    event: &Event,
) -> Result<(), StoreError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
}

/// WAL-append + apply + notify, under the caller's write lock.
pub(super) async fn persist_and_apply(
    shared: &Shared,
    wal_tx: &mpsc::Sender<WalCommand>,
    ledger: &mut SlotLedger,
    event: &Event,
) -> Result<(), StoreError> {
    wal_append(wal_tx, event).await?;
    shared.apply(ledger, event);
    shared.notify.send(event);
    Ok(())
}

/// Take a slot's write lock, giving up after `timeout`.
pub(super) async fn lock_slot(
    ledger: SharedLedger,
    key: &SlotKey,
    timeout: Duration,
) -> Result<OwnedRwLockWriteGuard<SlotLedger>, StoreError> {
    let wait_start = Instant::now();
    let guard = tokio::time::timeout(timeout, ledger.write_owned())
        .await
        .map_err(|_| StoreError::Contention(key.to_string()))?;
    metrics::histogram!(observability::SLOT_LOCK_WAIT_SECONDS)
        .record(wait_start.elapsed().as_secs_f64());
    Ok(guard)
}
