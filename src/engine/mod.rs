mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use queries::ScheduleFilter;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::conflict::ConflictDetector;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that arrive while a flush is pending are
/// batched behind one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a half-written batch is not
    // carried into the next one.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

/// One semester's timetable: rooms, registered names and schedule records,
/// rebuilt from the WAL on open.
pub struct Engine {
    pub(super) schedules: DashMap<RecordId, ScheduleRecord>,
    pub(super) rooms: DashMap<RoomId, Room>,
    pub(super) names: DashMap<(NamedKind, i64), String>,
    pub(super) next_id: AtomicI64,
    /// Held across check-then-write so two writers cannot both pass detection.
    pub(super) write_gate: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) detector: ConflictDetector,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            schedules: DashMap::new(),
            rooms: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicI64::new(1),
            write_gate: Mutex::new(()),
            wal_tx,
            detector: ConflictDetector::standard(),
        };
        for event in &events {
            engine.apply(event);
        }
        tracing::debug!(
            path = %wal_path.display(),
            events = events.len(),
            schedules = engine.schedules.len(),
            "replayed semester WAL"
        );
        Ok(engine)
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub(super) fn apply(&self, event: &Event) {
        match event {
            Event::RoomCreated { id, name, capacity } => {
                self.rooms.insert(
                    *id,
                    Room {
                        id: *id,
                        name: name.clone(),
                        capacity: *capacity,
                    },
                );
                self.names.insert((NamedKind::Room, *id), name.clone());
            }
            Event::RoomDeleted { id } => {
                self.rooms.remove(id);
                self.names.remove(&(NamedKind::Room, *id));
            }
            Event::NameRegistered { kind, id, name } => {
                if *kind == NamedKind::Room
                    && let Some(mut room) = self.rooms.get_mut(id)
                {
                    room.name = name.clone();
                }
                self.names.insert((*kind, *id), name.clone());
            }
            Event::ScheduleCreated { record } | Event::ScheduleUpdated { record } => {
                self.next_id.fetch_max(record.id + 1, Ordering::SeqCst);
                self.schedules.insert(record.id, record.clone());
            }
            Event::ScheduleDeleted { id } => {
                self.schedules.remove(id);
            }
            Event::IdSequence { next } => {
                self.next_id.fetch_max(*next, Ordering::SeqCst);
            }
        }
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Durably log, then apply to memory.
    pub(super) async fn persist(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        self.apply(&event);
        Ok(())
    }

    /// Rewrite the WAL as the minimal event list for the current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        let events = self.snapshot_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
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
}
