use std::collections::HashMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::{Booking, Event, ResourceId, ResourceScope};
use crate::wal::Wal;

use super::{sort_bookings, BookingRepository, RepositoryError};

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    List {
        scope: ResourceScope,
        response: oneshot::Sender<Vec<Booking>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Live bookings as committed to the log. Owned by the writer task so the
/// compacted snapshot always matches what was durably appended.
#[derive(Default)]
struct LogState {
    bookings: HashMap<Ulid, Booking>,
}

impl LogState {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::BookingCreated { booking } | Event::BookingAmended { booking } => {
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingRetracted { id, .. } => {
                self.bookings.remove(id);
            }
        }
    }

    fn snapshot(&self, scope: &ResourceScope) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .values()
            .filter(|b| scope.matches(&b.resource_id))
            .cloned()
            .collect();
        sort_bookings(&mut out);
        out
    }
}

/// Background task that owns the log and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Apply the batch to the log state, respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut state: LogState, mut rx: mpsc::Receiver<WalCommand>) {
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

                commit_batch(&mut wal, &mut state, batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, &state, other);
                }
            }
            other => handle_non_append(&mut wal, &state, other),
        }
    }
    debug!("log writer stopped");
}

fn commit_batch(
    wal: &mut Wal,
    state: &mut LogState,
    mut batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (event, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => {
                state.apply(&event);
                Ok(())
            }
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, state: &LogState, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let events: Vec<Event> = state
                .snapshot(&ResourceScope::All)
                .into_iter()
                .map(|booking| Event::BookingCreated { booking })
                .collect();
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            if result.is_ok() {
                info!("compacted booking log to {} entries", events.len());
            }
            let _ = response.send(result);
        }
        WalCommand::List { scope, response } => {
            let _ = response.send(state.snapshot(&scope));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable repository backed by an append-only log with group commit.
pub struct WalRepository {
    tx: mpsc::Sender<WalCommand>,
    /// Booking id → resource, needed to address retractions.
    index: DashMap<Ulid, ResourceId>,
}

impl WalRepository {
    /// Replay the log at `path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let events = Wal::replay(path)?;
        let mut state = LogState::default();
        for event in &events {
            state.apply(event);
        }
        info!(
            "replayed {} log entries ({} live bookings) from {}",
            events.len(),
            state.bookings.len(),
            path.display()
        );

        let index = state
            .bookings
            .values()
            .map(|b| (b.id, b.resource_id.clone()))
            .collect();

        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, state, rx));

        Ok(Self { tx, index })
    }

    async fn append(&self, event: Event) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| RepositoryError::WriterClosed)?;
        rx.await.map_err(|_| RepositoryError::WriterClosed)??;
        Ok(())
    }

    /// Rewrite the log with one entry per live booking.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| RepositoryError::WriterClosed)?;
        rx.await.map_err(|_| RepositoryError::WriterClosed)??;
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingRepository for WalRepository {
    async fn list(&self, scope: &ResourceScope) -> Result<Vec<Booking>, RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::List {
                scope: scope.clone(),
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::WriterClosed)?;
        rx.await.map_err(|_| RepositoryError::WriterClosed)
    }

    async fn insert(&self, booking: &Booking) -> Result<Booking, RepositoryError> {
        self.append(Event::BookingCreated {
            booking: booking.clone(),
        })
        .await?;
        self.index.insert(booking.id, booking.resource_id.clone());
        Ok(booking.clone())
    }

    async fn update(&self, id: Ulid, booking: &Booking) -> Result<Booking, RepositoryError> {
        if !self.index.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        self.append(Event::BookingAmended {
            booking: Booking {
                id,
                ..booking.clone()
            },
        })
        .await?;
        Ok(booking.clone())
    }

    async fn delete(&self, id: Ulid) -> Result<(), RepositoryError> {
        let resource_id = self
            .index
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(RepositoryError::NotFound(id))?;
        self.append(Event::BookingRetracted { id, resource_id }).await?;
        self.index.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Span;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("wingslot_test_repository");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn booking(resource: &str, start: i64) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: resource.into(),
            span: Span::new(start, start + 1000),
            title: "Solo cross-country".into(),
            details: Some("KPAO-KSNS".into()),
            owner_id: "pilot".into(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let path = test_wal_path("reopen.wal");
        let kept = booking("aircraft1", 0);
        let amended = Booking {
            title: "Dual".into(),
            ..booking("aircraft1", 5000)
        };
        let dropped = booking("aircraft2", 0);

        {
            let repo = WalRepository::open(&path).unwrap();
            repo.insert(&kept).await.unwrap();
            repo.insert(&Booking {
                title: "Solo".into(),
                ..amended.clone()
            })
            .await
            .unwrap();
            repo.update(amended.id, &amended).await.unwrap();
            repo.insert(&dropped).await.unwrap();
            repo.delete(dropped.id).await.unwrap();
            assert_eq!(repo.appends_since_compact().await, 5);
        }

        let repo = WalRepository::open(&path).unwrap();
        let all = repo.list(&ResourceScope::All).await.unwrap();
        assert_eq!(all, vec![kept, amended]);
        assert!(
            repo.list(&ResourceScope::Resource("aircraft2".into()))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let path = test_wal_path("delete_unknown.wal");
        let repo = WalRepository::open(&path).unwrap();
        let id = Ulid::new();
        assert!(matches!(repo.delete(id).await, Err(RepositoryError::NotFound(_))));
        assert!(matches!(
            repo.update(id, &booking("aircraft1", 0)).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert_eq!(repo.appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn compact_preserves_live_set() {
        let path = test_wal_path("compact.wal");
        let live = booking("aircraft1", 0);
        {
            let repo = WalRepository::open(&path).unwrap();
            repo.insert(&live).await.unwrap();
            for i in 1..10 {
                let churn = booking("aircraft1", i * 10_000);
                repo.insert(&churn).await.unwrap();
                repo.delete(churn.id).await.unwrap();
            }
            repo.compact().await.unwrap();
            assert_eq!(repo.appends_since_compact().await, 0);
        }

        assert_eq!(
            Wal::replay(&path).unwrap(),
            vec![Event::BookingCreated { booking: live.clone() }]
        );
        let repo = WalRepository::open(&path).unwrap();
        assert_eq!(repo.list(&ResourceScope::All).await.unwrap(), vec![live]);
    }

    #[tokio::test]
    async fn concurrent_appends_all_commit() {
        let path = test_wal_path("concurrent.wal");
        let repo = std::sync::Arc::new(WalRepository::open(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..32 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.insert(&booking(&format!("aircraft{i}"), 0)).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(repo.list(&ResourceScope::All).await.unwrap().len(), 32);
        assert_eq!(Wal::replay(&path).unwrap().len(), 32);
    }
}
