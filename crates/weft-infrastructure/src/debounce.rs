//! Debounced snapshot writer.
//!
//! Store mutations can fire many times per second; physical writes must
//! not. The persister keeps explicit state — pending value, last-write
//! instant, trailing task handle — so its lifecycle is observable and
//! teardown is a real operation instead of a leaked timer.
//!
//! The pending snapshot is captured **by value** at call time: the store
//! keeps mutating while the trailing write waits, and the write must not
//! see those later mutations through a live reference.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use weft_core::projection::StateSnapshot;

use crate::snapshot_store::SnapshotRepository;

#[derive(Default)]
struct DebounceState {
    /// Latest value scheduled for the trailing write; intermediate calls
    /// coalesce into it.
    pending: Option<StateSnapshot>,
    last_write: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
}

/// Debounces physical snapshot writes behind a [`SnapshotRepository`].
///
/// A call after a quiet period schedules an immediate write (off the
/// caller's path); calls inside the interval coalesce into one trailing
/// write carrying the last value. Write failures are logged, never
/// surfaced — persistence is best-effort by contract.
pub struct DebouncedPersister {
    repository: Arc<dyn SnapshotRepository>,
    key: String,
    interval: Duration,
    state: Arc<Mutex<DebounceState>>,
}

impl DebouncedPersister {
    pub fn new(
        repository: Arc<dyn SnapshotRepository>,
        key: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            key: key.into(),
            interval,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// Schedules `snapshot` for persistence.
    pub async fn write(&self, snapshot: StateSnapshot) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let quiet = state
            .last_write
            .is_none_or(|last| now.duration_since(last) >= self.interval);

        if quiet && state.trailing.is_none() {
            state.last_write = Some(now);
            let repository = Arc::clone(&self.repository);
            let key = self.key.clone();
            tokio::spawn(async move {
                persist(repository.as_ref(), &key, snapshot).await;
            });
            return;
        }

        state.pending = Some(snapshot);
        if state.trailing.is_none() {
            let delay = state
                .last_write
                .map_or(self.interval, |last| {
                    self.interval.saturating_sub(now.duration_since(last))
                });
            let repository = Arc::clone(&self.repository);
            let key = self.key.clone();
            let shared = Arc::clone(&self.state);
            state.trailing = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let snapshot = {
                    let mut state = shared.lock().await;
                    state.trailing = None;
                    state.last_write = Some(Instant::now());
                    state.pending.take()
                };
                if let Some(snapshot) = snapshot {
                    persist(repository.as_ref(), &key, snapshot).await;
                }
            }));
        }
    }

    /// Bypasses the debounce entirely: cancels any trailing write, drops
    /// the pending value in favor of `snapshot`, and persists it before
    /// returning. Teardown path.
    pub async fn write_now(&self, snapshot: StateSnapshot) {
        {
            let mut state = self.state.lock().await;
            if let Some(trailing) = state.trailing.take() {
                trailing.abort();
            }
            state.pending = None;
            state.last_write = Some(Instant::now());
        }
        persist(self.repository.as_ref(), &self.key, snapshot).await;
    }

    /// Cancels the trailing timer and writes any pending value now. Call
    /// on teardown so a quit inside the debounce window loses nothing.
    pub async fn flush(&self) {
        let (pending, trailing) = {
            let mut state = self.state.lock().await;
            (state.pending.take(), state.trailing.take())
        };
        if let Some(trailing) = trailing {
            trailing.abort();
        }
        if let Some(snapshot) = pending {
            self.state.lock().await.last_write = Some(Instant::now());
            persist(self.repository.as_ref(), &self.key, snapshot).await;
        }
    }

    /// Whether a trailing write is currently scheduled.
    pub async fn has_pending(&self) -> bool {
        self.state.lock().await.pending.is_some()
    }
}

async fn persist(repository: &dyn SnapshotRepository, key: &str, snapshot: StateSnapshot) {
    if let Err(err) = repository.save(key, &snapshot).await {
        tracing::warn!(key, error = %err, "best-effort snapshot write failed");
    }
}
