use crate::model::PlaybackSnapshot;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide holder of the last-known-good playback snapshot.
///
/// Exactly two writers exist: the reconciler (after each upstream poll) and
/// the progress estimator (1 Hz tick).  Everything else reads.  Readers get
/// clones so they never hold the lock across awaits.  Every write bumps
/// `rev`, regardless of which writer performed it.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<RwLock<PlaybackSnapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(PlaybackSnapshot::default())),
        }
    }

    pub async fn get(&self) -> PlaybackSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the snapshot with a reconciled one.  The store owns the `rev`
    /// counter: whatever the caller set is overwritten with `prev.rev + 1`.
    pub async fn replace(&self, mut next: PlaybackSnapshot) {
        let mut state = self.inner.write().await;
        next.rev = state.rev + 1;
        *state = next;
    }

    /// Read-modify-write in one critical section.  The estimator's tick must
    /// see the snapshot it mutates: a reconciled replace landing between a
    /// separate read and write would be clobbered by a stale estimate.
    /// The closure returns whether it changed anything; `rev` is only bumped
    /// on a real write.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut PlaybackSnapshot) -> bool,
    {
        let mut state = self.inner.write().await;
        if f(&mut state) {
            state.rev += 1;
        }
    }

    pub async fn rev(&self) -> u64 {
        self.inner.read().await.rev
    }
}
