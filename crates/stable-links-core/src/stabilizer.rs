use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// How a stabilization wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stabilized {
    /// A full quiet period passed without modifications.
    Settled,
    /// The ceiling elapsed while the document was still changing.
    CeilingReached,
}

/// Holds new documents back until their content stops changing.
///
/// `on_document_modified` resets the quiet timer of a document that is being
/// waited on; modifications of other documents are ignored.
#[derive(Clone, Default)]
pub struct StabilizationWaiter {
    pending: Arc<DashMap<String, PendingWait>>,
    next_wait: Arc<AtomicU64>,
}

#[derive(Clone, Copy)]
struct PendingWait {
    /// Which `await_stable` call owns the entry.
    id: u64,
    /// Time of the most recent modification, or the start of the wait.
    last: Instant,
}

/// Removes the pending entry however the wait ends, including cancellation,
/// unless a later wait for the same path has taken it over.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, PendingWait>,
    path: &'a str,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove_if(self.path, |_, wait| wait.id == self.id);
    }
}

impl StabilizationWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_document_modified(&self, path: &str) {
        if let Some(mut wait) = self.pending.get_mut(path) {
            wait.last = Instant::now();
        }
    }

    pub fn is_waiting(&self, path: &str) -> bool {
        self.pending.contains_key(path)
    }

    /// Suspend until `path` has gone `quiet` without modifications, or until
    /// `max_wait` has elapsed since the call, whichever comes first.
    pub async fn await_stable(&self, path: &str, quiet: Duration, max_wait: Duration) -> Stabilized {
        let started = Instant::now();
        let ceiling = started + max_wait;
        let id = self.next_wait.fetch_add(1, Ordering::Relaxed);
        self.pending
            .insert(path.to_string(), PendingWait { id, last: started });
        let _guard = PendingGuard {
            pending: &self.pending,
            path,
            id,
        };

        loop {
            let last = self.pending.get(path).map(|e| e.last).unwrap_or(started);
            let quiet_deadline = last + quiet;
            let now = Instant::now();

            if now >= quiet_deadline {
                tracing::debug!("{} settled after {:?}", path, now - started);
                return Stabilized::Settled;
            }
            if now >= ceiling {
                tracing::warn!(
                    "{} still changing after {:?}; proceeding anyway",
                    path, max_wait
                );
                return Stabilized::CeilingReached;
            }

            tokio::time::sleep_until(quiet_deadline.min(ceiling)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(500);
    const CEILING: Duration = Duration::from_millis(5000);

    fn assert_close(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_quiet_period() {
        let waiter = StabilizationWaiter::new();
        let start = Instant::now();
        let outcome = waiter.await_stable("a.md", QUIET, CEILING).await;
        assert_eq!(outcome, Stabilized::Settled);
        assert_close(start.elapsed(), QUIET);
        assert!(!waiter.is_waiting("a.md"), "pending entry should be released");
    }

    #[tokio::test(start_paused = true)]
    async fn modification_resets_quiet_timer() {
        let waiter = StabilizationWaiter::new();
        let start = Instant::now();

        let touch = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            touch.on_document_modified("a.md");
        });

        let outcome = waiter.await_stable("a.md", QUIET, CEILING).await;
        assert_eq!(outcome, Stabilized::Settled);
        assert!(start.elapsed() >= Duration::from_millis(600));
        assert!(start.elapsed() < CEILING);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_forces_progress_under_constant_modification() {
        let waiter = StabilizationWaiter::new();
        let start = Instant::now();

        let touch = waiter.clone();
        let editor = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                touch.on_document_modified("a.md");
            }
        });

        let outcome = waiter.await_stable("a.md", QUIET, CEILING).await;
        editor.abort();
        assert_eq!(outcome, Stabilized::CeilingReached);
        assert_close(start.elapsed(), CEILING);
        assert!(!waiter.is_waiting("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn modifications_of_other_documents_are_ignored() {
        let waiter = StabilizationWaiter::new();
        let start = Instant::now();

        let touch = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            touch.on_document_modified("other.md");
        });

        waiter.await_stable("a.md", QUIET, CEILING).await;
        assert_close(start.elapsed(), QUIET);
        assert!(!waiter.is_waiting("other.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_wait_leaves_a_newer_wait_for_the_same_path_alone() {
        let waiter = StabilizationWaiter::new();
        let start = Instant::now();

        let first = {
            let waiter = waiter.clone();
            tokio::spawn(async move {
                waiter
                    .await_stable("a.md", QUIET, Duration::from_millis(300))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        // The document was deleted and created again.
        let second = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.await_stable("a.md", QUIET, CEILING).await })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(first.await.unwrap(), Stabilized::CeilingReached);
        assert!(waiter.is_waiting("a.md"), "newer wait lost its entry");

        tokio::time::sleep(Duration::from_millis(50)).await;
        waiter.on_document_modified("a.md");

        assert_eq!(second.await.unwrap(), Stabilized::Settled);
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert!(!waiter.is_waiting("a.md"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_releases_entry() {
        let waiter = StabilizationWaiter::new();
        let result = tokio::time::timeout(
            Duration::from_millis(10),
            waiter.await_stable("a.md", QUIET, CEILING),
        )
        .await;
        assert!(result.is_err());
        assert!(!waiter.is_waiting("a.md"));
    }
}
