//! Per-file batching state.
//!
//! Local patches land in a pre-queue first; only the task that owns the
//! file's send slot moves them into the main queue. The pre-queue can be
//! appended to from any task without waiting for a send in flight.

use patchsync_core::Patch;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Queues, version, and modification stamp of one file.
#[derive(Debug)]
pub struct BatchingControl {
    pre_queue: Mutex<Vec<Patch>>,
    queue: Mutex<Vec<Patch>>,
    document_version: AtomicI64,
    modification_stamp: AtomicI64,
    send_slot: Semaphore,
}

impl BatchingControl {
    /// Create the state of a file known at `document_version`.
    #[must_use]
    pub fn new(document_version: i64, modification_stamp: i64) -> Self {
        Self {
            pre_queue: Mutex::new(Vec::new()),
            queue: Mutex::new(Vec::new()),
            document_version: AtomicI64::new(document_version),
            modification_stamp: AtomicI64::new(modification_stamp),
            send_slot: Semaphore::new(1),
        }
    }

    /// Append local patches to the pre-queue.
    pub fn enqueue(&self, patches: impl IntoIterator<Item = Patch>) {
        lock(&self.pre_queue).extend(patches);
    }

    /// Move the pre-queue into the main queue.
    ///
    /// Patches based on a version older than the current one are relabelled:
    /// they were made against the live document, which already contains every
    /// remote change up to the current version.
    pub fn drain_pre_queue(&self) {
        let drained: Vec<Patch> = std::mem::take(&mut *lock(&self.pre_queue));
        if drained.is_empty() {
            return;
        }
        let version = self.document_version();
        lock(&self.queue).extend(drained.into_iter().map(|patch| {
            if patch.base_version() < version {
                patch.rebased(version)
            } else {
                patch
            }
        }));
    }

    /// Copy of the first `limit` queued patches.
    #[must_use]
    pub fn snapshot(&self, limit: usize) -> Vec<Patch> {
        lock(&self.queue).iter().take(limit).cloned().collect()
    }

    /// Copy of the whole queue.
    #[must_use]
    pub fn queued(&self) -> Vec<Patch> {
        lock(&self.queue).clone()
    }

    /// Drop the first `count` queued patches.
    pub fn remove_sent(&self, count: usize) {
        let mut queue = lock(&self.queue);
        let count = count.min(queue.len());
        queue.drain(..count);
    }

    /// Replace the queue with `patches`.
    pub fn replace_queue(&self, patches: Vec<Patch>) {
        *lock(&self.queue) = patches;
    }

    /// Record that the document is now at `version` and relabel the queue.
    pub fn advance(&self, version: i64) {
        self.document_version.store(version, Ordering::SeqCst);
        let mut queue = lock(&self.queue);
        for patch in queue.iter_mut() {
            *patch = patch.rebased(version);
        }
    }

    /// Whether patches wait in either queue.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !lock(&self.pre_queue).is_empty() || !lock(&self.queue).is_empty()
    }

    /// Number of patches waiting in either queue.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.pre_queue).len() + lock(&self.queue).len()
    }

    /// Last server version contained in the live document.
    #[must_use]
    pub fn document_version(&self) -> i64 {
        self.document_version.load(Ordering::SeqCst)
    }

    /// Modification stamp the next remote apply expects.
    #[must_use]
    pub fn modification_stamp(&self) -> i64 {
        self.modification_stamp.load(Ordering::SeqCst)
    }

    /// Update the expected modification stamp.
    pub fn set_modification_stamp(&self, stamp: i64) {
        self.modification_stamp.store(stamp, Ordering::SeqCst);
    }

    /// Claim the file's send slot, unless another task holds it.
    #[must_use]
    pub fn try_begin_send(&self) -> Option<SemaphorePermit<'_>> {
        self.send_slot.try_acquire().ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchsync_core::Diff;

    fn insert(version: i64, at: usize, text: &str, base_length: usize) -> Patch {
        Patch::for_document(version, vec![Diff::insertion(at, text)], base_length)
    }

    #[test]
    fn drain_relabels_stale_patches() {
        let control = BatchingControl::new(3, 0);
        control.enqueue([insert(1, 0, "a", 0), insert(5, 1, "b", 1)]);

        control.drain_pre_queue();

        let versions: Vec<i64> = control.queued().iter().map(Patch::base_version).collect();
        assert_eq!(versions, vec![3, 5]);
        assert_eq!(control.pending(), 2);
    }

    #[test]
    fn advance_relabels_the_queue() {
        let control = BatchingControl::new(0, 0);
        control.enqueue([insert(0, 0, "test0", 0), insert(0, 5, "test1", 5)]);
        control.drain_pre_queue();

        control.remove_sent(1);
        control.advance(1);

        assert_eq!(control.document_version(), 1);
        assert_eq!(control.queued(), vec![insert(1, 5, "test1", 5)]);
    }

    #[test]
    fn snapshot_respects_the_limit() {
        let control = BatchingControl::new(0, 0);
        control.enqueue((0..5).map(|i| insert(0, i, "x", i)));
        control.drain_pre_queue();

        assert_eq!(control.snapshot(2).len(), 2);
        assert_eq!(control.snapshot(10).len(), 5);

        control.remove_sent(10);
        assert!(!control.has_pending());
    }

    #[test]
    fn send_slot_is_exclusive() {
        let control = BatchingControl::new(0, 0);

        let permit = control.try_begin_send();
        assert!(permit.is_some());
        assert!(control.try_begin_send().is_none());

        drop(permit);
        assert!(control.try_begin_send().is_some());
    }
}
