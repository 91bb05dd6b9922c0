//! Patch orchestration.
//!
//! The [`PatchManager`] batches local patches per file, sends them to the
//! server one consolidated request at a time, and reconciles remote changes
//! (missing patches in responses, and pushed notifications) with the patches
//! still waiting locally.
//!
//! Two locks order the work:
//! - a per-file send slot, so at most one task drains a file's queue;
//! - a manager-wide exclusion lock, held shared by every send round and
//!   exclusively by the notification task, so a notification never rebases a
//!   queue while a send for it is between snapshot and reconciliation.

use crate::batching::BatchingControl;
use crate::config::ManagerConfig;
use crate::document::DocumentApplier;
use crate::transport::{SendError, Transport};
use patchsync_core::{
    apply_patch, consolidate, ApplyError, ConsolidateError, FileId, FormatError, Patch,
};
use patchsync_proto::{ChangeNotification, ChangeRequest};
use std::collections::HashMap;
use std::slice;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

struct Inner {
    config: ManagerConfig,
    transport: Arc<dyn Transport>,
    applier: Arc<dyn DocumentApplier>,
    files: Mutex<HashMap<FileId, Arc<BatchingControl>>>,
    exclusion: RwLock<()>,
}

/// Batches, sends, and reconciles patches for a set of files.
///
/// Must be created inside a Tokio runtime. Dropping the manager stops its
/// notification task once queued notifications are handled.
pub struct PatchManager {
    inner: Arc<Inner>,
    notifications: mpsc::UnboundedSender<ChangeNotification>,
}

impl PatchManager {
    /// Create a manager and start its notification task.
    #[must_use]
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn Transport>,
        applier: Arc<dyn DocumentApplier>,
    ) -> Self {
        let inner = Arc::new(Inner {
            config,
            transport,
            applier,
            files: Mutex::new(HashMap::new()),
            exclusion: RwLock::new(()),
        });

        let (notifications, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_notifications(Arc::clone(&inner), receiver));
        tracing::info!(
            patch_timeout = ?inner.config.patch_timeout,
            write_threshold = inner.config.write_threshold,
            "Patch manager started"
        );

        Self {
            inner,
            notifications,
        }
    }

    /// Queue local patches for `file` and start sending them.
    ///
    /// The patches are queued before this returns. If no other task is
    /// sending for `file`, the returned handle drains the queue and carries
    /// any delivery failure or rejection. If another task holds the file's
    /// send slot, the handle resolves to `Ok(())` at once and that task sends
    /// these patches; its handle reports their failures.
    pub fn send_patch(
        &self,
        file: FileId,
        patches: Vec<Patch>,
    ) -> JoinHandle<Result<(), SyncError>> {
        if let Some(first) = patches.iter().map(Patch::base_version).min() {
            let control = self.inner.control(&file, first);
            tracing::debug!(file_id = %file, patches = patches.len(), "Queued local patches");
            control.enqueue(patches);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.transform_and_send(file).await })
    }

    /// Queue a remote change for the notification task.
    pub fn handle_notification(&self, notification: ChangeNotification) {
        if let Err(error) = self.notifications.send(notification) {
            tracing::warn!(
                file_id = %error.0.file_id,
                "Notification task stopped, dropping notification"
            );
        }
    }

    /// Apply `patches` to `content` in order.
    ///
    /// # Errors
    ///
    /// Returns error if a patch does not fit the document.
    pub fn apply_patch(content: &str, patches: &[Patch]) -> Result<String, ApplyError> {
        apply_patch(content, patches)
    }

    /// Register `file` as known at server `version`.
    ///
    /// Does nothing if the file is already tracked.
    pub fn open_file(&self, file: FileId, version: i64) {
        self.inner.control(&file, version);
    }

    /// Stop tracking `file`, dropping anything still queued for it.
    ///
    /// Returns whether the file was tracked.
    pub fn close_file(&self, file: &FileId) -> bool {
        let removed = self.inner.files().remove(file);
        if let Some(control) = &removed {
            tracing::debug!(
                file_id = %file,
                pending = control.pending(),
                "Closed file"
            );
        }
        removed.is_some()
    }

    /// Last server version applied to `file`, if it is tracked.
    #[must_use]
    pub fn document_version(&self, file: &FileId) -> Option<i64> {
        self.inner
            .files()
            .get(file)
            .map(|control| control.document_version())
    }

    /// Number of local patches not yet confirmed by the server.
    #[must_use]
    pub fn pending_patches(&self, file: &FileId) -> usize {
        self.inner
            .files()
            .get(file)
            .map_or(0, |control| control.pending())
    }
}

impl Inner {
    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<FileId, Arc<BatchingControl>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State of `file`, created at `version` if not tracked yet.
    fn control(&self, file: &FileId, version: i64) -> Arc<BatchingControl> {
        let mut files = self.files();
        let control = files.entry(file.clone()).or_insert_with(|| {
            tracing::debug!(file_id = %file, version, "Tracking file");
            Arc::new(BatchingControl::new(
                version,
                self.applier.modification_stamp(file),
            ))
        });
        Arc::clone(control)
    }

    fn existing_control(&self, file: &FileId) -> Option<Arc<BatchingControl>> {
        self.files().get(file).cloned()
    }

    /// Drain `file`'s queue until it is empty or another task took over.
    async fn transform_and_send(&self, file: FileId) -> Result<(), SyncError> {
        let Some(control) = self.existing_control(&file) else {
            return Ok(());
        };

        loop {
            let Some(permit) = control.try_begin_send() else {
                tracing::debug!(file_id = %file, "Send already in flight");
                return Ok(());
            };
            {
                let _shared = self.exclusion.read().await;
                self.send_batch(&file, &control).await?;
            }
            drop(permit);

            // Patches queued while the slot was held were left to this task.
            if !control.has_pending() {
                return Ok(());
            }
        }
    }

    async fn send_batch(&self, file: &FileId, control: &BatchingControl) -> Result<(), SyncError> {
        control.drain_pre_queue();
        let batch = control.snapshot(self.config.write_threshold);
        let Some(patch) = consolidate(&batch)? else {
            return Ok(());
        };
        if patch.is_empty() {
            tracing::debug!(file_id = %file, patches = batch.len(), "Dropping no-op patches");
            control.remove_sent(batch.len());
            return Ok(());
        }

        let request = ChangeRequest::new(file.clone(), &patch);
        let request_id = request.request_id;
        tracing::debug!(
            file_id = %file,
            %request_id,
            base_version = patch.base_version(),
            patches = batch.len(),
            "Sending patch"
        );

        let transport = Arc::clone(&self.transport);
        let in_flight = tokio::spawn(async move { transport.send(request).await });
        let response = match tokio::time::timeout(self.config.patch_timeout, in_flight).await {
            Err(_) => {
                tracing::warn!(
                    file_id = %file,
                    %request_id,
                    timeout = ?self.config.patch_timeout,
                    "No response in time, retrying"
                );
                return Ok(());
            }
            Ok(Err(join_error)) => {
                return Err(SendError::Delivery(join_error.to_string()).into());
            }
            Ok(Ok(result)) => result?,
        };

        if !response.is_ok() {
            let reason = response.message.unwrap_or_default();
            // A refused batch is final.
            control.remove_sent(batch.len());
            tracing::warn!(
                file_id = %file,
                %request_id,
                %reason,
                dropped = batch.len(),
                "Patch rejected"
            );
            return Err(SyncError::Rejected {
                file_id: file.clone(),
                reason,
            });
        }

        let missing = response.missing_patches()?;
        control.remove_sent(batch.len());
        tracing::debug!(
            file_id = %file,
            version = response.version,
            missing = missing.len(),
            "Patch confirmed"
        );

        match consolidate(&missing)? {
            Some(remote) => self.reconcile(file, control, &remote, Some(&patch), response.version),
            None => {
                control.advance(response.version);
                Ok(())
            }
        }
    }

    fn apply_notification(&self, notification: &ChangeNotification) -> Result<(), SyncError> {
        let file = &notification.file_id;
        let remote = notification.patch()?;
        let control = self.control(file, remote.base_version());

        let known = control.document_version();
        if known >= notification.version {
            tracing::warn!(
                file_id = %file,
                version = notification.version,
                known,
                "Skipping notification already applied"
            );
            return Ok(());
        }
        if remote.base_version() > known {
            tracing::warn!(
                file_id = %file,
                base_version = remote.base_version(),
                known,
                "Notification skips versions"
            );
        }

        self.reconcile(file, &control, &remote, None, notification.version)
    }

    /// Apply a remote change to the live document and rebase the local queue.
    ///
    /// `sent` is the local patch the server committed after `remote`.
    fn reconcile(
        &self,
        file: &FileId,
        control: &BatchingControl,
        remote: &Patch,
        sent: Option<&Patch>,
        version: i64,
    ) -> Result<(), SyncError> {
        let remote = match sent {
            Some(sent) => remote.transform(true, slice::from_ref(sent)),
            None => remote.clone(),
        };

        loop {
            let stamp = control.modification_stamp();
            control.drain_pre_queue();
            let local = consolidate(&control.queued())?;

            let (incoming, rebased) = match &local {
                Some(local) => (
                    remote.transform(true, slice::from_ref(local)),
                    vec![local.transform(false, slice::from_ref(&remote))],
                ),
                None => (remote.clone(), Vec::new()),
            };

            match self.applier.apply(file, &incoming, stamp) {
                Ok(Some(new_stamp)) => {
                    control.replace_queue(rebased);
                    control.set_modification_stamp(new_stamp);
                    control.advance(version);
                    tracing::debug!(file_id = %file, version, "Applied remote patch");
                    return Ok(());
                }
                Ok(None) => {
                    control.set_modification_stamp(self.applier.modification_stamp(file));
                    tracing::debug!(file_id = %file, "Document changed, retrying remote patch");
                }
                Err(error) => {
                    tracing::error!(file_id = %file, %error, "Remote patch does not fit document");
                    return Err(error.into());
                }
            }
        }
    }
}

async fn run_notifications(
    inner: Arc<Inner>,
    mut receiver: mpsc::UnboundedReceiver<ChangeNotification>,
) {
    while let Some(notification) = receiver.recv().await {
        let _exclusive = inner.exclusion.write().await;
        if let Err(error) = inner.apply_notification(&notification) {
            tracing::error!(
                file_id = %notification.file_id,
                version = notification.version,
                %error,
                "Failed to apply notification"
            );
        }
    }
    tracing::info!("Notification task stopped");
}

/// Errors surfaced by the [`PatchManager`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The transport could not deliver the request
    #[error("send failed: {0}")]
    SendFailure(#[from] SendError),
    /// The server refused the patch; its batch was dropped from the queue and
    /// the live document no longer matches the server
    #[error("patch for {file_id} rejected: {reason}")]
    Rejected {
        /// File the patch belonged to
        file_id: FileId,
        /// Reason given by the server
        reason: String,
    },
    /// A patch from the server could not be parsed
    #[error("malformed patch: {0}")]
    Format(#[from] FormatError),
    /// A remote patch did not fit the live document
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),
    /// Queued patches were not sequential
    #[error("consolidation failed: {0}")]
    Consolidate(#[from] ConsolidateError),
}
