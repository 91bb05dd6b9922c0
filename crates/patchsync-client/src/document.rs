//! Live document buffers.
//!
//! The manager never edits a document directly. Remote changes are handed to
//! a [`DocumentApplier`] together with the modification stamp the manager last
//! observed; the applier refuses the change when the buffer moved on since.

use patchsync_core::{apply_patch, ApplyError, FileId, Patch};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Applies remote changes to live documents under optimistic concurrency.
///
/// Editors must hand a local edit's patch to
/// [`PatchManager::send_patch`](crate::PatchManager::send_patch) before the
/// edit's stamp becomes visible through [`modification_stamp`](Self::modification_stamp).
pub trait DocumentApplier: Send + Sync {
    /// Current modification stamp of `file`.
    fn modification_stamp(&self, file: &FileId) -> i64;

    /// Apply `patch` to `file` if its stamp still equals `expected_stamp`.
    ///
    /// Returns the new stamp, or `None` when the document changed underneath
    /// (the caller refreshes its view and retries).
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] if the patch does not fit the document.
    fn apply(
        &self,
        file: &FileId,
        patch: &Patch,
        expected_stamp: i64,
    ) -> Result<Option<i64>, ApplyError>;
}

#[derive(Debug, Default)]
struct Buffer {
    text: String,
    stamp: i64,
}

/// In-memory document buffers keyed by file.
#[derive(Debug, Default)]
pub struct MemoryDocuments {
    buffers: Mutex<HashMap<FileId, Buffer>>,
}

impl MemoryDocuments {
    /// Create an empty set of buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the text of `file`, bumping its stamp.
    pub fn insert(&self, file: FileId, text: impl Into<String>) {
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = buffers.entry(file).or_default();
        buffer.text = text.into();
        buffer.stamp += 1;
    }

    /// Current text of `file`, if it is loaded.
    #[must_use]
    pub fn text(&self, file: &FileId) -> Option<String> {
        let buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        buffers.get(file).map(|buffer| buffer.text.clone())
    }

    /// Apply a local edit unconditionally, returning the new stamp.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] if the patch does not fit the document.
    pub fn edit(&self, file: &FileId, patch: &Patch) -> Result<i64, ApplyError> {
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = buffers.entry(file.clone()).or_default();
        buffer.text = apply_patch(&buffer.text, std::slice::from_ref(patch))?;
        buffer.stamp += 1;
        Ok(buffer.stamp)
    }
}

impl DocumentApplier for MemoryDocuments {
    fn modification_stamp(&self, file: &FileId) -> i64 {
        let buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        buffers.get(file).map_or(0, |buffer| buffer.stamp)
    }

    fn apply(
        &self,
        file: &FileId,
        patch: &Patch,
        expected_stamp: i64,
    ) -> Result<Option<i64>, ApplyError> {
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = buffers.entry(file.clone()).or_default();
        if buffer.stamp != expected_stamp {
            tracing::debug!(
                file_id = %file,
                expected_stamp,
                stamp = buffer.stamp,
                "Document changed underneath remote patch"
            );
            return Ok(None);
        }

        buffer.text = apply_patch(&buffer.text, std::slice::from_ref(patch))?;
        buffer.stamp += 1;
        Ok(Some(buffer.stamp))
    }
}
