//! # patchsync client
//!
//! Orchestration of local and remote patches for collaborative editing.
//!
//! This crate provides:
//! - [`PatchManager`]: batches local patches per file, sends them through a
//!   [`Transport`], and reconciles remote changes with what is still queued
//! - [`BatchingControl`]: per-file queues, server version, and modification stamp
//! - [`DocumentApplier`]: the contract for applying remote changes to live
//!   documents, with [`MemoryDocuments`] as an in-memory implementation
//! - [`ManagerConfig`]: timeouts and batching limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batching;
pub mod config;
pub mod document;
pub mod manager;
pub mod transport;

pub use batching::BatchingControl;
pub use config::{ConfigError, ManagerConfig};
pub use document::{DocumentApplier, MemoryDocuments};
pub use manager::{PatchManager, SyncError};
pub use transport::{SendError, Transport};
