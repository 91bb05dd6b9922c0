//! # patchsync core
//!
//! Edit model and operational transformation for collaborative text sync.
//!
//! This crate provides:
//! - [`Diff`] and [`Patch`], the atomic edits and versioned edit groups, with
//!   their wire format
//! - Pairwise transformation of concurrent patches ([`transform_pair`])
//! - Consolidation of sequential patches into one ([`consolidate`])
//! - Validated application of patches to document text ([`apply_patch`])
//! - LF/CRLF conversion of diffs and patches

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod consolidate;
pub mod diff;
pub mod file;
pub mod line_endings;
pub mod patch;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::{apply_patch, ApplyError};
pub use consolidate::{consolidate, ConsolidateError};
pub use diff::{Diff, DiffKind, FormatError};
pub use file::FileId;
pub use patch::{simplify, Patch};
pub use transform::transform_pair;
