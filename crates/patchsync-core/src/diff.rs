//! Atomic edit operations.
//!
//! A [`Diff`] inserts or deletes a literal string at a character index. Indices
//! and lengths count Unicode scalar values, never bytes.
//!
//! # Wire format
//!
//! ```text
//! <startIndex>:<+|-><length>:<percent-encoded UTF-8 text>
//! ```
//!
//! `+` marks an insertion, `-` a deletion. Every byte of the text outside
//! `A-Z a-z 0-9 - _ . ~ *` is percent-encoded, so the separators used by the
//! patch format (`:`, `,` and newline) never appear inside encoded text.

use once_cell::sync::Lazy;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Bytes left unescaped in diff text.
const TEXT_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'*');

static DIFF_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\+|-)(\d+):(.+)$").expect("diff pattern is a valid regex")
});

/// Whether a diff adds or removes text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffKind {
    /// Text is inserted at the start index
    Insertion,
    /// Text starting at the start index is removed
    Deletion,
}

impl DiffKind {
    fn sign(self) -> char {
        match self {
            DiffKind::Insertion => '+',
            DiffKind::Deletion => '-',
        }
    }
}

/// A single insertion or deletion of literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Insertion or deletion
    pub kind: DiffKind,
    /// Character index the edit applies at
    pub start_index: usize,
    /// Inserted text, or the text expected at the deleted span
    pub text: String,
}

impl Diff {
    /// Create an insertion of `text` at `start_index`.
    #[must_use]
    pub fn insertion(start_index: usize, text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Insertion,
            start_index,
            text: text.into(),
        }
    }

    /// Create a deletion of `text` starting at `start_index`.
    #[must_use]
    pub fn deletion(start_index: usize, text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Deletion,
            start_index,
            text: text.into(),
        }
    }

    /// Whether this diff inserts text.
    #[must_use]
    pub fn is_insertion(&self) -> bool {
        self.kind == DiffKind::Insertion
    }

    /// Whether this diff deletes text.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.kind == DiffKind::Deletion
    }

    /// Length of the text in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether the diff carries no text (and therefore has no effect).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Index just past the span this diff covers in the document it applies to.
    ///
    /// For insertions the span is empty, so this equals the start index.
    #[must_use]
    pub fn end_index(&self) -> usize {
        match self.kind {
            DiffKind::Insertion => self.start_index,
            DiffKind::Deletion => self.start_index + self.len(),
        }
    }

    /// Same kind and text at a different position.
    #[must_use]
    pub(crate) fn moved_to(&self, start_index: usize) -> Self {
        Self {
            kind: self.kind,
            start_index,
            text: self.text.clone(),
        }
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}{}:{}",
            self.start_index,
            self.kind.sign(),
            self.len(),
            utf8_percent_encode(&self.text, TEXT_ESCAPE)
        )
    }
}

impl FromStr for Diff {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = DIFF_PATTERN
            .captures(s)
            .ok_or_else(|| FormatError::MalformedDiff(s.to_string()))?;

        let start_index: usize = captures[1]
            .parse()
            .map_err(|_| FormatError::MalformedDiff(s.to_string()))?;
        let kind = if &captures[2] == "+" {
            DiffKind::Insertion
        } else {
            DiffKind::Deletion
        };
        let declared: usize = captures[3]
            .parse()
            .map_err(|_| FormatError::MalformedDiff(s.to_string()))?;
        let text = percent_decode_str(&captures[4])
            .decode_utf8()
            .map_err(|e| FormatError::Encoding(e.to_string()))?
            .into_owned();

        // Only the form `Display` writes is accepted, so parsing round-trips.
        let canonical = start_index.to_string() == captures[1]
            && declared.to_string() == captures[3]
            && utf8_percent_encode(&text, TEXT_ESCAPE).to_string() == captures[4];
        if !canonical {
            return Err(FormatError::NonCanonical(s.to_string()));
        }

        let actual = text.chars().count();
        if actual != declared {
            return Err(FormatError::LengthMismatch { declared, actual });
        }

        Ok(Self {
            kind,
            start_index,
            text,
        })
    }
}

/// Split `text` after `chars` characters.
///
/// Splitting past the end yields the whole text and an empty remainder.
pub(crate) fn split_at_char(text: &str, chars: usize) -> (&str, &str) {
    let byte = text
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index);
    text.split_at(byte)
}

/// Errors raised while reading the wire form of diffs and patches.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// Diff text does not match `<index>:<+|-><length>:<text>`
    #[error("malformed diff: {0:?}")]
    MalformedDiff(String),
    /// Patch text does not match `v<version>:\n<diffs>:\n<length>`
    #[error("malformed patch: {0:?}")]
    MalformedPatch(String),
    /// Declared length differs from the decoded text length
    #[error("diff declares {declared} characters but carries {actual}")]
    LengthMismatch {
        /// Length written in the diff header
        declared: usize,
        /// Length of the decoded text
        actual: usize,
    },
    /// Diff is readable but not in the form it would be written in
    #[error("non-canonical diff: {0:?}")]
    NonCanonical(String),
    /// Percent-decoded bytes are not valid UTF-8
    #[error("invalid text encoding: {0}")]
    Encoding(String),
}
