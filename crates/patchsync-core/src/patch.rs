//! Ordered groups of diffs against a versioned document.
//!
//! Every diff in a [`Patch`] is positioned relative to the document the patch
//! is based on (its *base*), and diffs are ordered by position. Applying a patch
//! walks the base once, copying unchanged spans between diffs.
//!
//! # Wire format
//!
//! ```text
//! v<baseVersion>:
//! <diff>,
//! <diff>:
//! <docLength>
//! ```
//!
//! `docLength` is the length of the document after the patch is applied.

use crate::diff::{Diff, DiffKind, FormatError};
use serde::Serialize;
use std::str::FromStr;

/// An ordered, simplified list of diffs based on a document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    base_version: i64,
    diffs: Vec<Diff>,
    doc_length: usize,
}

impl Patch {
    /// Create a patch, simplifying `diffs`.
    ///
    /// `doc_length` is the length of the document after the patch is applied.
    #[must_use]
    pub fn new(base_version: i64, diffs: Vec<Diff>, doc_length: usize) -> Self {
        Self {
            base_version,
            diffs: simplify(diffs),
            doc_length,
        }
    }

    /// Create a patch for a base document of `base_length` characters.
    ///
    /// The resulting document length is derived from the diffs.
    #[must_use]
    pub fn for_document(base_version: i64, diffs: Vec<Diff>, base_length: usize) -> Self {
        let diffs = simplify(diffs);
        let doc_length = resulting_length(base_length, &diffs);
        Self {
            base_version,
            diffs,
            doc_length,
        }
    }

    /// A patch that changes nothing.
    #[must_use]
    pub fn empty(base_version: i64, doc_length: usize) -> Self {
        Self {
            base_version,
            diffs: Vec::new(),
            doc_length,
        }
    }

    /// Version of the document the diff indices refer to.
    #[must_use]
    pub fn base_version(&self) -> i64 {
        self.base_version
    }

    /// The simplified diffs, ordered by position.
    #[must_use]
    pub fn diffs(&self) -> &[Diff] {
        &self.diffs
    }

    /// Length of the document after this patch is applied.
    #[must_use]
    pub fn doc_length(&self) -> usize {
        self.doc_length
    }

    /// Length of the document this patch applies to.
    #[must_use]
    pub fn base_length(&self) -> usize {
        let (inserted, deleted) = changed_lengths(&self.diffs);
        (self.doc_length + deleted).saturating_sub(inserted)
    }

    /// Whether the patch has no diffs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Same diffs relabelled as based on `version`.
    ///
    /// Used when the server confirms versions for which the diffs are already
    /// correct; the indices are left untouched.
    #[must_use]
    pub fn rebased(&self, version: i64) -> Self {
        Self {
            base_version: version,
            diffs: self.diffs.clone(),
            doc_length: self.doc_length,
        }
    }
}

impl std::fmt::Display for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "v{}:", self.base_version)?;
        for (i, diff) in self.diffs.iter().enumerate() {
            if i > 0 {
                f.write_str(",\n")?;
            }
            write!(f, "{diff}")?;
        }
        write!(f, ":\n{}", self.doc_length)
    }
}

impl FromStr for Patch {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || FormatError::MalformedPatch(s.to_string());

        let rest = s.strip_prefix('v').ok_or_else(malformed)?;
        let (version, rest) = rest.split_once(":\n").ok_or_else(malformed)?;
        let (body, length) = rest.rsplit_once(":\n").ok_or_else(malformed)?;

        let base_version = version.parse().map_err(|_| malformed())?;
        let doc_length = length.parse().map_err(|_| malformed())?;
        let diffs = if body.is_empty() {
            Vec::new()
        } else {
            body.split(",\n")
                .map(str::parse)
                .collect::<Result<Vec<Diff>, _>>()?
        };

        Ok(Self::new(base_version, diffs, doc_length))
    }
}

/// Merge adjacent diffs that continue each other.
///
/// Two insertions at the same index become one; a deletion ending where the
/// next deletion starts absorbs it. Diffs without text are dropped. The result
/// is a fixed point: simplifying it again changes nothing.
#[must_use]
pub fn simplify(diffs: Vec<Diff>) -> Vec<Diff> {
    let mut simplified: Vec<Diff> = Vec::with_capacity(diffs.len());
    for diff in diffs {
        if diff.is_empty() {
            continue;
        }
        if let Some(last) = simplified.last_mut() {
            let continues = match (last.kind, diff.kind) {
                (DiffKind::Insertion, DiffKind::Insertion) => last.start_index == diff.start_index,
                (DiffKind::Deletion, DiffKind::Deletion) => last.end_index() == diff.start_index,
                _ => false,
            };
            if continues {
                last.text.push_str(&diff.text);
                continue;
            }
        }
        simplified.push(diff);
    }
    simplified
}

/// Total inserted and deleted character counts.
fn changed_lengths(diffs: &[Diff]) -> (usize, usize) {
    diffs
        .iter()
        .fold((0, 0), |(inserted, deleted), diff| match diff.kind {
            DiffKind::Insertion => (inserted + diff.len(), deleted),
            DiffKind::Deletion => (inserted, deleted + diff.len()),
        })
}

/// Length of a document of `base_length` characters after `diffs`.
fn resulting_length(base_length: usize, diffs: &[Diff]) -> usize {
    let (inserted, deleted) = changed_lengths(diffs);
    (base_length + inserted).saturating_sub(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Patch {
        Patch::for_document(
            3,
            vec![Diff::deletion(4, "quick "), Diff::insertion(44, ".")],
            44,
        )
    }

    #[test]
    fn wire_roundtrip() {
        let patch = sample();
        let wire = patch.to_string();

        assert_eq!(wire, "v3:\n4:-6:quick%20,\n44:+1:.:\n39");
        assert_eq!(wire.parse::<Patch>().unwrap(), patch);
        assert_eq!(wire.parse::<Patch>().unwrap().to_string(), wire);
    }

    #[test]
    fn empty_patch_roundtrip() {
        let patch = Patch::empty(7, 12);
        let wire = patch.to_string();

        assert_eq!(wire, "v7:\n:\n12");
        assert_eq!(wire.parse::<Patch>().unwrap(), patch);
    }

    #[test]
    fn malformed_patches_are_rejected() {
        for input in ["", "3:\n:\n1", "v:\n:\n1", "vx:\n:\n1", "v1:\n:\n", "v1:\n0:+1:a"] {
            assert!(
                input.parse::<Patch>().is_err(),
                "expected {input:?} to be rejected"
            );
        }
        assert!(matches!(
            "v1:\n0:+2:a:\n3".parse::<Patch>(),
            Err(FormatError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn simplify_merges_contiguous_diffs() {
        let diffs = simplify(vec![
            Diff::deletion(2, "ab"),
            Diff::deletion(4, "cd"),
            Diff::insertion(9, "x"),
            Diff::insertion(9, "y"),
            Diff::insertion(12, ""),
        ]);

        assert_eq!(
            diffs,
            vec![Diff::deletion(2, "abcd"), Diff::insertion(9, "xy")]
        );
    }

    #[test]
    fn simplify_keeps_separated_diffs() {
        let diffs = vec![
            Diff::deletion(2, "ab"),
            Diff::deletion(5, "c"),
            Diff::insertion(6, "x"),
            Diff::insertion(7, "y"),
            Diff::deletion(7, "z"),
        ];
        assert_eq!(simplify(diffs.clone()), diffs);
    }

    #[test]
    fn simplify_is_idempotent() {
        let once = simplify(vec![
            Diff::insertion(0, "a"),
            Diff::insertion(0, "b"),
            Diff::insertion(0, "c"),
            Diff::deletion(0, "x"),
            Diff::deletion(1, "y"),
            Diff::deletion(2, "z"),
        ]);
        assert_eq!(once.len(), 2);
        assert_eq!(simplify(once.clone()), once);
    }

    #[test]
    fn lengths_are_derived_from_diffs() {
        let patch = sample();

        assert_eq!(patch.doc_length(), 39);
        assert_eq!(patch.base_length(), 44);
    }

    #[test]
    fn rebased_keeps_diffs() {
        let patch = sample().rebased(9);

        assert_eq!(patch.base_version(), 9);
        assert_eq!(patch.diffs(), sample().diffs());
        assert_eq!(patch.doc_length(), 39);
    }
}
