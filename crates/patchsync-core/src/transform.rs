//! Pairwise operational transformation.
//!
//! Transforming `current` against `other` rewrites `current` so that it has
//! the same intent when applied to the document *after* `other`. Both sides
//! must be based on the same document.
//!
//! # Case table (other vs current)
//!
//! | other vs current | I–I | I–D | D–I | D–D |
//! |---|---|---|---|---|
//! | other before | shift right | shift right | shift left, clip into other's start | drop overlap, shift left |
//! | same start | precedence decides | shift right | unaffected | drop overlap from the front |
//! | other after | unaffected | split around the insertion if inside | unaffected | drop overlap |
//!
//! Columns name the kinds as `other–current` (I = insertion, D = deletion).
//! Precedence only matters for two insertions at the same index: when the
//! other side has precedence its text is treated as landing first.

use crate::diff::{Diff, DiffKind};
use crate::patch::Patch;
use std::slice;

impl Diff {
    /// Transform this diff against a single concurrent diff.
    ///
    /// Returns zero diffs when the edit was entirely subsumed by `other`, two
    /// when `other` inserted text inside this deletion, and one otherwise.
    #[must_use]
    pub fn transform_against(&self, others_have_precedence: bool, other: &Diff) -> Vec<Diff> {
        self.transform(others_have_precedence, slice::from_ref(other))
    }

    /// Transform this diff against every diff of a concurrent patch.
    ///
    /// `others` are positioned against the same base as this diff and applied
    /// together, so positions are compared in base coordinates: an edit that
    /// only becomes adjacent to another after a deletion never ties with it.
    #[must_use]
    pub fn transform(&self, others_have_precedence: bool, others: &[Diff]) -> Vec<Diff> {
        if self.is_empty() {
            return Vec::new();
        }
        match self.kind {
            DiffKind::Insertion => vec![self.moved_to(map_position(
                self.start_index,
                others,
                others_have_precedence,
            ))],
            DiffKind::Deletion => self.surviving_deletions(others),
        }
    }

    /// Pieces of this deletion still present once `others` are applied.
    ///
    /// Characters `others` already deleted are dropped. Text `others` insert
    /// strictly inside the span is kept, splitting the deletion around it.
    fn surviving_deletions(&self, others: &[Diff]) -> Vec<Diff> {
        let start = self.start_index;
        let chars: Vec<char> = self.text.chars().collect();
        let end = start + chars.len();

        let mut removed = vec![false; chars.len()];
        let mut cuts = Vec::new();
        for other in others {
            match other.kind {
                DiffKind::Deletion => {
                    let from = other.start_index.max(start);
                    let to = other.end_index().min(end);
                    for offset in from..to {
                        removed[offset - start] = true;
                    }
                }
                DiffKind::Insertion => {
                    if other.start_index > start && other.start_index < end && !other.is_empty() {
                        cuts.push(other.start_index - start);
                    }
                }
            }
        }

        let mut pieces = Vec::new();
        let mut run: Option<(usize, String)> = None;
        for (offset, ch) in chars.into_iter().enumerate() {
            if cuts.contains(&offset) {
                if let Some((at, text)) = run.take() {
                    pieces.push(Diff::deletion(map_position(at, others, true), text));
                }
            }
            if removed[offset] {
                continue;
            }
            run.get_or_insert_with(|| (start + offset, String::new()))
                .1
                .push(ch);
        }
        if let Some((at, text)) = run {
            pieces.push(Diff::deletion(map_position(at, others, true), text));
        }
        pieces
    }
}

/// Position `index` of the base document lands at once `others` are applied.
///
/// Deleted characters before `index` pull it left (an index inside a deleted
/// span clips to the span's start). Insertions before it push it right, and so
/// do insertions exactly at it when `ties_go_first` is set.
fn map_position(index: usize, others: &[Diff], ties_go_first: bool) -> usize {
    let mut inserted = 0;
    let mut deleted = 0;
    for other in others {
        match other.kind {
            DiffKind::Insertion => {
                if other.start_index < index || (other.start_index == index && ties_go_first) {
                    inserted += other.len();
                }
            }
            DiffKind::Deletion => {
                if other.start_index < index {
                    deleted += other.end_index().min(index) - other.start_index;
                }
            }
        }
    }
    index + inserted - deleted
}

impl Patch {
    /// Transform this patch against patches that were applied first.
    ///
    /// `others` are applied in order: the first is based on the same document
    /// as this patch, each following one on the result of its predecessor. The
    /// result is based on the version after the newest of them.
    #[must_use]
    pub fn transform(&self, others_have_precedence: bool, others: &[Patch]) -> Patch {
        let Some(last) = others.last() else {
            return self.clone();
        };

        let mut diffs = self.diffs().to_vec();
        let mut max_version = i64::MIN;
        for other in others {
            diffs = diffs
                .iter()
                .flat_map(|diff| diff.transform(others_have_precedence, other.diffs()))
                .collect();
            max_version = max_version.max(other.base_version());
        }

        Patch::for_document(max_version + 1, diffs, last.doc_length())
    }
}

/// Transform two concurrent patches against each other.
///
/// Returns `(a', b')` where `a'` applies after `b` and `b'` applies after `a`.
/// `a_wins_ties` decides whose insertion comes first when both insert at the
/// same index; both results agree on that order, so applying `b` then `a'`
/// yields the same document as applying `a` then `b'`.
#[must_use]
pub fn transform_pair(a: &Patch, b: &Patch, a_wins_ties: bool) -> (Patch, Patch) {
    let a_prime = a.transform(!a_wins_ties, slice::from_ref(b));
    let b_prime = b.transform(a_wins_ties, slice::from_ref(a));
    (a_prime, b_prime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_patch;
    use crate::testing::{random_patch, XorShift};

    fn one(diff: &Diff, precedence: bool, other: &Diff) -> Vec<Diff> {
        diff.transform_against(precedence, other)
    }

    #[test]
    fn insertion_against_insertion() {
        let current = Diff::insertion(5, "x");

        assert_eq!(
            one(&current, false, &Diff::insertion(2, "ab")),
            vec![Diff::insertion(7, "x")]
        );
        assert_eq!(
            one(&current, true, &Diff::insertion(5, "ab")),
            vec![Diff::insertion(7, "x")]
        );
        assert_eq!(
            one(&current, false, &Diff::insertion(5, "ab")),
            vec![current.clone()]
        );
        assert_eq!(one(&current, true, &Diff::insertion(6, "ab")), vec![current]);
    }

    #[test]
    fn deletion_against_insertion() {
        let current = Diff::deletion(5, "hello");

        assert_eq!(
            one(&current, false, &Diff::insertion(5, "ab")),
            vec![Diff::deletion(7, "hello")]
        );
        assert_eq!(
            one(&current, false, &Diff::insertion(7, "ab")),
            vec![Diff::deletion(5, "he"), Diff::deletion(9, "llo")]
        );
        assert_eq!(
            one(&current, false, &Diff::insertion(10, "ab")),
            vec![current]
        );
    }

    #[test]
    fn insertion_against_deletion() {
        let other = Diff::deletion(4, "abcd");

        assert_eq!(
            one(&Diff::insertion(10, "x"), false, &other),
            vec![Diff::insertion(6, "x")]
        );
        assert_eq!(
            one(&Diff::insertion(6, "x"), false, &other),
            vec![Diff::insertion(4, "x")]
        );
        assert_eq!(
            one(&Diff::insertion(8, "x"), false, &other),
            vec![Diff::insertion(4, "x")]
        );
        assert_eq!(
            one(&Diff::insertion(4, "x"), true, &other),
            vec![Diff::insertion(4, "x")]
        );
        assert_eq!(
            one(&Diff::insertion(2, "x"), true, &other),
            vec![Diff::insertion(2, "x")]
        );
    }

    #[test]
    fn deletion_against_deletion() {
        let current = Diff::deletion(4, "efgh");

        // other entirely before
        assert_eq!(
            one(&current, false, &Diff::deletion(0, "ab")),
            vec![Diff::deletion(2, "efgh")]
        );
        // other overlaps the front
        assert_eq!(
            one(&current, false, &Diff::deletion(2, "cdef")),
            vec![Diff::deletion(2, "gh")]
        );
        // other covers current
        assert!(one(&current, false, &Diff::deletion(3, "defghi")).is_empty());
        // same start, other shorter
        assert_eq!(
            one(&current, false, &Diff::deletion(4, "ef")),
            vec![Diff::deletion(4, "gh")]
        );
        // same start, other longer
        assert!(one(&current, false, &Diff::deletion(4, "efghij")).is_empty());
        // other inside current
        assert_eq!(
            one(&current, false, &Diff::deletion(5, "fg")),
            vec![Diff::deletion(4, "eh")]
        );
        // other overlaps the back
        assert_eq!(
            one(&current, false, &Diff::deletion(6, "ghij")),
            vec![Diff::deletion(4, "ef")]
        );
        // other entirely after
        assert_eq!(
            one(&current, false, &Diff::deletion(8, "ij")),
            vec![current]
        );
    }

    #[test]
    fn patch_transform_tracks_versions_and_length() {
        let base = Patch::for_document(4, vec![Diff::insertion(0, "ab")], 10);
        let other = Patch::for_document(4, vec![Diff::deletion(5, "xyz")], 10);

        let transformed = base.transform(false, &[other]);

        assert_eq!(transformed.base_version(), 5);
        assert_eq!(transformed.doc_length(), 9);
        assert_eq!(transformed.diffs(), &[Diff::insertion(0, "ab")]);
    }

    #[test]
    fn transform_against_nothing_is_identity() {
        let patch = Patch::for_document(1, vec![Diff::insertion(0, "a")], 0);
        assert_eq!(patch.transform(true, &[]), patch);
    }

    #[test]
    fn concurrent_deletions_scenario() {
        let base = "The quick brown fox jumped over the lazy dog";
        let len = base.chars().count();
        let first = Patch::for_document(
            0,
            vec![Diff::deletion(4, "quick "), Diff::insertion(len, ".")],
            len,
        );
        let second = Patch::for_document(0, vec![Diff::deletion(27, "over ")], len);

        let second_after_first = second.transform(false, &[first.clone()]);
        let result = apply_patch(base, &[first, second_after_first]).unwrap();

        assert_eq!(result, "The brown fox jumped the lazy dog.");
    }

    #[test]
    fn split_deletion_converges() {
        let base = "0123456789";
        let a = Patch::for_document(0, vec![Diff::deletion(2, "23456")], 10);
        let b = Patch::for_document(
            0,
            vec![Diff::deletion(1, "1"), Diff::insertion(4, "xy")],
            10,
        );

        for a_wins in [true, false] {
            let (a_prime, b_prime) = transform_pair(&a, &b, a_wins);
            let left = apply_patch(base, &[b.clone(), a_prime]).unwrap();
            let right = apply_patch(base, &[a.clone(), b_prime]).unwrap();
            assert_eq!(left, right);
            assert_eq!(left, "0xy789");
        }
    }

    #[test]
    fn tied_insertions_follow_precedence() {
        let base = "ab";
        let a = Patch::for_document(0, vec![Diff::insertion(1, "A")], 2);
        let b = Patch::for_document(0, vec![Diff::insertion(1, "B")], 2);

        let (a_prime, b_prime) = transform_pair(&a, &b, true);
        assert_eq!(apply_patch(base, &[b.clone(), a_prime]).unwrap(), "aABb");
        assert_eq!(apply_patch(base, &[a.clone(), b_prime]).unwrap(), "aABb");

        let (a_prime, b_prime) = transform_pair(&a, &b, false);
        assert_eq!(apply_patch(base, &[b.clone(), a_prime]).unwrap(), "aBAb");
        assert_eq!(apply_patch(base, &[a, b_prime]).unwrap(), "aBAb");
    }

    #[test]
    fn random_patches_converge() {
        let mut rng = XorShift::new(0x5eed_1234);
        for _ in 0..500 {
            let length = rng.below(14);
            let base = rng.text(length);
            let a = random_patch(&mut rng, &base, 3);
            let b = random_patch(&mut rng, &base, 3);

            for a_wins in [true, false] {
                let (a_prime, b_prime) = transform_pair(&a, &b, a_wins);
                let left = apply_patch(&base, &[b.clone(), a_prime.clone()]).unwrap();
                let right = apply_patch(&base, &[a.clone(), b_prime.clone()]).unwrap();
                assert_eq!(
                    left, right,
                    "diverged on {base:?}\na = {a}\nb = {b}\na' = {a_prime}\nb' = {b_prime}"
                );
                assert_eq!(a_prime.doc_length(), left.chars().count());
            }
        }
    }
}
