//! Sequential composition of patches.
//!
//! Consolidation merges patches that were made one after another on the same
//! branch (each based on the result of its predecessor) into a single patch
//! against the first patch's base. Each patch is read as a walk over its base
//! document: spans it keeps, text it inserts, and text it deletes. Two walks
//! are merged in lock-step, the later patch consuming the output of the
//! earlier one.

use crate::diff::{split_at_char, Diff, DiffKind};
use crate::patch::Patch;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Keep(usize),
    Insert(String),
    Delete(String),
}

impl Step {
    fn len(&self) -> usize {
        match self {
            Step::Keep(n) => *n,
            Step::Insert(text) | Step::Delete(text) => text.chars().count(),
        }
    }

    /// Split off the first `n` characters, leaving the rest in `self`.
    fn take(&mut self, n: usize) -> Step {
        match self {
            Step::Keep(len) => {
                *len -= n;
                Step::Keep(n)
            }
            Step::Insert(text) | Step::Delete(text) => {
                let (head, tail) = split_at_char(text, n);
                let head = head.to_string();
                let tail = tail.to_string();
                *text = tail;
                if matches!(self, Step::Insert(_)) {
                    Step::Insert(head)
                } else {
                    Step::Delete(head)
                }
            }
        }
    }
}

/// Consolidate sequential patches into one.
///
/// `patches[0]` applies to some document, `patches[1]` to the result, and so
/// on. The result applies to the same document as `patches[0]` and has the
/// effect of applying all of them in order. Returns `None` when `patches` is
/// empty.
///
/// # Errors
///
/// Returns [`ConsolidateError`] when a patch does not fit the output of its
/// predecessor, which means the patches were not actually sequential.
pub fn consolidate(patches: &[Patch]) -> Result<Option<Patch>, ConsolidateError> {
    let Some((first, rest)) = patches.split_first() else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(Some(first.clone()));
    }

    let mut steps = steps_of(first)?;
    for patch in rest {
        steps = compose(steps, steps_of(patch)?)?;
    }

    let last = &patches[patches.len() - 1];
    let consolidated = Patch::new(first.base_version(), diffs_of(steps), last.doc_length());
    tracing::debug!(
        patches = patches.len(),
        diffs = consolidated.diffs().len(),
        base_version = consolidated.base_version(),
        "Consolidated patches"
    );
    Ok(Some(consolidated))
}

fn steps_of(patch: &Patch) -> Result<Vec<Step>, ConsolidateError> {
    let base_length = patch.base_length();
    let mut steps = Vec::with_capacity(patch.diffs().len() * 2 + 1);
    let mut cursor = 0;

    for diff in patch.diffs() {
        if diff.start_index < cursor {
            return Err(ConsolidateError::Unordered {
                index: diff.start_index,
            });
        }
        if diff.start_index > cursor {
            steps.push(Step::Keep(diff.start_index - cursor));
        }
        match diff.kind {
            DiffKind::Insertion => steps.push(Step::Insert(diff.text.clone())),
            DiffKind::Deletion => steps.push(Step::Delete(diff.text.clone())),
        }
        cursor = diff.end_index();
    }

    if cursor > base_length {
        return Err(ConsolidateError::Unordered { index: cursor });
    }
    if base_length > cursor {
        steps.push(Step::Keep(base_length - cursor));
    }
    Ok(steps)
}

/// Merge `earlier` with `later`, where `later` walks the output of `earlier`.
fn compose(earlier: Vec<Step>, later: Vec<Step>) -> Result<Vec<Step>, ConsolidateError> {
    let mut output = Vec::with_capacity(earlier.len() + later.len());
    let mut earlier = earlier.into_iter();
    let mut later = later.into_iter();
    let mut a = earlier.next();
    let mut b = later.next();

    loop {
        match (&mut a, &mut b) {
            (_, Some(Step::Insert(_))) => {
                output.extend(b.take());
                b = later.next();
            }
            (Some(Step::Delete(_)), _) => {
                output.extend(a.take());
                a = earlier.next();
            }
            (None, None) => break,
            (None, Some(_)) | (Some(_), None) => {
                let remaining = |step: &Option<Step>| step.as_ref().map_or(0, Step::len);
                return Err(ConsolidateError::LengthMismatch {
                    earlier: remaining(&a) + earlier.map(|s| visible_len(&s)).sum::<usize>(),
                    later: remaining(&b) + later.map(|s| consumed_len(&s)).sum::<usize>(),
                });
            }
            (Some(first), Some(second)) => {
                let n = first.len().min(second.len());
                let taken_a = first.take(n);
                let taken_b = second.take(n);
                match (taken_a, taken_b) {
                    (Step::Keep(_), Step::Keep(n)) => output.push(Step::Keep(n)),
                    (Step::Keep(_), Step::Delete(text)) => output.push(Step::Delete(text)),
                    (Step::Insert(text), Step::Keep(_)) => output.push(Step::Insert(text)),
                    (Step::Insert(inserted), Step::Delete(deleted)) => {
                        if inserted != deleted {
                            return Err(ConsolidateError::TextMismatch { inserted, deleted });
                        }
                    }
                    _ => unreachable!("insertions and deletions are handled above"),
                }
                if first.len() == 0 {
                    a = earlier.next();
                }
                if b.as_ref().map_or(0, Step::len) == 0 {
                    b = later.next();
                }
            }
        }
    }

    Ok(output)
}

fn visible_len(step: &Step) -> usize {
    match step {
        Step::Delete(_) => 0,
        other => other.len(),
    }
}

fn consumed_len(step: &Step) -> usize {
    match step {
        Step::Insert(_) => 0,
        other => other.len(),
    }
}

fn diffs_of(steps: Vec<Step>) -> Vec<Diff> {
    let mut diffs = Vec::new();
    let mut position = 0;
    for step in steps {
        match step {
            Step::Keep(n) => position += n,
            Step::Insert(text) => diffs.push(Diff::insertion(position, text)),
            Step::Delete(text) => {
                let len = text.chars().count();
                diffs.push(Diff::deletion(position, text));
                position += len;
            }
        }
    }
    diffs
}

/// Errors raised when patches do not compose sequentially.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsolidateError {
    /// A diff starts inside the span of the previous diff, or past the base
    #[error("diff at {index} is out of order")]
    Unordered {
        /// Offending index
        index: usize,
    },
    /// A patch expects a document of a different length than its predecessor produced
    #[error("patch produces {earlier} characters but the next patch expects {later}")]
    LengthMismatch {
        /// Characters left in the earlier patch's output
        earlier: usize,
        /// Characters left in the later patch's base
        later: usize,
    },
    /// A later deletion removes text other than what the earlier patch inserted
    #[error("deleted {deleted:?} where {inserted:?} was inserted")]
    TextMismatch {
        /// Text inserted by the earlier patch
        inserted: String,
        /// Text the later patch deletes
        deleted: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_patch;
    use crate::testing::{random_patch, XorShift};

    #[test]
    fn no_patches_consolidate_to_nothing() {
        assert_eq!(consolidate(&[]), Ok(None));
    }

    #[test]
    fn single_patch_is_returned_unchanged() {
        let patch = Patch::for_document(3, vec![Diff::insertion(1, "x")], 4);
        assert_eq!(consolidate(&[patch.clone()]), Ok(Some(patch)));
    }

    #[test]
    fn appends_are_merged() {
        let first = Patch::for_document(0, vec![Diff::insertion(0, "test0")], 0);
        let second = Patch::for_document(1, vec![Diff::insertion(5, "test1")], 5);

        let merged = consolidate(&[first, second]).unwrap().unwrap();

        assert_eq!(merged.base_version(), 0);
        assert_eq!(merged.diffs(), &[Diff::insertion(0, "test0test1")]);
        assert_eq!(merged.doc_length(), 10);
    }

    #[test]
    fn later_deletion_cancels_earlier_insertion() {
        let first = Patch::for_document(0, vec![Diff::insertion(1, "xyz")], 2);
        let second = Patch::for_document(1, vec![Diff::deletion(1, "xy")], 5);

        let merged = consolidate(&[first, second]).unwrap().unwrap();

        assert_eq!(merged.diffs(), &[Diff::insertion(1, "z")]);
        assert_eq!(apply_patch("ab", &[merged]).unwrap(), "azb");
    }

    #[test]
    fn later_insertion_lands_inside_earlier_deletion() {
        let base = "hello world";
        let first = Patch::for_document(0, vec![Diff::deletion(0, "hello ")], 11);
        let second = Patch::for_document(1, vec![Diff::insertion(0, "big ")], 5);

        let merged = consolidate(&[first.clone(), second.clone()]).unwrap().unwrap();

        assert_eq!(
            merged.diffs(),
            &[Diff::insertion(0, "big "), Diff::deletion(0, "hello ")]
        );
        assert_eq!(
            apply_patch(base, &[merged]).unwrap(),
            apply_patch(base, &[first, second]).unwrap()
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let first = Patch::for_document(0, vec![Diff::insertion(0, "a")], 2);
        let second = Patch::for_document(1, vec![Diff::insertion(0, "b")], 5);

        assert!(matches!(
            consolidate(&[first, second]),
            Err(ConsolidateError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_text_is_rejected() {
        let first = Patch::for_document(0, vec![Diff::insertion(0, "ab")], 0);
        let second = Patch::for_document(1, vec![Diff::deletion(0, "xy")], 2);

        assert_eq!(
            consolidate(&[first, second]),
            Err(ConsolidateError::TextMismatch {
                inserted: "ab".to_string(),
                deleted: "xy".to_string(),
            })
        );
    }

    #[test]
    fn random_sequences_consolidate_equivalently() {
        let mut rng = XorShift::new(0x00c0_ffee);
        for _ in 0..300 {
            let length = rng.below(12);
            let base = rng.text(length);
            let count = 1 + rng.below(4);

            let mut patches = Vec::new();
            let mut document = base.clone();
            for _ in 0..count {
                let patch = random_patch(&mut rng, &document, 3);
                document = apply_patch(&document, &[patch.clone()]).unwrap();
                patches.push(patch);
            }

            let merged = consolidate(&patches).unwrap().unwrap();
            assert_eq!(
                apply_patch(&base, &[merged.clone()]).unwrap(),
                document,
                "base {base:?}, merged {merged}"
            );
            assert_eq!(merged.doc_length(), document.chars().count());
            assert_eq!(merged.base_length(), base.chars().count());
        }
    }
}
