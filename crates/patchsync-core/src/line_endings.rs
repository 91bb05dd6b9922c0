//! Conversion of diffs between LF and CRLF documents.
//!
//! Patches travel with LF line endings. A document stored with CRLF endings
//! has one extra character per line break, so every index after a break moves
//! and every `\n` inside diff text becomes `\r\n`.

use crate::diff::Diff;
use crate::patch::Patch;

impl Diff {
    /// Map this diff, valid against `lf_base`, onto the CRLF form of that text.
    #[must_use]
    pub fn to_crlf(&self, lf_base: &str) -> Diff {
        let breaks = lf_base
            .chars()
            .take(self.start_index)
            .filter(|&c| c == '\n')
            .count();
        Diff {
            kind: self.kind,
            start_index: self.start_index + breaks,
            text: self.text.replace('\n', "\r\n"),
        }
    }

    /// Map this diff, valid against `crlf_base`, onto the LF form of that text.
    #[must_use]
    pub fn to_lf(&self, crlf_base: &str) -> Diff {
        let pairs = crlf_pairs_before(crlf_base, self.start_index);
        Diff {
            kind: self.kind,
            start_index: self.start_index - pairs,
            text: self.text.replace("\r\n", "\n"),
        }
    }
}

impl Patch {
    /// Map every diff onto the CRLF form of `lf_base`.
    #[must_use]
    pub fn to_crlf(&self, lf_base: &str) -> Patch {
        let diffs = self.diffs().iter().map(|d| d.to_crlf(lf_base)).collect();
        let base_length =
            lf_base.chars().count() + lf_base.chars().filter(|&c| c == '\n').count();
        Patch::for_document(self.base_version(), diffs, base_length)
    }

    /// Map every diff onto the LF form of `crlf_base`.
    #[must_use]
    pub fn to_lf(&self, crlf_base: &str) -> Patch {
        let diffs = self.diffs().iter().map(|d| d.to_lf(crlf_base)).collect();
        let chars = crlf_base.chars().count();
        let base_length = chars - crlf_pairs_before(crlf_base, chars);
        Patch::for_document(self.base_version(), diffs, base_length)
    }
}

/// Number of `\r\n` pairs whose `\n` sits before `index`.
fn crlf_pairs_before(text: &str, index: usize) -> usize {
    let mut pairs = 0;
    let mut previous = None;
    for c in text.chars().take(index) {
        if c == '\n' && previous == Some('\r') {
            pairs += 1;
        }
        previous = Some(c);
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_patch;
    use crate::testing::{random_patch, XorShift};

    #[test]
    fn crlf_shifts_indices_after_breaks() {
        let lf = "ab\ncd\nef";
        let diff = Diff::insertion(6, "x\ny");

        let crlf = diff.to_crlf(lf);
        assert_eq!(crlf, Diff::insertion(8, "x\r\ny"));
        assert_eq!(crlf.to_lf(&lf.replace('\n', "\r\n")), diff);
    }

    #[test]
    fn diffs_round_trip_through_crlf() {
        let mut rng = XorShift::new(42);
        for _ in 0..200 {
            let length = rng.below(12);
            let lf = rng.text(length);
            let crlf = lf.replace('\n', "\r\n");

            for diff in random_patch(&mut rng, &lf, 3).diffs() {
                assert_eq!(&diff.to_crlf(&lf).to_lf(&crlf), diff);
            }
        }
    }

    #[test]
    fn converted_patch_matches_converted_result() {
        let mut rng = XorShift::new(7);
        for _ in 0..200 {
            let length = rng.below(12);
            let lf = rng.text(length);
            let crlf = lf.replace('\n', "\r\n");
            let patch = random_patch(&mut rng, &lf, 3);

            let converted = patch.to_crlf(&lf);
            let expected = apply_patch(&lf, &[patch.clone()]).unwrap();
            assert_eq!(converted.doc_length(), expected.replace('\n', "\r\n").chars().count());
            assert_eq!(converted.to_lf(&crlf), patch);
        }
    }
}
