//! Deterministic generators for property tests.

use crate::diff::Diff;
use crate::patch::Patch;

const ALPHABET: [char; 5] = ['a', 'b', 'c', 'é', '\n'];

/// Seeded xorshift generator; small and reproducible.
pub(crate) struct XorShift(u64);

impl XorShift {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform value in `0..n`, or 0 when `n` is 0.
    pub(crate) fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        usize::try_from(self.next_u64() % n as u64).unwrap()
    }

    pub(crate) fn text(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| ALPHABET[self.below(ALPHABET.len())])
            .collect()
    }
}

/// A well-formed patch against `base` with up to `max_diffs` diffs.
pub(crate) fn random_patch(rng: &mut XorShift, base: &str, max_diffs: usize) -> Patch {
    let chars: Vec<char> = base.chars().collect();
    let mut diffs = Vec::new();
    let mut cursor = 0;

    for _ in 0..rng.below(max_diffs + 1) {
        let at = cursor + rng.below(chars.len() - cursor + 1);
        if at < chars.len() && rng.below(2) == 0 {
            let len = 1 + rng.below((chars.len() - at).min(3));
            let text: String = chars[at..at + len].iter().collect();
            diffs.push(Diff::deletion(at, text));
            cursor = at + len;
        } else {
            let len = 1 + rng.below(3);
            diffs.push(Diff::insertion(at, rng.text(len)));
            cursor = at;
        }
    }

    Patch::for_document(0, diffs, chars.len())
}
