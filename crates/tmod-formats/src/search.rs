//! Boyer-Moore exact byte-pattern search
//!
//! A [`BoyerMoore`] engine is built once for a fixed pattern and can then be
//! run over any number of buffers. All tables are computed in [`BoyerMoore::new`]
//! and never change afterwards, so one engine can be shared freely between
//! threads.
//!
//! # Example
//!
//! ```rust
//! use tmod_formats::search::BoyerMoore;
//!
//! let engine = BoyerMoore::new(b"ABAB")?;
//! assert_eq!(engine.find(b"xxABABxx"), Some(2));
//! assert_eq!(engine.find_all(b"ABABABAB"), vec![0, 4]);
//! # Ok::<(), tmod_formats::TmodError>(())
//! ```

use crate::error::{TmodError, TmodResult};

/// Single-pattern Boyer-Moore search engine
#[derive(Debug, Clone)]
pub struct BoyerMoore {
    pattern: Box<[u8]>,
    /// Rightmost index of each byte value in the pattern, -1 if absent
    last: [isize; 256],
    /// Shift to apply after a mismatch at each pattern position
    good_suffix: Box<[usize]>,
}

impl BoyerMoore {
    /// Build an engine for `pattern`
    pub fn new(pattern: &[u8]) -> TmodResult<Self> {
        if pattern.is_empty() {
            return Err(TmodError::EmptyPattern);
        }

        let suffix = suffix_table(pattern);
        let good_suffix = good_suffix_table(&suffix);

        Ok(Self {
            pattern: pattern.into(),
            last: bad_character_table(pattern),
            good_suffix: good_suffix.into_boxed_slice(),
        })
    }

    /// The pattern this engine searches for
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Pattern length in bytes
    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Always false; empty patterns are rejected at construction
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Find the lowest index `>= offset` where the whole pattern lies inside
    /// `haystack[offset..offset + length]`
    ///
    /// The window is clamped to the end of `haystack`.
    pub fn search(&self, haystack: &[u8], offset: usize, length: usize) -> Option<usize> {
        let m = self.pattern.len();
        let end = offset.saturating_add(length).min(haystack.len());
        if end < m {
            return None;
        }
        let last_start = end - m;

        let mut j = offset;
        while j <= last_start {
            // Compare right to left; `i` counts the bytes still unmatched
            let mut i = m;
            while i > 0 && self.pattern[i - 1] == haystack[j + i - 1] {
                i -= 1;
            }

            if i == 0 {
                return Some(j);
            }

            let pos = i - 1;
            let bad_character =
                (pos as isize - self.last[usize::from(haystack[j + pos])]).max(0) as usize;
            j += self.good_suffix[pos].max(bad_character);
        }

        None
    }

    /// Find the first occurrence anywhere in `haystack`
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        self.search(haystack, 0, haystack.len())
    }

    /// Iterate over non-overlapping occurrences, left to right
    pub fn find_iter<'a>(&'a self, haystack: &'a [u8]) -> Matches<'a> {
        Matches {
            engine: self,
            haystack,
            position: 0,
        }
    }

    /// Collect all non-overlapping occurrences
    pub fn find_all(&self, haystack: &[u8]) -> Vec<usize> {
        self.find_iter(haystack).collect()
    }
}

/// Iterator over non-overlapping matches, see [`BoyerMoore::find_iter`]
#[derive(Debug)]
pub struct Matches<'a> {
    engine: &'a BoyerMoore,
    haystack: &'a [u8],
    position: usize,
}

impl Iterator for Matches<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let remaining = self.haystack.len().saturating_sub(self.position);
        let found = self
            .engine
            .search(self.haystack, self.position, remaining)?;
        self.position = found + self.engine.len();
        Some(found)
    }
}

fn bad_character_table(pattern: &[u8]) -> [isize; 256] {
    let mut last = [-1isize; 256];
    for (i, &byte) in pattern.iter().enumerate() {
        last[usize::from(byte)] = i as isize;
    }
    last
}

/// `suffix[i]` is the length of the longest substring ending at `i` that is
/// also a suffix of the pattern
fn suffix_table(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len() as isize;
    let mut suffix = vec![0usize; pattern.len()];
    suffix[pattern.len() - 1] = pattern.len();

    // [g + 1, f] is the rightmost window known to match a suffix
    let mut g = m - 1;
    let mut f = m - 1;
    for i in (0..m - 1).rev() {
        let mirrored = suffix[(i + m - 1 - f) as usize] as isize;
        if i > g && mirrored < i - g {
            suffix[i as usize] = mirrored as usize;
        } else {
            g = g.min(i);
            f = i;
            while g >= 0 && pattern[g as usize] == pattern[(g + m - 1 - f) as usize] {
                g -= 1;
            }
            suffix[i as usize] = (f - g) as usize;
        }
    }

    suffix
}

fn good_suffix_table(suffix: &[usize]) -> Vec<usize> {
    let m = suffix.len();

    // No reoccurrence and no overlap: shift past the whole pattern
    let mut shift = vec![m; m];

    // A prefix of the pattern matches the end of the matched suffix
    let mut j = 0;
    for i in (0..m).rev() {
        if suffix[i] == i + 1 {
            while j < m - 1 - i {
                if shift[j] == m {
                    shift[j] = m - 1 - i;
                }
                j += 1;
            }
        }
    }

    // The matched suffix occurs again further left
    for i in 0..m - 1 {
        shift[m - 1 - suffix[i]] = m - 1 - i;
    }

    shift
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive(pattern: &[u8], haystack: &[u8], offset: usize, length: usize) -> Option<usize> {
        let end = offset.saturating_add(length).min(haystack.len());
        (offset..end)
            .take_while(|&j| j + pattern.len() <= end)
            .find(|&j| &haystack[j..j + pattern.len()] == pattern)
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            BoyerMoore::new(&[]).unwrap_err(),
            TmodError::EmptyPattern
        ));
    }

    #[test]
    fn test_reference_tables() {
        // Worked example from Charras & Lecroq, "Handbook of Exact String Matching"
        let suffix = suffix_table(b"GCAGAGAG");
        assert_eq!(suffix, vec![1, 0, 0, 2, 0, 4, 0, 8]);
        assert_eq!(good_suffix_table(&suffix), vec![7, 7, 7, 2, 7, 4, 7, 1]);

        let last = bad_character_table(b"GCAGAGAG");
        assert_eq!(last[usize::from(b'G')], 7);
        assert_eq!(last[usize::from(b'A')], 6);
        assert_eq!(last[usize::from(b'C')], 1);
        assert_eq!(last[usize::from(b'T')], -1);
    }

    #[test]
    fn test_abab_non_overlapping() {
        let engine = BoyerMoore::new(b"ABAB").unwrap();
        let text = b"ABABABAB";

        assert_eq!(engine.find_all(text), vec![0, 4]);
        assert_eq!(engine.search(text, 0, text.len()), Some(0));
        assert_eq!(engine.search(text, 1, text.len() - 1), Some(2));
        assert_eq!(engine.search(text, 3, text.len() - 3), Some(4));
        assert_eq!(engine.search(text, 5, text.len() - 5), None);
    }

    #[test]
    fn test_window_bounds() {
        let engine = BoyerMoore::new(b"ABAB").unwrap();
        let text = b"ABABABAB";

        // Match must fit entirely inside the window
        assert_eq!(engine.search(text, 0, 3), None);
        assert_eq!(engine.search(text, 2, 4), Some(2));
        assert_eq!(engine.search(text, 2, 3), None);

        // Windows past the end are clamped or empty
        assert_eq!(engine.search(text, 4, 100), Some(4));
        assert_eq!(engine.search(text, 100, 10), None);
        assert_eq!(engine.search(text, usize::MAX, usize::MAX), None);
    }

    #[test]
    fn test_markers() {
        let engine = BoyerMoore::new(&[0x00, 0x00, 0x80, 0xFF, 0x7F]).unwrap();
        let data = [0x00, 0x00, 0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x80, 0xFF];
        assert_eq!(engine.find(&data), Some(1));
        assert_eq!(engine.search(&data, 2, 8), None);
    }

    #[test]
    fn test_single_byte_pattern() {
        let engine = BoyerMoore::new(b"x").unwrap();
        assert_eq!(engine.find_all(b"axbxxc"), vec![1, 3, 4]);
        assert_eq!(engine.find(b""), None);
    }

    #[test]
    fn test_shared_between_threads() {
        let engine = BoyerMoore::new(b"needle").unwrap();
        let engine = &engine;
        let haystacks: Vec<Vec<u8>> = (0..4)
            .map(|n| {
                let mut data = vec![b'.'; 1000 + n * 37];
                data.extend_from_slice(b"needle");
                data
            })
            .collect();

        std::thread::scope(|scope| {
            let handles: Vec<_> = haystacks
                .iter()
                .map(|haystack| scope.spawn(move || engine.find(haystack)))
                .collect();

            for (handle, haystack) in handles.into_iter().zip(&haystacks) {
                assert_eq!(handle.join().unwrap(), Some(haystack.len() - 6));
            }
        });
    }

    proptest! {
        /// Boyer-Moore agrees with a naive scan on a small alphabet
        #[test]
        fn search_matches_naive(
            pattern in prop::collection::vec(0u8..3, 1..6),
            haystack in prop::collection::vec(0u8..3, 0..200),
            offset in 0usize..220,
            length in 0usize..220,
        ) {
            let engine = BoyerMoore::new(&pattern).unwrap();
            prop_assert_eq!(
                engine.search(&haystack, offset, length),
                naive(&pattern, &haystack, offset, length)
            );
        }

        /// Every reported match is real and none overlap
        #[test]
        fn find_all_is_consistent(
            pattern in prop::collection::vec(0u8..2, 1..4),
            haystack in prop::collection::vec(0u8..2, 0..100),
        ) {
            let engine = BoyerMoore::new(&pattern).unwrap();
            let matches = engine.find_all(&haystack);
            for pair in matches.windows(2) {
                prop_assert!(pair[1] >= pair[0] + pattern.len());
            }
            for &found in &matches {
                prop_assert_eq!(&haystack[found..found + pattern.len()], pattern.as_slice());
            }
        }
    }
}
