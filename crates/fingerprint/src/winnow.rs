//! k-gram rolling hash and winnowing selection.
//!
//! Both passes run in O(n) over the token count. The rolling hash combines
//! seeded per-token xxh3 hashes through a polynomial whose base is derived
//! from the seed; winnowing selects the minimum hash of each sliding window
//! with rightmost tie-breaking via a monotonic deque. The combination gives
//! the standard guarantee: two documents sharing a token substring of
//! length >= w + k - 1 always share at least one selected fingerprint.

use std::collections::VecDeque;

use xxhash_rust::xxh3::xxh3_64_with_seed;

use tokenize::Token;

/// SplitMix64 finalizer; used to derive the polynomial base from the seed.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Compute the rolling k-gram hash sequence over canonical token encodings.
///
/// Returns `n - k + 1` hashes, or an empty vector when `n < k` or `k == 0`.
pub fn kgram_hashes(tokens: &[Token], k: usize, seed: u64) -> Vec<u64> {
    let n = tokens.len();
    if k == 0 || n < k {
        return Vec::new();
    }
    let th: Vec<u64> = tokens
        .iter()
        .map(|t| xxh3_64_with_seed(&t.canonical_bytes(), seed))
        .collect();

    const BASE: u64 = 1_000_003;
    let base = BASE ^ splitmix64(seed);

    let mut base_km1 = 1u64;
    for _ in 1..k {
        base_km1 = base_km1.wrapping_mul(base);
    }

    let mut out = Vec::with_capacity(n - k + 1);
    let mut h = 0u64;
    for &val in th.iter().take(k) {
        h = h.wrapping_mul(base).wrapping_add(val);
    }
    out.push(h);

    for (&old, &new) in th.iter().zip(th.iter().skip(k)) {
        h = h.wrapping_sub(old.wrapping_mul(base_km1));
        h = h.wrapping_mul(base).wrapping_add(new);
        out.push(h);
    }
    out
}

/// A winnowing selection: the hash plus the k-gram index it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub hash: u64,
    pub pos: usize,
}

/// Winnow the k-gram hash sequence with a monotonic deque, O(n).
///
/// Selects the minimum of each window of `w` consecutive hashes, breaking
/// ties toward the rightmost position, and emits each selected position
/// once. Deterministic for a given hash sequence and window size.
pub fn winnow(hashes: &[u64], w: usize) -> Vec<Selection> {
    let n = hashes.len();
    if n == 0 {
        return Vec::new();
    }

    let window = w.max(1);
    if window >= n {
        let mut min_idx = 0;
        let mut min_val = hashes[0];
        for (idx, &val) in hashes.iter().enumerate().skip(1) {
            if val <= min_val {
                min_val = val;
                min_idx = idx;
            }
        }
        return vec![Selection {
            hash: min_val,
            pos: min_idx,
        }];
    }

    let mut out = Vec::with_capacity(n - window + 1);
    let mut dq: VecDeque<usize> = VecDeque::with_capacity(window);
    let mut last_picked: Option<usize> = None;

    // `<=` on pop keeps the rightmost of equal hashes at the front.
    let push = |dq: &mut VecDeque<usize>, i: usize, vals: &[u64]| {
        while let Some(&j) = dq.back() {
            if vals[i] <= vals[j] {
                dq.pop_back();
            } else {
                break;
            }
        }
        dq.push_back(i);
    };

    let emit = |dq: &VecDeque<usize>,
                out: &mut Vec<Selection>,
                last: &mut Option<usize>,
                vals: &[u64]| {
        if let Some(&idx) = dq.front() {
            if *last != Some(idx) {
                out.push(Selection {
                    hash: vals[idx],
                    pos: idx,
                });
                *last = Some(idx);
            }
        }
    };

    for i in 0..window {
        push(&mut dq, i, hashes);
    }
    emit(&dq, &mut out, &mut last_picked, hashes);

    for i in window..n {
        let left = i - window + 1;
        while let Some(&j) = dq.front() {
            if j < left {
                dq.pop_front();
            } else {
                break;
            }
        }
        push(&mut dq, i, hashes);
        emit(&dq, &mut out, &mut last_picked, hashes);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenize::{TokenKind, IDENT};

    fn tokens(words: &[&str]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        for word in words {
            out.push(Token::new(TokenKind::Keyword, *word, offset, offset + word.len()));
            offset += word.len() + 1;
        }
        out
    }

    #[test]
    fn kgram_count_is_n_minus_k_plus_one() {
        let toks = tokens(&["a", "b", "c", "d", "e"]);
        assert_eq!(kgram_hashes(&toks, 3, 42).len(), 3);
        assert_eq!(kgram_hashes(&toks, 5, 42).len(), 1);
    }

    #[test]
    fn short_streams_produce_no_kgrams() {
        let toks = tokens(&["a", "b"]);
        assert!(kgram_hashes(&toks, 3, 42).is_empty());
        assert!(kgram_hashes(&[], 3, 42).is_empty());
    }

    #[test]
    fn kgram_hashes_deterministic() {
        let toks = tokens(&["the", "quick", "brown", "fox", "jumps"]);
        assert_eq!(kgram_hashes(&toks, 3, 7), kgram_hashes(&toks, 3, 7));
    }

    #[test]
    fn different_seeds_differ() {
        let toks = tokens(&["the", "quick", "brown", "fox"]);
        assert_ne!(kgram_hashes(&toks, 3, 1), kgram_hashes(&toks, 3, 2));
    }

    #[test]
    fn token_kind_participates_in_hash() {
        let a = vec![Token::new(TokenKind::Keyword, "for", 0, 3); 4];
        let b = vec![Token::new(TokenKind::Ident, "for", 0, 3); 4];
        assert_ne!(kgram_hashes(&a, 3, 42), kgram_hashes(&b, 3, 42));
    }

    #[test]
    fn order_matters() {
        let a = tokens(&["x", "y", "z"]);
        let b = tokens(&["z", "y", "x"]);
        assert_ne!(kgram_hashes(&a, 2, 42), kgram_hashes(&b, 2, 42));
    }

    #[test]
    fn ident_collapse_makes_renames_identical() {
        let mut a = tokens(&["def"]);
        a.push(Token::new(TokenKind::Ident, IDENT, 4, 5));
        a.push(Token::new(TokenKind::Punct, "(", 5, 6));
        let mut b = tokens(&["def"]);
        b.push(Token::new(TokenKind::Ident, IDENT, 4, 12));
        b.push(Token::new(TokenKind::Punct, "(", 12, 13));
        // Span differences must not affect the hash; only canonical bytes do.
        assert_eq!(kgram_hashes(&a, 2, 42), kgram_hashes(&b, 2, 42));
    }

    #[test]
    fn winnow_empty_input() {
        assert!(winnow(&[], 4).is_empty());
    }

    #[test]
    fn winnow_window_larger_than_input_picks_global_min() {
        let selections = winnow(&[50, 10, 30], 8);
        assert_eq!(selections, vec![Selection { hash: 10, pos: 1 }]);
    }

    #[test]
    fn winnow_selects_window_minimums() {
        // Windows of 2: [100,50] [50,200] [200,75] [75,25]
        let selections = winnow(&[100, 50, 200, 75, 25], 2);
        let hashes: Vec<u64> = selections.iter().map(|s| s.hash).collect();
        assert_eq!(hashes, vec![50, 75, 25]);
    }

    #[test]
    fn winnow_rightmost_tie_break() {
        let selections = winnow(&[50, 50, 50], 2);
        // Equal hashes: rightmost wins in each window, first emission at
        // index 1, then index 2.
        assert_eq!(selections[0].pos, 1);
        assert_eq!(selections.last().unwrap().pos, 2);
    }

    #[test]
    fn winnow_positions_index_the_input() {
        let hashes = vec![90, 10, 80, 70, 60, 50];
        for sel in winnow(&hashes, 3) {
            assert_eq!(sel.hash, hashes[sel.pos]);
        }
    }

    #[test]
    fn winnow_deterministic() {
        let hashes = vec![9, 3, 7, 1, 8, 2, 6];
        assert_eq!(winnow(&hashes, 3), winnow(&hashes, 3));
    }

    #[test]
    fn winnow_density_tracks_window_size() {
        // Fingerprint density should be roughly 2/(w+1); for a random-ish
        // sequence and w=3 expect around half the positions selected.
        let hashes: Vec<u64> = (0..200u64).map(splitmix64).collect();
        let selections = winnow(&hashes, 3);
        let density = selections.len() as f64 / hashes.len() as f64;
        assert!(density > 0.3 && density < 0.7, "density {density}");
    }
}
