// src/fingerprint.rs
//! Content fingerprints: an exact 128-bit content hash and a 64-bit SimHash, plus the
//! per-run index that uses both to spot exact and near-duplicate items.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Two SimHashes at or below this Hamming distance are treated as the same content.
pub const NEAR_DUPLICATE_DISTANCE: u32 = 3;

/// SHA-256 over `title ++ body`, truncated to 128 bits, lowercase hex.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn word_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?u)\w+").expect("word regex"))
}

/// Lowercased word tokens, in order, repeats kept.
pub fn tokenize(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

/// 64-bit SimHash: each token occurrence votes +1/-1 per bit; bit i is set iff the vote is >= 0.
pub fn simhash(text: &str) -> u64 {
    let mut acc = [0i64; 64];
    for token in tokenize(text) {
        let h = token_hash(&token);
        for (bit, slot) in acc.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
    acc.iter()
        .enumerate()
        .fold(0u64, |fp, (bit, &v)| if v >= 0 { fp | (1u64 << bit) } else { fp })
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Fingerprints seen so far in one run. Not shared across runs.
#[derive(Debug, Default)]
pub struct DedupIndex {
    hashes: HashSet<String>,
    simhashes: Vec<u64>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `hash` was already seen or a seen SimHash is within
    /// [`NEAR_DUPLICATE_DISTANCE`]. A `false` answer records both values, so asking twice
    /// about the same item yields `false` then `true`.
    pub fn is_duplicate(&mut self, hash: &str, simhash: u64) -> bool {
        if self.hashes.contains(hash) {
            return true;
        }
        if self
            .simhashes
            .iter()
            .any(|&seen| hamming_distance(seen, simhash) <= NEAR_DUPLICATE_DISTANCE)
        {
            return true;
        }
        self.hashes.insert(hash.to_string());
        self.simhashes.push(simhash);
        false
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
