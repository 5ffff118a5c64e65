//! Seen-URI fingerprint set
//!
//! Guarantees at-most-once scheduling: a URI is accepted only the first time
//! its fingerprint is offered. A Bloom filter answers "definitely not seen"
//! for new URIs; anything it thinks it may have seen is confirmed against the
//! exact fingerprint set.

use crate::uri::CrawlUri;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

const BLOOM_HASH_SEEDS: [u64; 3] = [
    0x517c_c1b7_2722_0a95,
    0x6d0f_27bd_ceb7_b067,
    0x9e37_79b1_85eb_ca87,
];

/// Default Bloom filter size: 2^23 bits (1 MiB)
const DEFAULT_BLOOM_WORDS: usize = 1 << 17;

/// Computes the 64-bit fingerprint of a URI
///
/// The top 24 bits come from the scheme and authority and the low 40 bits
/// from the full URI, so fingerprints of one host sort next to each other.
pub fn fingerprint(uri: &CrawlUri) -> u64 {
    let full = Sha256::digest(uri.as_str().as_bytes());
    let authority = match uri.scheme_and_authority() {
        Some(authority) => Sha256::digest(authority.as_bytes()),
        None => full.clone(),
    };

    let high = u64::from_be_bytes(leading_bytes(&authority)) & 0xFFFF_FF00_0000_0000;
    let low = u64::from_be_bytes(leading_bytes(&full)) >> 24;
    high | low
}

fn leading_bytes(digest: &[u8]) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    bytes
}

fn bloom_hash(fp: u64, seed: u64) -> u64 {
    let mut hash = seed ^ 8;
    for byte in fp.to_le_bytes() {
        hash ^= u64::from(byte).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}

struct SeenInner {
    bloom: Vec<u64>,
    exact: HashSet<u64>,
}

impl SeenInner {
    /// Sets the fingerprint's bits; returns true if any bit was previously clear
    fn bloom_insert(&mut self, fp: u64) -> bool {
        let bit_count = self.bloom.len() * 64;
        let mut changed = false;
        for seed in BLOOM_HASH_SEEDS {
            let idx = (bloom_hash(fp, seed) as usize) % bit_count;
            let mask = 1u64 << (idx % 64);
            let word = &mut self.bloom[idx / 64];
            if *word & mask == 0 {
                *word |= mask;
                changed = true;
            }
        }
        changed
    }
}

/// Concurrency-safe set of URI fingerprints
pub struct SeenUris {
    inner: Mutex<SeenInner>,
}

impl SeenUris {
    pub fn new() -> Self {
        Self::with_bloom_words(DEFAULT_BLOOM_WORDS)
    }

    /// Creates a set whose Bloom filter holds `words * 64` bits
    pub fn with_bloom_words(words: usize) -> Self {
        Self {
            inner: Mutex::new(SeenInner {
                bloom: vec![0; words.max(1)],
                exact: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SeenInner> {
        self.inner.lock().expect("seen-URI set lock poisoned")
    }

    /// Records the URI; returns true only the first time a URI is offered
    pub fn insert_if_absent(&self, uri: &CrawlUri) -> bool {
        self.insert_fingerprint(fingerprint(uri))
    }

    pub fn insert_fingerprint(&self, fp: u64) -> bool {
        let mut inner = self.lock();
        if inner.bloom_insert(fp) {
            // Definitely new
            inner.exact.insert(fp);
            return true;
        }
        inner.exact.insert(fp)
    }

    pub fn contains(&self, uri: &CrawlUri) -> bool {
        self.lock().exact.contains(&fingerprint(uri))
    }

    pub fn len(&self) -> usize {
        self.lock().exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all fingerprints, sorted, for checkpointing
    pub fn fingerprints(&self) -> Vec<u64> {
        let mut fps: Vec<u64> = self.lock().exact.iter().copied().collect();
        fps.sort_unstable();
        fps
    }

    /// Rebuilds the set from checkpointed fingerprints
    pub fn from_fingerprints(fps: impl IntoIterator<Item = u64>) -> Self {
        let seen = Self::new();
        for fp in fps {
            seen.insert_fingerprint(fp);
        }
        seen
    }
}

impl Default for SeenUris {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn curi(s: &str) -> CrawlUri {
        CrawlUri::parse(s).unwrap()
    }

    #[test]
    fn test_insert_if_absent() {
        let seen = SeenUris::new();
        assert!(seen.insert_if_absent(&curi("https://example.com/a")));
        assert!(!seen.insert_if_absent(&curi("https://example.com/a")));
        assert!(seen.insert_if_absent(&curi("https://example.com/b")));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_tiny_bloom_still_exact() {
        // One word saturates quickly; the exact set must catch every false positive
        let seen = SeenUris::with_bloom_words(1);
        for i in 0..500 {
            assert!(seen.insert_if_absent(&curi(&format!("https://example.com/{}", i))));
        }
        for i in 0..500 {
            assert!(!seen.insert_if_absent(&curi(&format!("https://example.com/{}", i))));
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn test_fingerprints_cluster_by_authority() {
        let a = fingerprint(&curi("https://example.com/one"));
        let b = fingerprint(&curi("https://example.com/two"));
        let c = fingerprint(&curi("https://other.org/one"));
        assert_ne!(a, b);
        assert_eq!(a >> 40, b >> 40);
        assert_ne!(a >> 40, c >> 40);
    }

    #[test]
    fn test_fingerprint_restore() {
        let seen = SeenUris::new();
        seen.insert_if_absent(&curi("https://example.com/a"));
        seen.insert_if_absent(&curi("https://example.com/b"));

        let restored = SeenUris::from_fingerprints(seen.fingerprints());
        assert_eq!(restored.len(), 2);
        assert!(restored.contains(&curi("https://example.com/a")));
        assert!(!restored.insert_if_absent(&curi("https://example.com/b")));
    }

    #[test]
    fn test_concurrent_inserts_accept_once() {
        let seen = Arc::new(SeenUris::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| seen.insert_if_absent(&curi(&format!("https://example.com/{}", i))))
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 100);
    }
}
