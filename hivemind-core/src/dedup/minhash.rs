//! MinHash signatures and LSH index for lexical near-duplicate detection
//!
//! Signatures are computed over lowercased whitespace tokens with a family of
//! 128 hash permutations. The LSH index buckets signature bands so a query
//! touches only candidate buckets; hits are then verified against the Jaccard
//! threshold by signature comparison.
//!
//! The index is process-wide mutable state: inserts are serialized through the
//! write lock, reads take the shared lock. It is populated incrementally as
//! items are approved and rebuilt by full scan at startup or when the MinHash
//! configuration changes.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

/// Compute a MinHash signature for the given text
///
/// Tokenizes by lowercasing and whitespace-splitting, then takes the minimum
/// of each permutation hash across tokens. Empty input yields the all-max
/// signature, which matches nothing.
pub fn minhash_signature(text: &str, num_perm: usize) -> Vec<u64> {
    let mut signature = vec![u64::MAX; num_perm];

    for token in text.to_lowercase().split_whitespace() {
        let base = fnv1a(token.as_bytes());
        for (i, slot) in signature.iter_mut().enumerate() {
            let h = permute(base, i as u64);
            if h < *slot {
                *slot = h;
            }
        }
    }
    signature
}

/// Estimated Jaccard similarity: fraction of matching signature components
pub fn estimate_jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / a.len() as f64
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Mix the base token hash with a per-permutation seed (splitmix64 finalizer)
fn permute(base: u64, index: u64) -> u64 {
    let mut z = base ^ index.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Pick a band count whose LSH activation curve sits closest to the threshold
///
/// For `b` bands of `r` rows each, the curve's inflection is near
/// `(1/b)^(1/r)`. High thresholds want few wide bands.
fn choose_bands(num_perm: usize, threshold: f64) -> usize {
    let mut best = 1;
    let mut best_delta = f64::MAX;
    for bands in 1..=num_perm {
        if num_perm % bands != 0 {
            continue;
        }
        let rows = num_perm / bands;
        let inflection = (1.0 / bands as f64).powf(1.0 / rows as f64);
        let delta = (inflection - threshold).abs();
        if delta < best_delta {
            best_delta = delta;
            best = bands;
        }
    }
    best
}

#[derive(Default)]
struct LshInner {
    /// (band index, band hash) -> item ids sharing the bucket
    buckets: HashMap<(usize, u64), Vec<Uuid>>,
    /// Full signatures for Jaccard verification
    signatures: HashMap<Uuid, Vec<u64>>,
}

/// Banded MinHash-LSH index
pub struct MinHashLshIndex {
    num_perm: usize,
    threshold: f64,
    bands: usize,
    rows: usize,
    inner: RwLock<LshInner>,
}

impl MinHashLshIndex {
    /// Create an empty index with the given permutation count and threshold
    pub fn new(num_perm: usize, threshold: f64) -> Self {
        let bands = choose_bands(num_perm, threshold);
        Self {
            num_perm,
            threshold,
            bands,
            rows: num_perm / bands,
            inner: RwLock::new(LshInner::default()),
        }
    }

    /// Insert an item's content; re-inserting an existing id is a no-op
    pub fn insert(&self, item_id: Uuid, content: &str) {
        let signature = minhash_signature(content, self.num_perm);
        let mut inner = self.inner.write();
        if inner.signatures.contains_key(&item_id) {
            return;
        }
        for (band, hash) in self.band_hashes(&signature) {
            inner.buckets.entry((band, hash)).or_default().push(item_id);
        }
        inner.signatures.insert(item_id, signature);
    }

    /// Find indexed items with estimated Jaccard similarity >= threshold
    pub fn query(&self, content: &str) -> Vec<Uuid> {
        let signature = minhash_signature(content, self.num_perm);
        let inner = self.inner.read();

        let mut candidates: HashSet<Uuid> = HashSet::new();
        for (band, hash) in self.band_hashes(&signature) {
            if let Some(ids) = inner.buckets.get(&(band, hash)) {
                candidates.extend(ids.iter().copied());
            }
        }

        candidates
            .into_iter()
            .filter(|id| {
                inner
                    .signatures
                    .get(id)
                    .is_some_and(|sig| estimate_jaccard(&signature, sig) >= self.threshold)
            })
            .collect()
    }

    /// Drop all indexed items (precedes a full-scan rebuild)
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.buckets.clear();
        inner.signatures.clear();
    }

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.inner.read().signatures.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn band_hashes(&self, signature: &[u64]) -> Vec<(usize, u64)> {
        (0..self.bands)
            .map(|band| {
                let start = band * self.rows;
                let chunk = &signature[start..start + self.rows];
                let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
                for &v in chunk {
                    hash ^= v;
                    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
                }
                (band, hash)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_full_similarity() {
        let a = minhash_signature("the quick brown fox", 128);
        let b = minhash_signature("the quick brown fox", 128);
        assert!((estimate_jaccard(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_text_low_similarity() {
        let a = minhash_signature("alpha beta gamma delta", 128);
        let b = minhash_signature("one two three four", 128);
        assert!(estimate_jaccard(&a, &b) < 0.2);
    }

    #[test]
    fn near_duplicate_scores_high() {
        let base = "set the connection pool to twenty and enable keepalive on the client";
        let edited = "set the connection pool to twenty and enable keepalive on the client.";
        let a = minhash_signature(base, 128);
        let b = minhash_signature(edited, 128);
        // One token differs out of ~13; estimated Jaccard should stay high
        assert!(estimate_jaccard(&a, &b) > 0.8);
    }

    #[test]
    fn index_finds_exact_duplicate() {
        let index = MinHashLshIndex::new(128, 0.95);
        let id = Uuid::new_v4();
        index.insert(id, "retry the webhook three times with five second backoff");

        let hits = index.query("retry the webhook three times with five second backoff");
        assert_eq!(hits, vec![id]);
    }

    #[test]
    fn index_misses_unrelated_content() {
        let index = MinHashLshIndex::new(128, 0.95);
        index.insert(Uuid::new_v4(), "retry the webhook three times with five second backoff");

        let hits = index.query("completely different knowledge about database tuning parameters");
        assert!(hits.is_empty());
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let index = MinHashLshIndex::new(128, 0.95);
        let id = Uuid::new_v4();
        index.insert(id, "some content here for indexing");
        index.insert(id, "some content here for indexing");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn clear_empties_the_index() {
        let index = MinHashLshIndex::new(128, 0.95);
        index.insert(Uuid::new_v4(), "content one for the index");
        index.insert(Uuid::new_v4(), "content two for the index");
        assert_eq!(index.len(), 2);
        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn bands_divide_permutations() {
        for num_perm in [64, 128, 256] {
            let bands = choose_bands(num_perm, 0.95);
            assert_eq!(num_perm % bands, 0);
            // High threshold wants wide rows (few bands)
            assert!(bands <= num_perm / 8);
        }
    }
}
