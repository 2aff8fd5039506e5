//! Deterministic text embeddings
//!
//! Maps text to a unit-norm 384-dimensional vector via a hash-seeded PRNG
//! projection. The same text always produces the same vector for the lifetime
//! of the configured model identity, which is what retrieval, dedup Stage 1,
//! and approval depend on. The model identity (id + revision) is pinned into
//! `deployment_config` at startup so embedding-space drift between deployments
//! is detectable before vectors are compared.

use serde::{Deserialize, Serialize};

/// Default embedding dimensionality (sentence-transformer compatible)
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Deterministic text-to-vector embedder with a pinned model identity
#[derive(Debug, Clone)]
pub struct Embedder {
    model_id: String,
    model_revision: String,
    dimensions: usize,
}

/// Model identity tuple persisted to `deployment_config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub model_id: String,
    pub model_revision: String,
    pub dimensions: usize,
}

impl Embedder {
    /// Create an embedder for the given model identity
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            // Revision pins the projection scheme; bump when the mapping changes
            model_revision: "r1".to_string(),
            dimensions,
        }
    }

    /// Fully-qualified model identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Opaque revision pin for drift detection
    pub fn model_revision(&self) -> &str {
        &self.model_revision
    }

    /// Embedding vector dimensionality
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Identity tuple for deployment-config pinning
    pub fn identity(&self) -> ModelIdentity {
        ModelIdentity {
            model_id: self.model_id.clone(),
            model_revision: self.model_revision.clone(),
            dimensions: self.dimensions,
        }
    }

    /// Embed a single text into a unit-norm vector
    ///
    /// Token-level hashing gives related texts overlapping contributions while
    /// staying fully deterministic: each lowercased whitespace token seeds a
    /// small PRNG whose values are accumulated into the output vector, then
    /// the sum is normalized to unit length.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut accum = vec![0.0f32; self.dimensions];

        for token in text.to_lowercase().split_whitespace() {
            let mut seed = fnv1a(token.as_bytes());
            for slot in accum.iter_mut() {
                seed = seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                // Top 31 bits scaled into [-1, 1)
                let value = ((seed >> 33) as f32) / 1_073_741_824.0 - 1.0;
                *slot += value;
            }
        }

        normalize(&mut accum);
        accum
    }

    /// Embed a batch of texts
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new("hivemind/hash-embedder-v1", DEFAULT_DIMENSIONS)
    }
}

/// Cosine similarity between two vectors, in [-1, 1]
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Cosine distance (1 - similarity), matching the vector index's metric
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn normalize(v: &mut [f32]) {
    let magnitude = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in v.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_vector() {
        let embedder = Embedder::default();
        let a = embedder.embed("retry with exponential backoff");
        let b = embedder.embed("retry with exponential backoff");
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_different_vector() {
        let embedder = Embedder::default();
        let a = embedder.embed("retry with exponential backoff");
        let b = embedder.embed("completely unrelated content");
        assert_ne!(a, b);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let embedder = Embedder::default();
        let v = embedder.embed("some knowledge content");
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-3);
        assert_eq!(v.len(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn overlapping_tokens_raise_similarity() {
        let embedder = Embedder::default();
        let base = embedder.embed("configure the retry policy for the billing client");
        let near = embedder.embed("configure the retry policy for the payments client");
        let far = embedder.embed("unrelated zebra painting weather notes");

        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn cosine_similarity_bounds() {
        let a = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_exposes_pinned_fields() {
        let embedder = Embedder::default();
        let identity = embedder.identity();
        assert_eq!(identity.model_id, "hivemind/hash-embedder-v1");
        assert_eq!(identity.dimensions, 384);
        assert!(!identity.model_revision.is_empty());
    }
}
