//! Text embedding for `ProceduralMemory` skill matching (step 5 of
//! `browse()`, §4.13). No embedding-model crate is part of this
//! workspace's dependency stack, so — same pattern as `ScriptSandbox` and
//! `BrowserDriver` — this is an injectable capability. `HashEmbedder` is a
//! deterministic fallback: it buckets term hashes into a fixed-width
//! vector, giving `ProceduralMemory`'s cosine search something stable to
//! compare against without a real model wired in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_produces_unit_vector_for_nonempty_text() {
        let embedder = HashEmbedder::new(32);
        let vector = embedder.embed("product page with price and reviews");
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn embed_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        assert_eq!(embedder.embed("same text"), embedder.embed("same text"));
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert_eq!(embedder.embed(""), vec![0.0; 16]);
    }
}
