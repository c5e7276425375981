use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{EmbedError, EmbeddingModel, ModelLoader};

/// Lowercased alphanumeric tokens of `text`.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Signed feature hashing into `dim` buckets, L2-normalized.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    if dim == 0 {
        return v;
    }
    for token in tokens(text) {
        let digest = Sha256::digest(token.as_bytes());
        let idx = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % dim;
        let sign = if digest[4] % 2 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Deterministic lexical embedding baseline. Needs no model download, so it is
/// the default for offline runs and tests.
#[derive(Clone, Debug)]
pub struct HashingModel {
    dim: usize,
}

impl HashingModel {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingModel for HashingModel {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(hash_embed(text, self.dim))
    }
}

#[async_trait]
impl ModelLoader for HashingModel {
    async fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EmbedError> {
        if self.dim == 0 {
            return Err(EmbedError::Model("hashing model needs a non-zero dimension".into()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_embedding() {
        let a = hash_embed("hello world", 16);
        let b = hash_embed("hello world", 16);
        assert_eq!(a, b);
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(
            hash_embed("Top accounts?", 64),
            hash_embed("top ACCOUNTS", 64)
        );
    }

    #[test]
    fn output_is_unit_length() {
        let v = hash_embed("average expense ratio by asset class", 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        assert!(hash_embed("  ", 8).iter().all(|x| *x == 0.0));
    }
}
