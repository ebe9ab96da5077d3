//! Embedding generation
//!
//! [`EmbeddingGenerator`] is the model seam: text in, fixed-length vector out. [`Embedder`] wraps
//! a generator with text preprocessing, the embedding cache and the zero-vector fallback, so
//! callers never see a generator failure.

use crate::cache::CacheManager;
use crate::error::{Error, Result};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest text (in chars) sent to a generator
pub const MAX_EMBEDDING_CHARS: usize = 512;

#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Model tag stored next to every embedding this generator produces
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the output is positionally aligned with `texts`
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Deterministic feature-hashing generator
///
/// Word tokens and character trigrams are hashed with SHA-256 into signed buckets and the result
/// is L2-normalized. Texts sharing vocabulary land close together; there is no semantics beyond
/// that.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self::with_model(format!("hashing-{dimension}-v1"), dimension)
    }

    pub fn with_model(model: impl Into<String>, dimension: usize) -> Self {
        Self { model: model.into(), dimension: dimension.max(1) }
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);

            let padded: Vec<char> = format!(" {token} ").chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), 0.5);
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingGenerator for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.hash_text(text)).collect())
    }
}

/// Collapse whitespace and cap the text at [`MAX_EMBEDDING_CHARS`]
///
/// Long texts are cut after the last sentence end in the kept prefix when that end falls in the
/// second half; otherwise at the char limit.
pub fn preprocess_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_EMBEDDING_CHARS {
        return collapsed;
    }

    let prefix: String = collapsed.chars().take(MAX_EMBEDDING_CHARS).collect();
    let sentence_end = prefix
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .next_back();

    match sentence_end {
        Some(end) if prefix[..end].chars().count() > MAX_EMBEDDING_CHARS / 2 => prefix[..end].to_string(),
        _ => prefix,
    }
}

/// A generator behind the embedding cache, with failures mapped to zero vectors
pub struct Embedder {
    generator: Arc<dyn EmbeddingGenerator>,
    caches: Arc<CacheManager>,
}

impl Embedder {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, caches: Arc<CacheManager>) -> Self {
        Self { generator, caches }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.generator.dimension()
    }

    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimension()]
    }

    /// Embed one text; returns the zero vector for empty text or when the generator fails
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.embed_checked(text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(model = self.model_name(), error = %e, "Embedding failed; using zero vector");
                self.zero_vector()
            }
        }
    }

    /// Embed several texts, falling back to the zero vector per failed item
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        self.embed_batch_checked(texts)
            .await
            .into_iter()
            .map(|embedding| embedding.unwrap_or_else(|| self.zero_vector()))
            .collect()
    }

    /// Embed several texts; `None` marks an item the generator could not embed
    ///
    /// Cached texts are served from the cache and only misses reach the generator, in one batch.
    pub async fn embed_batch_checked(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let model = self.model_name().to_string();
        let processed: Vec<String> = texts.iter().map(|text| preprocess_text(text)).collect();
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in processed.iter().enumerate() {
            if text.is_empty() {
                out[i] = Some(self.zero_vector());
                continue;
            }
            match self.caches.embeddings.get(&model, text).await {
                Some(cached) if cached.len() == self.dimension() => out[i] = Some(cached),
                _ => misses.push(i),
            }
        }

        if misses.is_empty() {
            return out;
        }

        let batch: Vec<String> = misses.iter().map(|&i| processed[i].clone()).collect();
        debug!(model = %model, requested = texts.len(), uncached = batch.len(), "Embedding batch");

        let generated = match self.generator.embed_batch(&batch).await {
            Ok(generated) if generated.len() == batch.len() => generated,
            Ok(generated) => {
                warn!(expected = batch.len(), got = generated.len(), "Embedding batch returned wrong number of vectors");
                return out;
            }
            Err(e) => {
                warn!(model = %model, error = %e, "Embedding batch failed");
                return out;
            }
        };

        for (i, embedding) in misses.into_iter().zip(generated) {
            match self.validate(embedding) {
                Ok(embedding) => {
                    self.caches.embeddings.set(&model, &processed[i], &embedding).await;
                    out[i] = Some(embedding);
                }
                Err(e) => warn!(error = %e, "Discarding invalid embedding"),
            }
        }

        out
    }

    async fn embed_checked(&self, text: &str) -> Result<Vec<f32>> {
        let text = preprocess_text(text);
        if text.is_empty() {
            return Ok(self.zero_vector());
        }

        let model = self.model_name();
        if let Some(cached) = self.caches.embeddings.get(model, &text).await
            && cached.len() == self.dimension()
        {
            return Ok(cached);
        }

        let embedding = self.validate(self.generator.embed(&text).await?)?;
        self.caches.embeddings.set(model, &text, &embedding).await;
        Ok(embedding)
    }

    fn validate(&self, embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() != self.dimension() {
            return Err(Error::embedding(format!(
                "expected {} dimensions, got {}",
                self.dimension(),
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(Error::embedding("embedding contains non-finite values"));
        }
        Ok(embedding)
    }
}
