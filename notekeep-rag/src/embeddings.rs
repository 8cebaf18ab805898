use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use notekeep_core::RagSettings;

use crate::errors::{RagError, RagResult};

/// A fixed-dimension embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    /// JSON array form used for persistence and sqlite-vec queries.
    pub fn to_json(&self) -> RagResult<String> {
        Ok(serde_json::to_string(&self.vector)?)
    }

    pub fn from_json(payload: &str) -> RagResult<Self> {
        Ok(Self::new(serde_json::from_str(payload)?))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vector: Vec<f32>) -> Self {
        Self::new(vector)
    }
}

/// Cosine similarity of two vectors of equal length.
///
/// A zero vector has no direction; its similarity to anything is 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> RagResult<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32)
}

/// A text embedding model behind a stable interface.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Output dimension, constant for the lifetime of the model configuration.
    fn dimension(&self) -> usize;

    /// Prepare the backend for use. Called from [`EmbeddingGenerator::initialize`].
    async fn warm_up(&self) -> RagResult<()> {
        Ok(())
    }

    /// Release backend resources. Called from [`EmbeddingGenerator::teardown`].
    async fn release(&self) -> RagResult<()> {
        Ok(())
    }

    async fn embed_batch(&self, inputs: &[String]) -> RagResult<Vec<Vec<f32>>>;
}

/// Shared handle to one embedding model with an explicit lifecycle.
///
/// Calls fail with [`RagError::EmbeddingUnavailable`] until
/// [`initialize`](Self::initialize) succeeds; there is no lazy init. Calls are
/// queued through a semaphore so at most `concurrency` requests reach the
/// model at once. Initialize and teardown never overlap.
pub struct EmbeddingGenerator {
    model: Arc<dyn EmbeddingModel>,
    ready: AtomicBool,
    gate: Semaphore,
    concurrency: usize,
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("model", &self.model.model_name())
            .field("dimension", &self.model.dimension())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<dyn EmbeddingModel>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            model,
            ready: AtomicBool::new(false),
            gate: Semaphore::new(concurrency),
            concurrency,
            lifecycle: Mutex::new(()),
        }
    }

    pub async fn initialize(&self) -> RagResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.model.warm_up().await?;
        self.ready.store(true, Ordering::SeqCst);
        info!(
            model = self.model.model_name(),
            dimension = self.model.dimension(),
            "embedding backend initialized"
        );
        Ok(())
    }

    pub async fn teardown(&self) -> RagResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.ready.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Wait for in-flight calls before releasing the model.
        let _permits = self
            .gate
            .acquire_many(self.concurrency as u32)
            .await
            .map_err(|_| RagError::EmbeddingUnavailable)?;
        self.model.release().await?;
        info!(model = self.model.model_name(), "embedding backend torn down");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn embed(&self, text: &str) -> RagResult<Embedding> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::Embedding("embedding response missing vectors".to_string())
        })
    }

    /// Embed several inputs in one model call, in input order.
    pub async fn embed_many(&self, inputs: &[String]) -> RagResult<Vec<Embedding>> {
        if !self.is_ready() {
            return Err(RagError::EmbeddingUnavailable);
        }
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| RagError::EmbeddingUnavailable)?;
        // Torn down while queued.
        if !self.is_ready() {
            return Err(RagError::EmbeddingUnavailable);
        }

        debug!(count = inputs.len(), "embedding inputs");
        let vectors = self.model.embed_batch(inputs).await?;
        if vectors.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                vectors.len()
            )));
        }

        let expected = self.model.dimension();
        vectors
            .into_iter()
            .map(|vector| {
                if vector.len() == expected {
                    Ok(Embedding::new(vector))
                } else {
                    Err(RagError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    })
                }
            })
            .collect()
    }
}

/// Embedding model served by an Ollama-compatible `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingModel {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaEmbeddingModel {
    pub fn new(settings: &RagSettings) -> Self {
        Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            dimension: settings.embedding_dim,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingModel for OllamaEmbeddingModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn warm_up(&self) -> RagResult<()> {
        let vectors = self.embed_batch(&["warm up".to_string()]).await?;
        match vectors.first() {
            Some(vector) if vector.len() == self.dimension => Ok(()),
            Some(vector) => Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            }),
            None => Err(RagError::Embedding(
                "embedding response missing vectors".to_string(),
            )),
        }
    }

    async fn embed_batch(&self, inputs: &[String]) -> RagResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(RagError::Embedding(
            "embedding response missing vectors".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}
