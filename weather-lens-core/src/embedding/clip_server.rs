use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::model::Embedding;

use super::Embedder;

/// Client for a CLIP inference server exposing
/// `POST /v1/embeddings/image` and `POST /v1/embeddings/text`.
#[derive(Debug, Clone)]
pub struct ClipServerEmbedder {
    endpoint: String,
    model: String,
    http: Client,
}

impl ClipServerEmbedder {
    pub fn new(endpoint: String, model: String) -> Self {
        Self { endpoint, model, http: Client::new() }
    }

    fn url(&self, kind: &str) -> String {
        format!("{}/v1/embeddings/{kind}", self.endpoint.trim_end_matches('/'))
    }

    async fn post<B: Serialize + Sync>(&self, kind: &str, body: &B) -> Result<Embedding> {
        let url = self.url(kind);

        let res = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {kind} embedding request to {url}"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read {kind} embedding response body"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "CLIP server {} embedding request failed with status {}: {}",
                kind,
                status,
                truncate_body(&body),
            ));
        }

        parse_embedding(&body).with_context(|| format!("Invalid {kind} embedding response"))
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    /// Base64 of the raw file bytes; decoding happens server-side.
    image: String,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for ClipServerEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_image(&self, path: &Path) -> Result<Embedding> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "embedding image");

        let image = general_purpose::STANDARD.encode(bytes);
        self.post("image", &ImageRequest { model: &self.model, image }).await
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.post("text", &TextRequest { model: &self.model, text }).await
    }
}

fn parse_embedding(body: &str) -> Result<Embedding> {
    let parsed: EmbeddingResponse =
        serde_json::from_str(body).context("Failed to parse embedding JSON")?;

    if parsed.embedding.is_empty() {
        return Err(anyhow!("CLIP server returned an empty embedding"));
    }

    Ok(parsed.embedding)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
