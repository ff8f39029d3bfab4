use crate::{Config, model::Embedding};
use async_trait::async_trait;
use std::{fmt::Debug, path::Path};

pub mod clip_server;

pub use clip_server::ClipServerEmbedder;

/// A vision-language model that maps images and text into one vector space.
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    fn model_name(&self) -> &str;

    async fn embed_image(&self, path: &Path) -> anyhow::Result<Embedding>;

    async fn embed_text(&self, text: &str) -> anyhow::Result<Embedding>;

    /// One request per text, in order.
    async fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text).await?);
        }
        Ok(out)
    }
}

/// Construct the embedder described by `config`.
pub fn embedder_from_config(config: &Config) -> anyhow::Result<Box<dyn Embedder>> {
    let endpoint = config.embedder_endpoint().ok_or_else(|| {
        anyhow::anyhow!(
            "No embedding endpoint configured.\n\
                 Hint: run `weather-lens configure` and enter the CLIP server URL."
        )
    })?;

    Ok(Box::new(ClipServerEmbedder::new(endpoint.to_owned(), config.embedder.model.clone())))
}
