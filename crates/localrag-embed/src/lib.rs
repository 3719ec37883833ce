//! localrag-embed
//!
//! Embedding providers behind one enumerated [`EmbedProvider`], chosen once
//! from settings and used through the core `Embedder` contract.

pub mod device;
pub mod hashed;
pub mod model;
pub mod openai;
pub mod pool;
pub mod tokenize;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use localrag_core::config::EmbedSettings;
use localrag_core::traits::Embedder;
use localrag_core::Error;

pub use hashed::HashedEmbedder;
pub use model::BgeM3Embedder;
pub use openai::OpenAiEmbedder;
pub use pool::masked_mean_l2;

pub enum EmbedProvider {
    Local(BgeM3Embedder),
    OpenAi(OpenAiEmbedder),
    Hashed(HashedEmbedder),
}

/// `APP_USE_FAKE_EMBEDDINGS=1|true` swaps any configured provider for the hashed one.
pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl EmbedProvider {
    pub fn from_settings(settings: &EmbedSettings) -> Result<Self> { Self::build(settings, fake_embeddings_forced()) }

    pub fn build(settings: &EmbedSettings, force_hashed: bool) -> Result<Self> {
        if force_hashed {
            info!(dim = settings.dim, "using hashed embeddings");
            return Ok(Self::Hashed(HashedEmbedder::new(settings.dim)));
        }
        match settings.provider.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local(BgeM3Embedder::load(settings.model.as_deref())?)),
            "openai" => {
                let api_key = settings
                    .openai_api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| Error::InvalidConfig("openai provider needs embed.openai_api_key or OPENAI_API_KEY".into()))?;
                let model = settings.model.clone().unwrap_or_else(|| openai::DEFAULT_OPENAI_MODEL.to_string());
                let dim = openai::known_dim(&model).unwrap_or(settings.dim);
                info!(%model, dim, "using OpenAI embeddings");
                Ok(Self::OpenAi(OpenAiEmbedder::new(api_key, model, settings.openai_base_url.clone(), dim)))
            }
            "hashed" => Ok(Self::Hashed(HashedEmbedder::new(settings.dim))),
            other => Err(Error::InvalidConfig(format!("Unsupported embedding provider: {other}")).into()),
        }
    }

    fn inner(&self) -> &dyn Embedder {
        match self {
            Self::Local(e) => e,
            Self::OpenAi(e) => e,
            Self::Hashed(e) => e,
        }
    }
}

#[async_trait]
impl Embedder for EmbedProvider {
    fn provider(&self) -> &str { self.inner().provider() }

    fn dim(&self) -> usize { self.inner().dim() }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { self.inner().embed_texts(texts).await }
}
