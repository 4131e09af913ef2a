//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 길이 벡터로 변환하는 프로바이더 트레이트와 구현체입니다.
//! 동일한 입력에는 항상 동일한 벡터를 반환해야 합니다.
//!
//! - [`GeminiEmbedding`]: Gemini API (API 키 필요)
//! - [`HashingEmbedding`]: 로컬 해싱 임베딩 (오프라인, 테스트용)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&RagConfig::from_env()?)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hashing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{get_api_key, EmbedderKind, RagConfig};
use crate::error::{RagError, Result};

pub use gemini::GeminiEmbedding;
pub(crate) use gemini::GeminiError;
pub use hashing::HashingEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩 (문서 청크용)
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 질의 임베딩 (기본 구현: `embed`와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedder {
        EmbedderKind::Gemini => {
            let api_key = get_api_key().ok_or_else(|| {
                RagError::InvalidConfig(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set. \
                     Get your API key at: https://aistudio.google.com/app/apikey"
                        .to_string(),
                )
            })?;
            Arc::new(GeminiEmbedding::with_dimension(
                api_key,
                config.embedding_dimension,
            )?)
        }
        EmbedderKind::Hashing => Arc::new(HashingEmbedding::new(config.embedding_dimension)),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hashing_embedder() {
        let config = RagConfig {
            embedder: EmbedderKind::Hashing,
            embedding_dimension: 32,
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.name(), "hashing");
    }

    #[tokio::test]
    async fn test_default_batch_matches_single() {
        let embedder = HashingEmbedding::new(16);
        let texts = vec!["fuel reserve".to_string(), "alternate aerodrome".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("fuel reserve").await.unwrap());
        assert_eq!(batch[1], embedder.embed("alternate aerodrome").await.unwrap());
    }
}
