//! Gemini 임베딩 프로바이더
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 무료 티어 분당 요청 제한을 지키기 위해 호출 간 최소 간격과
//! 429 응답 시 지수 백오프를 적용합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: usize = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY: Duration = Duration::from_millis(1000);
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 검색 태스크 종류 (문서 / 질의)
#[derive(Debug, Clone, Copy)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::Document => "RETRIEVAL_DOCUMENT",
            TaskType::Query => "RETRIEVAL_QUERY",
        }
    }
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 + 최소 간격 Rate Limiter
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_DELAY {
                tokio::time::sleep(MIN_DELAY - elapsed).await;
            }
        }

        let now = Instant::now();
        self.requests
            .retain(|&t| now.duration_since(t) < RATE_LIMIT_WINDOW);

        if self.requests.len() >= RATE_LIMIT_RPM {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = RATE_LIMIT_WINDOW.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests
                    .retain(|&t| now.duration_since(t) < RATE_LIMIT_WINDOW);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiError {
    pub error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::InvalidConfig(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        })
    }

    async fn request(&self, text: &str, task: TaskType) -> anyhow::Result<Vec<f32>> {
        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: vec![EmbedPart { text }],
            },
            task_type: task.as_str(),
            output_dimensionality: self.dimension,
        };

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.lock().await.acquire().await;

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return Ok(parsed.embedding.values);
            }

            if status.as_u16() == 429 {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                    anyhow::bail!(
                        "Gemini API error ({}): {}",
                        error.error.status,
                        error.error.message
                    );
                }
                anyhow::bail!("Gemini API error ({}): {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }

    async fn embed_as(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        self.request(text, task)
            .await
            .map_err(|e| RagError::Embedding(format!("{e:#}")))
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_as(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_as(text, TaskType::Query).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// Tests
// ============================================================================
