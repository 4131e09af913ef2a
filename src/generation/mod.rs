//! 답변 생성 모듈
//!
//! 질문과 검색된 청크 텍스트로 답변을 생성하는 [`Generator`] 트레이트와
//! Gemini API 구현체입니다.
//!
//! 생성기는 문맥에 답이 없으면 [`FALLBACK_ANSWER`]를 그대로 돌려주도록
//! 프롬프트로 지시받습니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{get_api_key, RagConfig};
use crate::embedding::GeminiError;
use crate::error::{RagError, Result};

/// Gemini 생성 API 엔드포인트
const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// 문맥에 정보가 없을 때의 답변
pub const FALLBACK_ANSWER: &str =
    "This information is not available in the provided document(s).";

/// 프롬프트에 넣는 문맥 최대 길이 (문자 수)
pub const MAX_CONTEXT_CHARS: usize = 2000;

/// 청크 텍스트 구분자
const CONTEXT_SEPARATOR: &str = "\n\n";

// ============================================================================
// Generator Trait
// ============================================================================

/// 답변 생성기 트레이트
///
/// 실패 시 `GenerationTimeout` 또는 `Generation` 에러를 반환합니다.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &[String]) -> Result<String>;

    fn name(&self) -> &str;
}

/// 제한 시간 안에 생성 (초과 시 `GenerationTimeout`)
pub async fn generate_with_timeout(
    generator: &dyn Generator,
    question: &str,
    context: &[String],
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, generator.generate(question, context)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Generation timed out after {:?}", timeout);
            Err(RagError::GenerationTimeout(timeout))
        }
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// 생성 프롬프트 구성
///
/// 문맥이 비어 있으면 `None` (모델을 호출하지 않고 대체 답변 사용)
pub fn build_prompt(question: &str, context: &[String]) -> Option<String> {
    let joined = context
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    if joined.is_empty() {
        return None;
    }

    let truncated: String = joined.chars().take(MAX_CONTEXT_CHARS).collect();

    Some(format!(
        "Using only the information provided below, answer the question.\n\
         If the information is not in the context, respond with: \"{FALLBACK_ANSWER}\"\n\
         \n\
         Context:\n\
         {truncated}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:"
    ))
}

// ============================================================================
// GeminiGenerator
// ============================================================================

#[derive(Debug)]
pub struct GeminiGenerator {
    api_key: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl GeminiGenerator {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RagError::Generation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            client,
            request_timeout,
        })
    }

    async fn request(&self, prompt: String) -> anyhow::Result<String> {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 512,
            },
        };

        let response = self
            .client
            .post(GEMINI_GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                anyhow::bail!(
                    "Gemini API error ({}): {}",
                    error.error.status,
                    error.error.message
                );
            }
            anyhow::bail!("Gemini API error ({}): {}", status, body);
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generation response")?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        if text.trim().is_empty() {
            tracing::warn!("Gemini returned an empty answer");
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, question: &str, context: &[String]) -> Result<String> {
        let Some(prompt) = build_prompt(question, context) else {
            return Ok(FALLBACK_ANSWER.to_string());
        };

        self.request(prompt).await.map_err(|e| {
            let timed_out = e
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|re| re.is_timeout());
            if timed_out {
                RagError::GenerationTimeout(self.request_timeout)
            } else {
                RagError::Generation(format!("{e:#}"))
            }
        })
    }

    fn name(&self) -> &str {
        "gemini-2.0-flash"
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 생성기 생성 (API 키 없으면 `None`)
pub fn create_generator(config: &RagConfig) -> Result<Option<Arc<dyn Generator>>> {
    let Some(api_key) = get_api_key() else {
        tracing::debug!("No API key found; answer generation disabled");
        return Ok(None);
    };

    let generator = GeminiGenerator::new(api_key, config.generation_timeout())?;
    tracing::info!("Using {} for answer generation", generator.name());
    Ok(Some(Arc::new(generator)))
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: GenerateContent,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_contains_question_and_context() {
        let prompt = build_prompt(
            "What is the fuel reserve?",
            &["Reserve fuel is 30 minutes.".to_string(), "Second chunk.".to_string()],
        )
        .unwrap();

        assert!(prompt.starts_with("Using only the information provided below"));
        assert!(prompt.contains(FALLBACK_ANSWER));
        assert!(prompt.contains("Reserve fuel is 30 minutes.\n\nSecond chunk."));
        assert!(prompt.contains("Question: What is the fuel reserve?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_build_prompt_truncates_context() {
        let context = vec!["a".repeat(MAX_CONTEXT_CHARS + 500)];
        let prompt = build_prompt("q", &context).unwrap();
        assert!(prompt.contains(&"a".repeat(MAX_CONTEXT_CHARS)));
        assert!(!prompt.contains(&"a".repeat(MAX_CONTEXT_CHARS + 1)));
    }

    #[test]
    fn test_build_prompt_empty_context() {
        assert!(build_prompt("q", &[]).is_none());
        assert!(build_prompt("q", &["  ".to_string()]).is_none());
    }

    #[tokio::test]
    async fn test_empty_context_returns_fallback_without_request() {
        let generator =
            GeminiGenerator::new("fake_key".to_string(), Duration::from_secs(1)).unwrap();
        let answer = generator.generate("anything", &[]).await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        async fn generate(&self, _question: &str, _context: &[String]) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("late".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_generate_with_timeout_expires() {
        let err = generate_with_timeout(
            &SlowGenerator,
            "q",
            &["ctx".to_string()],
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::GenerationTimeout(_)));
    }

    #[tokio::test]
    async fn test_generate_with_timeout_passes_result() {
        let answer = generate_with_timeout(
            &SlowGenerator,
            "q",
            &["ctx".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(answer, "late");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":" Thirty minutes. "}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, " Thirty minutes. ");
    }
}
