//! 설정 모듈
//!
//! 환경변수(`DOCQA_*`)에서 읽어오는 런타임 설정과 데이터 디렉토리,
//! API 키 조회를 담당합니다.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, DistanceMetric, PageAttribution};

/// 기본 검색 결과 수 (top_k)
pub const DEFAULT_TOP_K: usize = 3;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.docqa-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Enums
// ============================================================================

/// 코퍼스 운영 방식
///
/// - `Single`: 수집할 때마다 저장소를 비우고 새로 구축 (한 번에 하나의 코퍼스)
/// - `Multi`: 기존 코퍼스에 계속 추가
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusMode {
    Single,
    Multi,
}

impl FromStr for CorpusMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(CorpusMode::Single),
            "multi" => Ok(CorpusMode::Multi),
            other => Err(RagError::InvalidConfig(format!(
                "Unknown corpus mode: {other} (expected single|multi)"
            ))),
        }
    }
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Gemini API (API 키 필요)
    Gemini,
    /// 로컬 해싱 임베딩 (오프라인, 결정적)
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(EmbedderKind::Gemini),
            "hashing" | "local" => Ok(EmbedderKind::Hashing),
            other => Err(RagError::InvalidConfig(format!(
                "Unknown embedder: {other} (expected gemini|hashing)"
            ))),
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// 카탈로그와 벡터 인덱스가 저장되는 디렉토리
    pub data_dir: PathBuf,
    /// 청크 크기 (토큰 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (토큰 수)
    pub chunk_overlap: usize,
    pub page_attribution: PageAttribution,
    pub top_k: usize,
    pub corpus_mode: CorpusMode,
    pub embedder: EmbedderKind,
    pub embedding_dimension: usize,
    pub distance: DistanceMetric,
    /// 생성 호출 제한 시간 (초)
    pub generation_timeout_secs: u64,
    /// 평가 시 동시에 처리할 질문 수
    pub eval_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk_size: 200,
            chunk_overlap: 50,
            page_attribution: PageAttribution::FirstToken,
            top_k: DEFAULT_TOP_K,
            corpus_mode: CorpusMode::Single,
            embedder: EmbedderKind::Gemini,
            embedding_dimension: 768,
            distance: DistanceMetric::L2,
            generation_timeout_secs: 60,
            eval_concurrency: 4,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드 (없는 값은 기본값)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DOCQA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_parse("DOCQA_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = env_parse("DOCQA_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }
        if let Some(v) = env_parse("DOCQA_TOP_K")? {
            config.top_k = v;
        }
        if let Ok(v) = std::env::var("DOCQA_CORPUS_MODE") {
            config.corpus_mode = v.parse()?;
        }
        if let Ok(v) = std::env::var("DOCQA_PAGE_ATTRIBUTION") {
            config.page_attribution = v.parse()?;
        }
        if let Ok(v) = std::env::var("DOCQA_EMBEDDER") {
            config.embedder = v.parse()?;
        }
        if let Some(v) = env_parse("DOCQA_EMBEDDING_DIM")? {
            config.embedding_dimension = v;
        }
        if let Ok(v) = std::env::var("DOCQA_DISTANCE") {
            config.distance = v.parse()?;
        }
        if let Some(v) = env_parse("DOCQA_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout_secs = v;
        }
        if let Some(v) = env_parse("DOCQA_EVAL_CONCURRENCY")? {
            config.eval_concurrency = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_config().validate()?;
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be at least 1".into()));
        }
        if self.eval_concurrency == 0 {
            return Err(RagError::InvalidConfig(
                "eval_concurrency must be at least 1".into(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding_dimension must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
            attribution: self.page_attribution,
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("chunks.db")
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }
}

/// 숫자형 환경변수 파싱 (없으면 None)
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RagError::InvalidConfig(format!("{key} has invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Option<String> {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.is_empty())
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_some()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.corpus_mode, CorpusMode::Single);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let config = RagConfig {
            chunk_size: 50,
            chunk_overlap: 50,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = RagConfig {
            eval_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("multi".parse::<CorpusMode>().unwrap(), CorpusMode::Multi);
        assert_eq!(" Single ".parse::<CorpusMode>().unwrap(), CorpusMode::Single);
        assert!("both".parse::<CorpusMode>().is_err());

        assert_eq!("local".parse::<EmbedderKind>().unwrap(), EmbedderKind::Hashing);
        assert!("openai".parse::<EmbedderKind>().is_err());
    }

    #[test]
    fn test_data_paths() {
        let config = RagConfig {
            data_dir: PathBuf::from("/tmp/docqa"),
            ..Default::default()
        };
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/docqa/chunks.db"));
        assert_eq!(config.vectors_path(), PathBuf::from("/tmp/docqa/vectors.lance"));
    }
}
