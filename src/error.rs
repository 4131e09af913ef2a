//! 에러 모듈 - 구조화된 에러 분류
//!
//! 모든 에러는 종류(kind)와 메시지를 가지며, 호출자에게 그대로 전달됩니다.
//! 코어는 어떤 에러도 자동으로 재시도하지 않습니다.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// 라이브러리 공통 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// RagError
// ============================================================================

#[derive(Debug, Error)]
pub enum RagError {
    /// 손상되었거나 읽을 수 없는 입력 파일
    #[error("Unreadable document '{name}': {reason}")]
    UnreadableDocument { name: String, reason: String },

    /// 추출 가능한 텍스트가 없는 문서
    #[error("No extractable text in document '{0}'")]
    EmptyDocument(String),

    /// 인덱싱된 문서가 없는 상태에서 질의
    #[error("No documents indexed. Ingest a document first.")]
    NoDocumentsIndexed,

    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Chunk catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 에러 종류 (직렬화용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableDocument,
    EmptyDocument,
    NoDocumentsIndexed,
    GenerationTimeout,
    Generation,
    Embedding,
    Index,
    Catalog,
    InvalidConfig,
    InvalidQuestion,
    Io,
}

/// 구조화된 에러 본문 (kind + message)
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::UnreadableDocument { .. } => ErrorKind::UnreadableDocument,
            RagError::EmptyDocument(_) => ErrorKind::EmptyDocument,
            RagError::NoDocumentsIndexed => ErrorKind::NoDocumentsIndexed,
            RagError::GenerationTimeout(_) => ErrorKind::GenerationTimeout,
            RagError::Generation(_) => ErrorKind::Generation,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Index(_) => ErrorKind::Index,
            RagError::Catalog(_) => ErrorKind::Catalog,
            RagError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            RagError::InvalidQuestion(_) => ErrorKind::InvalidQuestion,
            RagError::Io(_) => ErrorKind::Io,
        }
    }

    /// 생성 단계 에러 여부 (평가에서 질문 단위로 흡수되는 에러)
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            RagError::Generation(_) | RagError::GenerationTimeout(_)
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
