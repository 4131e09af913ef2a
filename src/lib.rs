//! docqa-rag - PDF 문서 질의응답 RAG 엔진
//!
//! 페이지 단위로 추출한 문서를 토큰 윈도우로 청킹하고, 임베딩 벡터 검색으로
//! 찾은 청크만을 근거로 답변을 생성하며 출처(문서, 페이지)를 함께 돌려줍니다.
//! 정답 라벨 없이 검색 적중, 충실도, 환각, 무응답을 측정하는 자동 평가를 포함합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod qa;

// Re-exports
pub use config::{get_api_key, get_data_dir, has_api_key, CorpusMode, EmbedderKind, RagConfig};
pub use embedding::{EmbeddingProvider, GeminiEmbedding, HashingEmbedding};
pub use error::{ErrorBody, ErrorKind, RagError, Result};
pub use eval::{
    AggregateReport, EvalConfig, EvaluationQuestion, EvaluationRecord, EvaluationRun,
    MetricConfig, QuestionCategory,
};
pub use extractor::{DocumentExtractor, Extractor, Page};
pub use generation::{GeminiGenerator, Generator, FALLBACK_ANSWER};
pub use knowledge::{
    format_citations, Chunk, ChunkConfig, DistanceMetric, DocumentStore, FlatIndex,
    LanceVectorIndex, PageAttribution, PageChunker, RetrievalHit, StoreStats, VectorIndex,
};
pub use qa::{Answer, Health, IngestSummary, QaEngine};
