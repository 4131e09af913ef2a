//! QA Engine - 수집, 질의응답, 상태, 평가
//!
//! 문서 저장소, 추출기, 생성기를 묶어 호출자에게 노출하는 진입점입니다.
//! 전역 상태 없이 명시적으로 생성해 넘겨 쓰므로 여러 코퍼스를 독립적으로 운용할 수 있습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let engine = QaEngine::open(RagConfig::from_env()?).await?;
//! engine.ingest("manual", Path::new("manual.pdf")).await?;
//! let answer = engine.ask("What is ICAO?", None, true).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{CorpusMode, RagConfig};
use crate::embedding::create_embedder;
use crate::error::{RagError, Result};
use crate::eval::{
    is_no_answer, run_evaluation, EvalConfig, EvaluationQuestion, EvaluationRun,
    DEFAULT_FALLBACK_PHRASES,
};
use crate::extractor::{DocumentExtractor, Extractor, Page};
use crate::generation::{create_generator, generate_with_timeout, Generator};
use crate::knowledge::{
    debug_hits, format_citations, ChunkCatalog, DebugHit, DocumentStore, LanceVectorIndex,
    PageChunker,
};

/// 미응답 질문 로그 타겟
pub const UNANSWERED_LOG_TARGET: &str = "docqa::unanswered";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub document_name: String,
    /// 이번에 추가된 청크 수
    pub chunks_added: usize,
    /// 수집 후 저장소 전체 청크 수
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: String,
    pub debug: Option<Vec<DebugHit>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub documents_indexed: bool,
    pub chunk_count: usize,
}

// ============================================================================
// QaEngine
// ============================================================================

pub struct QaEngine {
    store: DocumentStore,
    extractor: Arc<dyn Extractor>,
    generator: Option<Arc<dyn Generator>>,
    config: RagConfig,
}

impl QaEngine {
    /// 저장소로 엔진 생성 (생성기 없음, 기본 추출기)
    pub fn new(store: DocumentStore, config: RagConfig) -> Self {
        Self {
            store,
            extractor: Arc::new(DocumentExtractor::new()),
            generator: None,
            config,
        }
    }

    /// 데이터 디렉토리의 영속 저장소(SQLite + LanceDB)로 엔진 열기
    pub async fn open(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let embedder = create_embedder(&config)?;
        let index = LanceVectorIndex::open(
            &config.vectors_path(),
            embedder.dimension(),
            config.distance,
        )
        .await?;
        let catalog = ChunkCatalog::open(&config.catalog_path())?;
        let chunker = PageChunker::new(config.chunk_config())?;

        let store = DocumentStore::open(embedder, Arc::new(index), catalog, chunker).await?;
        let generator = create_generator(&config)?;

        let mut engine = Self::new(store, config);
        engine.generator = generator;
        Ok(engine)
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    fn generator(&self) -> Result<&dyn Generator> {
        self.generator.as_deref().ok_or_else(|| {
            RagError::InvalidConfig(
                "No answer generator configured. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY".into(),
            )
        })
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// 파일을 추출해 수집
    pub async fn ingest(&self, document_name: &str, path: &Path) -> Result<IngestSummary> {
        let pages = self.extractor.extract(path).await?;
        self.ingest_pages(document_name, &pages).await
    }

    /// 모드와 관계없이 현재 코퍼스에 파일 추가 (폴더 수집용)
    pub async fn add_document(&self, document_name: &str, path: &Path) -> Result<IngestSummary> {
        let pages = self.extractor.extract(path).await?;
        let chunks_added = self.store.add(document_name, &pages).await?;
        Ok(IngestSummary {
            document_name: document_name.to_string(),
            chunks_added,
            chunk_count: self.store.len(),
        })
    }

    /// 추출된 페이지 수집
    ///
    /// `Single` 모드는 기존 코퍼스를 이 문서로 교체하고, `Multi` 모드는 추가합니다.
    pub async fn ingest_pages(&self, document_name: &str, pages: &[Page]) -> Result<IngestSummary> {
        let chunks_added = match self.config.corpus_mode {
            CorpusMode::Single => self.store.replace(document_name, pages).await?,
            CorpusMode::Multi => self.store.add(document_name, pages).await?,
        };

        Ok(IngestSummary {
            document_name: document_name.to_string(),
            chunks_added,
            chunk_count: self.store.len(),
        })
    }

    // ========================================================================
    // Ask
    // ========================================================================

    /// 질문에 답변
    ///
    /// 생성 실패는 대체 답변으로 가리지 않고 에러로 반환합니다.
    pub async fn ask(&self, question: &str, top_k: Option<usize>, debug: bool) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuestion("Question cannot be empty".into()));
        }

        let hits = self
            .store
            .retrieve(question, top_k.unwrap_or(self.config.top_k))
            .await?;
        let context: Vec<String> = hits.iter().map(|h| h.chunk.text.clone()).collect();

        let answer = generate_with_timeout(
            self.generator()?,
            question,
            &context,
            self.config.generation_timeout(),
        )
        .await?;

        if is_no_answer(&answer, DEFAULT_FALLBACK_PHRASES) {
            tracing::info!(target: UNANSWERED_LOG_TARGET, question = %question, "Unanswered question");
        }

        Ok(Answer {
            answer,
            citations: format_citations(&hits),
            debug: debug.then(|| debug_hits(&hits)),
        })
    }

    // ========================================================================
    // Health / Clear
    // ========================================================================

    pub fn health(&self) -> Health {
        let chunk_count = self.store.len();
        Health {
            documents_indexed: chunk_count > 0,
            chunk_count,
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    // ========================================================================
    // Evaluate
    // ========================================================================

    /// 질문 세트 평가 (설정의 top_k, 동시성, 생성 제한 시간 사용)
    pub async fn evaluate(&self, questions: &[EvaluationQuestion]) -> Result<EvaluationRun> {
        self.evaluate_with(questions, &EvalConfig::from(&self.config))
            .await
    }

    pub async fn evaluate_with(
        &self,
        questions: &[EvaluationQuestion],
        eval_config: &EvalConfig,
    ) -> Result<EvaluationRun> {
        run_evaluation(&self.store, self.generator()?, questions, eval_config).await
    }
}

// ============================================================================
// Tests
// ============================================================================
