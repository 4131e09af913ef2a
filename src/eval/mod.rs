//! 평가 모듈 - 정답 라벨 없는 자동 품질 평가
//!
//! - questions: 평가 질문 세트 (기본 50문항 + JSON 로더)
//! - metrics: 검색 적중, 충실도, 환각, 무응답 지표 (순수 함수)
//! - engine: 질문별 검색 → 생성 → 지표 계산 (동시성 제한, 순서 보존)
//! - report: 전체/분류별 집계, 최고/최악 답변, 텍스트/JSON 보고서

mod engine;
mod metrics;
mod questions;
mod report;

// Re-exports
pub use engine::{run_evaluation, EvalConfig};
pub use metrics::{
    faithfulness_score, is_faithful, is_hallucination, is_no_answer, key_terms, retrieval_hit,
    retrieval_hit_fraction, unsupported_markers, AnswerScores, MetricConfig,
    DEFAULT_FALLBACK_PHRASES, UNCERTAINTY_MARKERS,
};
pub use questions::{
    builtin_questions, load_questions, parse_questions, EvaluationQuestion, QuestionCategory,
};
pub use report::{
    AggregateReport, CategoryBreakdown, EvaluationRecord, EvaluationRun, MetricRates,
    RecordSummary, HIGHLIGHT_COUNT,
};
