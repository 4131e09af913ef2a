//! Evaluation Engine
//!
//! 질문마다 검색 → 생성 → 지표 계산을 독립적으로 수행합니다.
//! 질문들은 `concurrency` 개까지 동시에 처리되지만 결과 순서는 입력 순서를 따릅니다.
//!
//! 실패 처리:
//! - 생성 실패/시간 초과: 해당 질문만 실패 레코드로 기록하고 계속 진행
//! - 검색 실패 (예: 빈 인덱스): 실행 전체 실패

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};

use super::metrics::{AnswerScores, MetricConfig};
use super::questions::EvaluationQuestion;
use super::report::{EvaluationRecord, EvaluationRun};
use crate::config::{RagConfig, DEFAULT_TOP_K};
use crate::error::{RagError, Result};
use crate::generation::{generate_with_timeout, Generator};
use crate::knowledge::DocumentStore;

// ============================================================================
// EvalConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// 질문당 검색 수 (운영 기본값과 동일)
    pub top_k: usize,
    /// 동시에 처리할 질문 수 (1이면 순차)
    pub concurrency: usize,
    pub generation_timeout: Duration,
    pub metrics: MetricConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            concurrency: 1,
            generation_timeout: Duration::from_secs(60),
            metrics: MetricConfig::default(),
        }
    }
}

impl From<&RagConfig> for EvalConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            concurrency: config.eval_concurrency,
            generation_timeout: config.generation_timeout(),
            metrics: MetricConfig::default(),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// 질문 세트 전체 평가
pub async fn run_evaluation(
    store: &DocumentStore,
    generator: &dyn Generator,
    questions: &[EvaluationQuestion],
    config: &EvalConfig,
) -> Result<EvaluationRun> {
    if store.is_empty() {
        return Err(RagError::NoDocumentsIndexed);
    }

    let total = questions.len();
    tracing::info!(
        "Starting evaluation: {} questions, top_k={}, concurrency={}",
        total,
        config.top_k,
        config.concurrency
    );

    let records: Vec<EvaluationRecord> = stream::iter(questions.iter().enumerate())
        .map(|(index, question)| evaluate_question(store, generator, index, question, config))
        .buffered(config.concurrency.max(1))
        .inspect_ok(|record| {
            tracing::info!(
                "[{}/{}] {} hit={} faithful={} hallucinated={}",
                record.index + 1,
                total,
                if record.passed_all() { "PASS" } else { "FAIL" },
                record.hit_rate_pass,
                record.faithfulness_pass,
                record.hallucination_flag
            );
        })
        .try_collect()
        .await?;

    let run = EvaluationRun::new(records);
    tracing::info!(
        "Evaluation complete: hit={:.2} faithful={:.2} hallucination={:.2} no_answer={:.2}",
        run.report.overall.retrieval_hit_rate,
        run.report.overall.faithfulness_rate,
        run.report.overall.hallucination_rate,
        run.report.overall.no_answer_rate
    );
    Ok(run)
}

/// 질문 하나 평가
///
/// 검색 에러는 전파하고, 생성 에러는 레코드로 흡수합니다.
/// 생성기가 생성 단계가 아닌 에러를 돌려주면 실행 전체를 중단합니다.
async fn evaluate_question(
    store: &DocumentStore,
    generator: &dyn Generator,
    index: usize,
    question: &EvaluationQuestion,
    config: &EvalConfig,
) -> Result<EvaluationRecord> {
    let hits = store.retrieve(&question.text, config.top_k).await?;
    let context: Vec<String> = hits.iter().map(|h| h.chunk.text.clone()).collect();

    let (answer, scores, error) = match generate_with_timeout(
        generator,
        &question.text,
        &context,
        config.generation_timeout,
    )
    .await
    {
        Ok(answer) => {
            let scores = config.metrics.score(&answer, &context);
            (answer, scores, None)
        }
        Err(e) if e.is_generation_failure() => {
            tracing::warn!("Question #{} generation failed: {}", index + 1, e);
            (String::new(), AnswerScores::default(), Some(e.to_body()))
        }
        Err(e) => return Err(e),
    };

    Ok(EvaluationRecord {
        index,
        question: question.text.clone(),
        category: question.category,
        answer,
        retrieved_hits: hits,
        hit_rate_pass: scores.hit_rate_pass,
        faithfulness_pass: scores.faithfulness_pass,
        hallucination_flag: scores.hallucination_flag,
        no_answer_flag: scores.no_answer_flag,
        error,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::embedding::HashingEmbedding;
    use crate::eval::QuestionCategory;
    use crate::extractor::Page;
    use crate::knowledge::{ChunkConfig, DistanceMetric, FlatIndex, PageChunker};

    const PAGE: &str =
        "Flight planning requires fuel reserve calculations and alternate aerodrome selection.";

    async fn create_test_store() -> DocumentStore {
        let store = DocumentStore::new(
            Arc::new(HashingEmbedding::new(64)),
            Arc::new(FlatIndex::new(DistanceMetric::L2)),
            PageChunker::new(ChunkConfig::default()).unwrap(),
        );
        store.add("manual", &[Page::new(1, PAGE)]).await.unwrap();
        store
    }

    /// 문맥을 그대로 되돌려 주는 생성기. 질문에 "fail"이 있으면 생성 실패,
    /// "misconfigured"가 있으면 설정 에러
    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, question: &str, context: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if question.contains("fail") {
                return Err(RagError::Generation("model overloaded".into()));
            }
            if question.contains("misconfigured") {
                return Err(RagError::InvalidConfig("unknown model".into()));
            }
            // 뒤쪽 질문이 먼저 끝나도 순서가 유지되는지 확인
            if question.contains("first") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(context.join(" "))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn questions(texts: &[&str]) -> Vec<EvaluationQuestion> {
        texts
            .iter()
            .map(|t| EvaluationQuestion::new(*t, QuestionCategory::Applied))
            .collect()
    }

    #[tokio::test]
    async fn test_records_follow_input_order() {
        let store = create_test_store().await;
        let generator = EchoGenerator {
            calls: AtomicUsize::new(0),
        };
        let config = EvalConfig {
            concurrency: 4,
            ..Default::default()
        };

        let run = run_evaluation(
            &store,
            &generator,
            &questions(&["first question", "second", "third"]),
            &config,
        )
        .await
        .unwrap();

        let order: Vec<usize> = run.records.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(run.records[0].question, "first question");
        assert!(run.records.iter().all(|r| r.passed_all()));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_is_recorded() {
        let store = create_test_store().await;
        let generator = EchoGenerator {
            calls: AtomicUsize::new(0),
        };

        let run = run_evaluation(
            &store,
            &generator,
            &questions(&["please fail", "works"]),
            &EvalConfig::default(),
        )
        .await
        .unwrap();

        let failed = &run.records[0];
        assert_eq!(failed.answer, "");
        assert!(!failed.hit_rate_pass && !failed.faithfulness_pass);
        assert!(!failed.hallucination_flag && !failed.no_answer_flag);
        assert_eq!(
            failed.error.as_ref().map(|e| e.kind),
            Some(crate::error::ErrorKind::Generation)
        );
        assert_eq!(failed.retrieved_hits.len(), 1);

        assert!(run.records[1].error.is_none());
        assert_eq!(run.report.total_questions, 2);
    }

    #[tokio::test]
    async fn test_empty_store_fails_run() {
        let store = DocumentStore::new(
            Arc::new(HashingEmbedding::new(16)),
            Arc::new(FlatIndex::new(DistanceMetric::L2)),
            PageChunker::new(ChunkConfig::default()).unwrap(),
        );
        let generator = EchoGenerator {
            calls: AtomicUsize::new(0),
        };

        let err = run_evaluation(&store, &generator, &questions(&["q"]), &EvalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocumentsIndexed));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_generation_error_aborts_run() {
        let store = create_test_store().await;
        let generator = EchoGenerator {
            calls: AtomicUsize::new(0),
        };

        let err = run_evaluation(
            &store,
            &generator,
            &questions(&["works", "misconfigured model"]),
            &EvalConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }
}
