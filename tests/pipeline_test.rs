//! 수집 → 검색 → 생성 → 평가 전체 흐름 테스트
//!
//! 외부 API 없이 해싱 임베딩, 메모리 인덱스, 고정 답변 생성기로 실행합니다.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa_rag::eval::QuestionCategory;
use docqa_rag::{
    CorpusMode, DistanceMetric, DocumentStore, EvalConfig, EvaluationQuestion, FlatIndex,
    Generator, HashingEmbedding, Page, PageChunker, QaEngine, RagConfig, RagError, Result,
    FALLBACK_ANSWER,
};

const MANUAL_PAGE: &str =
    "Flight planning requires fuel reserve calculations and alternate aerodrome selection.";

/// 질문 텍스트별로 정해진 답을 돌려주는 생성기
struct ScriptedGenerator {
    answers: HashMap<String, String>,
}

impl ScriptedGenerator {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            answers: pairs
                .iter()
                .map(|(q, a)| (q.to_string(), a.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, question: &str, context: &[String]) -> Result<String> {
        if context.is_empty() {
            return Ok(FALLBACK_ANSWER.to_string());
        }
        Ok(self
            .answers
            .get(question)
            .cloned()
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn create_engine(mode: CorpusMode, generator: ScriptedGenerator) -> QaEngine {
    let config = RagConfig {
        corpus_mode: mode,
        ..Default::default()
    };
    let store = DocumentStore::new(
        Arc::new(HashingEmbedding::new(128)),
        Arc::new(FlatIndex::new(DistanceMetric::L2)),
        PageChunker::new(config.chunk_config()).unwrap(),
    );
    QaEngine::new(store, config).with_generator(Arc::new(generator))
}

fn scripted_questions() -> (Vec<EvaluationQuestion>, ScriptedGenerator) {
    let questions = vec![
        EvaluationQuestion::new("What does flight planning require?", QuestionCategory::SimpleFactual),
        EvaluationQuestion::new("How is crew rest scheduled?", QuestionCategory::Applied),
        EvaluationQuestion::new("Why do pilots choose routes?", QuestionCategory::HigherOrder),
    ];
    let generator = ScriptedGenerator::new(&[
        (
            "What does flight planning require?",
            "Flight planning requires fuel reserve calculations.",
        ),
        ("How is crew rest scheduled?", FALLBACK_ANSWER),
        (
            "Why do pilots choose routes?",
            "Pilots probably prefer direct routes.",
        ),
    ]);
    (questions, generator)
}

#[tokio::test]
async fn test_ask_before_ingest_fails() {
    let (_, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);

    let err = engine.ask("What is ICAO?", None, false).await.unwrap_err();
    assert!(matches!(err, RagError::NoDocumentsIndexed));
    assert_eq!(err.to_body().kind, docqa_rag::ErrorKind::NoDocumentsIndexed);
}

#[tokio::test]
async fn test_empty_document_is_rejected() {
    let (_, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);

    let err = engine
        .ingest_pages("blank", &[Page::new(1, "   "), Page::new(2, "")])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument(_)));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, "").unwrap();
    let err = engine.ingest("empty", &path).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument(_)));
    assert!(!engine.health().documents_indexed);
}

#[tokio::test]
async fn test_textless_pdf_is_rejected() {
    let (_, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);
    engine
        .ingest_pages("manual", &[Page::new(1, MANUAL_PAGE)])
        .await
        .unwrap();

    // 내용 스트림이 빈 한 페이지짜리 PDF (스캔본과 같은 상황)
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/blank.pdf");
    let err = engine.ingest("blank", &fixture).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyDocument(ref name) if name == "blank"));
    assert_eq!(err.to_body().kind, docqa_rag::ErrorKind::EmptyDocument);

    // 기존 코퍼스는 유지
    assert_eq!(engine.store().document_names(), vec!["manual"]);
}

#[tokio::test]
async fn test_single_chunk_is_always_rank_one() {
    let (_, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);
    engine
        .ingest_pages("manual", &[Page::new(4, MANUAL_PAGE)])
        .await
        .unwrap();

    for top_k in [1, 3, 50] {
        let answer = engine
            .ask("What does flight planning require?", Some(top_k), true)
            .await
            .unwrap();
        let hits = answer.debug.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].page, 4);
        assert_eq!(answer.citations, "manual (page 4)");
        assert_eq!(answer.answer, "Flight planning requires fuel reserve calculations.");
    }
}

#[tokio::test]
async fn test_long_page_windows() {
    let (_, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);
    let text: Vec<String> = (0..500).map(|i| format!("w{i}")).collect();

    let summary = engine
        .ingest_pages("long", &[Page::new(1, text.join(" "))])
        .await
        .unwrap();
    assert_eq!(summary.chunks_added, 4);

    let chunks = engine.store().chunks();
    let token_counts: Vec<usize> = chunks.iter().map(|c| c.token_count).collect();
    assert_eq!(token_counts, vec![200, 200, 200, 50]);

    // 윈도우 시작: 0, 150, 300, 450
    let first_tokens: Vec<&str> = chunks
        .iter()
        .map(|c| c.text.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(first_tokens, vec!["w0", "w150", "w300", "w450"]);
}

#[tokio::test]
async fn test_evaluation_report() {
    let (questions, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);
    engine
        .ingest_pages("manual", &[Page::new(1, MANUAL_PAGE)])
        .await
        .unwrap();

    let config = EvalConfig {
        concurrency: 2,
        ..Default::default()
    };
    let run = engine.evaluate_with(&questions, &config).await.unwrap();

    let flags: Vec<(bool, bool, bool, bool)> = run
        .records
        .iter()
        .map(|r| {
            (
                r.hit_rate_pass,
                r.faithfulness_pass,
                r.hallucination_flag,
                r.no_answer_flag,
            )
        })
        .collect();
    assert_eq!(
        flags,
        vec![
            (true, true, false, false),
            (false, false, true, true),
            (false, false, true, false),
        ]
    );

    let overall = &run.report.overall;
    assert_eq!(overall.total, 3);
    assert_eq!(overall.retrieval_hits, 1);
    assert_eq!(overall.faithful, 1);
    assert_eq!(overall.hallucinated, 2);
    assert_eq!(overall.no_answer, 1);
    assert!((overall.hallucination_rate - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(run.report.categories.len(), 3);
    assert!(run.report.categories.iter().all(|c| c.rates.total == 1));

    let best: Vec<usize> = run.report.best.iter().map(|s| s.index).collect();
    let worst: Vec<usize> = run.report.worst.iter().map(|s| s.index).collect();
    assert_eq!(best, vec![0, 1, 2]);
    assert_eq!(worst, vec![1, 2]);
}

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let (questions, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Multi, generator);
    engine
        .ingest_pages("manual", &[Page::new(1, MANUAL_PAGE)])
        .await
        .unwrap();
    engine
        .ingest_pages("ops", &[Page::new(1, "Crew rest periods follow duty time limits.")])
        .await
        .unwrap();

    let first = engine.evaluate(&questions).await.unwrap();
    let second = engine.evaluate(&questions).await.unwrap();

    assert_eq!(first.report, second.report);
    assert_eq!(
        first.report.to_json().unwrap(),
        second.report.to_json().unwrap()
    );
    assert_eq!(first.report.to_text(), second.report.to_text());
}

#[tokio::test]
async fn test_saved_report_files() {
    let (questions, generator) = scripted_questions();
    let engine = create_engine(CorpusMode::Single, generator);
    engine
        .ingest_pages("manual", &[Page::new(1, MANUAL_PAGE)])
        .await
        .unwrap();
    let run = engine.evaluate(&questions).await.unwrap();

    let dir = TempDir::new().unwrap();
    let (text_path, json_path) = run.save(&dir.path().join("out/report.txt")).unwrap();

    let text = std::fs::read_to_string(text_path).unwrap();
    assert!(text.contains("Generated:"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
    assert!(json["timestamp"].is_string());
    assert_eq!(json["records"].as_array().unwrap().len(), 3);
    assert_eq!(json["report"]["total_questions"], 3);
}
