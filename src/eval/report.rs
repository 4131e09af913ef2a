//! 평가 보고서 집계
//!
//! 질문별 [`EvaluationRecord`]에서 전체/분류별 비율, 최고/최악 답변을 계산합니다.
//! 보고서는 매 실행마다 레코드 전체로부터 새로 계산되며, 타임스탬프는
//! 저장 파일에만 붙습니다 (같은 입력이면 같은 보고서).

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use super::questions::QuestionCategory;
use crate::error::{ErrorBody, Result};
use crate::knowledge::RetrievalHit;

/// 최고/최악 답변 개수
pub const HIGHLIGHT_COUNT: usize = 5;

/// 보고서에 싣는 답변 길이 (문자 수)
const ANSWER_PREVIEW_CHARS: usize = 200;

const RULE: &str =
    "================================================================================";

// ============================================================================
// EvaluationRecord
// ============================================================================

/// 질문 하나의 평가 결과 (생성 후 불변)
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    /// 입력 질문 세트에서의 위치
    pub index: usize,
    pub question: String,
    pub category: QuestionCategory,
    pub answer: String,
    pub retrieved_hits: Vec<RetrievalHit>,
    pub hit_rate_pass: bool,
    pub faithfulness_pass: bool,
    pub hallucination_flag: bool,
    pub no_answer_flag: bool,
    /// 생성 실패 시 에러
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl EvaluationRecord {
    /// 세 가지 검사(적중, 충실, 환각 없음) 모두 통과
    pub fn passed_all(&self) -> bool {
        self.hit_rate_pass && self.faithfulness_pass && !self.hallucination_flag
    }

    fn composite(&self) -> (bool, bool, bool) {
        (
            self.hit_rate_pass,
            self.faithfulness_pass,
            !self.hallucination_flag,
        )
    }

    fn question_order(&self) -> (QuestionCategory, usize) {
        (self.category, self.index)
    }

    /// 실패 원인 진단 (모두 통과면 `None`)
    pub fn diagnosis(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(format!("Generation failed - {}", error.message));
        }
        if !self.hit_rate_pass {
            Some("Retrieval failed - chunks did not contain relevant information".to_string())
        } else if self.hallucination_flag {
            Some("Answer contains unsupported claims not found in source".to_string())
        } else if !self.faithfulness_pass {
            Some("Answer not properly grounded in retrieved chunks".to_string())
        } else {
            None
        }
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// 지표별 개수와 비율 (0.0 ~ 1.0)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRates {
    pub total: usize,
    pub retrieval_hits: usize,
    pub faithful: usize,
    pub hallucinated: usize,
    pub no_answer: usize,
    pub retrieval_hit_rate: f64,
    pub faithfulness_rate: f64,
    pub hallucination_rate: f64,
    pub no_answer_rate: f64,
}

impl MetricRates {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a EvaluationRecord>) -> Self {
        let (mut total, mut hits, mut faithful, mut hallucinated, mut no_answer) =
            (0usize, 0usize, 0usize, 0usize, 0usize);

        for record in records {
            total += 1;
            hits += usize::from(record.hit_rate_pass);
            faithful += usize::from(record.faithfulness_pass);
            hallucinated += usize::from(record.hallucination_flag);
            no_answer += usize::from(record.no_answer_flag);
        }

        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        Self {
            total,
            retrieval_hits: hits,
            faithful,
            hallucinated,
            no_answer,
            retrieval_hit_rate: rate(hits),
            faithfulness_rate: rate(faithful),
            hallucination_rate: rate(hallucinated),
            no_answer_rate: rate(no_answer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub category: QuestionCategory,
    pub rates: MetricRates,
}

/// 최고/최악 답변 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub index: usize,
    pub question: String,
    pub category: QuestionCategory,
    pub answer: String,
    pub retrieval_hit: bool,
    pub faithful: bool,
    pub hallucinated: bool,
    pub no_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl From<&EvaluationRecord> for RecordSummary {
    fn from(record: &EvaluationRecord) -> Self {
        Self {
            index: record.index,
            question: record.question.clone(),
            category: record.category,
            answer: record.answer.clone(),
            retrieval_hit: record.hit_rate_pass,
            faithful: record.faithfulness_pass,
            hallucinated: record.hallucination_flag,
            no_answer: record.no_answer_flag,
            issue: record.diagnosis(),
        }
    }
}

// ============================================================================
// AggregateReport
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_questions: usize,
    pub overall: MetricRates,
    /// 질문이 있는 분류만 (분류 순서)
    pub categories: Vec<CategoryBreakdown>,
    pub best: Vec<RecordSummary>,
    pub worst: Vec<RecordSummary>,
}

impl AggregateReport {
    pub fn from_records(records: &[EvaluationRecord]) -> Self {
        let categories = QuestionCategory::ALL
            .iter()
            .filter_map(|category| {
                let members: Vec<&EvaluationRecord> =
                    records.iter().filter(|r| r.category == *category).collect();
                if members.is_empty() {
                    return None;
                }
                Some(CategoryBreakdown {
                    category: *category,
                    rates: MetricRates::from_records(members),
                })
            })
            .collect();

        Self {
            total_questions: records.len(),
            overall: MetricRates::from_records(records),
            categories,
            best: select_best(records),
            worst: select_worst(records),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 사람이 읽는 텍스트 보고서
    pub fn to_text(&self) -> String {
        self.render(None)
    }

    pub(crate) fn render(&self, generated_at: Option<&str>) -> String {
        let mut out: Vec<String> = Vec::new();

        out.push(RULE.to_string());
        out.push("RAG SYSTEM EVALUATION REPORT".to_string());
        out.push(RULE.to_string());
        if let Some(timestamp) = generated_at {
            out.push(format!("Generated: {}", timestamp));
        }
        out.push(format!("Total Questions Tested: {}", self.total_questions));
        out.push(String::new());

        // Overall
        out.push(RULE.to_string());
        out.push("OVERALL METRICS".to_string());
        out.push(RULE.to_string());
        let o = &self.overall;
        out.push(format!("Retrieval Hit Rate:    {}", percent(o.retrieval_hit_rate)));
        out.push(format!(
            "  -> {}/{} questions had relevant chunks retrieved",
            o.retrieval_hits, o.total
        ));
        out.push(String::new());
        out.push(format!("Faithfulness Rate:     {}", percent(o.faithfulness_rate)));
        out.push(format!(
            "  -> {}/{} answers were grounded in retrieved text",
            o.faithful, o.total
        ));
        out.push(String::new());
        out.push(format!("Hallucination Rate:    {}", percent(o.hallucination_rate)));
        out.push(format!(
            "  -> {}/{} answers contained unsupported claims",
            o.hallucinated, o.total
        ));
        out.push(String::new());
        out.push(format!("No Answer Rate:        {}", percent(o.no_answer_rate)));
        out.push(format!(
            "  -> {}/{} questions could not be answered",
            o.no_answer, o.total
        ));
        out.push(String::new());

        // Categories
        out.push(RULE.to_string());
        out.push("CATEGORY BREAKDOWN".to_string());
        out.push(RULE.to_string());
        for breakdown in &self.categories {
            let r = &breakdown.rates;
            out.push(String::new());
            out.push(format!("{}:", breakdown.category.label()));
            out.push(format!("  Total Questions: {}", r.total));
            out.push(format!("  Hit Rate:        {}", percent(r.retrieval_hit_rate)));
            out.push(format!("  Faithfulness:    {}", percent(r.faithfulness_rate)));
            out.push(format!("  Hallucinations:  {}", percent(r.hallucination_rate)));
            out.push(format!("  No Answer:       {}", percent(r.no_answer_rate)));
        }
        out.push(String::new());

        render_highlights(&mut out, "TOP 5 BEST ANSWERS", &self.best);
        render_highlights(&mut out, "TOP 5 WORST ANSWERS", &self.worst);

        out.push(RULE.to_string());
        out.push("END OF REPORT".to_string());
        out.push(RULE.to_string());

        out.join("\n")
    }
}

fn render_highlights(out: &mut Vec<String>, title: &str, summaries: &[RecordSummary]) {
    out.push(RULE.to_string());
    out.push(title.to_string());
    out.push(RULE.to_string());

    if summaries.is_empty() {
        out.push("(none)".to_string());
    }

    for (i, s) in summaries.iter().enumerate() {
        out.push(String::new());
        out.push(format!("{}. Question: {}", i + 1, s.question));
        out.push(format!("   Category: {}", s.category.label()));
        out.push(format!("   Answer: {}", preview(&s.answer)));
        out.push(format!("   Retrieval Hit: {}", s.retrieval_hit));
        out.push(format!("   Faithful: {}", s.faithful));
        out.push(format!("   Hallucinated: {}", s.hallucinated));
        if let Some(issue) = &s.issue {
            out.push(format!("   Issue: {}", issue));
        }
    }
    out.push(String::new());
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn preview(answer: &str) -> String {
    if answer.chars().count() > ANSWER_PREVIEW_CHARS {
        let head: String = answer.chars().take(ANSWER_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        answer.to_string()
    }
}

// ============================================================================
// EvaluationRun
// ============================================================================

/// 평가 실행 결과 (질문 순서의 레코드 + 집계 보고서)
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub records: Vec<EvaluationRecord>,
    pub report: AggregateReport,
}

/// JSON 파일 형식 (타임스탬프 래퍼)
#[derive(Serialize)]
struct SavedRun<'a> {
    timestamp: String,
    report: &'a AggregateReport,
    records: &'a [EvaluationRecord],
}

impl EvaluationRun {
    pub fn new(records: Vec<EvaluationRecord>) -> Self {
        let report = AggregateReport::from_records(&records);
        Self { records, report }
    }

    /// 텍스트 보고서와 같은 이름의 `.json` 상세 결과 저장
    ///
    /// 저장된 (텍스트, JSON) 경로를 반환합니다.
    pub fn save(&self, output: &Path) -> Result<(PathBuf, PathBuf)> {
        let now = Local::now();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let text_path = output.to_path_buf();
        let generated = now.format("%Y-%m-%d %H:%M:%S").to_string();
        std::fs::write(&text_path, self.report.render(Some(&generated)))?;

        let json_path = output.with_extension("json");
        let saved = SavedRun {
            timestamp: now.to_rfc3339(),
            report: &self.report,
            records: &self.records,
        };
        let json = serde_json::to_string_pretty(&saved).map_err(std::io::Error::from)?;
        std::fs::write(&json_path, json)?;

        tracing::info!("Evaluation report saved to {:?} and {:?}", text_path, json_path);
        Ok((text_path, json_path))
    }
}

// ============================================================================
// Best / Worst Selection
// ============================================================================

/// 종합 점수 내림차순, 동률은 분류 순서 → 질문 순서
fn select_best(records: &[EvaluationRecord]) -> Vec<RecordSummary> {
    let mut ranked: Vec<&EvaluationRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.composite()
            .cmp(&a.composite())
            .then_with(|| a.question_order().cmp(&b.question_order()))
    });
    summarize(ranked)
}

/// 하나 이상 실패한 레코드만, 종합 점수 오름차순, 같은 동률 규칙
fn select_worst(records: &[EvaluationRecord]) -> Vec<RecordSummary> {
    let mut ranked: Vec<&EvaluationRecord> =
        records.iter().filter(|r| !r.passed_all()).collect();
    ranked.sort_by(|a, b| {
        a.composite()
            .cmp(&b.composite())
            .then_with(|| a.question_order().cmp(&b.question_order()))
    });
    summarize(ranked)
}

fn summarize(ranked: Vec<&EvaluationRecord>) -> Vec<RecordSummary> {
    ranked
        .into_iter()
        .take(HIGHLIGHT_COUNT)
        .map(RecordSummary::from)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
