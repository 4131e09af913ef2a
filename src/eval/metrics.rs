//! 평가 지표 - 문자열에 대한 순수 함수
//!
//! 정답 라벨 없이 (답변, 검색된 텍스트)만으로 품질을 추정합니다.
//!
//! - 검색 적중: 답변 핵심어가 검색 텍스트에 등장하는 비율 ≥ 0.20
//! - 충실도: 근거 있는 문장 비율 ≥ 0.60 (문장 단어의 ≥ 0.30이 검색 텍스트에 존재)
//! - 환각: 충실하지 않거나, 검색 텍스트에 없는 불확실성 표현 사용
//! - 무응답: 대체 답변 문구 포함

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// 핵심어에서 제외되는 불용어 (4글자 이상만 의미 있음)
const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "been", "before", "being", "below", "between",
    "both", "does", "doing", "down", "during", "each", "from", "further", "have", "having",
    "here", "into", "just", "more", "most", "once", "only", "other", "over", "same", "should",
    "some", "such", "than", "that", "their", "theirs", "them", "then", "there", "these", "they",
    "this", "those", "through", "under", "until", "very", "were", "what", "when", "where",
    "which", "while", "whom", "will", "with", "would", "your", "yours",
];

/// 근거 없는 추측을 나타내는 표현
pub const UNCERTAINTY_MARKERS: &[&str] = &[
    "i think",
    "probably",
    "might be",
    "could be",
    "in general",
    "typically",
    "usually",
    "often",
    "most likely",
    "it seems",
];

/// 기본 대체 답변 문구
pub const DEFAULT_FALLBACK_PHRASES: &[&str] = &[
    "not available",
    "cannot find",
    "can't find",
    "no information",
];

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// 검색 적중 통과 기준 (핵심어 비율)
    pub hit_rate_threshold: f64,
    /// 문장 근거 기준 (단어 비율)
    pub sentence_grounding_threshold: f64,
    /// 충실도 통과 기준 (근거 있는 문장 비율)
    pub faithfulness_threshold: f64,
    /// 무응답으로 인식할 문구 (소문자 비교)
    pub fallback_phrases: Vec<String>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            hit_rate_threshold: 0.20,
            sentence_grounding_threshold: 0.30,
            faithfulness_threshold: 0.60,
            fallback_phrases: DEFAULT_FALLBACK_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// 질문 하나의 지표 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AnswerScores {
    pub hit_rate_pass: bool,
    pub faithfulness_pass: bool,
    pub hallucination_flag: bool,
    pub no_answer_flag: bool,
}

impl MetricConfig {
    /// 네 가지 지표를 한 번에 계산
    pub fn score<S: AsRef<str>>(&self, answer: &str, retrieved: &[S]) -> AnswerScores {
        let faithfulness_pass = is_faithful(
            answer,
            retrieved,
            self.sentence_grounding_threshold,
            self.faithfulness_threshold,
        );

        AnswerScores {
            hit_rate_pass: retrieval_hit(answer, retrieved, self.hit_rate_threshold),
            faithfulness_pass,
            hallucination_flag: is_hallucination(answer, retrieved, faithfulness_pass),
            no_answer_flag: is_no_answer(answer, &self.fallback_phrases),
        }
    }
}

// ============================================================================
// Tokenization
// ============================================================================

/// 단어 토큰 (`\w+`와 같은 기준: 문자, 숫자, 밑줄)
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

fn joined_lowercase<S: AsRef<str>>(retrieved: &[S]) -> String {
    retrieved
        .iter()
        .map(|t| t.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 답변의 핵심어: 4글자 이상, 소문자, 불용어 제외, 중복 제거
pub fn key_terms(answer: &str) -> BTreeSet<String> {
    words(answer)
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

// ============================================================================
// Metrics
// ============================================================================

/// 검색 텍스트에 등장하는 핵심어 비율 (핵심어가 없으면 `None`)
pub fn retrieval_hit_fraction<S: AsRef<str>>(answer: &str, retrieved: &[S]) -> Option<f64> {
    let terms = key_terms(answer);
    if terms.is_empty() {
        return None;
    }

    let context = joined_lowercase(retrieved);
    let found = terms.iter().filter(|t| context.contains(t.as_str())).count();
    Some(found as f64 / terms.len() as f64)
}

pub fn retrieval_hit<S: AsRef<str>>(answer: &str, retrieved: &[S], threshold: f64) -> bool {
    retrieval_hit_fraction(answer, retrieved).is_some_and(|f| f >= threshold)
}

/// 근거 있는 문장 비율 (단어가 있는 문장이 없으면 `None`)
///
/// 문장은 `.`, `!`, `?` 로 나눕니다. 문장의 서로 다른 소문자 단어 중
/// 검색 텍스트의 단어 집합에 속하는 비율이 `sentence_threshold` 이상이면 근거 있음.
pub fn faithfulness_score<S: AsRef<str>>(
    answer: &str,
    retrieved: &[S],
    sentence_threshold: f64,
) -> Option<f64> {
    let context = joined_lowercase(retrieved);
    let context_words: HashSet<&str> = words(&context).collect();

    let lowered = answer.to_lowercase();
    let mut total = 0usize;
    let mut grounded = 0usize;

    for sentence in lowered.split(['.', '!', '?']) {
        let sentence_words: HashSet<&str> = words(sentence).collect();
        if sentence_words.is_empty() {
            continue;
        }
        total += 1;

        let supported = sentence_words
            .iter()
            .filter(|w| context_words.contains(*w))
            .count();
        if supported as f64 / sentence_words.len() as f64 >= sentence_threshold {
            grounded += 1;
        }
    }

    if total == 0 {
        return None;
    }
    Some(grounded as f64 / total as f64)
}

pub fn is_faithful<S: AsRef<str>>(
    answer: &str,
    retrieved: &[S],
    sentence_threshold: f64,
    answer_threshold: f64,
) -> bool {
    faithfulness_score(answer, retrieved, sentence_threshold).is_some_and(|f| f >= answer_threshold)
}

/// 검색 텍스트에 없는 불확실성 표현
pub fn unsupported_markers<S: AsRef<str>>(answer: &str, retrieved: &[S]) -> Vec<&'static str> {
    let answer = answer.to_lowercase();
    let context = joined_lowercase(retrieved);
    UNCERTAINTY_MARKERS
        .iter()
        .copied()
        .filter(|m| answer.contains(m) && !context.contains(m))
        .collect()
}

pub fn is_hallucination<S: AsRef<str>>(answer: &str, retrieved: &[S], faithful: bool) -> bool {
    !faithful || !unsupported_markers(answer, retrieved).is_empty()
}

pub fn is_no_answer<S: AsRef<str>>(answer: &str, fallback_phrases: &[S]) -> bool {
    let answer = answer.to_lowercase();
    fallback_phrases
        .iter()
        .any(|p| answer.contains(&p.as_ref().to_lowercase()))
}

// ============================================================================
// Tests
// ============================================================================
