//! 평가 질문 세트
//!
//! 기본 제공 50문항 (비행 계획 및 모니터링 문서 기준):
//! - simple_factual 20: 정의, 약어, 단순 사실 조회
//! - applied 20: 절차, 계산, 운용 시나리오
//! - higher_order 10: 다단계 추론, 트레이드오프, 조건부 판단
//!
//! JSON 파일에서 사용자 정의 세트를 불러올 수도 있습니다.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 질문 분류 (선언 순서가 보고서 정렬 순서)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    SimpleFactual,
    Applied,
    HigherOrder,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 3] = [
        QuestionCategory::SimpleFactual,
        QuestionCategory::Applied,
        QuestionCategory::HigherOrder,
    ];

    /// 보고서 표시용 이름
    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::SimpleFactual => "Simple Factual",
            QuestionCategory::Applied => "Applied",
            QuestionCategory::HigherOrder => "Higher Order",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::SimpleFactual => "simple_factual",
            QuestionCategory::Applied => "applied",
            QuestionCategory::HigherOrder => "higher_order",
        }
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationQuestion {
    pub text: String,
    pub category: QuestionCategory,
}

impl EvaluationQuestion {
    pub fn new(text: impl Into<String>, category: QuestionCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

/// 질문 파일 형식
///
/// - `[{"text": "...", "category": "applied"}, ...]`
/// - `{"simple_factual": ["..."], "applied": ["..."], ...}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    List(Vec<EvaluationQuestion>),
    Grouped {
        #[serde(default)]
        simple_factual: Vec<String>,
        #[serde(default)]
        applied: Vec<String>,
        #[serde(default)]
        higher_order: Vec<String>,
    },
}

// ============================================================================
// Loading
// ============================================================================

/// JSON 문자열에서 질문 세트 파싱
pub fn parse_questions(json: &str) -> Result<Vec<EvaluationQuestion>> {
    let file: QuestionFile = serde_json::from_str(json)
        .map_err(|e| RagError::InvalidConfig(format!("Invalid question file: {e}")))?;

    let questions = match file {
        QuestionFile::List(list) => list,
        QuestionFile::Grouped {
            simple_factual,
            applied,
            higher_order,
        } => [
            (QuestionCategory::SimpleFactual, simple_factual),
            (QuestionCategory::Applied, applied),
            (QuestionCategory::HigherOrder, higher_order),
        ]
        .into_iter()
        .flat_map(|(category, texts)| {
            texts
                .into_iter()
                .map(move |text| EvaluationQuestion::new(text, category))
        })
        .collect(),
    };

    if let Some(blank) = questions.iter().position(|q| q.text.trim().is_empty()) {
        return Err(RagError::InvalidQuestion(format!(
            "Question #{} is empty",
            blank + 1
        )));
    }
    if questions.is_empty() {
        return Err(RagError::InvalidConfig("Question file contains no questions".into()));
    }

    Ok(questions)
}

pub fn load_questions(path: &Path) -> Result<Vec<EvaluationQuestion>> {
    let json = std::fs::read_to_string(path)?;
    let questions = parse_questions(&json)?;
    tracing::info!("Loaded {} questions from {:?}", questions.len(), path);
    Ok(questions)
}

// ============================================================================
// Built-in Question Set
// ============================================================================

const SIMPLE_FACTUAL: [&str; 20] = [
    "What is ICAO?",
    "What does ATC stand for?",
    "What is the definition of flight planning?",
    "What is a flight plan?",
    "What does VFR mean?",
    "What does IFR mean?",
    "What is NOTAM?",
    "What is the purpose of a flight plan?",
    "What is the minimum fuel reserve requirement?",
    "What is an alternate aerodrome?",
    "What is RVSM?",
    "What does ETOPS stand for?",
    "What is a SID?",
    "What is a STAR?",
    "What is the definition of cruising level?",
    "What is a waypoint?",
    "What is the definition of route?",
    "What is AIP?",
    "What is a navigation log?",
    "What is the purpose of pre-flight planning?",
];

const APPLIED: [&str; 20] = [
    "How do you calculate the required fuel for a flight?",
    "What steps are involved in filing a flight plan?",
    "When should a pilot file a flight plan?",
    "How do you determine the optimal cruising altitude?",
    "What factors affect flight planning?",
    "What should be checked during pre-flight planning?",
    "How do you select an alternate aerodrome?",
    "What are the requirements for international flight planning?",
    "How do you calculate the estimated time en route?",
    "What information is required in a flight plan?",
    "How do you determine the route of flight?",
    "What weather information is needed for flight planning?",
    "How do you calculate the top of descent point?",
    "What are the procedures for flight plan amendments?",
    "How do you monitor a flight in progress?",
    "What actions should be taken if the flight deviates from the plan?",
    "How do you calculate fuel burn rate?",
    "What are the considerations for route selection?",
    "How do you determine the appropriate airspeed for cruise?",
    "What are the procedures for flight plan closure?",
];

const HIGHER_ORDER: [&str; 10] = [
    "What trade-offs should be considered when choosing between a direct route and airways?",
    "How would weather conditions affect the choice of alternate aerodrome?",
    "If the planned cruising altitude is unavailable, how should the pilot adjust the flight plan?",
    "What factors would lead a pilot to decide to divert to an alternate airport?",
    "How do fuel requirements change for different flight conditions?",
    "What is the relationship between aircraft weight and optimal cruise altitude?",
    "How should a pilot balance fuel efficiency with flight time?",
    "What considerations are needed when planning a flight over mountainous terrain?",
    "How do wind conditions affect route planning and fuel calculations?",
    "What decision-making process should be used when flight conditions deteriorate?",
];

/// 기본 50문항 (분류 순서, 분류 내 선언 순서)
pub fn builtin_questions() -> Vec<EvaluationQuestion> {
    let groups: [(QuestionCategory, &[&str]); 3] = [
        (QuestionCategory::SimpleFactual, &SIMPLE_FACTUAL),
        (QuestionCategory::Applied, &APPLIED),
        (QuestionCategory::HigherOrder, &HIGHER_ORDER),
    ];

    groups
        .iter()
        .flat_map(|(category, texts)| {
            texts
                .iter()
                .map(move |text| EvaluationQuestion::new(*text, *category))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
