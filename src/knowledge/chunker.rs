//! Text Chunking Module
//!
//! 페이지 단위로 추출된 문서 텍스트를 고정 크기(토큰 수)의
//! 겹치는 윈도우로 분할합니다.
//!
//! - 토큰: 공백 기준 단어 (형태소 분석, 대소문자 정규화 없음)
//! - 윈도우: `chunk_size` 토큰, `chunk_size - overlap` 토큰씩 전진
//! - 페이지 번호: 윈도우에 토큰을 제공한 페이지 중 하나 (정책 선택)

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::extractor::Page;

// ============================================================================
// Chunk
// ============================================================================

/// 문서 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 저장소 내 고유 ID (벡터 인덱스 조인 키)
    pub id: u64,
    pub document_name: String,
    /// 1부터 시작하는 페이지 번호
    pub page_number: usize,
    pub text: String,
    pub token_count: usize,
}

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 윈도우 페이지 귀속 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAttribution {
    /// 윈도우 첫 토큰의 페이지
    #[default]
    FirstToken,
    /// 윈도우에서 가장 많은 토큰을 차지한 페이지 (동률이면 앞 페이지)
    Majority,
}

impl FromStr for PageAttribution {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first_token" | "first" => Ok(PageAttribution::FirstToken),
            "majority" => Ok(PageAttribution::Majority),
            other => Err(RagError::InvalidConfig(format!(
                "Unknown page attribution: {other} (expected first_token|majority)"
            ))),
        }
    }
}

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (토큰 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (토큰 수, `chunk_size` 미만)
    pub overlap: usize,
    pub attribution: PageAttribution,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 50,
            attribution: PageAttribution::FirstToken,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// 윈도우 전진 폭
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

// ============================================================================
// PageChunker
// ============================================================================

/// 토큰과 그 출처 페이지
#[derive(Debug, Clone, Copy)]
struct PageToken<'a> {
    word: &'a str,
    page: usize,
}

/// 페이지 인식 슬라이딩 윈도우 청커
#[derive(Debug, Clone)]
pub struct PageChunker {
    config: ChunkConfig,
}

impl PageChunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 문서의 페이지들을 청크로 분할
    ///
    /// ID는 `first_id`부터 방출 순서대로 부여됩니다.
    /// 토큰이 하나도 없으면 빈 벡터를 반환합니다.
    pub fn chunk_pages(&self, document_name: &str, pages: &[Page], first_id: u64) -> Vec<Chunk> {
        // 1. 전체 페이지를 하나의 토큰 스트림으로 (페이지 기록)
        let tokens: Vec<PageToken<'_>> = pages
            .iter()
            .flat_map(|page| {
                page.text.split_whitespace().map(move |word| PageToken {
                    word,
                    page: page.page_number,
                })
            })
            .collect();

        // 2. 윈도우 경계 계산
        let bounds = window_bounds(tokens.len(), &self.config);

        // 3. 청크 생성
        bounds
            .into_iter()
            .zip(first_id..)
            .map(|((start, end), id)| {
                let window = &tokens[start..end];
                Chunk {
                    id,
                    document_name: document_name.to_string(),
                    page_number: self.attribute_page(window),
                    text: window.iter().map(|t| t.word).collect::<Vec<_>>().join(" "),
                    token_count: window.len(),
                }
            })
            .collect()
    }

    /// 윈도우의 페이지 번호 결정
    fn attribute_page(&self, window: &[PageToken<'_>]) -> usize {
        match self.config.attribution {
            PageAttribution::FirstToken => window.first().map(|t| t.page).unwrap_or(1),
            PageAttribution::Majority => {
                // 페이지는 스트림 내에서 연속 구간이므로 run-length로 집계
                let mut best: Option<(usize, usize)> = None;
                let mut current: Option<(usize, usize)> = None;

                for token in window {
                    current = match current {
                        Some((page, count)) if page == token.page => Some((page, count + 1)),
                        Some(run) => {
                            best = pick_majority(best, run);
                            Some((token.page, 1))
                        }
                        None => Some((token.page, 1)),
                    };
                }
                if let Some(run) = current {
                    best = pick_majority(best, run);
                }

                best.map(|(page, _)| page).unwrap_or(1)
            }
        }
    }
}

/// 더 많은 토큰을 가진 구간 선택 (동률이면 먼저 나온 구간 유지)
fn pick_majority(best: Option<(usize, usize)>, run: (usize, usize)) -> Option<(usize, usize)> {
    match best {
        Some(b) if b.1 >= run.1 => Some(b),
        _ => Some(run),
    }
}

/// 토큰 스트림의 윈도우 경계 `(start, end)` 목록
///
/// 전체 토큰 수가 `chunk_size` 이하면 윈도우 하나.
/// 그 외에는 `stride`씩 전진하며, 폭이 `chunk_size`보다 짧은 윈도우를
/// 방출한 뒤 멈춥니다.
fn window_bounds(total: usize, config: &ChunkConfig) -> Vec<(usize, usize)> {
    if total == 0 {
        return vec![];
    }
    if total <= config.chunk_size {
        return vec![(0, total)];
    }

    let mut bounds = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + config.chunk_size).min(total);
        bounds.push((start, end));

        if end - start < config.chunk_size {
            break;
        }
        start += config.stride();
    }

    bounds
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page_number: usize, text: &str) -> Page {
        Page {
            page_number,
            text: text.to_string(),
        }
    }

    fn numbered_words(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn chunker(chunk_size: usize, overlap: usize) -> PageChunker {
        PageChunker::new(ChunkConfig::new(chunk_size, overlap).unwrap()).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(200, 50).is_ok());
        assert!(ChunkConfig::new(10, 0).is_ok());
        assert!(ChunkConfig::new(10, 10).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert_eq!(ChunkConfig::default().stride(), 150);
    }

    #[test]
    fn test_500_tokens_window_offsets() {
        let pages = vec![page(1, &numbered_words(0..500))];
        let chunks = chunker(200, 50).chunk_pages("doc", &pages, 0);

        let firsts: Vec<&str> = chunks
            .iter()
            .map(|c| c.text.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(firsts, vec!["w0", "w150", "w300", "w450"]);

        let counts: Vec<usize> = chunks.iter().map(|c| c.token_count).collect();
        assert_eq!(counts, vec![200, 200, 200, 50]);
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let pages = vec![page(1, &numbered_words(0..480))];
        let chunks = chunker(200, 50).chunk_pages("doc", &pages, 0);

        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            assert_eq!(&prev[prev.len() - 50..], &next[..50]);
        }

        // 마지막 청크만 짧을 수 있음
        let (last, rest) = chunks.split_last().unwrap();
        assert!(rest.iter().all(|c| c.token_count == 200));
        assert!(last.token_count <= 200);
    }

    #[test]
    fn test_full_coverage_without_gaps() {
        let total = 1234;
        let pages = vec![
            page(1, &numbered_words(0..400)),
            page(2, &numbered_words(400..900)),
            page(3, &numbered_words(900..total)),
        ];
        let config = ChunkConfig::new(100, 30).unwrap();
        let chunks = PageChunker::new(config).unwrap().chunk_pages("doc", &pages, 0);

        let mut covered = vec![false; total];
        for (i, chunk) in chunks.iter().enumerate() {
            let start = i * config.stride();
            for offset in 0..chunk.token_count {
                covered[start + offset] = true;
            }
            let first = format!("w{}", start);
            assert_eq!(chunk.text.split_whitespace().next(), Some(first.as_str()));
        }
        assert!(covered.iter().all(|c| *c));
    }

    #[test]
    fn test_short_document_single_chunk() {
        let pages = vec![page(1, "alpha beta"), page(2, "gamma")];
        let chunks = chunker(200, 50).chunk_pages("doc", &pages, 7);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 7);
        assert_eq!(chunks[0].text, "alpha beta gamma");
        assert_eq!(chunks[0].token_count, 3);
        assert_eq!(chunks[0].page_number, 1);
    }

    #[test]
    fn test_empty_pages_skipped() {
        let pages = vec![page(1, "   "), page(2, ""), page(3, "only words here")];
        let chunks = chunker(200, 50).chunk_pages("doc", &pages, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, 3);

        let empty = chunker(200, 50).chunk_pages("doc", &[page(1, "\n\t ")], 0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_ids_continue_from_counter() {
        let pages = vec![page(1, &numbered_words(0..25))];
        let chunks = chunker(10, 5).chunk_pages("doc", &pages, 100);
        let ids: Vec<u64> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids, (100..100 + chunks.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_first_token_page_attribution() {
        // 페이지 1: 8 토큰, 페이지 2: 8 토큰 / 청크 10, 오버랩 0
        let pages = vec![page(1, &numbered_words(0..8)), page(2, &numbered_words(8..16))];
        let chunks = chunker(10, 0).chunk_pages("doc", &pages, 0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, 1);
        assert_eq!(chunks[1].page_number, 2);
    }

    #[test]
    fn test_majority_page_attribution() {
        // 첫 윈도우: 페이지 1에서 3 토큰, 페이지 2에서 7 토큰
        let pages = vec![page(1, &numbered_words(0..3)), page(2, &numbered_words(3..20))];
        let config = ChunkConfig {
            chunk_size: 10,
            overlap: 0,
            attribution: PageAttribution::Majority,
        };
        let chunks = PageChunker::new(config).unwrap().chunk_pages("doc", &pages, 0);
        assert_eq!(chunks[0].page_number, 2);

        // 동률이면 앞 페이지
        let pages = vec![page(4, &numbered_words(0..5)), page(5, &numbered_words(5..10))];
        let chunks = PageChunker::new(config).unwrap().chunk_pages("doc", &pages, 0);
        assert_eq!(chunks[0].page_number, 4);
    }

    #[test]
    fn test_deterministic_boundaries() {
        let pages = vec![page(1, &numbered_words(0..333)), page(2, &numbered_words(333..777))];
        let c = chunker(64, 16);
        assert_eq!(c.chunk_pages("doc", &pages, 0), c.chunk_pages("doc", &pages, 0));
    }

    #[test]
    fn test_parse_attribution() {
        assert_eq!("majority".parse::<PageAttribution>().unwrap(), PageAttribution::Majority);
        assert_eq!("first_token".parse::<PageAttribution>().unwrap(), PageAttribution::FirstToken);
        assert!("last".parse::<PageAttribution>().is_err());
    }
}
