//! Citation Formatter
//!
//! 순위가 매겨진 검색 결과를 사람이 읽는 출처 문자열과 디버그 뷰로 변환합니다.

use serde::Serialize;

use super::store::RetrievalHit;

/// 디버그 스니펫 길이 (문자 수)
pub const SNIPPET_CHARS: usize = 200;

/// 출처 구분자
const CITATION_SEPARATOR: &str = " | ";

/// 검색 결과 디버그 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugHit {
    pub rank: usize,
    pub document: String,
    pub page: usize,
    /// 청크 텍스트 앞부분 (말줄임표 없음)
    pub snippet: String,
}

/// `"<문서> (page <번호>)"` 형식의 출처 문자열
///
/// 같은 (문서, 페이지)는 처음 등장한 순위에만 표시됩니다.
pub fn format_citations(hits: &[RetrievalHit]) -> String {
    let mut seen: Vec<(&str, usize)> = Vec::new();
    for hit in hits {
        let key = (hit.chunk.document_name.as_str(), hit.chunk.page_number);
        if !seen.contains(&key) {
            seen.push(key);
        }
    }

    seen.iter()
        .map(|(document, page)| format!("{} (page {})", document, page))
        .collect::<Vec<_>>()
        .join(CITATION_SEPARATOR)
}

pub fn debug_hits(hits: &[RetrievalHit]) -> Vec<DebugHit> {
    hits.iter()
        .map(|hit| DebugHit {
            rank: hit.rank,
            document: hit.chunk.document_name.clone(),
            page: hit.chunk.page_number,
            snippet: hit.chunk.text.chars().take(SNIPPET_CHARS).collect(),
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;

    fn hit(rank: usize, document: &str, page: usize, text: &str) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk {
                id: rank as u64,
                document_name: document.to_string(),
                page_number: page,
                text: text.to_string(),
                token_count: text.split_whitespace().count(),
            },
            distance: rank as f32,
            rank,
        }
    }

    #[test]
    fn test_citations_deduplicate_in_rank_order() {
        let hits = vec![
            hit(1, "manual", 4, "a"),
            hit(2, "guide", 1, "b"),
            hit(3, "manual", 4, "c"),
            hit(4, "manual", 5, "d"),
        ];
        assert_eq!(
            format_citations(&hits),
            "manual (page 4) | guide (page 1) | manual (page 5)"
        );
    }

    #[test]
    fn test_citations_empty() {
        assert_eq!(format_citations(&[]), "");
    }

    #[test]
    fn test_debug_snippet_is_prefix() {
        let long = "x".repeat(250);
        let debug = debug_hits(&[hit(1, "doc", 2, &long), hit(2, "doc", 3, "short")]);

        assert_eq!(debug[0].snippet.len(), SNIPPET_CHARS);
        assert!(!debug[0].snippet.ends_with("..."));
        assert_eq!(debug[1].snippet, "short");
        assert_eq!(debug[1].rank, 2);
        assert_eq!(debug[1].page, 3);
    }

    #[test]
    fn test_debug_snippet_counts_characters() {
        let text = "é".repeat(300);
        let debug = debug_hits(&[hit(1, "doc", 1, &text)]);
        assert_eq!(debug[0].snippet.chars().count(), SNIPPET_CHARS);
    }
}
