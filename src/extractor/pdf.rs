//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use anyhow::{Context, Result};
use regex::Regex;

use super::Page;

/// PDF 바이트에서 페이지별 텍스트 추출
///
/// 페이지 번호는 1부터 시작합니다. 텍스트가 없는 페이지도 번호를 유지하기
/// 위해 빈 문자열로 남겨둡니다.
pub fn extract_pages_from_pdf(bytes: &[u8]) -> Result<Vec<Page>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .context("Failed to extract text from PDF")?;

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
        return Ok(vec![Page {
            page_number: 1,
            text: String::new(),
        }]);
    }

    Ok(split_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            page_number: i + 1,
            text,
        })
        .collect())
}

/// 추출된 텍스트를 페이지별로 분리
///
/// pdf-extract는 페이지 사이에 폼피드(`\x0c`)를 넣습니다. 폼피드가 없으면
/// "--- Page 3 ---" 형태의 구분선을 시도하고, 그것도 없으면 한 페이지로 취급합니다.
pub(crate) fn split_pages(text: &str) -> Vec<String> {
    if text.contains('\x0c') {
        let mut pages: Vec<String> = text.split('\x0c').map(|s| s.trim().to_string()).collect();
        // 마지막 폼피드 뒤의 빈 조각은 페이지가 아님
        while pages.len() > 1 && pages.last().map(|p| p.is_empty()).unwrap_or(false) {
            pages.pop();
        }
        return pages;
    }

    if let Ok(separator) =
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
    {
        if separator.is_match(text) {
            let pages: Vec<String> = separator
                .split(text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            if pages.len() > 1 {
                return pages;
            }
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================
