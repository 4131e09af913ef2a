//! 콘텐츠 추출 모듈
//!
//! 문서 파일에서 `(페이지 번호, 텍스트)` 목록을 추출합니다.
//! - PDF 파일: pdf-extract로 추출 (CPU 바운드이므로 spawn_blocking)
//! - 텍스트 파일: 직접 읽고 폼피드로 페이지 분리

pub mod pdf;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collector::{document_name, FileType};
use crate::error::{RagError, Result};

// ============================================================================
// Page
// ============================================================================

/// 추출된 페이지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1부터 시작
    pub page_number: usize,
    pub text: String,
}

impl Page {
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

// ============================================================================
// Extractor Trait
// ============================================================================

/// 문서 추출기 트레이트
///
/// 손상된 입력은 `RagError::UnreadableDocument`로 실패합니다.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Vec<Page>>;
}

// ============================================================================
// DocumentExtractor
// ============================================================================

/// 확장자에 따라 PDF / 텍스트 추출을 선택하는 기본 추출기
#[derive(Debug, Default, Clone)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Vec<Page>> {
        let name = document_name(path);
        let bytes = tokio::fs::read(path).await?;

        // pdf-extract는 손상된 입력에서 panic할 수 있으므로 JoinError도 읽기 실패로 처리
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages_from_pdf(&bytes))
            .await
            .map_err(|e| RagError::UnreadableDocument {
                name: name.clone(),
                reason: format!("PDF extraction task failed: {e}"),
            })?
            .map_err(|e| RagError::UnreadableDocument {
                name: name.clone(),
                reason: format!("{e:#}"),
            })?;

        tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);
        Ok(pages)
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<Page>> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes).map_err(|e| RagError::UnreadableDocument {
            name: document_name(path),
            reason: format!("not valid UTF-8: {e}"),
        })?;

        Ok(text
            .split('\x0c')
            .enumerate()
            .map(|(i, page)| Page::new(i + 1, page.trim()))
            .collect())
    }
}

#[async_trait]
impl Extractor for DocumentExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<Page>> {
        match FileType::from_path(path) {
            Some(FileType::Pdf) => self.extract_pdf(path).await,
            Some(FileType::Text) => self.extract_text(path).await,
            None => Err(RagError::UnreadableDocument {
                name: document_name(path),
                reason: "unsupported file type".to_string(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
