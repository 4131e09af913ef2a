//! Document Store - 청크 메타데이터 + 벡터 검색
//!
//! 청커로 문서를 분할하고, 임베딩 프로바이더로 벡터화한 뒤
//! 벡터 인덱스에 청크 ID를 키로 삽입합니다.
//! 검색 시 인덱스가 돌려준 ID를 청크로 되돌려 순위를 매깁니다.
//!
//! 동시성:
//! - `add` / `replace` / `clear`는 writer 게이트로 직렬화 (ID 부여와 인덱스 삽입이 한 쌍)
//! - 한 번 부여된 ID는 쓰기가 실패해도 `clear` 전까지 다시 쓰지 않음
//! - `retrieve`는 게이트를 잡지 않음. 메타데이터 락은 메모리 복사 동안만 유지

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::Mutex;

use super::catalog::{CatalogStats, ChunkCatalog};
use super::chunker::{Chunk, PageChunker};
use super::vector::{VectorEntry, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::Page;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (rank는 1부터, 거리 오름차순)
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub distance: f32,
    pub rank: usize,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub embedder: String,
}

// ============================================================================
// DocumentStore
// ============================================================================

pub struct DocumentStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    catalog: Option<ChunkCatalog>,
    chunker: PageChunker,
    /// writer 게이트 + 다음 청크 ID
    writer: Mutex<u64>,
    /// ID 오름차순
    chunks: RwLock<Vec<Chunk>>,
}

impl DocumentStore {
    /// 빈 메모리 저장소 생성 (카탈로그 없음)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chunker: PageChunker,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog: None,
            chunker,
            writer: Mutex::new(0),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// 카탈로그에서 기존 코퍼스를 불러와 저장소 열기
    ///
    /// 카탈로그에 없는 벡터(중단된 수집의 잔여물)는 인덱스에서 제거합니다.
    /// 다음 ID는 카탈로그와 인덱스에서 본 최대 ID + 1부터 이어집니다.
    pub async fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        catalog: ChunkCatalog,
        chunker: PageChunker,
    ) -> Result<Self> {
        let chunks = catalog.load_all()?;
        let index_ids = index.ids().await?;

        let next_id = chunks
            .last()
            .map(|c| c.id)
            .into_iter()
            .chain(index_ids.iter().copied())
            .max()
            .map_or(0, |id| id + 1);

        let known: HashSet<u64> = chunks.iter().map(|c| c.id).collect();
        let orphans: Vec<u64> = index_ids
            .iter()
            .copied()
            .filter(|id| !known.contains(id))
            .collect();
        if !orphans.is_empty() {
            tracing::warn!("Removing {} vectors with no catalog entry", orphans.len());
            index.remove(&orphans).await?;
        }

        let indexed: HashSet<u64> = index_ids.into_iter().collect();
        let missing = chunks.iter().filter(|c| !indexed.contains(&c.id)).count();
        if missing > 0 {
            tracing::warn!(
                "{} catalog chunks have no vector and will not be retrieved; consider re-ingesting",
                missing
            );
        }

        tracing::info!(
            "Opened document store: {} chunks from {:?}",
            chunks.len(),
            catalog.db_path()
        );

        Ok(Self {
            embedder,
            index,
            catalog: Some(catalog),
            chunker,
            writer: Mutex::new(next_id),
            chunks: RwLock::new(chunks),
        })
    }

    /// 문서 추가
    ///
    /// 청크 분할 → 임베딩 → 인덱스 삽입 → 카탈로그 저장 → 메타데이터 추가 순서.
    /// 추가된 청크 수를 반환하며, 청크가 하나도 없으면 `EmptyDocument`.
    /// 실패하면 이번에 넣은 벡터를 지우고, 그 ID들은 다시 쓰지 않습니다.
    pub async fn add(&self, document_name: &str, pages: &[Page]) -> Result<usize> {
        let mut next_id = self.writer.lock().await;

        let chunks = self.chunk(document_name, pages, *next_id)?;
        let entries = self.embed(&chunks).await?;
        self.insert_vectors(&mut next_id, &entries).await?;

        if let Some(catalog) = &self.catalog {
            if let Err(e) = catalog.insert_chunks(&chunks) {
                self.discard_vectors(&entries).await;
                return Err(e);
            }
        }

        let added = chunks.len();
        self.chunks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(chunks);

        tracing::info!("Indexed '{}': {} chunks", document_name, added);
        Ok(added)
    }

    /// 기존 코퍼스를 이 문서로 교체 (하나의 writer 구간)
    ///
    /// 새 청크를 인덱스와 카탈로그에 모두 넣은 뒤에 이전 청크를 내립니다.
    /// 어느 단계에서 실패해도 기존 코퍼스는 그대로 남습니다.
    pub async fn replace(&self, document_name: &str, pages: &[Page]) -> Result<usize> {
        let mut next_id = self.writer.lock().await;

        let chunks = self.chunk(document_name, pages, *next_id)?;
        let entries = self.embed(&chunks).await?;
        let previous_ids: Vec<u64> = self
            .chunks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|c| c.id)
            .collect();

        self.insert_vectors(&mut next_id, &entries).await?;

        if let Some(catalog) = &self.catalog {
            if let Err(e) = catalog.replace_chunks(&chunks) {
                self.discard_vectors(&entries).await;
                return Err(e);
            }
        }

        // 남은 이전 벡터는 메타데이터가 없어 검색에서 건너뛰고, 다음 open에서 정리됨
        if let Err(e) = self.index.remove(&previous_ids).await {
            tracing::warn!(
                "Failed to remove {} replaced vectors: {}",
                previous_ids.len(),
                e
            );
        }

        let added = chunks.len();
        *self.chunks.write().unwrap_or_else(|e| e.into_inner()) = chunks;

        tracing::info!(
            "Replaced corpus with '{}': {} chunks ({} removed)",
            document_name,
            added,
            previous_ids.len()
        );
        Ok(added)
    }

    fn chunk(&self, document_name: &str, pages: &[Page], first_id: u64) -> Result<Vec<Chunk>> {
        let chunks = self.chunker.chunk_pages(document_name, pages, first_id);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(document_name.to_string()));
        }
        Ok(chunks)
    }

    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<VectorEntry>> {
        tracing::debug!(
            "Embedding {} chunks with {}",
            chunks.len(),
            self.embedder.name()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        Ok(chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry {
                id: chunk.id,
                embedding,
            })
            .collect())
    }

    /// 인덱스 삽입 (writer 게이트 보유 중)
    ///
    /// 삽입을 시도하는 순간 ID를 소모합니다. 실패해도 같은 ID가 다시 부여되지 않습니다.
    async fn insert_vectors(&self, next_id: &mut u64, entries: &[VectorEntry]) -> Result<()> {
        if let Some(last) = entries.iter().map(|e| e.id).max() {
            *next_id = (*next_id).max(last + 1);
        }

        if let Err(e) = self.index.insert_batch(entries).await {
            // 일부만 들어갔을 수 있음
            self.discard_vectors(entries).await;
            return Err(e);
        }
        Ok(())
    }

    /// 실패한 쓰기의 벡터 제거 (실패는 경고만)
    async fn discard_vectors(&self, entries: &[VectorEntry]) {
        let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        if let Err(e) = self.index.remove(&ids).await {
            tracing::warn!("Failed to remove {} orphaned vectors: {}", ids.len(), e);
        }
    }

    /// 질문과 가까운 청크 검색
    ///
    /// `top_k`는 `[1, 청크 수]`로 보정됩니다. 동일 거리는 청크 ID 오름차순.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievalHit>> {
        let available = self.len();
        if available == 0 {
            return Err(RagError::NoDocumentsIndexed);
        }
        let k = top_k.clamp(1, available);

        let query = self.embedder.embed_query(question).await?;
        let index_hits = self.index.search(&query, k).await?;

        let mut resolved: Vec<(Chunk, f32)> = {
            let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
            index_hits
                .iter()
                .filter_map(|hit| {
                    // 인덱스에만 있고 메타데이터에 아직 없는 ID는 건너뜀
                    chunks
                        .binary_search_by_key(&hit.id, |c| c.id)
                        .ok()
                        .map(|pos| (chunks[pos].clone(), hit.distance))
                })
                .collect()
        };

        resolved.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));
        resolved.truncate(k);

        Ok(resolved
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, distance))| RetrievalHit {
                chunk,
                distance,
                rank: i + 1,
            })
            .collect())
    }

    /// 모든 청크와 벡터 삭제 (ID 카운터도 0으로)
    ///
    /// 카탈로그 → 인덱스 → 메타데이터 순서. 인덱스 삭제가 실패하면
    /// ID 카운터를 되돌리지 않으므로 남은 벡터의 ID가 재사용되지 않습니다.
    pub async fn clear(&self) -> Result<()> {
        let mut next_id = self.writer.lock().await;

        if let Some(catalog) = &self.catalog {
            catalog.clear()?;
        }
        self.index.clear().await?;
        self.chunks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *next_id = 0;

        tracing::info!("Document store cleared");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 청크 스냅샷 (ID 오름차순)
    pub fn chunks(&self) -> Vec<Chunk> {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 적재된 문서 이름 (처음 등장 순서)
    pub fn document_names(&self) -> Vec<String> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = Vec::new();
        for chunk in chunks.iter() {
            if !names.contains(&chunk.document_name) {
                names.push(chunk.document_name.clone());
            }
        }
        names
    }

    /// 영속 카탈로그 통계 (메모리 저장소면 `None`)
    pub fn catalog_stats(&self) -> Result<Option<CatalogStats>> {
        self.catalog.as_ref().map(ChunkCatalog::stats).transpose()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            chunk_count: self.len(),
            document_count: self.document_names().len(),
            embedder: self.embedder.name().to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
