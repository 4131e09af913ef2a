//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스는 청크 ID를 페이로드로 벡터를 저장하고, 질의 벡터와 가장 가까운
//! k개의 `(id, distance)`를 거리 오름차순으로 반환합니다.
//! 저장소는 벡터 내용을 들여다보지 않고 전달만 합니다.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스에 넣을 벡터 엔트리
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID
    pub id: u64,
    pub embedding: Vec<f32>,
}

/// 검색 결과 (거리가 작을수록 유사)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub id: u64,
    pub distance: f32,
}

/// 거리 척도
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// 제곱 유클리드 거리 (FAISS IndexFlatL2와 동일)
    #[default]
    L2,
    /// 1 - 코사인 유사도
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => squared_l2(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(RagError::InvalidConfig(format!(
                "Unknown distance metric: {other} (expected l2|cosine)"
            ))),
        }
    }
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// VectorIndex 트레이트 (async)
///
/// 정확/근사 최근접 탐색 여부는 구현체가 결정합니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 가장 가까운 `k`개 (거리 오름차순)
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// 주어진 ID의 벡터 삭제 (없는 ID는 무시), 삭제된 개수 반환
    async fn remove(&self, ids: &[u64]) -> Result<usize>;

    /// 저장된 모든 ID (오름차순)
    async fn ids(&self) -> Result<Vec<u64>>;

    /// 모든 벡터 삭제
    async fn clear(&self) -> Result<()>;

    /// 벡터 개수
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// FlatIndex
// ============================================================================

/// 메모리 내 전수 탐색 인덱스
///
/// 저장된 모든 벡터와 거리를 계산합니다. 동일 거리는 ID 오름차순.
#[derive(Debug, Default)]
pub struct FlatIndex {
    metric: DistanceMetric,
    entries: RwLock<Vec<VectorEntry>>,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut stored = self.entries.write().unwrap_or_else(|e| e.into_inner());

        // 차원 일관성 확인
        let expected = stored
            .first()
            .or_else(|| entries.first())
            .map(|e| e.embedding.len());
        if let Some(dim) = expected {
            if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dim) {
                return Err(RagError::Index(format!(
                    "Dimension mismatch for id {}: expected {}, got {}",
                    bad.id,
                    dim,
                    bad.embedding.len()
                )));
            }
        }

        stored.extend(entries.iter().cloned());
        Ok(entries.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let stored = self.entries.read().unwrap_or_else(|e| e.into_inner());

        if let Some(first) = stored.first() {
            if first.embedding.len() != query.len() {
                return Err(RagError::Index(format!(
                    "Query dimension {} does not match index dimension {}",
                    query.len(),
                    first.embedding.len()
                )));
            }
        }

        let mut hits: Vec<IndexHit> = stored
            .iter()
            .map(|e| IndexHit {
                id: e.id,
                distance: self.metric.distance(query, &e.embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn remove(&self, ids: &[u64]) -> Result<usize> {
        let targets: HashSet<u64> = ids.iter().copied().collect();
        let mut stored = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = stored.len();
        stored.retain(|e| !targets.contains(&e.id));
        Ok(before - stored.len())
    }

    async fn ids(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 (-1.0 ~ 1.0)
///
/// 길이가 다르거나 영벡터면 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 제곱 유클리드 거리
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry { id, embedding }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.0001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.0001);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_squared_l2() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_flat_index_orders_by_distance() {
        let index = FlatIndex::new(DistanceMetric::L2);
        index
            .insert_batch(&[
                entry(0, vec![10.0, 0.0]),
                entry(1, vec![1.0, 0.0]),
                entry(2, vec![3.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[0.0, 0.0], 2).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(hits[0].distance, 1.0);
    }

    #[tokio::test]
    async fn test_flat_index_ties_break_by_id() {
        let index = FlatIndex::new(DistanceMetric::L2);
        index
            .insert_batch(&[entry(5, vec![1.0, 0.0]), entry(2, vec![-1.0, 0.0])])
            .await
            .unwrap();

        let hits = index.search(&[0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 5]);
    }

    #[tokio::test]
    async fn test_flat_index_clear_and_count() {
        let index = FlatIndex::new(DistanceMetric::L2);
        index.insert_batch(&[entry(0, vec![1.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flat_index_remove_and_ids() {
        let index = FlatIndex::new(DistanceMetric::L2);
        index
            .insert_batch(&[entry(4, vec![1.0]), entry(1, vec![2.0]), entry(7, vec![3.0])])
            .await
            .unwrap();
        assert_eq!(index.ids().await.unwrap(), vec![1, 4, 7]);

        assert_eq!(index.remove(&[4, 99]).await.unwrap(), 1);
        assert_eq!(index.ids().await.unwrap(), vec![1, 7]);
    }

    #[tokio::test]
    async fn test_flat_index_dimension_mismatch() {
        let index = FlatIndex::new(DistanceMetric::L2);
        index.insert_batch(&[entry(0, vec![1.0, 2.0])]).await.unwrap();

        assert!(index.insert_batch(&[entry(1, vec![1.0])]).await.is_err());
        assert!(index.search(&[1.0, 2.0, 3.0], 1).await.is_err());
    }
}
