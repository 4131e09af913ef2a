//! LanceDB Vector Index - 디스크 영속 벡터 인덱스
//!
//! 청크 ID와 임베딩만 저장합니다. 청크 텍스트와 메타데이터는
//! [`ChunkCatalog`](super::ChunkCatalog)가 보관합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;

use super::vector::{DistanceMetric, IndexHit, VectorEntry, VectorIndex};
use crate::error::{RagError, Result};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunk_vectors";

/// 삭제 필터 하나에 넣는 최대 ID 수
const DELETE_BATCH: usize = 500;

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스 구현
pub struct LanceVectorIndex {
    db: Connection,
    dimension: i32,
    metric: DistanceMetric,
}

impl LanceVectorIndex {
    /// LanceDB 인덱스 열기 (없으면 첫 삽입 때 테이블 생성)
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::connect(path, dimension, metric)
            .await
            .map_err(index_error)
    }

    async fn connect(
        path: &Path,
        dimension: usize,
        metric: DistanceMetric,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            dimension,
            metric,
        })
    }

    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> anyhow::Result<RecordBatch> {
        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Dimension mismatch for chunk {}: expected {}, got {}",
                bad.id,
                self.dimension,
                bad.embedding.len()
            );
        }

        let ids: Vec<i64> = entries
            .iter()
            .map(|e| i64::try_from(e.id).context("Chunk id out of range"))
            .collect::<anyhow::Result<_>>()?;

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(Float32Array::from(embeddings_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![Arc::new(Int64Array::from(ids)), Arc::new(embeddings_list)],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> anyhow::Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }

    async fn insert(&self, entries: &[VectorEntry]) -> anyhow::Result<usize> {
        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<IndexHit>> {
        let distance_type = match self.metric {
            DistanceMetric::L2 => DistanceType::L2,
            DistanceMetric::Cosine => DistanceType::Cosine,
        };

        let batches: Vec<RecordBatch> = self
            .open_table()
            .await?
            .vector_search(query.to_vec())
            .context("Failed to create vector search")?
            .distance_type(distance_type)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        let mut hits = Vec::new();

        for batch in batches {
            let ids = batch
                .column_by_name("chunk_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_id column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                hits.push(IndexHit {
                    id: u64::try_from(ids.value(i)).context("Negative chunk id in index")?,
                    distance: distances.value(i),
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    async fn delete_ids(&self, ids: &[u64]) -> anyhow::Result<usize> {
        let table = self.open_table().await?;
        let before = table.count_rows(None).await.context("Failed to count rows")?;

        // ID는 u64 정수로만 구성되므로 필터 문자열에 그대로 사용
        for batch in ids.chunks(DELETE_BATCH) {
            let list = batch
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            table
                .delete(&format!("chunk_id IN ({})", list))
                .await
                .context("Failed to delete vectors")?;
        }

        let after = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(before.saturating_sub(after))
    }

    async fn all_ids(&self) -> anyhow::Result<Vec<u64>> {
        let batches: Vec<RecordBatch> = self
            .open_table()
            .await?
            .query()
            .select(Select::Columns(vec!["chunk_id".to_string()]))
            .execute()
            .await
            .context("Failed to scan vector table")?
            .try_collect()
            .await?;

        let mut ids = Vec::new();
        for batch in batches {
            let column = batch
                .column_by_name("chunk_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_id column"))?;
            for i in 0..column.len() {
                ids.push(u64::try_from(column.value(i)).context("Negative chunk id in index")?);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

fn index_error(e: anyhow::Error) -> RagError {
    RagError::Index(format!("{e:#}"))
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.insert(entries).await.map_err(index_error)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }
        self.nearest(query, k).await.map_err(index_error)
    }

    async fn remove(&self, ids: &[u64]) -> Result<usize> {
        if ids.is_empty() || !self.table_exists().await {
            return Ok(0);
        }
        self.delete_ids(ids).await.map_err(index_error)
    }

    async fn ids(&self) -> Result<Vec<u64>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }
        self.all_ids().await.map_err(index_error)
    }

    async fn clear(&self) -> Result<()> {
        if !self.table_exists().await {
            return Ok(());
        }
        self.db
            .drop_table(TABLE_NAME)
            .await
            .context("Failed to drop vector table")
            .map_err(index_error)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }
        let table = self.open_table().await.map_err(index_error)?;
        table
            .count_rows(None)
            .await
            .context("Failed to count rows")
            .map_err(index_error)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn entry(id: u64, x: f32) -> VectorEntry {
        VectorEntry {
            id,
            embedding: vec![x, 0.0, 0.0, 0.0],
        }
    }

    #[tokio::test]
    async fn test_lance_index_insert_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("v.lance"), DIM, DistanceMetric::L2)
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
        assert_eq!(index.insert_batch(&[entry(0, 1.0), entry(1, 2.0)]).await.unwrap(), 2);
        assert_eq!(index.insert_batch(&[entry(2, 3.0)]).await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lance_index_search_nearest_first() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("s.lance"), DIM, DistanceMetric::L2)
            .await
            .unwrap();

        index
            .insert_batch(&[entry(0, 10.0), entry(1, 1.0), entry(2, 4.0)])
            .await
            .unwrap();

        let hits = index.search(&[0.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_lance_index_clear() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("c.lance"), DIM, DistanceMetric::L2)
            .await
            .unwrap();

        index.insert_batch(&[entry(0, 1.0)]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lance_index_remove_and_ids() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("r.lance"), DIM, DistanceMetric::L2)
            .await
            .unwrap();

        assert!(index.ids().await.unwrap().is_empty());
        assert_eq!(index.remove(&[1]).await.unwrap(), 0);

        index
            .insert_batch(&[entry(3, 1.0), entry(0, 2.0), entry(8, 3.0)])
            .await
            .unwrap();
        assert_eq!(index.ids().await.unwrap(), vec![0, 3, 8]);

        assert_eq!(index.remove(&[3, 42]).await.unwrap(), 1);
        assert_eq!(index.ids().await.unwrap(), vec![0, 8]);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_index_rejects_wrong_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let index = LanceVectorIndex::open(&temp_dir.path().join("d.lance"), DIM, DistanceMetric::L2)
            .await
            .unwrap();

        let bad = VectorEntry {
            id: 0,
            embedding: vec![1.0, 2.0],
        };
        assert!(matches!(index.insert_batch(&[bad]).await, Err(RagError::Index(_))));
    }
}
