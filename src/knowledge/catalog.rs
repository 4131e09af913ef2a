//! Chunk Catalog - rusqlite 기반 청크 메타데이터 저장소
//!
//! 적재된 코퍼스의 청크(ID, 문서명, 페이지, 텍스트, 토큰 수)를 디스크에 보관해
//! 프로세스를 다시 시작해도 같은 코퍼스를 불러올 수 있게 합니다.
//! 저장 위치: ~/.docqa-rag/chunks.db

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags, Transaction};

use super::chunker::Chunk;
use crate::error::Result;

/// 카탈로그 통계
#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// ChunkCatalog
// ============================================================================

pub struct ChunkCatalog {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl ChunkCatalog {
    /// 카탈로그 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let catalog = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        catalog.initialize()?;
        Ok(catalog)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.connection();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY,
                document_name TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_name);",
        )?;

        tracing::debug!("Chunk catalog initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 청크 일괄 저장 (하나의 트랜잭션)
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        insert_rows(&tx, chunks)?;
        tx.commit()?;
        Ok(chunks.len())
    }

    /// 기존 청크를 모두 지우고 새 청크로 교체 (하나의 트랜잭션)
    ///
    /// 실패하면 기존 청크가 그대로 남습니다.
    pub fn replace_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks", [])?;
        insert_rows(&tx, chunks)?;
        tx.commit()?;
        Ok(chunks.len())
    }

    /// 전체 청크 로드 (ID 오름차순)
    pub fn load_all(&self) -> Result<Vec<Chunk>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, document_name, page_number, text, token_count
             FROM chunks ORDER BY id ASC",
        )?;

        let chunks = stmt
            .query_map([], |row| {
                Ok(Chunk {
                    id: row.get::<_, i64>(0)? as u64,
                    document_name: row.get(1)?,
                    page_number: row.get::<_, i64>(2)? as usize,
                    text: row.get(3)?,
                    token_count: row.get::<_, i64>(4)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chunks)
    }

    /// 전체 삭제
    pub fn clear(&self) -> Result<usize> {
        let rows = self.connection().execute("DELETE FROM chunks", [])?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.connection();
        let (chunk_count, document_count): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT document_name) FROM chunks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CatalogStats {
            chunk_count: chunk_count as usize,
            document_count: document_count as usize,
            db_path: self.db_path.clone(),
        })
    }
}

fn insert_rows(tx: &Transaction<'_>, chunks: &[Chunk]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO chunks (id, document_name, page_number, text, token_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for chunk in chunks {
        stmt.execute(params![
            chunk.id as i64,
            chunk.document_name,
            chunk.page_number as i64,
            chunk.text,
            chunk.token_count as i64,
        ])?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
