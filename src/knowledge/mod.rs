//! Knowledge 모듈 - 문서 청크 저장소와 벡터 검색
//!
//! - Chunker: 페이지 인식 슬라이딩 윈도우 분할
//! - Store: 청크 메타데이터 + 임베딩/인덱스 위임, 순위 매긴 검색
//! - Catalog: SQLite 청크 메타데이터 영속화
//! - Vector / Lance: 인덱스 트레이트, 메모리 전수 탐색, LanceDB
//! - Citation: 출처 문자열 및 디버그 뷰

mod catalog;
mod chunker;
mod citation;
mod lance;
mod store;
mod vector;

// Re-exports
pub use catalog::{CatalogStats, ChunkCatalog};
pub use chunker::{Chunk, ChunkConfig, PageAttribution, PageChunker};
pub use citation::{debug_hits, format_citations, DebugHit, SNIPPET_CHARS};
pub use lance::LanceVectorIndex;
pub use store::{DocumentStore, RetrievalHit, StoreStats};
pub use vector::{
    cosine_similarity, squared_l2, DistanceMetric, FlatIndex, IndexHit, VectorEntry, VectorIndex,
};
