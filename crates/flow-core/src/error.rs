//! 저장소 에러 타입.

use thiserror::Error;

/// 저장소 접근 에러.
///
/// 모든 저장소 포트 구현체(PostgreSQL, 인메모리)가 공통으로 반환합니다.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// 조회 실패
    #[error("조회 실패: {0}")]
    Query(String),

    /// 저장 실패
    #[error("저장 실패: {0}")]
    Insert(String),

    /// 저장된 행을 도메인 타입으로 변환하지 못함
    #[error("행 변환 실패: {0}")]
    Decode(String),

    /// 연결 실패
    #[error("연결 실패: {0}")]
    Connection(String),
}

/// 저장소 Result 타입 별칭.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
