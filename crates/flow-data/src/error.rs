//! 데이터 계층 에러.

use flow_core::StorageError;
use thiserror::Error;

/// 데이터베이스 연결/마이그레이션 에러.
#[derive(Debug, Error)]
pub enum DataError {
    /// 연결 실패
    #[error("데이터베이스 연결 실패: {0}")]
    ConnectionError(String),

    /// 마이그레이션 실패
    #[error("마이그레이션 실패: {0}")]
    MigrationError(String),

    /// 쿼리 실패
    #[error("쿼리 실패: {0}")]
    QueryError(String),
}

impl From<DataError> for StorageError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::ConnectionError(msg) | DataError::MigrationError(msg) => {
                StorageError::Connection(msg)
            }
            DataError::QueryError(msg) => StorageError::Query(msg),
        }
    }
}

/// 데이터 계층 Result 타입 별칭.
pub type Result<T> = std::result::Result<T, DataError>;
