//! 저장소 오류 타입.

use thiserror::Error;

/// 저장소 관련 오류.
#[derive(Debug, Error)]
pub enum StorageError {
    /// 파일시스템 I/O 오류
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// 오브젝트를 찾을 수 없음
    #[error("Object not found: {0}")]
    NotFound(String),

    /// 사용할 수 없는 키 (절대 경로, `..` 세그먼트 등)
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 저장소가 쓰기를 거부함
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// 잘못된 입력 데이터
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    pub(crate) fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StorageError::NotFound(key.into());
        }
        StorageError::Io {
            key: key.into(),
            source,
        }
    }
}

/// 저장소 작업 Result 타입.
pub type StorageResult<T> = Result<T, StorageError>;
