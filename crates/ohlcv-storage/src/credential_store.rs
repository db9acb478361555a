//! 자격증명 시크릿 저장소.
//!
//! 자격증명 세트는 고정된 이름의 단일 레코드로 저장됩니다.
//! 토큰 갱신 후마다 `save`가 호출되며, `last_updated`는 호출자가 채웁니다.

use async_trait::async_trait;
use ohlcv_core::CredentialSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::{StorageError, StorageResult};

/// 자격증명 저장소 인터페이스.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 저장된 자격증명을 읽습니다.
    async fn load(&self) -> StorageResult<CredentialSet>;

    /// 자격증명을 기록합니다.
    async fn save(&self, credentials: &CredentialSet) -> StorageResult<()>;
}

/// JSON 파일 기반 자격증명 저장소.
///
/// 기록 시 파일에 있던 알 수 없는 필드는 보존합니다.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> StorageResult<CredentialSet> {
        let body = tokio::fs::read(&self.path)
            .await
            .map_err(|e| StorageError::io(self.key(), e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn save(&self, credentials: &CredentialSet) -> StorageResult<()> {
        let mut record = match tokio::fs::read(&self.path).await {
            Ok(body) => match serde_json::from_slice::<serde_json::Value>(&body) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(e) => return Err(StorageError::io(self.key(), e)),
        };

        let serde_json::Value::Object(fields) = serde_json::to_value(credentials)? else {
            return Err(StorageError::InvalidData(
                "자격증명이 JSON 객체로 직렬화되지 않음".to_string(),
            ));
        };
        record.extend(fields);

        let body = serde_json::to_vec_pretty(&serde_json::Value::Object(record))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::io(self.key(), e))?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StorageError::io(self.key(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::io(self.key(), e))?;

        tracing::debug!(path = %self.path.display(), "자격증명 저장 완료");
        Ok(())
    }
}

/// 인메모리 자격증명 저장소.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<CredentialSet>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new(credentials: CredentialSet) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            saves: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// 이후의 `save` 호출을 실패시킬지 설정합니다.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// 성공한 `save` 호출 수.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// 현재 저장된 값.
    pub async fn snapshot(&self) -> CredentialSet {
        self.credentials.read().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> StorageResult<CredentialSet> {
        Ok(self.credentials.read().await.clone())
    }

    async fn save(&self, credentials: &CredentialSet) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("credentials".to_string()));
        }
        *self.credentials.write().await = credentials.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
