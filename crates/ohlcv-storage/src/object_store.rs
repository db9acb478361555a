//! 키-바이트 오브젝트 저장소.
//!
//! 원시 배치, 데드레터, 집계 parquet 파일이 모두 이 경계를 통해 기록됩니다.
//! 키는 `/`로 구분된 상대 경로입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::{StorageError, StorageResult};

/// 임시 파일 접미사 (원자적 쓰기용, 목록에서 제외).
const TMP_SUFFIX: &str = ".tmp";

/// 오브젝트 메타데이터.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// 오브젝트 키
    pub key: String,
    /// 바이트 크기
    pub size: u64,
    /// 마지막 수정 시각
    pub last_modified: Option<DateTime<Utc>>,
}

/// 오브젝트 저장소 인터페이스.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 오브젝트를 기록합니다. 같은 키가 있으면 덮어씁니다.
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()>;

    /// 오브젝트를 읽습니다.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// `prefix`로 시작하는 오브젝트를 키 순서로 나열합니다.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectMeta>>;

    /// `prefix`로 시작하는 오브젝트를 모두 삭제하고 삭제 수를 반환합니다.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<usize>;
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// 로컬 파일시스템 기반 오브젝트 저장소.
///
/// 쓰기는 임시 파일에 기록한 뒤 rename 하므로 부분 기록된 오브젝트가 노출되지 않습니다.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// 루트 디렉토리를 지정해 생성합니다.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 루트 디렉토리.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::io(key, e))?;

        tracing::trace!(key, bytes = body.len(), "오브젝트 기록");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(key, e))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectMeta>> {
        // prefix의 디렉토리 부분부터 탐색
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.path_for(dir_part)?
        };

        let mut objects = Vec::new();
        let mut pending = vec![start];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(dir.to_string_lossy(), e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(dir.to_string_lossy(), e))?
            {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|e| StorageError::io(path.to_string_lossy(), e))?;

                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if key.ends_with(TMP_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }

                objects.push(ObjectMeta {
                    key,
                    size: metadata.len(),
                    last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let objects = self.list(prefix).await?;
        for object in &objects {
            let path = self.path_for(&object.key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(object.key.clone(), e)),
            }
        }
        Ok(objects.len())
    }
}

/// 인메모리 오브젝트 저장소.
///
/// 테스트와 드라이런 실행에 사용합니다.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    reject_prefix: Option<String>,
    unreadable_prefix: Option<String>,
}

impl MemoryObjectStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `prefix`로 시작하는 키에 대한 쓰기를 거부하는 저장소를 생성합니다.
    pub fn rejecting_writes_under(prefix: impl Into<String>) -> Self {
        Self {
            reject_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// `prefix`로 시작하는 키의 읽기를 I/O 오류로 실패시킵니다.
    pub fn failing_reads_under(mut self, prefix: impl Into<String>) -> Self {
        self.unreadable_prefix = Some(prefix.into());
        self
    }

    /// 저장된 키 목록.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// 저장된 오브젝트 수.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// 비어 있는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> StorageResult<()> {
        validate_key(key)?;
        if let Some(prefix) = &self.reject_prefix {
            if key.starts_with(prefix.as_str()) {
                return Err(StorageError::WriteRejected(key.to_string()));
            }
        }
        self.objects
            .write()
            .await
            .insert(key.to_string(), (body, Utc::now()));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        if let Some(prefix) = &self.unreadable_prefix {
            if key.starts_with(prefix.as_str()) {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("read failed"),
                });
            }
        }
        self.objects
            .read()
            .await
            .get(key)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectMeta>> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (body, modified))| ObjectMeta {
                key: key.clone(),
                size: body.len() as u64,
                last_modified: Some(*modified),
            })
            .collect())
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }
}
