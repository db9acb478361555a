//! 원시/집계 데이터와 자격증명의 외부 저장소 경계.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - ObjectStore trait: 키-바이트 오브젝트 저장소 (로컬 파일시스템, 인메모리)
//! - CredentialStore trait: 단일 레코드 시크릿 저장소 (JSON 파일, 인메모리)
//! - 원시/데드레터/집계 경로 규칙
//! - 심볼 목록 로더

pub mod credential_store;
pub mod error;
pub mod layout;
pub mod object_store;
pub mod symbols;

pub use credential_store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{StorageError, StorageResult};
pub use layout::{PartitionDate, ProcessedPartition, RawObjectKey, StorageLayout};
pub use object_store::{LocalObjectStore, MemoryObjectStore, ObjectMeta, ObjectStore};
pub use symbols::{load_symbols, parse_symbol_list};
