//! # OHLCV Core
//!
//! 가격 수집 파이프라인의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 심볼 및 타임프레임 정의
//! - 캔들, 원시 배치(RawBatch), 데드레터 레코드
//! - 자격증명 세트
//! - 집계 결과 행(ProcessedRow)
//! - 에러 분류 체계
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
