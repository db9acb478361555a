//! 수집/집계 운영을 위한 도메인 모델.

mod batch;
mod candle;
mod credential;
mod dead_letter;
mod processed;

pub use batch::*;
pub use candle::*;
pub use credential::*;
pub use dead_letter::*;
pub use processed::*;
