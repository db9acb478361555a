//! 심볼 정의.
//!
//! 업스트림 API는 `거래소:티커` 형식(예: `NSE:TCS-EQ`)으로 상품을 식별합니다.
//! 이 모듈은 해당 식별자를 파싱하고 오브젝트 키에 안전한 형태로 변환합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// 거래소 접두어가 없는 심볼에 적용되는 기본 거래소.
pub const DEFAULT_EXCHANGE: &str = "NSE";

/// 거래소와 티커로 구성된 수집 대상 심볼.
///
/// 생성 후 변경되지 않으며, 심볼 목록 파일에서 한 줄당 하나씩 읽어옵니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    /// 거래소 코드 (예: NSE, BSE)
    pub exchange: String,
    /// 거래소 내 티커 (예: TCS-EQ)
    pub ticker: String,
}

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(exchange: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into().trim().to_uppercase(),
            ticker: ticker.into().trim().to_string(),
        }
    }

    /// 거래소 접두어가 없으면 `default_exchange`를 사용해 파싱합니다.
    pub fn parse_with_default(s: &str, default_exchange: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidSymbol("빈 심볼".to_string()));
        }

        let (exchange, ticker) = match s.split_once(':') {
            Some((exchange, ticker)) => (exchange, ticker),
            None => (default_exchange, s),
        };

        if exchange.trim().is_empty() || ticker.trim().is_empty() {
            return Err(CoreError::InvalidSymbol(s.to_string()));
        }

        Ok(Self::new(exchange, ticker))
    }

    /// 업스트림 API 요청에 사용하는 식별자 (`NSE:TCS-EQ`).
    pub fn api_symbol(&self) -> String {
        format!("{}:{}", self.exchange, self.ticker)
    }

    /// 오브젝트 키에 안전한 형태 (`:`와 `/`를 `_`로 치환).
    pub fn path_key(&self) -> String {
        sanitize_key(&self.api_symbol())
    }
}

/// 오브젝트 키 세그먼트로 쓸 수 없는 문자를 치환합니다.
pub fn sanitize_key(value: &str) -> String {
    value.replace([':', '/'], "_")
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.ticker)
    }
}

impl FromStr for Symbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_EXCHANGE)
    }
}

impl TryFrom<String> for Symbol {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}
