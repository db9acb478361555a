//! 업스트림 시장 데이터 API 클라이언트.
//!
//! 처리 기능:
//! - 1분봉 이력 조회 (GET `history_url`)
//! - 리프레시 토큰으로 접근 토큰 재발급 (POST `refresh_url`)
//!
//! 응답 분류는 `classify_response`에 모여 있으며 네트워크 없이 테스트할 수 있습니다.

use async_trait::async_trait;
use ohlcv_core::{CredentialSet, FetchUnit, HistoryPayload};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::credentials::{AccessToken, RefreshedTokens, TokenRefresher};
use crate::error::{FetchError, IngestError, RefreshError};
use crate::fetcher::HistorySource;

/// 기본 이력 조회 엔드포인트.
pub const DEFAULT_HISTORY_URL: &str = "https://api-t1.fyers.in/data/history";

/// 기본 토큰 갱신 엔드포인트.
pub const DEFAULT_REFRESH_URL: &str = "https://api-t1.fyers.in/api/v3/validate-refresh-token";

/// 인증 실패를 뜻하는 API 에러 코드.
const AUTH_ERROR_CODES: [i64; 4] = [-8, -15, -16, -17];

/// 요청 한도 초과 API 에러 코드.
const RATE_LIMIT_ERROR_CODE: i64 = -429;

/// 잘못된 심볼 API 에러 코드.
const INVALID_SYMBOL_ERROR_CODE: i64 = -300;

/// 에러 본문 미리보기 최대 길이.
const BODY_PREVIEW_LEN: usize = 200;

/// 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct FyersClientConfig {
    pub history_url: String,
    pub refresh_url: String,
    /// 요청 타임아웃
    pub timeout: Duration,
}

impl Default for FyersClientConfig {
    fn default() -> Self {
        Self {
            history_url: DEFAULT_HISTORY_URL.to_string(),
            refresh_url: DEFAULT_REFRESH_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// 이력 응답 본문.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    s: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    candles: Vec<Vec<f64>>,
}

/// 토큰 갱신 요청 본문.
#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    #[serde(rename = "appIdHash")]
    app_id_hash: String,
    refresh_token: &'a str,
}

/// 토큰 갱신 응답 본문.
#[derive(Deserialize)]
struct RefreshResponse {
    s: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// 업스트림 API 클라이언트.
#[derive(Debug, Clone)]
pub struct FyersClient {
    client: Client,
    config: FyersClientConfig,
}

impl FyersClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `IngestError::Client`를 반환합니다.
    pub fn new(config: FyersClientConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Client(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FyersClientConfig {
        &self.config
    }
}

#[async_trait]
impl HistorySource for FyersClient {
    async fn fetch_history(
        &self,
        unit: &FetchUnit,
        token: &AccessToken,
    ) -> Result<HistoryPayload, FetchError> {
        let query = [
            ("symbol", unit.symbol.api_symbol()),
            ("resolution", "1".to_string()),
            ("date_format", "1".to_string()),
            ("range_from", unit.range_from.format("%Y-%m-%d").to_string()),
            ("range_to", unit.range_to.format("%Y-%m-%d").to_string()),
            ("cont_flag", "1".to_string()),
        ];

        let response = self
            .client
            .get(&self.config.history_url)
            .header(AUTHORIZATION, token.authorization())
            .query(&query)
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await?;

        classify_response(status, retry_after, &body)
    }
}

#[async_trait]
impl TokenRefresher for FyersClient {
    async fn refresh(&self, credentials: &CredentialSet) -> Result<RefreshedTokens, RefreshError> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            app_id_hash: credentials.app_id_hash(),
            refresh_token: &credentials.refresh_token,
        };

        let response = self
            .client
            .post(&self.config.refresh_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RefreshError::Rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                preview(&body)
            )));
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| RefreshError::Request(format!("응답 해석 실패: {}", e)))?;

        match parsed.access_token {
            Some(access_token) if parsed.s == "ok" && !access_token.is_empty() => {
                Ok(RefreshedTokens {
                    access_token,
                    refresh_token: parsed.refresh_token,
                })
            }
            _ => Err(RefreshError::Rejected(format!(
                "s={}, message={}",
                parsed.s,
                parsed.message.unwrap_or_default()
            ))),
        }
    }
}

/// `Retry-After` 헤더 (초 단위, 소수 허용).
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    // 음수, NaN, Duration 범위를 넘는 값은 무시
    Duration::try_from_secs_f64(secs).ok()
}

/// HTTP 상태, `Retry-After`, 본문으로 응답을 분류합니다.
pub fn classify_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<HistoryPayload, FetchError> {
    match status {
        200..=299 => {
            let parsed: HistoryResponse = serde_json::from_str(body).map_err(|e| {
                FetchError::Transient(format!("응답 해석 실패: {} ({})", e, preview(body)))
            })?;
            match parsed.s.as_str() {
                "ok" | "no_data" => Ok(HistoryPayload {
                    candles: parsed.candles,
                }),
                "error" => Err(classify_api_error(
                    parsed.code,
                    parsed.message.as_deref().unwrap_or_default(),
                    retry_after,
                )),
                other => Err(FetchError::Transient(format!("알 수 없는 상태: s={}", other))),
            }
        }
        429 => Err(FetchError::RateLimited {
            detail: format!("HTTP 429: {}", preview(body)),
            retry_after,
        }),
        401 | 403 => Err(FetchError::AuthExpired(format!(
            "HTTP {}: {}",
            status,
            preview(body)
        ))),
        500..=599 => Err(FetchError::ServerError {
            detail: format!("HTTP {}: {}", status, preview(body)),
            retry_after,
        }),
        408 => Err(FetchError::Transient(format!("HTTP 408: {}", preview(body)))),
        400..=499 => {
            // 4xx 본문에 인증 에러 코드가 실려 오는 경우
            if let Ok(parsed) = serde_json::from_str::<HistoryResponse>(body) {
                let message = parsed.message.as_deref().unwrap_or_default();
                if is_auth_error(parsed.code, message) {
                    return Err(FetchError::AuthExpired(format!("HTTP {}: {}", status, message)));
                }
            }
            Err(FetchError::Permanent(format!(
                "HTTP {}: {}",
                status,
                preview(body)
            )))
        }
        _ => Err(FetchError::Transient(format!(
            "HTTP {}: {}",
            status,
            preview(body)
        ))),
    }
}

fn classify_api_error(code: Option<i64>, message: &str, retry_after: Option<Duration>) -> FetchError {
    let detail = match code {
        Some(code) => format!("code={}, message={}", code, message),
        None => format!("message={}", message),
    };

    if is_auth_error(code, message) {
        return FetchError::AuthExpired(detail);
    }
    if code == Some(RATE_LIMIT_ERROR_CODE) || message.to_lowercase().contains("limit") {
        return FetchError::RateLimited {
            detail,
            retry_after,
        };
    }
    if code == Some(INVALID_SYMBOL_ERROR_CODE) || message.to_lowercase().contains("invalid symbol")
    {
        return FetchError::Permanent(detail);
    }
    FetchError::Transient(detail)
}

fn is_auth_error(code: Option<i64>, message: &str) -> bool {
    if code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c)) {
        return true;
    }
    let message = message.to_lowercase();
    message.contains("token") || message.contains("auth")
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
