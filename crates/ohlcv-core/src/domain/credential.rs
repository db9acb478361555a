//! 업스트림 API 자격증명.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 업스트림 API 자격증명 세트.
///
/// 논리적으로 하나만 존재하며, 토큰 갱신 후마다 외부 시크릿 저장소에 기록됩니다.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// 마지막 갱신 시각 (RFC3339 또는 타임존 없는 ISO 형식 허용)
    #[serde(default, deserialize_with = "deserialize_lenient_datetime")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// 토큰 갱신에 필요한 필드가 모두 있는지 확인.
    pub fn is_refreshable(&self) -> bool {
        !self.client_id.is_empty() && !self.app_secret.is_empty() && !self.refresh_token.is_empty()
    }

    /// 갱신 요청에 쓰이는 앱 식별 해시 (`client_id:app_secret`의 SHA-256 hex).
    pub fn app_id_hash(&self) -> String {
        let digest = Sha256::digest(format!("{}:{}", self.client_id, self.app_secret).as_bytes());
        hex::encode(digest)
    }

    /// 요청 헤더용 인증 값 (`client_id:access_token`).
    pub fn authorization(&self) -> String {
        format!("{}:{}", self.client_id, self.access_token)
    }

    /// 새 토큰을 반영한 사본을 반환합니다.
    ///
    /// 응답에 새 리프레시 토큰이 없으면 기존 값을 유지합니다.
    pub fn with_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id: self.client_id.clone(),
            app_secret: self.app_secret.clone(),
            access_token,
            refresh_token: refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            last_updated: Some(now),
        }
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("client_id", &self.client_id)
            .field("app_secret", &redact(&self.app_secret))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

fn deserialize_lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CredentialSet {
        CredentialSet {
            client_id: "APP-100".to_string(),
            app_secret: "secret".to_string(),
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            last_updated: None,
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let text = format!("{:?}", sample());
        assert!(text.contains("APP-100"));
        assert!(!text.contains("access-1"));
        assert!(!text.contains("refresh-1"));
        assert!(!text.contains("\"secret\""));
    }

    #[test]
    fn test_app_id_hash_is_sha256_hex() {
        let hash = sample().app_id_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, sample().app_id_hash());
    }

    #[test]
    fn test_with_tokens_keeps_refresh_token_when_absent() {
        let now = Utc::now();
        let updated = sample().with_tokens("access-2".to_string(), None, now);
        assert_eq!(updated.access_token, "access-2");
        assert_eq!(updated.refresh_token, "refresh-1");
        assert_eq!(updated.last_updated, Some(now));
    }

    #[test]
    fn test_deserialize_naive_last_updated() {
        let json = r#"{
            "client_id": "APP-100",
            "app_secret": "secret",
            "access_token": "a",
            "refresh_token": "r",
            "last_updated": "2024-01-02T08:30:15.123456"
        }"#;
        let creds: CredentialSet = serde_json::from_str(json).unwrap();
        assert!(creds.last_updated.is_some());
        assert!(creds.is_refreshable());
    }

    #[test]
    fn test_missing_fields_not_refreshable() {
        let creds: CredentialSet = serde_json::from_str(r#"{"access_token": "a"}"#).unwrap();
        assert!(!creds.is_refreshable());
        assert_eq!(creds.last_updated, None);
    }
}
