//! 심볼 목록(유니버스) 로더.
//!
//! 한 줄에 하나의 심볼을 적은 텍스트 파일을 읽습니다.
//! 빈 줄과 `#` 주석은 무시하고, 쉼표로 구분된 행은 첫 컬럼만 사용합니다.

use ohlcv_core::Symbol;
use std::collections::HashSet;
use std::path::Path;

use crate::{StorageError, StorageResult};

/// 심볼 목록 텍스트를 파싱합니다.
///
/// 중복 심볼은 처음 나온 것만 유지합니다. 파싱할 수 없는 줄은 경고 후 건너뜁니다.
pub fn parse_symbol_list(text: &str, default_exchange: &str) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let field = line.split(',').next().unwrap_or(line).trim();

        match Symbol::parse_with_default(field, default_exchange) {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    symbols.push(symbol);
                } else {
                    tracing::debug!(symbol = %symbol, "중복 심볼 무시");
                }
            }
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "심볼 파싱 실패, 건너뜀");
            }
        }
    }

    symbols
}

/// 파일에서 심볼 목록을 읽습니다.
pub async fn load_symbols(path: &Path, default_exchange: &str) -> StorageResult<Vec<Symbol>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::io(path.to_string_lossy(), e))?;

    let symbols = parse_symbol_list(&text, default_exchange);
    tracing::info!(path = %path.display(), count = symbols.len(), "심볼 목록 로드 완료");
    Ok(symbols)
}
