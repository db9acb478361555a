//! 이중 슬라이딩 윈도우 요청 제한기.
//!
//! 업스트림 API는 초당/분당 요청 수를 동시에 제한합니다.
//! 최근 1초와 최근 60초 동안 허가된 요청 시각을 각각 기록하고,
//! 두 윈도우 모두 여유가 있을 때만 다음 요청을 허가합니다.
//!
//! 대기자는 도착 순서대로 처리됩니다 (`tokio::sync::Mutex`는 FIFO 공정성 보장).
//! 맨 앞 대기자가 잠금을 쥔 채 다음 빈 슬롯까지 잠들기 때문에 뒤 대기자가 추월하지 않습니다.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 1초 윈도우.
const SECOND_WINDOW: Duration = Duration::from_secs(1);

/// 60초 윈도우.
const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// 요청 제한 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// 임의의 1초 구간 내 최대 요청 수
    pub max_per_sec: u32,
    /// 임의의 60초 구간 내 최대 요청 수
    pub max_per_min: u32,
}

impl RateLimiterConfig {
    /// 새 설정. 0은 1로 보정합니다.
    pub fn new(max_per_sec: u32, max_per_min: u32) -> Self {
        Self {
            max_per_sec: max_per_sec.max(1),
            max_per_min: max_per_min.max(1),
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(9, 180)
    }
}

/// 요청 허가.
#[derive(Debug, Clone, Copy)]
pub struct RatePermit {
    /// 허가 시각
    pub granted_at: Instant,
    /// 허가까지 대기한 시간
    pub waited: Duration,
}

#[derive(Debug, Default)]
struct Windows {
    second: VecDeque<Instant>,
    minute: VecDeque<Instant>,
}

impl Windows {
    fn evict(&mut self, now: Instant) {
        evict_older(&mut self.second, now, SECOND_WINDOW);
        evict_older(&mut self.minute, now, MINUTE_WINDOW);
    }

    /// 허가 가능하면 `None`, 아니면 다음으로 확인할 시각.
    fn next_slot(&self, config: &RateLimiterConfig) -> Option<Instant> {
        let mut wake: Option<Instant> = None;

        if self.second.len() >= config.max_per_sec as usize {
            if let Some(oldest) = self.second.front() {
                wake = Some(*oldest + SECOND_WINDOW);
            }
        }
        if self.minute.len() >= config.max_per_min as usize {
            if let Some(oldest) = self.minute.front() {
                let candidate = *oldest + MINUTE_WINDOW;
                wake = Some(wake.map_or(candidate, |w| w.max(candidate)));
            }
        }

        wake
    }

    fn record(&mut self, now: Instant) {
        self.second.push_back(now);
        self.minute.push_back(now);
    }
}

fn evict_older(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if *oldest + window <= now {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// 프로세스 전역 요청 제한기.
///
/// 모든 워커가 `Arc`로 공유합니다. 실행 간 상태는 유지하지 않습니다.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    /// 새 제한기 생성.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// 설정 조회.
    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// 요청 하나를 보낼 수 있을 때까지 대기합니다.
    ///
    /// 바쁜 대기 없이 다음 슬롯이 열리는 시각까지 잠듭니다.
    /// 최악의 대기 시간은 60초 윈도우가 비는 시간으로 제한됩니다.
    pub async fn acquire(&self) -> RatePermit {
        let requested = Instant::now();
        let mut windows = self.windows.lock().await;

        loop {
            let now = Instant::now();
            windows.evict(now);

            match windows.next_slot(&self.config) {
                None => {
                    windows.record(now);
                    let waited = now.saturating_duration_since(requested);
                    if waited >= Duration::from_millis(500) {
                        tracing::debug!(waited_ms = waited.as_millis() as u64, "요청 제한 대기");
                    }
                    return RatePermit {
                        granted_at: now,
                        waited,
                    };
                }
                Some(wake) => tokio::time::sleep_until(wake).await,
            }
        }
    }

    /// 현재 (1초, 60초) 윈도우 점유 수.
    pub async fn in_flight_window(&self) -> (usize, usize) {
        let mut windows = self.windows.lock().await;
        windows.evict(Instant::now());
        (windows.second.len(), windows.minute.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn grant_times(limiter: Arc<RateLimiter>, n: usize) -> Vec<Instant> {
        let mut handles = Vec::new();
        for _ in 0..n {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await.granted_at }));
        }
        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();
        times
    }

    fn max_in_window(times: &[Instant], window: Duration) -> usize {
        times
            .iter()
            .map(|start| {
                times
                    .iter()
                    .filter(|t| **t >= *start && **t < *start + window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_per_second_limit() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::new(9, 1000)));
        let times = grant_times(limiter, 40).await;

        assert_eq!(times.len(), 40);
        assert!(max_in_window(&times, SECOND_WINDOW) <= 9);
        // 40개는 최소 4번의 1초 경계를 넘어야 함
        assert!(times[39] - times[0] >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_per_minute_limit() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::new(9, 180)));
        let times = grant_times(limiter, 200).await;

        assert!(max_in_window(&times, SECOND_WINDOW) <= 9);
        assert!(max_in_window(&times, MINUTE_WINDOW) <= 180);
        assert!(times[180] - times[0] >= MINUTE_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_window_blocks_until_oldest_expires() {
        let limiter = RateLimiter::new(RateLimiterConfig::new(5, 3));
        let first = limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight_window().await, (3, 3));

        let fourth = limiter.acquire().await;
        assert_eq!(fourth.granted_at - first.granted_at, MINUTE_WINDOW);
        assert!(fourth.waited >= Duration::from_secs(59));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::new(1, 100)));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                order.lock().await.push(i);
            }));
            // 도착 순서 고정
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_limits_are_clamped() {
        let config = RateLimiterConfig::new(0, 0);
        assert_eq!(config.max_per_sec, 1);
        assert_eq!(config.max_per_min, 1);
    }
}
