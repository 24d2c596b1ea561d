//! 按用户分桶的固定窗口限流器，由调用方注入并管理生命周期。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

const TARGET: &str = "rate_limiter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started_at: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn try_acquire(&self, key: &str) -> RateDecision {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|err| err.into_inner());
        let state = windows.entry(key.to_string()).or_insert(WindowState {
            started_at: now,
            count: 0,
        });

        if now.saturating_duration_since(state.started_at) >= self.config.window {
            state.started_at = now;
            state.count = 0;
        }

        if state.count >= self.config.max_requests {
            let retry_after = self
                .config
                .window
                .saturating_sub(now.saturating_duration_since(state.started_at));
            debug!(target: TARGET, key, ?retry_after, "request limited");
            return RateDecision::Limited { retry_after };
        }

        state.count += 1;
        RateDecision::Allowed {
            remaining: self.config.max_requests - state.count,
        }
    }

    /// 清理已过期的窗口，返回清理数量。
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let mut windows = self.windows.lock().unwrap_or_else(|err| err.into_inner());
        let before = windows.len();
        windows.retain(|_, state| now.saturating_duration_since(state.started_at) < window);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    /// 周期性清理任务；限流器被释放后任务自行退出。
    pub fn spawn_janitor(limiter: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                let purged = limiter.purge_expired();
                if purged > 0 {
                    debug!(target: TARGET, purged, "purged expired rate windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn limits_after_max_requests_within_window() {
        let limiter = limiter(2, 60);

        assert_eq!(
            limiter.try_acquire("user:a"),
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.try_acquire("user:a"),
            RateDecision::Allowed { remaining: 0 }
        );
        assert!(!limiter.try_acquire("user:a").is_allowed());
        assert!(limiter.try_acquire("user:b").is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = limiter(1, 10);

        assert!(limiter.try_acquire("user:a").is_allowed());
        match limiter.try_acquire("user:a") {
            RateDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(10))
            }
            other => panic!("unexpected decision: {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.try_acquire("user:a").is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_windows() {
        let limiter = limiter(5, 10);
        limiter.try_acquire("user:old");
        tokio::time::advance(Duration::from_secs(6)).await;
        limiter.try_acquire("user:new");
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_stops_when_limiter_dropped() {
        let limiter = Arc::new(limiter(5, 1));
        limiter.try_acquire("user:a");
        let janitor = RateLimiter::spawn_janitor(&limiter, Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(limiter.tracked_keys(), 0);

        drop(limiter);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(janitor.is_finished());
    }
}
