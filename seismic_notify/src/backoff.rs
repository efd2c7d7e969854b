// seismic_notify/src/backoff.rs

//! 重连退避计算。
//!
//! 第 n 次失败后的等待时间为 `base * multiplier^n`，叠加最多 `jitter` 比例的向上随机抖动，
//! 再截断到上限。返回的序列保证单调不减且永不超过上限。
//!
//! 连接打开本身不代表恢复: 服务端可能接受后立刻断开。只有连接保持了至少 `stable_after`
//! 才从头开始计算 (见 `record_session`)，否则延迟继续增长。

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: f64,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    stable_after: Duration,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base_ms: config.base_delay_ms as f64,
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
            jitter: config.jitter.clamp(0.0, 1.0),
            stable_after: Duration::from_millis(config.stable_after_ms),
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    /// 计算下一次重连前的等待时间，并推进内部计数。
    pub fn next_delay(&mut self) -> Duration {
        let max_ms = self.max.as_millis() as f64;
        let exponential = self.base_ms * self.multiplier.powi(self.attempt.min(i32::MAX as u32) as i32);
        let mut candidate = exponential.min(max_ms);
        if self.jitter > 0.0 {
            let factor: f64 = rand::thread_rng().gen_range(0.0..=self.jitter);
            candidate = (candidate * (1.0 + factor)).min(max_ms);
        }

        // 抖动可能让本次比上次小，按上次结果兜底以保持单调
        let delay = Duration::from_millis(candidate as u64).max(self.last).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// 一条已打开的连接结束后调用。保持时间达到 `stable_after` 时重置，返回是否重置。
    pub fn record_session(&mut self, uptime: Duration) -> bool {
        if uptime < self.stable_after {
            return false;
        }
        self.reset();
        true
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }

    /// 自上次重置以来已经计算过的等待次数。
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64, multiplier: f64, jitter: f64) -> ReconnectConfig {
        ReconnectConfig { base_delay_ms: base, max_delay_ms: max, multiplier, jitter, ..ReconnectConfig::default() }
    }

    #[test]
    fn test_without_jitter_doubles_until_cap() {
        let mut backoff = Backoff::new(&config(100, 1_000, 2.0, 0.0));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000, 1_000]);
        assert_eq!(backoff.attempts(), 7);
    }

    #[test]
    fn test_with_jitter_is_monotonic_and_capped() {
        for _ in 0..50 {
            let mut backoff = Backoff::new(&config(50, 3_000, 1.5, 0.25));
            let mut previous = Duration::ZERO;
            for attempt in 0..200 {
                let delay = backoff.next_delay();
                assert!(delay >= previous, "第 {} 次退避变短了: {:?} < {:?}", attempt, delay, previous);
                assert!(delay <= Duration::from_millis(3_000), "退避超过上限: {:?}", delay);
                previous = delay;
            }
            assert_eq!(previous, Duration::from_millis(3_000), "足够多次之后应停在上限");
        }
    }

    #[test]
    fn test_first_delay_stays_within_jitter_band() {
        for _ in 0..100 {
            let mut backoff = Backoff::new(&config(1_000, 30_000, 2.0, 0.25));
            let first = backoff.next_delay();
            assert!(first >= Duration::from_millis(1_000));
            assert!(first <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new(&config(10, 10_000, 2.0, 0.0));
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(320));
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_short_sessions_keep_growing() {
        let mut backoff = Backoff::new(&ReconnectConfig { stable_after_ms: 1_000, ..config(10, 10_000, 2.0, 0.0) });
        let mut delays = Vec::new();
        for _ in 0..4 {
            // 接受后立即断开的连接不算恢复
            assert!(!backoff.record_session(Duration::from_millis(5)));
            delays.push(backoff.next_delay().as_millis() as u64);
        }
        assert_eq!(delays, vec![10, 20, 40, 80]);

        assert!(backoff.record_session(Duration::from_secs(2)));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }
}
