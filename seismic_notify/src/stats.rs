// seismic_notify/src/stats.rs

//! 客户端运行计数。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// `NotifyClient::stats` 返回的计数快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    /// 成功解码并交给路由器的消息数 (包括没有订阅者的频道)。
    pub messages_dispatched: u64,
    pub decode_failures: u64,
    pub callback_failures: u64,
    /// 发起的连接尝试次数 (包括失败的)。
    pub connection_attempts: u64,
    /// 首次连接成功之后，再次连接成功的次数。
    pub reconnects: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    messages_dispatched: AtomicU64,
    decode_failures: AtomicU64,
    callback_failures: AtomicU64,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_dispatched(&self) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_failures(&self, count: usize) {
        self.callback_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        let established = self.connections_established.load(Ordering::Relaxed);
        ClientStats {
            messages_dispatched: self.messages_dispatched.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            reconnects: established.saturating_sub(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_connection_is_not_a_reconnect() {
        let counters = StatsCounters::default();
        assert_eq!(counters.snapshot(), ClientStats::default());

        counters.record_connection_attempt();
        counters.record_connection_established();
        assert_eq!(counters.snapshot().reconnects, 0);

        counters.record_connection_attempt();
        counters.record_connection_attempt();
        counters.record_connection_established();
        counters.record_callback_failures(2);
        let stats = counters.snapshot();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.connection_attempts, 3);
        assert_eq!(stats.callback_failures, 2);
    }
}
