// seismic_notify/src/router.rs

//! 频道路由器。
//!
//! 维护 "频道名 -> 订阅列表" 的映射，并把解码后的 `Envelope` 分发给对应频道的所有订阅者。
//!
//! 主要约束:
//! - 频道名精确匹配，不支持通配符。
//! - 同一频道内按订阅先后顺序同步调用回调。
//! - 某个回调返回错误或 panic 时只记录下来，不影响同一频道后续的订阅者。
//! - 每个订阅带有存活标志，取消订阅后即使分发已在进行中也不会再被调用。
//!
//! 路由器本身不加锁。客户端把它放在 `Mutex` 中，分发时先在锁内取出订阅快照
//! (`subscribers`)，释放锁之后再通过 `deliver` 调用回调，
//! 因此回调内部可以安全地再次订阅或取消订阅。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use notify_models::Envelope;
use uuid::Uuid;

use crate::error::{BoxError, CallbackError, NotifyError};

/// 订阅者回调。在连接监管任务中被同步调用，不应执行阻塞操作。
pub type SubscriberCallback = Arc<dyn Fn(&Envelope) -> Result<(), BoxError> + Send + Sync + 'static>;

/// `subscribe` 返回的句柄，用于之后取消订阅。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: Uuid,
    channel: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// 路由器内部的一条订阅记录。
pub struct Subscription {
    id: Uuid,
    callback: SubscriberCallback,
    live: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("live", &self.is_live()).finish()
    }
}

/// 单个回调的失败记录。
#[derive(Debug)]
pub struct CallbackFailure {
    pub subscription_id: Uuid,
    pub error: CallbackError,
}

/// 一次分发的结果。
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// 成功返回的回调数量。
    pub delivered: usize,
    /// 因为已取消订阅而被跳过的回调数量。
    pub skipped: usize,
    pub failures: Vec<CallbackFailure>,
}

impl DispatchReport {
    /// 没有任何订阅者被调用 (包括全部被跳过的情况)。
    pub fn is_unrouted(&self) -> bool {
        self.delivered == 0 && self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ChannelRouter {
    channels: HashMap<String, Vec<Arc<Subscription>>>,
    /// 订阅 id -> 频道名，用于取消订阅时直接定位。
    index: HashMap<Uuid, String>,
    /// 当前活跃频道，按激活先后排列。
    activation_order: Vec<String>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅。
    ///
    /// # 返回值
    /// * `Ok((handle, became_active))` - `became_active` 为 `true` 表示这是该频道的第一个订阅者。
    /// * `Err(NotifyError::InvalidChannel)` - 频道名为空。
    pub fn subscribe<F>(&mut self, channel: &str, callback: F) -> Result<(SubscriptionHandle, bool), NotifyError>
    where
        F: Fn(&Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe_arc(channel, Arc::new(callback))
    }

    pub fn subscribe_arc(
        &mut self,
        channel: &str,
        callback: SubscriberCallback,
    ) -> Result<(SubscriptionHandle, bool), NotifyError> {
        if channel.is_empty() {
            return Err(NotifyError::InvalidChannel(channel.to_string()));
        }
        let id = Uuid::new_v4();
        let subscription = Arc::new(Subscription { id, callback, live: AtomicBool::new(true) });

        let subscribers = self.channels.entry(channel.to_string()).or_default();
        let became_active = subscribers.is_empty();
        subscribers.push(subscription);
        self.index.insert(id, channel.to_string());
        if became_active {
            self.activation_order.push(channel.to_string());
            debug!("[频道路由] 频道 '{}' 变为活跃。", channel);
        }

        Ok((SubscriptionHandle { id, channel: channel.to_string() }, became_active))
    }

    /// 取消订阅。可重复调用，未知或已取消的句柄直接返回 `false`。
    ///
    /// 返回 `true` 表示移除的是该频道最后一个订阅者，频道变为非活跃。
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(channel) = self.index.remove(&handle.id) else {
            return false;
        };
        let Some(subscribers) = self.channels.get_mut(&channel) else {
            return false;
        };
        if let Some(position) = subscribers.iter().position(|s| s.id == handle.id) {
            let removed = subscribers.remove(position);
            removed.live.store(false, Ordering::Release);
        }

        if !subscribers.is_empty() {
            return false;
        }
        self.channels.remove(&channel);
        self.activation_order.retain(|active| active != &channel);
        debug!("[频道路由] 频道 '{}' 已无订阅者，变为非活跃。", channel);
        true
    }

    /// 取出某个频道当前订阅者的快照 (按订阅顺序)。
    pub fn subscribers(&self, channel: &str) -> Vec<Arc<Subscription>> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    /// 在当前线程上直接分发。
    ///
    /// 回调执行期间持有 `&self`，因此回调内无法修改这个路由器；
    /// 需要回调内订阅/取消订阅时，请使用 `subscribers` + `deliver`。
    pub fn dispatch(&self, envelope: &Envelope) -> DispatchReport {
        deliver(&self.subscribers(&envelope.channel), envelope)
    }

    pub fn is_active(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// 当前活跃频道，按激活先后排列。
    pub fn active_channels(&self) -> Vec<String> {
        self.activation_order.clone()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, Vec::len)
    }
}

/// 把一个 `Envelope` 依次交给快照中的订阅者。
///
/// 每次调用前都会重新检查存活标志，分发过程中被取消的订阅不会再被调用。
pub fn deliver(subscribers: &[Arc<Subscription>], envelope: &Envelope) -> DispatchReport {
    let mut report = DispatchReport::default();
    for subscription in subscribers {
        if !subscription.is_live() {
            report.skipped += 1;
            continue;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.callback)(envelope)));
        let error = match outcome {
            Ok(Ok(())) => {
                report.delivered += 1;
                continue;
            }
            Ok(Err(e)) => CallbackError::Failed(e),
            Err(payload) => CallbackError::Panicked(panic_message(payload.as_ref())),
        };
        debug!(
            "[频道路由] 频道 '{}' 的订阅者 {} 处理失败: {}",
            envelope.channel, subscription.id, error
        );
        report.failures.push(CallbackFailure { subscription_id: subscription.id, error });
    }
    report
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
