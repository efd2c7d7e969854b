// seismic_notify/src/ws_client/supervisor.rs

//! 连接监管任务。
//!
//! 每个 `NotifyClient` 对应一个监管任务，它独占唯一的传输连接，按以下状态机运转:
//!
//! ```text
//! Disconnected -> Connecting -(Opened)-> Connected -(Closed)-> Reconnecting -(退避结束)-> Connecting
//!                 Connecting -(失败/超时)-> Reconnecting
//! 任意状态 -(shutdown)-> Closed
//! ```
//!
//! 所有入站消息的解码和分发都在这个任务里顺序完成，因此同一频道的消息按到达顺序交付，
//! 同一个回调也不会被并发调用。每次连接打开时，监管任务会为路由器中当前活跃的每个频道
//! 恰好发送一次加入帧；连接期间新激活的频道立即加入，变为非活跃的频道立即离开。
//!
//! 遥测接收方与订阅回调一样由调用方提供，它的 panic 被捕获并记录，不会终止监管任务。

use std::collections::HashSet;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use notify_models::{CloseReason, ConnectionState, ConnectionStatusEvent, Envelope};
use notify_transport::codec;
use notify_transport::{ConnectOptions, TransportConnection, TransportEvent, TransportSender};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use url::Url;

use crate::backoff::Backoff;
use crate::event::TelemetrySink;
use crate::protocol::ChannelProtocol;
use crate::router::{self, ChannelRouter};
use crate::stats::StatsCounters;

/// 关闭时等待传输层确认 `Closed` 的最长时间。
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 客户端句柄与监管任务共享的状态。
pub(crate) struct Shared {
    pub(crate) router: Mutex<ChannelRouter>,
    /// 当前连接的发送端，仅在 Connected 期间为 `Some`。
    pub(crate) sender: Mutex<Option<TransportSender>>,
    pub(crate) stats: StatsCounters,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
}

impl Shared {
    pub(crate) fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            router: Mutex::new(ChannelRouter::new()),
            sender: Mutex::new(None),
            stats: StatsCounters::default(),
            telemetry,
        }
    }
}

/// 锁内从不调用用户回调，中毒时直接取回数据继续使用。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 客户端句柄发给监管任务的指令。
#[derive(Debug)]
pub(crate) enum Command {
    /// 频道变为活跃 (第一个订阅者出现)。
    Activate(String),
    /// 频道变为非活跃 (最后一个订阅者离开)。
    Deactivate(String),
    /// 关闭客户端；可选的应答在状态变为 Closed 后发出。
    Shutdown(Option<oneshot::Sender<()>>),
}

enum Wait<T> {
    Ready(T),
    Shutdown(Option<oneshot::Sender<()>>),
}

enum SessionEnd {
    Dropped(CloseReason),
    Shutdown(Option<oneshot::Sender<()>>),
}

pub(crate) struct Supervisor {
    endpoint: Url,
    options: ConnectOptions,
    backoff: Backoff,
    protocol: Arc<dyn ChannelProtocol>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    /// 当前连接上已经发送过加入帧的频道。
    joined: HashSet<String>,
    /// 当前连接收到 Opened 的时刻，连接结束时据此判断是否重置退避。
    opened_at: Option<Instant>,
}

impl Supervisor {
    pub(crate) fn new(
        endpoint: Url,
        options: ConnectOptions,
        backoff: Backoff,
        protocol: Arc<dyn ChannelProtocol>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            endpoint,
            options,
            backoff,
            protocol,
            shared,
            commands,
            state_tx,
            joined: HashSet::new(),
            opened_at: None,
        }
    }

    /// 监管主循环，直到收到关闭指令 (或所有客户端句柄都已释放) 才返回。
    pub(crate) async fn run(mut self) {
        info!("[连接监管] 启动，通知端点: {}", self.endpoint);
        loop {
            self.set_state(ConnectionState::Connecting, None);
            self.shared.stats.record_connection_attempt();

            let endpoint = self.endpoint.clone();
            let options = self.options.clone();
            let attempt = match self.until_shutdown(TransportConnection::open(&endpoint, &options)).await {
                Wait::Ready(result) => result,
                Wait::Shutdown(ack) => return self.finish(ack),
            };

            let detail = match attempt {
                Ok((connection, events)) => match self.run_session(connection, events).await {
                    SessionEnd::Dropped(reason) => reason.to_string(),
                    SessionEnd::Shutdown(ack) => return self.finish(ack),
                },
                Err(e) => e.to_string(),
            };

            self.set_state(ConnectionState::Reconnecting, Some(detail));
            let delay = self.backoff.next_delay();
            info!(
                "[连接监管] 将在 {:?} 后进行第 {} 次重连。",
                delay,
                self.backoff.attempts()
            );
            if let Wait::Shutdown(ack) = self.until_shutdown(tokio::time::sleep(delay)).await {
                return self.finish(ack);
            }
        }
    }

    /// 等待 `future` 完成，期间只响应关闭指令。
    ///
    /// 没有可用连接时频道的激活/失活不需要立即处理，下次连接打开时会按路由器状态统一重放。
    async fn until_shutdown<F: Future>(&mut self, future: F) -> Wait<F::Output> {
        tokio::pin!(future);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(ack)) => return Wait::Shutdown(ack),
                    None => return Wait::Shutdown(None),
                    Some(other) => debug!("[连接监管] 当前没有可用连接，暂不处理指令 {:?}", other),
                },
                output = &mut future => return Wait::Ready(output),
            }
        }
    }

    /// 驱动一条已建立的连接，直到连接关闭或收到关闭指令。
    async fn run_session(
        &mut self,
        connection: TransportConnection,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Activate(channel)) => self.activate(&connection, &channel),
                    Some(Command::Deactivate(channel)) => self.deactivate(&connection, &channel),
                    Some(Command::Shutdown(ack)) => {
                        self.close_session(&connection, &mut events).await;
                        return SessionEnd::Shutdown(ack);
                    }
                    None => {
                        self.close_session(&connection, &mut events).await;
                        return SessionEnd::Shutdown(None);
                    }
                },
                event = events.recv() => match event {
                    Some(TransportEvent::Opened) => self.on_opened(&connection),
                    Some(TransportEvent::Message(raw)) => self.on_message(&raw),
                    Some(TransportEvent::Closed(reason)) => {
                        debug!("[连接监管] 连接 {} 已断开: {}", connection.id(), reason);
                        self.end_session();
                        return SessionEnd::Dropped(reason);
                    }
                    None => {
                        self.end_session();
                        return SessionEnd::Dropped(CloseReason::Failure("传输事件流意外结束".to_string()));
                    }
                },
            }
        }
    }

    fn on_opened(&mut self, connection: &TransportConnection) {
        self.opened_at = Some(Instant::now());
        self.joined.clear();
        self.shared.stats.record_connection_established();
        *lock(&self.shared.sender) = Some(connection.sender());

        let channels = lock(&self.shared.router).active_channels();
        info!(
            "[连接监管] 连接 {} 已打开，重放 {} 个活跃频道的加入。",
            connection.id(),
            channels.len()
        );
        for channel in &channels {
            self.join(connection, channel);
        }
        self.set_state(ConnectionState::Connected, None);
    }

    fn activate(&mut self, connection: &TransportConnection, channel: &str) {
        // 连接尚未打开时跳过，Opened 时的重放会覆盖
        if self.opened_at.is_none() {
            return;
        }
        if !lock(&self.shared.router).is_active(channel) {
            return;
        }
        self.join(connection, channel);
    }

    fn deactivate(&mut self, connection: &TransportConnection, channel: &str) {
        if self.opened_at.is_none() {
            return;
        }
        // 指令排队期间可能又有新的订阅者
        if lock(&self.shared.router).is_active(channel) {
            return;
        }
        if !self.joined.remove(channel) {
            return;
        }
        if let Some(frame) = self.protocol.leave_frame(channel) {
            match connection.send(frame) {
                Ok(()) => debug!("[连接监管] 已发送离开频道 '{}' 的帧。", channel),
                Err(e) => warn!("[连接监管] 发送离开频道 '{}' 的帧失败: {}", channel, e),
            }
        }
    }

    fn join(&mut self, connection: &TransportConnection, channel: &str) {
        if !self.joined.insert(channel.to_string()) {
            return;
        }
        if let Some(frame) = self.protocol.join_frame(channel) {
            match connection.send(frame) {
                Ok(()) => debug!("[连接监管] 已发送加入频道 '{}' 的帧。", channel),
                Err(e) => warn!("[连接监管] 发送加入频道 '{}' 的帧失败: {}", channel, e),
            }
        }
    }

    fn on_message(&self, raw: &str) {
        for decoded in codec::decode_frame(raw) {
            match decoded {
                Ok(envelope) => self.dispatch(&envelope),
                Err(e) => {
                    self.shared.stats.record_decode_failure();
                    self.notify_telemetry("on_decode_failure", |sink| sink.on_decode_failure(raw, &e));
                }
            }
        }
    }

    fn dispatch(&self, envelope: &Envelope) {
        self.shared.stats.record_dispatched();
        // 锁只用于取快照，回调在锁外执行
        let subscribers = lock(&self.shared.router).subscribers(&envelope.channel);
        if subscribers.is_empty() {
            debug!("[连接监管] 频道 '{}' 没有订阅者，消息被忽略。", envelope.channel);
            return;
        }

        let report = router::deliver(&subscribers, envelope);
        if report.failures.is_empty() {
            return;
        }
        self.shared.stats.record_callback_failures(report.failures.len());
        for failure in &report.failures {
            self.notify_telemetry("on_callback_failure", |sink| {
                sink.on_callback_failure(&envelope.channel, failure.subscription_id, &failure.error)
            });
        }
    }

    /// 连接结束后清理本连接相关的状态。
    fn end_session(&mut self) {
        if let Some(opened_at) = self.opened_at.take() {
            let uptime = opened_at.elapsed();
            if self.backoff.record_session(uptime) {
                debug!("[连接监管] 连接保持了 {:?}，重连退避从头计算。", uptime);
            } else {
                debug!("[连接监管] 连接仅保持了 {:?}，重连退避继续增长。", uptime);
            }
        }
        self.joined.clear();
        *lock(&self.shared.sender) = None;
    }

    async fn close_session(
        &mut self,
        connection: &TransportConnection,
        events: &mut mpsc::Receiver<TransportEvent>,
    ) {
        self.end_session();
        connection.close();

        let confirmed = tokio::time::timeout(CLOSE_GRACE, async {
            while let Some(event) = events.recv().await {
                if let TransportEvent::Closed(reason) = event {
                    return Some(reason);
                }
            }
            None
        })
        .await;
        match confirmed {
            Ok(Some(reason)) => debug!("[连接监管] 连接 {} 已关闭: {}", connection.id(), reason),
            Ok(None) => debug!("[连接监管] 连接 {} 的事件流已结束。", connection.id()),
            Err(_) => warn!("[连接监管] 连接 {} 未在 {:?} 内确认关闭。", connection.id(), CLOSE_GRACE),
        }
    }

    fn finish(mut self, ack: Option<oneshot::Sender<()>>) {
        *lock(&self.shared.sender) = None;
        self.set_state(ConnectionState::Closed, Some("客户端已关闭".to_string()));
        self.commands.close();
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        info!("[连接监管] 已停止，通知端点: {}", self.endpoint);
    }

    fn set_state(&self, next: ConnectionState, detail: Option<String>) {
        let previous = *self.state_tx.borrow();
        if previous == next {
            return;
        }
        // 先通知遥测，再发布新状态，等待状态的一方总能看到对应的事件
        let event = ConnectionStatusEvent::new(previous, next, detail);
        self.notify_telemetry("on_state_change", |sink| sink.on_state_change(&event));
        self.state_tx.send_replace(next);
    }

    fn notify_telemetry(&self, hook: &str, call: impl FnOnce(&dyn TelemetrySink)) {
        let sink = self.shared.telemetry.as_ref();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| call(sink))) {
            warn!(
                "[连接监管] 遥测接收方在 {} 中 panic，已忽略: {}",
                hook,
                router::panic_message(payload.as_ref())
            );
        }
    }
}
