// seismic_notify/src/ws_client/service.rs

//! `NotifyClient`: 通知通道客户端的对外句柄。
//!
//! 客户端在创建时启动一个连接监管任务 (见 `supervisor` 模块)，之后:
//! - `subscribe` / `unsubscribe` 同步修改频道路由器，频道的激活/失活以指令形式交给监管任务；
//! - `connection_state` 同步读取最新连接状态，`state_changes` 用于异步等待状态变化；
//! - `send` 通过当前连接发送原始帧，没有打开的连接时立即返回 `NotConnected`；
//! - `shutdown` 关闭连接并停止监管任务，此后客户端处于终态 `Closed`。
//!
//! 订阅者感知不到重连: 连接恢复后监管任务会自动重新加入所有活跃频道。

use std::sync::{Arc, Mutex, OnceLock};

use log::{error, info, warn};
use notify_models::{ConnectionState, Envelope};
use notify_transport::client::endpoint::parse_endpoint;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::supervisor::{lock, Command, Shared, Supervisor};
use crate::backoff::Backoff;
use crate::config::NotifyConfig;
use crate::error::{BoxError, NotifyError};
use crate::event::{LogTelemetry, TelemetrySink};
use crate::protocol::{ChannelProtocol, JsonControlProtocol};
use crate::router::SubscriptionHandle;
use crate::stats::ClientStats;

/// `NotifyClient::shared` 使用的进程级实例。
static SHARED_CLIENT: OnceLock<NotifyClient> = OnceLock::new();

pub struct NotifyClient {
    endpoint: Url,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    supervisor_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotifyClient {
    /// 使用默认的 JSON 控制帧协议和日志遥测创建客户端，并立即开始连接。
    ///
    /// 必须在 Tokio 运行时内调用。
    pub fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        Self::start(config, Arc::new(JsonControlProtocol), Arc::new(LogTelemetry))
    }

    /// 使用自定义的频道协议和遥测接收方创建客户端，并立即开始连接。
    ///
    /// # 返回值
    /// * `Err(NotifyError::Config)` - 配置未通过校验。
    /// * `Err(NotifyError::NoRuntime)` - 当前不在 Tokio 运行时中。
    pub fn start(
        config: NotifyConfig,
        protocol: Arc<dyn ChannelProtocol>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, NotifyError> {
        config.validate()?;
        let endpoint = parse_endpoint(&config.endpoint).map_err(|e| NotifyError::Config(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let shared = Arc::new(Shared::new(telemetry));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let supervisor = Supervisor::new(
            endpoint.clone(),
            config.connect_options(),
            Backoff::new(&config.reconnect),
            protocol,
            Arc::clone(&shared),
            commands_rx,
            state_tx,
        );
        let supervisor_task = runtime.spawn(supervisor.run());
        info!("[通知客户端] 已创建，通知端点: {}", endpoint);

        Ok(Self {
            endpoint,
            shared,
            commands: commands_tx,
            state_rx,
            supervisor_task: Mutex::new(Some(supervisor_task)),
        })
    }

    /// 进程级共享客户端。
    ///
    /// 第一次调用时按 `config` 创建；之后的调用忽略 `config`，直接返回已有实例。
    pub fn shared(config: NotifyConfig) -> Result<&'static NotifyClient, NotifyError> {
        if let Some(existing) = SHARED_CLIENT.get() {
            return Ok(existing);
        }
        let client = NotifyClient::new(config)?;
        // 并发初始化时落选的实例在这里被丢弃，其 Drop 会停止它的监管任务
        Ok(SHARED_CLIENT.get_or_init(|| client))
    }

    /// 订阅频道。
    ///
    /// 回调在连接监管任务中同步调用，同一频道的消息按到达顺序交付。回调返回错误或 panic
    /// 只会被记录，不影响其他订阅者，也不影响连接。
    ///
    /// # 返回值
    /// * `Err(NotifyError::InvalidChannel)` - 频道名为空。
    /// * `Err(NotifyError::Closed)` - 客户端已关闭。
    pub fn subscribe<F>(&self, channel: &str, callback: F) -> Result<SubscriptionHandle, NotifyError>
    where
        F: Fn(&Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        if self.connection_state().is_terminal() {
            return Err(NotifyError::Closed);
        }
        let (handle, became_active) = lock(&self.shared.router).subscribe(channel, callback)?;
        if became_active {
            let _ = self.commands.send(Command::Activate(channel.to_string()));
        }
        Ok(handle)
    }

    /// 取消订阅。返回后该回调不会再被调用；重复调用无副作用。
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let became_inactive = lock(&self.shared.router).unsubscribe(handle);
        if became_inactive {
            let _ = self.commands.send(Command::Deactivate(handle.channel().to_string()));
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// 订阅连接状态变化。
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 等待连接进入 `target` 状态。
    ///
    /// 客户端在此之前进入 `Closed` 时返回 `Err(NotifyError::Closed)`。
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), NotifyError> {
        let mut states = self.state_rx.clone();
        loop {
            let current = *states.borrow_and_update();
            if current == target {
                return Ok(());
            }
            if current.is_terminal() {
                return Err(NotifyError::Closed);
            }
            if states.changed().await.is_err() {
                // 监管任务已退出，最后的状态就是终态
                return if *states.borrow() == target { Ok(()) } else { Err(NotifyError::Closed) };
            }
        }
    }

    /// 通过当前连接发送一条原始帧。不排队、不重试。
    pub fn send(&self, frame: impl Into<String>) -> Result<(), NotifyError> {
        let sender = lock(&self.shared.sender).clone();
        match sender {
            Some(sender) => sender.send(frame.into()).map_err(|e| {
                warn!("[通知客户端] 发送失败: {}", e);
                NotifyError::NotConnected
            }),
            None => Err(NotifyError::NotConnected),
        }
    }

    pub fn stats(&self) -> ClientStats {
        self.shared.stats.snapshot()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 当前活跃频道，按激活先后排列。
    pub fn active_channels(&self) -> Vec<String> {
        lock(&self.shared.router).active_channels()
    }

    /// 关闭客户端。返回时连接已释放，状态为 `Closed`；重复调用直接返回。
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(Some(ack_tx))).is_ok() {
            let _ = ack_rx.await;
        }
        let task = lock(&self.supervisor_task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("[通知客户端] 连接监管任务异常退出: {}", e);
            }
        }
        info!("[通知客户端] 已关闭，通知端点: {}", self.endpoint);
    }
}

impl Drop for NotifyClient {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown(None));
    }
}
