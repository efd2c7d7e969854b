// notify_transport/src/client/transport.rs

//! 客户端 WebSocket 传输连接。
//!
//! `TransportConnection` 拥有一条到服务端的双向流式连接。连接建立后，一个后台 I/O 任务
//! 负责写出排队的帧、读取入站帧、按间隔发送 Ping 保活，并把观察到的一切以
//! `TransportEvent` 的形式发送给连接的所有者：
//!
//! - `Opened`: 握手完成后首先发送。
//! - `Message(raw)`: 每条入站文本帧。
//! - `Closed(reason)`: 每个连接生命周期内恰好一次，无论关闭由本地、远端还是网络故障引起。
//!
//! 本模块是纯 I/O 原语，不做任何重连。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use notify_models::CloseReason;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

use crate::error::TransportError;

/// 客户端 WebSocket 流类型：可能经过 TLS 加密的 TCP 流。
pub type ClientWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 远端关闭后等待本端 Close 回复写出的最长时间。
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// 事件队列的默认容量。
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// 建立连接时使用的参数。
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// 外部提供的访问凭证，以 `Authorization: Bearer <token>` 附加到握手请求上。
    pub credential: Option<String>,
    /// 一次连接尝试 (TCP + TLS + WebSocket 升级) 的超时时间。
    pub connect_timeout: Duration,
    /// Ping 保活间隔，为零表示禁用保活。
    pub keepalive_interval: Duration,
    /// 发出 Ping 后允许的额外静默时间；超过 `keepalive_interval + pong_timeout`
    /// 仍未收到任何入站帧即判定连接已死。
    pub pong_timeout: Duration,
    /// I/O 任务与所有者之间事件队列的容量。队列满时 I/O 任务暂停读取套接字，
    /// 由 TCP 流控把压力传回服务端。取 0 时按 1 处理。
    pub event_queue_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            credential: None,
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

/// 构造握手请求使用的 `Authorization: Bearer <credential>` 请求头。
///
/// # Returns
/// * `Err(TransportError::InvalidCredential)` - 凭证含有不能出现在请求头中的字符 (例如换行)。
pub fn bearer_header(credential: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(&format!("Bearer {}", credential))
        .map_err(|e| TransportError::InvalidCredential(format!("凭证不能作为请求头发送: {}", e)))
}

/// 传输连接向其所有者发出的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// 连接已打开。
    Opened,
    /// 收到一条原始文本帧。
    Message(String),
    /// 连接已关闭，附带原因。每个连接只发出一次。
    Closed(CloseReason),
}

/// 发往 I/O 任务的出站指令。
#[derive(Debug)]
enum Outbound {
    Frame(Message),
    Close,
}

/// 传输连接的发送端句柄，可克隆。
///
/// 发送是“发出即忘”的：帧被放入 I/O 任务的队列后立即返回，不等待写出。
#[derive(Debug, Clone)]
pub struct TransportSender {
    connection_id: Uuid,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl TransportSender {
    /// 发送一条原始文本帧。
    ///
    /// # Returns
    /// * `Err(TransportError::NotConnected)` - 连接未打开或已关闭。
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        debug!("[传输连接 {}] 帧已排队等待发送: {}", self.connection_id, frame);
        self.outbound_tx
            .send(Outbound::Frame(Message::Text(frame)))
            .map_err(|_| TransportError::NotConnected)
    }

    /// 连接当前是否处于打开状态。
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 所属连接的标识。
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    fn request_close(&self) {
        // 先标记关闭，之后的 send 立即返回 NotConnected
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.outbound_tx.send(Outbound::Close);
        }
    }
}

/// 一条活动的客户端传输连接。
///
/// 连接被丢弃时会请求本地关闭，I/O 任务随之发出 `Closed(Local)` 并退出。
pub struct TransportConnection {
    sender: TransportSender,
    io_task: JoinHandle<()>,
}

impl TransportConnection {
    /// 连接到指定端点。
    ///
    /// 握手成功后启动后台 I/O 任务，并返回连接句柄与事件接收端；事件流的第一条一定是
    /// `TransportEvent::Opened`。事件队列有界 (`event_queue_capacity`)，所有者不消费时
    /// I/O 任务停止读取套接字。
    ///
    /// # Returns
    /// * `Err(TransportError::ConnectTimeout)` - 在 `connect_timeout` 内未完成握手。
    /// * `Err(TransportError::Connect)` - DNS/TCP/TLS 失败或升级握手被拒绝。
    /// * `Err(TransportError::InvalidCredential)` - 凭证无法作为请求头发送。
    /// * `Err(TransportError::InvalidUrl)` - URL 无法构造握手请求。
    pub async fn open(
        endpoint: &Url,
        options: &ConnectOptions,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        info!("[传输连接] 开始尝试连接到 WebSocket 服务器，URL: {}", endpoint);
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(format!("无法为 '{}' 构造握手请求: {}", endpoint, e)))?;
        if let Some(credential) = options.credential.as_deref() {
            request.headers_mut().insert(AUTHORIZATION, bearer_header(credential)?);
        }

        let (ws_stream, response) = match tokio::time::timeout(options.connect_timeout, connect_async(request)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                warn!("[传输连接] 连接到 {} 失败，错误: {}", endpoint, e);
                return Err(TransportError::Connect(e.to_string()));
            }
            Err(_) => {
                warn!("[传输连接] 连接到 {} 超时 ({:?})", endpoint, options.connect_timeout);
                return Err(TransportError::ConnectTimeout(options.connect_timeout));
            }
        };

        let connection_id = Uuid::new_v4();
        info!(
            "[传输连接 {}] 已成功连接到 {} (HTTP 状态码: {})",
            connection_id,
            endpoint,
            response.status()
        );

        let (ws_sender, ws_receiver) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(options.event_queue_capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));

        // Opened 必须先于任何 Message 进入事件队列，新队列至少有一个空位
        let _ = events_tx.try_send(TransportEvent::Opened);

        let io_task = tokio::spawn(run_io(IoContext {
            connection_id,
            ws_sender,
            ws_receiver,
            outbound_rx,
            events_tx,
            open: open.clone(),
            keepalive_interval: options.keepalive_interval,
            pong_timeout: options.pong_timeout,
        }));

        let sender = TransportSender { connection_id, outbound_tx, open };
        Ok((Self { sender, io_task }, events_rx))
    }

    /// 连接标识，用于日志关联。
    pub fn id(&self) -> Uuid {
        self.sender.connection_id
    }

    /// 发送一条原始文本帧，语义同 `TransportSender::send`。
    pub fn send(&self, frame: String) -> Result<(), TransportError> {
        self.sender.send(frame)
    }

    /// 克隆一个发送端句柄。
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// 连接当前是否处于打开状态。
    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }

    /// 请求本地关闭。I/O 任务会发送 Close 帧并发出 `Closed(Local)`；重复调用无副作用。
    pub fn close(&self) {
        info!("[传输连接 {}] 请求本地关闭。", self.sender.connection_id);
        self.sender.request_close();
    }

    /// I/O 任务是否已退出。
    pub fn is_finished(&self) -> bool {
        self.io_task.is_finished()
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        self.sender.request_close();
    }
}

struct IoContext {
    connection_id: Uuid,
    ws_sender: SplitSink<ClientWsStream, Message>,
    ws_receiver: SplitStream<ClientWsStream>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events_tx: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
    keepalive_interval: Duration,
    pong_timeout: Duration,
}

/// 后台 I/O 循环：在出站队列、入站流与保活定时器之间多路等待，直到连接结束。
async fn run_io(ctx: IoContext) {
    let IoContext {
        connection_id,
        mut ws_sender,
        mut ws_receiver,
        mut outbound_rx,
        events_tx,
        open,
        keepalive_interval,
        pong_timeout,
    } = ctx;

    let keepalive_enabled = !keepalive_interval.is_zero();
    let tick_period = if keepalive_enabled { keepalive_interval } else { Duration::from_secs(3600) };
    let mut keepalive = tokio::time::interval_at(Instant::now() + tick_period, tick_period);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_inbound = Instant::now();

    let reason = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Frame(message)) => {
                    if let Err(e) = ws_sender.send(message).await {
                        error!("[传输连接 {}] 写出帧失败: {}", connection_id, e);
                        break CloseReason::Failure(format!("发送失败: {}", e));
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = ws_sender.close().await {
                        debug!("[传输连接 {}] 发送 Close 帧时出错 (忽略): {}", connection_id, e);
                    }
                    break CloseReason::Local;
                }
            },
            inbound = ws_receiver.next() => {
                last_inbound = Instant::now();
                let text = match inbound {
                    Some(Ok(Message::Text(text))) => {
                        debug!("[传输连接 {}] 收到原始文本帧: '{}'", connection_id, text);
                        text
                    }
                    Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin) {
                        Ok(text) => {
                            debug!("[传输连接 {}] 收到 UTF-8 二进制帧，按文本处理。", connection_id);
                            text
                        }
                        Err(e) => {
                            warn!("[传输连接 {}] 丢弃非 UTF-8 二进制帧 ({} 字节)。", connection_id, e.as_bytes().len());
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Pong 由 tungstenite 自动回复
                        debug!("[传输连接 {}] 收到 Ping/Pong 控制帧。", connection_id);
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("[传输连接 {}] 收到 Close 控制帧: {:?}", connection_id, frame);
                        let (code, text) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, ws_sender.close()).await;
                        break CloseReason::Remote { code, reason: text };
                    }
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) => {
                        break CloseReason::Remote { code: None, reason: "连接已关闭".to_string() };
                    }
                    Some(Err(e)) => {
                        error!("[传输连接 {}] 接收帧时发生底层错误: {}", connection_id, e);
                        break CloseReason::Failure(e.to_string());
                    }
                    None => {
                        break CloseReason::Remote { code: None, reason: "接收流已结束".to_string() };
                    }
                };
                // 队列满时在这里等待，期间不再读取套接字
                if events_tx.send(TransportEvent::Message(text)).await.is_err() {
                    debug!("[传输连接 {}] 事件接收端已释放，关闭连接。", connection_id);
                    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, ws_sender.close()).await;
                    break CloseReason::Local;
                }
                // 等待消费的时间不计入保活静默
                last_inbound = Instant::now();
            }
            _ = keepalive.tick(), if keepalive_enabled => {
                if last_inbound.elapsed() > keepalive_interval + pong_timeout {
                    warn!(
                        "[传输连接 {}] 超过 {:?} 未收到任何入站帧，判定连接已死。",
                        connection_id,
                        keepalive_interval + pong_timeout
                    );
                    break CloseReason::Failure("keepalive timeout".to_string());
                }
                if let Err(e) = ws_sender.send(Message::Ping(Vec::new())).await {
                    error!("[传输连接 {}] 发送 Ping 失败: {}", connection_id, e);
                    break CloseReason::Failure(format!("发送 Ping 失败: {}", e));
                }
            }
        }
    };

    open.store(false, Ordering::Release);
    info!("[传输连接 {}] 连接已结束: {}", connection_id, reason);
    let _ = events_tx.send(TransportEvent::Closed(reason)).await;
}
