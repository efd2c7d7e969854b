// notify_transport/src/server/transport.rs

//! 推送服务端的监听、握手与单连接收发。

use std::future::Future;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use notify_models::Envelope;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use uuid::Uuid;

use crate::error::TransportError;

/// 服务端 WebSocket 流类型。
pub type ServerWsStream = WebSocketStream<TcpStream>;

/// 服务端视角的一条客户端连接。
pub struct PushConnection {
    /// 服务端为该连接分配的标识。
    pub id: Uuid,
    /// 客户端地址。
    pub peer_addr: SocketAddr,
    /// 握手请求的路径 (不含查询串)。
    pub path: String,
    /// 握手请求携带的 `Authorization` 头 (如有)。
    pub authorization: Option<String>,
    stream: ServerWsStream,
}

impl PushConnection {
    /// 把信封编码为 JSON 文本帧推送给客户端。
    pub async fn push(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = serde_json::to_string(envelope)?;
        self.send_text(text).await
    }

    /// 推送一条原始文本帧 (可用于发送畸形帧或多条换行分隔的记录)。
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), TransportError> {
        let text = text.into();
        debug!("[推送服务端] 向连接 {} 发送文本帧: {}", self.id, text);
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// 等待客户端的下一条文本帧，跳过 Ping/Pong 等控制帧。
    ///
    /// 连接关闭或出错时返回 `None`。
    pub async fn next_text(&mut self) -> Option<String> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Binary(bin)) => return String::from_utf8(bin).ok(),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    debug!("[推送服务端] 连接 {} 接收出错: {}", self.id, e);
                    return None;
                }
            }
        }
        None
    }

    /// 发送 Close 帧并正常关闭连接。
    pub async fn close(mut self, reason: &str) {
        let frame = CloseFrame { code: CloseCode::Normal, reason: reason.to_string().into() };
        let _ = self.stream.close(Some(frame)).await;
        info!("[推送服务端] 连接 {} 已正常关闭。", self.id);
    }

    /// 不发送 Close 帧直接丢弃连接，模拟网络中断。
    pub fn drop_abruptly(self) {
        info!("[推送服务端] 连接 {} 被直接丢弃 (模拟网络中断)。", self.id);
        drop(self.stream);
    }
}

/// 最小推送服务端。被丢弃时停止接受新连接。
pub struct PushServer {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl PushServer {
    /// 绑定地址并开始接受连接。
    ///
    /// 每个握手成功的连接都在独立的 Tokio 任务中交给 `on_connect` 处理。
    /// 传入 `127.0.0.1:0` 可绑定随机端口，实际地址通过 `local_addr()` 获取。
    pub async fn bind<F, Fut>(addr: &str, on_connect: F) -> Result<Self, TransportError>
    where
        F: Fn(PushConnection) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("[推送服务端] 正在监听地址: {}", local_addr);

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((tcp_stream, peer_addr)) => {
                        let on_connect = on_connect.clone();
                        tokio::spawn(async move {
                            match handshake(tcp_stream, peer_addr).await {
                                Ok(connection) => on_connect(connection).await,
                                Err(e) => error!("[推送服务端] 与 {} 的 WebSocket 握手失败: {}", peer_addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("[推送服务端] 接受 TCP 连接失败: {}。服务端将继续运行。", e);
                    }
                }
            }
        });

        Ok(Self { local_addr, accept_task })
    }

    /// 实际监听地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 以给定路径构造客户端可连接的 `ws://` URL。
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.local_addr, path)
    }

    /// 停止接受新连接。已建立的连接由各自的处理函数决定何时结束。
    pub fn stop(&self) {
        self.accept_task.abort();
    }
}

impl Drop for PushServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handshake(tcp_stream: TcpStream, peer_addr: SocketAddr) -> Result<PushConnection, TransportError> {
    let mut path = String::new();
    let mut authorization = None;
    let stream = accept_hdr_async(tcp_stream, |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        authorization = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(response)
    })
    .await?;

    let id = Uuid::new_v4();
    info!("[推送服务端] 与 {} 的 WebSocket 握手成功，连接 {}，路径 '{}'", peer_addr, id, path);
    Ok(PushConnection { id, peer_addr, path, authorization, stream })
}
