// notify_transport/tests/transport_integration_test.rs

use std::time::Duration;

use log::{LevelFilter, info};
use notify_models::{CloseReason, Envelope};
use notify_transport::client::endpoint::parse_endpoint;
use notify_transport::codec;
use notify_transport::server::{PushConnection, PushServer};
use notify_transport::{ConnectOptions, TransportConnection, TransportError, TransportEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

// 辅助函数：初始化日志，仅用于测试，避免多次初始化
fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Debug).is_test(true).try_init();
}

// 启动推送服务端，把每个新连接交给测试主流程
async fn start_server() -> (PushServer, mpsc::UnboundedReceiver<PushConnection>) {
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    let server = PushServer::bind("127.0.0.1:0", move |connection: PushConnection| {
        let conn_tx = conn_tx.clone();
        async move {
            let _ = conn_tx.send(connection);
        }
    })
    .await
    .expect("推送服务端启动失败");
    (server, conn_rx)
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("等待传输事件超时")
        .expect("事件通道意外关闭")
}

fn quiet_options() -> ConnectOptions {
    ConnectOptions { keepalive_interval: Duration::ZERO, ..ConnectOptions::default() }
}

#[tokio::test]
async fn test_open_receive_and_send_frames() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    let options = ConnectOptions { credential: Some("token-123".to_string()), ..quiet_options() };
    let (connection, mut events) = TransportConnection::open(&url, &options).await.expect("连接应成功");
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened, "第一条事件必须是 Opened");

    let mut server_side = timeout(Duration::from_secs(5), connections.recv())
        .await
        .expect("等待服务端连接超时")
        .expect("服务端连接通道关闭");
    assert_eq!(server_side.path, "/notify");
    assert_eq!(server_side.authorization.as_deref(), Some("Bearer token-123"));

    let envelope = Envelope::new("asset:42", json!({ "status": "done" }));
    server_side.push(&envelope).await.expect("推送失败");
    match next_event(&mut events).await {
        TransportEvent::Message(raw) => {
            let decoded = codec::decode(&raw).expect("推送的帧应可解码");
            assert_eq!(decoded, envelope);
        }
        other => panic!("预期 Message 事件，实际: {:?}", other),
    }

    connection.send(r#"{"type":"join","channel":"jobs"}"#.to_string()).expect("发送应成功");
    let received = timeout(Duration::from_secs(5), server_side.next_text())
        .await
        .expect("等待客户端帧超时");
    assert_eq!(received.as_deref(), Some(r#"{"type":"join","channel":"jobs"}"#));
    info!("[测试] 收发流程验证完成。");
}

#[tokio::test]
async fn test_remote_close_emits_single_closed_event() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    let (connection, mut events) = TransportConnection::open(&url, &quiet_options()).await.expect("连接应成功");
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    let server_side = connections.recv().await.expect("服务端应收到连接");
    server_side.close("maintenance").await;

    match next_event(&mut events).await {
        TransportEvent::Closed(CloseReason::Remote { code, reason }) => {
            assert_eq!(code, Some(1000));
            assert_eq!(reason, "maintenance");
        }
        other => panic!("预期远端关闭事件，实际: {:?}", other),
    }
    // Closed 之后事件流结束，不会再有第二个 Closed
    let after = timeout(Duration::from_secs(5), events.recv()).await.expect("事件通道应及时关闭");
    assert!(after.is_none(), "Closed 只能出现一次");
    assert!(matches!(connection.send("late".to_string()), Err(TransportError::NotConnected)));
}

#[tokio::test]
async fn test_abrupt_drop_is_not_reported_as_local_close() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    let (_connection, mut events) = TransportConnection::open(&url, &quiet_options()).await.expect("连接应成功");
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    connections.recv().await.expect("服务端应收到连接").drop_abruptly();
    match next_event(&mut events).await {
        TransportEvent::Closed(reason) => assert!(!reason.is_local(), "网络中断不应被视为本地关闭: {}", reason),
        other => panic!("预期 Closed 事件，实际: {:?}", other),
    }
}

#[tokio::test]
async fn test_local_close_is_reported_once_and_blocks_sends() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    let (connection, mut events) = TransportConnection::open(&url, &quiet_options()).await.expect("连接应成功");
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    let mut server_side = connections.recv().await.expect("服务端应收到连接");

    connection.close();
    connection.close();
    assert!(matches!(connection.send("x".to_string()), Err(TransportError::NotConnected)));
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed(CloseReason::Local));
    assert!(timeout(Duration::from_secs(5), events.recv()).await.expect("事件通道应关闭").is_none());

    let seen = timeout(Duration::from_secs(5), server_side.next_text()).await.expect("服务端应观察到关闭");
    assert!(seen.is_none(), "服务端应看到连接关闭");
}

#[tokio::test]
async fn test_keepalive_detects_silent_peer() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    let options = ConnectOptions {
        keepalive_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(100),
        ..ConnectOptions::default()
    };
    let (_connection, mut events) = TransportConnection::open(&url, &options).await.expect("连接应成功");
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    // 服务端持有连接但从不读取，因此不会回复 Pong
    let _silent = connections.recv().await.expect("服务端应收到连接");
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Closed(CloseReason::Failure("keepalive timeout".to_string()))
    );
}

#[tokio::test]
async fn test_connect_refused_when_no_server() {
    init_test_logger();
    let (server, _connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");
    server.stop();
    drop(server);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = TransportConnection::open(&url, &quiet_options()).await;
    assert!(
        matches!(result, Err(TransportError::Connect(_)) | Err(TransportError::ConnectTimeout(_))),
        "服务端停止后连接应失败"
    );
}

#[tokio::test]
async fn test_stalled_consumer_caps_queued_events() {
    init_test_logger();
    let (server, mut connections) = start_server().await;
    let url = parse_endpoint(&server.url("/notify")).expect("端点应合法");

    const CAPACITY: usize = 8;
    const TOTAL: u64 = 2_000;
    let options = ConnectOptions { event_queue_capacity: CAPACITY, ..quiet_options() };
    let (_connection, mut events) = TransportConnection::open(&url, &options).await.expect("连接应成功");
    let mut server_side = connections.recv().await.expect("服务端应收到连接");

    let pusher = tokio::spawn(async move {
        for seq in 0..TOTAL {
            let envelope = Envelope::new("firehose", json!({ "seq": seq }));
            if server_side.push(&envelope).await.is_err() {
                break;
            }
        }
        server_side
    });

    // 所有者暂不消费，给 I/O 任务足够的时间去读
    tokio::time::sleep(Duration::from_millis(500)).await;
    let mut queued = Vec::new();
    while let Ok(event) = events.try_recv() {
        queued.push(event);
    }
    assert!(queued.len() <= CAPACITY, "队列中积压了 {} 条事件，超过容量 {}", queued.len(), CAPACITY);
    assert_eq!(queued.first(), Some(&TransportEvent::Opened));

    // 恢复消费后，被暂停的读取继续进行，消息一条不少且保持顺序
    let mut seqs = Vec::new();
    let mut pending = queued.into_iter().skip(1);
    while (seqs.len() as u64) < TOTAL {
        let event = match pending.next() {
            Some(event) => event,
            None => next_event(&mut events).await,
        };
        match event {
            TransportEvent::Message(raw) => {
                let envelope = codec::decode(&raw).expect("推送的帧应可解码");
                seqs.push(envelope.data["seq"].as_u64().expect("seq 应为整数"));
            }
            other => panic!("预期 Message 事件，实际: {:?}", other),
        }
    }
    assert_eq!(seqs, (0..TOTAL).collect::<Vec<_>>());
    let _ = timeout(Duration::from_secs(5), pusher).await.expect("推送任务应结束");
}
