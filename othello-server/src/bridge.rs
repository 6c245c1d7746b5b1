//! 传输桥接
//!
//! 同时监听原始 TCP 和 WebSocket，把两侧的行协议消息投递到会话管理器。
//! 每个连接一个读任务（连接任务本身）加一个写任务，写任务按入队顺序
//! 发送该对端的出站消息。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use othello_protocol::{
    Connection, ErrorCode, Message, MessageReader, MessageWriter, SessionId, TcpConnection,
    WsConnection,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::manager::SessionManager;

/// 传输桥
pub struct Bridge {
    manager: Arc<SessionManager>,
    tcp: TcpListener,
    ws: TcpListener,
}

/// 正在运行的桥接服务
pub struct BridgeHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeHandle {
    /// 停止监听和巡检（已建立的连接不受影响）
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

impl Bridge {
    /// 绑定两个监听端口
    pub async fn bind(config: &BridgeConfig, manager: Arc<SessionManager>) -> Result<Self> {
        let tcp = TcpListener::bind(&config.tcp_addr)
            .await
            .with_context(|| format!("绑定 TCP 地址失败: {}", config.tcp_addr))?;
        let ws = TcpListener::bind(&config.ws_addr)
            .await
            .with_context(|| format!("绑定 WebSocket 地址失败: {}", config.ws_addr))?;

        info!("TCP 监听 {}", tcp.local_addr()?);
        info!("WebSocket 监听 {}", ws.local_addr()?);

        Ok(Self { manager, tcp, ws })
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws.local_addr()?)
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// 启动接受循环和巡检任务
    pub fn serve(self) -> BridgeHandle {
        let Bridge { manager, tcp, ws } = self;

        let tcp_task = tokio::spawn(accept_tcp(tcp, manager.clone()));
        let ws_task = tokio::spawn(accept_ws(ws, manager.clone()));
        let sweep_task = tokio::spawn(sweep_loop(manager));

        BridgeHandle {
            tasks: vec![tcp_task, ws_task, sweep_task],
        }
    }
}

async fn accept_tcp(listener: TcpListener, manager: Arc<SessionManager>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("TCP accept 失败: {}", e);
                continue;
            }
        };
        debug!("TCP 连接 {}", addr);

        let manager = manager.clone();
        tokio::spawn(async move {
            match TcpConnection::from_stream(stream) {
                Ok(conn) => serve_connection(conn, manager).await,
                Err(e) => warn!("TCP 连接 {} 初始化失败: {}", addr, e),
            }
        });
    }
}

async fn accept_ws(listener: TcpListener, manager: Arc<SessionManager>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("WebSocket accept 失败: {}", e);
                continue;
            }
        };
        debug!("WebSocket 连接 {}", addr);

        let manager = manager.clone();
        // 握手放在连接任务里，慢客户端不阻塞 accept
        tokio::spawn(async move {
            match WsConnection::accept(stream).await {
                Ok(conn) => serve_connection(conn, manager).await,
                Err(e) => warn!("WebSocket 握手失败 {}: {}", addr, e),
            }
        });
    }
}

async fn sweep_loop(manager: Arc<SessionManager>) {
    let mut interval = tokio::time::interval(manager.config().sweep_interval());
    loop {
        interval.tick().await;
        manager.sweep(Instant::now()).await;
    }
}

/// 处理单个连接直到断开
pub async fn serve_connection<C: Connection>(conn: C, manager: Arc<SessionManager>) {
    let transport = conn.transport();
    let addr = conn.peer_addr();
    let session_id: SessionId = conn
        .session_hint()
        .unwrap_or_else(|| manager.config().default_session.clone());
    let (mut reader, mut writer) = conn.split();

    let (peer, mut rx) = manager.register_peer(transport, addr.clone());
    info!(
        "对端 {} ({} {}) 连接到会话 {}",
        peer.id,
        transport,
        addr.as_deref().unwrap_or("?"),
        session_id
    );

    let peer_id = peer.id;
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.send(&msg).await {
                warn!("对端 {} 写入失败: {}", peer_id, e);
                return;
            }
        }
        let _ = writer.close().await;
    });

    loop {
        match reader.recv().await {
            Ok(msg) => {
                debug!("对端 {} -> {}", peer.id, msg);
                manager.deliver(&session_id, &peer, msg).await;
            }
            Err(e) if e.is_malformed() => {
                warn!("对端 {} 发送格式错误的消息: {}", peer.id, e);
                peer.send(Message::Error(ErrorCode::Malformed));
            }
            Err(othello_protocol::ProtocolError::ConnectionClosed) => {
                debug!("对端 {} 关闭连接", peer.id);
                break;
            }
            Err(e) => {
                warn!("对端 {} 读取失败: {}", peer.id, e);
                break;
            }
        }
    }

    manager.leave(&session_id, peer.id).await;
    info!("对端 {} 离开会话 {}", peer.id, session_id);

    // 释放最后一个发送端，写任务发完剩余消息后退出
    drop(peer);
    if let Err(e) = writer_task.await {
        error!("写任务异常退出: {}", e);
    }
}
