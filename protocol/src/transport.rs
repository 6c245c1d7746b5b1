//! 传输层抽象
//!
//! 提供 Connection/Connector traits 使上层会话逻辑与具体传输实现解耦。
//! TCP 与 WebSocket 承载完全相同的行协议：TCP 以 `\n` 分帧，WebSocket 每个
//! 文本帧一行。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ProtocolError, Result};
use crate::message::{Message, SessionId};
use crate::{CONNECT_TIMEOUT, MAX_LINE_LEN};

/// 传输协议类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    Tcp,
    WebSocket,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Tcp => f.write_str("tcp"),
            TransportType::WebSocket => f.write_str("ws"),
        }
    }
}

/// 消息读取端
#[async_trait]
pub trait MessageReader: Send {
    /// 接收下一条消息
    ///
    /// 格式错误（[`ProtocolError::is_malformed`]）时该行已被消费，可以继续读取。
    async fn recv(&mut self) -> Result<Message>;
}

/// 消息写入端
#[async_trait]
pub trait MessageWriter: Send {
    /// 发送一条消息
    async fn send(&mut self, msg: &Message) -> Result<()>;

    /// 关闭写入端
    async fn close(&mut self) -> Result<()>;
}

/// 连接抽象 trait（核心抽象，用于会话层）
pub trait Connection: Send + 'static {
    type Reader: MessageReader + 'static;
    type Writer: MessageWriter + 'static;

    /// 传输类型
    fn transport(&self) -> TransportType;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<String>;

    /// 连接请求里携带的会话 ID（TCP 没有）
    fn session_hint(&self) -> Option<SessionId>;

    /// 分离读写端
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 连接器 trait（客户端使用）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// 建立连接
    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        TcpConnection::from_stream(stream)
    }
}

/// TCP 连接
pub struct TcpConnection {
    reader: LineReader<OwnedReadHalf>,
    writer: LineWriter<OwnedWriteHalf>,
    peer_addr: Option<String>,
}

impl TcpConnection {
    /// 从 TcpStream 创建
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: LineReader::new(read_half),
            writer: LineWriter::new(write_half),
            peer_addr,
        })
    }
}

impl Connection for TcpConnection {
    type Reader = LineReader<OwnedReadHalf>;
    type Writer = LineWriter<OwnedWriteHalf>;

    fn transport(&self) -> TransportType {
        TransportType::Tcp
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }

    fn session_hint(&self) -> Option<SessionId> {
        None
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

// ============================================================================
// 行编解码
// ============================================================================

/// 行读取器
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    /// 创建新的行读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(MAX_LINE_LEN + 2),
        }
    }

    /// 读取一行原始文本（含结尾换行符）
    pub async fn read_line(&mut self) -> Result<String> {
        self.buffer.clear();

        // 留出 "\r\n" 的余量
        let limit = (MAX_LINE_LEN + 2) as u64;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buffer)
            .await?;

        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }

        if !self.buffer.ends_with(b"\n") && n as u64 == limit {
            tracing::debug!("丢弃超长行（已读取 {} 字节）", n);
            self.discard_rest_of_line().await?;
            return Err(ProtocolError::LineTooLong {
                len: n,
                max: MAX_LINE_LEN,
            });
        }

        // 对端关闭前的最后一行可能没有换行符，照常解码
        Ok(String::from_utf8_lossy(&self.buffer).into_owned())
    }

    /// 丢弃超长行的剩余部分
    async fn discard_rest_of_line(&mut self) -> Result<()> {
        loop {
            let (consumed, done) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                }
            };
            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageReader for LineReader<R> {
    async fn recv(&mut self) -> Result<Message> {
        let line = self.read_line().await?;
        Message::decode(&line)
    }
}

/// 行写入器
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    /// 创建新的行写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageWriter for LineWriter<W> {
    async fn send(&mut self, msg: &Message) -> Result<()> {
        self.writer.write_all(msg.encode().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Color;
    use crate::notation::Notation;

    #[tokio::test]
    async fn test_tcp_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client_handle = tokio::spawn(async move {
            let conn = TcpConnector.connect(&addr).await.unwrap();
            assert_eq!(conn.transport(), TransportType::Tcp);
            assert_eq!(conn.session_hint(), None);

            let (mut reader, mut writer) = conn.split();
            writer.send(&Message::Init).await.unwrap();

            let msg = reader.recv().await.unwrap();
            assert_eq!(msg, Message::Ack);
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = TcpConnection::from_stream(stream).unwrap().split();

        assert_eq!(reader.recv().await.unwrap(), Message::Init);
        writer.send(&Message::Ack).await.unwrap();

        client_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_line_is_recoverable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, _writer) = TcpConnection::from_stream(stream).unwrap().split();

        let long_line = "9".repeat(MAX_LINE_LEN * 3);
        let payload = format!("1|Z9\n{}\n1|d3|b\r\n", long_line);
        client.write_all(payload.as_bytes()).await.unwrap();
        drop(client);

        let err = reader.recv().await.unwrap_err();
        assert!(err.is_malformed());

        let err = reader.recv().await.unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { .. }));

        assert_eq!(
            reader.recv().await.unwrap(),
            Message::Move {
                position: Some(Notation::parse("D3").unwrap()),
                color: Color::Dark,
            }
        );

        assert!(matches!(
            reader.recv().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }
}
