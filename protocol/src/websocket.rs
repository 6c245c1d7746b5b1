//! WebSocket 传输
//!
//! 每个文本帧承载一行协议消息。服务端从握手请求路径中取会话 ID：
//! `/` 表示默认会话，`/<id>` 表示会话 `<id>`。

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ProtocolError, Result};
use crate::message::{Message, SessionId};
use crate::transport::{Connection, Connector, MessageReader, MessageWriter, TransportType};
use crate::CONNECT_TIMEOUT;

/// 从请求路径解析会话 ID
pub fn session_from_path(path: &str) -> Option<SessionId> {
    let id = path.trim_matches('/');
    (!id.is_empty()).then(|| id.to_string())
}

/// WebSocket 连接
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
    peer_addr: Option<String>,
    session_hint: Option<SessionId>,
}

impl WsConnection<TcpStream> {
    /// 在已接受的 TCP 流上完成服务端握手
    pub async fn accept(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());

        let mut path = None;
        let callback = |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
            path = Some(req.uri().path().to_string());
            Ok(resp)
        };

        let stream = timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await
        .map_err(|_| ProtocolError::ConnectionTimeout)??;

        Ok(Self {
            stream,
            peer_addr,
            session_hint: path.as_deref().and_then(session_from_path),
        })
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn transport(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }

    fn session_hint(&self) -> Option<SessionId> {
        self.session_hint.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WsReader { stream }, WsWriter { sink })
    }
}

/// WebSocket 读取端
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> MessageReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Message> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Message::decode(&text),
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Message::decode(&String::from_utf8_lossy(&bytes));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Err(ProtocolError::ConnectionClosed),
                // Ping/Pong 由 tungstenite 自动处理
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// WebSocket 写入端
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> MessageWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, msg: &Message) -> Result<()> {
        self.sink.send(WsMessage::Text(msg.encode())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

/// WebSocket 连接器，地址形如 `ws://127.0.0.1:9528/<session>`
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    type Conn = WsConnection<MaybeTlsStream<TcpStream>>;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let (stream, _response) = timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;

        let peer_addr = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok().map(|a| a.to_string()),
            _ => None,
        };

        Ok(WsConnection {
            stream,
            peer_addr,
            session_hint: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Color;

    #[test]
    fn test_session_from_path() {
        assert_eq!(session_from_path("/"), None);
        assert_eq!(session_from_path(""), None);
        assert_eq!(session_from_path("/game-7"), Some("game-7".to_string()));
        assert_eq!(session_from_path("/lobby/"), Some("lobby".to_string()));
    }

    #[tokio::test]
    async fn test_ws_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_handle = tokio::spawn(async move {
            let conn = WsConnector
                .connect(&format!("ws://{}/game-7", addr))
                .await
                .unwrap();
            assert_eq!(conn.transport(), TransportType::WebSocket);

            let (mut reader, mut writer) = conn.split();
            writer
                .send(&Message::Resign { winner: Color::Light })
                .await
                .unwrap();
            assert_eq!(reader.recv().await.unwrap(), Message::Ack);
            writer.close().await.unwrap();
        });

        let (stream, _) = listener.accept().await.unwrap();
        let conn = WsConnection::accept(stream).await.unwrap();
        assert_eq!(conn.session_hint(), Some("game-7".to_string()));

        let (mut reader, mut writer) = conn.split();
        assert_eq!(
            reader.recv().await.unwrap(),
            Message::Resign { winner: Color::Light }
        );
        writer.send(&Message::Ack).await.unwrap();

        assert!(matches!(
            reader.recv().await,
            Err(ProtocolError::ConnectionClosed)
        ));
        client_handle.await.unwrap();
    }
}
