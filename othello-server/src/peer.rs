//! 连接到会话的对端

use othello_protocol::{Color, Message, TransportType};
use tokio::sync::mpsc;

/// 对端 ID（连接级，由会话管理器分配）
pub type PeerId = u64;

/// 对端在会话中的角色
///
/// 线协议本身不协商颜色：第一个挂接的连接执黑，第二个执白，之后都是观战者。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player(Color),
    Spectator,
}

impl Role {
    pub fn color(&self) -> Option<Color> {
        match self {
            Role::Player(color) => Some(*color),
            Role::Spectator => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Player(Color::Dark) => f.write_str("dark"),
            Role::Player(Color::Light) => f.write_str("light"),
            Role::Spectator => f.write_str("spectator"),
        }
    }
}

/// 对端句柄：会话只通过它向连接投递消息，不接触底层传输
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub id: PeerId,
    pub transport: TransportType,
    pub addr: Option<String>,
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerHandle {
    /// 创建句柄和对应的发送队列接收端
    pub fn new(
        id: PeerId,
        transport: TransportType,
        addr: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                transport,
                addr,
                tx,
            },
            rx,
        )
    }

    /// 投递消息，连接已关闭时返回 false
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}
