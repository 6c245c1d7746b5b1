//! 黑白棋共享协议库
//!
//! 包含:
//! - 棋盘、颜色、坐标等核心数据结构
//! - 走法生成、落子翻转和终局判定
//! - 坐标记法 (`A1`..`H8`)
//! - 行协议消息及编解码
//! - 传输层抽象 (Connection, Connector traits) 及 TCP / WebSocket 实现

mod board;
mod constants;
mod error;
mod message;
mod moves;
mod notation;
mod piece;
mod transport;
mod websocket;

pub use board::{Board, GameState, MoveOutcome};
pub use constants::*;
pub use error::{OthelloError, ProtocolError, Result};
pub use message::{ErrorCode, Message, SessionId};
pub use moves::{Move, MoveGenerator, Outcome};
pub use notation::Notation;
pub use piece::{Cell, Color, Position};
pub use transport::{
    Connection, Connector, LineReader, LineWriter, MessageReader, MessageWriter, TcpConnection,
    TcpConnector, TransportType,
};
pub use websocket::{session_from_path, WsConnection, WsConnector, WsReader, WsWriter};
