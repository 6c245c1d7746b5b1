//! 错误类型定义

use thiserror::Error;

use crate::piece::{Color, Position};

/// 黑白棋规则错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OthelloError {
    /// 非法走法（未夹住任何对方棋子，或目标格已被占用）
    #[error("Illegal move: {color:?} at {position}")]
    IllegalMove { position: Position, color: Color },

    /// 无效的坐标记法
    #[error("Invalid notation: {0:?}")]
    InvalidNotation(String),

    /// 无效的棋盘文本
    #[error("Invalid board layout: {reason}")]
    InvalidLayout { reason: String },

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket 错误
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// 空行
    #[error("Empty message")]
    Empty,

    /// 未知的消息码
    #[error("Unknown message code: {0:?}")]
    UnknownCode(String),

    /// 字段数量与消息码不匹配
    #[error("Wrong field count for code {code}: expected {expected}, got {actual}")]
    FieldCount {
        code: i8,
        expected: usize,
        actual: usize,
    },

    /// 字段取值无效
    #[error("Invalid field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// 行过长
    #[error("Line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 规则错误
    #[error("Othello error: {0}")]
    Othello(#[from] OthelloError),
}

impl ProtocolError {
    /// 是否为可恢复的消息格式错误（回复 -5 后连接可以继续使用）
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProtocolError::Empty
                | ProtocolError::UnknownCode(_)
                | ProtocolError::FieldCount { .. }
                | ProtocolError::InvalidField { .. }
                | ProtocolError::LineTooLong { .. }
                | ProtocolError::Othello(_)
        )
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
