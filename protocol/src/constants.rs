//! 协议常量定义

use std::time::Duration;

/// 棋盘边长（8x8）
pub const BOARD_SIZE: usize = 8;

/// 棋盘格子总数
pub const BOARD_CELLS: usize = BOARD_SIZE * BOARD_SIZE;

/// 单行消息最大长度（字节，不含换行符）
pub const MAX_LINE_LEN: usize = 256;

/// 字段分隔符
pub const FIELD_SEPARATOR: char = '|';

/// "无走法"占位符（用于 pass）
pub const NO_MOVE: &str = "NONE";

/// TCP 默认端口
pub const DEFAULT_TCP_PORT: u16 = 9527;

/// WebSocket 默认端口
pub const DEFAULT_WS_PORT: u16 = 9528;

/// 默认会话 ID（TCP 连接和 WebSocket 根路径都路由到这里）
pub const DEFAULT_SESSION_ID: &str = "default";

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
