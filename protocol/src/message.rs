//! 消息类型定义与行协议编解码
//!
//! 每条消息是一行以 `|` 分隔的 ASCII 字段，以 `\n` 结尾，第一个字段是决定
//! 后续字段数量的整数消息码：
//!
//! | 码 | 字段 | 含义 |
//! |----|------|------|
//! | `0` | 无 | 会话初始化 |
//! | `1` | 走法, 颜色 | 落子，走法为 `A1`..`H8` 或 `NONE` |
//! | `2` | 胜方 (`B`/`W`/`NONE`) | 正常终局 |
//! | `3` | 胜方 (`B`/`W`) | 认输，胜方为未认输一方 |
//! | `-1` | 无 | 确认 |
//! | `-2`..`-7` | 无 | 错误码，见 [`ErrorCode`] |

use serde::{Deserialize, Serialize};

use crate::constants::{FIELD_SEPARATOR, MAX_LINE_LEN, NO_MOVE};
use crate::error::{ProtocolError, Result};
use crate::notation::Notation;
use crate::piece::{Color, Position};

/// 会话 ID（不透明字符串）
pub type SessionId = String;

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum ErrorCode {
    /// 内部错误，会话必须终止
    Internal = -2,
    /// 非法走法，发送方需重发
    IllegalMove = -3,
    /// 走子超时，发送方需重发或判负
    Timeout = -4,
    /// 消息格式错误或无法理解
    Malformed = -5,
    /// 致命协议错误，会话终止
    Fatal = -7,
}

impl ErrorCode {
    /// 从消息码解析
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -2 => Some(ErrorCode::Internal),
            -3 => Some(ErrorCode::IllegalMove),
            -4 => Some(ErrorCode::Timeout),
            -5 => Some(ErrorCode::Malformed),
            -7 => Some(ErrorCode::Fatal),
            _ => None,
        }
    }

    /// 消息码
    pub fn code(&self) -> i8 {
        *self as i8
    }

    /// 收到该错误后会话是否必须终止
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorCode::Internal | ErrorCode::Fatal)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// 协议消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// 会话初始化 (`0`)
    Init,
    /// 落子 (`1`)，`position` 为 None 表示 pass
    Move {
        position: Option<Position>,
        color: Color,
    },
    /// 正常终局 (`2`)，`winner` 为 None 表示平局
    End { winner: Option<Color> },
    /// 认输 (`3`)
    Resign { winner: Color },
    /// 确认 (`-1`)
    Ack,
    /// 错误 (`-2`..`-7`)
    Error(ErrorCode),
}

impl Message {
    pub const INIT: i8 = 0;
    pub const MOVE: i8 = 1;
    pub const END: i8 = 2;
    pub const RESIGN: i8 = 3;
    pub const ACK: i8 = -1;

    /// 消息码
    pub fn code(&self) -> i8 {
        match self {
            Message::Init => Self::INIT,
            Message::Move { .. } => Self::MOVE,
            Message::End { .. } => Self::END,
            Message::Resign { .. } => Self::RESIGN,
            Message::Ack => Self::ACK,
            Message::Error(code) => code.code(),
        }
    }

    /// 编码为一行（含结尾 `\n`）
    pub fn encode(&self) -> String {
        let mut line = self.code().to_string();
        match self {
            Message::Move { position, color } => {
                line.push(FIELD_SEPARATOR);
                line.push_str(&Notation::format_move_field(*position));
                line.push(FIELD_SEPARATOR);
                line.push(color.to_wire_char());
            }
            Message::End { winner } => {
                line.push(FIELD_SEPARATOR);
                match winner {
                    Some(color) => line.push(color.to_wire_char()),
                    None => line.push_str(NO_MOVE),
                }
            }
            Message::Resign { winner } => {
                line.push(FIELD_SEPARATOR);
                line.push(winner.to_wire_char());
            }
            Message::Init | Message::Ack | Message::Error(_) => {}
        }
        line.push('\n');
        line
    }

    /// 解码一行（允许结尾带 `\n` 或 `\r\n`）
    pub fn decode(line: &str) -> Result<Self> {
        let line = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line);

        if line.len() > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong {
                len: line.len(),
                max: MAX_LINE_LEN,
            });
        }
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let tokens: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        let code = parse_code(tokens[0])
            .ok_or_else(|| ProtocolError::UnknownCode(tokens[0].to_string()))?;
        let fields = &tokens[1..];

        let expected = match code {
            Self::MOVE => 2,
            Self::END | Self::RESIGN => 1,
            Self::INIT | Self::ACK => 0,
            other if ErrorCode::from_code(other).is_some() => 0,
            _ => return Err(ProtocolError::UnknownCode(tokens[0].to_string())),
        };
        if fields.len() != expected {
            return Err(ProtocolError::FieldCount {
                code,
                expected,
                actual: fields.len(),
            });
        }

        let msg = match code {
            Self::INIT => Message::Init,
            Self::ACK => Message::Ack,
            Self::MOVE => Message::Move {
                position: Notation::parse_move_field(fields[0]).map_err(|_| {
                    ProtocolError::InvalidField {
                        field: "move",
                        value: fields[0].to_string(),
                    }
                })?,
                color: parse_color(fields[1])?,
            },
            Self::END => Message::End {
                winner: if fields[0].eq_ignore_ascii_case(NO_MOVE) {
                    None
                } else {
                    Some(parse_color(fields[0])?)
                },
            },
            Self::RESIGN => Message::Resign {
                winner: parse_color(fields[0])?,
            },
            other => match ErrorCode::from_code(other) {
                Some(error) => Message::Error(error),
                None => return Err(ProtocolError::UnknownCode(tokens[0].to_string())),
            },
        };

        Ok(msg)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

/// 消息码只接受规范写法（不带符号前缀、前导零或空白）
fn parse_code(token: &str) -> Option<i8> {
    let code = match token {
        "0" => Message::INIT,
        "1" => Message::MOVE,
        "2" => Message::END,
        "3" => Message::RESIGN,
        "-1" => Message::ACK,
        "-2" | "-3" | "-4" | "-5" | "-7" => token.parse().ok()?,
        _ => return None,
    };
    Some(code)
}

/// 解析单字母颜色字段
fn parse_color(field: &str) -> Result<Color> {
    let mut chars = field.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Color::from_wire_char(c),
        _ => None,
    }
    .ok_or_else(|| ProtocolError::InvalidField {
        field: "color",
        value: field.to_string(),
    })
}
