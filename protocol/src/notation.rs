//! 坐标记法
//!
//! 格式：<列字母><行数字>
//! - 列：A-H 对应 col 0-7
//! - 行：1-8 对应 row 0-7
//!
//! 输入大小写不敏感，输出统一大写。`NONE` 保留给协议中的"无走法"。

use crate::constants::NO_MOVE;
use crate::error::OthelloError;
use crate::piece::Position;

/// 坐标记法
pub struct Notation;

impl Notation {
    /// 解析记法（如 `d3`、`D3`）
    pub fn parse(s: &str) -> Result<Position, OthelloError> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(OthelloError::InvalidNotation(s.to_string()));
        }

        let col = bytes[0].to_ascii_uppercase();
        let row = bytes[1];
        if !(b'A'..=b'H').contains(&col) || !(b'1'..=b'8').contains(&row) {
            return Err(OthelloError::InvalidNotation(s.to_string()));
        }

        Ok(Position::new_unchecked(row - b'1', col - b'A'))
    }

    /// 格式化为大写记法
    pub fn format(pos: Position) -> String {
        pos.to_string()
    }

    /// 解析协议中的走法字段，`NONE` 表示 pass
    pub fn parse_move_field(s: &str) -> Result<Option<Position>, OthelloError> {
        if s.eq_ignore_ascii_case(NO_MOVE) {
            Ok(None)
        } else {
            Self::parse(s).map(Some)
        }
    }

    /// 格式化协议中的走法字段
    pub fn format_move_field(pos: Option<Position>) -> String {
        match pos {
            Some(pos) => Self::format(pos),
            None => NO_MOVE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(Notation::parse("D3").unwrap(), Position::new_unchecked(2, 3));
        assert_eq!(Notation::parse("d3").unwrap(), Position::new_unchecked(2, 3));
        assert_eq!(Notation::parse("a1").unwrap(), Position::new_unchecked(0, 0));
        assert_eq!(Notation::parse("H8").unwrap(), Position::new_unchecked(7, 7));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        for bad in ["Z9", "I1", "A0", "A9", "", "D", "D33", "3D", "ä1"] {
            assert!(Notation::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_format_uppercase() {
        let pos = Notation::parse("f5").unwrap();
        assert_eq!(Notation::format(pos), "F5");
    }

    #[test]
    fn test_move_field_none() {
        assert_eq!(Notation::parse_move_field("NONE").unwrap(), None);
        assert_eq!(Notation::parse_move_field("none").unwrap(), None);
        assert_eq!(Notation::format_move_field(None), "NONE");
        assert_eq!(
            Notation::parse_move_field("c4").unwrap(),
            Some(Position::new_unchecked(3, 2))
        );
    }
}
