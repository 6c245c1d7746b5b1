//! 走法生成和验证
//!
//! 合法性判定：对空格的 8 个方向分别前进，只要连续经过至少一枚对方棋子并
//! 停在己方棋子上（仍在棋盘内），该方向即可翻转；至少一个方向可翻转则走法合法。

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::OthelloError;
use crate::piece::{Cell, Color, Position};

/// 8 个方向 (dr, dc)，下标即方向掩码中的位
const DIRECTIONS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 走法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// 落子位置
    pub position: Position,
    /// 落子方
    pub color: Color,
}

impl Move {
    /// 创建新走法
    pub fn new(position: Position, color: Color) -> Self {
        Self { position, color }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.color.to_wire_char(), self.position)
    }
}

/// 对局结果（按棋子数判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// 黑方胜
    Dark,
    /// 白方胜
    Light,
    /// 平局
    Draw,
}

impl Outcome {
    /// 胜方颜色，平局为 None
    pub fn winner(&self) -> Option<Color> {
        match self {
            Outcome::Dark => Some(Color::Dark),
            Outcome::Light => Some(Color::Light),
            Outcome::Draw => None,
        }
    }

    /// 由胜方颜色构造
    pub fn from_winner(winner: Option<Color>) -> Self {
        match winner {
            Some(Color::Dark) => Outcome::Dark,
            Some(Color::Light) => Outcome::Light,
            None => Outcome::Draw,
        }
    }
}

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 计算在 `pos` 落下 `color` 时可翻转的方向掩码（0 表示不合法）
    fn capture_directions(board: &Board, pos: Position, color: Color) -> u8 {
        if !board.get(pos).is_empty() {
            return 0;
        }

        let own = color.cell();
        let other = color.opponent().cell();
        let mut mask = 0u8;

        for (bit, (dr, dc)) in DIRECTIONS.iter().enumerate() {
            let mut cursor = pos.offset(*dr, *dc);
            let mut run = 0;
            while let Some(p) = cursor {
                if board.get(p) != other {
                    break;
                }
                run += 1;
                cursor = p.offset(*dr, *dc);
            }
            if run > 0 && cursor.map(|p| board.get(p)) == Some(own) {
                mask |= 1 << bit;
            }
        }

        mask
    }

    /// 走法是否合法
    pub fn is_legal(board: &Board, mv: Move) -> bool {
        Self::capture_directions(board, mv.position, mv.color) != 0
    }

    /// 生成指定颜色的所有合法落子位置（行优先，无重复）
    pub fn legal_moves(board: &Board, color: Color) -> Vec<Position> {
        Position::all()
            .filter(|&pos| Self::capture_directions(board, pos, color) != 0)
            .collect()
    }

    /// 指定颜色是否至少有一个合法走法
    pub fn has_legal_move(board: &Board, color: Color) -> bool {
        Position::all().any(|pos| Self::capture_directions(board, pos, color) != 0)
    }

    /// 计算走法会翻转的所有棋子
    pub fn flips(board: &Board, mv: Move) -> Result<Vec<Position>, OthelloError> {
        let mask = Self::capture_directions(board, mv.position, mv.color);
        if mask == 0 {
            return Err(OthelloError::IllegalMove {
                position: mv.position,
                color: mv.color,
            });
        }

        let other = mv.color.opponent().cell();
        let mut flipped = Vec::new();
        for (bit, (dr, dc)) in DIRECTIONS.iter().enumerate() {
            if mask & (1 << bit) == 0 {
                continue;
            }
            let mut cursor = mv.position.offset(*dr, *dc);
            while let Some(p) = cursor {
                if board.get(p) != other {
                    break;
                }
                flipped.push(p);
                cursor = p.offset(*dr, *dc);
            }
        }

        Ok(flipped)
    }

    /// 执行走法，返回新棋盘；原棋盘不变
    pub fn apply(board: &Board, mv: Move) -> Result<Board, OthelloError> {
        let flipped = Self::flips(board, mv)?;
        let own = mv.color.cell();

        let mut next = *board;
        next.set(mv.position, own);
        for pos in flipped {
            next.set(pos, own);
        }
        Ok(next)
    }

    /// 双方均无合法走法时对局结束（棋盘下满是其特例）
    pub fn is_terminal(board: &Board) -> bool {
        !Self::has_legal_move(board, Color::Dark) && !Self::has_legal_move(board, Color::Light)
    }

    /// 按棋子数判定胜负（仅在终局时有意义）
    pub fn winner(board: &Board) -> Outcome {
        let dark = board.count(Cell::Dark);
        let light = board.count(Cell::Light);
        match dark.cmp(&light) {
            std::cmp::Ordering::Greater => Outcome::Dark,
            std::cmp::Ordering::Less => Outcome::Light,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    /// `current` 刚走完（或刚 pass）后轮到谁
    ///
    /// 对方有合法走法则轮到对方；否则若 `current` 仍有走法，对方 pass，
    /// `current` 继续；双方都没有走法时返回 None（终局）。
    pub fn next_to_move(board: &Board, current: Color) -> Option<Color> {
        let opponent = current.opponent();
        if Self::has_legal_move(board, opponent) {
            Some(opponent)
        } else if Self::has_legal_move(board, current) {
            Some(current)
        } else {
            None
        }
    }
}
