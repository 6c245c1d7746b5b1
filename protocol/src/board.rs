//! 棋盘状态

use serde::{Deserialize, Serialize};

use crate::constants::BOARD_SIZE;
use crate::error::OthelloError;
use crate::moves::{Move, MoveGenerator, Outcome};
use crate::piece::{Cell, Color, Position};

/// 棋盘
///
/// 8x8，行优先。对外只读；唯一会改变多个格子的途径是
/// [`MoveGenerator::apply`] 返回的新棋盘。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            cells: [[Cell::Empty; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// 创建初始棋盘：D4、E5 为白，E4、D5 为黑
    pub fn initial() -> Self {
        let mut board = Self::empty();
        board.set(Position::new_unchecked(3, 3), Cell::Light);
        board.set(Position::new_unchecked(3, 4), Cell::Dark);
        board.set(Position::new_unchecked(4, 3), Cell::Dark);
        board.set(Position::new_unchecked(4, 4), Cell::Light);
        board
    }

    /// 从 8 行文本构造棋盘（`.` 空，`B` 黑，`W` 白），第一行为记法中的第 1 行
    ///
    /// 不经过走法引擎，用于测试和调试局面。
    pub fn from_rows(rows: &[&str]) -> Result<Self, OthelloError> {
        if rows.len() != BOARD_SIZE {
            return Err(OthelloError::InvalidLayout {
                reason: format!("expected {} rows, got {}", BOARD_SIZE, rows.len()),
            });
        }

        let mut board = Self::empty();
        for (row, line) in rows.iter().enumerate() {
            let chars: Vec<char> = line.chars().collect();
            if chars.len() != BOARD_SIZE {
                return Err(OthelloError::InvalidLayout {
                    reason: format!("row {} has {} cells", row + 1, chars.len()),
                });
            }
            for (col, c) in chars.into_iter().enumerate() {
                let cell = Cell::from_char(c).ok_or_else(|| OthelloError::InvalidLayout {
                    reason: format!("unexpected {:?} in row {}", c, row + 1),
                })?;
                board.cells[row][col] = cell;
            }
        }
        Ok(board)
    }

    /// 获取指定位置的格子
    pub fn get(&self, pos: Position) -> Cell {
        self.cells[pos.row as usize][pos.col as usize]
    }

    /// 设置指定位置的格子（仅供走法引擎使用）
    pub(crate) fn set(&mut self, pos: Position, cell: Cell) {
        self.cells[pos.row as usize][pos.col as usize] = cell;
    }

    /// 完整的 8x8 网格
    pub fn cells(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    /// 统计某种格子的数量
    pub fn count(&self, cell: Cell) -> u8 {
        self.cells
            .iter()
            .flatten()
            .filter(|&&c| c == cell)
            .count() as u8
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.cells {
            let line: String = row.iter().map(Cell::to_char).collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// 一步走法的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// 被翻转的棋子
    pub flipped: Vec<Position>,
    /// 因无子可下而被跳过的一方
    pub passed: Option<Color>,
    /// 走完后轮到谁，None 表示终局
    pub next: Option<Color>,
}

/// 完整的对局状态（棋盘 + 走子方 + 最近一步）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// 棋盘
    pub board: Board,
    /// 当前走子方，终局为 None
    pub to_move: Option<Color>,
    /// 最近一步走法
    pub last_move: Option<Move>,
    /// 已走步数
    pub move_count: u32,
}

impl GameState {
    /// 创建初始状态（黑先）
    pub fn initial() -> Self {
        Self {
            board: Board::initial(),
            to_move: Some(Color::Dark),
            last_move: None,
            move_count: 0,
        }
    }

    /// 从棋盘创建状态；`first` 无子可下时按 pass 规则顺延
    pub fn from_board(board: Board, first: Color) -> Self {
        let to_move = if MoveGenerator::has_legal_move(&board, first) {
            Some(first)
        } else {
            MoveGenerator::next_to_move(&board, first)
        };
        Self {
            board,
            to_move,
            last_move: None,
            move_count: 0,
        }
    }

    /// 走子方的合法走法
    pub fn legal_moves(&self) -> Vec<Position> {
        self.to_move
            .map(|color| MoveGenerator::legal_moves(&self.board, color))
            .unwrap_or_default()
    }

    /// 执行走法并推进回合
    ///
    /// 失败时状态保持不变。
    pub fn play(&mut self, mv: Move) -> Result<MoveOutcome, OthelloError> {
        let to_move = self.to_move.ok_or(OthelloError::GameOver)?;
        if mv.color != to_move {
            return Err(OthelloError::IllegalMove {
                position: mv.position,
                color: mv.color,
            });
        }

        let flipped = MoveGenerator::flips(&self.board, mv)?;
        self.board = MoveGenerator::apply(&self.board, mv)?;
        self.last_move = Some(mv);
        self.move_count += 1;

        let next = MoveGenerator::next_to_move(&self.board, mv.color);
        self.to_move = next;

        Ok(MoveOutcome {
            flipped,
            passed: (next == Some(mv.color)).then(|| mv.color.opponent()),
            next,
        })
    }

    /// 是否终局
    pub fn is_over(&self) -> bool {
        self.to_move.is_none()
    }

    /// 终局结果
    pub fn outcome(&self) -> Option<Outcome> {
        self.is_over().then(|| MoveGenerator::winner(&self.board))
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}
