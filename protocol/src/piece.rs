//! 棋子、颜色与坐标定义

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_CELLS, BOARD_SIZE};

/// 执子颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// 黑方（先手，协议中为 `B`）
    Dark,
    /// 白方（后手，协议中为 `W`）
    Light,
}

impl Color {
    /// 获取对方颜色
    pub fn opponent(&self) -> Color {
        match self {
            Color::Dark => Color::Light,
            Color::Light => Color::Dark,
        }
    }

    /// 协议字符
    pub fn to_wire_char(&self) -> char {
        match self {
            Color::Dark => 'B',
            Color::Light => 'W',
        }
    }

    /// 从协议字符解析（大小写不敏感）
    pub fn from_wire_char(c: char) -> Option<Color> {
        match c {
            'B' | 'b' => Some(Color::Dark),
            'W' | 'w' => Some(Color::Light),
            _ => None,
        }
    }

    /// 对应的棋盘格子
    pub fn cell(&self) -> Cell {
        match self {
            Color::Dark => Cell::Dark,
            Color::Light => Cell::Light,
        }
    }
}

/// 棋盘格子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Dark,
    Light,
}

impl Cell {
    /// 格子上棋子的颜色
    pub fn color(&self) -> Option<Color> {
        match self {
            Cell::Empty => None,
            Cell::Dark => Some(Color::Dark),
            Cell::Light => Some(Color::Light),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// 文本棋盘字符：`.` 空，`B` 黑，`W` 白
    pub fn to_char(&self) -> char {
        match self {
            Cell::Empty => '.',
            Cell::Dark => 'B',
            Cell::Light => 'W',
        }
    }

    /// 从文本棋盘字符解析
    pub fn from_char(c: char) -> Option<Cell> {
        match c {
            '.' | '-' => Some(Cell::Empty),
            _ => Color::from_wire_char(c).map(|color| color.cell()),
        }
    }
}

/// 棋盘位置（从 0 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 行 (0-7)，对应记法中的数字 1-8
    pub row: u8,
    /// 列 (0-7)，对应记法中的字母 A-H
    pub col: u8,
}

impl Position {
    /// 创建新位置
    pub fn new(row: u8, col: u8) -> Option<Self> {
        if (row as usize) < BOARD_SIZE && (col as usize) < BOARD_SIZE {
            Some(Self { row, col })
        } else {
            None
        }
    }

    /// 创建新位置（不检查边界，内部使用）
    pub const fn new_unchecked(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// 获取偏移后的位置
    pub fn offset(&self, dr: i8, dc: i8) -> Option<Position> {
        let row = self.row as i8 + dr;
        let col = self.col as i8 + dc;
        if row >= 0 && (row as usize) < BOARD_SIZE && col >= 0 && (col as usize) < BOARD_SIZE {
            Some(Position {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    /// 转换为数组索引（行优先）
    pub fn to_index(&self) -> usize {
        self.row as usize * BOARD_SIZE + self.col as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < BOARD_CELLS {
            Some(Position {
                row: (index / BOARD_SIZE) as u8,
                col: (index % BOARD_SIZE) as u8,
            })
        } else {
            None
        }
    }

    /// 行优先遍历全部 64 个位置
    pub fn all() -> impl Iterator<Item = Position> {
        (0..BOARD_CELLS).map(|index| Position {
            row: (index / BOARD_SIZE) as u8,
            col: (index % BOARD_SIZE) as u8,
        })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", (b'A' + self.col) as char, self.row + 1)
    }
}
