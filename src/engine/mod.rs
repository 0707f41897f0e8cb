//! Board model and move rules.
//!
//! The rules are fixed: a 4x4 board, equal-value pairwise merges (at most one
//! merge per tile per move), and new tiles of 2 (90%) or 4 (10%).
//!
//! ```
//! use tg2048::engine::{collapse_values, Move};
//!
//! // Merging is strictly pairwise, left to right, in a single pass.
//! assert_eq!(collapse_values([2, 2, 2, 2]), ([4, 4, 0, 0], 8));
//! assert_eq!("left".parse::<Move>().unwrap(), Move::Left);
//! ```

mod board;
mod line;
mod slide;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use board::{Board, Position, Tile, TileId, TileIds};
pub use line::{collapse_line, collapse_values, Collapsed, Merge};
pub use slide::{line_positions, slide, Slide};

/// Board edge length.
pub const SIZE: usize = 4;

/// Largest tile reachable on a 4x4 board: every cell doubling from a spawned 4.
pub const MAX_TILE: u32 = 1 << 17;

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Up, Move::Down, Move::Left, Move::Right];
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Move::Up => "up",
            Move::Down => "down",
            Move::Left => "left",
            Move::Right => "right",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMoveError {
    #[error("unknown direction: {0:?}")]
    Unknown(String),
    #[error("direction code out of range: {0}")]
    Code(u8),
}

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "k" | "w" => Ok(Move::Up),
            "down" | "j" | "s" => Ok(Move::Down),
            "left" | "h" | "a" => Ok(Move::Left),
            "right" | "l" | "d" => Ok(Move::Right),
            other => Err(ParseMoveError::Unknown(other.to_string())),
        }
    }
}

/// Codes follow the usual 0 = Up, 1 = Down, 2 = Left, 3 = Right order.
impl TryFrom<u8> for Move {
    type Error = ParseMoveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Move::Up),
            1 => Ok(Move::Down),
            2 => Ok(Move::Left),
            3 => Ok(Move::Right),
            other => Err(ParseMoveError::Code(other)),
        }
    }
}

/// True if some move is still possible: an empty cell, or two horizontally or
/// vertically adjacent tiles with the same value.
pub fn can_move(board: &Board) -> bool {
    if board.count_empty() > 0 {
        return true;
    }
    let values = board.values();
    for row in 0..SIZE {
        for col in 0..SIZE {
            let v = values[row][col];
            if row + 1 < SIZE && values[row + 1][col] == v {
                return true;
            }
            if col + 1 < SIZE && values[row][col + 1] == v {
                return true;
            }
        }
    }
    false
}

/// Return true if no legal moves remain.
pub fn is_game_over(board: &Board) -> bool {
    !can_move(board)
}
