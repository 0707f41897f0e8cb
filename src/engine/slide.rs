use super::board::{Board, Position, Tile};
use super::line::{collapse_line, Merge};
use super::{Move, SIZE};

/// A board after sliding in one direction, before any spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub board: Board,
    pub merges: Vec<Merge>,
    /// Absorbed tiles, moved onto their survivor's cell.
    pub absorbed: Vec<Tile>,
    pub changed: bool,
    pub score_delta: u64,
}

/// Cells of line `index` for `dir`, ordered so the merge end comes first.
///
/// ```
/// use tg2048::engine::{line_positions, Move, Position};
/// assert_eq!(line_positions(Move::Right, 1)[0], Position::new(1, 3));
/// assert_eq!(line_positions(Move::Up, 2)[3], Position::new(3, 2));
/// ```
pub fn line_positions(dir: Move, index: usize) -> [Position; SIZE] {
    let mut out = [Position::default(); SIZE];
    for (slot, pos) in out.iter_mut().enumerate() {
        let rev = SIZE - 1 - slot;
        *pos = match dir {
            Move::Left => Position::new(index, slot),
            Move::Right => Position::new(index, rev),
            Move::Up => Position::new(slot, index),
            Move::Down => Position::new(rev, index),
        };
    }
    out
}

/// Slide/merge every line of `board` in `dir`. No randomness.
///
/// The input board is not touched; every tile on the returned board has its
/// `previous_position` set to where it stood before the move.
pub fn slide(board: &Board, dir: Move) -> Slide {
    let mut next = Board::EMPTY;
    let mut merges = Vec::new();
    let mut absorbed = Vec::new();
    let mut moved = false;

    for index in 0..SIZE {
        let cells = line_positions(dir, index);
        let line = cells.map(|pos| board.get(pos).copied());
        let collapsed = collapse_line(&line);

        for (slot, tile) in collapsed.survivors.iter().enumerate() {
            let mut tile = *tile;
            tile.previous_position = tile.position;
            tile.position = cells[slot];
            moved |= tile.position != tile.previous_position;
            next.place(tile);
        }
        for (merge, gone) in collapsed.merges.iter().zip(collapsed.absorbed) {
            let Some(slot) = collapsed.survivors.iter().position(|t| t.id == merge.survivor) else {
                continue;
            };
            let mut gone = gone;
            gone.previous_position = gone.position;
            gone.position = cells[slot];
            absorbed.push(gone);
        }
        merges.extend(collapsed.merges);
    }

    let score_delta = merges.iter().map(|m| m.value as u64).sum();
    Slide {
        changed: moved || !merges.is_empty(),
        board: next,
        merges,
        absorbed,
        score_delta,
    }
}
