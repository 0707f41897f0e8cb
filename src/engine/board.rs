use std::fmt;

use rand::Rng;

use super::SIZE;

/// Stable tile identity. The renderer joins on it to animate the same element
/// across moves instead of re-creating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId(pub u64);

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out tile ids. Ids are never reused until [`TileIds::reset`], which is
/// only called when every live tile is being discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileIds {
    next: u64,
}

impl Default for TileIds {
    fn default() -> Self {
        TileIds { next: 1 }
    }
}

impl TileIds {
    pub fn next_id(&mut self) -> TileId {
        let id = TileId(self.next);
        self.next += 1;
        id
    }

    /// The id the next call to `next_id` will return.
    pub fn peek(&self) -> TileId {
        TileId(self.next)
    }

    pub fn reset(&mut self) {
        self.next = 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }
}

/// One numbered piece on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub id: TileId,
    /// Value currently displayed.
    pub value: u32,
    pub position: Position,
    /// Where the tile was before the last move; the renderer slides from here.
    pub previous_position: Position,
    /// Merge result not yet shown. Logically the tile already has this value.
    pub pending_value: Option<u32>,
    /// Set on the absorbed side of a merge until the settle window closes.
    pub marked_for_removal: bool,
}

impl Tile {
    pub fn new(id: TileId, value: u32, position: Position) -> Self {
        Tile {
            id,
            value,
            position,
            previous_position: position,
            pending_value: None,
            marked_for_removal: false,
        }
    }

    /// The value used for rules, score and persistence.
    #[inline]
    pub fn logical_value(&self) -> u32 {
        self.pending_value.unwrap_or(self.value)
    }
}

/// The 4x4 grid of optional tiles.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: [[Option<Tile>; SIZE]; SIZE],
}

impl Board {
    pub const EMPTY: Board = Board { cells: [[None; SIZE]; SIZE] };

    /// Build a board from plain values (0 = empty), assigning ids in row-major
    /// order of the non-empty cells.
    ///
    /// ```
    /// use tg2048::engine::{Board, Position, TileIds};
    /// let mut ids = TileIds::default();
    /// let b = Board::from_values(&[[0, 2, 0, 0], [0; 4], [0; 4], [4, 0, 0, 0]], &mut ids);
    /// assert_eq!(b.get(Position::new(0, 1)).unwrap().id.0, 1);
    /// assert_eq!(b.get(Position::new(3, 0)).unwrap().id.0, 2);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn from_values(values: &[[u32; SIZE]; SIZE], ids: &mut TileIds) -> Self {
        let mut board = Board::EMPTY;
        for (row, line) in values.iter().enumerate() {
            for (col, &value) in line.iter().enumerate() {
                if value > 0 {
                    board.place(Tile::new(ids.next_id(), value, Position::new(row, col)));
                }
            }
        }
        board
    }

    /// Logical values, 0 for empty cells.
    pub fn values(&self) -> [[u32; SIZE]; SIZE] {
        let mut out = [[0; SIZE]; SIZE];
        for tile in self.tiles() {
            out[tile.position.row][tile.position.col] = tile.logical_value();
        }
        out
    }

    #[inline]
    pub fn get(&self, pos: Position) -> Option<&Tile> {
        self.cells[pos.row][pos.col].as_ref()
    }

    /// Put a tile at its own `position`.
    pub(crate) fn place(&mut self, tile: Tile) {
        let cell = &mut self.cells[tile.position.row][tile.position.col];
        debug_assert!(cell.is_none(), "cell {:?} already occupied", tile.position);
        *cell = Some(tile);
    }

    pub(crate) fn find_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.cells.iter_mut().flatten().flatten().find(|t| t.id == id)
    }

    /// Live tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.cells.iter().flatten().flatten()
    }

    pub fn empty_cells(&self) -> Vec<Position> {
        let mut out = Vec::with_capacity(SIZE * SIZE);
        for row in 0..SIZE {
            for col in 0..SIZE {
                if self.cells[row][col].is_none() {
                    out.push(Position::new(row, col));
                }
            }
        }
        out
    }

    /// Count the number of empty cells on the board.
    pub fn count_empty(&self) -> usize {
        SIZE * SIZE - self.tile_count()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles().count()
    }

    /// Return the highest tile value (e.g., 2048) present on the board, 0 when empty.
    pub fn highest_tile(&self) -> u32 {
        self.tiles().map(Tile::logical_value).max().unwrap_or(0)
    }

    /// Insert a 2 (90%) or 4 (10%) into a uniformly chosen empty cell.
    ///
    /// Returns `None` without consuming an id when the board is full.
    pub fn spawn_random<R: Rng + ?Sized>(&mut self, ids: &mut TileIds, rng: &mut R) -> Option<Tile> {
        let empty = self.empty_cells();
        if empty.is_empty() {
            return None;
        }
        let position = empty[rng.gen_range(0..empty.len())];
        let tile = Tile::new(ids.next_id(), generate_random_value(rng), position);
        self.place(tile);
        Some(tile)
    }
}

fn generate_random_value<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    if rng.gen_range(0..10) < 9 { 2 } else { 4 }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:?})", self.values())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values();
        writeln!(f)?;
        for (idx, row) in values.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|&v| format_val(v)).collect();
            writeln!(f, "{}", cells.join("|"))?;
            if idx + 1 < SIZE {
                writeln!(f, "-------------------------------")?;
            }
        }
        Ok(())
    }
}

fn format_val(val: u32) -> String {
    match val {
        0 => String::from("       "),
        x => {
            let mut x = x.to_string();
            while x.len() < 7 {
                match x.len() {
                    6 => x = format!(" {}", x),
                    _ => x = format!(" {} ", x),
                }
            }
            x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn ids_assigned_row_major() {
        let mut ids = TileIds::default();
        let b = Board::from_values(&[[2, 0, 4, 0], [0, 0, 0, 8], [0; 4], [16, 0, 0, 0]], &mut ids);
        let order: Vec<(u64, u32)> = b.tiles().map(|t| (t.id.0, t.value)).collect();
        assert_eq!(order, vec![(1, 2), (2, 4), (3, 8), (4, 16)]);
        assert_eq!(ids.peek(), TileId(5));
    }

    #[test]
    fn values_use_pending_merge_result() {
        let mut ids = TileIds::default();
        let mut b = Board::from_values(&[[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]], &mut ids);
        b.find_mut(TileId(1)).unwrap().pending_value = Some(4);
        assert_eq!(b.values()[0][0], 4);
        assert_eq!(b.get(Position::new(0, 0)).unwrap().value, 2);
        assert_eq!(b.highest_tile(), 4);
    }

    #[test]
    fn spawn_fills_board() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ids = TileIds::default();
        let mut b = Board::EMPTY;
        for _ in 0..16 {
            let t = b.spawn_random(&mut ids, &mut rng).unwrap();
            assert!(t.value == 2 || t.value == 4);
        }
        assert_eq!(b.count_empty(), 0);
        assert!(b.spawn_random(&mut ids, &mut rng).is_none());
        // no id consumed by the failed spawn
        assert_eq!(ids.peek(), TileId(17));
    }

    #[test]
    fn spawn_with_zero_rng_picks_first_empty_and_two() {
        let mut rng = StepRng::new(0, 0);
        let mut ids = TileIds::default();
        let mut b = Board::from_values(&[[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]], &mut ids);
        let t = b.spawn_random(&mut ids, &mut rng).unwrap();
        assert_eq!(t.position, Position::new(0, 1));
        assert_eq!(t.value, 2);
        assert_eq!(t.id, TileId(2));
    }

    #[test]
    fn spawn_distribution_is_mostly_twos() {
        let mut rng = StdRng::seed_from_u64(42);
        let fours = (0..10_000).filter(|_| generate_random_value(&mut rng) == 4).count();
        assert!((700..1300).contains(&fours), "fours = {fours}");
    }

    #[test]
    fn display_renders_rows() {
        let b = Board::from_values(&[[2, 0, 0, 2048], [0; 4], [0; 4], [0; 4]], &mut TileIds::default());
        let text = b.to_string();
        assert!(text.contains("   2   "));
        assert!(text.contains(" 2048  "));
        assert_eq!(text.lines().filter(|l| l.starts_with('-')).count(), 3);
    }
}
