use super::board::{Position, Tile, TileId};
use super::SIZE;

/// A merge of two equal tiles produced by collapsing one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    pub survivor: TileId,
    pub absorbed: TileId,
    /// Value of the survivor after the merge.
    pub value: u32,
}

/// Result of collapsing one line toward index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collapsed {
    /// Tiles that remain, in order; merged survivors carry `pending_value`.
    pub survivors: Vec<Tile>,
    /// Absorbed tiles, `marked_for_removal`, parallel to `merges`.
    pub absorbed: Vec<Tile>,
    pub merges: Vec<Merge>,
}

impl Collapsed {
    /// Survivors padded with empties to a full line.
    pub fn cells(&self) -> [Option<Tile>; SIZE] {
        let mut out = [None; SIZE];
        for (slot, tile) in self.survivors.iter().enumerate() {
            out[slot] = Some(*tile);
        }
        out
    }

    pub fn score(&self) -> u64 {
        self.merges.iter().map(|m| m.value as u64).sum()
    }
}

/// Collapse one row or column, already oriented so merges go toward index 0.
///
/// Empty slots are dropped, then equal neighbours merge pairwise left to
/// right. A tile produced by a merge is never merged again in the same pass,
/// so `[2, 2, 2, 2]` becomes `[4, 4]` and not `[8]`.
///
/// Positions are left untouched; the caller assigns final positions.
pub fn collapse_line(line: &[Option<Tile>]) -> Collapsed {
    let tiles: Vec<Tile> = line.iter().flatten().copied().collect();
    let mut out = Collapsed {
        survivors: Vec::with_capacity(tiles.len()),
        absorbed: Vec::new(),
        merges: Vec::new(),
    };

    let mut i = 0;
    while i < tiles.len() {
        let mut head = tiles[i];
        let merged = tiles
            .get(i + 1)
            .filter(|next| next.logical_value() == head.logical_value())
            .and_then(|next| head.logical_value().checked_mul(2).map(|value| (next, value)));
        match merged {
            Some((next, value)) => {
                head.pending_value = Some(value);
                let mut gone = *next;
                gone.marked_for_removal = true;
                out.merges.push(Merge { survivor: head.id, absorbed: gone.id, value });
                out.absorbed.push(gone);
                out.survivors.push(head);
                i += 2;
            }
            _ => {
                out.survivors.push(head);
                i += 1;
            }
        }
    }
    out
}

/// Value-only form of [`collapse_line`]: returns the collapsed line (0 = empty)
/// and the points scored.
///
/// ```
/// use tg2048::engine::collapse_values;
/// assert_eq!(collapse_values([2, 0, 2, 0]), ([4, 0, 0, 0], 4));
/// assert_eq!(collapse_values([4, 4, 8, 0]), ([8, 8, 0, 0], 8));
/// ```
pub fn collapse_values(values: [u32; SIZE]) -> ([u32; SIZE], u64) {
    let mut line = [None; SIZE];
    for (slot, &value) in values.iter().enumerate() {
        if value > 0 {
            line[slot] = Some(Tile::new(TileId(slot as u64), value, Position::new(0, slot)));
        }
    }
    let collapsed = collapse_line(&line);
    let mut out = [0; SIZE];
    for (slot, tile) in collapsed.survivors.iter().enumerate() {
        out[slot] = tile.logical_value();
    }
    (out, collapsed.score())
}
