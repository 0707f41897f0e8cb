//! Tile lifecycle: turns logical moves into render events.
//!
//! A move completes in two phases. `begin` runs with the logical move and
//! reports slides; absorbed tiles stay alive (marked for removal) on their
//! survivor's cell. `settle` runs once the visual window has elapsed: pending
//! merge values are committed, absorbed tiles are destroyed and the spawned
//! tile pops in. The renderer never sees two live tiles resting on one cell
//! after a settle.

use tracing::debug;

use crate::engine::{Board, Merge, Position, Tile, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    /// Tile placed without animation (new game, snapshot load).
    Placed { id: TileId, value: u32, position: Position },
    /// Tile appears with a pop.
    Spawned { id: TileId, value: u32, position: Position },
    /// Tile slides; absorbed tiles slide onto their survivor's cell.
    Slid { id: TileId, from: Position, to: Position },
    /// Merge result becomes visible on the survivor.
    Committed { id: TileId, value: u32 },
    /// Tile element is destroyed.
    Removed { id: TileId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingSettle {
    merges: Vec<Merge>,
    absorbed: Vec<Tile>,
    spawned: Option<Tile>,
}

/// Tracks the tiles of a move whose visual completion is still pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileTracker {
    pending: Option<PendingSettle>,
}

impl TileTracker {
    pub fn is_settling(&self) -> bool {
        self.pending.is_some()
    }

    /// Tiles that are logically gone but still on screen.
    pub fn absorbed(&self) -> &[Tile] {
        match &self.pending {
            Some(p) => &p.absorbed,
            None => &[],
        }
    }

    /// Start the visual phase of a move. `board` is the post-move board,
    /// including the spawned tile.
    pub fn begin(
        &mut self,
        board: &Board,
        merges: Vec<Merge>,
        absorbed: Vec<Tile>,
        spawned: Option<Tile>,
    ) -> Vec<TileEvent> {
        let mut events: Vec<TileEvent> = board
            .tiles()
            .filter(|t| t.position != t.previous_position)
            .map(|t| TileEvent::Slid { id: t.id, from: t.previous_position, to: t.position })
            .collect();
        events.extend(absorbed.iter().map(|t| TileEvent::Slid {
            id: t.id,
            from: t.previous_position,
            to: t.position,
        }));
        debug!(slides = events.len(), merges = merges.len(), "tiles in motion");
        self.pending = Some(PendingSettle { merges, absorbed, spawned });
        events
    }

    /// Finish the visual phase: commit merge values on `board` and destroy
    /// absorbed tiles. Returns nothing when no move is pending.
    pub fn settle(&mut self, board: &mut Board) -> Option<Vec<TileEvent>> {
        let pending = self.pending.take()?;
        let mut events = Vec::with_capacity(pending.merges.len() * 2 + 1);
        for merge in &pending.merges {
            if let Some(tile) = board.find_mut(merge.survivor) {
                tile.value = tile.pending_value.take().unwrap_or(merge.value);
                tile.previous_position = tile.position;
                events.push(TileEvent::Committed { id: tile.id, value: tile.value });
            }
        }
        events.extend(pending.absorbed.iter().map(|t| TileEvent::Removed { id: t.id }));
        if let Some(t) = pending.spawned {
            events.push(TileEvent::Spawned { id: t.id, value: t.value, position: t.position });
        }
        Some(events)
    }

    /// Drop any pending move, e.g. when the board is replaced wholesale.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Events that place every tile of `board` from scratch.
pub fn placements(board: &Board) -> Vec<TileEvent> {
    board
        .tiles()
        .map(|t| TileEvent::Placed { id: t.id, value: t.value, position: t.position })
        .collect()
}
