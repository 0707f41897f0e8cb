//! The game session object.
//!
//! `Game` owns the board, the score, the tile id counter, the merge history
//! and its RNG. `apply_move` is the only way the board changes during play.
//! While a move's visual window is open the game is locked and further input
//! is dropped, not queued; `settle` closes the window.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, trace};

use crate::engine::{self, Board, Merge, Move, Tile, TileIds};
use crate::lifecycle::{self, TileEvent, TileTracker};
use crate::score::{MergeHistory, ScoreState};
use crate::snapshot::{Snapshot, SnapshotError};

/// Outcome of one logical move.
///
/// `changed == false` implies no merges, no spawn, zero delta, and an
/// untouched game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    pub direction: Move,
    pub changed: bool,
    /// Points from this move alone.
    pub score_delta: u64,
    pub merges: Vec<Merge>,
    pub spawned: Option<Tile>,
}

impl MoveResult {
    fn unchanged(direction: Move) -> Self {
        MoveResult { direction, changed: false, score_delta: 0, merges: Vec::new(), spawned: None }
    }
}

/// A logical move together with the render events that start its animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveApplied {
    pub result: MoveResult,
    pub tiles: Vec<TileEvent>,
}

/// Visual completion of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSettled {
    pub tiles: Vec<TileEvent>,
    pub game_over: bool,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("previous move is still settling; input dropped")]
    Settling,
}

#[derive(Debug, Clone)]
pub struct Game<R = StdRng> {
    board: Board,
    score: ScoreState,
    history: MergeHistory,
    ids: TileIds,
    tracker: TileTracker,
    rng: R,
}

impl<R: Rng> Game<R> {
    /// Start a fresh game with two spawned tiles.
    pub fn new(rng: R) -> Self {
        let mut game = Game {
            board: Board::EMPTY,
            score: ScoreState::default(),
            history: MergeHistory::default(),
            ids: TileIds::default(),
            tracker: TileTracker::default(),
            rng,
        };
        game.new_game();
        game
    }

    /// Restore a game from a snapshot.
    ///
    /// ```
    /// use tg2048::engine::Move;
    /// use tg2048::game::Game;
    /// use tg2048::snapshot::Snapshot;
    /// use rand::{rngs::StdRng, SeedableRng};
    ///
    /// let snap = Snapshot::from_grid([[2, 0, 2, 0], [0; 4], [0; 4], [0; 4]]);
    /// let mut game = Game::from_snapshot(&snap, StdRng::seed_from_u64(7)).unwrap();
    /// let applied = game.apply_move(Move::Left).unwrap();
    /// assert_eq!(applied.result.score_delta, 4);
    /// assert_eq!(game.board().tile_count(), 2);
    /// // input is dropped until the move settles
    /// assert!(game.apply_move(Move::Right).is_err());
    /// game.settle();
    /// assert!(game.apply_move(Move::Right).is_ok());
    /// ```
    pub fn from_snapshot(snapshot: &Snapshot, rng: R) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let mut game = Game {
            board: Board::EMPTY,
            score: ScoreState::default(),
            history: MergeHistory::default(),
            ids: TileIds::default(),
            tracker: TileTracker::default(),
            rng,
        };
        game.load_snapshot(snapshot)?;
        Ok(game)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn score(&self) -> ScoreState {
        self.score
    }

    pub fn history(&self) -> &MergeHistory {
        &self.history
    }

    /// The id the next created tile will receive.
    pub fn next_tile_id(&self) -> engine::TileId {
        self.ids.peek()
    }

    pub fn is_settling(&self) -> bool {
        self.tracker.is_settling()
    }

    /// True once no move is possible.
    pub fn is_over(&self) -> bool {
        engine::is_game_over(&self.board)
    }

    /// Every tile the renderer should currently show: live tiles plus absorbed
    /// tiles still sliding into their survivors.
    pub fn render_tiles(&self) -> Vec<Tile> {
        let mut tiles: Vec<Tile> = self.board.tiles().copied().collect();
        tiles.extend_from_slice(self.tracker.absorbed());
        tiles
    }

    /// Adopt a higher personal best recorded elsewhere.
    pub fn raise_best(&mut self, best: u64) -> bool {
        self.score.raise_best(best)
    }

    /// Discard the board and start over with two new tiles. The best is kept.
    pub fn new_game(&mut self) -> Vec<TileEvent> {
        self.tracker.clear();
        self.board = Board::EMPTY;
        self.ids.reset();
        self.score.reset();
        self.history.clear();
        self.board.spawn_random(&mut self.ids, &mut self.rng);
        self.board.spawn_random(&mut self.ids, &mut self.rng);
        debug!(tiles = self.board.tile_count(), "new game");
        lifecycle::placements(&self.board)
    }

    /// Replace the game with `snapshot`. The in-memory best is never lowered.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) -> Result<Vec<TileEvent>, SnapshotError> {
        snapshot.validate()?;
        self.tracker.clear();
        self.ids.reset();
        self.board = Board::from_values(&snapshot.grid, &mut self.ids);
        let best = self.score.best().max(snapshot.best);
        self.score = ScoreState::new(snapshot.score, best);
        self.history = MergeHistory::from_lines(snapshot.math_history.iter().cloned());
        Ok(lifecycle::placements(&self.board))
    }

    pub fn serialize_snapshot(&self) -> Snapshot {
        Snapshot {
            grid: self.board.values(),
            score: self.score.current(),
            best: self.score.best(),
            math_history: self.history.to_vec(),
        }
    }

    /// Apply one move.
    ///
    /// A move that changes nothing leaves the game exactly as it was and
    /// reports `changed == false`. Otherwise the score is updated, exactly one
    /// tile is spawned if a cell is free, and the game locks until `settle`.
    pub fn apply_move(&mut self, direction: Move) -> Result<MoveApplied, MoveError> {
        if self.tracker.is_settling() {
            trace!(%direction, "input dropped while settling");
            return Err(MoveError::Settling);
        }

        let slide = engine::slide(&self.board, direction);
        if !slide.changed {
            trace!(%direction, "move had no effect");
            return Ok(MoveApplied { result: MoveResult::unchanged(direction), tiles: Vec::new() });
        }

        self.board = slide.board;
        self.score.add(slide.score_delta);
        for merge in &slide.merges {
            self.history.record(merge.value);
        }
        let spawned = self.board.spawn_random(&mut self.ids, &mut self.rng);
        let tiles = self
            .tracker
            .begin(&self.board, slide.merges.clone(), slide.absorbed, spawned);

        debug!(
            %direction,
            delta = slide.score_delta,
            merges = slide.merges.len(),
            score = self.score.current(),
            "move applied"
        );
        Ok(MoveApplied {
            result: MoveResult {
                direction,
                changed: true,
                score_delta: slide.score_delta,
                merges: slide.merges,
                spawned,
            },
            tiles,
        })
    }

    /// Close the visual window of the pending move, if any.
    pub fn settle(&mut self) -> Option<MoveSettled> {
        let tiles = self.tracker.settle(&mut self.board)?;
        let game_over = self.is_over();
        debug!(events = tiles.len(), game_over, "move settled");
        Some(MoveSettled { tiles, game_over })
    }
}
