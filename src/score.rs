//! Score state and the merge history shown next to the board.

use std::collections::VecDeque;

/// Number of merge lines kept in the history.
pub const HISTORY_LEN: usize = 6;

/// Current score plus the personal best.
///
/// `best` never decreases; `current` may run ahead of it until the next
/// update raises it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreState {
    current: u64,
    best: u64,
}

impl ScoreState {
    pub fn new(current: u64, best: u64) -> Self {
        ScoreState { current, best }
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current
    }

    #[inline]
    pub fn best(&self) -> u64 {
        self.best
    }

    /// Add points from a move. Returns true if the best was raised.
    pub fn add(&mut self, delta: u64) -> bool {
        self.current = self.current.saturating_add(delta);
        self.raise_best(self.current)
    }

    /// Adopt `value` as the best if it is higher.
    pub fn raise_best(&mut self, value: u64) -> bool {
        if value > self.best {
            self.best = value;
            true
        } else {
            false
        }
    }

    /// Start a new game; the best is kept.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

/// Newest-first list of recent merges, rendered as `"a + a = 2a"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeHistory {
    lines: VecDeque<String>,
}

impl MergeHistory {
    pub fn from_lines<I: IntoIterator<Item = String>>(lines: I) -> Self {
        let lines = lines.into_iter().take(HISTORY_LEN).collect();
        MergeHistory { lines }
    }

    /// Record a merge producing `result`.
    pub fn record(&mut self, result: u32) {
        let half = result / 2;
        self.lines.push_front(format!("{half} + {half} = {result}"));
        self.lines.truncate(HISTORY_LEN);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
