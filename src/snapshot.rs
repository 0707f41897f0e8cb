//! Persisted game snapshot.
//!
//! The snapshot is a flat 4x4 grid of values (0 = empty), the score, the
//! personal best and the merge history, stored as JSON:
//!
//! ```json
//! {"grid":[[2,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,4]],"score":12,"best":96,"mathHistory":["2 + 2 = 4"]}
//! ```
//!
//! Tile identities are not persisted; they are reassigned in row-major order
//! on load.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{MAX_TILE, SIZE};
use crate::score::HISTORY_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub grid: [[u32; SIZE]; SIZE],
    pub score: u64,
    pub best: u64,
    #[serde(default)]
    pub math_history: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tile value {value} at row {row}, col {col}")]
    InvalidTile { row: usize, col: usize, value: u32 },
}

impl Snapshot {
    /// A snapshot holding only `grid`, with zero score and best.
    pub fn from_grid(grid: [[u32; SIZE]; SIZE]) -> Self {
        Snapshot { grid, score: 0, best: 0, math_history: Vec::new() }
    }

    /// Every cell must be empty or a power of two between 2 and [`MAX_TILE`].
    pub fn validate(&self) -> Result<(), SnapshotError> {
        for (row, line) in self.grid.iter().enumerate() {
            for (col, &value) in line.iter().enumerate() {
                if value != 0 && (value < 2 || value > MAX_TILE || !value.is_power_of_two()) {
                    return Err(SnapshotError::InvalidTile { row, col, value });
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate. Extra history lines beyond the kept window are dropped.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: Snapshot = serde_json::from_str(text)?;
        snapshot.validate()?;
        snapshot.math_history.truncate(HISTORY_LEN);
        Ok(snapshot)
    }
}

/// Write a snapshot to `path`, replacing any previous file atomically.
pub fn write_to_path<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, snapshot.to_json()?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a snapshot from `path`; `Ok(None)` when the file does not exist.
pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Snapshot>, SnapshotError> {
    match fs::read_to_string(path) {
        Ok(text) => Snapshot::from_json(&text).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        Snapshot {
            grid: [[2, 0, 0, 0], [0, 4, 0, 0], [0, 0, 1024, 0], [0, 0, 0, 2]],
            score: 1234,
            best: 5678,
            math_history: vec!["2 + 2 = 4".to_string()],
        }
    }

    #[test]
    fn json_shape() {
        let text = sample().to_json().unwrap();
        assert!(text.starts_with("{\"grid\":[[2,0,0,0],"));
        assert!(text.contains("\"score\":1234"));
        assert!(text.contains("\"best\":5678"));
        assert!(text.contains("\"mathHistory\":[\"2 + 2 = 4\"]"));
        assert_eq!(Snapshot::from_json(&text).unwrap(), sample());
    }

    #[test]
    fn history_is_optional() {
        let text = r#"{"grid":[[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,8]],"score":8,"best":8}"#;
        let snap = Snapshot::from_json(text).unwrap();
        assert!(snap.math_history.is_empty());
        assert_eq!(snap.grid[3][3], 8);
    }

    #[test]
    fn corrupt_input_is_rejected() {
        assert!(matches!(Snapshot::from_json("not json"), Err(SnapshotError::Json(_))));
        // wrong dimensions
        let short = r#"{"grid":[[0,0,0],[0,0,0],[0,0,0]],"score":0,"best":0}"#;
        assert!(matches!(Snapshot::from_json(short), Err(SnapshotError::Json(_))));
        // negative score
        let neg = r#"{"grid":[[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],"score":-1,"best":0}"#;
        assert!(Snapshot::from_json(neg).is_err());
        // not a power of two
        let odd = r#"{"grid":[[3,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],"score":0,"best":0}"#;
        assert!(matches!(
            Snapshot::from_json(odd),
            Err(SnapshotError::InvalidTile { row: 0, col: 0, value: 3 })
        ));
        let one = r#"{"grid":[[0,0,0,0],[0,1,0,0],[0,0,0,0],[0,0,0,0]],"score":0,"best":0}"#;
        assert!(matches!(Snapshot::from_json(one), Err(SnapshotError::InvalidTile { row: 1, col: 1, .. })));
        // larger than any reachable tile
        let huge = r#"{"grid":[[0,0,0,0],[0,0,0,0],[2147483648,2147483648,0,0],[0,0,0,0]],"score":0,"best":0}"#;
        assert!(matches!(
            Snapshot::from_json(huge),
            Err(SnapshotError::InvalidTile { row: 2, col: 0, value: 2147483648 })
        ));
        let top = Snapshot::from_grid([[MAX_TILE, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(top.validate().is_ok());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("save.json");
        assert!(read_from_path(&path).unwrap().is_none());
        write_to_path(&path, &sample()).unwrap();
        assert_eq!(read_from_path(&path).unwrap(), Some(sample()));
        assert!(!dir.path().join("save.json.tmp").exists());
    }
}
