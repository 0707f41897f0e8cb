//! Persistence collaborators.
//!
//! Three stores of different trust: the local store (fast, device-scoped,
//! synchronous), the cloud store (user-scoped, asynchronous) and the score
//! service (authoritative leaderboard, asynchronous). Remote calls return
//! `'static` local futures so they can be spawned on the single-threaded
//! event loop; retrying a call with the same value must be harmless.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use tracing::warn;

use crate::snapshot::{self, Snapshot, SnapshotError};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("remote store unavailable")]
    Unavailable,
    #[error("rejected by remote: {0}")]
    Rejected(String),
    #[error("no player identity")]
    NoIdentity,
}

/// Device-local storage for the best score and the game snapshot.
pub trait LocalStore {
    /// Stored best, 0 when absent or unreadable.
    fn read_best(&self) -> u64;
    fn write_best(&mut self, best: u64) -> Result<(), StoreError>;
    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError>;
    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;
    fn clear_snapshot(&mut self) -> Result<(), StoreError>;
}

/// User-scoped remote key/value store holding the personal best.
pub trait CloudStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn read_best(&self) -> LocalBoxFuture<'static, Result<Option<u64>, StoreError>>;
    fn write_best(&self, best: u64) -> LocalBoxFuture<'static, Result<(), StoreError>>;
}

/// Authoritative score service.
pub trait ScoreService {
    fn read_best(&self) -> LocalBoxFuture<'static, Result<u64, StoreError>>;
    fn submit_score(&self, score: u64, identity: &str) -> LocalBoxFuture<'static, Result<(), StoreError>>;
}

const BEST_FILE: &str = "best";
const SAVE_FILE: &str = "save.json";

/// Local store backed by two files in a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SAVE_FILE)
    }

    fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_FILE)
    }
}

impl LocalStore for FileStore {
    fn read_best(&self) -> u64 {
        match fs::read_to_string(self.best_path()) {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                warn!(path = %self.best_path().display(), "unreadable best score, using 0");
                0
            }),
            Err(_) => 0,
        }
    }

    fn write_best(&mut self, best: u64) -> Result<(), StoreError> {
        let path = self.best_path();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, best.to_string())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(snapshot::read_from_path(self.snapshot_path())?)
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        Ok(snapshot::write_to_path(self.snapshot_path(), snapshot)?)
    }

    fn clear_snapshot(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(self.snapshot_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory local store. The snapshot is kept as JSON text so corrupt saves
/// can be represented.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub best: u64,
    pub snapshot: Option<String>,
}

impl MemoryStore {
    pub fn with_best(best: u64) -> Self {
        MemoryStore { best, snapshot: None }
    }
}

impl LocalStore for MemoryStore {
    fn read_best(&self) -> u64 {
        self.best
    }

    fn write_best(&mut self, best: u64) -> Result<(), StoreError> {
        self.best = best;
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        match &self.snapshot {
            Some(text) => Ok(Some(Snapshot::from_json(text)?)),
            None => Ok(None),
        }
    }

    fn save_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshot = Some(snapshot.to_json()?);
        Ok(())
    }

    fn clear_snapshot(&mut self) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RemoteCell {
    best: Option<u64>,
    failing: bool,
    writes: Vec<u64>,
    submissions: Vec<(u64, String)>,
}

/// Simulated remote used in place of a network transport: shared in-memory
/// state behind a fixed latency, with switchable failure.
///
/// Clones share state, so a test can keep a handle while the session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    cell: Rc<RefCell<RemoteCell>>,
    latency: Duration,
}

/// Cloud store simulation.
pub type MemoryCloud = MemoryRemote;
/// Score service simulation.
pub type MemoryServer = MemoryRemote;

impl MemoryRemote {
    pub fn new(latency: Duration) -> Self {
        MemoryRemote { cell: Rc::default(), latency }
    }

    pub fn with_best(self, best: u64) -> Self {
        self.cell.borrow_mut().best = Some(best);
        self
    }

    pub fn best(&self) -> Option<u64> {
        self.cell.borrow().best
    }

    pub fn set_failing(&self, failing: bool) {
        self.cell.borrow_mut().failing = failing;
    }

    /// Values written through the cloud interface, in arrival order.
    pub fn writes(&self) -> Vec<u64> {
        self.cell.borrow().writes.clone()
    }

    /// Scores submitted through the score service interface.
    pub fn submissions(&self) -> Vec<(u64, String)> {
        self.cell.borrow().submissions.clone()
    }

    fn delayed<T, F>(&self, op: F) -> LocalBoxFuture<'static, Result<T, StoreError>>
    where
        T: 'static,
        F: FnOnce(&mut RemoteCell) -> Result<T, StoreError> + 'static,
    {
        let cell = Rc::clone(&self.cell);
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let mut cell = cell.borrow_mut();
            if cell.failing {
                return Err(StoreError::Unavailable);
            }
            op(&mut cell)
        }
        .boxed_local()
    }
}

impl CloudStore for MemoryRemote {
    fn read_best(&self) -> LocalBoxFuture<'static, Result<Option<u64>, StoreError>> {
        self.delayed(|cell| Ok(cell.best))
    }

    fn write_best(&self, best: u64) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        self.delayed(move |cell| {
            cell.writes.push(best);
            cell.best = Some(best);
            Ok(())
        })
    }
}

impl ScoreService for MemoryRemote {
    fn read_best(&self) -> LocalBoxFuture<'static, Result<u64, StoreError>> {
        self.delayed(|cell| Ok(cell.best.unwrap_or(0)))
    }

    fn submit_score(&self, score: u64, identity: &str) -> LocalBoxFuture<'static, Result<(), StoreError>> {
        let identity = identity.to_string();
        self.delayed(move |cell| {
            if identity.is_empty() {
                return Err(StoreError::Rejected("empty identity".into()));
            }
            cell.submissions.push((score, identity));
            cell.best = Some(cell.best.unwrap_or(0).max(score));
            Ok(())
        })
    }
}
