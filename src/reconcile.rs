//! Best-score reconciliation across the local, cloud and server stores.
//!
//! The reconciler is a plain state machine: it never performs I/O itself.
//! Every input (startup, a read or write completing, gameplay raising the
//! score) returns the [`SyncCommand`]s the caller must carry out, and the
//! caller reports completions back. Completions may arrive in any order.
//!
//! Rules:
//! - the exposed best only ever grows; the larger value wins, whatever its source;
//! - a remote is written only after it has been read once (primed), and only
//!   with the current best;
//! - at most one write per remote is in flight; a raise that happens while a
//!   write is in flight or before priming is synced once afterwards.
//!
//! ```
//! use tg2048::reconcile::{Reconciler, Remote, SyncCommand};
//!
//! let mut r = Reconciler::new(3);
//! assert_eq!(r.start(), vec![SyncCommand::Read(Remote::Cloud), SyncCommand::Read(Remote::Server)]);
//! assert_eq!(r.on_read(Remote::Cloud, Ok(Some(5))), vec![SyncCommand::StoreLocal(5)]);
//! assert_eq!(r.best(), 5);
//! ```

use tracing::{debug, info, warn};

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remote {
    Cloud,
    Server,
}

impl Remote {
    pub const ALL: [Remote; 2] = [Remote::Cloud, Remote::Server];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priming {
    #[default]
    Unprimed,
    Priming,
    Primed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(u64),
    Failed(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteState {
    #[default]
    Idle,
    InFlight(u64),
    Settled(WriteOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceState {
    pub priming: Priming,
    /// Highest value known to be stored at the remote.
    pub known: Option<u64>,
    pub write: WriteState,
    /// The best moved past `known` while a write could not be issued.
    pub pending_sync: bool,
}

impl SourceState {
    fn behind(&self, best: u64) -> bool {
        best > self.known.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Read(Remote),
    Write(Remote, u64),
    /// Persist a new best locally. Issued exactly when the best rises.
    StoreLocal(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciler {
    best: u64,
    cloud: SourceState,
    server: SourceState,
}

impl Reconciler {
    /// Start from the value held in the local store.
    pub fn new(local_best: u64) -> Self {
        Reconciler { best: local_best, cloud: SourceState::default(), server: SourceState::default() }
    }

    #[inline]
    pub fn best(&self) -> u64 {
        self.best
    }

    pub fn source(&self, remote: Remote) -> &SourceState {
        match remote {
            Remote::Cloud => &self.cloud,
            Remote::Server => &self.server,
        }
    }

    fn source_mut(&mut self, remote: Remote) -> &mut SourceState {
        match remote {
            Remote::Cloud => &mut self.cloud,
            Remote::Server => &mut self.server,
        }
    }

    /// Read every remote that is not primed or priming.
    pub fn start(&mut self) -> Vec<SyncCommand> {
        Remote::ALL.into_iter().filter_map(|remote| self.read(remote)).collect()
    }

    /// Issue a read of `remote` unless one is already outstanding. Primed
    /// remotes may be re-read; the result goes through the same max rule.
    pub fn read(&mut self, remote: Remote) -> Option<SyncCommand> {
        let state = self.source_mut(remote);
        if state.priming == Priming::Priming {
            return None;
        }
        if state.priming == Priming::Unprimed {
            state.priming = Priming::Priming;
        }
        Some(SyncCommand::Read(remote))
    }

    /// A read of `remote` completed.
    pub fn on_read(&mut self, remote: Remote, result: Result<Option<u64>, StoreError>) -> Vec<SyncCommand> {
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                warn!(?remote, error = %e, "best-score read failed");
                let state = self.source_mut(remote);
                if state.priming == Priming::Priming {
                    state.priming = Priming::Unprimed;
                }
                return Vec::new();
            }
        };

        let state = self.source_mut(remote);
        state.priming = Priming::Primed;
        if let Some(v) = value {
            state.known = Some(state.known.map_or(v, |k| k.max(v)));
        }

        let mut out = Vec::new();
        if let Some(v) = value {
            if v > self.best {
                info!(?remote, from = self.best, to = v, "adopting higher remote best");
                self.best = v;
                out.push(SyncCommand::StoreLocal(v));
            }
        }
        out.extend(Remote::ALL.into_iter().filter_map(|r| self.sync(r)));
        out
    }

    /// Gameplay produced `score`.
    pub fn observe(&mut self, score: u64) -> Vec<SyncCommand> {
        if score <= self.best {
            return Vec::new();
        }
        debug!(from = self.best, to = score, "best raised by play");
        self.best = score;
        let mut out = vec![SyncCommand::StoreLocal(score)];
        out.extend(Remote::ALL.into_iter().filter_map(|r| self.sync(r)));
        out
    }

    /// A write of `value` to `remote` completed.
    pub fn on_write(&mut self, remote: Remote, value: u64, result: Result<(), StoreError>) -> Vec<SyncCommand> {
        let best = self.best;
        let state = self.source_mut(remote);
        match result {
            Ok(()) => {
                state.write = WriteState::Settled(WriteOutcome::Written(value));
                state.known = Some(state.known.map_or(value, |k| k.max(value)));
                self.sync(remote).into_iter().collect()
            }
            Err(e) => {
                warn!(?remote, value, error = %e, "best-score write failed");
                state.write = WriteState::Settled(WriteOutcome::Failed(value));
                state.pending_sync = state.behind(best);
                Vec::new()
            }
        }
    }

    /// Re-read remotes whose first read failed and push the best to primed
    /// remotes left behind by a failed write.
    pub fn retry(&mut self) -> Vec<SyncCommand> {
        let mut out = Vec::new();
        for remote in Remote::ALL {
            match self.source(remote).priming {
                Priming::Unprimed => out.extend(self.read(remote)),
                Priming::Primed => out.extend(self.sync(remote)),
                Priming::Priming => {}
            }
        }
        out
    }

    /// Bring `remote` up to the current best if it is allowed and needed.
    fn sync(&mut self, remote: Remote) -> Option<SyncCommand> {
        let best = self.best;
        let state = self.source_mut(remote);
        if !state.behind(best) {
            state.pending_sync = false;
            return None;
        }
        if state.priming != Priming::Primed {
            state.pending_sync = true;
            return None;
        }
        match state.write {
            WriteState::InFlight(v) if v >= best => None,
            WriteState::InFlight(_) => {
                state.pending_sync = true;
                None
            }
            _ => {
                state.write = WriteState::InFlight(best);
                state.pending_sync = false;
                debug!(?remote, best, "writing best to remote");
                Some(SyncCommand::Write(remote, best))
            }
        }
    }
}
