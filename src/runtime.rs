//! Single-threaded driver tying the game to its stores and timers.
//!
//! A [`Session`] owns one [`Game`], the local store, handles to the cloud
//! store and score service, the best-score [`Reconciler`] and the terminal
//! [`Submission`]. Everything runs on one thread: remote calls and the settle
//! timer are spawned with [`tokio::task::spawn_local`], so a session must be
//! started and driven inside a [`tokio::task::LocalSet`]. No `RefCell` borrow
//! is held across an await point.
//!
//! Observers receive [`GameEvent`]s on an unbounded channel.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task;
use tokio::time;
use tracing::{debug, trace, warn};

use crate::engine::Move;
use crate::game::{Game, MoveError, MoveResult};
use crate::lifecycle::TileEvent;
use crate::reconcile::{Reconciler, Remote, SyncCommand};
use crate::snapshot::Snapshot;
use crate::store::{CloudStore, LocalStore, ScoreService, StoreError};
use crate::submit::{Notice, Submission};

/// Default visual-completion window of a move.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(150);

/// Shown in place of the global record before the score service answered.
pub const NO_RECORD: &str = "—";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The board was replaced wholesale (start, load, new game).
    Reset { tiles: Vec<TileEvent> },
    MoveApplied { result: MoveResult, tiles: Vec<TileEvent> },
    MoveSettled { tiles: Vec<TileEvent> },
    BestChanged(u64),
    GameOver { score: u64, best: u64 },
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub settle: Duration,
    /// Player identity for the score service. `None` disables submission.
    pub identity: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions { settle: SETTLE_WINDOW, identity: None }
    }
}

struct Inner<R> {
    game: Game<R>,
    local: Box<dyn LocalStore>,
    cloud: Rc<dyn CloudStore>,
    server: Rc<dyn ScoreService>,
    reconciler: Reconciler,
    submission: Submission,
    server_best: Option<u64>,
    options: SessionOptions,
    /// Bumped by every move and new game; a settle timer from an older epoch is stale.
    epoch: u64,
    events: UnboundedSender<GameEvent>,
}

impl<R> Inner<R> {
    fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

impl<R: Rng> Inner<R> {
    fn persist(&mut self) {
        let snapshot = self.game.serialize_snapshot();
        if let Err(e) = self.local.save_snapshot(&snapshot) {
            warn!(error = %e, "failed to save game");
        }
    }
}

pub struct Session<R = StdRng> {
    inner: Rc<RefCell<Inner<R>>>,
    settled: Rc<Notify>,
}

impl<R> Clone for Session<R> {
    fn clone(&self) -> Self {
        Session { inner: Rc::clone(&self.inner), settled: Rc::clone(&self.settled) }
    }
}

impl<R: Rng + 'static> Session<R> {
    /// Restore the saved game (or start a fresh one) and begin priming the
    /// remote best scores. Must be called from within a `LocalSet`.
    pub fn start(
        rng: R,
        mut local: Box<dyn LocalStore>,
        cloud: Rc<dyn CloudStore>,
        server: Rc<dyn ScoreService>,
        options: SessionOptions,
    ) -> (Self, UnboundedReceiver<GameEvent>) {
        let local_best = local.read_best();
        let mut game = Game::new(rng);
        let mut tiles = None;
        match local.load_snapshot() {
            Ok(Some(snapshot)) => match game.load_snapshot(&snapshot) {
                Ok(t) => tiles = Some(t),
                Err(e) => warn!(error = %e, "saved game rejected, starting fresh"),
            },
            Ok(None) => debug!("no saved game"),
            Err(e) => warn!(error = %e, "saved game unreadable, starting fresh"),
        }
        let fresh = tiles.is_none();
        let tiles = match tiles {
            Some(t) => t,
            None => game.new_game(),
        };
        game.raise_best(local_best);
        if fresh {
            if let Err(e) = local.clear_snapshot() {
                warn!(error = %e, "failed to clear saved game");
            }
        }

        let mut reconciler = Reconciler::new(local_best);
        let mut cmds = reconciler.start();
        cmds.extend(reconciler.observe(game.score().best()));

        let (events, rx) = mpsc::unbounded_channel();
        let mut inner = Inner {
            game,
            local,
            cloud,
            server,
            reconciler,
            submission: Submission::default(),
            server_best: None,
            options,
            epoch: 0,
            events,
        };
        inner.persist();
        inner.emit(GameEvent::Reset { tiles });

        let session = Session { inner: Rc::new(RefCell::new(inner)), settled: Rc::new(Notify::new()) };
        session.dispatch(cmds);
        (session, rx)
    }

    /// Apply a move. Input arriving while the previous move settles is
    /// dropped with [`MoveError::Settling`].
    pub fn apply_move(&self, direction: Move) -> Result<MoveResult, MoveError> {
        let (result, cmds, epoch, settle) = {
            let mut inner = self.inner.borrow_mut();
            let applied = inner.game.apply_move(direction)?;
            if !applied.result.changed {
                return Ok(applied.result);
            }
            inner.persist();
            let score = inner.game.score().current();
            let cmds = inner.reconciler.observe(score);
            inner.epoch += 1;
            let result = applied.result.clone();
            inner.emit(GameEvent::MoveApplied { result: applied.result, tiles: applied.tiles });
            (result, cmds, inner.epoch, inner.options.settle)
        };
        self.dispatch(cmds);

        let this = self.clone();
        task::spawn_local(async move {
            time::sleep(settle).await;
            this.settle_move(epoch);
        });
        Ok(result)
    }

    /// Abandon the current game and start over. Allowed at any time; a move
    /// still settling is dropped without its settle events.
    pub fn new_game(&self) {
        let cmds = {
            let mut inner = self.inner.borrow_mut();
            inner.epoch += 1;
            let tiles = inner.game.new_game();
            inner.submission.reset();
            if let Err(e) = inner.local.clear_snapshot() {
                warn!(error = %e, "failed to clear saved game");
            }
            inner.persist();
            inner.emit(GameEvent::Reset { tiles });
            inner.reconciler.retry()
        };
        self.settled.notify_waiters();
        self.dispatch(cmds);
    }

    /// Resolves once no move is settling.
    pub async fn settled(&self) {
        let notified = self.settled.notified();
        if !self.is_settling() {
            return;
        }
        notified.await;
    }

    pub fn is_settling(&self) -> bool {
        self.inner.borrow().game.is_settling()
    }

    pub fn best(&self) -> u64 {
        self.inner.borrow().reconciler.best()
    }

    pub fn score(&self) -> u64 {
        self.inner.borrow().game.score().current()
    }

    /// Last best read from the score service.
    pub fn server_best(&self) -> Option<u64> {
        self.inner.borrow().server_best
    }

    pub fn share_text(&self) -> String {
        let inner = self.inner.borrow();
        let global = match inner.server_best {
            Some(best) => best.to_string(),
            None => NO_RECORD.to_string(),
        };
        format!("My 2048 record: {}\nGlobal record: {}", inner.reconciler.best(), global)
    }

    pub fn game(&self) -> Ref<'_, Game<R>> {
        Ref::map(self.inner.borrow(), |inner| &inner.game)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.borrow().game.serialize_snapshot()
    }

    fn settle_move(&self, epoch: u64) {
        let final_score = {
            let mut inner = self.inner.borrow_mut();
            if inner.epoch != epoch {
                trace!(epoch, current = inner.epoch, "stale settle timer");
                return;
            }
            let Some(settled) = inner.game.settle() else {
                return;
            };
            inner.emit(GameEvent::MoveSettled { tiles: settled.tiles });
            if settled.game_over {
                let score = inner.game.score().current();
                let best = inner.reconciler.best();
                inner.emit(GameEvent::GameOver { score, best });
                Some(score)
            } else {
                None
            }
        };
        self.settled.notify_waiters();
        if let Some(score) = final_score {
            self.submit_final(score);
        }
    }

    fn submit_final(&self, score: u64) {
        let (ticket, identity, server) = {
            let mut inner = self.inner.borrow_mut();
            let Some(ticket) = inner.submission.begin(score) else {
                return;
            };
            match inner.options.identity.clone() {
                Some(identity) => (ticket, identity, Rc::clone(&inner.server)),
                None => {
                    inner.submission.finish(ticket, Err(StoreError::NoIdentity.to_string()));
                    inner.emit(GameEvent::Notice(Notice::MissingIdentity));
                    return;
                }
            }
        };

        let request = server.submit_score(score, &identity);
        let this = self.clone();
        task::spawn_local(async move {
            let result = request.await.map_err(|e| e.to_string());
            let refresh = {
                let mut inner = this.inner.borrow_mut();
                if let Some(notice) = inner.submission.finish(ticket, result) {
                    inner.emit(GameEvent::Notice(notice));
                }
                inner.reconciler.read(Remote::Server)
            };
            this.dispatch(refresh.into_iter().collect());
        });
    }

    fn store_local(&self, best: u64) {
        let mut inner = self.inner.borrow_mut();
        if let Err(e) = inner.local.write_best(best) {
            warn!(best, error = %e, "failed to store best locally");
        }
        inner.game.raise_best(best);
        inner.persist();
        inner.emit(GameEvent::BestChanged(best));
    }

    /// Carry out reconciler commands. Remote calls complete on their own
    /// tasks and feed their results back into the reconciler.
    fn dispatch(&self, cmds: Vec<SyncCommand>) {
        for cmd in cmds {
            match cmd {
                SyncCommand::StoreLocal(best) => self.store_local(best),
                SyncCommand::Read(Remote::Cloud) => {
                    let request = self.inner.borrow().cloud.read_best();
                    let this = self.clone();
                    task::spawn_local(async move {
                        let result = request.await;
                        let next = this.inner.borrow_mut().reconciler.on_read(Remote::Cloud, result);
                        this.dispatch(next);
                    });
                }
                SyncCommand::Read(Remote::Server) => {
                    let request = self.inner.borrow().server.read_best();
                    let this = self.clone();
                    task::spawn_local(async move {
                        let result = request.await;
                        let next = {
                            let mut inner = this.inner.borrow_mut();
                            if let Ok(best) = result {
                                inner.server_best = Some(best);
                            }
                            inner.reconciler.on_read(Remote::Server, result.map(Some))
                        };
                        this.dispatch(next);
                    });
                }
                SyncCommand::Write(Remote::Cloud, value) => {
                    let request = self.inner.borrow().cloud.write_best(value);
                    let this = self.clone();
                    task::spawn_local(async move {
                        let result = request.await;
                        let next = this.inner.borrow_mut().reconciler.on_write(Remote::Cloud, value, result);
                        this.dispatch(next);
                    });
                }
                SyncCommand::Write(Remote::Server, value) => {
                    let (identity, server) = {
                        let inner = self.inner.borrow();
                        (inner.options.identity.clone(), Rc::clone(&inner.server))
                    };
                    let Some(identity) = identity else {
                        let next = self.inner.borrow_mut().reconciler.on_write(
                            Remote::Server,
                            value,
                            Err(StoreError::NoIdentity),
                        );
                        self.dispatch(next);
                        continue;
                    };
                    let request = server.submit_score(value, &identity);
                    let this = self.clone();
                    task::spawn_local(async move {
                        let result = request.await;
                        let next = this.inner.borrow_mut().reconciler.on_write(Remote::Server, value, result);
                        this.dispatch(next);
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SIZE;
    use crate::store::{FileStore, MemoryCloud, MemoryServer, MemoryStore};
    use rand::rngs::mock::StepRng;
    use tempfile::tempdir;
    use tokio::task::LocalSet;

    const CLOUD_LATENCY: Duration = Duration::from_millis(40);
    const SERVER_LATENCY: Duration = Duration::from_millis(120);

    struct Fixture {
        session: Session<StepRng>,
        events: UnboundedReceiver<GameEvent>,
        cloud: MemoryCloud,
        server: MemoryServer,
    }

    impl Fixture {
        fn drain(&mut self) -> Vec<GameEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn start(local: MemoryStore, cloud: MemoryCloud, server: MemoryServer, identity: Option<&str>) -> Fixture {
        let options = SessionOptions { settle: SETTLE_WINDOW, identity: identity.map(str::to_string) };
        let (session, events) = Session::start(
            StepRng::new(0, 0),
            Box::new(local),
            Rc::new(cloud.clone()),
            Rc::new(server.clone()),
            options,
        );
        Fixture { session, events, cloud, server }
    }

    fn saved(grid: [[u32; SIZE]; SIZE], score: u64) -> MemoryStore {
        let snapshot = Snapshot { grid, score, best: score, math_history: Vec::new() };
        MemoryStore { best: 0, snapshot: Some(snapshot.to_json().unwrap()) }
    }

    /// One move to the right fills the last free cell and leaves no merges.
    const NEARLY_OVER: [[u32; SIZE]; SIZE] =
        [[4, 8, 16, 0], [32, 64, 128, 256], [2, 4, 8, 16], [32, 64, 128, 256]];

    async fn idle() {
        time::sleep(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn move_locks_until_settle_window_elapses() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    saved([[2, 0, 2, 0], [0; 4], [0; 4], [0; 4]], 0),
                    MemoryCloud::new(CLOUD_LATENCY),
                    MemoryServer::new(SERVER_LATENCY),
                    None,
                );
                assert!(matches!(f.drain().first(), Some(GameEvent::Reset { .. })));

                let result = f.session.apply_move(Move::Left).unwrap();
                assert!(result.changed);
                assert_eq!(result.score_delta, 4);
                assert_eq!(f.session.score(), 4);
                assert!(f.session.is_settling());
                assert_eq!(f.session.apply_move(Move::Right), Err(MoveError::Settling));

                let events = f.drain();
                assert!(matches!(events[0], GameEvent::MoveApplied { .. }));
                assert!(events.contains(&GameEvent::BestChanged(4)));

                time::sleep(Duration::from_millis(149)).await;
                assert!(f.session.is_settling());
                time::sleep(Duration::from_millis(10)).await;
                assert!(!f.session.is_settling());
                let events = f.drain();
                assert!(events.iter().any(|e| matches!(e, GameEvent::MoveSettled { .. })));
                assert!(f.session.apply_move(Move::Right).is_ok());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_op_move_emits_nothing() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    saved([[2, 4, 0, 0], [0; 4], [0; 4], [0; 4]], 0),
                    MemoryCloud::default(),
                    MemoryServer::default(),
                    None,
                );
                f.drain();
                let before = f.session.snapshot();
                let result = f.session.apply_move(Move::Left).unwrap();
                assert!(!result.changed);
                assert!(!f.session.is_settling());
                assert_eq!(f.session.snapshot(), before);
                assert!(f.drain().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn settled_waits_for_window() {
        LocalSet::new()
            .run_until(async {
                let f = start(
                    saved([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]], 0),
                    MemoryCloud::default(),
                    MemoryServer::default(),
                    None,
                );
                f.session.apply_move(Move::Left).unwrap();
                let started = time::Instant::now();
                f.session.settled().await;
                assert!(started.elapsed() >= SETTLE_WINDOW);
                assert!(!f.session.is_settling());
                // already idle: returns immediately
                f.session.settled().await;
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_game_cancels_pending_settle() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    saved([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]], 0),
                    MemoryCloud::default(),
                    MemoryServer::default(),
                    None,
                );
                f.session.apply_move(Move::Left).unwrap();
                f.session.new_game();
                assert!(!f.session.is_settling());
                assert_eq!(f.session.score(), 0);
                assert_eq!(f.session.game().board().tile_count(), 2);
                f.drain();
                idle().await;
                assert!(!f.drain().iter().any(|e| matches!(e, GameEvent::MoveSettled { .. })));
                // the best from the abandoned game is kept
                assert_eq!(f.session.best(), 4);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn primes_and_writes_back_lower_remotes() {
        LocalSet::new()
            .run_until(async {
                let f = start(
                    MemoryStore::with_best(100),
                    MemoryCloud::new(CLOUD_LATENCY).with_best(40),
                    MemoryServer::new(SERVER_LATENCY).with_best(20),
                    Some("player-1"),
                );
                assert_eq!(f.session.server_best(), None);
                assert_eq!(f.session.share_text(), "My 2048 record: 100\nGlobal record: —");
                idle().await;
                assert_eq!(f.session.best(), 100);
                assert_eq!(f.cloud.writes(), vec![100]);
                assert_eq!(f.server.submissions(), vec![(100, "player-1".to_string())]);
                assert_eq!(f.session.server_best(), Some(20));
                assert_eq!(f.session.share_text(), "My 2048 record: 100\nGlobal record: 20");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn adopts_higher_cloud_best() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    MemoryStore::with_best(100),
                    MemoryCloud::new(CLOUD_LATENCY).with_best(300),
                    MemoryServer::new(SERVER_LATENCY).with_best(900),
                    None,
                );
                time::sleep(Duration::from_millis(50)).await;
                assert_eq!(f.session.best(), 300);
                idle().await;
                assert_eq!(f.session.best(), 900);
                assert_eq!(f.session.game().score().best(), 900);
                assert_eq!(f.cloud.writes(), vec![900]);
                // no identity: nothing is submitted to the server
                assert!(f.server.submissions().is_empty());
                let bests: Vec<u64> = f
                    .drain()
                    .into_iter()
                    .filter_map(|e| match e {
                        GameEvent::BestChanged(b) => Some(b),
                        _ => None,
                    })
                    .collect();
                assert_eq!(bests, vec![300, 900]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_cloud_is_never_written() {
        LocalSet::new()
            .run_until(async {
                let cloud = MemoryCloud::new(CLOUD_LATENCY).with_best(2);
                cloud.set_failing(true);
                let f = start(
                    saved([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]], 0),
                    cloud,
                    MemoryServer::default(),
                    None,
                );
                idle().await;
                f.session.apply_move(Move::Left).unwrap();
                idle().await;
                assert!(f.cloud.writes().is_empty());
                // recovers on the next new game
                f.cloud.set_failing(false);
                f.session.new_game();
                idle().await;
                assert_eq!(f.session.best(), 4);
                assert_eq!(f.cloud.writes(), vec![4]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn game_over_submits_once() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    saved(NEARLY_OVER, 1000),
                    MemoryCloud::new(CLOUD_LATENCY),
                    MemoryServer::new(SERVER_LATENCY),
                    Some("player-1"),
                );
                idle().await;
                let before = f.server.submissions().len();
                f.drain();

                f.session.apply_move(Move::Right).unwrap();
                idle().await;
                assert!(f.session.game().is_over());
                let events = f.drain();
                assert!(events.contains(&GameEvent::GameOver { score: 1000, best: 1000 }));
                let notices: Vec<&GameEvent> =
                    events.iter().filter(|e| matches!(e, GameEvent::Notice(_))).collect();
                assert_eq!(notices, vec![&GameEvent::Notice(Notice::Submitted(1000))]);
                assert_eq!(f.server.submissions().len(), before + 1);
                assert_eq!(f.session.server_best(), Some(1000));

                // further input changes nothing and does not resubmit
                for dir in Move::ALL {
                    assert!(!f.session.apply_move(dir).unwrap().changed);
                }
                idle().await;
                assert_eq!(f.server.submissions().len(), before + 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn game_over_without_identity_notifies() {
        LocalSet::new()
            .run_until(async {
                let mut f = start(
                    saved(NEARLY_OVER, 1000),
                    MemoryCloud::default(),
                    MemoryServer::default(),
                    None,
                );
                f.session.apply_move(Move::Right).unwrap();
                idle().await;
                let events = f.drain();
                assert!(events.contains(&GameEvent::Notice(Notice::MissingIdentity)));
                assert!(f.server.submissions().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_notifies_exactly_once() {
        LocalSet::new()
            .run_until(async {
                let server = MemoryServer::new(SERVER_LATENCY);
                server.set_failing(true);
                let mut f = start(saved(NEARLY_OVER, 1000), MemoryCloud::default(), server, Some("player-1"));
                f.session.apply_move(Move::Right).unwrap();
                idle().await;
                let failures = f
                    .drain()
                    .into_iter()
                    .filter(|e| matches!(e, GameEvent::Notice(Notice::SubmitFailed { score: 1000, .. })))
                    .count();
                assert_eq!(failures, 1);
                assert_eq!(f.session.server_best(), None);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_save_starts_fresh() {
        LocalSet::new()
            .run_until(async {
                let local = MemoryStore { best: 64, snapshot: Some("{\"grid\": oops".into()) };
                let mut f = start(local, MemoryCloud::default(), MemoryServer::default(), None);
                match f.drain().first() {
                    Some(GameEvent::Reset { tiles }) => assert_eq!(tiles.len(), 2),
                    other => panic!("expected reset, got {other:?}"),
                }
                assert_eq!(f.session.score(), 0);
                assert_eq!(f.session.best(), 64);
                assert_eq!(f.session.snapshot().best, 64);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn file_store_survives_restart() {
        let dir = tempdir().unwrap();
        LocalSet::new()
            .run_until(async {
                let store = FileStore::open(dir.path()).unwrap();
                let (session, _events) = Session::start(
                    StepRng::new(0, 0),
                    Box::new(store),
                    Rc::new(MemoryCloud::default()),
                    Rc::new(MemoryServer::default()),
                    SessionOptions::default(),
                );
                // two 2s spawned in the first cells of the top row
                session.apply_move(Move::Left).unwrap();
                session.settled().await;
                assert_eq!(session.best(), 4);
            })
            .await;

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.read_best(), 4);
        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.score, 4);
        assert_eq!(snapshot.math_history, vec!["2 + 2 = 4".to_string()]);
    }
}
