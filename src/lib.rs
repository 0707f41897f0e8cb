//! tg2048: a 2048 move/merge engine with tile identity tracking and best-score
//! reconciliation.
//!
//! This crate provides:
//! - The board model and move rules (`engine`), with stable tile identities
//! - A two-phase tile lifecycle for animation (`lifecycle`)
//! - A game object tying board, score, merge history and RNG together (`game`)
//! - A snapshot format (`snapshot`) and local/remote stores (`store`)
//! - A best-score reconciler across local, cloud and server sources (`reconcile`)
//! - A single-threaded async session driving all of the above (`runtime`)
//!
//! Quick start:
//! ```
//! use tg2048::engine::Move;
//! use tg2048::game::Game;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // Deterministic game with a seeded RNG
//! let mut game = Game::new(StdRng::seed_from_u64(42));
//! assert_eq!(game.board().tile_count(), 2);
//!
//! for dir in Move::ALL {
//!     let applied = game.apply_move(dir).unwrap();
//!     if applied.result.changed {
//!         assert!(applied.result.spawned.is_some());
//!         game.settle();
//!     }
//! }
//! println!("{}", game.board());
//! ```
//!
//! `Game` is synchronous; the caller decides when a move's visual window
//! closes. `runtime::Session` does that on a timer and talks to the stores.
pub mod config;
pub mod engine;
pub mod game;
pub mod lifecycle;
pub mod reconcile;
pub mod runtime;
pub mod score;
pub mod snapshot;
pub mod store;
pub mod submit;
