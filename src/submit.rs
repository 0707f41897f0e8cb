//! Final-score submission when a game ends.
//!
//! One submission per finished game. A second terminal observation while a
//! request is in flight (or after it settled) is ignored until `reset`.

use std::fmt;

use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    InFlight(u64),
    Settled(Result<u64, String>),
}

/// User-facing messages produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Submitted(u64),
    SubmitFailed { score: u64, reason: String },
    /// The game ended but no player identity is configured.
    MissingIdentity,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Submitted(score) => write!(f, "score {score} submitted"),
            Notice::SubmitFailed { score, reason } => {
                write!(f, "could not submit score {score}: {reason}")
            }
            Notice::MissingIdentity => f.write_str("no player identity; score not submitted"),
        }
    }
}

/// Identifies one submission request; completions of older requests are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    state: RequestState,
    issued: u64,
}

impl Submission {
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Claim the submission slot for `score`. `None` if this game already
    /// submitted or is submitting.
    pub fn begin(&mut self, score: u64) -> Option<Ticket> {
        if self.state != RequestState::Idle {
            return None;
        }
        self.issued += 1;
        self.state = RequestState::InFlight(score);
        Some(Ticket(self.issued))
    }

    /// Record the outcome of the request `ticket` and produce its notice.
    /// Outcomes of requests that are no longer current change nothing.
    pub fn finish(&mut self, ticket: Ticket, result: Result<(), String>) -> Option<Notice> {
        if ticket.0 != self.issued {
            debug!(ticket = ticket.0, current = self.issued, "stale submission result ignored");
            return None;
        }
        let RequestState::InFlight(score) = self.state else {
            return None;
        };
        let notice = match result {
            Ok(()) => {
                info!(score, "score submitted");
                self.state = RequestState::Settled(Ok(score));
                Notice::Submitted(score)
            }
            Err(reason) => {
                warn!(score, %reason, "score submission failed");
                self.state = RequestState::Settled(Err(reason.clone()));
                Notice::SubmitFailed { score, reason }
            }
        };
        Some(notice)
    }

    /// A new game may submit again. A request still in flight is forgotten;
    /// its ticket no longer matches, so its completion is ignored.
    pub fn reset(&mut self) {
        self.state = RequestState::Idle;
    }
}
